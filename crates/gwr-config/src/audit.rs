use std::time::Duration;

use anyhow::{bail, Result};

use crate::secrets::{resolve_env, Secret};

/// Default env var holding the audit database URL.
pub const ENV_DATABASE_URL: &str = "GWR_DATABASE_URL";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_AUDIT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Flags and connection settings for one orphan-audit run. Built once at the
/// edge and passed to the audit explicitly.
#[derive(Clone)]
pub struct AuditConfig {
    database_url: Secret,
    /// Name of the env var the URL came from, for messages.
    pub database_url_env: String,
    pub schema: String,
    pub page_size: u32,
    pub timeout: Duration,
    /// Delete orphans instead of stopping at the first one.
    pub fix: bool,
}

impl std::fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditConfig")
            .field("database_url", &self.database_url)
            .field("database_url_env", &self.database_url_env)
            .field("schema", &self.schema)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("fix", &self.fix)
            .finish()
    }
}

impl AuditConfig {
    /// Resolves the database URL from the env var named `database_url_env`.
    /// Errors mention the variable name only.
    pub fn from_env(database_url_env: &str) -> Result<Self> {
        Self::from_lookup(database_url_env, resolve_env)
    }

    pub fn from_lookup(
        database_url_env: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let Some(url) = lookup(database_url_env) else {
            bail!("AUDIT_DATABASE_URL_MISSING env={database_url_env}");
        };
        Ok(Self {
            database_url: Secret::new(url),
            database_url_env: database_url_env.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            page_size: DEFAULT_AUDIT_PAGE_SIZE,
            timeout: DEFAULT_AUDIT_TIMEOUT,
            fix: false,
        })
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fix(mut self, fix: bool) -> Self {
        self.fix = fix;
        self
    }

    pub fn database_url(&self) -> &str {
        self.database_url.expose()
    }

    /// Rejects settings the audit cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("audit page size must be positive");
        }
        if !is_identifier(&self.schema) {
            bail!("invalid schema name `{}`", self.schema);
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the only schema names interpolated into SQL.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "AUDIT_DB").then(|| "postgres://gwr:hunter2@db/gwr".to_string())
    }

    #[test]
    fn url_is_redacted_and_defaults_apply() {
        let cfg = AuditConfig::from_lookup("AUDIT_DB", lookup).unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("AUDIT_DB"));
        assert_eq!(cfg.schema, DEFAULT_SCHEMA);
        assert_eq!(cfg.page_size, DEFAULT_AUDIT_PAGE_SIZE);
        assert!(!cfg.fix);
        assert_eq!(cfg.database_url(), "postgres://gwr:hunter2@db/gwr");
    }

    #[test]
    fn missing_variable_names_the_variable_only() {
        let err = AuditConfig::from_lookup("OTHER", lookup).unwrap_err();
        assert!(err.to_string().contains("env=OTHER"));
    }

    #[test]
    fn validate_rejects_bad_schema_and_zero_page() {
        let cfg = AuditConfig::from_lookup("AUDIT_DB", lookup).unwrap();
        assert!(cfg.clone().validate().is_ok());
        assert!(cfg.clone().with_page_size(0).validate().is_err());
        assert!(cfg.with_schema("kong; drop table x").validate().is_err());
    }
}
