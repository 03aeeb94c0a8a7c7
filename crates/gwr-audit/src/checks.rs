use std::fmt;

use serde::Serialize;

/// Rule a row's reference count must satisfy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Expectation {
    AtLeast(i64),
    Exactly(i64),
}

impl Expectation {
    pub fn holds(&self, count: i64) -> bool {
        match *self {
            Expectation::AtLeast(n) => count >= n,
            Expectation::Exactly(n) => count == n,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::AtLeast(n) => write!(f, ">= {n}"),
            Expectation::Exactly(n) => write!(f, "== {n}"),
        }
    }
}

// A consumer must belong to a workspace.
pub const CONSUMER_WORKSPACE_REFS: Expectation = Expectation::AtLeast(1);
// A key-auth credential must point at an existing consumer.
pub const KEYAUTH_CONSUMER_REFS: Expectation = Expectation::AtLeast(1);
pub const PLUGIN_WORKSPACE_REFS: Expectation = Expectation::Exactly(1);
// Routes and services are registered under both their id and their name.
pub const ROUTE_WORKSPACE_REFS: Expectation = Expectation::Exactly(2);
pub const SERVICE_WORKSPACE_REFS: Expectation = Expectation::Exactly(2);

/// Where a row's references are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReferenceQuery {
    /// `workspace_entities` rows whose `entity_id` is the key.
    WorkspaceEntities,
    /// `consumers` rows whose `id` is the key.
    ConsumerById,
}

/// One audited table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableCheck {
    pub table: &'static str,
    /// Column holding the key the references are counted for.
    pub reference_column: &'static str,
    pub reference: ReferenceQuery,
    pub expect: Expectation,
    /// Partition qualifier for deletes, on backends that partition the table.
    pub partition: Option<&'static str>,
}

/// The tables audited, in audit order.
pub fn default_checks() -> Vec<TableCheck> {
    vec![
        TableCheck {
            table: "consumers",
            reference_column: "id",
            reference: ReferenceQuery::WorkspaceEntities,
            expect: CONSUMER_WORKSPACE_REFS,
            partition: None,
        },
        TableCheck {
            table: "keyauth_credentials",
            reference_column: "consumer_id",
            reference: ReferenceQuery::ConsumerById,
            expect: KEYAUTH_CONSUMER_REFS,
            partition: None,
        },
        TableCheck {
            table: "plugins",
            reference_column: "id",
            reference: ReferenceQuery::WorkspaceEntities,
            expect: PLUGIN_WORKSPACE_REFS,
            partition: None,
        },
        TableCheck {
            table: "routes",
            reference_column: "id",
            reference: ReferenceQuery::WorkspaceEntities,
            expect: ROUTE_WORKSPACE_REFS,
            partition: Some("routes"),
        },
        TableCheck {
            table: "services",
            reference_column: "id",
            reference: ReferenceQuery::WorkspaceEntities,
            expect: SERVICE_WORKSPACE_REFS,
            partition: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert!(CONSUMER_WORKSPACE_REFS.holds(3));
        assert!(!CONSUMER_WORKSPACE_REFS.holds(0));
        assert!(PLUGIN_WORKSPACE_REFS.holds(1));
        assert!(!PLUGIN_WORKSPACE_REFS.holds(2));
        assert!(!ROUTE_WORKSPACE_REFS.holds(1));
        assert!(!SERVICE_WORKSPACE_REFS.holds(3));
        assert_eq!(ROUTE_WORKSPACE_REFS.to_string(), "== 2");
    }

    #[test]
    fn audit_order_is_fixed() {
        let tables: Vec<_> = default_checks().iter().map(|c| c.table).collect();
        assert_eq!(
            tables,
            ["consumers", "keyauth_credentials", "plugins", "routes", "services"]
        );
        let routes = &default_checks()[3];
        assert_eq!(routes.partition, Some("routes"));
    }
}
