//! gwr-admin-http
//!
//! [`AdminApi`] over the gateway's admin REST API.
//!
//! - `PUT /{collection}/{id}` when the entity has an id (create-or-replace),
//!   `POST /{collection}` otherwise.
//! - `DELETE /{collection}/{id}`; 404 maps to [`AdminError::NotFound`].
//! - `GET /{collection}?size=N[&offset=..]`, following `offset` until the
//!   server stops returning one.
//! - Targets live under `/upstreams/{upstream}/targets`.
//!
//! No retries. Every request carries the configured timeout.

use std::time::Duration;

use gwr_execution::{AdminApi, AdminError};
use gwr_schemas::{Entity, EntityKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct HttpAdmin {
    base_url: String,
    http: reqwest::Client,
    page_size: usize,
}

impl HttpAdmin {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AdminError> {
        Self::new_with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn new_with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdminError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdminError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Collection path the entity lives under.
    fn collection_path(entity: &Entity) -> Result<String, AdminError> {
        match entity {
            Entity::Target(t) => {
                let upstream = t
                    .upstream
                    .as_ref()
                    .and_then(|u| u.key())
                    .ok_or_else(|| {
                        AdminError::Unsupported(format!("target `{}` has no upstream", t.target))
                    })?;
                Ok(format!("/upstreams/{upstream}/targets"))
            }
            other => Ok(format!("/{}", other.kind().collection())),
        }
    }

    async fn fetch_all(&self, kind: EntityKind, path: &str) -> Result<Vec<Entity>, AdminError> {
        let mut out = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query = vec![("size", self.page_size.to_string())];
            if let Some(o) = &offset {
                query.push(("offset", o.clone()));
            }
            let resp = self
                .http
                .get(self.url(path))
                .query(&query)
                .send()
                .await
                .map_err(transport)?;
            let body = check(kind, path, resp).await?;
            let page: Page = serde_json::from_value(body)
                .map_err(|e| AdminError::Decode(format!("{path} page: {e}")))?;
            for v in page.data {
                out.push(decode(kind, v)?);
            }
            match page.offset.filter(|o| !o.is_empty()) {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    offset: Option<String>,
}

/// Request body: payload without id or server fields, associations reduced
/// to `{"id": ..}` when the id is known.
fn wire_body(entity: &Entity) -> Value {
    let mut body = entity.payload_value();
    if let Value::Object(map) = &mut body {
        for assoc in entity.associations() {
            let Some(r) = assoc.reference else { continue };
            if let Some(id) = &r.id {
                let mut only_id = Map::new();
                only_id.insert("id".to_string(), Value::String(id.clone()));
                map.insert(assoc.field.to_string(), Value::Object(only_id));
            }
        }
    }
    body
}

fn transport(e: reqwest::Error) -> AdminError {
    AdminError::Transport(e.to_string())
}

fn decode(kind: EntityKind, value: Value) -> Result<Entity, AdminError> {
    Entity::from_kind_value(kind, value).map_err(|e| AdminError::Decode(format!("{kind}: {e}")))
}

/// Status handling shared by every call. Returns the JSON body (or `null`
/// for empty bodies).
async fn check(kind: EntityKind, key: &str, resp: reqwest::Response) -> Result<Value, AdminError> {
    let status = resp.status();
    let text = resp.text().await.map_err(transport)?;
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AdminError::NotFound {
            kind,
            key: key.to_string(),
        });
    }
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        return Err(AdminError::Http {
            status: status.as_u16(),
            message,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| AdminError::Decode(format!("{kind} response: {e}")))
}

#[async_trait::async_trait]
impl AdminApi for HttpAdmin {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create(&self, entity: &Entity) -> Result<Entity, AdminError> {
        let kind = entity.kind();
        let collection = Self::collection_path(entity)?;
        let body = wire_body(entity);
        let req = match entity.id() {
            Some(id) => self.http.put(self.url(&format!("{collection}/{id}"))),
            None => self.http.post(self.url(&collection)),
        };
        debug!(%entity, "admin create");
        let resp = req.json(&body).send().await.map_err(transport)?;
        let value = check(kind, &entity.identity(), resp).await?;
        decode(kind, value)
    }

    async fn delete(&self, entity: &Entity) -> Result<(), AdminError> {
        let kind = entity.kind();
        let id = entity.id().ok_or_else(|| AdminError::NotFound {
            kind,
            key: entity.identity(),
        })?;
        let path = format!("{}/{id}", Self::collection_path(entity)?);
        debug!(%entity, "admin delete");
        let resp = self
            .http
            .delete(self.url(&path))
            .send()
            .await
            .map_err(transport)?;
        check(kind, id, resp).await.map(|_| ())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>, AdminError> {
        let out = match kind {
            EntityKind::Target => {
                let mut targets = Vec::new();
                for upstream in self.fetch_all(EntityKind::Upstream, "/upstreams").await? {
                    let Some(id) = upstream.id() else { continue };
                    let path = format!("/upstreams/{id}/targets");
                    targets.extend(self.fetch_all(EntityKind::Target, &path).await?);
                }
                targets
            }
            other => {
                let path = format!("/{}", other.collection());
                self.fetch_all(other, &path).await?
            }
        };
        info!(kind = %kind, count = out.len(), "listed");
        Ok(out)
    }
}
