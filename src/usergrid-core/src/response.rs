//! Response model
//!
//! Every operation, successful or not, ends in a [`UsergridResponse`].
//! Failures are carried in [`UsergridResponse::error`] rather than as a
//! separate `Err` path so callback-style and `async` callers observe the
//! same shape.

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::entity::UsergridEntity;
use crate::registry::TypeRegistry;
use crate::user::UsergridUser;

/// Loads the page following `cursor`
pub type NextPageLoader = Arc<dyn Fn(String) -> BoxFuture<'static, UsergridResponse> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced an HTTP response
    Transport,
    /// The server answered with an error
    Protocol,
    /// The server answered 2xx with a body that could not be understood
    MalformedResponse,
    /// Rejected client-side before any network call
    Validation,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{name}: {description}")]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub name: String,
    pub description: String,
    pub exception: Option<String>,
}

impl ResponseError {
    pub fn new(kind: ErrorKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            exception: None,
        }
    }

    pub fn transport(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, "transport_error", description)
    }

    pub fn malformed(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, "malformed_response", description)
    }

    pub fn validation(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, name, description)
    }

    /// Error fields from a backend JSON body, if it carries any
    pub fn from_json(json: &Value) -> Option<Self> {
        let name = json.get("error").and_then(Value::as_str)?;
        Some(Self {
            kind: ErrorKind::Protocol,
            name: name.to_string(),
            description: json
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            exception: json
                .get("exception")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[derive(Clone, Default)]
pub struct UsergridResponse {
    pub status: Option<u16>,
    pub entities: Vec<UsergridEntity>,
    pub cursor: Option<String>,
    pub error: Option<ResponseError>,
    pub json: Option<Value>,
    next_page: Option<NextPageLoader>,
}

impl UsergridResponse {
    pub fn from_error(error: ResponseError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Interpret an HTTP status and body, hydrating entities through `registry`
    pub fn from_http(status: u16, body: &[u8], registry: &TypeRegistry) -> Self {
        let mut response = Self {
            status: Some(status),
            ..Self::default()
        };
        let success = (200..300).contains(&status);

        let json = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            match serde_json::from_slice::<Value>(body) {
                Ok(json) => Some(json),
                Err(e) if success => {
                    warn!("Response body is not valid JSON (status {}): {}", status, e);
                    response.error = Some(ResponseError::malformed(format!(
                        "response body is not valid JSON: {}",
                        e
                    )));
                    return response;
                }
                Err(_) => None,
            }
        };

        if let Some(json) = &json {
            response.error = ResponseError::from_json(json);
            if let Some(Value::Array(values)) = json.get("entities") {
                response.entities = registry.hydrate_all(values.clone());
            }
            response.cursor = json
                .get("cursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }

        if !success && response.error.is_none() {
            let detail = String::from_utf8_lossy(body).trim().to_string();
            let description = if detail.is_empty() {
                format!("HTTP status {}", status)
            } else {
                format!("HTTP status {}: {}", status, detail)
            };
            response.error = Some(ResponseError::new(ErrorKind::Protocol, "http_error", description));
        }

        response.json = json;
        response
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn first(&self) -> Option<&UsergridEntity> {
        self.entities.first()
    }

    pub fn last(&self) -> Option<&UsergridEntity> {
        self.entities.last()
    }

    /// Alias of [`first`](Self::first)
    pub fn entity(&self) -> Option<&UsergridEntity> {
        self.first()
    }

    pub fn users(&self) -> Vec<UsergridUser> {
        self.entities
            .iter()
            .filter(|e| e.is_user())
            .cloned()
            .map(UsergridUser::from_entity)
            .collect()
    }

    pub fn user(&self) -> Option<UsergridUser> {
        self.entities
            .iter()
            .find(|e| e.is_user())
            .cloned()
            .map(UsergridUser::from_entity)
    }

    pub fn has_next_page(&self) -> bool {
        self.cursor.is_some()
    }

    /// Attach the continuation used by [`load_next_page`](Self::load_next_page)
    pub fn with_next_page(mut self, loader: NextPageLoader) -> Self {
        self.next_page = Some(loader);
        self
    }

    /// Replay the originating query with this response's cursor
    pub async fn load_next_page(&self) -> UsergridResponse {
        match (&self.cursor, &self.next_page) {
            (Some(cursor), Some(loader)) => loader(cursor.clone()).await,
            _ => UsergridResponse::from_error(ResponseError::validation(
                "no_next_page",
                "There is no next page of results to load.",
            )),
        }
    }
}

impl fmt::Debug for UsergridResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsergridResponse")
            .field("status", &self.status)
            .field("entities", &self.entities.len())
            .field("cursor", &self.cursor)
            .field("error", &self.error)
            .field("has_next_page_loader", &self.next_page.is_some())
            .finish()
    }
}
