use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::{SaveTodosRequest, Task, TodoRecord};

#[derive(Debug, thiserror::Error)]
#[error("token source failed: {0}")]
pub struct TokenError(pub String);

/// Read-path failure. Absence of a record is not one of these; it comes back
/// as `Ok(None)` from `get_list`.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("error retrieving todo list: {0}")]
    Http(#[from] reqwest::Error),
    #[error("error retrieving todo list: server returned {0}")]
    Status(StatusCode),
}

/// Write-push failure. The store treats these as non-fatal: the local copy is
/// already written and the failure is only surfaced as a notification.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("error syncing todo list: {0}")]
    Http(#[from] reqwest::Error),
    #[error("error syncing todo list: server returned {0}")]
    Status(StatusCode),
}

/// Bearer-token capability supplied by the identity binding.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}

/// The two operations the backend exposes.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn get_list(&self) -> Result<Option<Vec<Task>>, RetrievalError>;
    async fn put_list(&self, list: &[Task]) -> Result<TodoRecord, SyncError>;
}

pub struct HttpRemote {
    base_url: String,
    http: reqwest::Client,
    tokens: CachedTokenSource,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpRemote {
            base_url,
            http: reqwest::Client::new(),
            tokens: CachedTokenSource::new(tokens),
        }
    }

    fn todos_url(&self) -> String {
        format!("{}/todos", self.base_url)
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn get_list(&self) -> Result<Option<Vec<Task>>, RetrievalError> {
        let token = self.tokens.token().await?;
        let resp = self
            .http
            .get(self.todos_url())
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            info!("no todo list stored yet");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(RetrievalError::Status(resp.status()));
        }

        let record: TodoRecord = resp.json().await?;
        Ok(Some(record.todo_list))
    }

    async fn put_list(&self, list: &[Task]) -> Result<TodoRecord, SyncError> {
        let token = self.tokens.token().await?;
        let resp = self
            .http
            .put(self.todos_url())
            .bearer_auth(token)
            .json(&SaveTodosRequest {
                todo_list: list.to_vec(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SyncError::Status(resp.status()));
        }

        Ok(resp.json().await?)
    }
}

struct CachedToken {
    token: String,
    expires_at: u64,
}

/// Caches tokens until their `exp` claim so every request does not round-trip
/// to the identity provider. Tokens without a readable `exp` are not cached.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
}

const EXPIRY_SKEW_SECS: u64 = 30;

impl CachedTokenSource {
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        CachedTokenSource {
            inner,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > unix_now() + EXPIRY_SKEW_SECS {
                return Ok(entry.token.clone());
            }
        }

        let token = self.inner.token().await?;
        *cached = token_expiry(&token).map(|expires_at| CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

/// Reads the `exp` claim without verifying the signature. The token is only
/// being cached here, not trusted; the server does the verification.
fn token_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    claims.get("exp")?.as_u64()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
