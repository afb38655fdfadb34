use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::middleware::AuthError;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Resolves a request's bearer token to a subject id.
pub enum Authenticator {
    /// Verify against the identity provider's published key set.
    Jwks(JwksVerifier),
    /// Accept exactly one token. Test servers use this.
    Static { token: String, subject: String },
    /// Authentication disabled: every request acts as a fixed subject,
    /// no header required.
    Bypass { subject: String },
}

impl Authenticator {
    pub async fn subject(&self, bearer: Option<&str>) -> Result<String, AuthError> {
        match self {
            Authenticator::Bypass { subject } => Ok(subject.clone()),
            Authenticator::Static { token, subject } => match bearer {
                Some(presented) if presented == token => Ok(subject.clone()),
                _ => Err(AuthError::Unauthorized),
            },
            Authenticator::Jwks(verifier) => {
                let token = bearer.ok_or(AuthError::Unauthorized)?;
                verifier.verify(token).await
            }
        }
    }
}

/// Verifies RS256 tokens against the provider's JWKS endpoint. The key set is
/// fetched lazily and refreshed whenever a token names an unknown `kid`.
pub struct JwksVerifier {
    jwks_url: String,
    issuer: String,
    audience: String,
    http: reqwest::Client,
    keys: RwLock<Option<JwkSet>>,
}

impl JwksVerifier {
    pub fn new(domain: &str, audience: &str) -> Self {
        JwksVerifier {
            jwks_url: format!("https://{domain}/.well-known/jwks.json"),
            issuer: format!("https://{domain}/"),
            audience: audience.to_string(),
            http: reqwest::Client::new(),
            keys: RwLock::new(None),
        }
    }

    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Unauthorized)?;
        let kid = header.kid.ok_or(AuthError::Unauthorized)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &key, &validation).map_err(|err| {
            warn!(%err, "token verification failed");
            AuthError::Unauthorized
        })?;

        data.claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::Unauthorized)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AuthError::Internal(format!("fetching jwks: {err}")))?
            .json()
            .await
            .map_err(|err| AuthError::Internal(format!("parsing jwks: {err}")))?;

        *self.keys.write().await = Some(set);

        match self.cached_key(kid).await {
            Some(key) => Ok(key),
            None => {
                warn!(kid, "token signed with a key the provider does not publish");
                Err(AuthError::Unauthorized)
            }
        }
    }

    async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        let keys = self.keys.read().await;
        let jwk = keys.as_ref()?.find(kid)?;
        DecodingKey::from_jwk(jwk).ok()
    }
}
