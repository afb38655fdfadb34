use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::FromRequestParts, Json};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// The authenticated subject id, extracted from the request's bearer token.
pub struct Subject(pub String);

impl FromRequestParts<AppState> for Subject {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = bearer_token(parts);
        match state.auth.subject(bearer.as_deref()).await {
            Ok(subject) => Ok(Subject(subject)),
            Err(err) => {
                warn!("Unauthorized API access attempt");
                Err(err)
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

pub enum AuthError {
    Unauthorized,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthorized" })),
            )
                .into_response(),
            AuthError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": msg })),
            )
                .into_response(),
        }
    }
}
