//! Read-only HTTP endpoints around the hub.
//!
//! Responses use the envelope `{ "data": ..., "success": true }`, or
//! `{ "error": "...", "success": false }` on failure.

use crate::handlers::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chatter_core::{AuthError, Identity, Message, StoreError};
use chatter_protocol::UserId;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Routes mounted under `/api/v1`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(profile))
        .route("/messages/:user_id", get(history))
        .route("/people", get(people))
}

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub success: bool,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            data,
            success: true,
        })
    }
}

/// HTTP API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Storage(e) => {
                error!(error = %e, "Store query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "success": false,
        });
        (status, Json(body)).into_response()
    }
}

/// The verified identity of the caller.
pub struct Authenticated(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.authenticate(&parts.headers, parts.uri.query())?;
        Ok(Authenticated(identity))
    }
}

async fn profile(Authenticated(identity): Authenticated) -> Json<Envelope<Identity>> {
    Envelope::ok(identity)
}

/// Conversation between the caller and `user_id`, oldest first.
async fn history(
    State(state): State<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    Path(user_id): Path<String>,
) -> Result<Json<Envelope<Vec<Message>>>, ApiError> {
    let messages = state
        .store
        .query(&identity.user_id, &UserId::new(user_id))
        .await?;
    Ok(Envelope::ok(messages))
}

async fn people(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<Vec<Identity>>>, ApiError> {
    Ok(Envelope::ok(state.store.known_users().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        let response = ApiError::from(AuthError::MissingCredential).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response =
            ApiError::from(StoreError::Unavailable("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_envelope_shape() {
        let Json(envelope) = Envelope::ok(Identity::new("u1", "alice"));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            serde_json::json!({
                "data": { "userId": "u1", "username": "alice" },
                "success": true,
            })
        );
    }
}
