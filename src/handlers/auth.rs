//! Request authentication via `X-ClientId` / `X-Token` headers.

use crate::{AppState, errors::AppError};
use axum::{extract::FromRequestParts, http::request::Parts};

pub const CLIENT_ID_HEADER: &str = "x-clientid";
pub const TOKEN_HEADER: &str = "x-token";

/// Extractor that only succeeds for requests carrying a valid client token.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient(pub String);

impl FromRequestParts<AppState> for AuthenticatedClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        };
        let (Some(client_id), Some(token)) = (header(CLIENT_ID_HEADER), header(TOKEN_HEADER))
        else {
            return Err(AppError::unauthorized("Unauthorized"));
        };

        if let Err(err) = state.authorizer.authorize(client_id, token) {
            tracing::debug!(client = client_id, "rejected request: {}", err);
            return Err(err.into());
        }

        tracing::debug!(client = client_id, "client authorized");
        Ok(AuthenticatedClient(client_id.to_string()))
    }
}
