//! Client authentication with hour-windowed shared-secret tokens.
//!
//! A client proves knowledge of its secret by presenting
//! `hex(sha256(client_id ‖ secret ‖ label))`, where `label` names the
//! current local hour as `"{year}:{month0}:{day}:{hour}"` (`month0` counts
//! from zero). Tokens for the current and the preceding hour are accepted,
//! which tolerates clock skew of just under two hours.

use chrono::{Datelike, Local, NaiveDateTime, TimeDelta, Timelike};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, path::Path, sync::Arc};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown client `{0}`")]
    UnknownClient(String),
    #[error("invalid token")]
    InvalidToken,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot read credentials file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credentials: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable client id → shared secret mapping.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    secrets: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    /// Parse a JSON object of `{ "client_id": "secret", ... }`.
    pub fn from_json(text: &str) -> Result<Self, CredentialError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// Read and parse the credentials file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CredentialError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&text)
    }

    pub fn secret(&self, client_id: &str) -> Option<&str> {
        self.secrets.get(client_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// Label naming the local hour that contains `at`.
pub fn window_label(at: &NaiveDateTime) -> String {
    format!("{}:{}:{}:{}", at.year(), at.month0(), at.day(), at.hour())
}

/// Token for `client_id` holding `secret` during the window named by `label`.
pub fn compute_token(client_id: &str, secret: &str, label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(label.as_bytes());
    hex::encode(hasher.finalize())
}

fn tokens_equal(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[derive(Clone)]
pub struct Authorizer {
    credentials: Arc<CredentialStore>,
}

impl Authorizer {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Check `token` for `client_id` against the current local time.
    pub fn authorize(&self, client_id: &str, token: &str) -> Result<(), AuthError> {
        self.authorize_at(client_id, token, Local::now().naive_local())
    }

    /// Check `token` as if the local wall clock read `now`.
    ///
    /// The preceding window is found by subtracting a full hour, so just
    /// after midnight it is the previous day's hour 23.
    pub fn authorize_at(
        &self,
        client_id: &str,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<(), AuthError> {
        let secret = self
            .credentials
            .secret(client_id)
            .ok_or_else(|| AuthError::UnknownClient(client_id.to_string()))?;

        let previous = now - TimeDelta::hours(1);
        let accepted = [now, previous]
            .iter()
            .map(|at| compute_token(client_id, secret, &window_label(at)))
            .any(|expected| tokens_equal(&expected, token));

        if accepted {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }

    pub fn client_count(&self) -> usize {
        self.credentials.len()
    }

    /// The token `client_id` should present at `at`, if the client is known.
    pub fn issue_token(&self, client_id: &str, at: NaiveDateTime) -> Option<String> {
        let secret = self.credentials.secret(client_id)?;
        Some(compute_token(client_id, secret, &window_label(&at)))
    }
}
