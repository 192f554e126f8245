//! Default outgoing Authorization value
//!
//! One instance per client, shared with its refresh coordinator. A
//! successful refresh or sign-in replaces the token here, so every new
//! request picks it up; nothing is process-global.

use std::sync::{PoisonError, RwLock};

use common::Secret;
use reqwest::header::HeaderValue;

#[derive(Debug, Default)]
pub struct DefaultAuthorization {
    token: RwLock<Option<Secret<String>>>,
}

impl DefaultAuthorization {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.map(Secret::new)),
        }
    }

    /// The current access token, if any.
    pub fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose().clone())
    }

    pub fn set(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(Secret::from(token));
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// `Bearer <token>` header value, marked sensitive so it never shows in logs.
pub fn bearer_value(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}
