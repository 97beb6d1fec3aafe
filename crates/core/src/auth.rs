//! Identity types and API key validation.
//!
//! This module provides:
//! - API key format checks before any remote lookup
//! - Request/response types for the identity service
//! - The [`IdentityResolver`] seam used by the gateway

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{AuthErrorCode, Error, Result};

/// Accepted API key shape: 8-128 URL-safe characters.
pub const API_KEY_PATTERN: &str = r"^[A-Za-z0-9_\-]{8,128}$";

static API_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(API_KEY_PATTERN).expect("invalid API key pattern"));

/// API key taken from a request, checked for shape only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    /// Parse a caller-supplied key.
    ///
    /// Empty keys are `AUTH_001`. Keys that cannot exist are `AUTH_002`
    /// without a round trip to the identity service.
    pub fn parse(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::unauthorized(AuthErrorCode::MissingKey, "API key is required"));
        }
        if !API_KEY_REGEX.is_match(key) {
            return Err(Error::unauthorized(AuthErrorCode::UnknownKey, "Invalid API key"));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tenant an API key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub active: bool,
}

/// Body posted to the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub api_key: String,
}

/// Identity service answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ResolveResponse {
    /// Convert to an identity, mapping invalid and inactive keys to errors.
    pub fn into_identity(self) -> Result<UserIdentity> {
        let user_id = match (self.valid, self.user_id) {
            (true, Some(user_id)) if !user_id.is_empty() => user_id,
            _ => {
                return Err(Error::unauthorized(AuthErrorCode::UnknownKey, "Invalid API key"));
            }
        };
        if !self.active {
            return Err(Error::unauthorized(
                AuthErrorCode::InactiveKey,
                "API key belongs to an inactive account",
            ));
        }
        Ok(UserIdentity {
            user_id,
            active: true,
        })
    }
}

/// Resolves API keys to tenants.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a key to an active tenant.
    async fn resolve(&self, key: &ApiKey) -> Result<UserIdentity>;

    /// Drop any cached answer for a key.
    async fn invalidate(&self, _key: &ApiKey) {}
}
