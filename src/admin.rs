use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use tracing::warn;

use crate::config::AdminAccount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
    pub name: String,
}

/// Decides whether a presented API key belongs to an administrator.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn authenticate(&self, key: &str) -> Option<Admin>;
}

/// Admin accounts listed in the configuration file, keys stored as bcrypt hashes.
pub struct ConfigAdminService {
    accounts: Vec<AdminAccount>,
}

impl ConfigAdminService {
    pub fn new(accounts: Vec<AdminAccount>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl AdminService for ConfigAdminService {
    async fn authenticate(&self, key: &str) -> Option<Admin> {
        if key.is_empty() || self.accounts.is_empty() {
            return None;
        }

        let key = key.to_string();
        let accounts = self.accounts.clone();
        let matched = tokio::task::spawn_blocking(move || {
            accounts.into_iter().find(|account| {
                bcrypt::verify(&key, &account.key_hash).unwrap_or_else(|e| {
                    warn!("Invalid key hash for admin {}: {}", account.name, e);
                    false
                })
            })
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Admin key verification aborted: {}", e);
            None
        });

        matched.map(|account| Admin { name: account.name })
    }
}

/// The admin key presented with a request, if any: `X-Admin-Key`, or
/// `Authorization: Bearer <key>`.
#[derive(Debug, Clone, Default)]
pub struct AdminKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for AdminKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        if let Some(key) = headers.get("X-Admin-Key").and_then(|h| h.to_str().ok()) {
            return Ok(AdminKey(Some(key.trim().to_string())));
        }

        let bearer = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|k| k.trim().to_string());

        Ok(AdminKey(bearer))
    }
}
