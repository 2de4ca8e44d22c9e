//! Access tokens for the warehouse.
//!
//! Google access tokens live about an hour, so the client asks its
//! [`TokenSource`] before every request instead of holding one string.

use std::path::Path;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use tracing::debug;

use crate::assistant::core::config::{Secret, WarehouseConfig};
use crate::assistant::core::errors::{ConfigError, WarehouseError, WarehouseResult};

use super::WarehouseFuture;

/// Read-only BigQuery scope.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery.readonly";

/// Supplies a bearer token for each warehouse request.
pub trait TokenSource: Send + Sync {
    /// Return a token that is valid now.
    fn token(&self) -> WarehouseFuture<'_, WarehouseResult<Secret>>;
}

/// A fixed token, for short sessions and local runs.
pub struct StaticToken(Secret);

impl StaticToken {
    /// Wrap a fixed token.
    #[must_use]
    pub const fn new(token: Secret) -> Self {
        Self(token)
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> WarehouseFuture<'_, WarehouseResult<Secret>> {
        let token = self.0.clone();
        Box::pin(async move { Ok(token) })
    }
}

/// Tokens minted from a service-account key file.
///
/// `gcp_auth` caches the current token and signs a new one shortly before
/// it expires.
pub struct ServiceAccountTokens {
    account: CustomServiceAccount,
}

impl ServiceAccountTokens {
    /// Load a service-account key file.
    ///
    /// # Errors
    /// Returns an error if the file is missing or is not a service-account key.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let account = CustomServiceAccount::from_file(path)
            .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?;
        Ok(Self { account })
    }
}

impl TokenSource for ServiceAccountTokens {
    fn token(&self) -> WarehouseFuture<'_, WarehouseResult<Secret>> {
        Box::pin(async move {
            let token = self
                .account
                .token(&[BIGQUERY_SCOPE])
                .await
                .map_err(|e| WarehouseError::Credentials(e.to_string()))?;
            debug!(expires_at = ?token.expires_at(), "warehouse token ready");
            Ok(Secret::new(token.as_str()))
        })
    }
}

/// Pick the token source for a configuration: the key file when set, the
/// fixed token otherwise.
///
/// # Errors
/// Returns an error if neither is configured or the key file is unusable.
pub fn token_source(config: &WarehouseConfig) -> Result<Box<dyn TokenSource>, ConfigError> {
    if let Some(path) = &config.credentials_path {
        return Ok(Box::new(ServiceAccountTokens::from_file(path)?));
    }
    config
        .access_token
        .clone()
        .map(|token| Box::new(StaticToken::new(token)) as Box<dyn TokenSource>)
        .ok_or(ConfigError::Missing("warehouse.credentials_path"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[tokio::test]
    async fn static_token_is_returned_as_is() {
        let source = StaticToken::new(Secret::new("jeton"));
        assert_eq!(source.token().await.unwrap().expose(), "jeton");
    }

    #[test]
    fn nothing_configured_is_missing() {
        assert!(matches!(
            token_source(&WarehouseConfig::default()),
            Err(ConfigError::Missing("warehouse.credentials_path"))
        ));
    }

    #[test]
    fn unreadable_key_file_is_a_config_error() {
        let config = WarehouseConfig {
            credentials_path: Some(PathBuf::from("/nonexistent/docteur/sa.json")),
            access_token: Some(Secret::new("ignored")),
            ..WarehouseConfig::default()
        };
        match token_source(&config) {
            Err(ConfigError::Credentials(message)) => assert!(message.contains("sa.json")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("key file should not load"),
        }
    }
}
