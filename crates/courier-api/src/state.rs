//! # Application State
//!
//! Shared state handed to every handler: the lifecycle service over the
//! configured repository, and the runtime configuration.

use std::sync::Arc;

use crate::gateway::GatewayConfig;
use crate::lifecycle::LifecycleService;
use crate::repo::{MemoryRepository, ShipmentRepository};

/// Application configuration.
///
/// `Debug` redacts the auth token; gateway secrets redact themselves.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    pub gateway: GatewayConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub lifecycle: LifecycleService,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory state with the given configuration.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_repository(Arc::new(MemoryRepository::new()), config)
    }

    pub fn with_repository(repo: Arc<dyn ShipmentRepository>, config: AppConfig) -> Self {
        Self {
            lifecycle: LifecycleService::new(repo),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_8080_without_auth() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_none());
        assert!(config.gateway.key_secret.is_none());
    }

    #[test]
    fn config_debug_redacts_secrets() {
        let config = AppConfig {
            port: 9000,
            auth_token: Some("tok3n".into()),
            gateway: GatewayConfig {
                key_secret: Some("k3y".into()),
                webhook_secret: None,
            },
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("9000"));
        assert!(!debug.contains("tok3n"));
        assert!(!debug.contains("k3y"));
    }
}
