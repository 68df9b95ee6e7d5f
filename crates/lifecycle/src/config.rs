//! Service configuration.
//!
//! Supports both programmatic configuration and environment variable
//! overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NFC_DATABASE_URL` | nfc.db | SQLite path or `:memory:` |
//! | `NFC_LOG_LEVEL` | info | Log level |
//! | `NFC_DEFAULT_PAGE_SIZE` | 20 | Listing page size when none is given |
//! | `NFC_MAX_PAGE_SIZE` | 100 | Upper clamp for listing page size |
//! | `NFC_EVENT_BUFFER` | 1024 | Inbound deliveries queued ahead of the reconciliation listener |
//! | `NFC_CONSUMER_ENABLED` | true | Run the reconciliation listener |
//! | `NFC_LISTENER_MAX_ATTEMPTS` | 5 | Deliveries before dead-lettering |
//! | `NFC_LISTENER_RETRY_DELAY` | 1s | Delay before redelivery |
//! | `KEYCLOAK_URL` | (unset) | Identity provider base URL |
//! | `KEYCLOAK_REALM` | (unset) | Identity provider realm |
//! | `NFC_JWKS_TTL` | 15m | Signing-key cache lifetime |
//!
//! # Example
//!
//! ```rust
//! use nfc_lifecycle::ServiceConfig;
//!
//! let config = ServiceConfig {
//!     database_url: ":memory:".to_string(),
//!     max_page_size: 50,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use crate::engine::EngineConfig;
use crate::keys::JwksConfig;
use crate::reconcile::{Delivery, ListenerConfig};

/// Configuration for the NFC tag service.
#[derive(Debug, Clone, Parser)]
#[command(name = "nfc-service")]
#[command(about = "NFC tag lifecycle service")]
pub struct ServiceConfig {
    /// SQLite database path, or `:memory:`.
    #[arg(long, env = "NFC_DATABASE_URL", default_value = "nfc.db")]
    pub database_url: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "NFC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Default page size for tag listings.
    #[arg(long, env = "NFC_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: usize,

    /// Maximum page size for tag listings.
    #[arg(long, env = "NFC_MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: usize,

    /// Inbound deliveries queued ahead of the reconciliation listener.
    #[arg(long, env = "NFC_EVENT_BUFFER", default_value = "1024")]
    pub event_buffer: usize,

    /// Run the reconciliation listener.
    #[arg(long, env = "NFC_CONSUMER_ENABLED", default_value = "true")]
    pub consumer_enabled: bool,

    /// Deliveries of one inbound event before it is dead-lettered.
    #[arg(long, env = "NFC_LISTENER_MAX_ATTEMPTS", default_value = "5")]
    pub listener_max_attempts: u32,

    /// Delay before a failed inbound event is redelivered (e.g. `500ms`, `2s`).
    #[arg(
        long,
        env = "NFC_LISTENER_RETRY_DELAY",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    pub listener_retry_delay: Duration,

    /// Keycloak base URL.
    #[arg(long, env = "KEYCLOAK_URL")]
    pub keycloak_url: Option<String>,

    /// Keycloak realm.
    #[arg(long, env = "KEYCLOAK_REALM")]
    pub keycloak_realm: Option<String>,

    /// How long fetched signing keys are trusted.
    #[arg(
        long,
        env = "NFC_JWKS_TTL",
        default_value = "15m",
        value_parser = humantime::parse_duration
    )]
    pub jwks_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "nfc.db".to_string(),
            log_level: "info".to_string(),
            default_page_size: 20,
            max_page_size: 100,
            event_buffer: 1024,
            consumer_enabled: true,
            listener_max_attempts: 5,
            listener_retry_delay: Duration::from_secs(1),
            keycloak_url: None,
            keycloak_realm: None,
            jwks_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl ServiceConfig {
    /// Creates a new ServiceConfig from environment variables.
    pub fn from_env() -> Self {
        // Try to parse from environment, falling back to defaults
        Self::try_parse().unwrap_or_default()
    }

    /// Returns `true` for an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.database_url == ":memory:"
    }

    /// Paging limits for the engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    /// Retry policy for the reconciliation listener.
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_attempts: self.listener_max_attempts,
            retry_delay: self.listener_retry_delay,
        }
    }

    /// Bounded channel feeding the reconciliation listener.
    pub fn delivery_channel(&self) -> (mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
        mpsc::channel(self.event_buffer.max(1))
    }

    /// Signing-key location, when both URL and realm are set.
    pub fn jwks_config(&self) -> Option<JwksConfig> {
        match (&self.keycloak_url, &self.keycloak_realm) {
            (Some(url), Some(realm)) => Some(JwksConfig::new(url.clone(), realm.clone())),
            _ => None,
        }
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database_url.trim().is_empty() {
            errors.push("Database URL cannot be empty".to_string());
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if self.event_buffer == 0 {
            errors.push("Event buffer cannot be 0".to_string());
        }

        if self.listener_max_attempts == 0 {
            errors.push("Listener max attempts cannot be 0".to_string());
        }

        if self.keycloak_url.is_some() != self.keycloak_realm.is_some() {
            errors.push("KEYCLOAK_URL and KEYCLOAK_REALM must be set together".to_string());
        }

        if self.jwks_ttl.is_zero() {
            errors.push("JWKS TTL cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Uses an in-memory database and retries without delay.
    pub fn for_testing() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            log_level: "debug".to_string(),
            default_page_size: 10,
            max_page_size: 100,
            event_buffer: 64,
            consumer_enabled: true,
            listener_max_attempts: 3,
            listener_retry_delay: Duration::ZERO,
            keycloak_url: None,
            keycloak_realm: None,
            jwks_ttl: Duration::from_secs(60),
        }
    }
}
