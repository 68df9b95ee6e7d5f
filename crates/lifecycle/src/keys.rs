//! Signing-key cache for the identity provider.
//!
//! Token verification itself happens outside this crate. What lives here is
//! the one piece of shared mutable state the service owns: the identity
//! provider's published key set. [`SigningKeyCache`] is an ordinary value
//! constructed at startup and handed to whoever verifies tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum spacing between refetches forced by unknown key ids.
pub const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Location of a Keycloak realm's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksConfig {
    /// Base URL of the Keycloak server, without a trailing slash.
    pub keycloak_url: String,
    /// Realm name.
    pub realm: String,
    /// Accepted signature algorithms.
    pub algorithms: Vec<String>,
}

impl JwksConfig {
    /// Creates a config accepting RS256.
    pub fn new(keycloak_url: impl Into<String>, realm: impl Into<String>) -> Self {
        let keycloak_url: String = keycloak_url.into();
        Self {
            keycloak_url: keycloak_url.trim_end_matches('/').to_string(),
            realm: realm.into(),
            algorithms: vec!["RS256".to_string()],
        }
    }

    /// URL of the realm's JSON Web Key Set.
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/certs",
            self.keycloak_url, self.realm
        )
    }

    /// Expected `iss` claim.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.keycloak_url, self.realm)
    }
}

/// One JSON Web Key. Only the fields needed to pick and use RSA keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key id.
    pub kid: String,
    /// Key type, e.g. `RSA`.
    pub kty: String,
    /// Algorithm, e.g. `RS256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use, e.g. `sig`.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// A JSON Web Key Set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys.
    #[serde(default)]
    pub keys: Vec<JsonWebKey>,
}

impl JwkSet {
    /// Finds a key by id.
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// Errors from key lookup.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The key set could not be retrieved.
    #[error("failed to fetch signing keys: {0}")]
    Fetch(String),

    /// No key with this id, even after a refetch.
    #[error("unknown signing key: {kid}")]
    UnknownKey {
        /// The requested key id.
        kid: String,
    },
}

/// Retrieves the current key set from the identity provider.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetches the key set.
    async fn fetch(&self) -> Result<JwkSet, KeyError>;
}

#[async_trait]
impl<T: KeySetFetcher + ?Sized> KeySetFetcher for Arc<T> {
    async fn fetch(&self) -> Result<JwkSet, KeyError> {
        (**self).fetch().await
    }
}

fn unknown_key(kid: &str) -> KeyError {
    KeyError::UnknownKey {
        kid: kid.to_string(),
    }
}

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// TTL cache over a [`KeySetFetcher`].
///
/// Concurrent callers that find the cache stale wait on one fetch rather
/// than each fetching. A lookup for an unknown `kid` forces one refetch to
/// pick up rotated keys, at most once per minimum refetch interval.
pub struct SigningKeyCache<F: KeySetFetcher> {
    fetcher: F,
    ttl: Duration,
    min_refetch_interval: Duration,
    state: Mutex<Option<CachedKeys>>,
}

impl<F: KeySetFetcher> std::fmt::Debug for SigningKeyCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("ttl", &self.ttl)
            .field("min_refetch_interval", &self.min_refetch_interval)
            .finish_non_exhaustive()
    }
}

impl<F: KeySetFetcher> SigningKeyCache<F> {
    /// Creates an empty cache.
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
            state: Mutex::new(None),
        }
    }

    /// Sets how soon after a fetch an unknown `kid` may trigger another.
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Returns the cached key set, fetching it if absent or expired.
    pub async fn key_set(&self) -> Result<Arc<JwkSet>, KeyError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.keys));
            }
        }
        self.refresh(&mut state).await
    }

    /// Returns the key with id `kid`.
    pub async fn key(&self, kid: &str) -> Result<JsonWebKey, KeyError> {
        let keys = self.key_set().await?;
        if let Some(key) = keys.find(kid) {
            return Ok(key.clone());
        }

        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            // Another caller may have refetched while we waited.
            if let Some(key) = cached.keys.find(kid) {
                return Ok(key.clone());
            }
            if cached.fetched_at.elapsed() < self.min_refetch_interval {
                tracing::debug!(kid, "Unknown signing key, refetch throttled");
                return Err(unknown_key(kid));
            }
        }

        tracing::debug!(kid, "Unknown signing key, refetching");
        let keys = self.refresh(&mut state).await?;
        keys.find(kid).cloned().ok_or_else(|| unknown_key(kid))
    }

    /// Drops the cached key set; the next lookup fetches.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    async fn refresh(&self, state: &mut Option<CachedKeys>) -> Result<Arc<JwkSet>, KeyError> {
        let keys = Arc::new(self.fetcher.fetch().await?);
        *state = Some(CachedKeys {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}
