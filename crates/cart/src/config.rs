//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPEZ_FIREBASE_DATABASE_URL` - Realtime Database root
//!   (e.g., `https://shopez-fcad8-default-rtdb.firebaseio.com`)
//!
//! ## Optional
//! - `SHOPEZ_FIREBASE_ID_TOKEN` - ID token appended as `?auth=` to store requests
//! - `SHOPEZ_USER_ID` - Signed-in user for CLI sessions
//! - `SHOPEZ_CATALOG_URL` - Catalog API root (default: `https://fakestoreapi.com`)
//! - `SHOPEZ_CURRENCY` - Display currency (default: USD)
//! - `SHOPEZ_RESUBSCRIBE_INITIAL_MS` - First resubscribe delay (default: 250)
//! - `SHOPEZ_RESUBSCRIBE_MAX_MS` - Resubscribe delay cap (default: 30000)
//! - `SHOPEZ_KEEPALIVE_TIMEOUT_SECS` - Max silence on a live stream (default: 60)
//! - `SHOPEZ_REQUEST_TIMEOUT_SECS` - Deadline for point reads and writes (default: 15)

use std::time::Duration;

use secrecy::SecretString;
use shopez_core::{CurrencyCode, UserId};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_CATALOG_URL: &str = "https://fakestoreapi.com";
const DEFAULT_RESUBSCRIBE_INITIAL_MS: u64 = 250;
const DEFAULT_RESUBSCRIBE_MAX_MS: u64 = 30_000;
const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Top-level configuration for a cart session.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// Remote cart store
    pub firebase: FirebaseConfig,
    /// Product catalog
    pub catalog: CatalogConfig,
    /// Subscription and resubscription behaviour
    pub sync: SyncConfig,
    /// Currency used when presenting prices
    pub currency: CurrencyCode,
    /// User to act as, when running outside an app session
    pub user_id: Option<UserId>,
}

/// Firebase Realtime Database configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Database root URL
    pub database_url: Url,
    /// ID token for authenticated access
    pub auth_token: Option<SecretString>,
    /// Longest silence tolerated on a live stream before reconnecting
    pub keepalive_timeout: Duration,
    /// Deadline for a single get, put or delete, body included
    pub request_timeout: Duration,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("database_url", &self.database_url.as_str())
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("keepalive_timeout", &self.keepalive_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Product catalog configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// API root
    pub base_url: Url,
    /// How long fetched products stay cached
    pub cache_ttl: Duration,
}

/// Subscription behaviour.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Resubscription delays after a lost or refused subscription
    pub backoff: BackoffConfig,
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_RESUBSCRIBE_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RESUBSCRIBE_MAX_MS),
            multiplier: 2,
        }
    }
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!(error = %e, "no .env file loaded");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let firebase = FirebaseConfig {
            database_url: vars.url("SHOPEZ_FIREBASE_DATABASE_URL", None)?,
            auth_token: vars.optional("SHOPEZ_FIREBASE_ID_TOKEN").map(SecretString::from),
            keepalive_timeout: Duration::from_secs(
                vars.number("SHOPEZ_KEEPALIVE_TIMEOUT_SECS", DEFAULT_KEEPALIVE_TIMEOUT_SECS)?,
            ),
            request_timeout: Duration::from_secs(vars.positive(
                "SHOPEZ_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        };

        let catalog = CatalogConfig {
            base_url: vars.url("SHOPEZ_CATALOG_URL", Some(DEFAULT_CATALOG_URL))?,
            cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
        };

        let initial = vars.number("SHOPEZ_RESUBSCRIBE_INITIAL_MS", DEFAULT_RESUBSCRIBE_INITIAL_MS)?;
        let max = vars.number("SHOPEZ_RESUBSCRIBE_MAX_MS", DEFAULT_RESUBSCRIBE_MAX_MS)?;
        if initial == 0 || max < initial {
            return Err(ConfigError::InvalidEnvVar(
                "SHOPEZ_RESUBSCRIBE_MAX_MS".to_string(),
                format!("must be >= SHOPEZ_RESUBSCRIBE_INITIAL_MS ({initial}) and non-zero"),
            ));
        }
        let sync = SyncConfig {
            backoff: BackoffConfig {
                initial: Duration::from_millis(initial),
                max: Duration::from_millis(max),
                ..BackoffConfig::default()
            },
        };

        let currency = match vars.optional("SHOPEZ_CURRENCY") {
            Some(code) => code
                .parse::<CurrencyCode>()
                .map_err(|e| ConfigError::InvalidEnvVar("SHOPEZ_CURRENCY".to_string(), e))?,
            None => CurrencyCode::default(),
        };

        let user_id = vars
            .optional("SHOPEZ_USER_ID")
            .filter(|id| !id.trim().is_empty())
            .map(UserId::new);

        Ok(Self {
            firebase,
            catalog,
            sync,
            currency,
            user_id,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Get an optional variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Get a URL variable, falling back to `default` when unset.
    fn url(&self, key: &str, default: Option<&str>) -> Result<Url, ConfigError> {
        let raw = self
            .optional(key)
            .or_else(|| default.map(str::to_string))
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;

        let url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("expected an http(s) URL, got {raw}"),
            ));
        }
        Ok(url)
    }

    /// Get a numeric variable with a default value.
    fn number(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Get a numeric variable that must be above zero.
    fn positive(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.number(key, default)? {
            0 => Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            )),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<CartSyncConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CartSyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const DB: (&str, &str) = (
        "SHOPEZ_FIREBASE_DATABASE_URL",
        "https://shopez-fcad8-default-rtdb.firebaseio.com",
    );

    #[test]
    fn test_defaults() {
        let config = load(&[DB]).unwrap();
        assert_eq!(config.catalog.base_url.as_str(), "https://fakestoreapi.com/");
        assert_eq!(config.sync.backoff, BackoffConfig::default());
        assert_eq!(config.currency, CurrencyCode::USD);
        assert!(config.user_id.is_none());
        assert!(config.firebase.auth_token.is_none());
        assert_eq!(config.firebase.keepalive_timeout, Duration::from_secs(60));
        assert_eq!(config.firebase.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_request_timeout_override() {
        let config = load(&[DB, ("SHOPEZ_REQUEST_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(config.firebase.request_timeout, Duration::from_secs(3));

        let err = load(&[DB, ("SHOPEZ_REQUEST_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "SHOPEZ_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SHOPEZ_FIREBASE_DATABASE_URL"));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = load(&[("SHOPEZ_FIREBASE_DATABASE_URL", "ftp://example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_backoff_overrides() {
        let config = load(&[
            DB,
            ("SHOPEZ_RESUBSCRIBE_INITIAL_MS", "10"),
            ("SHOPEZ_RESUBSCRIBE_MAX_MS", "40"),
        ])
        .unwrap();
        assert_eq!(config.sync.backoff.initial, Duration::from_millis(10));
        assert_eq!(config.sync.backoff.max, Duration::from_millis(40));
    }

    #[test]
    fn test_backoff_max_below_initial_is_invalid() {
        let result = load(&[
            DB,
            ("SHOPEZ_RESUBSCRIBE_INITIAL_MS", "500"),
            ("SHOPEZ_RESUBSCRIBE_MAX_MS", "100"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_and_user() {
        let config = load(&[
            DB,
            ("SHOPEZ_FIREBASE_ID_TOKEN", "eyJhbGciOi.token"),
            ("SHOPEZ_USER_ID", "uid-123"),
            ("SHOPEZ_CURRENCY", "gbp"),
        ])
        .unwrap();
        assert_eq!(
            config.firebase.auth_token.unwrap().expose_secret(),
            "eyJhbGciOi.token"
        );
        assert_eq!(config.user_id, Some(UserId::new("uid-123")));
        assert_eq!(config.currency, CurrencyCode::GBP);
    }

    #[test]
    fn test_firebase_debug_redacts_token() {
        let config = load(&[DB, ("SHOPEZ_FIREBASE_ID_TOKEN", "super-sensitive")]).unwrap();
        let debug = format!("{:?}", config.firebase);
        assert!(!debug.contains("super-sensitive"));
        assert!(debug.contains("[REDACTED]"));
    }
}
