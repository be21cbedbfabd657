//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `API_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `API_JWT_SECRET` - Bearer token signing secret (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Stripe secret key (`sk_test_...` enables the test flow)
//! - `STABILITY_API_KEY` - Text-to-image API key
//! - `AWS_REGION` - Region for S3 (and `DynamoDB`, when configured)
//! - `S3_BUCKET` - Bucket generated artifacts are uploaded to
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` - Outbound mail relay
//! - `EMAIL_FROM` - Sender address
//! - `ADMIN_EMAIL` - Operator address that receives forwarding notifications
//!
//! ## Optional
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 5000)
//! - `API_TOKEN_TTL_HOURS` - Bearer token lifetime (default: 24)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated origins (default: `http://localhost:5173`)
//! - `HTTP_TIMEOUT_SECS` - Timeout for every outbound API call (default: 30)
//! - `STRIPE_API_BASE` - Stripe API base URL (default: `https://api.stripe.com`)
//! - `STRIPE_CURRENCY` - Charge currency, must be the catalog currency (default: jpy)
//! - `STABILITY_API_URL` - Text-to-image endpoint
//! - `DEEPL_API_KEY` - Enables prompt translation
//! - `DEEPL_API_URL` - Translation endpoint (default: `DeepL` free tier)
//! - `TRANSLATION_TARGET_LANG` - Target language code (default: EN)
//! - `TRANSLATION_POLICY` - `fallback` or `fail` (default: fallback)
//! - `S3_PUBLIC_BASE_URL` - Public URL prefix for artifacts (default: bucket virtual host)
//! - `DYNAMODB_REQUEST_TABLE`, `DYNAMODB_CACHE_TABLE` - Use `DynamoDB` for the request cache
//! - `SMTP_PORT` - Relay port (default: 587)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tee_studio_core::pricing::CATALOG_CURRENCY;
use tee_studio_core::{Currency, Email};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_STABILITY_API_URL: &str =
    "https://api.stability.ai/v2beta/stable-image/generate/core";
const DEFAULT_DEEPL_API_URL: &str = "https://api-free.deepl.com/v2/translate";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// What to do when prompt translation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationPolicy {
    /// Log the failure and generate from the original prompt.
    #[default]
    Fallback,
    /// Abort the generation request.
    FailClosed,
}

impl std::str::FromStr for TranslationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "fail" | "fail_closed" => Ok(Self::FailClosed),
            other => Err(format!("expected 'fallback' or 'fail', got '{other}'")),
        }
    }
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token signing secret
    pub jwt_secret: SecretString,
    /// Bearer token lifetime
    pub token_ttl: Duration,
    /// Origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
    pub stripe: StripeConfig,
    pub stability: StabilityConfig,
    /// `None` disables translation entirely
    pub translation: Option<TranslationConfig>,
    pub translation_policy: TranslationPolicy,
    pub storage: StorageConfig,
    /// `None` selects the in-process request cache
    pub request_cache: Option<DynamoTables>,
    pub email: EmailConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Stripe payment intent API configuration.
///
/// Implements `Debug` manually so only the key mode is shown.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub api_base: String,
    pub currency: Currency,
}

impl StripeConfig {
    /// Whether the secret key is a Stripe test-mode key.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.expose_secret().starts_with("sk_test_")
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("test_mode", &self.is_test_mode())
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .finish()
    }
}

/// Text-to-image API configuration.
#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub api_key: SecretString,
    pub api_url: String,
}

/// Prompt translation API configuration.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub api_key: SecretString,
    pub api_url: String,
    pub target_lang: String,
}

/// Artifact object storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub public_base_url: Option<String>,
}

/// `DynamoDB` tables backing the request cache.
#[derive(Debug, Clone)]
pub struct DynamoTables {
    /// Pending generation request markers
    pub request_table: String,
    /// Artifact URLs keyed by design id
    pub cache_table: String,
}

/// Outbound email configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
    /// Receives every admin-forwarding notification
    pub admin_email: Email,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the signing secret fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("API_DATABASE_URL")?;
        let host = parse_env("API_HOST", "127.0.0.1")?;
        let port = parse_env("API_PORT", "5000")?;
        let jwt_secret = get_required_secret("API_JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret, "API_JWT_SECRET")?;
        let token_ttl_hours: u64 = parse_env("API_TOKEN_TTL_HOURS", "24")?;
        let http_timeout_secs: u64 = parse_env("HTTP_TIMEOUT_SECS", "30")?;
        let cors_allowed_origins = parse_origins(&get_env_or_default(
            "CORS_ALLOWED_ORIGINS",
            "http://localhost:5173",
        ));

        let stripe = StripeConfig {
            secret_key: get_required_secret("STRIPE_SECRET_KEY")?,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            currency: validate_currency(parse_env("STRIPE_CURRENCY", "jpy")?)?,
        };

        let stability = StabilityConfig {
            api_key: get_required_secret("STABILITY_API_KEY")?,
            api_url: get_env_or_default("STABILITY_API_URL", DEFAULT_STABILITY_API_URL),
        };

        let translation = get_optional_env("DEEPL_API_KEY").map(|key| TranslationConfig {
            api_key: SecretString::from(key),
            api_url: get_env_or_default("DEEPL_API_URL", DEFAULT_DEEPL_API_URL),
            target_lang: get_env_or_default("TRANSLATION_TARGET_LANG", "EN"),
        });
        let translation_policy = parse_env("TRANSLATION_POLICY", "fallback")?;

        let storage = StorageConfig {
            region: get_required_env("AWS_REGION")?,
            bucket: get_required_env("S3_BUCKET")?,
            public_base_url: get_optional_env("S3_PUBLIC_BASE_URL"),
        };

        let request_cache = match (
            get_optional_env("DYNAMODB_REQUEST_TABLE"),
            get_optional_env("DYNAMODB_CACHE_TABLE"),
        ) {
            (Some(request_table), Some(cache_table)) => Some(DynamoTables {
                request_table,
                cache_table,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidEnvVar(
                    "DYNAMODB_REQUEST_TABLE".to_string(),
                    "DYNAMODB_REQUEST_TABLE and DYNAMODB_CACHE_TABLE must be set together"
                        .to_string(),
                ));
            }
        };

        let admin_email = Email::parse(&get_required_env("ADMIN_EMAIL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_EMAIL".to_string(), e.to_string()))?;
        let email = EmailConfig {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
            admin_email,
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl_hours * 60 * 60),
            cors_allowed_origins,
            http_timeout: Duration::from_secs(http_timeout_secs),
            stripe,
            stability,
            translation,
            translation_policy,
            storage,
            request_cache,
            email,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
/// The charge currency must be the one catalog prices are expressed in.
fn validate_currency(currency: Currency) -> Result<Currency, ConfigError> {
    if currency == CATALOG_CURRENCY {
        Ok(currency)
    } else {
        Err(ConfigError::InvalidEnvVar(
            "STRIPE_CURRENCY".to_string(),
            format!("catalog prices are in {CATALOG_CURRENCY}, got {currency}"),
        ))
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate the signing secret: minimum length, no placeholder text, enough entropy.
fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_JWT_SECRET_LENGTH} characters (got {})",
                value.len()
            ),
        ));
    }

    let lower = value.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(value);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!(shannon_entropy("").abs() < f64::EPSILON);
        assert!(shannon_entropy("aaaaaaa").abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_jwt_secret_rejects_short_placeholder_and_low_entropy() {
        let short = SecretString::from("k3$Zp9");
        assert!(matches!(
            validate_jwt_secret(&short, "API_JWT_SECRET"),
            Err(ConfigError::InsecureSecret(_, _))
        ));

        let placeholder = SecretString::from("changeme-changeme-changeme-changeme-1");
        assert!(validate_jwt_secret(&placeholder, "API_JWT_SECRET").is_err());

        let low_entropy = SecretString::from("ab".repeat(20));
        assert!(validate_jwt_secret(&low_entropy, "API_JWT_SECRET").is_err());
    }

    #[test]
    fn test_jwt_secret_accepts_random_value() {
        let secret = SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%");
        assert!(validate_jwt_secret(&secret, "API_JWT_SECRET").is_ok());
    }

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins(" http://localhost:5173/ , ,https://tee.example.jp");
        assert_eq!(
            origins,
            vec![
                "http://localhost:5173".to_string(),
                "https://tee.example.jp".to_string()
            ]
        );
    }

    #[test]
    fn test_charge_currency_must_match_catalog() {
        assert_eq!(validate_currency(Currency::Jpy).unwrap(), Currency::Jpy);
        assert!(matches!(
            validate_currency(Currency::Usd),
            Err(ConfigError::InvalidEnvVar(var, _)) if var == "STRIPE_CURRENCY"
        ));
    }

    #[test]
    fn test_translation_policy_parse() {
        assert_eq!(
            "Fallback".parse::<TranslationPolicy>().unwrap(),
            TranslationPolicy::Fallback
        );
        assert_eq!(
            "fail".parse::<TranslationPolicy>().unwrap(),
            TranslationPolicy::FailClosed
        );
        assert!("retry".parse::<TranslationPolicy>().is_err());
    }

    #[test]
    fn test_stripe_config_debug_redacts_key() {
        let config = StripeConfig {
            secret_key: SecretString::from("sk_test_51HqLyjWDarjtT1zdp7dc"),
            api_base: "https://api.stripe.com".to_string(),
            currency: Currency::Jpy,
        };

        assert!(config.is_test_mode());
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("test_mode: true"));
        assert!(!debug_output.contains("sk_test_51HqLyjWDarjtT1zdp7dc"));
    }
}
