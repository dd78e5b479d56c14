use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::middleware_helpers::retry::RetryConfig;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_MAILER_API_URL: &str = "https://api.resend.com/emails";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// How the admin gate decides whether a principal is an administrator.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminStrategy {
    /// `profiles.is_admin` column looked up by the principal's user id
    #[default]
    ProfileFlag,
    /// Verified email must appear in `admin_emails`
    EmailAllowList,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool settings
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Secret used to verify session tokens issued by the identity provider
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,

    #[serde(default)]
    pub admin_strategy: AdminStrategy,

    /// Comma-separated allow list used by the `email_allow_list` strategy
    #[serde(default)]
    pub admin_emails: Option<String>,

    /// Payment gateway secret key
    #[serde(default)]
    pub gateway_secret_key: Option<String>,

    #[serde(default = "default_gateway_api_base")]
    pub gateway_api_base: String,

    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Where the hosted checkout returns the shopper
    #[serde(default = "default_checkout_success_url")]
    pub checkout_success_url: String,
    #[serde(default = "default_checkout_cancel_url")]
    pub checkout_cancel_url: String,

    /// Gateway coupon attached to referral discounts when the admin gives none
    #[serde(default)]
    pub referral_coupon_id: Option<String>,

    /// Transactional mail provider; when unset, mail is written to the log
    #[serde(default)]
    pub mailer_api_key: Option<String>,
    #[serde(default = "default_mailer_api_url")]
    pub mailer_api_url: String,
    #[serde(default = "default_mailer_from")]
    pub mailer_from: String,
    #[serde(default = "default_shop_name")]
    pub shop_name: String,

    /// Shipping notification queue
    #[serde(default = "default_email_queue_capacity")]
    #[validate(range(min = 1))]
    pub email_queue_capacity: usize,
    #[serde(default = "default_email_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub email_max_attempts: u32,
    #[serde(default = "default_email_initial_backoff_ms")]
    pub email_initial_backoff_ms: u64,
    #[serde(default = "default_email_max_backoff_ms")]
    pub email_max_backoff_ms: u64,

    /// Coupon validation limits per window
    #[serde(default = "default_coupon_rate_limit_authenticated")]
    pub coupon_rate_limit_authenticated: u32,
    #[serde(default = "default_coupon_rate_limit_guest")]
    pub coupon_rate_limit_guest: u32,
    #[serde(default = "default_coupon_rate_limit_window_secs")]
    pub coupon_rate_limit_window_secs: u64,

    /// Comma-separated proxy addresses whose `x-forwarded-for` is believed.
    /// Unset means the socket peer is always the client.
    #[serde(default)]
    pub trusted_proxies: Option<String>,
}

impl AppConfig {
    /// Creates a configuration with every optional setting at its default.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_audience: default_jwt_audience(),
            admin_strategy: AdminStrategy::default(),
            admin_emails: None,
            gateway_secret_key: None,
            gateway_api_base: default_gateway_api_base(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            checkout_success_url: default_checkout_success_url(),
            checkout_cancel_url: default_checkout_cancel_url(),
            referral_coupon_id: None,
            mailer_api_key: None,
            mailer_api_url: default_mailer_api_url(),
            mailer_from: default_mailer_from(),
            shop_name: default_shop_name(),
            email_queue_capacity: default_email_queue_capacity(),
            email_max_attempts: default_email_max_attempts(),
            email_initial_backoff_ms: default_email_initial_backoff_ms(),
            email_max_backoff_ms: default_email_max_backoff_ms(),
            coupon_rate_limit_authenticated: default_coupon_rate_limit_authenticated(),
            coupon_rate_limit_guest: default_coupon_rate_limit_guest(),
            coupon_rate_limit_window_secs: default_coupon_rate_limit_window_secs(),
            trusted_proxies: None,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Lower-cased, de-duplicated admin allow list.
    pub fn admin_email_list(&self) -> Vec<String> {
        let mut emails: Vec<String> = split_list(self.admin_emails.as_deref())
            .map(|email| email.to_ascii_lowercase())
            .collect();
        emails.sort();
        emails.dedup();
        emails
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        split_list(self.cors_allowed_origins.as_deref())
            .map(str::to_string)
            .collect()
    }

    /// Parsed proxy list; entries that are not IP addresses are skipped here
    /// and reported by validation.
    pub fn trusted_proxy_list(&self) -> Vec<IpAddr> {
        split_list(self.trusted_proxies.as_deref())
            .filter_map(|addr| addr.parse().ok())
            .collect()
    }

    pub fn email_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.email_max_attempts,
            initial_delay: Duration::from_millis(self.email_initial_backoff_ms),
            max_delay: Duration::from_millis(self.email_max_backoff_ms),
            backoff_factor: 2.0,
        }
    }

    pub fn coupon_rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.coupon_rate_limit_window_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.admin_strategy == AdminStrategy::EmailAllowList
            && self.admin_email_list().is_empty()
        {
            let mut err = ValidationError::new("admin_emails_required");
            err.message = Some(
                "APP__ADMIN_EMAILS must list at least one address when APP__ADMIN_STRATEGY=email_allow_list"
                    .into(),
            );
            errors.add("admin_emails", err);
        }

        if let Some(bad) =
            split_list(self.trusted_proxies.as_deref()).find(|addr| addr.parse::<IpAddr>().is_err())
        {
            let mut err = ValidationError::new("trusted_proxy_invalid");
            err.message = Some(format!("APP__TRUSTED_PROXIES entry '{}' is not an IP address", bad).into());
            errors.add("trusted_proxies", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development.".into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.is_production() && self.gateway_secret_key.is_none() {
            let mut err = ValidationError::new("gateway_secret_key_required");
            err.message = Some("APP__GATEWAY_SECRET_KEY is required in production".into());
            errors.add("gateway_secret_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_jwt_issuer() -> String {
    "storefront-auth".to_string()
}
fn default_jwt_audience() -> String {
    "authenticated".to_string()
}
fn default_gateway_api_base() -> String {
    DEFAULT_GATEWAY_API_BASE.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    20
}
fn default_checkout_success_url() -> String {
    "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}".to_string()
}
fn default_checkout_cancel_url() -> String {
    "http://localhost:3000/cart".to_string()
}
fn default_mailer_api_url() -> String {
    DEFAULT_MAILER_API_URL.to_string()
}
fn default_mailer_from() -> String {
    "orders@localhost".to_string()
}
fn default_shop_name() -> String {
    "Storefront".to_string()
}
fn default_email_queue_capacity() -> usize {
    256
}
fn default_email_max_attempts() -> u32 {
    3
}
fn default_email_initial_backoff_ms() -> u64 {
    500
}
fn default_email_max_backoff_ms() -> u64 {
    10_000
}
fn default_coupon_rate_limit_authenticated() -> u32 {
    10
}
fn default_coupon_rate_limit_guest() -> u32 {
    5
}
fn default_coupon_rate_limit_window_secs() -> u64 {
    60
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    let trimmed = secret.trim();
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt().with_env_filter(EnvFilter::new(filter));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. Environment variables (`APP__*`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // jwt_secret has no default
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to the identity provider's signing secret.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
