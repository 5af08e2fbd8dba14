//! Configuration system for Lumen.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file (or an explicit path)
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LUMEN_CAMPAIGN_ID` - Campaign used for pre-expiration reminders
//! - `LUMEN_PLAN_EXPIRED_CAMPAIGN_ID` - Campaign used for post-expiration notices
//! - `LUMEN_DAYS_BEFORE_EXPIRATION` - Default reminder window in days
//! - `LUMEN_DAYS_SINCE_EXPIRATION` - Default post-expiration lookback in days
//! - `LUMEN_SEND_TIMEOUT_SECS` - Upper bound on each notification call
//! - `LUMEN_MAX_CONCURRENT_SENDS` - Dispatch concurrency within one tenant
//! - `LUMEN_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `LUMEN_DATABASE_URL` - Database connection URL
//! - `LUMEN_BRAZE_API_URL`, `LUMEN_BRAZE_API_KEY`, `LUMEN_BRAZE_APP_ID`
//! - `LUMEN_DIRECTORY_API_URL`, `LUMEN_DIRECTORY_API_TOKEN`
//! - `LUMEN_LOGGING_ENABLED`, `LUMEN_LOG_LEVEL`, `LUMEN_LOG_JSON`
//! - `LUMEN_JOB_TENANTS` - Tenant list for scheduled runs

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use config::{Config, ConfigBuilder};
use serde::Deserialize;

use crate::errors::{EngineError, EngineResult};
use crate::license::NoticeKind;

/// Upper bound on any window length in days (about a century).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Global configuration singleton.
static CONFIG: OnceLock<LumenConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LumenConfig {
    pub reminders: RemindersConfig,
    pub database: DatabaseConfig,
    pub braze: BrazeConfig,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
    pub jobs: JobsConfig,
}

/// Reminder run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// Campaign for the pre-expiration reminder. Required to run reminders.
    pub campaign_id: String,
    /// Campaign for the post-expiration notice. Required to run that notice.
    pub plan_expired_campaign_id: String,
    /// Default reminder window in days
    pub days_before_expiration: u32,
    /// Default post-expiration lookback in full days
    pub days_since_expiration: u32,
    /// Timeout applied to each alias/send call
    pub send_timeout_secs: u64,
    /// Alias label registered with the notification provider
    pub alias_label: String,
    /// Maximum in-flight dispatches per tenant
    pub max_concurrent_sends: usize,
    /// Sender alias used when the tenant directory has none
    pub default_sender_alias: String,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            campaign_id: String::new(),
            plan_expired_campaign_id: String::new(),
            days_before_expiration: 30,
            days_since_expiration: 7,
            send_timeout_secs: 10,
            alias_label: "Enterprise".to_string(),
            max_concurrent_sends: 1,
            default_sender_alias: "Learner Support".to_string(),
        }
    }
}

impl RemindersConfig {
    /// The campaign that carries `kind`, or a configuration error if unset.
    pub fn campaign_for(&self, kind: NoticeKind) -> EngineResult<&str> {
        let (campaign, key) = match kind {
            NoticeKind::ExpirationReminder => (&self.campaign_id, "reminders.campaign_id"),
            NoticeKind::PlanExpired => (
                &self.plan_expired_campaign_id,
                "reminders.plan_expired_campaign_id",
            ),
        };

        if campaign.trim().is_empty() {
            return Err(EngineError::Config(format!(
                "{key} is not configured; set it to the campaign id for {kind} emails"
            )));
        }
        Ok(campaign.trim())
    }

    /// Default window length for `kind`.
    pub fn default_days(&self, kind: NoticeKind) -> u32 {
        match kind {
            NoticeKind::ExpirationReminder => self.days_before_expiration,
            NoticeKind::PlanExpired => self.days_since_expiration,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://lumen.db".to_string(),
            postgres_url: "postgres://localhost/lumen".to_string(),
        }
    }
}

/// Braze REST API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrazeConfig {
    pub api_url: String,
    pub api_key: String,
    pub app_id: String,
}

impl Default for BrazeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://rest.iad-01.braze.com".to_string(),
            api_key: String::new(),
            app_id: String::new(),
        }
    }
}

/// Enterprise customer directory configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub api_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:18000/enterprise/api/v1".to_string(),
            api_token: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Scheduled run configuration (requires the `background-jobs` feature).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Delimited tenant list processed by every scheduled run
    pub tenants: String,
    /// Cron expression for the pre-expiration reminder (default: hourly at minute 0)
    pub reminder_cron: String,
    /// Whether the post-expiration notice job is registered
    pub plan_expired_enabled: bool,
    /// Cron expression for the post-expiration notice (default: daily at 09:00)
    pub plan_expired_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            tenants: String::new(),
            reminder_cron: "0 0 * * * *".to_string(),
            plan_expired_enabled: false,
            plan_expired_cron: "0 0 9 * * *".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> EngineError {
    EngineError::Config(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl LumenConfig {
    /// Load configuration from `config.toml` (optional) and the environment.
    pub fn load() -> EngineResult<Self> {
        Self::build(None)
    }

    /// Load configuration from an explicit file (required) and the environment.
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        Self::build(Some(path))
    }

    fn build(path: Option<&Path>) -> EngineResult<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("reminders.campaign_id", "")
            .map_err(config_err)?
            .set_default("reminders.plan_expired_campaign_id", "")
            .map_err(config_err)?
            .set_default(
                "reminders.days_before_expiration",
                i64::from(defaults.reminders.days_before_expiration),
            )
            .map_err(config_err)?
            .set_default(
                "reminders.days_since_expiration",
                i64::from(defaults.reminders.days_since_expiration),
            )
            .map_err(config_err)?
            .set_default("reminders.send_timeout_secs", 10)
            .map_err(config_err)?
            .set_default("reminders.alias_label", defaults.reminders.alias_label.as_str())
            .map_err(config_err)?
            .set_default("reminders.max_concurrent_sends", 1)
            .map_err(config_err)?
            .set_default(
                "reminders.default_sender_alias",
                defaults.reminders.default_sender_alias.as_str(),
            )
            .map_err(config_err)?
            .set_default("database.db_type", "sqlite")
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url.as_str())
            .map_err(config_err)?
            .set_default("database.postgres_url", defaults.database.postgres_url.as_str())
            .map_err(config_err)?
            .set_default("braze.api_url", defaults.braze.api_url.as_str())
            .map_err(config_err)?
            .set_default("directory.api_url", defaults.directory.api_url.as_str())
            .map_err(config_err)?
            .set_default("directory.timeout_secs", 10)
            .map_err(config_err)?
            .set_default("logging.enabled", true)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?
            .set_default("logging.json", false)
            .map_err(config_err)?
            .set_default("jobs.reminder_cron", defaults.jobs.reminder_cron.as_str())
            .map_err(config_err)?
            .set_default("jobs.plan_expired_cron", defaults.jobs.plan_expired_cron.as_str())
            .map_err(config_err)?;

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("config").required(false)),
        };

        let settings = Self::apply_env_overrides(builder)?
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(format!("failed to deserialize config: {e}")))
    }

    fn apply_env_overrides(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> EngineResult<ConfigBuilder<config::builder::DefaultState>> {
        let database_url = env::var("LUMEN_DATABASE_URL").ok();

        builder
            .set_override_option("reminders.campaign_id", env::var("LUMEN_CAMPAIGN_ID").ok())
            .map_err(config_err)?
            .set_override_option(
                "reminders.plan_expired_campaign_id",
                env::var("LUMEN_PLAN_EXPIRED_CAMPAIGN_ID").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "reminders.days_before_expiration",
                env_parsed::<i64>("LUMEN_DAYS_BEFORE_EXPIRATION"),
            )
            .map_err(config_err)?
            .set_override_option(
                "reminders.days_since_expiration",
                env_parsed::<i64>("LUMEN_DAYS_SINCE_EXPIRATION"),
            )
            .map_err(config_err)?
            .set_override_option(
                "reminders.send_timeout_secs",
                env_parsed::<i64>("LUMEN_SEND_TIMEOUT_SECS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "reminders.max_concurrent_sends",
                env_parsed::<i64>("LUMEN_MAX_CONCURRENT_SENDS"),
            )
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("LUMEN_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option("braze.api_url", env::var("LUMEN_BRAZE_API_URL").ok())
            .map_err(config_err)?
            .set_override_option("braze.api_key", env::var("LUMEN_BRAZE_API_KEY").ok())
            .map_err(config_err)?
            .set_override_option("braze.app_id", env::var("LUMEN_BRAZE_APP_ID").ok())
            .map_err(config_err)?
            .set_override_option(
                "directory.api_url",
                env::var("LUMEN_DIRECTORY_API_URL").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "directory.api_token",
                env::var("LUMEN_DIRECTORY_API_TOKEN").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("LUMEN_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("LUMEN_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option("logging.json", env_parsed::<bool>("LUMEN_LOG_JSON"))
            .map_err(config_err)?
            .set_override_option("jobs.tenants", env::var("LUMEN_JOB_TENANTS").ok())
            .map_err(config_err)
    }

    /// Validate the configuration.
    ///
    /// Campaign ids are checked per run instead, since a deployment may only
    /// ever send one of the two notices.
    pub fn validate(&self) -> EngineResult<()> {
        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(EngineError::Config(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.reminders.days_before_expiration == 0 {
            return Err(EngineError::Config(
                "reminders.days_before_expiration must be greater than 0".to_string(),
            ));
        }
        if self.reminders.days_since_expiration == 0 {
            return Err(EngineError::Config(
                "reminders.days_since_expiration must be greater than 0".to_string(),
            ));
        }
        for (key, days) in [
            (
                "reminders.days_before_expiration",
                self.reminders.days_before_expiration,
            ),
            (
                "reminders.days_since_expiration",
                self.reminders.days_since_expiration,
            ),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(EngineError::Config(format!(
                    "{key} must be at most {MAX_WINDOW_DAYS}, got {days}"
                )));
            }
        }
        if self.reminders.send_timeout_secs == 0 {
            return Err(EngineError::Config(
                "reminders.send_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.reminders.max_concurrent_sends == 0 {
            return Err(EngineError::Config(
                "reminders.max_concurrent_sends must be greater than 0".to_string(),
            ));
        }
        if self.reminders.alias_label.trim().is_empty() {
            return Err(EngineError::Config(
                "reminders.alias_label cannot be empty".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(EngineError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> EngineResult<&'static LumenConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LumenConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> EngineResult<&'static LumenConfig> {
    get_config()
}
