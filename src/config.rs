//! Configuration types.
//!
//! Everything is read from the environment with sensible defaults, so the
//! binary runs out of the box against a local database.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ConfigError;

/// Default system prompt preamble handed to the language model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and friendly travel assistant. \
You can answer general questions and help people find hotels.";

/// Assistant-wide configuration.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Name the assistant introduces itself with.
    pub name: String,
    /// Number of prior turns handed to the LLM.
    pub history_limit: usize,
    /// Idle time after which a booking dialogue is forgotten.
    pub state_ttl: Duration,
    /// Minimum interval between two messages from the same sender.
    pub rate_limit: Duration,
    /// Language the LLM is asked to answer in.
    pub reply_language: String,
    /// System prompt preamble.
    pub system_prompt: String,
    /// Booking flow tuning.
    pub booking: BookingConfig,
    /// Port for the HTTP chat API.
    pub api_port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
    /// Whether to run the stdin REPL channel.
    pub cli_enabled: bool,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            name: "stay-assist".to_string(),
            history_limit: 10,
            state_ttl: Duration::from_secs(5 * 60),
            rate_limit: Duration::from_millis(2000),
            reply_language: "English".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            booking: BookingConfig::default(),
            api_port: 3000,
            db_path: PathBuf::from("./data/stay-assist.db"),
            log_dir: None,
            cli_enabled: true,
        }
    }
}

impl AssistConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            name: env_or("ASSIST_NAME", defaults.name),
            history_limit: env_parse("CHAT_HISTORY_LIMIT", defaults.history_limit)?,
            state_ttl: Duration::from_secs(env_parse(
                "ASSIST_STATE_TTL_SECS",
                defaults.state_ttl.as_secs(),
            )?),
            rate_limit: Duration::from_millis(env_parse(
                "ASSIST_RATE_LIMIT_MS",
                defaults.rate_limit.as_millis() as u64,
            )?),
            reply_language: env_or("ASSIST_REPLY_LANGUAGE", defaults.reply_language),
            system_prompt: env_or("ASSIST_SYSTEM_PROMPT", defaults.system_prompt),
            booking: BookingConfig::from_env()?,
            api_port: env_parse("ASSIST_API_PORT", defaults.api_port)?,
            db_path: std::env::var("ASSIST_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            log_dir: std::env::var("ASSIST_LOG_DIR").ok().map(PathBuf::from),
            cli_enabled: env_parse("ASSIST_CLI_ENABLED", defaults.cli_enabled)?,
        })
    }
}

/// Knobs for the booking flow and the rendering of search results.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Price ceiling sent to the provider when the user gave no budget.
    pub default_max_price: Decimal,
    /// Properties listed for a region search.
    pub region_result_limit: usize,
    /// Room options listed for a property search.
    pub room_option_limit: usize,
    /// Page size requested from the provider.
    pub page_size: u32,
    /// Contact lines appended to every result listing.
    pub contact_lines: Vec<String>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_max_price: dec!(20000000),
            region_result_limit: 7,
            room_option_limit: 5,
            page_size: 10,
            contact_lines: Vec::new(),
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_max_price = match std::env::var("ASSIST_DEFAULT_MAX_PRICE") {
            Ok(raw) => raw
                .trim()
                .parse::<Decimal>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "ASSIST_DEFAULT_MAX_PRICE".into(),
                    message: e.to_string(),
                })?,
            Err(_) => defaults.default_max_price,
        };
        let contact_lines = std::env::var("ASSIST_CONTACT_LINES")
            .map(|raw| {
                raw.split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.contact_lines);

        Ok(Self {
            default_max_price,
            region_result_limit: env_parse(
                "ASSIST_REGION_RESULT_LIMIT",
                defaults.region_result_limit,
            )?,
            room_option_limit: env_parse("ASSIST_ROOM_OPTION_LIMIT", defaults.room_option_limit)?,
            page_size: env_parse("ASSIST_SEARCH_PAGE_SIZE", defaults.page_size)?,
            contact_lines,
        })
    }
}

/// Hotel search provider settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or(
                "ASSIST_SEARCH_BASE_URL",
                "https://api.masterdiskon.com/v1".to_string(),
            ),
            timeout: Duration::from_secs(env_parse("ASSIST_SEARCH_TIMEOUT_SECS", 20u64)?),
        })
    }
}

/// Telegram channel settings. `None` when no bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let allowed_users = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Some(Self {
            bot_token,
            allowed_users,
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}
