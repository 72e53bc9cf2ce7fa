use crate::error::ConfigError;
use chrono::NaiveDate;
use chrono_tz::Tz;
use core_types::ZoneCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instrument: Instrument,
    pub fibonacci: FibonacciParams,
    #[serde(default)]
    pub zone_history: ZoneHistoryParams,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub recovery: RecoveryParams,
    #[serde(default)]
    pub logging: LoggingParams,
    pub sessions: Vec<SessionParams>,
}

/// The single instrument every session trades.
#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    /// The broker symbol orders are placed on (e.g., "SPXm").
    pub symbol: String,
    /// The ticker the price feed knows the same market by (e.g., "^GSPC").
    pub price_ticker: String,
    /// All schedules, milestones and history timestamps live in this zone.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// The version embedded in every session's identity tag.
    pub version: String,
}

/// Parameters for the Fibonacci level ladder and the zone gate.
#[derive(Debug, Clone, Deserialize)]
pub struct FibonacciParams {
    pub base_price: Decimal,
    pub top_price: Decimal,
    /// Also derive the three levels below the base price.
    #[serde(default)]
    pub extended: bool,
    /// Zones in which new entries are suppressed.
    #[serde(default)]
    pub inhibit_zones: Vec<ZoneCode>,
    /// Gating zone assumed until the first successful history refresh.
    #[serde(default)]
    pub initial_zone: Option<ZoneCode>,
}

/// Parameters for the rolling zone history and its periodic refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZoneHistoryParams {
    /// Fetch start used when the history is still empty.
    pub start_date: NaiveDate,
    /// How far before the last known sample a refresh starts fetching.
    /// Must exceed the largest expected gap in the feed.
    pub overlap_days: i64,
    pub bar_interval: String,
    pub refresh_interval_secs: u64,
    /// Upper bound on a single price-feed request.
    pub request_timeout_secs: u64,
    /// Wall-clock time of the daily market close used as the gating milestone.
    pub milestone_hour: u32,
    pub milestone_minute: u32,
}

/// The timing contracts of the order lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Grace period after the scheduled open during which an entry may still be sent.
    pub entry_tolerance_secs: i64,
    /// Minimum spacing between two close attempts.
    pub close_retry_interval_secs: i64,
    /// After this long, a close is only resent while the position is profitable.
    pub unconditional_close_secs: i64,
    /// Cadence of the synthetic clock used in paper mode.
    pub tick_interval_secs: u64,
}

/// Where recovery records are kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryParams {
    pub orders_dir: PathBuf,
}

/// Where the rolling log files are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingParams {
    pub directory: PathBuf,
    pub file_prefix: String,
}

/// Parameters for one trading session (one controller instance).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionParams {
    /// Short session label, e.g. "TD" or "ON".
    pub name: String,
    pub open_hour: u32,
    pub open_minute: u32,
    pub close_hour: u32,
    pub close_minute: u32,
    /// The close falls on the calendar day after the open.
    #[serde(default)]
    pub overnight: bool,
    pub lots: Decimal,
    pub magic: i64,
    /// Consult the Fibonacci zone gate before each entry.
    #[serde(default)]
    pub zone_gated: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SessionParams {
    /// The order comment that identifies this session's orders at the broker.
    pub fn comment(&self, version: &str) -> String {
        format!("{}__Cassandra__V{}", self.name, version)
    }
}

fn default_timezone() -> Tz {
    chrono_tz::America::New_York
}

fn default_enabled() -> bool {
    true
}

// --- Default Implementations ---
// These allow a user to omit the optional sections from their toml
// and still have it work with the production values.

impl Default for ZoneHistoryParams {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            overlap_days: 3,
            bar_interval: "1h".to_string(),
            refresh_interval_secs: 2 * 3600,
            request_timeout_secs: 30,
            milestone_hour: 15,
            milestone_minute: 30,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            entry_tolerance_secs: 1800,
            close_retry_interval_secs: 10,
            unconditional_close_secs: 4 * 60,
            tick_interval_secs: 1,
        }
    }
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self {
            orders_dir: PathBuf::from("./orders"),
        }
    }
}

impl Default for LoggingParams {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            file_prefix: "cassandra.log".to_string(),
        }
    }
}

impl Config {
    /// Checks the cross-field rules that deserialization alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fibonacci.top_price <= self.fibonacci.base_price {
            return Err(ConfigError::ValidationError(format!(
                "fibonacci.top_price ({}) must be greater than fibonacci.base_price ({})",
                self.fibonacci.top_price, self.fibonacci.base_price
            )));
        }

        let zh = &self.zone_history;
        if zh.overlap_days <= 0 {
            return Err(ConfigError::ValidationError(
                "zone_history.overlap_days must be positive".to_string(),
            ));
        }
        if zh.refresh_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "zone_history.refresh_interval_secs must be positive".to_string(),
            ));
        }
        if zh.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "zone_history.request_timeout_secs must be positive".to_string(),
            ));
        }
        check_clock("zone_history.milestone", zh.milestone_hour, zh.milestone_minute)?;

        if self.timing.entry_tolerance_secs <= 0 || self.timing.close_retry_interval_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "timing windows must be positive".to_string(),
            ));
        }

        if self.sessions.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[sessions]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for session in &self.sessions {
            if !names.insert(session.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate session name '{}'",
                    session.name
                )));
            }
            check_clock(&format!("sessions.{}.open", session.name), session.open_hour, session.open_minute)?;
            check_clock(&format!("sessions.{}.close", session.name), session.close_hour, session.close_minute)?;
            if session.lots <= Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "sessions.{}.lots must be positive",
                    session.name
                )));
            }
        }

        Ok(())
    }

    /// The sessions that should get a controller.
    pub fn enabled_sessions(&self) -> impl Iterator<Item = &SessionParams> {
        self.sessions.iter().filter(|s| s.enabled)
    }
}

fn check_clock(field: &str, hour: u32, minute: u32) -> Result<(), ConfigError> {
    if hour >= 24 || minute >= 60 {
        return Err(ConfigError::ValidationError(format!(
            "{} {:02}:{:02} is not a valid wall-clock time",
            field, hour, minute
        )));
    }
    Ok(())
}
