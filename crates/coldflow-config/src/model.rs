// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Coldflow send scheduler.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coldflow_core::types::{Account, AccountId};

/// Top-level Coldflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections except `[[accounts]]` default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColdflowConfig {
    /// Daemon behavior settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Configured sending accounts.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// SMTP relay settings shared by all accounts.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Business-hours calendar gate.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Human-like pacing: sessions, delays, jitter.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Daily caps, claim expiry, domain throttling, block handling.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Warm-up ramp for young accounts.
    #[serde(default)]
    pub warmup: WarmupConfig,

    /// Transient-failure retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Transport circuit breaker.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ColdflowConfig {
    /// Resolve the configured accounts into domain [`Account`] values,
    /// applying the default daily cap where an account leaves it unset.
    pub fn resolved_accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|a| Account {
                id: AccountId(a.id.clone()),
                address: a.address.clone(),
                sender_name: a.sender_name.clone(),
                password_env: a.password_env.clone(),
                daily_cap: a.daily_cap.unwrap_or(self.limits.daily_cap),
            })
            .collect()
    }
}

/// Daemon behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of concurrent sender workers. Effective parallelism is also
    /// bounded by the account count, since each account serves one in-flight
    /// send at a time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often an idle worker re-polls the queue when no wakeup arrives.
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workers: default_workers(),
            idle_poll_secs: default_idle_poll_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_idle_poll_secs() -> u64 {
    30
}

/// One sending account.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Short stable identifier used in logs, storage, and affinity pins.
    pub id: String,

    /// Mailbox address.
    pub address: String,

    /// Display name for the From header.
    pub sender_name: String,

    /// Environment variable holding this account's SMTP password.
    pub password_env: String,

    /// Per-account daily cap override. Defaults to `limits.daily_cap`.
    #[serde(default)]
    pub daily_cap: Option<u32>,
}

/// SMTP relay configuration shared by all accounts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Per-send connection timeout in seconds.
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,

    /// Reply-To header applied to all outbound mail. Defaults to the
    /// sending address itself.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            timeout_secs: default_smtp_timeout_secs(),
            reply_to: None,
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.zoho.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout_secs() -> u64 {
    60
}

/// Business-hours calendar gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// IANA timezone the recipients live in; all windows, day keys, and
    /// holiday checks use this zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// First hour of the sending window (inclusive), in the target timezone.
    #[serde(default = "default_start_hour")]
    pub start_hour: u8,

    /// End hour of the sending window (exclusive).
    #[serde(default = "default_end_hour")]
    pub end_hour: u8,

    #[serde(default)]
    pub send_on_weekends: bool,

    /// Whether the built-in US federal holiday calendar pauses sending.
    #[serde(default = "default_true")]
    pub observe_us_holidays: bool,

    /// Extra quiet days on top of the built-in calendar.
    #[serde(default)]
    pub extra_holidays: Vec<NaiveDate>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            send_on_weekends: false,
            observe_us_holidays: true,
            extra_holidays: Vec::new(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_start_hour() -> u8 {
    9
}

fn default_end_hour() -> u8 {
    17
}

fn default_true() -> bool {
    true
}

/// Human-like pacing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PacingConfig {
    /// Base inter-send delay range in minutes, before jitter and
    /// time-of-day multipliers.
    #[serde(default = "default_min_delay_mins")]
    pub min_delay_mins: u32,

    #[serde(default = "default_max_delay_mins")]
    pub max_delay_mins: u32,

    /// Gaussian jitter width as a fraction of the base delay (0.30 = ±30%).
    #[serde(default = "default_jitter_pct")]
    pub jitter_pct: f64,

    /// Sessions planned per account per day.
    #[serde(default = "default_sessions_min")]
    pub sessions_per_day_min: u32,

    #[serde(default = "default_sessions_max")]
    pub sessions_per_day_max: u32,

    /// Emails per session.
    #[serde(default = "default_session_emails_min")]
    pub session_emails_min: u32,

    #[serde(default = "default_session_emails_max")]
    pub session_emails_max: u32,

    /// Probability of skipping a send opportunity to simulate a break.
    #[serde(default = "default_skip_probability")]
    pub skip_probability: f64,

    /// Fixed seed for session planning and jitter. Intended for tests;
    /// leave unset in production for entropy-seeded behavior.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_mins: default_min_delay_mins(),
            max_delay_mins: default_max_delay_mins(),
            jitter_pct: default_jitter_pct(),
            sessions_per_day_min: default_sessions_min(),
            sessions_per_day_max: default_sessions_max(),
            session_emails_min: default_session_emails_min(),
            session_emails_max: default_session_emails_max(),
            skip_probability: default_skip_probability(),
            seed: None,
        }
    }
}

fn default_min_delay_mins() -> u32 {
    20
}

fn default_max_delay_mins() -> u32 {
    35
}

fn default_jitter_pct() -> f64 {
    0.30
}

fn default_sessions_min() -> u32 {
    2
}

fn default_sessions_max() -> u32 {
    3
}

fn default_session_emails_min() -> u32 {
    3
}

fn default_session_emails_max() -> u32 {
    7
}

fn default_skip_probability() -> f64 {
    0.03
}

/// Caps, claim expiry, domain throttling, and block handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Default daily cap per mailbox, unless the account overrides it.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: u32,

    /// Fleet-wide daily send target. When non-zero, per-account caps derive
    /// from `ceil(target / active_accounts)` and pacing accelerates to
    /// catch up after mid-window restarts. Zero disables it.
    #[serde(default)]
    pub global_daily_target: u32,

    /// Claim token time-to-live in seconds.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    /// How long a provider policy block (554-class) keeps an account out of
    /// rotation before the warm-down ramp begins.
    #[serde(default = "default_block_hours")]
    pub block_hours: u32,

    /// Rolling bounce rate above which an account's effective cap is halved.
    #[serde(default = "default_bounce_rate_threshold")]
    pub bounce_rate_threshold: f64,

    /// Rolling window, in days, for bounce/complaint rates.
    #[serde(default = "default_reputation_window_days")]
    pub reputation_window_days: u32,

    /// Daily cap per recipient company domain.
    #[serde(default = "default_max_per_recipient_domain")]
    pub max_per_recipient_domain: u32,

    /// Multiplier applied to the domain cap for webmail providers, which
    /// are not single companies.
    #[serde(default = "default_webmail_multiplier")]
    pub webmail_multiplier: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_cap: default_daily_cap(),
            global_daily_target: 0,
            claim_ttl_secs: default_claim_ttl_secs(),
            block_hours: default_block_hours(),
            bounce_rate_threshold: default_bounce_rate_threshold(),
            reputation_window_days: default_reputation_window_days(),
            max_per_recipient_domain: default_max_per_recipient_domain(),
            webmail_multiplier: default_webmail_multiplier(),
        }
    }
}

fn default_daily_cap() -> u32 {
    50
}

fn default_claim_ttl_secs() -> u64 {
    300
}

fn default_block_hours() -> u32 {
    24
}

fn default_bounce_rate_threshold() -> f64 {
    0.05
}

fn default_reputation_window_days() -> u32 {
    7
}

fn default_max_per_recipient_domain() -> u32 {
    3
}

fn default_webmail_multiplier() -> u32 {
    10
}

/// Warm-up ramp: weekly limits by account age since first send.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WarmupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_warmup_week1")]
    pub week1_limit: u32,

    #[serde(default = "default_warmup_week2")]
    pub week2_limit: u32,

    #[serde(default = "default_warmup_week3")]
    pub week3_limit: u32,

    /// Week 4 and beyond.
    #[serde(default = "default_warmup_week4")]
    pub week4_limit: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            week1_limit: default_warmup_week1(),
            week2_limit: default_warmup_week2(),
            week3_limit: default_warmup_week3(),
            week4_limit: default_warmup_week4(),
        }
    }
}

fn default_warmup_week1() -> u32 {
    5
}

fn default_warmup_week2() -> u32 {
    12
}

fn default_warmup_week3() -> u32 {
    25
}

fn default_warmup_week4() -> u32 {
    45
}

/// Bounded retry policy for transient transport failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total delivery attempts per request before it is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff interval; doubles per retry.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    300
}

fn default_backoff_max_secs() -> u64 {
    7200
}

/// Circuit breaker halting the sender loop on systemic transport outage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive transport-level failures (across all accounts) that
    /// halt the loop.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "coldflow.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_pacing() {
        let config = ColdflowConfig::default();
        assert_eq!(config.pacing.min_delay_mins, 20);
        assert_eq!(config.pacing.max_delay_mins, 35);
        assert_eq!(config.pacing.sessions_per_day_min, 2);
        assert_eq!(config.pacing.sessions_per_day_max, 3);
        assert!((config.pacing.jitter_pct - 0.30).abs() < f64::EPSILON);
    }

    #[test]
    fn default_schedule_is_nine_to_five_eastern() {
        let config = ColdflowConfig::default();
        assert_eq!(config.schedule.timezone, "America/New_York");
        assert_eq!(config.schedule.start_hour, 9);
        assert_eq!(config.schedule.end_hour, 17);
        assert!(!config.schedule.send_on_weekends);
    }

    #[test]
    fn accounts_deserialize_from_toml_array() {
        let toml_str = r#"
[[accounts]]
id = "alice"
address = "alice@widgets.io"
sender_name = "Alice Smith"
password_env = "SMTP_PASS_ALICE"
daily_cap = 30

[[accounts]]
id = "bob"
address = "bob@widgets.io"
sender_name = "Bob Jones"
password_env = "SMTP_PASS_BOB"
"#;
        let config: ColdflowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].daily_cap, Some(30));
        assert_eq!(config.accounts[1].daily_cap, None);

        let resolved = config.resolved_accounts();
        assert_eq!(resolved[0].daily_cap, 30);
        // Unset cap falls back to limits.daily_cap.
        assert_eq!(resolved[1].daily_cap, config.limits.daily_cap);
        assert_eq!(resolved[1].domain(), "widgets.io");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml_str = r#"
[schedule]
timezone = "America/New_York"
tiemzone = "oops"
"#;
        assert!(toml_from_str_fails(toml_str));
    }

    fn toml_from_str_fails(s: &str) -> bool {
        toml::from_str::<ColdflowConfig>(s).is_err()
    }

    #[test]
    fn warmup_defaults_match_ramp() {
        let w = WarmupConfig::default();
        assert!(w.enabled);
        assert_eq!(
            (w.week1_limit, w.week2_limit, w.week3_limit, w.week4_limit),
            (5, 12, 25, 45)
        );
    }

    #[test]
    fn extra_holidays_parse_as_dates() {
        let toml_str = r#"
[schedule]
extra_holidays = ["2026-12-26", "2026-07-03"]
"#;
        let config: ColdflowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedule.extra_holidays.len(), 2);
    }
}
