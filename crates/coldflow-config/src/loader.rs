// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./coldflow.toml` > `~/.config/coldflow/coldflow.toml`
//! > `/etc/coldflow/coldflow.toml` with environment variable overrides via
//! the `COLDFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ColdflowConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/coldflow/coldflow.toml` (system-wide)
/// 3. `~/.config/coldflow/coldflow.toml` (user XDG config)
/// 4. `./coldflow.toml` (local directory)
/// 5. `COLDFLOW_*` environment variables
pub fn load_config() -> Result<ColdflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColdflowConfig::default()))
        .merge(Toml::file("/etc/coldflow/coldflow.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("coldflow/coldflow.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("coldflow.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ColdflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColdflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ColdflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColdflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `COLDFLOW_LIMITS_DAILY_CAP` must map to
/// `limits.daily_cap`, not `limits.daily.cap`.
fn env_provider() -> Env {
    Env::prefixed("COLDFLOW_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: COLDFLOW_LIMITS_DAILY_CAP -> "limits_daily_cap"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("daemon_", "daemon.", 1)
            .replacen("smtp_", "smtp.", 1)
            .replacen("schedule_", "schedule.", 1)
            .replacen("pacing_", "pacing.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("warmup_", "warmup.", 1)
            .replacen("retry_", "retry.", 1)
            .replacen("breaker_", "breaker.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert!(config.accounts.is_empty());
        assert_eq!(config.limits.daily_cap, 50);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[limits]
daily_cap = 25
global_daily_target = 300

[schedule]
start_hour = 8
end_hour = 18
"#,
        )
        .unwrap();
        assert_eq!(config.limits.daily_cap, 25);
        assert_eq!(config.limits.global_daily_target, 300);
        assert_eq!(config.schedule.start_hour, 8);
        assert_eq!(config.schedule.end_hour, 18);
        // Untouched sections keep defaults.
        assert_eq!(config.retry.max_attempts, 3);
    }
}
