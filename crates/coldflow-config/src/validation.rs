// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: hour ordering, range sanity, duplicate account ids, and a
//! parseable timezone.

use std::collections::HashSet;
use std::str::FromStr;

use crate::diagnostic::ConfigError;
use crate::model::ColdflowConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ColdflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if chrono_tz::Tz::from_str(&config.schedule.timezone).is_err() {
        errors.push(ConfigError::Validation {
            message: format!(
                "schedule.timezone `{}` is not a valid IANA timezone",
                config.schedule.timezone
            ),
        });
    }

    if config.schedule.start_hour >= config.schedule.end_hour {
        errors.push(ConfigError::Validation {
            message: format!(
                "schedule.start_hour ({}) must be before schedule.end_hour ({})",
                config.schedule.start_hour, config.schedule.end_hour
            ),
        });
    }

    if config.schedule.end_hour > 24 {
        errors.push(ConfigError::Validation {
            message: format!(
                "schedule.end_hour must be at most 24, got {}",
                config.schedule.end_hour
            ),
        });
    }

    if config.pacing.min_delay_mins == 0 || config.pacing.min_delay_mins > config.pacing.max_delay_mins {
        errors.push(ConfigError::Validation {
            message: format!(
                "pacing delay range {}..{} min is invalid (min must be >= 1 and <= max)",
                config.pacing.min_delay_mins, config.pacing.max_delay_mins
            ),
        });
    }

    if !(0.0..1.0).contains(&config.pacing.jitter_pct) {
        errors.push(ConfigError::Validation {
            message: format!(
                "pacing.jitter_pct must be in [0.0, 1.0), got {}",
                config.pacing.jitter_pct
            ),
        });
    }

    if !(0.0..1.0).contains(&config.pacing.skip_probability) {
        errors.push(ConfigError::Validation {
            message: format!(
                "pacing.skip_probability must be in [0.0, 1.0), got {}",
                config.pacing.skip_probability
            ),
        });
    }

    if config.pacing.sessions_per_day_min == 0
        || config.pacing.sessions_per_day_min > config.pacing.sessions_per_day_max
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "pacing sessions range {}..{} is invalid",
                config.pacing.sessions_per_day_min, config.pacing.sessions_per_day_max
            ),
        });
    }

    if config.pacing.session_emails_min == 0
        || config.pacing.session_emails_min > config.pacing.session_emails_max
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "pacing session email range {}..{} is invalid",
                config.pacing.session_emails_min, config.pacing.session_emails_max
            ),
        });
    }

    if config.limits.daily_cap == 0 {
        errors.push(ConfigError::Validation {
            message: "limits.daily_cap must be at least 1".to_string(),
        });
    }

    if !(0.0..1.0).contains(&config.limits.bounce_rate_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "limits.bounce_rate_threshold must be in [0.0, 1.0), got {}",
                config.limits.bounce_rate_threshold
            ),
        });
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "breaker.failure_threshold must be at least 1".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Account-level checks.
    let mut seen_ids = HashSet::new();
    let mut seen_addresses = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        if account.id.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("accounts[{i}].id must not be empty"),
            });
        }
        if !seen_ids.insert(&account.id) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate account id `{}` in [[accounts]] array", account.id),
            });
        }
        if !account.address.contains('@') {
            errors.push(ConfigError::Validation {
                message: format!(
                    "accounts[{i}].address `{}` is not a mailbox address",
                    account.address
                ),
            });
        }
        if !seen_addresses.insert(&account.address) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "duplicate account address `{}` in [[accounts]] array",
                    account.address
                ),
            });
        }
        if account.password_env.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("accounts[{i}].password_env must not be empty"),
            });
        }
        if let Some(cap) = account.daily_cap
            && cap == 0
        {
            errors.push(ConfigError::Validation {
                message: format!("accounts[{i}].daily_cap must be at least 1"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
