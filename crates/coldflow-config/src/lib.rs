// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Coldflow send scheduler.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, environment variable
//! overrides, and collect-all-errors diagnostics.
//!
//! # Usage
//!
//! ```no_run
//! use coldflow_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("accounts configured: {}", config.accounts.len());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ColdflowConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// This is the high-level entry point that:
/// 1. Loads config from TOML files + env vars via Figment
/// 2. On success: runs post-deserialization validation
/// 3. On Figment error: converts to diagnostic entries
///
/// Returns either a valid `ColdflowConfig` or a list of diagnostic errors.
pub fn load_and_validate() -> Result<ColdflowConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<ColdflowConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

/// Load configuration from a specific file path and validate it.
pub fn load_and_validate_path(
    path: &std::path::Path,
) -> Result<ColdflowConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_inline_config_loads_and_validates() {
        let config = load_and_validate_str(
            r#"
[[accounts]]
id = "alice"
address = "alice@widgets.io"
sender_name = "Alice Smith"
password_env = "SMTP_PASS_ALICE"
"#,
        )
        .unwrap();
        assert_eq!(config.accounts.len(), 1);
    }

    #[test]
    fn semantic_errors_surface_as_validation() {
        let errors = load_and_validate_str(
            r#"
[schedule]
start_hour = 20
end_hour = 8
"#,
        )
        .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { .. })));
    }

    #[test]
    fn type_errors_surface_as_parse() {
        let errors = load_and_validate_str(
            r#"
[limits]
daily_cap = "lots"
"#,
        )
        .unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::Parse { .. })));
    }
}
