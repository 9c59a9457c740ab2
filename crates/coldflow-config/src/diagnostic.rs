// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic error types and rendering for configuration failures.
//!
//! All parse and validation problems are collected and rendered together so
//! the operator fixes everything in one pass instead of whack-a-mole.

use thiserror::Error;

/// A single configuration problem.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// TOML/env parse or type error, as reported by the loader.
    #[error("config parse error: {message}")]
    Parse { message: String },

    /// Semantic validation error found after deserialization.
    #[error("config validation error: {message}")]
    Validation { message: String },
}

/// Convert a figment extraction error into diagnostic entries.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| ConfigError::Parse {
            message: e.to_string(),
        })
        .collect()
}

/// Render collected errors to stderr, one line each.
pub fn render_errors(errors: &[ConfigError]) {
    eprintln!("coldflow: configuration is invalid ({} error(s)):", errors.len());
    for err in errors {
        eprintln!("  - {err}");
    }
    eprintln!("fix the above in coldflow.toml (or COLDFLOW_* env vars) and retry");
}
