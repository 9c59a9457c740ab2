// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `coldflow serve` command implementation.
//!
//! Wires storage, the reputation store, pacing policies, the dispatch
//! queue, and the SMTP transport into the scheduler, then runs the sender
//! workers until a shutdown signal (or a tripped circuit breaker) stops
//! them.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use coldflow_config::model::ColdflowConfig;
use coldflow_core::ColdflowError;
use coldflow_sender::{shutdown, Scheduler};
use coldflow_smtp::SmtpSender;
use coldflow_storage::Database;

/// Runs the `coldflow serve` command.
pub async fn run_serve(config: ColdflowConfig) -> Result<(), ColdflowError> {
    init_tracing(&config.daemon.log_level);

    info!("starting coldflow serve");
    info!(
        accounts = config.accounts.len(),
        timezone = %config.schedule.timezone,
        window = %format!("{}:00-{}:00", config.schedule.start_hour, config.schedule.end_hour),
        daily_cap = config.limits.daily_cap,
        global_target = config.limits.global_daily_target,
        warmup = config.warmup.enabled,
        "configuration loaded"
    );

    let db = Database::open(&config.storage.database_path).await?;
    let transport = Arc::new(SmtpSender::new(&config.smtp));
    let scheduler = Scheduler::new(config, db.clone()).await?;

    // Startup report: what each mailbox has left today.
    let now = Utc::now();
    for (id, summary) in scheduler.outreach().daily_summary(now) {
        info!(
            account = %id,
            sent = summary.sent,
            remaining = summary.remaining,
            blocked = summary.blocked,
            "account status"
        );
    }

    let cancel = shutdown::install_signal_handler();
    let result = scheduler.run(transport, cancel).await;

    db.close().await?;
    info!("coldflow serve shutdown complete");
    result
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("coldflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
