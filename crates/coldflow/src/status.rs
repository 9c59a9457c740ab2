// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `coldflow status`, `block`, and `unblock` command implementations.

use chrono::Utc;

use coldflow_config::model::ColdflowConfig;
use coldflow_core::types::AccountId;
use coldflow_core::ColdflowError;
use coldflow_sender::Scheduler;
use coldflow_storage::Database;

/// Print per-account capacity and queue depth.
pub async fn run_status(config: ColdflowConfig) -> Result<(), ColdflowError> {
    let db = Database::open(&config.storage.database_path).await?;
    let scheduler = Scheduler::new(config, db.clone()).await?;
    let store = scheduler.store();
    let outreach = scheduler.outreach();
    let now = Utc::now();

    println!("Accounts:");
    let mut total_remaining = 0u32;
    for account in store.accounts() {
        let state = store.get_state(&account.id, now)?;
        let status = if state.blocked {
            format!(
                "BLOCKED ({})",
                state.block_reason.as_deref().unwrap_or("no reason recorded")
            )
        } else if let Some(until) = state.cooldown_until {
            format!("cooling down until {}", until.format("%H:%M:%S UTC"))
        } else {
            "active".to_string()
        };
        if !state.blocked {
            total_remaining += state.remaining;
        }
        println!(
            "  {:<12} {:>3}/{:<3} sent today, {:>3} remaining (week {})  {}",
            account.id.to_string(),
            state.sends_today,
            state.effective_cap,
            state.remaining,
            state.warmup_week,
            status
        );
    }
    println!("\nTotal remaining capacity today: {total_remaining}");

    println!("\nQueue:");
    let depth = outreach.queue_depth().await?;
    if depth.is_empty() {
        println!("  empty");
    } else {
        for (status, count) in depth {
            println!("  {status:<10} {count}");
        }
    }

    db.close().await
}

/// Administratively pull an account from rotation.
pub async fn run_block(
    config: ColdflowConfig,
    account: &str,
    reason: &str,
) -> Result<(), ColdflowError> {
    let db = Database::open(&config.storage.database_path).await?;
    let scheduler = Scheduler::new(config, db.clone()).await?;
    let account = AccountId(account.to_string());
    scheduler
        .outreach()
        .force_block(&account, reason, Utc::now())
        .await?;
    println!("blocked {account} ({reason})");
    db.close().await
}

/// Return an account to rotation.
pub async fn run_unblock(config: ColdflowConfig, account: &str) -> Result<(), ColdflowError> {
    let db = Database::open(&config.storage.database_path).await?;
    let scheduler = Scheduler::new(config, db.clone()).await?;
    let account = AccountId(account.to_string());
    scheduler
        .outreach()
        .force_unblock(&account, Utc::now())
        .await?;
    println!("unblocked {account}");
    db.close().await
}
