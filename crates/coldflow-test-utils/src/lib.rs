// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Coldflow integration tests.
//!
//! Provides a scriptable mock transport and fixture builders for fast,
//! deterministic, CI-runnable tests without a real SMTP relay.
//!
//! # Components
//!
//! - [`MockTransport`] - Mock transport with scripted outcomes and captured sends
//! - [`fixtures`] - Account/request/config builders

pub mod fixtures;
pub mod mock_transport;

pub use mock_transport::{CapturedSend, MockTransport};
