// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP transport adapter for Coldflow, built on lettre.

pub mod adapter;
pub mod html;

pub use adapter::SmtpSender;
pub use html::text_to_html;
