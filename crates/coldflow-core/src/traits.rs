// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams the scheduler does not own.

use async_trait::async_trait;

use crate::types::{Account, OutboundEmail, SendReceipt, TransportFailure};

/// Mail-submission collaborator.
///
/// The scheduler treats delivery as opaque except for the
/// transient/permanent/blocked classification carried by
/// [`TransportFailure`]. Implementations must be safe to call from
/// multiple workers; per-account serialization is the allocator's job.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &str;

    /// Submit one message from one account.
    async fn send(
        &self,
        account: &Account,
        mail: &OutboundEmail,
    ) -> Result<SendReceipt, TransportFailure>;
}
