// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use harvest_domain::CheckpointSet;
use std::sync::Arc;

/// Durable store for the cumulative set of per-song results.
#[async_trait::async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Load the last flushed set; empty when nothing was flushed yet.
    async fn load(&self) -> Result<CheckpointSet>;

    /// Atomically replace the durable copy with `set`.
    async fn flush(&self, set: &CheckpointSet) -> Result<()>;
}

#[async_trait::async_trait]
impl<R: CheckpointRepository + ?Sized> CheckpointRepository for Arc<R> {
    async fn load(&self) -> Result<CheckpointSet> {
        (**self).load().await
    }

    async fn flush(&self, set: &CheckpointSet) -> Result<()> {
        (**self).flush(set).await
    }
}
