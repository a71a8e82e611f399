//! Graph client (C1): connection/session lifecycle, schema bootstrap, and
//! transaction begin/commit/rollback over a [`StorageBackend`].

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::index::IndexType;
use crate::storage::{ProcedureResult, StorageBackend};
use crate::tx::TxMode;
use crate::{Error, PropertyMap, Result};

/// Default retry budget for the initial connect.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
const INITIAL_WAIT: Duration = Duration::from_secs(1);
const MAX_WAIT: Duration = Duration::from_secs(10);

/// Owns the connection/session factory, schema bootstrap, and transaction
/// lifecycle over a [`StorageBackend`]. Every repository operation opens
/// exactly one transaction through this client and commits or rolls back
/// before returning.
pub struct GraphClient<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> GraphClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Connects with no cancellation point, retrying up to
    /// [`DEFAULT_MAX_ATTEMPTS`] times with exponential backoff.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with(DEFAULT_MAX_ATTEMPTS, std::future::pending()).await
    }

    /// Connects with exponential-backoff retry (1s initial wait, doubling,
    /// capped at 10s), racing each wait against `cancel`. If `cancel`
    /// resolves first, the loop aborts with [`Error::Cancelled`].
    pub async fn connect_with(
        &self,
        max_attempts: u32,
        cancel: impl Future<Output = ()>,
    ) -> Result<()> {
        tokio::pin!(cancel);

        let mut wait = INITIAL_WAIT;
        for attempt in 1..=max_attempts {
            match self.backend.connect().await {
                Ok(()) => {
                    info!(attempt, "graph client connected");
                    return Ok(());
                }
                Err(e) if attempt == max_attempts => {
                    warn!(attempt, error = %e, "graph client connect attempts exhausted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, error = %e, wait_secs = wait.as_secs(), "connect failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = &mut cancel => {
                            return Err(Error::Cancelled);
                        }
                    }
                    wait = (wait * 2).min(MAX_WAIT);
                }
            }
        }

        Err(Error::StorageError("connect retry loop exited without a result".into()))
    }

    /// Idempotent schema bootstrap: btree indexes on `id`/`status`/`type`
    /// and trigram indexes on the free-text fields, per label. A backend
    /// that treats `create_index` as a no-op (the in-memory backend does)
    /// never surfaces an error here; a real external store's driver would
    /// propagate a genuine `StorageError`.
    pub async fn bootstrap_schema(&self) -> Result<()> {
        let plan = [
            ("Memory", &[("id", IndexType::BTree), ("type", IndexType::BTree), ("content", IndexType::Trigram)][..]),
            ("Plan", &[("id", IndexType::BTree), ("status", IndexType::BTree), ("name", IndexType::Trigram), ("description", IndexType::Trigram)][..]),
            ("Task", &[("id", IndexType::BTree), ("status", IndexType::BTree)][..]),
        ];

        for (label, indexes) in plan {
            for (property, index_type) in indexes {
                if let Err(e) = self.backend.create_index(label, property, *index_type).await {
                    warn!(label, property, error = %e, "schema bootstrap index failed");
                }
            }
        }

        info!("schema bootstrap complete");
        Ok(())
    }

    pub async fn begin_tx(&self, mode: TxMode) -> Result<B::Tx> {
        self.backend.begin_tx(mode).await
    }

    pub async fn commit(&self, tx: B::Tx) -> Result<()> {
        self.backend.commit_tx(tx).await
    }

    pub async fn rollback(&self, tx: B::Tx) -> Result<()> {
        self.backend.rollback_tx(tx).await
    }

    /// Pass-through raw query execution — the escape hatch used by lexical
    /// search (see `storage::StorageBackend::execute_raw`).
    pub async fn exec(&self, tx: &B::Tx, query: &str, params: PropertyMap) -> Result<ProcedureResult> {
        self.backend.execute_raw(tx, query, params).await
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn connect_succeeds_immediately_against_memory_backend() {
        let client = GraphClient::new(MemoryBackend::new());
        client.connect().await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_schema_is_idempotent() {
        let client = GraphClient::new(MemoryBackend::new());
        client.bootstrap_schema().await.unwrap();
        client.bootstrap_schema().await.unwrap();
    }
}
