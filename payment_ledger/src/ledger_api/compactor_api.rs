use std::fmt::Debug;

use log::*;

use crate::traits::{DedupResult, LedgerError, PaymentLedgerDatabase};

/// Enforces "at most one active row per canonical id" by deleting redundant duplicates.
///
/// Upserts are serialised within a process, so duplicates only appear when several processes write concurrently, or
/// when reconciliation links two rows to the same transaction. The compactor cleans up after both.
pub struct CompactorApi<B> {
    db: B,
}

impl<B> Debug for CompactorApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactorApi")
    }
}

impl<B> CompactorApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CompactorApi<B>
where B: PaymentLedgerDatabase
{
    pub async fn compact(&self) -> Result<DedupResult, LedgerError> {
        trace!("🧹️ Running duplicate payment compaction");
        let result = self.db.compact_duplicates().await?;
        if result.is_empty() {
            debug!("🧹️ No duplicate payments found");
        } else {
            info!("🧹️ {result}. Deleted rows: {:?}", result.deleted);
        }
        Ok(result)
    }
}
