use std::time::Duration;

use log::*;
use payment_ledger::{CompactorApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the duplicate compaction worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_dedup_worker(db: SqliteDatabase, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = CompactorApi::new(db);
        info!("🧹️ Dedup worker started. Compacting every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🧹️ Running duplicate compaction job");
            match api.compact().await {
                Ok(result) if result.is_empty() => trace!("🧹️ Nothing to compact"),
                Ok(result) => info!("🧹️ Scheduled compaction: {result}"),
                Err(e) => error!("🧹️ Error running duplicate compaction job: {e}"),
            }
        }
    })
}
