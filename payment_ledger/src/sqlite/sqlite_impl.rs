//! `SqliteDatabase` is a concrete implementation of a payment ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`] module.
use std::{fmt::Debug, sync::Arc};

use log::*;
use sqlx::{migrate, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use super::db::{db_url, new_pool, payments, subscriptions};
use crate::{
    db_types::{PaymentFields, PaymentIds, PaymentRecord, SubscriptionLink, SubscriptionRecord},
    traits::{
        DedupResult,
        HeuristicMergeMode,
        HeuristicQuery,
        InvoiceLink,
        LedgerError,
        PaymentLedgerDatabase,
        ReconciliationManagement,
        SubscriptionManagement,
        UnlinkedPaymentFilter,
        UpsertResult,
    },
};

/// SQLite allows a single writer. A deferred transaction that has read cannot take the write lock once another
/// connection has committed, and fails with `SQLITE_BUSY` without waiting on the busy timeout. Every write in this
/// process therefore queues on `write_lock` before opening its transaction. Clones share the lock.
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

type WriteTransaction<'a> = (MutexGuard<'a, ()>, Transaction<'static, Sqlite>);

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_payment(&self, ids: &PaymentIds, fields: PaymentFields) -> Result<UpsertResult, LedgerError> {
        let (_guard, mut tx) = self.begin_write().await?;
        let result = payments::upsert_payment(ids, fields, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_active_payments_for_canonical_id(
        &self,
        canonical_id: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::fetch_active_for_canonical_id(canonical_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payments_for_identifier(&self, identifier: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::fetch_for_identifier(identifier, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_merged_into(&self, id: i64) -> Result<Vec<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::fetch_merged_into(id, &mut conn).await?;
        Ok(result)
    }

    async fn compact_duplicates(&self) -> Result<DedupResult, LedgerError> {
        let (_guard, mut tx) = self.begin_write().await?;
        let result = payments::compact_duplicates(&mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Compaction committed. {result}");
        Ok(result)
    }
}

impl ReconciliationManagement for SqliteDatabase {
    async fn fetch_unlinked_invoice_payments(
        &self,
        filter: UnlinkedPaymentFilter,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::fetch_unlinked_invoice_payments(filter, &mut conn).await?;
        Ok(result)
    }

    async fn find_canonical_row(&self, identity: &str, exclude_id: i64) -> Result<Option<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::find_canonical_row(identity, exclude_id, &mut conn).await?;
        Ok(result)
    }

    /// Fills the target's links and soft-merges the source in one transaction. Either row having been merged by a
    /// concurrent process rolls the whole thing back.
    async fn merge_into_canonical(
        &self,
        source_id: i64,
        target_id: i64,
        link: &InvoiceLink,
    ) -> Result<PaymentRecord, LedgerError> {
        if source_id == target_id {
            return Err(LedgerError::SelfMerge(source_id));
        }
        let (_guard, mut tx) = self.begin_write().await?;
        let source = payments::fetch_active_payment(source_id, &mut tx).await?;
        payments::fill_links(target_id, &source, link, &mut tx).await?;
        payments::soft_merge(source_id, target_id, link.identity(), &mut tx).await?;
        let target = payments::fetch_active_payment(target_id, &mut tx).await?;
        tx.commit().await?;
        Ok(target)
    }

    async fn promote_payment(&self, id: i64, link: &InvoiceLink) -> Result<PaymentRecord, LedgerError> {
        let (_guard, mut tx) = self.begin_write().await?;
        payments::promote(id, link, &mut tx).await?;
        let payment = payments::fetch_active_payment(id, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Payment #{id} promoted to canonical id {:?}", payment.canonical_id);
        Ok(payment)
    }

    async fn find_heuristic_candidate(&self, query: HeuristicQuery) -> Result<Option<PaymentRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = payments::find_heuristic_candidate(query, &mut conn).await?;
        Ok(result)
    }

    async fn absorb_heuristic_match(
        &self,
        source_id: i64,
        candidate_id: i64,
        mode: HeuristicMergeMode,
    ) -> Result<PaymentRecord, LedgerError> {
        if source_id == candidate_id {
            return Err(LedgerError::SelfMerge(source_id));
        }
        let (_guard, mut tx) = self.begin_write().await?;
        payments::fetch_active_payment(source_id, &mut tx).await?;
        payments::mark_succeeded(candidate_id, &mut tx).await?;
        match mode {
            HeuristicMergeMode::SoftMerge => payments::soft_merge(source_id, candidate_id, None, &mut tx).await?,
            HeuristicMergeMode::HardDelete => payments::delete_payment(source_id, &mut tx).await?,
        }
        let candidate = payments::fetch_active_payment(candidate_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment #{source_id} absorbed into #{candidate_id} ({mode})");
        Ok(candidate)
    }
}

impl SubscriptionManagement for SqliteDatabase {
    async fn activate_subscription_for_plan(
        &self,
        user_id: &str,
        plan_key: &str,
        stripe_subscription_id: Option<&str>,
        link: SubscriptionLink,
    ) -> Result<u64, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let n = subscriptions::activate_for_plan(user_id, plan_key, stripe_subscription_id, link, &mut conn).await?;
        Ok(n)
    }

    async fn activate_subscription_by_stripe_id(&self, stripe_subscription_id: &str) -> Result<u64, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        let n = subscriptions::activate_by_stripe_id(stripe_subscription_id, &mut conn).await?;
        Ok(n)
    }

    async fn fetch_subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let result = subscriptions::fetch_for_user(user_id, &mut conn).await?;
        Ok(result)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, write_lock: Arc::new(Mutex::new(())) })
    }

    /// Waits for this process's turn to write, then opens a transaction. Hold the guard until the transaction is
    /// committed or dropped.
    async fn begin_write(&self) -> Result<WriteTransaction<'_>, LedgerError> {
        let guard = self.write_lock.lock().await;
        let tx = self.pool.begin().await?;
        Ok((guard, tx))
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
