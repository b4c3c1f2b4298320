use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{PaymentFields, PaymentIds, PaymentRecord},
    helpers::KeyedLocks,
    traits::{LedgerError, PaymentLedgerDatabase, UpsertResult},
};

/// `PaymentLedgerApi` is the single write path for payment rows coming from provider events.
///
/// Writers for the same canonical id are serialised through a shared [`KeyedLocks`] map, and each upsert runs in its
/// own database transaction. Clones share both the backend and the lock map, so every handler in a process should use
/// clones of one instance.
#[derive(Clone)]
pub struct PaymentLedgerApi<B> {
    db: B,
    locks: KeyedLocks,
}

impl<B> Debug for PaymentLedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentLedgerApi ({:?})", self.locks)
    }
}

impl<B> PaymentLedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, locks: KeyedLocks::new() }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentLedgerApi<B>
where B: PaymentLedgerDatabase
{
    /// Records a provider observation of a transaction. See [`PaymentLedgerDatabase::upsert_payment`] for the merge
    /// rules.
    pub async fn upsert(&self, ids: &PaymentIds, fields: PaymentFields) -> Result<UpsertResult, LedgerError> {
        let _guard = match ids.canonical_id.as_deref() {
            Some(key) => Some(self.locks.lock(key).await),
            None => {
                warn!("🔄️ Upserting a payment with no identifiers. It can never be matched by later events.");
                None
            },
        };
        let result = self.db.upsert_payment(ids, fields).await?;
        debug!("🔄️ Upsert for [{ids}]: {result}");
        Ok(result)
    }

    pub async fn payment(&self, id: i64) -> Result<Option<PaymentRecord>, LedgerError> {
        self.db.fetch_payment(id).await
    }

    /// The active rows for a canonical id. Once compaction has run, this has at most one entry.
    pub async fn active_payments(&self, canonical_id: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
        self.db.fetch_active_payments_for_canonical_id(canonical_id).await
    }

    /// Every row, active or merged, that mentions the given payment intent, charge, invoice or canonical id.
    pub async fn payments_for_identifier(&self, identifier: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
        self.db.fetch_payments_for_identifier(identifier).await
    }

    /// The audit trail of a row: the rows that were merged into it.
    pub async fn merged_into(&self, id: i64) -> Result<Vec<PaymentRecord>, LedgerError> {
        self.db.fetch_merged_into(id).await
    }
}

#[cfg(test)]
mod test {
    use futures_util::future::join_all;
    use ledger_common::Cents;
    use serde_json::json;

    use super::*;
    use crate::{
        test_utils::prepare_env::{new_test_database, tear_down},
        SqliteDatabase,
    };

    fn pi_ids(pi: &str) -> PaymentIds {
        PaymentIds::new(Some(pi.into()), None, None)
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let api = PaymentLedgerApi::new(new_test_database().await);
        let fields = PaymentFields::new(Cents::from(500), "usd").with_status("succeeded");
        let first = api.upsert(&pi_ids("pi_1"), fields.clone()).await.unwrap();
        let second = api.upsert(&pi_ids("pi_1"), fields).await.unwrap();
        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.id, second.id);
        let rows = api.active_payments("pi_1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, Cents::from(500));
        assert_eq!(rows[0].status.as_deref(), Some("succeeded"));
        tear_down(api.db().clone()).await;
    }

    #[tokio::test]
    async fn updates_never_erase_known_values() {
        let api = PaymentLedgerApi::new(new_test_database().await);
        let ids = PaymentIds::new(Some("pi_1".into()), Some("ch_1".into()), None);
        let fields = PaymentFields::new(Cents::from(500), "usd")
            .with_status("succeeded")
            .with_user_id(Some("user_1"))
            .with_receipt_email(Some("a@example.com".into()))
            .with_metadata(Some(json!({ "userId": "user_1" })))
            .with_raw_event(json!({ "id": "pi_1" }));
        let id = api.upsert(&ids, fields).await.unwrap().id;

        // A later, sparser observation of the same transaction, arriving through its charge id
        let sparse = PaymentFields::new(Cents::from(700), "eur").with_user_id(Some("user_2"));
        let result = api.upsert(&PaymentIds::new(None, Some("ch_1".into()), Some("in_1".into())), sparse).await.unwrap();
        assert_eq!(result, UpsertResult::updated(id));

        let row = api.payment(id).await.unwrap().unwrap();
        assert_eq!(row.canonical_id.as_deref(), Some("pi_1"));
        assert_eq!(row.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(row.invoice_id.as_deref(), Some("in_1"));
        assert_eq!(row.user_id.as_deref(), Some("user_1"));
        assert_eq!(row.receipt_email.as_deref(), Some("a@example.com"));
        assert_eq!(row.status.as_deref(), Some("succeeded"));
        assert_eq!(row.metadata.as_ref().map(|m| m.0.clone()), Some(json!({ "userId": "user_1" })));
        assert_eq!(row.raw_event.as_ref().map(|m| m.0.clone()), Some(json!({ "id": "pi_1" })));
        assert_eq!(row.amount, Cents::from(700));
        assert_eq!(row.currency, "eur");
        assert!(row.updated_at >= row.created_at);
        tear_down(api.db().clone()).await;
    }

    #[tokio::test]
    async fn payment_method_is_filled_but_never_cleared() {
        let api = PaymentLedgerApi::new(new_test_database().await);
        let fields = PaymentFields::new(Cents::from(500), "usd");
        let id = api.upsert(&pi_ids("pi_1"), fields.clone()).await.unwrap().id;
        assert_eq!(api.payment(id).await.unwrap().unwrap().payment_method, None);

        api.upsert(&pi_ids("pi_1"), fields.clone().with_payment_method(Some("card".into()))).await.unwrap();
        let row = api.payment(id).await.unwrap().unwrap();
        assert_eq!(row.payment_method.as_deref(), Some("card"));

        api.upsert(&pi_ids("pi_1"), fields.clone().with_payment_method(None)).await.unwrap();
        let row = api.payment(id).await.unwrap().unwrap();
        assert_eq!(row.payment_method.as_deref(), Some("card"));

        // The first known value sticks
        api.upsert(&pi_ids("pi_1"), fields.with_payment_method(Some("sepa_debit".into()))).await.unwrap();
        let row = api.payment(id).await.unwrap().unwrap();
        assert_eq!(row.payment_method.as_deref(), Some("card"));
        tear_down(api.db().clone()).await;
    }

    #[tokio::test]
    async fn payment_without_identifiers_is_inserted() {
        let api = PaymentLedgerApi::new(new_test_database().await);
        let fields = PaymentFields::new(Cents::from(100), "usd");
        let a = api.upsert(&PaymentIds::default(), fields.clone()).await.unwrap();
        let b = api.upsert(&PaymentIds::default(), fields).await.unwrap();
        assert!(a.inserted && b.inserted);
        assert_ne!(a.id, b.id);
        tear_down(api.db().clone()).await;
    }

    #[tokio::test]
    async fn concurrent_upserts_produce_one_row() {
        let api: PaymentLedgerApi<SqliteDatabase> = PaymentLedgerApi::new(new_test_database().await);
        let ids = pi_ids("pi_concurrent");
        let writes = (0..10).map(|i| {
            let api = api.clone();
            let ids = ids.clone();
            async move { api.upsert(&ids, PaymentFields::new(Cents::from(100 + i), "usd")).await }
        });
        let results = join_all(writes).await;
        let inserted = results.iter().filter(|r| r.as_ref().map(|r| r.inserted).unwrap_or(false)).count();
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(inserted, 1);
        assert_eq!(api.active_payments("pi_concurrent").await.unwrap().len(), 1);
        tear_down(api.db().clone()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_for_different_payments_all_succeed() {
        let api: PaymentLedgerApi<SqliteDatabase> = PaymentLedgerApi::new(new_test_database().await);
        let writes = (0..40).map(|i| {
            let api = api.clone();
            let ids = pi_ids(&format!("pi_{}", i % 20));
            async move { api.upsert(&ids, PaymentFields::new(Cents::from(100 + i), "usd")).await }
        });
        let results = join_all(writes).await;
        let failures = results.iter().filter_map(|r| r.as_ref().err()).collect::<Vec<_>>();
        assert!(failures.is_empty(), "{} upserts failed: {:?}", failures.len(), failures.first());
        let inserted = results.iter().filter(|r| r.as_ref().map(|r| r.inserted).unwrap_or(false)).count();
        assert_eq!(inserted, 20);
        for i in 0..20 {
            assert_eq!(api.active_payments(&format!("pi_{i}")).await.unwrap().len(), 1);
        }
        tear_down(api.db().clone()).await;
    }
}
