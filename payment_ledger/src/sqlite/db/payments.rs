use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{PaymentFields, PaymentIds, PaymentRecord},
    traits::{DedupResult, HeuristicQuery, InvoiceLink, LedgerError, UnlinkedPaymentFilter, UpsertResult},
};

/// Finds the active payment matching any of the non-null identifiers, or inserts a new one.
///
/// This is not atomic. Call it inside a transaction, passing `&mut *tx` as the connection.
pub async fn upsert_payment(
    ids: &PaymentIds,
    fields: PaymentFields,
    conn: &mut SqliteConnection,
) -> Result<UpsertResult, LedgerError> {
    let now = Utc::now();
    match find_active_match(ids, &mut *conn).await? {
        Some(existing) => {
            update_matched_payment(existing.id, ids, fields, now, conn).await?;
            trace!("🗃️ Payment #{} matched [{ids}] and was updated", existing.id);
            Ok(UpsertResult::updated(existing.id))
        },
        None => {
            let id = insert_payment(ids, fields, now, conn).await?;
            debug!("🗃️ New payment #{id} inserted for [{ids}]");
            Ok(UpsertResult::inserted(id))
        },
    }
}

/// The active row matching any of the given identifiers in its corresponding column. The most recently updated row
/// wins, and the lowest row id breaks ties.
pub async fn find_active_match(
    ids: &PaymentIds,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::new("SELECT * FROM payments WHERE merged_into_id IS NULL AND (");
    let mut any_of = builder.separated(" OR ");
    if let Some(pi) = &ids.payment_intent_id {
        any_of.push("payment_intent_id = ");
        any_of.push_bind_unseparated(pi.clone());
    }
    if let Some(charge) = &ids.charge_id {
        any_of.push("charge_id = ");
        any_of.push_bind_unseparated(charge.clone());
    }
    if let Some(invoice) = &ids.invoice_id {
        any_of.push("invoice_id = ");
        any_of.push_bind_unseparated(invoice.clone());
    }
    builder.push(") ORDER BY updated_at DESC, id ASC LIMIT 1");
    trace!("🗃️ Executing query: {}", builder.sql());
    let payment = builder.build_query_as::<PaymentRecord>().fetch_optional(conn).await?;
    Ok(payment)
}

async fn insert_payment(
    ids: &PaymentIds,
    fields: PaymentFields,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO payments (
                canonical_id,
                payment_intent_id,
                charge_id,
                invoice_id,
                user_id,
                amount,
                currency,
                status,
                payment_method,
                receipt_email,
                description,
                metadata,
                raw_event,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING id;
        "#,
    )
    .bind(ids.canonical_id.as_deref())
    .bind(ids.payment_intent_id.as_deref())
    .bind(ids.charge_id.as_deref())
    .bind(ids.invoice_id.as_deref())
    .bind(fields.user_id)
    .bind(fields.amount)
    .bind(fields.currency)
    .bind(fields.status)
    .bind(fields.payment_method)
    .bind(fields.receipt_email)
    .bind(fields.description)
    .bind(fields.metadata.map(Json))
    .bind(fields.raw_event.map(Json))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Identity fields are only ever filled in. Amount and currency always take the new value. Status, metadata and the
/// raw event take the new value unless it is null.
async fn update_matched_payment(
    id: i64,
    ids: &PaymentIds,
    fields: PaymentFields,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE payments SET
                canonical_id = COALESCE(canonical_id, $1),
                payment_intent_id = COALESCE(payment_intent_id, $2),
                charge_id = COALESCE(charge_id, $3),
                invoice_id = COALESCE(invoice_id, $4),
                user_id = COALESCE(user_id, $5),
                description = COALESCE(description, $6),
                payment_method = COALESCE(payment_method, $7),
                receipt_email = COALESCE(receipt_email, $8),
                amount = $9,
                currency = $10,
                status = COALESCE($11, status),
                metadata = COALESCE($12, metadata),
                raw_event = COALESCE($13, raw_event),
                updated_at = $14
            WHERE id = $15
        "#,
    )
    .bind(ids.canonical_id.as_deref())
    .bind(ids.payment_intent_id.as_deref())
    .bind(ids.charge_id.as_deref())
    .bind(ids.invoice_id.as_deref())
    .bind(fields.user_id)
    .bind(fields.description)
    .bind(fields.payment_method)
    .bind(fields.receipt_email)
    .bind(fields.amount)
    .bind(fields.currency)
    .bind(fields.status)
    .bind(fields.metadata.map(Json))
    .bind(fields.raw_event.map(Json))
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

/// Fetches the payment, failing if it does not exist or has already been merged into another row.
pub async fn fetch_active_payment(id: i64, conn: &mut SqliteConnection) -> Result<PaymentRecord, LedgerError> {
    let payment = fetch_payment(id, conn).await?.ok_or(LedgerError::PaymentNotFound(id))?;
    if payment.is_active() {
        Ok(payment)
    } else {
        Err(LedgerError::RowNotActive(id))
    }
}

pub async fn fetch_active_for_canonical_id(
    canonical_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let payments = sqlx::query_as(
        "SELECT * FROM payments WHERE canonical_id = $1 AND merged_into_id IS NULL ORDER BY updated_at DESC, id ASC",
    )
    .bind(canonical_id)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn fetch_for_identifier(
    identifier: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
        SELECT * FROM payments
        WHERE canonical_id = $1 OR payment_intent_id = $1 OR charge_id = $1 OR invoice_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(identifier)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn fetch_merged_into(id: i64, conn: &mut SqliteConnection) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE merged_into_id = $1 ORDER BY id ASC")
        .bind(id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Active rows with an invoice id that are missing their payment intent or charge id, oldest first.
pub async fn fetch_unlinked_invoice_payments(
    filter: UnlinkedPaymentFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM payments
    WHERE merged_into_id IS NULL
      AND invoice_id IS NOT NULL
      AND (payment_intent_id IS NULL OR charge_id IS NULL)
    "#,
    );
    if let Some(invoice_id) = filter.invoice_id {
        builder.push(" AND invoice_id = ");
        builder.push_bind(invoice_id);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let payments = builder.build_query_as::<PaymentRecord>().fetch_all(conn).await?;
    Ok(payments)
}

/// The active row other than `exclude_id` that carries `identity` as its payment intent id or canonical id.
pub async fn find_canonical_row(
    identity: &str,
    exclude_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        SELECT * FROM payments
        WHERE merged_into_id IS NULL
          AND id != $2
          AND (payment_intent_id = $1 OR canonical_id = $1)
        ORDER BY updated_at DESC, id ASC
        LIMIT 1
        "#,
    )
    .bind(identity)
    .bind(exclude_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Fills in the row's missing payment intent and charge ids from the link, and its missing invoice id and descriptive
/// fields from the `source` row that is being folded into it. Takes the link's status if it has one.
pub async fn fill_links(
    id: i64,
    source: &PaymentRecord,
    link: &InvoiceLink,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"
            UPDATE payments SET
                payment_intent_id = COALESCE(payment_intent_id, $1),
                charge_id = COALESCE(charge_id, $2),
                invoice_id = COALESCE(invoice_id, $3),
                user_id = COALESCE(user_id, $4),
                payment_method = COALESCE(payment_method, $5),
                receipt_email = COALESCE(receipt_email, $6),
                description = COALESCE(description, $7),
                status = COALESCE($8, status),
                updated_at = $9
            WHERE id = $10 AND merged_into_id IS NULL
        "#,
    )
    .bind(link.payment_intent_id.as_deref())
    .bind(link.charge_id.as_deref())
    .bind(source.invoice_id.as_deref())
    .bind(source.user_id.as_deref())
    .bind(source.payment_method.as_deref())
    .bind(source.receipt_email.as_deref())
    .bind(source.description.as_deref())
    .bind(link.status.as_deref())
    .bind(Utc::now())
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RowNotActive(id));
    }
    Ok(())
}

/// Like [`fill_links`], but also makes the link identity the row's canonical id.
pub async fn promote(id: i64, link: &InvoiceLink, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"
            UPDATE payments SET
                payment_intent_id = COALESCE(payment_intent_id, $1),
                charge_id = COALESCE(charge_id, $2),
                canonical_id = COALESCE($3, canonical_id),
                status = COALESCE($4, status),
                updated_at = $5
            WHERE id = $6 AND merged_into_id IS NULL
        "#,
    )
    .bind(link.payment_intent_id.as_deref())
    .bind(link.charge_id.as_deref())
    .bind(link.identity())
    .bind(link.status.as_deref())
    .bind(Utc::now())
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RowNotActive(id));
    }
    Ok(())
}

/// Marks `source_id` as absorbed by `target_id`. The source row is kept, but is inactive from now on.
///
/// If `canonical_id` is given, the source's canonical id is set to it, so that the audit trail shows which
/// transaction the source turned out to be.
pub async fn soft_merge(
    source_id: i64,
    target_id: i64,
    canonical_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    if source_id == target_id {
        return Err(LedgerError::SelfMerge(source_id));
    }
    let now = Utc::now();
    let result = sqlx::query(
        r#"
            UPDATE payments SET
                canonical_id = COALESCE($1, canonical_id),
                merged_into_id = $2,
                merged_at = $3,
                updated_at = $3
            WHERE id = $4 AND merged_into_id IS NULL
        "#,
    )
    .bind(canonical_id)
    .bind(target_id)
    .bind(now)
    .bind(source_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RowNotActive(source_id));
    }
    debug!("🗃️ Payment #{source_id} soft-merged into #{target_id}");
    Ok(())
}

pub async fn find_heuristic_candidate(
    query: HeuristicQuery,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM payments
    WHERE merged_into_id IS NULL
      AND payment_intent_id IS NOT NULL
    "#,
    );
    builder.push(" AND amount = ");
    builder.push_bind(query.amount);
    builder.push(" AND id != ");
    builder.push_bind(query.exclude_id);
    if let Some(since) = query.since {
        builder.push(" AND updated_at >= ");
        builder.push_bind(since);
    }
    builder.push(" ORDER BY updated_at DESC, id ASC LIMIT 1");
    trace!("🗃️ Executing query: {}", builder.sql());
    let candidate = builder.build_query_as::<PaymentRecord>().fetch_optional(conn).await?;
    Ok(candidate)
}

pub async fn mark_succeeded(id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE payments SET status = 'succeeded', updated_at = $1 WHERE id = $2 AND merged_into_id IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RowNotActive(id));
    }
    Ok(())
}

pub async fn delete_payment(id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query("DELETE FROM payments WHERE id = $1").bind(id).execute(conn).await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::PaymentNotFound(id));
    }
    debug!("🗃️ Payment #{id} deleted");
    Ok(())
}

/// Deletes every active row that shares its canonical id with a more recently updated active row (lowest id wins
/// ties). Inactive rows that point at a deleted row are re-pointed at the survivor first.
///
/// This is not atomic. Call it inside a transaction.
pub async fn compact_duplicates(conn: &mut SqliteConnection) -> Result<DedupResult, sqlx::Error> {
    let duplicates: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        WITH ranked AS (
            SELECT
                id,
                FIRST_VALUE(id) OVER (PARTITION BY canonical_id ORDER BY updated_at DESC, id ASC) AS survivor_id,
                ROW_NUMBER() OVER (PARTITION BY canonical_id ORDER BY updated_at DESC, id ASC) AS rn
            FROM payments
            WHERE canonical_id IS NOT NULL AND merged_into_id IS NULL
        )
        SELECT id, survivor_id FROM ranked WHERE rn > 1 ORDER BY id ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    let mut repointed = 0;
    let mut deleted = Vec::with_capacity(duplicates.len());
    for (id, survivor_id) in duplicates {
        let result = sqlx::query("UPDATE payments SET merged_into_id = $1 WHERE merged_into_id = $2")
            .bind(survivor_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        repointed += result.rows_affected();
        sqlx::query("DELETE FROM payments WHERE id = $1").bind(id).execute(&mut *conn).await?;
        trace!("🗃️ Duplicate payment #{id} removed in favour of #{survivor_id}");
        deleted.push(id);
    }
    Ok(DedupResult::new(deleted, repointed))
}
