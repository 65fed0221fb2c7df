//! Stored responses for idempotent write requests.
//!
//! A record is keyed by `(tenant_id, route, idempotency_key)`. It is claimed
//! inside the same tenant transaction as the business write and completed
//! with the response before commit, so either both persist or neither does.
//! Expiry is checked at read time; the sweeper only reclaims space.

use crate::binder::TenantTransaction;
use crate::error::DbError;
use crate::pool::DbPool;
use chrono::{DateTime, Duration, Utc};
use shopdesk_core::{TenantId, TenantScoped};
use sqlx::FromRow;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

/// Default lifetime of a record.
pub const IDEMPOTENCY_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub route: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub response_status: Option<i16>,
    pub response_body: Option<Vec<u8>>,
    pub response_content_type: Option<String>,
    pub response_etag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TenantScoped for IdempotencyRecord {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

/// Identity of a request under idempotency control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyScope {
    /// `"{METHOD} {route template}"`
    pub route: String,
    pub idempotency_key: String,
    pub request_hash: String,
}

/// Response captured for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// `ETag` of a conditional write, replayed with the body.
    pub etag: Option<String>,
}

/// What to do with a request given the live record for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayDecision {
    /// No live record: run the handler.
    Execute,
    /// Same payload seen before: return the stored response.
    Replay(StoredResponse),
    /// Same key, different payload.
    KeyConflict,
    /// A record exists but holds no response. Only possible if a caller
    /// committed without completing the claim.
    Incomplete,
}

/// Result of [`IdempotencyRecord::claim`].
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This request owns the key; complete the record before committing.
    Claimed(IdempotencyRecord),
    /// A record already exists. `observed_at` is the database clock of the
    /// claiming transaction; judge expiry against it, not the local clock.
    Existing {
        record: IdempotencyRecord,
        observed_at: DateTime<Utc>,
    },
}

#[derive(Debug, FromRow)]
struct ObservedRecord {
    #[sqlx(flatten)]
    record: IdempotencyRecord,
    observed_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Decision table for a request carrying `request_hash`.
    #[must_use]
    pub fn decide(&self, request_hash: &str, now: DateTime<Utc>) -> ReplayDecision {
        if self.is_expired(now) {
            return ReplayDecision::Execute;
        }
        if self.request_hash != request_hash {
            return ReplayDecision::KeyConflict;
        }
        match (self.response_status, &self.response_body) {
            (Some(status), Some(body)) => ReplayDecision::Replay(StoredResponse {
                status: u16::try_from(status).unwrap_or(500),
                body: body.clone(),
                content_type: self.response_content_type.clone(),
                etag: self.response_etag.clone(),
            }),
            _ => ReplayDecision::Incomplete,
        }
    }

    /// Claim the key for this request, or return the live record.
    ///
    /// An expired record is taken over in place. Concurrent claims of the
    /// same key serialize on the unique index: the second waits until the
    /// first transaction ends and then sees its record, or claims the key
    /// itself if the first rolled back.
    #[instrument(skip(tx, scope), fields(tenant_id = %tx.tenant_id(), route = %scope.route))]
    pub async fn claim(
        tx: &mut TenantTransaction,
        scope: &IdempotencyScope,
        ttl: Duration,
    ) -> Result<ClaimOutcome, DbError> {
        let tenant_id = tx.tenant_id();

        let claimed: Option<IdempotencyRecord> = sqlx::query_as(
            r#"
            INSERT INTO idempotency_records (
                tenant_id, route, idempotency_key, request_hash, expires_at
            )
            VALUES ($1, $2, $3, $4, NOW() + $5 * INTERVAL '1 second')
            ON CONFLICT (tenant_id, route, idempotency_key) DO UPDATE
                SET request_hash = EXCLUDED.request_hash,
                    response_status = NULL,
                    response_body = NULL,
                    response_content_type = NULL,
                    response_etag = NULL,
                    created_at = NOW(),
                    expires_at = EXCLUDED.expires_at
                WHERE idempotency_records.expires_at <= NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(&scope.route)
        .bind(&scope.idempotency_key)
        .bind(&scope.request_hash)
        .bind(ttl.num_seconds())
        .fetch_optional(tx.conn())
        .await?;

        if let Some(record) = claimed {
            record.ensure_tenant(tenant_id)?;
            return Ok(ClaimOutcome::Claimed(record));
        }

        let existing: ObservedRecord = sqlx::query_as(
            r#"
            SELECT *, NOW() AS observed_at FROM idempotency_records
            WHERE tenant_id = $1 AND route = $2 AND idempotency_key = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(&scope.route)
        .bind(&scope.idempotency_key)
        .fetch_optional(tx.conn())
        .await?
        .ok_or_else(|| DbError::NotFound("idempotency record vanished after conflict".into()))?;

        existing.record.ensure_tenant(tenant_id)?;
        Ok(ClaimOutcome::Existing {
            record: existing.record,
            observed_at: existing.observed_at,
        })
    }

    /// Store the response of a claimed record.
    pub async fn complete(
        tx: &mut TenantTransaction,
        id: Uuid,
        response: &StoredResponse,
    ) -> Result<(), DbError> {
        let status = i16::try_from(response.status)
            .map_err(|_| DbError::ValidationFailed(format!("status {}", response.status)))?;

        let result = sqlx::query(
            r#"
            UPDATE idempotency_records
            SET response_status = $2,
                response_body = $3,
                response_content_type = $4,
                response_etag = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(&response.body)
        .bind(&response.content_type)
        .bind(&response.etag)
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("idempotency record {id}")));
        }
        Ok(())
    }

    /// Delete expired records of the transaction's tenant.
    pub async fn delete_expired(tx: &mut TenantTransaction) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= NOW()")
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected())
    }
}

/// Delete expired records of every tenant, one bound transaction per tenant.
pub async fn sweep_expired(pool: &DbPool) -> Result<u64, DbError> {
    let tenants: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM tenants ORDER BY id")
        .fetch_all(pool.inner())
        .await?;

    let mut total = 0;
    for tenant in tenants {
        let mut tx = TenantTransaction::begin(pool, TenantId::from_uuid(tenant)).await?;
        let deleted = IdempotencyRecord::delete_expired(&mut tx).await?;
        tx.commit().await?;
        total += deleted;
    }

    if total > 0 {
        tracing::info!(deleted = total, "Expired idempotency records swept");
    }
    Ok(total)
}

/// Run [`sweep_expired`] every `interval`.
pub fn spawn_idempotency_sweeper(pool: DbPool, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&pool).await {
                tracing::warn!(error = %e, "Idempotency sweep failed");
            }
        }
    })
}
