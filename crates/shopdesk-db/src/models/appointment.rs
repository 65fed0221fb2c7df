//! Appointment model.

use crate::binder::TenantTransaction;
use crate::error::DbError;
use crate::models::versioned::{stale_write, Versioned};
use crate::policy::TenantTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopdesk_core::{AppointmentId, CustomerId, TenantId, TenantScoped};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for Appointment {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

impl Versioned for Appointment {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointment {
    pub customer_id: CustomerId,
    pub vehicle_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Partial update. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentPatch {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

impl AppointmentPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scheduled_at.is_none() && self.status.is_none() && self.notes.is_none()
    }
}

impl Appointment {
    pub async fn find_by_id(
        tx: &mut TenantTransaction,
        id: AppointmentId,
    ) -> Result<Option<Self>, DbError> {
        let row: Option<Self> = sqlx::query_as("SELECT * FROM appointments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(tx.conn())
            .await?;

        if let Some(appointment) = &row {
            appointment.ensure_tenant(tx.tenant_id())?;
        }
        Ok(row)
    }

    pub async fn create(
        tx: &mut TenantTransaction,
        input: &CreateAppointment,
    ) -> Result<Self, DbError> {
        let row: Self = sqlx::query_as(
            r#"
            INSERT INTO appointments (tenant_id, customer_id, vehicle_id, scheduled_at, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(tx.tenant_id().as_uuid())
        .bind(input.customer_id.as_uuid())
        .bind(input.vehicle_id)
        .bind(input.scheduled_at)
        .bind(&input.notes)
        .fetch_one(tx.conn())
        .await?;

        Ok(row)
    }

    /// Apply `patch` if the row is still at `expected_version`.
    ///
    /// The write and the version bump are one statement, so a concurrent
    /// writer that committed first makes this fail with
    /// `DbError::VersionConflict`.
    pub async fn update(
        tx: &mut TenantTransaction,
        id: AppointmentId,
        patch: &AppointmentPatch,
        expected_version: i64,
    ) -> Result<Self, DbError> {
        let row: Option<Self> = sqlx::query_as(
            r#"
            UPDATE appointments
            SET scheduled_at = COALESCE($3, scheduled_at),
                status = COALESCE($4, status),
                notes = COALESCE($5, notes),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .bind(patch.scheduled_at)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.notes)
        .fetch_optional(tx.conn())
        .await?;

        match row {
            Some(appointment) => {
                appointment.ensure_tenant(tx.tenant_id())?;
                Ok(appointment)
            }
            None => Err(stale_write(tx, TenantTable::Appointments, *id.as_uuid()).await),
        }
    }
}
