//! Customer model.

use crate::binder::TenantTransaction;
use crate::error::DbError;
use crate::models::versioned::Versioned;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopdesk_core::{CustomerId, PageParams, TenantId, TenantScoped};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for Customer {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

impl Versioned for Customer {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    /// One page of customers, ordered by name, plus the total count.
    pub async fn list(
        tx: &mut TenantTransaction,
        params: &PageParams,
    ) -> Result<(Vec<Self>, u64), DbError> {
        let tenant_id = tx.tenant_id();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(tx.conn())
            .await?;

        let rows: Vec<Self> = sqlx::query_as(
            r#"
            SELECT * FROM customers
            ORDER BY name, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(tx.conn())
        .await?;

        for row in &rows {
            row.ensure_tenant(tenant_id)?;
        }
        Ok((rows, u64::try_from(total).unwrap_or_default()))
    }

    pub async fn find_by_id(
        tx: &mut TenantTransaction,
        id: CustomerId,
    ) -> Result<Option<Self>, DbError> {
        let row: Option<Self> = sqlx::query_as("SELECT * FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(tx.conn())
            .await?;

        if let Some(customer) = &row {
            customer.ensure_tenant(tx.tenant_id())?;
        }
        Ok(row)
    }

    pub async fn create(tx: &mut TenantTransaction, input: &CreateCustomer) -> Result<Self, DbError> {
        if input.name.trim().is_empty() {
            return Err(DbError::ValidationFailed("name must not be empty".into()));
        }

        let row: Self = sqlx::query_as(
            r#"
            INSERT INTO customers (tenant_id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tx.tenant_id().as_uuid())
        .bind(input.name.trim())
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_one(tx.conn())
        .await?;

        Ok(row)
    }
}
