//! Invoice model.

use crate::binder::TenantTransaction;
use crate::error::DbError;
use crate::models::versioned::Versioned;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopdesk_core::{CustomerId, InvoiceId, TenantId, TenantScoped};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub number: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantScoped for Invoice {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

impl Versioned for Invoice {
    fn version(&self) -> i64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub customer_id: CustomerId,
    pub appointment_id: Option<Uuid>,
    pub total_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CreateInvoice {
    pub fn validate(&self) -> Result<(), DbError> {
        if self.total_cents < 0 {
            return Err(DbError::ValidationFailed("total_cents must not be negative".into()));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DbError::ValidationFailed(
                "currency must be a three-letter ISO 4217 code".into(),
            ));
        }
        Ok(())
    }
}

impl Invoice {
    pub async fn create(tx: &mut TenantTransaction, input: &CreateInvoice) -> Result<Self, DbError> {
        input.validate()?;

        let id = Uuid::new_v4();
        let number = format!("INV-{}", &id.simple().to_string()[..8].to_ascii_uppercase());

        let row: Self = sqlx::query_as(
            r#"
            INSERT INTO invoices (id, tenant_id, customer_id, appointment_id, number, total_cents, currency)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tx.tenant_id().as_uuid())
        .bind(input.customer_id.as_uuid())
        .bind(input.appointment_id)
        .bind(&number)
        .bind(input.total_cents)
        .bind(&input.currency)
        .fetch_one(tx.conn())
        .await?;

        tracing::info!(invoice_id = %row.id, number = %row.number, "Invoice created");
        Ok(row)
    }

    pub async fn find_by_id(
        tx: &mut TenantTransaction,
        id: InvoiceId,
    ) -> Result<Option<Self>, DbError> {
        let row: Option<Self> = sqlx::query_as("SELECT * FROM invoices WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(tx.conn())
            .await?;

        if let Some(invoice) = &row {
            invoice.ensure_tenant(tx.tenant_id())?;
        }
        Ok(row)
    }

    /// Number of invoices visible to the bound tenant.
    pub async fn count(tx: &mut TenantTransaction) -> Result<i64, DbError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(tx.conn())
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(total_cents: i64, currency: &str) -> CreateInvoice {
        CreateInvoice {
            customer_id: CustomerId::new(),
            appointment_id: None,
            total_cents,
            currency: currency.to_string(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(input(12_500, "USD").validate().is_ok());
        assert!(input(-1, "USD").validate().is_err());
        assert!(input(100, "usd").validate().is_err());
        assert!(input(100, "EURO").validate().is_err());
    }

    #[test]
    fn test_currency_defaults_to_usd() {
        let json = format!(r#"{{"customer_id": "{}", "total_cents": 100}}"#, CustomerId::new());
        let parsed: CreateInvoice = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.currency, "USD");
    }
}
