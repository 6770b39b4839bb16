//! PostgreSQL implementation of the PaymentLedger port.
//!
//! The `payments_reference_key` unique index makes `start` the idempotency
//! gate, and the conditional `finish` update makes the started-to-terminal
//! transition a one-winner race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{LedgerError, NewPayment, Payment, PaymentStatus};
use crate::domain::catalog::ProductCode;
use crate::domain::foundation::Timestamp;
use crate::ports::PaymentLedger;

pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reference: String,
    user_id: Option<Uuid>,
    product_code: String,
    amount: f64,
    status: String,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            product_code: ProductCode::new(row.product_code),
            amount: row.amount,
            status: parse_status(&row.status)?,
            data: row.data,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_status(s: &str) -> Result<PaymentStatus, LedgerError> {
    match s {
        "started" => Ok(PaymentStatus::Started),
        "success" => Ok(PaymentStatus::Success),
        "failed" => Ok(PaymentStatus::Failed),
        _ => Err(LedgerError::Storage(format!("Invalid status value: {}", s))),
    }
}

const PAYMENT_COLUMNS: &str =
    "id, reference, user_id, product_code, amount, status, data, created_at";

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn start(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        let row: PaymentRow = sqlx::query_as(
            r#"
            INSERT INTO payments (id, reference, user_id, product_code, amount, status, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            RETURNING id, reference, user_id, product_code, amount, status, data, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&payment.reference)
        .bind(payment.user_id)
        .bind(payment.product_code.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("payments_reference_key") {
                    return LedgerError::DuplicateReference(payment.reference.clone());
                }
            }
            LedgerError::Storage(format!("Failed to record payment: {}", e))
        })?;

        row.try_into()
    }

    async fn get(&self, reference: &str) -> Result<Option<Payment>, LedgerError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("Failed to fetch payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, LedgerError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(format!("Failed to fetch payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn finish(
        &self,
        reference: &str,
        status: PaymentStatus,
        data: serde_json::Value,
    ) -> Result<Payment, LedgerError> {
        // Of two concurrent deliveries exactly one matches the started row.
        // The provider payload is merged over the stored data so markers
        // written at checkout time (the invite target) survive finalization.
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = $2, data = data || $3
            WHERE reference = $1 AND status = 'started'
            RETURNING id, reference, user_id, product_code, amount, status, data, created_at
            "#,
        )
        .bind(reference)
        .bind(status.as_str())
        .bind(&data)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("Failed to finalize payment: {}", e)))?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get(reference).await? {
                Some(_) => Err(LedgerError::AlreadyFinalized(reference.to_string())),
                None => Err(LedgerError::PaymentNotFound(reference.to_string())),
            },
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, LedgerError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("Failed to list payments: {}", e)))?;

        rows.into_iter().map(Payment::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_works_for_all_values() {
        assert_eq!(parse_status("started").unwrap(), PaymentStatus::Started);
        assert_eq!(parse_status("success").unwrap(), PaymentStatus::Success);
        assert_eq!(parse_status("failed").unwrap(), PaymentStatus::Failed);
    }

    #[test]
    fn parse_status_rejects_invalid_values() {
        assert!(parse_status("pending").is_err());
        assert!(parse_status("").is_err());
    }

    #[test]
    fn roundtrip_status_conversion() {
        for status in [
            PaymentStatus::Started,
            PaymentStatus::Success,
            PaymentStatus::Failed,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
    }
}
