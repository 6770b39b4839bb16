//! PostgreSQL implementation of the SubscriptionStore port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{NewSubscription, Subscription, SubscriptionStatus};
use crate::domain::catalog::ProductCode;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::SubscriptionStore;

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a recurring agreement.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    subscription_id: String,
    user_id: Uuid,
    product_code: String,
    amount: f64,
    reference: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            subscription_id: row.subscription_id,
            user_id: row.user_id,
            product_code: ProductCode::new(row.product_code),
            amount: row.amount,
            reference: row.reference,
            status: parse_status(&row.status)?,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "active" => Ok(SubscriptionStatus::Active),
        "stopped" => Ok(SubscriptionStatus::Stopped),
        _ => Err(DomainError::database(format!("Invalid status value: {}", s))),
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn create(&self, subscription: NewSubscription) -> Result<Subscription, DomainError> {
        // Replayed first-charge webhooks hit the conflict branch; the no-op
        // DO UPDATE makes RETURNING yield the existing row unchanged.
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (
                id, subscription_id, user_id, product_code, amount, reference, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'active', now())
            ON CONFLICT (subscription_id)
                DO UPDATE SET subscription_id = EXCLUDED.subscription_id
            RETURNING id, subscription_id, user_id, product_code, amount, reference, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&subscription.subscription_id)
        .bind(subscription.user_id)
        .bind(subscription.product_code.as_str())
        .bind(subscription.amount)
        .bind(&subscription.reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record subscription: {}", e)))?;

        row.try_into()
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, user_id, product_code, amount, reference, status, created_at
            FROM subscriptions
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn stop(&self, subscription_id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'stopped' \
             WHERE subscription_id = $1 AND status = 'active'",
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to stop subscription: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
