//! PostgreSQL implementation of the InviteRepository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::invite::Invite;
use crate::ports::{InviteRepository, NewInvite};

pub struct PostgresInviteRepository {
    pool: PgPool,
}

impl PostgresInviteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an invite.
#[derive(Debug, sqlx::FromRow)]
struct InviteRow {
    id: Uuid,
    code: String,
    owner_id: Uuid,
    payment_id: Uuid,
    created_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    invited_email: Option<String>,
    invited_user_id: Option<Uuid>,
}

impl From<InviteRow> for Invite {
    fn from(row: InviteRow) -> Self {
        Invite {
            id: row.id,
            code: row.code,
            owner_id: row.owner_id,
            payment_id: row.payment_id,
            created_at: Timestamp::from_datetime(row.created_at),
            used_at: row.used_at.map(Timestamp::from_datetime),
            invited_email: row.invited_email,
            invited_user_id: row.invited_user_id,
        }
    }
}

const INVITE_COLUMNS: &str =
    "id, code, owner_id, payment_id, created_at, used_at, invited_email, invited_user_id";

#[async_trait]
impl InviteRepository for PostgresInviteRepository {
    async fn create(&self, invite: NewInvite) -> Result<Invite, DomainError> {
        let row: InviteRow = sqlx::query_as(
            r#"
            INSERT INTO invites (id, code, owner_id, payment_id, created_at, invited_email)
            VALUES ($1, $2, $3, $4, now(), $5)
            RETURNING id, code, owner_id, payment_id, created_at, used_at,
                      invited_email, invited_user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&invite.code)
        .bind(invite.owner_id)
        .bind(invite.payment_id)
        .bind(&invite.invited_email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("invites_code_key") {
                    return DomainError::new(
                        ErrorCode::ValidationFailed,
                        format!("Invite code {} already exists", invite.code),
                    );
                }
            }
            DomainError::database(format!("Failed to create invite: {}", e))
        })?;

        Ok(row.into())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Invite>, DomainError> {
        let row: Option<InviteRow> = sqlx::query_as(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find invite: {}", e)))?;

        Ok(row.map(Invite::from))
    }

    async fn mark_used(
        &self,
        invite_id: Uuid,
        user_id: Uuid,
        used_at: Timestamp,
    ) -> Result<bool, DomainError> {
        // Conditional on used_at so only one of two concurrent redeemers
        // flips the row.
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET used_at = $3, invited_user_id = $2
            WHERE id = $1 AND used_at IS NULL
            "#,
        )
        .bind(invite_id)
        .bind(user_id)
        .bind(used_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to mark invite used: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, invite_id: Uuid, user_id: Uuid) -> Result<bool, DomainError> {
        // Scoped to the claiming user so a claim won by someone else is
        // never undone.
        let result = sqlx::query(
            r#"
            UPDATE invites
            SET used_at = NULL, invited_user_id = NULL
            WHERE id = $1 AND invited_user_id = $2 AND used_at IS NOT NULL
            "#,
        )
        .bind(invite_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to release invite: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Invite>, DomainError> {
        let rows: Vec<InviteRow> = sqlx::query_as(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list invites: {}", e)))?;

        Ok(rows.into_iter().map(Invite::from).collect())
    }
}
