//! PostgreSQL implementation of the UserDirectory port.
//!
//! `extend_membership` is the load-bearing query: the GREATEST clamp and
//! the legacy-platform migration happen in one statement, so concurrent
//! activations for the same user serialize on the row and both land.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{Member, MembershipExtension, MembershipPlatform, ModerationStatus, UserDirectory};

pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of the membership view of a user.
#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    email: String,
    membership_expires_at: DateTime<Utc>,
    membership_platform: String,
    membership_platform_data: serde_json::Value,
    moderation_status: String,
    customer_id: Option<String>,
}

impl TryFrom<MemberRow> for Member {
    type Error = DomainError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Member {
            id: row.id,
            email: row.email,
            membership_expires_at: Timestamp::from_datetime(row.membership_expires_at),
            membership_platform: parse_platform(&row.membership_platform)?,
            membership_platform_data: row.membership_platform_data,
            moderation_status: parse_moderation_status(&row.moderation_status)?,
            customer_id: row.customer_id,
        })
    }
}

fn parse_platform(s: &str) -> Result<MembershipPlatform, DomainError> {
    match s {
        "direct" => Ok(MembershipPlatform::Direct),
        "patreon" => Ok(MembershipPlatform::Patreon),
        "crypto" => Ok(MembershipPlatform::Crypto),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid platform value: {}", s),
        )),
    }
}

fn parse_moderation_status(s: &str) -> Result<ModerationStatus, DomainError> {
    match s {
        "intro" => Ok(ModerationStatus::Intro),
        "on_review" => Ok(ModerationStatus::OnReview),
        "approved" => Ok(ModerationStatus::Approved),
        "rejected" => Ok(ModerationStatus::Rejected),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid moderation status value: {}", s),
        )),
    }
}

const MEMBER_COLUMNS: &str = "id, email, membership_expires_at, membership_platform, \
                              membership_platform_data, moderation_status, customer_id";

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn get_or_create_by_email(
        &self,
        email: &str,
        platform: MembershipPlatform,
    ) -> Result<Member, DomainError> {
        let email = email.trim().to_lowercase();

        // The no-op DO UPDATE makes RETURNING yield the row in both the
        // insert and the conflict case.
        let row: MemberRow = sqlx::query_as(
            r#"
            INSERT INTO users (
                id, email, membership_expires_at, membership_platform,
                membership_platform_data, moderation_status, customer_id
            ) VALUES ($1, $2, now(), $3, '{}'::jsonb, 'intro', NULL)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, membership_expires_at, membership_platform,
                      membership_platform_data, moderation_status, customer_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to get or create user: {}", e)))?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>, DomainError> {
        let row: Option<MemberRow> =
            sqlx::query_as(&format!("SELECT {MEMBER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to find user: {}", e)))?;

        row.map(Member::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Member>, DomainError> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find user: {}", e)))?;

        row.map(Member::try_from).transpose()
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Member>, DomainError> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM users WHERE customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find user: {}", e)))?;

        row.map(Member::try_from).transpose()
    }

    async fn link_customer_id(&self, email: &str, customer_id: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE users SET customer_id = $2 WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to link customer id: {}", e)))?;

        Ok(())
    }

    async fn extend_membership(
        &self,
        user_id: Uuid,
        duration: Duration,
        platform_data: serde_json::Value,
    ) -> Result<MembershipExtension, DomainError> {
        #[derive(Debug, sqlx::FromRow)]
        struct ExtensionRow {
            id: Uuid,
            email: String,
            membership_expires_at: DateTime<Utc>,
            membership_platform: String,
            membership_platform_data: serde_json::Value,
            moderation_status: String,
            customer_id: Option<String>,
            previous_expires_at: DateTime<Utc>,
        }

        let row: Option<ExtensionRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET membership_expires_at =
                    GREATEST(users.membership_expires_at, now()) + make_interval(secs => $2),
                membership_platform = CASE
                    WHEN users.membership_platform = 'patreon' THEN 'direct'
                    ELSE users.membership_platform
                END,
                membership_platform_data = $3
            FROM (SELECT id, membership_expires_at FROM users WHERE id = $1 FOR UPDATE) AS previous
            WHERE users.id = previous.id
            RETURNING users.id, users.email, users.membership_expires_at,
                      users.membership_platform, users.membership_platform_data,
                      users.moderation_status, users.customer_id,
                      previous.membership_expires_at AS previous_expires_at
            "#,
        )
        .bind(user_id)
        .bind(duration.num_seconds() as f64)
        .bind(&platform_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to extend membership: {}", e)))?;

        let row = row.ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, format!("No user with id {}", user_id))
        })?;

        let previous_expires_at = Timestamp::from_datetime(row.previous_expires_at);
        let member = Member::try_from(MemberRow {
            id: row.id,
            email: row.email,
            membership_expires_at: row.membership_expires_at,
            membership_platform: row.membership_platform,
            membership_platform_data: row.membership_platform_data,
            moderation_status: row.moderation_status,
            customer_id: row.customer_id,
        })?;

        Ok(MembershipExtension {
            member,
            previous_expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_platform_works_for_all_values() {
        assert_eq!(parse_platform("direct").unwrap(), MembershipPlatform::Direct);
        assert_eq!(parse_platform("patreon").unwrap(), MembershipPlatform::Patreon);
        assert_eq!(parse_platform("crypto").unwrap(), MembershipPlatform::Crypto);
    }

    #[test]
    fn parse_platform_rejects_invalid_values() {
        assert!(parse_platform("paypal").is_err());
        assert!(parse_platform("").is_err());
    }

    #[test]
    fn parse_moderation_status_works_for_all_values() {
        assert_eq!(parse_moderation_status("intro").unwrap(), ModerationStatus::Intro);
        assert_eq!(
            parse_moderation_status("on_review").unwrap(),
            ModerationStatus::OnReview
        );
        assert_eq!(
            parse_moderation_status("approved").unwrap(),
            ModerationStatus::Approved
        );
        assert_eq!(
            parse_moderation_status("rejected").unwrap(),
            ModerationStatus::Rejected
        );
    }

    #[test]
    fn roundtrip_platform_conversion() {
        for platform in [
            MembershipPlatform::Direct,
            MembershipPlatform::Patreon,
            MembershipPlatform::Crypto,
        ] {
            assert_eq!(parse_platform(platform.as_str()).unwrap(), platform);
        }
    }
}
