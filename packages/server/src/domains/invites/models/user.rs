use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::UserId;

/// User - the ledger's view of an account: invite balances per kind.
///
/// Platform invites accrue fractionally (0.2 per credited event) and are
/// stored as NUMERIC; discussion invites are whole units. For each kind,
/// `acquired == used + banked` at all times. The balances are mutated only
/// through [`crate::domains::invites::ledger`]; direct column updates
/// elsewhere are a bug.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,

    pub platform_invites_acquired: Decimal,
    pub platform_invites_used: Decimal,
    pub platform_invites_banked: Decimal,

    pub discussion_invites_acquired: i32,
    pub discussion_invites_used: i32,
    pub discussion_invites_banked: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Find user by ID
    pub async fn find_by_id(id: UserId, pool: &PgPool) -> Result<Self> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(user)
    }

    /// Create a new user with zeroed balances
    pub async fn create(username: &str, pool: &PgPool) -> Result<Self> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(UserId::new())
        .bind(username)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    /// Count the user's responses across all discussions.
    pub async fn total_response_count(id: UserId, pool: &PgPool) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM responses WHERE user_id = $1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Forfeit the platform-invite economy: zero all platform columns.
    ///
    /// Discussion invites are untouched. Called when a participant becomes a
    /// permanent observer; runs inside the caller's transaction.
    pub async fn forfeit_platform_invites(
        id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET platform_invites_acquired = 0,
                platform_invites_used = 0,
                platform_invites_banked = 0,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }
}
