use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, UserId};

/// Discussion - the root aggregate. Carries the three adjustable parameters:
/// MRL (max response length), MRM (minimum response time), and RTM (response
/// time multiplier). Archival is irreversible.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Discussion {
    pub id: DiscussionId,
    pub initiator_id: UserId,

    pub topic_headline: String,
    pub topic_details: String,

    pub max_response_length_chars: i32,
    pub response_time_multiplier: f64,
    pub min_response_time_minutes: i32,

    pub status: String, // 'active', 'voting', 'archived'

    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Discussion status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionStatus {
    Active,
    Voting,
    Archived,
}

impl std::fmt::Display for DiscussionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscussionStatus::Active => write!(f, "active"),
            DiscussionStatus::Voting => write!(f, "voting"),
            DiscussionStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for DiscussionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(DiscussionStatus::Active),
            "voting" => Ok(DiscussionStatus::Voting),
            "archived" => Ok(DiscussionStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid discussion status: {}", s)),
        }
    }
}

impl Discussion {
    pub fn is_archived(&self) -> bool {
        self.status == "archived"
    }

    /// Find discussion by ID
    pub async fn find_by_id(id: DiscussionId, pool: &PgPool) -> Result<Self> {
        let discussion = sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(discussion)
    }

    /// Lock the discussion row for update. Round-number assignment and
    /// parameter changes serialize on this lock.
    pub async fn lock_for_update(id: DiscussionId, conn: &mut sqlx::PgConnection) -> Result<Self> {
        let discussion =
            sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(conn)
                .await?;
        Ok(discussion)
    }

    /// Insert a discussion row
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        initiator_id: UserId,
        topic_headline: &str,
        topic_details: &str,
        max_response_length_chars: i32,
        response_time_multiplier: f64,
        min_response_time_minutes: i32,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let discussion = sqlx::query_as::<_, Discussion>(
            r#"
            INSERT INTO discussions (
                id, initiator_id, topic_headline, topic_details,
                max_response_length_chars, response_time_multiplier, min_response_time_minutes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(DiscussionId::new())
        .bind(initiator_id)
        .bind(topic_headline)
        .bind(topic_details)
        .bind(max_response_length_chars)
        .bind(response_time_multiplier)
        .bind(min_response_time_minutes)
        .fetch_one(executor)
        .await?;
        Ok(discussion)
    }

    /// Update status
    pub async fn set_status(
        id: DiscussionId,
        status: DiscussionStatus,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query("UPDATE discussions SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Persist new values for the adjustable parameters after a vote.
    pub async fn apply_parameters(
        id: DiscussionId,
        max_response_length_chars: i32,
        response_time_multiplier: f64,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE discussions
            SET max_response_length_chars = $2,
                response_time_multiplier = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(max_response_length_chars)
        .bind(response_time_multiplier)
        .execute(executor)
        .await?;
        Ok(())
    }
}
