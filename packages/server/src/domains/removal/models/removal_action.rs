use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, RemovalActionId, RoundId, UserId};

/// RemovalAction - audit record of a removal, mutual or vote-based.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemovalAction {
    pub id: RemovalActionId,
    pub discussion_id: DiscussionId,
    pub round_id: RoundId,

    pub action_type: String, // 'mutual_removal', 'vote_based_removal'
    pub initiator_id: UserId,
    pub target_id: UserId,
    pub is_permanent: bool,

    pub action_at: DateTime<Utc>,
}

impl RemovalAction {
    pub async fn create(
        discussion_id: DiscussionId,
        round_id: RoundId,
        action_type: &str,
        initiator_id: UserId,
        target_id: UserId,
        is_permanent: bool,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let action = sqlx::query_as::<_, RemovalAction>(
            r#"
            INSERT INTO removal_actions (id, discussion_id, round_id, action_type, initiator_id, target_id, is_permanent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(RemovalActionId::new())
        .bind(discussion_id)
        .bind(round_id)
        .bind(action_type)
        .bind(initiator_id)
        .bind(target_id)
        .bind(is_permanent)
        .fetch_one(executor)
        .await?;
        Ok(action)
    }

    /// Whether this initiator has already removed this target here.
    pub async fn mutual_removal_exists(
        discussion_id: DiscussionId,
        initiator_id: UserId,
        target_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM removal_actions
            WHERE discussion_id = $1 AND action_type = 'mutual_removal'
              AND initiator_id = $2 AND target_id = $3
            "#,
        )
        .bind(discussion_id)
        .bind(initiator_id)
        .bind(target_id)
        .fetch_one(executor)
        .await?;
        Ok(count > 0)
    }

    /// Removal history for a discussion, newest first.
    pub async fn find_by_discussion(
        discussion_id: DiscussionId,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let actions = sqlx::query_as::<_, RemovalAction>(
            "SELECT * FROM removal_actions WHERE discussion_id = $1 ORDER BY action_at DESC",
        )
        .bind(discussion_id)
        .fetch_all(pool)
        .await?;
        Ok(actions)
    }
}
