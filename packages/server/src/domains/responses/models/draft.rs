use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DraftId, RoundId, UserId};

/// DraftResponse - unsubmitted content preserved when a round closes out
/// from under the writer, or saved explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DraftResponse {
    pub id: DraftId,
    pub round_id: RoundId,
    pub user_id: UserId,

    pub content: String,
    pub saved_reason: String, // 'user_saved', 'mrp_expired', 'round_ended'

    pub created_at: DateTime<Utc>,
}

impl DraftResponse {
    pub async fn create(
        round_id: RoundId,
        user_id: UserId,
        content: &str,
        saved_reason: &str,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let draft = sqlx::query_as::<_, DraftResponse>(
            r#"
            INSERT INTO draft_responses (id, round_id, user_id, content, saved_reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(DraftId::new())
        .bind(round_id)
        .bind(user_id)
        .bind(content)
        .bind(saved_reason)
        .fetch_one(executor)
        .await?;
        Ok(draft)
    }

    /// A user's drafts, newest first.
    pub async fn find_by_user(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        let drafts = sqlx::query_as::<_, DraftResponse>(
            "SELECT * FROM draft_responses WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(drafts)
    }
}
