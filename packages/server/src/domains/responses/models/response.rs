use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, ResponseId, RoundId, UserId};

/// Response - one participant's turn in a round.
///
/// `time_since_previous_minutes` is the interval back to the previous
/// response in the round (or the round start for the first response); it
/// feeds the response-period median. Responses are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Response {
    pub id: ResponseId,
    pub round_id: RoundId,
    pub user_id: UserId,

    pub content: String,
    pub character_count: i32,

    pub edit_count: i32,
    pub characters_changed_total: i32,

    pub time_since_previous_minutes: Option<f64>,
    pub is_locked: bool,

    pub created_at: DateTime<Utc>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl Response {
    /// Find response by ID
    pub async fn find_by_id(id: ResponseId, pool: &PgPool) -> Result<Self> {
        let response = sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(response)
    }

    /// Lock the row for update inside an edit transaction.
    pub async fn lock_for_update(id: ResponseId, conn: &mut sqlx::PgConnection) -> Result<Self> {
        let response =
            sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(conn)
                .await?;
        Ok(response)
    }

    /// A user's response in a round, if any.
    pub async fn find_by_round_and_user(
        round_id: RoundId,
        user_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        let response = sqlx::query_as::<_, Response>(
            "SELECT * FROM responses WHERE round_id = $1 AND user_id = $2",
        )
        .bind(round_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;
        Ok(response)
    }

    /// The most recent response in a round.
    pub async fn latest_in_round(
        round_id: RoundId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        let response = sqlx::query_as::<_, Response>(
            "SELECT * FROM responses WHERE round_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(round_id)
        .fetch_optional(executor)
        .await?;
        Ok(response)
    }

    /// Count responses in a round.
    pub async fn count_in_round(round_id: RoundId, executor: impl PgExecutor<'_>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM responses WHERE round_id = $1")
            .bind(round_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    /// Count responses across all rounds of a discussion.
    pub async fn count_in_discussion(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM responses
            WHERE round_id IN (SELECT id FROM rounds WHERE discussion_id = $1)
            "#,
        )
        .bind(discussion_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// User IDs that have responded in a round.
    pub async fn responder_ids(
        round_id: RoundId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM responses WHERE round_id = $1",
        )
        .bind(round_id)
        .fetch_all(executor)
        .await?;
        Ok(ids)
    }

    /// Inter-response intervals recorded in the given rounds, for the median.
    pub async fn intervals_for_rounds(
        round_ids: &[RoundId],
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<f64>> {
        let times = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT time_since_previous_minutes FROM responses
            WHERE round_id = ANY($1) AND time_since_previous_minutes IS NOT NULL
            "#,
        )
        .bind(round_ids)
        .fetch_all(executor)
        .await?;
        Ok(times)
    }

    /// Insert a response row.
    pub async fn create(
        round_id: RoundId,
        user_id: UserId,
        content: &str,
        time_since_previous_minutes: f64,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let response = sqlx::query_as::<_, Response>(
            r#"
            INSERT INTO responses (id, round_id, user_id, content, character_count, time_since_previous_minutes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(ResponseId::new())
        .bind(round_id)
        .bind(user_id)
        .bind(content)
        .bind(content.chars().count() as i32)
        .bind(time_since_previous_minutes)
        .fetch_one(executor)
        .await?;
        Ok(response)
    }

    /// Apply an edit's bookkeeping in one statement.
    pub async fn apply_edit(
        id: ResponseId,
        new_content: &str,
        characters_changed: i32,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let response = sqlx::query_as::<_, Response>(
            r#"
            UPDATE responses
            SET content = $2,
                character_count = $3,
                edit_count = edit_count + 1,
                characters_changed_total = characters_changed_total + $4,
                last_edited_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_content)
        .bind(new_content.chars().count() as i32)
        .bind(characters_changed)
        .fetch_one(executor)
        .await?;
        Ok(response)
    }

    /// Lock every response of a round (round close).
    pub async fn lock_round(round_id: RoundId, executor: impl PgExecutor<'_>) -> Result<()> {
        sqlx::query("UPDATE responses SET is_locked = TRUE WHERE round_id = $1")
            .bind(round_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Lock every response across a discussion (archival freeze).
    pub async fn lock_discussion(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE responses
            SET is_locked = TRUE
            WHERE round_id IN (SELECT id FROM rounds WHERE discussion_id = $1)
            "#,
        )
        .bind(discussion_id)
        .execute(executor)
        .await?;
        Ok(())
    }
}
