use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, RoundId};

/// Round - one turn of the discussion.
///
/// `final_mrp_minutes` is fixed when the round is created (median of
/// inter-response intervals, scaled by RTM) and never recomputed afterward.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Round {
    pub id: RoundId,
    pub discussion_id: DiscussionId,
    pub round_number: i32,

    pub status: String, // 'in_progress', 'voting', 'completed'
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    pub final_mrp_minutes: Option<f64>,
}

/// Round status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    InProgress,
    Voting,
    Completed,
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundStatus::InProgress => write!(f, "in_progress"),
            RoundStatus::Voting => write!(f, "voting"),
            RoundStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RoundStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(RoundStatus::InProgress),
            "voting" => Ok(RoundStatus::Voting),
            "completed" => Ok(RoundStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid round status: {}", s)),
        }
    }
}

impl Round {
    /// Find round by ID
    pub async fn find_by_id(id: RoundId, pool: &PgPool) -> Result<Self> {
        let round = sqlx::query_as::<_, Round>("SELECT * FROM rounds WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(round)
    }

    /// The current (not yet completed) round of a discussion, if any.
    pub async fn current(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        let round = sqlx::query_as::<_, Round>(
            r#"
            SELECT * FROM rounds
            WHERE discussion_id = $1 AND status IN ('in_progress', 'voting')
            ORDER BY round_number DESC
            LIMIT 1
            "#,
        )
        .bind(discussion_id)
        .fetch_optional(executor)
        .await?;
        Ok(round)
    }

    /// The current round only if responses are being accepted.
    pub async fn current_in_progress(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        let round = sqlx::query_as::<_, Round>(
            r#"
            SELECT * FROM rounds
            WHERE discussion_id = $1 AND status = 'in_progress'
            ORDER BY round_number DESC
            LIMIT 1
            "#,
        )
        .bind(discussion_id)
        .fetch_optional(executor)
        .await?;
        Ok(round)
    }

    /// The latest round that had started by `at` - used to locate the round a
    /// participant was demoted in. Falls back to the first round when the
    /// timestamp predates all rounds.
    pub async fn latest_started_by(
        discussion_id: DiscussionId,
        at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let round = sqlx::query_as::<_, Round>(
            r#"
            SELECT * FROM rounds
            WHERE discussion_id = $1 AND start_time <= $2
            ORDER BY round_number DESC
            LIMIT 1
            "#,
        )
        .bind(discussion_id)
        .bind(at)
        .fetch_optional(pool)
        .await?;
        if round.is_some() {
            return Ok(round);
        }
        let first = sqlx::query_as::<_, Round>(
            r#"
            SELECT * FROM rounds
            WHERE discussion_id = $1
            ORDER BY round_number ASC
            LIMIT 1
            "#,
        )
        .bind(discussion_id)
        .fetch_optional(pool)
        .await?;
        Ok(first)
    }

    /// All rounds of a discussion, oldest first.
    pub async fn find_by_discussion(
        discussion_id: DiscussionId,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let rounds = sqlx::query_as::<_, Round>(
            "SELECT * FROM rounds WHERE discussion_id = $1 ORDER BY round_number",
        )
        .bind(discussion_id)
        .fetch_all(pool)
        .await?;
        Ok(rounds)
    }

    /// Create a round. The UNIQUE (discussion_id, round_number) constraint is
    /// the last line of defense against concurrent advancement; callers must
    /// hold the discussion row lock.
    pub async fn create(
        discussion_id: DiscussionId,
        round_number: i32,
        final_mrp_minutes: f64,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let round = sqlx::query_as::<_, Round>(
            r#"
            INSERT INTO rounds (id, discussion_id, round_number, status, final_mrp_minutes)
            VALUES ($1, $2, $3, 'in_progress', $4)
            RETURNING *
            "#,
        )
        .bind(RoundId::new())
        .bind(discussion_id)
        .bind(round_number)
        .bind(final_mrp_minutes)
        .fetch_one(executor)
        .await?;
        Ok(round)
    }

    /// Transition the round's status, stamping `end_time` on completion.
    pub async fn set_status(
        id: RoundId,
        status: RoundStatus,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rounds
            SET status = $2,
                end_time = CASE WHEN $2 = 'completed' THEN NOW() ELSE end_time END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// In-progress rounds whose response window has elapsed, across all
    /// discussions. The deadline rolls forward from the latest response (or
    /// the round start when none exist). Used by the expiration sweeper.
    pub async fn find_expired_in_progress(pool: &PgPool) -> Result<Vec<Self>> {
        let rounds = sqlx::query_as::<_, Round>(
            r#"
            SELECT * FROM rounds
            WHERE status = 'in_progress'
              AND final_mrp_minutes IS NOT NULL
              AND COALESCE(
                    (SELECT MAX(r.created_at) FROM responses r WHERE r.round_id = rounds.id),
                    start_time
                  ) + (final_mrp_minutes * INTERVAL '1 minute') < NOW()
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rounds)
    }
}
