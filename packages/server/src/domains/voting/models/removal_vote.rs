use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::common::{RemovalVoteId, RoundId, UserId};

/// RemovalVote - one voter's mark against one target in a round.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemovalVote {
    pub id: RemovalVoteId,
    pub round_id: RoundId,
    pub voter_id: UserId,
    pub target_id: UserId,

    pub voted_at: DateTime<Utc>,
}

impl RemovalVote {
    /// Record the mark; re-voting for the same target just refreshes it.
    pub async fn record(
        round_id: RoundId,
        voter_id: UserId,
        target_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let vote = sqlx::query_as::<_, RemovalVote>(
            r#"
            INSERT INTO removal_votes (id, round_id, voter_id, target_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (round_id, voter_id, target_id)
            DO UPDATE SET voted_at = NOW()
            RETURNING *
            "#,
        )
        .bind(RemovalVoteId::new())
        .bind(round_id)
        .bind(voter_id)
        .bind(target_id)
        .fetch_one(executor)
        .await?;
        Ok(vote)
    }

    /// Distinct targets that received at least one mark this round.
    pub async fn targets_in_round(
        round_id: RoundId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<UserId>> {
        let targets = sqlx::query_scalar::<_, UserId>(
            "SELECT DISTINCT target_id FROM removal_votes WHERE round_id = $1",
        )
        .bind(round_id)
        .fetch_all(executor)
        .await?;
        Ok(targets)
    }

    /// Marks against one target this round.
    pub async fn count_for_target(
        round_id: RoundId,
        target_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM removal_votes WHERE round_id = $1 AND target_id = $2",
        )
        .bind(round_id)
        .bind(target_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Voters who marked a target, oldest mark first.
    pub async fn voters_for_target(
        round_id: RoundId,
        target_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<UserId>> {
        let voters = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT voter_id FROM removal_votes
            WHERE round_id = $1 AND target_id = $2
            ORDER BY voted_at
            "#,
        )
        .bind(round_id)
        .bind(target_id)
        .fetch_all(executor)
        .await?;
        Ok(voters)
    }
}
