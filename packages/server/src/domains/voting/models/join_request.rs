use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, JoinRequestId, JoinRequestVoteId, RoundId, UserId};

/// JoinRequest - an outsider asking to join a discussion; settled by
/// participant vote at round close.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: JoinRequestId,
    pub discussion_id: DiscussionId,
    pub requester_id: UserId,

    pub status: String, // 'pending', 'approved', 'declined'
    pub request_message: String,

    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl JoinRequest {
    pub async fn find_by_id(id: JoinRequestId, pool: &PgPool) -> Result<Self> {
        let request = sqlx::query_as::<_, JoinRequest>("SELECT * FROM join_requests WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(request)
    }

    pub async fn create(
        discussion_id: DiscussionId,
        requester_id: UserId,
        request_message: &str,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            INSERT INTO join_requests (id, discussion_id, requester_id, request_message)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(JoinRequestId::new())
        .bind(discussion_id)
        .bind(requester_id)
        .bind(request_message)
        .fetch_one(executor)
        .await?;
        Ok(request)
    }

    /// Whether the requester already has a pending request here.
    pub async fn pending_exists(
        discussion_id: DiscussionId,
        requester_id: UserId,
        executor: impl PgExecutor<'_>,
    ) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM join_requests
            WHERE discussion_id = $1 AND requester_id = $2 AND status = 'pending'
            "#,
        )
        .bind(discussion_id)
        .bind(requester_id)
        .fetch_one(executor)
        .await?;
        Ok(count > 0)
    }

    /// Pending requests for a discussion, oldest first.
    pub async fn find_pending(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<Self>> {
        let requests = sqlx::query_as::<_, JoinRequest>(
            r#"
            SELECT * FROM join_requests
            WHERE discussion_id = $1 AND status = 'pending'
            ORDER BY created_at
            "#,
        )
        .bind(discussion_id)
        .fetch_all(executor)
        .await?;
        Ok(requests)
    }

    /// Settle the request.
    pub async fn resolve(
        id: JoinRequestId,
        status: &str,
        executor: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE join_requests SET status = $2, resolved_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(executor)
        .await?;
        Ok(())
    }
}

/// JoinRequestVote - a participant's approve/deny on a pending request.
/// Insert-only: a cast ballot is final.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinRequestVote {
    pub id: JoinRequestVoteId,
    pub join_request_id: JoinRequestId,
    pub round_id: RoundId,
    pub voter_id: UserId,

    pub approve: bool,
    pub voted_at: DateTime<Utc>,
}

impl JoinRequestVote {
    /// Insert the ballot. Returns `None` when the voter has already voted on
    /// this request.
    pub async fn cast(
        join_request_id: JoinRequestId,
        round_id: RoundId,
        voter_id: UserId,
        approve: bool,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        let vote = sqlx::query_as::<_, JoinRequestVote>(
            r#"
            INSERT INTO join_request_votes (id, join_request_id, round_id, voter_id, approve)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (join_request_id, voter_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(JoinRequestVoteId::new())
        .bind(join_request_id)
        .bind(round_id)
        .bind(voter_id)
        .bind(approve)
        .fetch_optional(executor)
        .await?;
        Ok(vote)
    }

    /// (approvals, denials) tallied for a request within one round.
    pub async fn tally(
        join_request_id: JoinRequestId,
        round_id: RoundId,
        executor: impl PgExecutor<'_>,
    ) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE approve),
                   COUNT(*) FILTER (WHERE NOT approve)
            FROM join_request_votes
            WHERE join_request_id = $1 AND round_id = $2
            "#,
        )
        .bind(join_request_id)
        .bind(round_id)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }
}
