use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::common::{RoundId, UserId, VoteId};

/// Vote - one participant's direction for each adjustable parameter in a
/// round's voting phase. Upsertable: re-voting replaces the previous ballot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: VoteId,
    pub round_id: RoundId,
    pub user_id: UserId,

    pub mrl_vote: String, // 'increase', 'decrease', 'no_change'
    pub rtm_vote: String,

    pub voted_at: DateTime<Utc>,
}

/// Vote choice enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Increase,
    Decrease,
    NoChange,
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteChoice::Increase => write!(f, "increase"),
            VoteChoice::Decrease => write!(f, "decrease"),
            VoteChoice::NoChange => write!(f, "no_change"),
        }
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "increase" => Ok(VoteChoice::Increase),
            "decrease" => Ok(VoteChoice::Decrease),
            "no_change" => Ok(VoteChoice::NoChange),
            _ => Err(anyhow::anyhow!("Invalid vote choice: {}", s)),
        }
    }
}

impl Vote {
    /// Record or replace a ballot for the (round, user) pair.
    pub async fn upsert(
        round_id: RoundId,
        user_id: UserId,
        mrl_vote: VoteChoice,
        rtm_vote: VoteChoice,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (id, round_id, user_id, mrl_vote, rtm_vote)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (round_id, user_id)
            DO UPDATE SET mrl_vote = EXCLUDED.mrl_vote,
                          rtm_vote = EXCLUDED.rtm_vote,
                          voted_at = NOW()
            RETURNING *
            "#,
        )
        .bind(VoteId::new())
        .bind(round_id)
        .bind(user_id)
        .bind(mrl_vote.to_string())
        .bind(rtm_vote.to_string())
        .fetch_one(executor)
        .await?;
        Ok(vote)
    }

    /// All ballots cast in a round.
    pub async fn find_by_round(
        round_id: RoundId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<Self>> {
        let votes = sqlx::query_as::<_, Vote>("SELECT * FROM votes WHERE round_id = $1")
            .bind(round_id)
            .fetch_all(executor)
            .await?;
        Ok(votes)
    }
}
