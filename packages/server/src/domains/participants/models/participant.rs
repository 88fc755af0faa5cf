use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::{DiscussionId, ParticipantId, UserId};
use crate::domains::participants::rejoin::ObserverStanding;

/// DiscussionParticipant - the join of a User and a Discussion.
///
/// Never deleted: demotions flip `role` and the observer columns, keeping the
/// historical record intact.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Participant {
    pub id: ParticipantId,
    pub discussion_id: DiscussionId,
    pub user_id: UserId,

    pub role: String, // 'initiator', 'active', 'temporary_observer', 'permanent_observer'
    pub joined_at: DateTime<Utc>,

    pub observer_since: Option<DateTime<Utc>>,
    /// One of the `ObserverReason` values, or a free-form label for explicit
    /// permanent demotions (e.g. "severe_violation").
    pub observer_reason: Option<String>,
    pub posted_in_round_when_removed: bool,
    /// Counts mutual-removal demotions specifically; drives the escalating
    /// 24h / 7d / never cooldowns.
    pub removal_count: i32,
    /// One-shot flag: suppress the next earned-credit event after
    /// reinstatement, then clear.
    pub skip_invite_credits_on_return: bool,
    pub can_invite_others: bool,
}

/// Participant role enum
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Initiator,
    Active,
    TemporaryObserver,
    PermanentObserver,
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::Initiator => write!(f, "initiator"),
            ParticipantRole::Active => write!(f, "active"),
            ParticipantRole::TemporaryObserver => write!(f, "temporary_observer"),
            ParticipantRole::PermanentObserver => write!(f, "permanent_observer"),
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initiator" => Ok(ParticipantRole::Initiator),
            "active" => Ok(ParticipantRole::Active),
            "temporary_observer" => Ok(ParticipantRole::TemporaryObserver),
            "permanent_observer" => Ok(ParticipantRole::PermanentObserver),
            _ => Err(anyhow::anyhow!("Invalid participant role: {}", s)),
        }
    }
}

/// Observer reason enum - why a participant was demoted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObserverReason {
    MrpExpired,
    MutualRemoval,
    VoteBasedRemoval,
}

impl std::fmt::Display for ObserverReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObserverReason::MrpExpired => write!(f, "mrp_expired"),
            ObserverReason::MutualRemoval => write!(f, "mutual_removal"),
            ObserverReason::VoteBasedRemoval => write!(f, "vote_based_removal"),
        }
    }
}

impl std::str::FromStr for ObserverReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mrp_expired" => Ok(ObserverReason::MrpExpired),
            "mutual_removal" => Ok(ObserverReason::MutualRemoval),
            "vote_based_removal" => Ok(ObserverReason::VoteBasedRemoval),
            _ => Err(anyhow::anyhow!("Invalid observer reason: {}", s)),
        }
    }
}

impl Participant {
    /// True for roles that may post and vote (initiator or active).
    pub fn is_active_like(&self) -> bool {
        self.role == "initiator" || self.role == "active"
    }

    /// Tagged observer standing for rejoin evaluation, if the participant is
    /// an observer with a recognized reason.
    pub fn observer_standing(&self) -> Option<ObserverStanding> {
        let reason: ObserverReason = self.observer_reason.as_deref()?.parse().ok()?;
        Some(match reason {
            ObserverReason::MrpExpired => ObserverStanding::MrpExpired {
                posted_in_round: self.posted_in_round_when_removed,
            },
            ObserverReason::MutualRemoval => ObserverStanding::MutualRemoval {
                posted_in_round: self.posted_in_round_when_removed,
                removal_count: self.removal_count,
            },
            ObserverReason::VoteBasedRemoval => ObserverStanding::VoteBasedRemoval,
        })
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Participant {
    /// Find participant by ID
    pub async fn find_by_id(id: ParticipantId, pool: &PgPool) -> Result<Self> {
        let participant =
            sqlx::query_as::<_, Participant>("SELECT * FROM discussion_participants WHERE id = $1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        Ok(participant)
    }

    /// Find the participant row for a user in a discussion
    pub async fn find(
        discussion_id: DiscussionId,
        user_id: UserId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let participant = sqlx::query_as::<_, Participant>(
            "SELECT * FROM discussion_participants WHERE discussion_id = $1 AND user_id = $2",
        )
        .bind(discussion_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(participant)
    }

    /// Find all participants of a discussion
    pub async fn find_by_discussion(
        discussion_id: DiscussionId,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT * FROM discussion_participants WHERE discussion_id = $1 ORDER BY joined_at",
        )
        .bind(discussion_id)
        .fetch_all(pool)
        .await?;
        Ok(participants)
    }

    /// Find active-eligible participants (initiator + active) of a discussion
    pub async fn find_active(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<Self>> {
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT * FROM discussion_participants WHERE discussion_id = $1 AND role IN ('initiator', 'active') ORDER BY joined_at",
        )
        .bind(discussion_id)
        .fetch_all(executor)
        .await?;
        Ok(participants)
    }

    /// Count active-eligible participants (initiator + active)
    pub async fn active_count(
        discussion_id: DiscussionId,
        executor: impl PgExecutor<'_>,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM discussion_participants WHERE discussion_id = $1 AND role IN ('initiator', 'active')",
        )
        .bind(discussion_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Create a participant row
    pub async fn create(
        discussion_id: DiscussionId,
        user_id: UserId,
        role: ParticipantRole,
        executor: impl PgExecutor<'_>,
    ) -> Result<Self> {
        let participant = sqlx::query_as::<_, Participant>(
            r#"
            INSERT INTO discussion_participants (id, discussion_id, user_id, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(ParticipantId::new())
        .bind(discussion_id)
        .bind(user_id)
        .bind(role.to_string())
        .fetch_one(executor)
        .await?;
        Ok(participant)
    }

    /// Lock the row for update inside a transaction (removal flows mutate two
    /// participants and must not race).
    pub async fn lock_for_update(
        id: ParticipantId,
        conn: &mut sqlx::PgConnection,
    ) -> Result<Self> {
        let participant = sqlx::query_as::<_, Participant>(
            "SELECT * FROM discussion_participants WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(participant)
    }

    /// Clear the one-shot credit-skip flag. Returns true if the flag was set,
    /// using the conditional UPDATE as the atomic consume.
    pub async fn consume_credit_skip(
        id: ParticipantId,
        executor: impl PgExecutor<'_>,
    ) -> Result<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE discussion_participants
            SET skip_invite_credits_on_return = FALSE
            WHERE id = $1 AND skip_invite_credits_on_return = TRUE
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }
}
