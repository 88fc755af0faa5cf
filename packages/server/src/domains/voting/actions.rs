//! Vote casting.
//!
//! Every successful cast also triggers the once-per-round voting credit,
//! inside the same transaction as the ballot itself.

use sqlx::PgPool;
use tracing::info;

use crate::common::{DiscussionId, DomainError, DomainResult, JoinRequestId, RoundId, UserId};
use crate::domains::discussions::Discussion;
use crate::domains::responses::Response;
use crate::domains::rounds::Round;
use crate::domains::voting::credits;
use crate::domains::voting::models::{JoinRequest, JoinRequestVote, RemovalVote, Vote, VoteChoice};

async fn voting_round(
    conn: &mut sqlx::PgConnection,
    round_id: RoundId,
) -> DomainResult<(Round, Discussion)> {
    let round = sqlx::query_as::<_, Round>("SELECT * FROM rounds WHERE id = $1")
        .bind(round_id)
        .fetch_one(&mut *conn)
        .await?;
    if round.status != "voting" {
        return Err(DomainError::NotVotingPhase);
    }
    let discussion = sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1")
        .bind(round.discussion_id)
        .fetch_one(&mut *conn)
        .await?;
    if discussion.is_archived() {
        return Err(DomainError::DiscussionArchived);
    }
    Ok((round, discussion))
}

async fn ensure_eligible_voter(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
    user_id: UserId,
) -> DomainResult<()> {
    if user_id == discussion.initiator_id {
        return Ok(());
    }
    if Response::find_by_round_and_user(round.id, user_id, &mut *conn)
        .await?
        .is_some()
    {
        return Ok(());
    }
    Err(DomainError::NotEligibleVoter)
}

/// Cast (or replace) a parameter ballot for the round.
pub async fn cast_parameter_vote(
    pool: &PgPool,
    round_id: RoundId,
    user_id: UserId,
    mrl_vote: VoteChoice,
    rtm_vote: VoteChoice,
) -> DomainResult<Vote> {
    let mut tx = pool.begin().await?;

    let (round, discussion) = voting_round(&mut tx, round_id).await?;
    ensure_eligible_voter(&mut tx, &round, &discussion, user_id).await?;

    let vote = Vote::upsert(round.id, user_id, mrl_vote, rtm_vote, &mut *tx).await?;
    credits::award_once(&mut tx, round.id, user_id).await?;

    tx.commit().await?;
    Ok(vote)
}

/// Mark one or more targets for removal.
///
/// Self-votes and votes against users who did not post this round are
/// silently dropped; the remaining marks are recorded.
pub async fn cast_removal_vote(
    pool: &PgPool,
    round_id: RoundId,
    voter_id: UserId,
    targets: &[UserId],
) -> DomainResult<Vec<RemovalVote>> {
    let mut tx = pool.begin().await?;

    let (round, _discussion) = voting_round(&mut tx, round_id).await?;

    // Removal voting is for round participants only; the initiator gets no
    // special standing here.
    if Response::find_by_round_and_user(round.id, voter_id, &mut *tx)
        .await?
        .is_none()
    {
        return Err(DomainError::NotEligibleVoter);
    }

    let mut cast = Vec::new();
    for &target_id in targets {
        if target_id == voter_id {
            continue;
        }
        if Response::find_by_round_and_user(round.id, target_id, &mut *tx)
            .await?
            .is_none()
        {
            continue;
        }
        cast.push(RemovalVote::record(round.id, voter_id, target_id, &mut *tx).await?);
    }

    credits::award_once(&mut tx, round.id, voter_id).await?;

    tx.commit().await?;
    Ok(cast)
}

/// Cast a final approve/deny ballot on a pending join request.
pub async fn cast_join_request_vote(
    pool: &PgPool,
    round_id: RoundId,
    voter_id: UserId,
    join_request_id: JoinRequestId,
    approve: bool,
) -> DomainResult<JoinRequestVote> {
    let mut tx = pool.begin().await?;

    let (round, discussion) = voting_round(&mut tx, round_id).await?;
    ensure_eligible_voter(&mut tx, &round, &discussion, voter_id).await?;

    let request = sqlx::query_as::<_, JoinRequest>("SELECT * FROM join_requests WHERE id = $1")
        .bind(join_request_id)
        .fetch_one(&mut *tx)
        .await?;
    if request.discussion_id != discussion.id || request.status != "pending" {
        return Err(DomainError::invariant(format!(
            "join request {join_request_id} is not pending for discussion {}",
            discussion.id
        )));
    }

    let Some(vote) =
        JoinRequestVote::cast(join_request_id, round.id, voter_id, approve, &mut *tx).await?
    else {
        return Err(DomainError::DuplicateVote);
    };
    credits::award_once(&mut tx, round.id, voter_id).await?;

    tx.commit().await?;
    Ok(vote)
}

/// File a request to join an active discussion.
pub async fn request_to_join(
    pool: &PgPool,
    discussion_id: DiscussionId,
    requester_id: UserId,
    message: &str,
) -> DomainResult<JoinRequest> {
    let mut tx = pool.begin().await?;

    let discussion = sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1")
        .bind(discussion_id)
        .fetch_one(&mut *tx)
        .await?;
    if discussion.is_archived() {
        return Err(DomainError::DiscussionArchived);
    }

    let already = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM discussion_participants WHERE discussion_id = $1 AND user_id = $2",
    )
    .bind(discussion_id)
    .bind(requester_id)
    .fetch_one(&mut *tx)
    .await?;
    if already > 0 {
        return Err(DomainError::AlreadyParticipant);
    }

    if JoinRequest::pending_exists(discussion_id, requester_id, &mut *tx).await? {
        return Err(DomainError::DuplicateJoinRequest);
    }

    let request = JoinRequest::create(discussion_id, requester_id, message, &mut *tx).await?;
    tx.commit().await?;

    info!(
        discussion_id = %discussion_id,
        requester_id = %requester_id,
        "join request filed"
    );
    Ok(request)
}
