//! Observer transition engine.
//!
//! Demotions and reinstatements all pass through here so that role changes,
//! the removal-count escalation, and the credit-skip flag stay consistent.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::common::{DomainError, DomainResult, ParticipantId, UserId};
use crate::domains::invites::User;
use crate::domains::participants::models::{ObserverReason, Participant};
use crate::domains::participants::rejoin::{
    self, RejoinDecision, RejoinDenial, RoundContext,
};
use crate::domains::rounds::Round;

fn round_context(round: &Round) -> RoundContext {
    RoundContext {
        round_number: round.round_number,
        start_time: round.start_time,
        final_mrp_minutes: round.final_mrp_minutes,
    }
}

/// Demote a participant to temporary observer.
///
/// Runs in the caller's transaction: expiration handling and mutual removal
/// both demote as part of a larger atomic step. The removal count advances
/// only for mutual removals; the credit-skip flag is armed for every mutual
/// removal and for expirations where the participant had not posted.
pub async fn move_to_observer(
    conn: &mut sqlx::PgConnection,
    participant_id: ParticipantId,
    reason: ObserverReason,
    posted_in_round: bool,
) -> DomainResult<Participant> {
    let skip_credits = match reason {
        ObserverReason::MutualRemoval => true,
        ObserverReason::MrpExpired => !posted_in_round,
        ObserverReason::VoteBasedRemoval => false,
    };
    let bump_removal_count = reason == ObserverReason::MutualRemoval;

    let participant = sqlx::query_as::<_, Participant>(
        r#"
        UPDATE discussion_participants
        SET role = 'temporary_observer',
            observer_reason = $2,
            observer_since = NOW(),
            posted_in_round_when_removed = $3,
            removal_count = removal_count + CASE WHEN $4 THEN 1 ELSE 0 END,
            skip_invite_credits_on_return = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(participant_id)
    .bind(reason.to_string())
    .bind(posted_in_round)
    .bind(bump_removal_count)
    .bind(skip_credits)
    .fetch_one(conn)
    .await?;

    info!(
        participant_id = %participant.id,
        discussion_id = %participant.discussion_id,
        reason = %reason,
        posted_in_round,
        removal_count = participant.removal_count,
        "participant moved to observer"
    );
    Ok(participant)
}

/// Whether the observer may return to active status right now.
///
/// Loads the removal round (the latest round started by `observer_since`) and
/// the current round, then dispatches through the pure timing rules.
pub async fn can_rejoin(pool: &PgPool, participant: &Participant) -> DomainResult<RejoinDecision> {
    if participant.role == "permanent_observer" {
        return Ok(RejoinDecision::Denied(RejoinDenial::Permanent));
    }
    // Active participants have nothing to rejoin; the answer is yes.
    if participant.is_active_like() {
        return Ok(RejoinDecision::Allowed);
    }

    let Some(standing) = participant.observer_standing() else {
        return Ok(RejoinDecision::Denied(RejoinDenial::Unknown(
            "observer reason not recognized",
        )));
    };
    let Some(observer_since) = participant.observer_since else {
        return Err(DomainError::invariant(format!(
            "observer {} has no observer_since timestamp",
            participant.id
        )));
    };

    let Some(removal_round) =
        Round::latest_started_by(participant.discussion_id, observer_since, pool).await?
    else {
        return Ok(RejoinDecision::Denied(RejoinDenial::Unknown(
            "no round found for demotion",
        )));
    };
    let Some(current_round) = Round::current(participant.discussion_id, pool).await? else {
        return Ok(RejoinDecision::Denied(RejoinDenial::Unknown(
            "no current round",
        )));
    };

    Ok(rejoin::evaluate_rejoin(
        standing,
        observer_since,
        &round_context(&removal_round),
        &round_context(&current_round),
        Utc::now(),
    ))
}

/// The first moment `can_rejoin` would allow the return, or `None` when that
/// moment does not exist (permanent standings, unknown reason, no rounds).
pub async fn get_wait_period_end(
    pool: &PgPool,
    participant: &Participant,
) -> DomainResult<Option<DateTime<Utc>>> {
    if participant.role == "permanent_observer" {
        return Ok(None);
    }
    let (Some(standing), Some(observer_since)) =
        (participant.observer_standing(), participant.observer_since)
    else {
        return Ok(None);
    };

    let Some(removal_round) =
        Round::latest_started_by(participant.discussion_id, observer_since, pool).await?
    else {
        return Ok(None);
    };
    let Some(current_round) = Round::current(participant.discussion_id, pool).await? else {
        return Ok(None);
    };

    Ok(rejoin::rejoin_wait_end(
        standing,
        observer_since,
        &round_context(&removal_round),
        &round_context(&current_round),
    ))
}

/// Return an eligible temporary observer to active status.
///
/// Clears the observer columns but keeps `removal_count` (the escalation
/// survives reinstatement) and `skip_invite_credits_on_return` (consumed by
/// the next response submission instead).
pub async fn rejoin_as_active(
    pool: &PgPool,
    participant_id: ParticipantId,
) -> DomainResult<Participant> {
    let mut tx = pool.begin().await?;

    let participant = Participant::lock_for_update(participant_id, &mut *tx).await?;

    // Already active (or the initiator): nothing to reinstate.
    if participant.is_active_like() {
        return Ok(participant);
    }

    match can_rejoin(pool, &participant).await? {
        RejoinDecision::Allowed => {}
        RejoinDecision::Denied(denial) => {
            return Err(DomainError::CannotRejoin(denial.to_string()));
        }
    }

    if Round::current_in_progress(participant.discussion_id, &mut *tx)
        .await?
        .is_none()
    {
        return Err(DomainError::NoActiveRound);
    }

    let participant = sqlx::query_as::<_, Participant>(
        r#"
        UPDATE discussion_participants
        SET role = 'active',
            observer_since = NULL,
            observer_reason = NULL,
            posted_in_round_when_removed = FALSE
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(participant_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        participant_id = %participant.id,
        discussion_id = %participant.discussion_id,
        "observer reinstated as active"
    );
    Ok(participant)
}

/// Permanently demote a participant and forfeit their platform-invite
/// economy. Discussion invites are untouched.
pub async fn make_permanent_observer(
    pool: &PgPool,
    participant_id: ParticipantId,
    reason: &str,
) -> DomainResult<Participant> {
    let mut tx = pool.begin().await?;
    let participant = demote_permanently(&mut tx, participant_id, reason).await?;
    tx.commit().await?;
    Ok(participant)
}

/// The conn-level half of [`make_permanent_observer`], for callers that are
/// already inside a transaction (vote-based removal at round close).
pub async fn demote_permanently(
    conn: &mut sqlx::PgConnection,
    participant_id: ParticipantId,
    reason: &str,
) -> DomainResult<Participant> {
    let participant = Participant::lock_for_update(participant_id, &mut *conn).await?;

    let participant = sqlx::query_as::<_, Participant>(
        r#"
        UPDATE discussion_participants
        SET role = 'permanent_observer',
            observer_reason = $2,
            observer_since = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(participant.id)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await?;

    forfeit_platform_economy(&mut *conn, participant.user_id).await?;

    info!(
        participant_id = %participant.id,
        discussion_id = %participant.discussion_id,
        reason,
        "participant made permanent observer"
    );
    Ok(participant)
}

async fn forfeit_platform_economy(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
) -> DomainResult<()> {
    User::forfeit_platform_invites(user_id, &mut *conn).await?;
    Ok(())
}
