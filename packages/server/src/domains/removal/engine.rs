//! Mutual removal.
//!
//! The pairwise mechanic: a participant may remove another only when both
//! have posted in the current round, and the remover goes down with the
//! target. Both demotions, the audit record, and a possible archival commit
//! in one transaction.

use sqlx::PgPool;
use tracing::info;

use crate::common::{DiscussionId, DomainError, DomainResult, UserId};
use crate::domains::discussions::Discussion;
use crate::domains::participants::engine as observers;
use crate::domains::participants::models::{ObserverReason, Participant};
use crate::domains::removal::models::RemovalAction;
use crate::domains::responses::Response;
use crate::domains::rounds::Round;

/// Preflight for `initiate_removal`. `None` means the removal may proceed;
/// otherwise the blocking error.
pub async fn can_initiate_removal(
    pool: &PgPool,
    discussion_id: DiscussionId,
    initiator_id: UserId,
    target_id: UserId,
) -> DomainResult<Option<DomainError>> {
    if initiator_id == target_id {
        return Ok(Some(DomainError::NotBothPosted));
    }

    let initiator = Participant::find(discussion_id, initiator_id, pool).await?;
    let target = Participant::find(discussion_id, target_id, pool).await?;
    let (Some(initiator), Some(target)) = (initiator, target) else {
        return Ok(Some(DomainError::NotParticipant));
    };
    if !initiator.is_active_like() || !target.is_active_like() {
        return Ok(Some(DomainError::NotParticipant));
    }

    if RemovalAction::mutual_removal_exists(discussion_id, initiator_id, target_id, pool).await? {
        return Ok(Some(DomainError::DuplicateRemoval));
    }

    let Some(round) = Round::current_in_progress(discussion_id, pool).await? else {
        return Ok(Some(DomainError::NoActiveRound));
    };
    let initiator_posted = Response::find_by_round_and_user(round.id, initiator_id, pool)
        .await?
        .is_some();
    let target_posted = Response::find_by_round_and_user(round.id, target_id, pool)
        .await?
        .is_some();
    if !initiator_posted || !target_posted {
        return Ok(Some(DomainError::NotBothPosted));
    }

    Ok(None)
}

/// Execute a mutual removal: both parties become temporary observers with
/// the mutual-removal standing, and the discussion archives if one or fewer
/// active participants remain.
pub async fn initiate_removal(
    pool: &PgPool,
    discussion_id: DiscussionId,
    initiator_id: UserId,
    target_id: UserId,
) -> DomainResult<RemovalAction> {
    let mut tx = pool.begin().await?;

    let discussion = Discussion::lock_for_update(discussion_id, &mut tx).await?;
    if discussion.is_archived() {
        return Err(DomainError::DiscussionArchived);
    }

    let Some(round) = Round::current_in_progress(discussion_id, &mut *tx).await? else {
        return Err(DomainError::NoActiveRound);
    };

    // Re-load both participants under row locks; the checks must hold at
    // commit time, not just at preflight.
    let (Some(initiator), Some(target)) = (
        Participant::find(discussion_id, initiator_id, pool).await?,
        Participant::find(discussion_id, target_id, pool).await?,
    ) else {
        return Err(DomainError::NotParticipant);
    };
    // Lock in a fixed order to avoid deadlocking concurrent removals.
    let (first, second) = if initiator.id <= target.id {
        (initiator.id, target.id)
    } else {
        (target.id, initiator.id)
    };
    let first = Participant::lock_for_update(first, &mut tx).await?;
    let second = Participant::lock_for_update(second, &mut tx).await?;
    let (initiator, target) = if first.user_id == initiator_id {
        (first, second)
    } else {
        (second, first)
    };

    if !initiator.is_active_like() || !target.is_active_like() {
        return Err(DomainError::NotParticipant);
    }
    if RemovalAction::mutual_removal_exists(discussion_id, initiator_id, target_id, &mut *tx)
        .await?
    {
        return Err(DomainError::DuplicateRemoval);
    }

    let initiator_posted = Response::find_by_round_and_user(round.id, initiator_id, &mut *tx)
        .await?
        .is_some();
    let target_posted = Response::find_by_round_and_user(round.id, target_id, &mut *tx)
        .await?
        .is_some();
    if !initiator_posted || !target_posted {
        return Err(DomainError::NotBothPosted);
    }

    observers::move_to_observer(&mut tx, initiator.id, ObserverReason::MutualRemoval, true)
        .await?;
    observers::move_to_observer(&mut tx, target.id, ObserverReason::MutualRemoval, true).await?;

    let action = RemovalAction::create(
        discussion_id,
        round.id,
        "mutual_removal",
        initiator_id,
        target_id,
        false,
        &mut *tx,
    )
    .await?;

    // A two-person discussion just lost both voices.
    let remaining = Participant::active_count(discussion_id, &mut *tx).await?;
    if remaining <= 1 {
        crate::domains::rounds::lifecycle::archive_discussion(
            &mut tx,
            discussion_id,
            &format!("{remaining} active participant(s) after mutual removal"),
        )
        .await?;
    }

    tx.commit().await?;

    info!(
        discussion_id = %discussion_id,
        initiator_id = %initiator_id,
        target_id = %target_id,
        remaining_active = remaining,
        "mutual removal executed"
    );
    Ok(action)
}
