//! Response submission.
//!
//! One transaction covers the response row, observer auto-reactivation, the
//! per-response invite credit (or its one-shot skip), the MRP recalculation,
//! and a possible round close when this was the last awaited voice.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use crate::common::{DomainError, DomainResult, RoundId, UserId};
use crate::domains::discussions::Discussion;
use crate::domains::invites::ledger;
use crate::domains::participants::engine as observers;
use crate::domains::participants::models::Participant;
use crate::domains::participants::rejoin::RejoinDecision;
use crate::domains::platform::PlatformConfig;
use crate::domains::responses::models::{DraftResponse, Response};
use crate::domains::rounds::{lifecycle, Round};

/// Submit a response to an in-progress round.
pub async fn submit(
    pool: &PgPool,
    round_id: RoundId,
    user_id: UserId,
    content: &str,
) -> DomainResult<Response> {
    if content.trim().is_empty() {
        return Err(DomainError::ContentEmpty);
    }

    let mut tx = pool.begin().await?;

    // The round row lock serializes submissions, so the interval computation
    // and MRP recalculation see a stable ordering.
    let Some(round) = sqlx::query_as::<_, Round>(
        "SELECT * FROM rounds WHERE id = $1 FOR UPDATE",
    )
    .bind(round_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(DomainError::RoundNotAcceptingResponses);
    };
    if round.status != "in_progress" {
        return Err(DomainError::RoundNotAcceptingResponses);
    }

    let discussion = sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1")
        .bind(round.discussion_id)
        .fetch_one(&mut *tx)
        .await?;
    if discussion.is_archived() {
        return Err(DomainError::DiscussionArchived);
    }

    let max_chars = discussion.max_response_length_chars;
    if content.chars().count() as i32 > max_chars {
        return Err(DomainError::ContentTooLong { max_chars });
    }

    if let Some(deadline) = lifecycle::mrp_deadline(&mut tx, &round).await? {
        if Utc::now() >= deadline {
            return Err(DomainError::RoundNotAcceptingResponses);
        }
    }

    let Some(participant) = Participant::find(discussion.id, user_id, pool).await? else {
        return Err(DomainError::NotParticipant);
    };
    let participant = Participant::lock_for_update(participant.id, &mut tx).await?;

    // Observers may respond directly once their window has passed; the
    // submission doubles as the reinstatement.
    let participant = if participant.is_active_like() {
        participant
    } else if participant.role == "temporary_observer" {
        match observers::can_rejoin(pool, &participant).await? {
            RejoinDecision::Allowed => reactivate(&mut tx, &participant).await?,
            RejoinDecision::Denied(denial) => {
                return Err(DomainError::CannotRejoin(denial.to_string()));
            }
        }
    } else {
        return Err(DomainError::CannotRejoin("permanent".to_string()));
    };

    if Response::find_by_round_and_user(round.id, user_id, &mut *tx)
        .await?
        .is_some()
    {
        return Err(DomainError::AlreadyResponded);
    }

    let previous = Response::latest_in_round(round.id, &mut *tx).await?;
    let since = previous.map(|r| r.created_at).unwrap_or(round.start_time);
    let interval_minutes = (Utc::now() - since).num_seconds() as f64 / 60.0;

    let response = Response::create(round.id, user_id, content, interval_minutes, &mut *tx).await?;

    // The one-shot skip suppresses this response's credit; every later
    // response earns normally.
    let skipped = Participant::consume_credit_skip(participant.id, &mut *tx).await?;
    if !skipped {
        ledger::earn_event_credit(&mut tx, user_id).await?;
    }

    let config = PlatformConfig::load_with(&mut *tx).await?;
    let new_mrp = lifecycle::calculate_mrp(&mut tx, &round, &discussion, &config).await?;
    sqlx::query("UPDATE rounds SET final_mrp_minutes = $2 WHERE id = $1")
        .bind(round.id)
        .bind(new_mrp)
        .execute(&mut *tx)
        .await?;

    if lifecycle::should_end_round(&mut tx, &round).await? {
        lifecycle::end_round(&mut tx, &round, &discussion, &config).await?;
    }

    tx.commit().await?;

    info!(
        round_id = %round.id,
        user_id = %user_id,
        credit_skipped = skipped,
        "response submitted"
    );
    Ok(response)
}

async fn reactivate(
    conn: &mut sqlx::PgConnection,
    participant: &Participant,
) -> DomainResult<Participant> {
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
    .bind(participant.id)
    .fetch_one(conn)
    .await?;
    info!(
        participant_id = %participant.id,
        discussion_id = %participant.discussion_id,
        "observer reinstated on submission"
    );
    Ok(participant)
}

/// Preserve unsubmitted content.
pub async fn save_draft(
    pool: &PgPool,
    round_id: RoundId,
    user_id: UserId,
    content: &str,
    saved_reason: &str,
) -> DomainResult<DraftResponse> {
    if content.trim().is_empty() {
        return Err(DomainError::ContentEmpty);
    }
    let draft = DraftResponse::create(round_id, user_id, content, saved_reason, pool).await?;
    Ok(draft)
}
