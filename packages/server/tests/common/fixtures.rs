//! Shared fixtures: users, discussions, and the time-shift helpers the
//! round-timing tests rely on.

use sqlx::PgPool;
use uuid::Uuid;

use server_core::common::{DiscussionId, ParticipantId, RoundId, UserId};
use server_core::domains::discussions::actions::{self, NewDiscussion};
use server_core::domains::discussions::Discussion;
use server_core::domains::invites::User;
use server_core::domains::participants::{Participant, ParticipantRole};
use server_core::domains::rounds::Round;

pub async fn create_user(pool: &PgPool, prefix: &str) -> User {
    let username = format!("{prefix}_{}", Uuid::new_v4().simple());
    User::create(&username, pool).await.expect("create user")
}

/// A discussion with its initiator participant and round 1.
///
/// Uses MRM 30 / RTM 1.0 / MRL 1000, so the opening response period is 30
/// minutes and submissions seconds apart clamp to a 30-minute median.
pub async fn start_discussion(pool: &PgPool, initiator: &User) -> (Discussion, Round) {
    let discussion = actions::create_discussion(
        pool,
        initiator.id,
        NewDiscussion {
            topic_headline: "Community garden plot allocation",
            topic_details: "How should next season's plots be assigned?",
            max_response_length_chars: 1000,
            response_time_multiplier: 1.0,
            min_response_time_minutes: 30,
        },
    )
    .await
    .expect("create discussion");

    let round = Round::current(discussion.id, pool)
        .await
        .expect("query current round")
        .expect("round 1 exists");
    (discussion, round)
}

pub async fn add_active_participant(
    pool: &PgPool,
    discussion_id: DiscussionId,
    user: &User,
) -> Participant {
    Participant::create(discussion_id, user.id, ParticipantRole::Active, pool)
        .await
        .expect("add participant")
}

pub async fn participant_of(
    pool: &PgPool,
    discussion_id: DiscussionId,
    user_id: UserId,
) -> Participant {
    Participant::find(discussion_id, user_id, pool)
        .await
        .expect("query participant")
        .expect("participant exists")
}

pub async fn current_round(pool: &PgPool, discussion_id: DiscussionId) -> Round {
    Round::current(discussion_id, pool)
        .await
        .expect("query current round")
        .expect("current round exists")
}

/// Shift a round's start into the past.
pub async fn backdate_round_start(pool: &PgPool, round_id: RoundId, minutes: f64) {
    sqlx::query(
        "UPDATE rounds SET start_time = start_time - ($2::double precision * INTERVAL '1 minute') WHERE id = $1",
    )
    .bind(round_id)
    .bind(minutes)
    .execute(pool)
    .await
    .expect("backdate round start");
}

/// Shift every response of a round into the past, moving the rolling MRP
/// deadline with them.
pub async fn backdate_round_responses(pool: &PgPool, round_id: RoundId, minutes: f64) {
    sqlx::query(
        "UPDATE responses SET created_at = created_at - ($2::double precision * INTERVAL '1 minute') WHERE round_id = $1",
    )
    .bind(round_id)
    .bind(minutes)
    .execute(pool)
    .await
    .expect("backdate responses");
}

/// Shift an observer's demotion timestamp into the past (cooldown tests).
pub async fn backdate_observer_since(pool: &PgPool, participant_id: ParticipantId, hours: f64) {
    sqlx::query(
        "UPDATE discussion_participants SET observer_since = observer_since - ($2::double precision * INTERVAL '1 hour') WHERE id = $1",
    )
    .bind(participant_id)
    .bind(hours)
    .execute(pool)
    .await
    .expect("backdate observer_since");
}
