mod common;

use common::{fixtures, TestHarness};
use test_context::test_context;

use server_core::common::DomainError;
use server_core::domains::discussions::Discussion;
use server_core::domains::responses::actions::{edit, submit};
use server_core::domains::responses::Response;
use server_core::domains::rounds::{lifecycle, Round};
use server_core::domains::voting::actions::cast_parameter_vote;
use server_core::domains::voting::VoteChoice;

#[test_context(TestHarness)]
#[tokio::test]
async fn rounds_advance_in_sequence(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let initiator = fixtures::create_user(pool, "seq_init").await;
    let other = fixtures::create_user(pool, "seq_other").await;
    let (discussion, round1) = fixtures::start_discussion(pool, &initiator).await;
    fixtures::add_active_participant(pool, discussion.id, &other).await;

    submit(pool, round1.id, initiator.id, "Round one, first voice.")
        .await
        .expect("submission");
    submit(pool, round1.id, other.id, "Round one, second voice.")
        .await
        .expect("submission");

    // Everyone active has posted, so the round moved into voting on its own.
    let round1 = Round::find_by_id(round1.id, pool).await.expect("reload");
    assert_eq!(round1.status, "voting");
    // Sub-minute intervals clamp up to the 30-minute MRM; RTM is 1.0.
    let final_mrp = round1.final_mrp_minutes.expect("final MRP fixed");
    assert!((final_mrp - 30.0).abs() < 1e-9);

    let round2 = lifecycle::close_voting_and_create_next_round(pool, round1.id)
        .await
        .expect("close voting")
        .expect("round 2 created");
    assert_eq!(round2.round_number, 2);
    assert_eq!(round2.status, "in_progress");

    submit(pool, round2.id, initiator.id, "Round two, first voice.")
        .await
        .expect("submission");
    submit(pool, round2.id, other.id, "Round two, second voice.")
        .await
        .expect("submission");
    let round3 = lifecycle::close_voting_and_create_next_round(pool, round2.id)
        .await
        .expect("close voting")
        .expect("round 3 created");
    assert_eq!(round3.round_number, 3);

    let rounds = Round::find_by_discussion(discussion.id, pool)
        .await
        .expect("list rounds");
    let numbers: Vec<i32> = rounds.iter().map(|r| r.round_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(rounds[0].status, "completed");
    assert!(rounds[0].end_time.is_some());
    assert_eq!(rounds[1].status, "completed");
    assert_eq!(rounds[2].status, "in_progress");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn voting_close_applies_the_parameter_majority(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let initiator = fixtures::create_user(pool, "vote_close_init").await;
    let a = fixtures::create_user(pool, "vote_close_a").await;
    let b = fixtures::create_user(pool, "vote_close_b").await;
    let (discussion, round1) = fixtures::start_discussion(pool, &initiator).await;
    fixtures::add_active_participant(pool, discussion.id, &a).await;
    fixtures::add_active_participant(pool, discussion.id, &b).await;

    for (user, text) in [
        (&initiator, "Opening position."),
        (&a, "Second position."),
        (&b, "Third position."),
    ] {
        submit(pool, round1.id, user.id, text).await.expect("submission");
    }

    // MRL: two increase against one decrease. RTM: two decrease.
    cast_parameter_vote(pool, round1.id, initiator.id, VoteChoice::Increase, VoteChoice::NoChange)
        .await
        .expect("initiator ballot");
    cast_parameter_vote(pool, round1.id, a.id, VoteChoice::Increase, VoteChoice::Decrease)
        .await
        .expect("ballot");
    cast_parameter_vote(pool, round1.id, b.id, VoteChoice::Decrease, VoteChoice::Decrease)
        .await
        .expect("ballot");

    let round2 = lifecycle::close_voting_and_create_next_round(pool, round1.id)
        .await
        .expect("close voting")
        .expect("round 2 created");

    let discussion = Discussion::find_by_id(discussion.id, pool)
        .await
        .expect("reload discussion");
    assert_eq!(discussion.max_response_length_chars, 1200);
    assert!((discussion.response_time_multiplier - 0.8).abs() < 1e-9);
    assert_eq!(discussion.status, "active");

    // The new round's period already reflects the lowered multiplier.
    let mrp = round2.final_mrp_minutes.expect("round 2 MRP");
    assert!((mrp - 24.0).abs() < 1e-9);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn expired_rounds_are_detected_and_closed(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let initiator = fixtures::create_user(pool, "expire_init").await;
    let a = fixtures::create_user(pool, "expire_a").await;
    let b = fixtures::create_user(pool, "expire_b").await;
    let (discussion, round1) = fixtures::start_discussion(pool, &initiator).await;
    fixtures::add_active_participant(pool, discussion.id, &a).await;
    fixtures::add_active_participant(pool, discussion.id, &b).await;

    submit(pool, round1.id, initiator.id, "I posted in time.")
        .await
        .expect("submission");
    submit(pool, round1.id, a.id, "So did I.")
        .await
        .expect("submission");

    // Not expired yet.
    let expired = Round::find_expired_in_progress(pool).await.expect("sweep");
    assert!(!expired.iter().any(|r| r.id == round1.id));

    // Push the last response past the 30-minute window.
    fixtures::backdate_round_responses(pool, round1.id, 90.0).await;
    fixtures::backdate_round_start(pool, round1.id, 95.0).await;

    let expired = Round::find_expired_in_progress(pool).await.expect("sweep");
    assert!(expired.iter().any(|r| r.id == round1.id));

    lifecycle::handle_mrp_expiration(pool, round1.id)
        .await
        .expect("expiration handling");

    // The non-poster is now a temporary observer; the round opened voting.
    let demoted = fixtures::participant_of(pool, discussion.id, b.id).await;
    assert_eq!(demoted.role, "temporary_observer");
    assert_eq!(demoted.observer_reason.as_deref(), Some("mrp_expired"));
    assert!(demoted.skip_invite_credits_on_return);
    assert_eq!(demoted.removal_count, 0);

    let round1 = Round::find_by_id(round1.id, pool).await.expect("reload");
    assert_eq!(round1.status, "voting");

    // A second sweep is a no-op.
    lifecycle::handle_mrp_expiration(pool, round1.id)
        .await
        .expect("idempotent handling");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn one_response_round_archives_the_discussion(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let initiator = fixtures::create_user(pool, "arch_init").await;
    let p = fixtures::create_user(pool, "arch_p").await;
    let (discussion, round1) = fixtures::start_discussion(pool, &initiator).await;
    fixtures::add_active_participant(pool, discussion.id, &p).await;

    let response = submit(pool, round1.id, initiator.id, "The only voice this round.")
        .await
        .expect("submission");

    fixtures::backdate_round_responses(pool, round1.id, 90.0).await;
    fixtures::backdate_round_start(pool, round1.id, 95.0).await;
    lifecycle::handle_mrp_expiration(pool, round1.id)
        .await
        .expect("expiration handling");

    let discussion = Discussion::find_by_id(discussion.id, pool)
        .await
        .expect("reload discussion");
    assert!(discussion.is_archived());
    assert!(discussion.archived_at.is_some());

    let round1 = Round::find_by_id(round1.id, pool).await.expect("reload");
    assert_eq!(round1.status, "completed");

    // Archival froze the record: no new responses, no edits, no next round.
    let response = Response::find_by_id(response.id, pool)
        .await
        .expect("reload response");
    assert!(response.is_locked);

    let err = submit(pool, round1.id, p.id, "Too late.")
        .await
        .expect_err("archived discussion");
    assert!(matches!(err, DomainError::RoundNotAcceptingResponses));

    let err = edit(pool, response.id, initiator.id, "Rewriting history.")
        .await
        .expect_err("frozen response");
    assert!(matches!(err, DomainError::ResponseLocked));

    let next = lifecycle::create_next_round(pool, discussion.id, round1.id)
        .await
        .expect("advance call");
    assert!(next.is_none());
}
