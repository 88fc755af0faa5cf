mod common;

use common::{fixtures, TestHarness};
use rust_decimal::Decimal;
use test_context::test_context;

use server_core::common::DomainError;
use server_core::domains::invites::ledger::{self, InviteKind};
use server_core::domains::invites::User;

#[test_context(TestHarness)]
#[tokio::test]
async fn event_credits_accumulate_and_stay_balanced(ctx: &TestHarness) {
    let user = fixtures::create_user(&ctx.db_pool, "ledger_accrue").await;

    let mut conn = ctx.db_pool.acquire().await.expect("acquire connection");
    for _ in 0..5 {
        ledger::earn_event_credit(&mut conn, user.id)
            .await
            .expect("earn event credit");
    }
    drop(conn);

    let user = User::find_by_id(user.id, &ctx.db_pool)
        .await
        .expect("reload user");
    // Five events at 0.2 each add up to exactly one whole platform invite.
    assert_eq!(user.platform_invites_acquired, Decimal::ONE);
    assert_eq!(user.platform_invites_banked, Decimal::ONE);
    assert_eq!(user.platform_invites_used, Decimal::ZERO);
    assert_eq!(user.discussion_invites_acquired, 5);
    assert_eq!(user.discussion_invites_banked, 5);

    ledger::verify_ledger(&ctx.db_pool, user.id)
        .await
        .expect("ledger balanced");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn consume_moves_banked_to_used(ctx: &TestHarness) {
    let user = fixtures::create_user(&ctx.db_pool, "ledger_consume").await;

    let mut conn = ctx.db_pool.acquire().await.expect("acquire connection");
    for _ in 0..5 {
        ledger::earn_event_credit(&mut conn, user.id)
            .await
            .expect("earn event credit");
    }
    drop(conn);

    ledger::consume(&ctx.db_pool, user.id, InviteKind::Discussion)
        .await
        .expect("consume discussion invite");
    ledger::consume(&ctx.db_pool, user.id, InviteKind::Platform)
        .await
        .expect("consume platform invite");

    let user = User::find_by_id(user.id, &ctx.db_pool)
        .await
        .expect("reload user");
    assert_eq!(user.discussion_invites_used, 1);
    assert_eq!(user.discussion_invites_banked, 4);
    assert_eq!(user.platform_invites_used, Decimal::ONE);
    assert_eq!(user.platform_invites_banked, Decimal::ZERO);

    ledger::verify_ledger(&ctx.db_pool, user.id)
        .await
        .expect("ledger balanced");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn consume_without_banked_invites_is_rejected(ctx: &TestHarness) {
    let user = fixtures::create_user(&ctx.db_pool, "ledger_empty").await;

    let err = ledger::consume(&ctx.db_pool, user.id, InviteKind::Platform)
        .await
        .expect_err("nothing banked");
    assert!(matches!(
        err,
        DomainError::InsufficientInvites { kind: "platform" }
    ));

    let err = ledger::consume(&ctx.db_pool, user.id, InviteKind::Discussion)
        .await
        .expect_err("nothing banked");
    assert!(matches!(
        err,
        DomainError::InsufficientInvites { kind: "discussion" }
    ));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn forfeiture_zeroes_platform_and_keeps_discussion(ctx: &TestHarness) {
    let user = fixtures::create_user(&ctx.db_pool, "ledger_forfeit").await;

    let mut conn = ctx.db_pool.acquire().await.expect("acquire connection");
    for _ in 0..5 {
        ledger::earn_event_credit(&mut conn, user.id)
            .await
            .expect("earn event credit");
    }
    drop(conn);
    ledger::consume(&ctx.db_pool, user.id, InviteKind::Discussion)
        .await
        .expect("consume discussion invite");

    User::forfeit_platform_invites(user.id, &ctx.db_pool)
        .await
        .expect("forfeit");

    let user = User::find_by_id(user.id, &ctx.db_pool)
        .await
        .expect("reload user");
    assert_eq!(user.platform_invites_acquired, Decimal::ZERO);
    assert_eq!(user.platform_invites_used, Decimal::ZERO);
    assert_eq!(user.platform_invites_banked, Decimal::ZERO);
    // The discussion-invite economy is untouched.
    assert_eq!(user.discussion_invites_acquired, 5);
    assert_eq!(user.discussion_invites_used, 1);
    assert_eq!(user.discussion_invites_banked, 4);

    ledger::verify_ledger(&ctx.db_pool, user.id)
        .await
        .expect("ledger balanced after forfeiture");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn invites_unlock_after_configured_responses(ctx: &TestHarness) {
    let user = fixtures::create_user(&ctx.db_pool, "ledger_unlock").await;

    let (allowed, reason) =
        ledger::can_send_invite(&ctx.db_pool, user.id, InviteKind::Discussion, 3)
            .await
            .expect("check invite");
    assert!(!allowed);
    assert!(reason.expect("locked reason").contains("3 more responses"));
}
