//! Once-per-round voting credit.
//!
//! The dedup ledger is a table keyed on (round_id, user_id); the award is an
//! `INSERT .. ON CONFLICT DO NOTHING` so concurrent casts by the same user
//! settle to exactly one credit without a round-row lock.

use sqlx::PgExecutor;

use crate::common::{DomainResult, RoundId, UserId};
use crate::domains::invites::ledger;

/// Credit the voter for participating in this round's voting, at most once
/// per round. Returns whether a credit was actually granted.
///
/// Takes a connection so the dedup insert and both ledger increments share
/// the caller's transaction.
pub async fn award_once(
    conn: &mut sqlx::PgConnection,
    round_id: RoundId,
    user_id: UserId,
) -> DomainResult<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO voting_credits (round_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (round_id, user_id) DO NOTHING
        "#,
    )
    .bind(round_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Ok(false);
    }

    ledger::earn_event_credit(conn, user_id).await?;
    Ok(true)
}

/// Whether the user was already credited this round.
pub async fn was_awarded(
    round_id: RoundId,
    user_id: UserId,
    executor: impl PgExecutor<'_>,
) -> DomainResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM voting_credits WHERE round_id = $1 AND user_id = $2",
    )
    .bind(round_id)
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(count > 0)
}
