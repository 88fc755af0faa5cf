//! The invite-credit ledger.
//!
//! All invite balance mutations go through `earn` and `consume`. Both are
//! single atomic UPDATE statements so they can run inside the transaction of
//! the event that triggers them (response submission, vote cast) - no partial
//! credit survives a rollback.
//!
//! Platform invites use decimal arithmetic (0.2 per credited event);
//! discussion invites use integer arithmetic (1 per event).

use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use std::fmt;
use std::str::FromStr;

use crate::common::{DomainError, DomainResult, UserId};

/// Platform-invite credit for a response or a voting session: 0.2.
pub fn platform_credit_per_event() -> Decimal {
    Decimal::new(2, 1)
}

/// Discussion-invite credit for a response or a voting session: 1.
pub const DISCUSSION_CREDIT_PER_EVENT: i32 = 1;

/// The two independent invite currencies. Accrual rates and consumption
/// semantics differ; they are never unified into a single balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteKind {
    Platform,
    Discussion,
}

impl fmt::Display for InviteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InviteKind::Platform => write!(f, "platform"),
            InviteKind::Discussion => write!(f, "discussion"),
        }
    }
}

impl FromStr for InviteKind {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "platform" => Ok(InviteKind::Platform),
            "discussion" => Ok(InviteKind::Discussion),
            other => Err(DomainError::InvalidKind(other.to_string())),
        }
    }
}

/// Atomically increment `acquired` and `banked` for the given kind.
///
/// Must be called inside the same transaction as the triggering event so a
/// failure rolls the credit back along with it.
pub async fn earn(
    executor: impl PgExecutor<'_>,
    user_id: UserId,
    kind: InviteKind,
    platform_amount: Decimal,
    discussion_amount: i32,
) -> DomainResult<()> {
    let rows = match kind {
        InviteKind::Platform => {
            sqlx::query(
                r#"
                UPDATE users
                SET platform_invites_acquired = platform_invites_acquired + $2,
                    platform_invites_banked = platform_invites_banked + $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(platform_amount)
            .execute(executor)
            .await?
            .rows_affected()
        }
        InviteKind::Discussion => {
            sqlx::query(
                r#"
                UPDATE users
                SET discussion_invites_acquired = discussion_invites_acquired + $2,
                    discussion_invites_banked = discussion_invites_banked + $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(discussion_amount)
            .execute(executor)
            .await?
            .rows_affected()
        }
    };

    if rows == 0 {
        return Err(DomainError::invariant(format!(
            "earn({kind}) targeted missing user {user_id}"
        )));
    }
    Ok(())
}

/// Earn the standard per-event credit: 0.2 platform + 1 discussion invite.
///
/// Takes a connection rather than a pool so both increments share the
/// caller's transaction.
pub async fn earn_event_credit(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
) -> DomainResult<()> {
    earn(
        &mut *conn,
        user_id,
        InviteKind::Platform,
        platform_credit_per_event(),
        0,
    )
    .await?;
    earn(
        &mut *conn,
        user_id,
        InviteKind::Discussion,
        Decimal::ZERO,
        DISCUSSION_CREDIT_PER_EVENT,
    )
    .await
}

/// Atomically consume one banked invite: `banked -= 1`, `used += 1`.
///
/// The conditional UPDATE doubles as the row guard: two concurrent
/// consumptions cannot draw `banked` below zero, the loser simply matches no
/// row and gets `InsufficientInvites`.
pub async fn consume(
    executor: impl PgExecutor<'_>,
    user_id: UserId,
    kind: InviteKind,
) -> DomainResult<()> {
    let rows = match kind {
        InviteKind::Platform => {
            sqlx::query(
                r#"
                UPDATE users
                SET platform_invites_banked = platform_invites_banked - 1,
                    platform_invites_used = platform_invites_used + 1,
                    updated_at = NOW()
                WHERE id = $1 AND platform_invites_banked >= 1
                "#,
            )
            .bind(user_id)
            .execute(executor)
            .await?
            .rows_affected()
        }
        InviteKind::Discussion => {
            sqlx::query(
                r#"
                UPDATE users
                SET discussion_invites_banked = discussion_invites_banked - 1,
                    discussion_invites_used = discussion_invites_used + 1,
                    updated_at = NOW()
                WHERE id = $1 AND discussion_invites_banked >= 1
                "#,
            )
            .bind(user_id)
            .execute(executor)
            .await?
            .rows_affected()
        }
    };

    if rows == 0 {
        return Err(DomainError::InsufficientInvites {
            kind: match kind {
                InviteKind::Platform => "platform",
                InviteKind::Discussion => "discussion",
            },
        });
    }
    Ok(())
}

/// Check whether a user may send an invite of the given kind.
///
/// Invites unlock after a configured number of responses; after that the
/// banked balance gates sending.
pub async fn can_send_invite(
    pool: &PgPool,
    user_id: UserId,
    kind: InviteKind,
    responses_to_unlock: i32,
) -> DomainResult<(bool, Option<String>)> {
    let total_responses =
        crate::domains::invites::User::total_response_count(user_id, pool).await?;

    if total_responses < responses_to_unlock as i64 {
        let needed = responses_to_unlock as i64 - total_responses;
        return Ok((
            false,
            Some(format!("need {needed} more responses to unlock invites")),
        ));
    }

    let user = crate::domains::invites::User::find_by_id(user_id, pool).await?;

    let has_banked = match kind {
        InviteKind::Platform => user.platform_invites_banked >= Decimal::ONE,
        InviteKind::Discussion => user.discussion_invites_banked >= 1,
    };

    if has_banked {
        Ok((true, None))
    } else {
        Ok((false, Some(format!("no {kind} invites available"))))
    }
}

/// Verify `acquired == used + banked` for both kinds.
///
/// A violation is a programming bug, not a business-rule failure; it is
/// logged loudly and returned as `Invariant`.
pub async fn verify_ledger(pool: &PgPool, user_id: UserId) -> DomainResult<()> {
    let user = crate::domains::invites::User::find_by_id(user_id, pool).await?;

    if user.platform_invites_acquired != user.platform_invites_used + user.platform_invites_banked
    {
        return Err(DomainError::invariant(format!(
            "platform ledger out of balance for {}: acquired={} used={} banked={}",
            user_id,
            user.platform_invites_acquired,
            user.platform_invites_used,
            user.platform_invites_banked
        )));
    }

    if user.discussion_invites_acquired
        != user.discussion_invites_used + user.discussion_invites_banked
    {
        return Err(DomainError::invariant(format!(
            "discussion ledger out of balance for {}: acquired={} used={} banked={}",
            user_id,
            user.discussion_invites_acquired,
            user.discussion_invites_used,
            user.discussion_invites_banked
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_credit_is_one_fifth() {
        assert_eq!(platform_credit_per_event(), Decimal::new(2, 1));
        assert_eq!(platform_credit_per_event() * Decimal::from(5), Decimal::ONE);
    }

    #[test]
    fn invite_kind_parses_round_trip() {
        assert_eq!(
            "platform".parse::<InviteKind>().unwrap(),
            InviteKind::Platform
        );
        assert_eq!(
            "discussion".parse::<InviteKind>().unwrap(),
            InviteKind::Discussion
        );
        assert!(matches!(
            "points".parse::<InviteKind>(),
            Err(DomainError::InvalidKind(_))
        ));
    }
}
