//! Round lifecycle engine.
//!
//! Computes the per-round response period (median of inter-response
//! intervals, scaled), closes rounds into their voting phase, advances to the
//! next round under the discussion row lock, and decides termination.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::common::{DiscussionId, DomainError, DomainResult, RoundId};
use crate::domains::discussions::{Discussion, DiscussionStatus};
use crate::domains::participants::engine as observers;
use crate::domains::participants::models::{ObserverReason, Participant};
use crate::domains::platform::PlatformConfig;
use crate::domains::responses::Response;
use crate::domains::rounds::models::{Round, RoundStatus};
use crate::domains::voting::tally;

/// Which rounds contribute intervals to the response-period median.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrpScope {
    CurrentRound,
    LastXRounds,
    AllRounds,
}

impl MrpScope {
    /// Unrecognized values fall back to the widest scope.
    pub fn parse(s: &str) -> Self {
        match s {
            "current_round" => MrpScope::CurrentRound,
            "last_x_rounds" | "last_X_rounds" => MrpScope::LastXRounds,
            _ => MrpScope::AllRounds,
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).expect("interval values are finite"));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Response period from observed inter-response intervals.
///
/// Intervals below the minimum response time are clamped up to it before the
/// median; the result is scaled by the multiplier and floored at
/// `mrm × rtm`. With no intervals the floor is the answer.
pub fn compute_mrp(intervals: &[f64], mrm_minutes: i32, rtm: f64) -> f64 {
    let floor = f64::from(mrm_minutes) * rtm;
    if intervals.is_empty() {
        return floor;
    }
    let adjusted: Vec<f64> = intervals
        .iter()
        .map(|t| t.max(f64::from(mrm_minutes)))
        .collect();
    (median(adjusted) * rtm).max(floor)
}

/// Counts the termination rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct TerminationSnapshot {
    pub active_count: i64,
    pub round_response_count: i64,
    pub total_response_count: i64,
    pub round_number: i32,
    pub discussion_age_days: i64,
}

/// First matching termination rule wins; `None` means the discussion
/// continues. A limit configured as 0 disables that rule.
pub fn check_termination(s: &TerminationSnapshot, config: &PlatformConfig) -> Option<String> {
    if s.active_count == 0 {
        return Some("all active participants became permanent observers".to_string());
    }
    if s.round_response_count == 0 {
        return Some(format!("round {} received 0 responses", s.round_number));
    }
    if s.round_response_count == 1 {
        return Some(format!("round {} received only 1 response", s.round_number));
    }
    if config.max_discussion_duration_days > 0
        && s.discussion_age_days > i64::from(config.max_discussion_duration_days)
    {
        return Some(format!(
            "exceeded maximum duration of {} days",
            config.max_discussion_duration_days
        ));
    }
    if config.max_discussion_rounds > 0 && s.round_number >= config.max_discussion_rounds {
        return Some(format!(
            "reached maximum rounds of {}",
            config.max_discussion_rounds
        ));
    }
    if config.max_discussion_responses > 0
        && s.total_response_count >= i64::from(config.max_discussion_responses)
    {
        return Some(format!(
            "reached maximum responses of {}",
            config.max_discussion_responses
        ));
    }
    None
}

async fn termination_snapshot(
    conn: &mut sqlx::PgConnection,
    discussion: &Discussion,
    round: &Round,
) -> DomainResult<TerminationSnapshot> {
    let active_count = Participant::active_count(discussion.id, &mut *conn).await?;
    let round_response_count = Response::count_in_round(round.id, &mut *conn).await?;
    let total_response_count = Response::count_in_discussion(discussion.id, &mut *conn).await?;
    Ok(TerminationSnapshot {
        active_count,
        round_response_count,
        total_response_count,
        round_number: round.round_number,
        discussion_age_days: (Utc::now() - discussion.created_at).num_days(),
    })
}

/// Evaluate the termination rules against live counts.
pub async fn check_termination_conditions(
    conn: &mut sqlx::PgConnection,
    discussion: &Discussion,
    round: &Round,
    config: &PlatformConfig,
) -> DomainResult<Option<String>> {
    let snapshot = termination_snapshot(conn, discussion, round).await?;
    Ok(check_termination(&snapshot, config))
}

/// The response intervals in scope for a round's MRP computation.
async fn intervals_in_scope(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    config: &PlatformConfig,
) -> DomainResult<Vec<f64>> {
    let round_ids: Vec<RoundId> = match MrpScope::parse(&config.mrp_calculation_scope) {
        MrpScope::CurrentRound => vec![round.id],
        MrpScope::LastXRounds => {
            sqlx::query_scalar::<_, RoundId>(
                r#"
                SELECT id FROM rounds
                WHERE discussion_id = $1 AND round_number <= $2
                ORDER BY round_number DESC
                LIMIT $3
                "#,
            )
            .bind(round.discussion_id)
            .bind(round.round_number)
            .bind(i64::from(config.mrp_calculation_x_rounds))
            .fetch_all(&mut *conn)
            .await?
        }
        MrpScope::AllRounds => {
            sqlx::query_scalar::<_, RoundId>(
                "SELECT id FROM rounds WHERE discussion_id = $1 AND round_number <= $2",
            )
            .bind(round.discussion_id)
            .bind(round.round_number)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    Ok(Response::intervals_for_rounds(&round_ids, conn).await?)
}

/// Compute the round's MRP from the configured scope and the discussion's
/// current MRM/RTM.
pub async fn calculate_mrp(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
    config: &PlatformConfig,
) -> DomainResult<f64> {
    let intervals = intervals_in_scope(conn, round, config).await?;
    Ok(compute_mrp(
        &intervals,
        discussion.min_response_time_minutes,
        discussion.response_time_multiplier,
    ))
}

/// When the round's response window runs out: the latest response (or round
/// start) plus the final MRP. `None` for rounds not accepting responses.
pub async fn mrp_deadline(
    conn: &mut sqlx::PgConnection,
    round: &Round,
) -> DomainResult<Option<DateTime<Utc>>> {
    if round.status != "in_progress" {
        return Ok(None);
    }
    let Some(mrp) = round.final_mrp_minutes else {
        return Ok(None);
    };
    let last = Response::latest_in_round(round.id, conn).await?;
    let from = last.map(|r| r.created_at).unwrap_or(round.start_time);
    Ok(Some(from + Duration::seconds((mrp * 60.0) as i64)))
}

/// A round ends when its window expires or every active participant has
/// posted.
pub async fn should_end_round(
    conn: &mut sqlx::PgConnection,
    round: &Round,
) -> DomainResult<bool> {
    if round.status != "in_progress" {
        return Ok(false);
    }
    if let Some(deadline) = mrp_deadline(&mut *conn, round).await? {
        if Utc::now() >= deadline {
            return Ok(true);
        }
    }
    let active = Participant::find_active(round.discussion_id, &mut *conn).await?;
    let responders = Response::responder_ids(round.id, &mut *conn).await?;
    Ok(active.iter().all(|p| responders.contains(&p.user_id)))
}

/// Close the response phase: fix the final MRP, lock the round's responses,
/// and open voting. Runs in the caller's transaction.
pub async fn end_round(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
    config: &PlatformConfig,
) -> DomainResult<Round> {
    let final_mrp = calculate_mrp(&mut *conn, round, discussion, config).await?;

    let round = sqlx::query_as::<_, Round>(
        r#"
        UPDATE rounds
        SET status = 'voting', end_time = NOW(), final_mrp_minutes = $2
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(round.id)
    .bind(final_mrp)
    .fetch_one(&mut *conn)
    .await?;

    Response::lock_round(round.id, &mut *conn).await?;
    Discussion::set_status(discussion.id, DiscussionStatus::Voting, &mut *conn).await?;

    info!(
        discussion_id = %discussion.id,
        round_number = round.round_number,
        final_mrp_minutes = final_mrp,
        "round closed, voting open"
    );
    Ok(round)
}

/// Irreversibly archive the discussion and freeze every response it holds.
/// Runs in the caller's transaction.
pub async fn archive_discussion(
    conn: &mut sqlx::PgConnection,
    discussion_id: DiscussionId,
    reason: &str,
) -> DomainResult<()> {
    sqlx::query(
        r#"
        UPDATE discussions
        SET status = 'archived', archived_at = NOW()
        WHERE id = $1 AND status <> 'archived'
        "#,
    )
    .bind(discussion_id)
    .execute(&mut *conn)
    .await?;

    Response::lock_discussion(discussion_id, &mut *conn).await?;

    info!(discussion_id = %discussion_id, reason, "discussion archived");
    Ok(())
}

async fn create_round_locked(
    conn: &mut sqlx::PgConnection,
    discussion: &Discussion,
    previous_round: &Round,
    final_mrp_minutes: f64,
) -> DomainResult<Option<Round>> {
    let config = PlatformConfig::load_with(&mut *conn).await?;

    if let Some(reason) =
        check_termination_conditions(&mut *conn, discussion, previous_round, &config).await?
    {
        Round::set_status(previous_round.id, RoundStatus::Completed, &mut *conn).await?;
        archive_discussion(&mut *conn, discussion.id, &reason).await?;
        return Ok(None);
    }

    Round::set_status(previous_round.id, RoundStatus::Completed, &mut *conn).await?;
    let next = Round::create(
        discussion.id,
        previous_round.round_number + 1,
        final_mrp_minutes,
        &mut *conn,
    )
    .await?;
    Discussion::set_status(discussion.id, DiscussionStatus::Active, &mut *conn).await?;

    info!(
        discussion_id = %discussion.id,
        round_number = next.round_number,
        final_mrp_minutes,
        "next round created"
    );
    Ok(Some(next))
}

/// Advance to the next round, or archive if a termination rule now matches.
///
/// Serializes on the discussion row lock so two concurrent calls cannot both
/// create round N+1; the UNIQUE (discussion_id, round_number) constraint
/// backstops the lock.
pub async fn create_next_round(
    pool: &PgPool,
    discussion_id: DiscussionId,
    previous_round_id: RoundId,
) -> DomainResult<Option<Round>> {
    let mut tx = pool.begin().await?;

    let discussion = Discussion::lock_for_update(discussion_id, &mut tx).await?;
    if discussion.is_archived() {
        return Ok(None);
    }
    let previous = Round::find_by_id(previous_round_id, pool).await?;

    let inherited = previous.final_mrp_minutes.unwrap_or_else(|| {
        f64::from(discussion.min_response_time_minutes) * discussion.response_time_multiplier
    });

    let next = create_round_locked(&mut tx, &discussion, &previous, inherited).await?;
    tx.commit().await?;
    Ok(next)
}

/// Close a round's voting phase and advance.
///
/// Resolves the parameter votes and applies the winning directions to the
/// discussion, settles removal votes and pending join requests, recomputes
/// the MRP under the possibly-changed multiplier, then delegates to round
/// creation (which may archive instead).
pub async fn close_voting_and_create_next_round(
    pool: &PgPool,
    round_id: RoundId,
) -> DomainResult<Option<Round>> {
    let mut tx = pool.begin().await?;

    let round = Round::find_by_id(round_id, pool).await?;
    let discussion = Discussion::lock_for_update(round.discussion_id, &mut tx).await?;
    if discussion.is_archived() {
        return Ok(None);
    }
    // Re-read under the lock: a concurrent close may have settled this round
    // before we acquired it.
    let round = sqlx::query_as::<_, Round>("SELECT * FROM rounds WHERE id = $1")
        .bind(round_id)
        .fetch_one(&mut *tx)
        .await?;
    if round.status != "voting" {
        return Err(DomainError::NotVotingPhase);
    }
    let config = PlatformConfig::load_with(&mut *tx).await?;

    tally::apply_round_votes(&mut tx, &round, &discussion, &config).await?;
    tally::resolve_removal_votes(&mut tx, &round, &discussion, &config).await?;
    tally::process_join_requests(&mut tx, &round, &discussion).await?;

    // Parameters may have moved; recompute under the fresh values.
    let discussion = sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE id = $1")
        .bind(discussion.id)
        .fetch_one(&mut *tx)
        .await?;
    let new_mrp = calculate_mrp(&mut tx, &round, &discussion, &config).await?;

    let next = create_round_locked(&mut tx, &discussion, &round, new_mrp).await?;
    tx.commit().await?;
    Ok(next)
}

/// Expiration sweep for one round: demote every active participant who never
/// posted, then either archive (termination rule matched) or close the round
/// into voting.
pub async fn handle_mrp_expiration(pool: &PgPool, round_id: RoundId) -> DomainResult<()> {
    let mut tx = pool.begin().await?;

    let Some(round) = sqlx::query_as::<_, Round>(
        "SELECT * FROM rounds WHERE id = $1 AND status = 'in_progress' FOR UPDATE",
    )
    .bind(round_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        // Already closed by a concurrent sweep or submission.
        return Ok(());
    };

    let discussion = Discussion::lock_for_update(round.discussion_id, &mut tx).await?;
    if discussion.is_archived() {
        return Ok(());
    }
    let config = PlatformConfig::load_with(&mut *tx).await?;

    let active = Participant::find_active(discussion.id, &mut *tx).await?;
    let responders = Response::responder_ids(round.id, &mut *tx).await?;
    for participant in &active {
        if !responders.contains(&participant.user_id) {
            observers::move_to_observer(
                &mut tx,
                participant.id,
                ObserverReason::MrpExpired,
                false,
            )
            .await?;
        }
    }

    if let Some(reason) =
        check_termination_conditions(&mut tx, &discussion, &round, &config).await?
    {
        Round::set_status(round.id, RoundStatus::Completed, &mut *tx).await?;
        archive_discussion(&mut tx, discussion.id, &reason).await?;
    } else {
        end_round(&mut tx, &round, &discussion, &config).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mrp_from_documented_example() {
        // intervals [10, 60, 40], MRM 30, RTM 2: 10 clamps to 30,
        // median of [30, 60, 40] is 40, times 2 is 80.
        assert_eq!(compute_mrp(&[10.0, 60.0, 40.0], 30, 2.0), 80.0);
    }

    #[test]
    fn mrp_without_intervals_is_floor() {
        assert_eq!(compute_mrp(&[], 30, 2.0), 60.0);
        assert_eq!(compute_mrp(&[], 5, 0.5), 2.5);
    }

    #[test]
    fn mrp_never_below_floor() {
        // All intervals at or below MRM collapse to the floor.
        assert_eq!(compute_mrp(&[1.0, 2.0, 3.0], 30, 1.5), 45.0);
    }

    #[test]
    fn mrp_even_count_averages_middles() {
        // Adjusted [30, 40, 60, 80], median 50, RTM 1.
        assert_eq!(compute_mrp(&[10.0, 40.0, 60.0, 80.0], 30, 1.0), 50.0);
    }

    #[test]
    fn scope_parsing_falls_back_to_all_rounds() {
        assert_eq!(MrpScope::parse("current_round"), MrpScope::CurrentRound);
        assert_eq!(MrpScope::parse("last_x_rounds"), MrpScope::LastXRounds);
        assert_eq!(MrpScope::parse("all_rounds"), MrpScope::AllRounds);
        assert_eq!(MrpScope::parse("bogus"), MrpScope::AllRounds);
    }

    fn snapshot() -> TerminationSnapshot {
        TerminationSnapshot {
            active_count: 4,
            round_response_count: 4,
            total_response_count: 40,
            round_number: 10,
            discussion_age_days: 12,
        }
    }

    #[test]
    fn healthy_discussion_continues() {
        assert_eq!(check_termination(&snapshot(), &PlatformConfig::default()), None);
    }

    #[test]
    fn no_active_participants_archives_first() {
        let s = TerminationSnapshot {
            active_count: 0,
            round_response_count: 0,
            ..snapshot()
        };
        let reason = check_termination(&s, &PlatformConfig::default()).unwrap();
        assert!(reason.contains("permanent observers"));
    }

    #[test]
    fn single_response_round_archives() {
        let s = TerminationSnapshot {
            round_response_count: 1,
            ..snapshot()
        };
        let reason = check_termination(&s, &PlatformConfig::default()).unwrap();
        assert!(reason.contains("1 response"));
    }

    #[test]
    fn zero_response_round_archives() {
        let s = TerminationSnapshot {
            round_response_count: 0,
            ..snapshot()
        };
        let reason = check_termination(&s, &PlatformConfig::default()).unwrap();
        assert!(reason.contains("0 responses"));
    }

    #[test]
    fn configured_limits_archive() {
        let config = PlatformConfig::default();

        let s = TerminationSnapshot {
            discussion_age_days: i64::from(config.max_discussion_duration_days) + 1,
            ..snapshot()
        };
        assert!(check_termination(&s, &config).unwrap().contains("duration"));

        let s = TerminationSnapshot {
            round_number: config.max_discussion_rounds,
            ..snapshot()
        };
        assert!(check_termination(&s, &config).unwrap().contains("rounds"));

        let s = TerminationSnapshot {
            total_response_count: i64::from(config.max_discussion_responses),
            ..snapshot()
        };
        assert!(check_termination(&s, &config)
            .unwrap()
            .contains("responses"));
    }

    #[test]
    fn duration_limit_is_exclusive() {
        // A discussion exactly at the limit gets its boundary day.
        let config = PlatformConfig::default();
        let s = TerminationSnapshot {
            discussion_age_days: i64::from(config.max_discussion_duration_days),
            ..snapshot()
        };
        assert_eq!(check_termination(&s, &config), None);
    }

    #[test]
    fn zero_limits_are_disabled() {
        let config = PlatformConfig {
            max_discussion_duration_days: 0,
            max_discussion_rounds: 0,
            max_discussion_responses: 0,
            ..PlatformConfig::default()
        };
        let s = TerminationSnapshot {
            discussion_age_days: 10_000,
            round_number: 10_000,
            total_response_count: 1_000_000,
            ..snapshot()
        };
        assert_eq!(check_termination(&s, &config), None);
    }
}
