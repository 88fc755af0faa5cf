//! Vote resolution at round close.
//!
//! The counting rules are pure functions over loaded ballots; the async
//! functions apply their outcomes inside the round-close transaction.

use std::str::FromStr;

use tracing::info;

use crate::common::{DomainResult, UserId};
use crate::domains::discussions::Discussion;
use crate::domains::participants::engine as observers;
use crate::domains::participants::models::{Participant, ParticipantRole};
use crate::domains::platform::PlatformConfig;
use crate::domains::removal::RemovalAction;
use crate::domains::responses::Response;
use crate::domains::rounds::Round;
use crate::domains::voting::models::{JoinRequest, JoinRequestVote, RemovalVote, Vote, VoteChoice};

/// Ballot counts for one parameter, with abstentions tracked separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTotals {
    pub increase: usize,
    pub decrease: usize,
    pub no_change: usize,
    pub not_voted: usize,
}

impl VoteTotals {
    pub fn count(choices: &[VoteChoice], eligible: usize) -> Self {
        let mut totals = VoteTotals::default();
        for choice in choices {
            match choice {
                VoteChoice::Increase => totals.increase += 1,
                VoteChoice::Decrease => totals.decrease += 1,
                VoteChoice::NoChange => totals.no_change += 1,
            }
        }
        totals.not_voted = eligible.saturating_sub(choices.len());
        totals
    }
}

/// Plurality with abstentions counted as `no_change`; any tie resolves to
/// `no_change`.
pub fn resolve_vote(totals: &VoteTotals) -> VoteChoice {
    let effective_no_change = totals.no_change + totals.not_voted;
    let max = totals
        .increase
        .max(totals.decrease)
        .max(effective_no_change);

    let winners = usize::from(totals.increase == max)
        + usize::from(totals.decrease == max)
        + usize::from(effective_no_change == max);
    if winners > 1 {
        return VoteChoice::NoChange;
    }
    if totals.increase == max {
        VoteChoice::Increase
    } else if totals.decrease == max {
        VoteChoice::Decrease
    } else {
        VoteChoice::NoChange
    }
}

/// New MRL after a vote, stepped by the configured increment and clamped to
/// the configured bounds.
pub fn next_mrl(current: i32, change: VoteChoice, config: &PlatformConfig) -> i32 {
    let pct = f64::from(config.voting_increment_percentage) / 100.0;
    let next = match change {
        VoteChoice::Increase => (f64::from(current) * (1.0 + pct)) as i32,
        VoteChoice::Decrease => (f64::from(current) * (1.0 - pct)) as i32,
        VoteChoice::NoChange => current,
    };
    next.clamp(config.mrl_min_chars, config.mrl_max_chars)
}

/// New RTM after a vote, stepped and clamped the same way.
pub fn next_rtm(current: f64, change: VoteChoice, config: &PlatformConfig) -> f64 {
    let pct = f64::from(config.voting_increment_percentage) / 100.0;
    let next = match change {
        VoteChoice::Increase => current * (1.0 + pct),
        VoteChoice::Decrease => current * (1.0 - pct),
        VoteChoice::NoChange => current,
    };
    next.clamp(config.rtm_min, config.rtm_max)
}

/// Eligible voters for a round: everyone who responded in it, plus the
/// discussion initiator.
pub async fn eligible_voters(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
) -> DomainResult<Vec<UserId>> {
    let mut voters = Response::responder_ids(round.id, &mut *conn).await?;
    if !voters.contains(&discussion.initiator_id) {
        voters.push(discussion.initiator_id);
    }
    Ok(voters)
}

/// Resolve both parameter votes and write the winning directions onto the
/// discussion.
pub async fn apply_round_votes(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
    config: &PlatformConfig,
) -> DomainResult<()> {
    let eligible = eligible_voters(&mut *conn, round, discussion).await?.len();
    let votes = Vote::find_by_round(round.id, &mut *conn).await?;

    let mrl_choices: Vec<VoteChoice> = votes
        .iter()
        .filter_map(|v| VoteChoice::from_str(&v.mrl_vote).ok())
        .collect();
    let rtm_choices: Vec<VoteChoice> = votes
        .iter()
        .filter_map(|v| VoteChoice::from_str(&v.rtm_vote).ok())
        .collect();

    let mrl_result = resolve_vote(&VoteTotals::count(&mrl_choices, eligible));
    let rtm_result = resolve_vote(&VoteTotals::count(&rtm_choices, eligible));

    let new_mrl = next_mrl(discussion.max_response_length_chars, mrl_result, config);
    let new_rtm = next_rtm(discussion.response_time_multiplier, rtm_result, config);

    Discussion::apply_parameters(discussion.id, new_mrl, new_rtm, &mut *conn).await?;

    info!(
        discussion_id = %discussion.id,
        round_number = round.round_number,
        mrl_result = %mrl_result,
        rtm_result = %rtm_result,
        new_mrl,
        new_rtm,
        "parameter votes resolved"
    );
    Ok(())
}

/// Settle removal votes: any target marked by at least the configured share
/// of eligible voters becomes a permanent observer.
pub async fn resolve_removal_votes(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
    config: &PlatformConfig,
) -> DomainResult<Vec<UserId>> {
    let eligible = Response::responder_ids(round.id, &mut *conn).await?.len();
    if eligible == 0 {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for target_id in RemovalVote::targets_in_round(round.id, &mut *conn).await? {
        let votes = RemovalVote::count_for_target(round.id, target_id, &mut *conn).await?;
        let share = votes as f64 / eligible as f64;
        if share < config.vote_based_removal_threshold {
            continue;
        }

        let Some(participant) = sqlx::query_as::<_, Participant>(
            "SELECT * FROM discussion_participants WHERE discussion_id = $1 AND user_id = $2",
        )
        .bind(discussion.id)
        .bind(target_id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            continue;
        };

        observers::demote_permanently(&mut *conn, participant.id, "vote_based_removal").await?;

        let voters = RemovalVote::voters_for_target(round.id, target_id, &mut *conn).await?;
        if let Some(&first_voter) = voters.first() {
            RemovalAction::create(
                discussion.id,
                round.id,
                "vote_based_removal",
                first_voter,
                target_id,
                true,
                &mut *conn,
            )
            .await?;
        }

        removed.push(target_id);
    }
    Ok(removed)
}

/// Settle pending join requests by simple majority of ballots cast this
/// round. No ballots or a tie leaves the request pending for the next round.
pub async fn process_join_requests(
    conn: &mut sqlx::PgConnection,
    round: &Round,
    discussion: &Discussion,
) -> DomainResult<()> {
    let config = PlatformConfig::load_with(&mut *conn).await?;

    for request in JoinRequest::find_pending(discussion.id, &mut *conn).await? {
        let (approvals, denials) = JoinRequestVote::tally(request.id, round.id, &mut *conn).await?;

        if approvals > denials {
            let participant_count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM discussion_participants WHERE discussion_id = $1",
            )
            .bind(discussion.id)
            .fetch_one(&mut *conn)
            .await?;
            if participant_count >= i64::from(config.max_discussion_participants) {
                // At capacity; leave pending for a later round.
                continue;
            }

            JoinRequest::resolve(request.id, "approved", &mut *conn).await?;
            Participant::create(
                discussion.id,
                request.requester_id,
                ParticipantRole::Active,
                &mut *conn,
            )
            .await?;
            info!(
                discussion_id = %discussion.id,
                requester_id = %request.requester_id,
                "join request approved"
            );
        } else if denials > approvals {
            JoinRequest::resolve(request.id, "declined", &mut *conn).await?;
            info!(
                discussion_id = %discussion.id,
                requester_id = %request.requester_id,
                "join request declined"
            );
        }
    }
    Ok(())
}
