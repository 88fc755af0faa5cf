//! Reinstatement eligibility rules, pure over a snapshot.
//!
//! Every timing branch lives here so it can be tested without a database:
//! the engine loads the participant and round rows, builds the inputs, and
//! dispatches through [`evaluate_rejoin`].

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Why a participant currently holds observer status, with the data the
/// timing rules branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverStanding {
    MrpExpired {
        posted_in_round: bool,
    },
    MutualRemoval {
        posted_in_round: bool,
        removal_count: i32,
    },
    VoteBasedRemoval,
}

/// The slice of a round the timing rules need.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext {
    pub round_number: i32,
    pub start_time: DateTime<Utc>,
    pub final_mrp_minutes: Option<f64>,
}

impl RoundContext {
    fn mrp(&self) -> Option<Duration> {
        self.final_mrp_minutes
            .map(|m| Duration::seconds((m * 60.0) as i64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinDecision {
    Allowed,
    Denied(RejoinDenial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinDenial {
    /// Permanent observers, and mutual-removal observers past the escalation
    /// limit, never return.
    Permanent,
    RemovedByVote,
    MustWaitForNextRound,
    MustSkipRound { skip_round: i32, rejoin_round: i32 },
    WaitMinutes(i64),
    Unknown(&'static str),
}

impl fmt::Display for RejoinDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejoinDenial::Permanent => write!(f, "permanent"),
            RejoinDenial::RemovedByVote => write!(f, "removed_by_vote"),
            RejoinDenial::MustWaitForNextRound => write!(f, "must_wait_for_next_round"),
            RejoinDenial::MustSkipRound {
                skip_round,
                rejoin_round,
            } => write!(
                f,
                "must_skip_round_{skip_round} / rejoin_in_round_{rejoin_round}"
            ),
            RejoinDenial::WaitMinutes(m) => write!(f, "wait_{m}_minutes"),
            RejoinDenial::Unknown(why) => write!(f, "unknown: {why}"),
        }
    }
}

/// Escalating mutual-removal cooldown keyed on removal count. `None` means
/// the participant can never return.
fn mutual_removal_cooldown(removal_count: i32) -> Option<Duration> {
    match removal_count {
        0 | 1 => Some(Duration::hours(24)),
        2 => Some(Duration::days(7)),
        _ => None,
    }
}

fn denied_until(ready_at: DateTime<Utc>, now: DateTime<Utc>) -> RejoinDecision {
    if now >= ready_at {
        RejoinDecision::Allowed
    } else {
        let remaining = ready_at - now;
        // Round up so "wait_0_minutes" never appears while still blocked.
        let minutes = (remaining.num_seconds() + 59) / 60;
        RejoinDecision::Denied(RejoinDenial::WaitMinutes(minutes))
    }
}

/// Evaluate whether an observer may return to active status right now.
///
/// `removal_round` is the round during which the demotion happened;
/// `current_round` is the round the participant would rejoin into.
pub fn evaluate_rejoin(
    standing: ObserverStanding,
    observer_since: DateTime<Utc>,
    removal_round: &RoundContext,
    current_round: &RoundContext,
    now: DateTime<Utc>,
) -> RejoinDecision {
    match standing {
        ObserverStanding::MrpExpired { .. } => {
            if current_round.round_number == removal_round.round_number {
                return RejoinDecision::Denied(RejoinDenial::MustWaitForNextRound);
            }
            // Must sit out one full MRP window of the round being rejoined.
            let Some(mrp) = current_round.mrp() else {
                return RejoinDecision::Denied(RejoinDenial::Unknown(
                    "current round has no response period",
                ));
            };
            denied_until(current_round.start_time + mrp, now)
        }

        ObserverStanding::MutualRemoval {
            posted_in_round,
            removal_count,
        } => {
            let Some(cooldown) = mutual_removal_cooldown(removal_count) else {
                return RejoinDecision::Denied(RejoinDenial::Permanent);
            };
            let cooldown_end = observer_since + cooldown;

            if posted_in_round {
                // Posted then removed: the whole next round is skipped.
                let rejoin_round = removal_round.round_number + 2;
                if current_round.round_number < rejoin_round {
                    return RejoinDecision::Denied(RejoinDenial::MustSkipRound {
                        skip_round: removal_round.round_number + 1,
                        rejoin_round,
                    });
                }
                denied_until(cooldown_end, now)
            } else {
                // Did not post: one MRP window of the removal round, plus the
                // escalating cooldown.
                let Some(mrp) = removal_round.mrp() else {
                    return RejoinDecision::Denied(RejoinDenial::Unknown(
                        "removal round has no response period",
                    ));
                };
                let ready_at = (observer_since + mrp).max(cooldown_end);
                denied_until(ready_at, now)
            }
        }

        ObserverStanding::VoteBasedRemoval => RejoinDecision::Denied(RejoinDenial::RemovedByVote),
    }
}

/// The first moment `evaluate_rejoin` would return `Allowed`, or `None` when
/// it never will (permanent standings) or the inputs are incomplete.
pub fn rejoin_wait_end(
    standing: ObserverStanding,
    observer_since: DateTime<Utc>,
    removal_round: &RoundContext,
    current_round: &RoundContext,
) -> Option<DateTime<Utc>> {
    match standing {
        ObserverStanding::MrpExpired { .. } => {
            if current_round.round_number == removal_round.round_number {
                // Cannot be computed until the next round exists.
                return None;
            }
            Some(current_round.start_time + current_round.mrp()?)
        }
        ObserverStanding::MutualRemoval {
            posted_in_round,
            removal_count,
        } => {
            let cooldown_end = observer_since + mutual_removal_cooldown(removal_count)?;
            if posted_in_round {
                if current_round.round_number < removal_round.round_number + 2 {
                    return None;
                }
                Some(cooldown_end)
            } else {
                let mrp_end = observer_since + removal_round.mrp()?;
                Some(mrp_end.max(cooldown_end))
            }
        }
        ObserverStanding::VoteBasedRemoval => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn round(number: i32, start: DateTime<Utc>, mrp_minutes: f64) -> RoundContext {
        RoundContext {
            round_number: number,
            start_time: start,
            final_mrp_minutes: Some(mrp_minutes),
        }
    }

    #[test]
    fn mrp_expired_blocked_in_same_round() {
        let r1 = round(1, t0(), 30.0);
        let demoted_at = t0() + Duration::minutes(30);
        let decision = evaluate_rejoin(
            ObserverStanding::MrpExpired {
                posted_in_round: false,
            },
            demoted_at,
            &r1,
            &r1,
            demoted_at + Duration::hours(5),
        );
        assert_eq!(
            decision,
            RejoinDecision::Denied(RejoinDenial::MustWaitForNextRound)
        );
    }

    #[test]
    fn mrp_expired_waits_one_window_into_next_round() {
        let r1 = round(1, t0(), 30.0);
        let demoted_at = t0() + Duration::minutes(30);
        let r2_start = demoted_at + Duration::minutes(5);
        let r2 = round(2, r2_start, 30.0);
        let standing = ObserverStanding::MrpExpired {
            posted_in_round: false,
        };

        // 10 minutes into round 2: still inside the window.
        let early = evaluate_rejoin(standing, demoted_at, &r1, &r2, r2_start + Duration::minutes(10));
        assert!(matches!(
            early,
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(20))
        ));

        // A full window later: allowed.
        let late = evaluate_rejoin(standing, demoted_at, &r1, &r2, r2_start + Duration::minutes(30));
        assert_eq!(late, RejoinDecision::Allowed);
    }

    #[test]
    fn mutual_removal_posted_skips_next_round() {
        let r1 = round(1, t0(), 30.0);
        let demoted_at = t0() + Duration::minutes(20);
        let standing = ObserverStanding::MutualRemoval {
            posted_in_round: true,
            removal_count: 1,
        };

        let r2 = round(2, demoted_at + Duration::hours(1), 30.0);
        let in_r2 = evaluate_rejoin(standing, demoted_at, &r1, &r2, demoted_at + Duration::hours(30));
        assert_eq!(
            in_r2,
            RejoinDecision::Denied(RejoinDenial::MustSkipRound {
                skip_round: 2,
                rejoin_round: 3,
            })
        );

        // Round 3, more than 24h after demotion: allowed.
        let r3 = round(3, demoted_at + Duration::hours(26), 30.0);
        let in_r3 = evaluate_rejoin(standing, demoted_at, &r1, &r3, demoted_at + Duration::hours(30));
        assert_eq!(in_r3, RejoinDecision::Allowed);

        // Round 3 but inside the 24h cooldown: still blocked.
        let r3_early = round(3, demoted_at + Duration::hours(2), 30.0);
        let blocked = evaluate_rejoin(
            standing,
            demoted_at,
            &r1,
            &r3_early,
            demoted_at + Duration::hours(3),
        );
        assert!(matches!(
            blocked,
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(_))
        ));
    }

    #[test]
    fn mutual_removal_not_posted_waits_mrp_and_cooldown() {
        let r1 = round(1, t0(), 30.0);
        let demoted_at = t0() + Duration::minutes(30);
        let standing = ObserverStanding::MutualRemoval {
            posted_in_round: false,
            removal_count: 1,
        };

        // MRP window elapsed but 24h cooldown has not: blocked.
        let blocked = evaluate_rejoin(
            standing,
            demoted_at,
            &r1,
            &r1,
            demoted_at + Duration::hours(2),
        );
        assert!(matches!(
            blocked,
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(_))
        ));

        let allowed = evaluate_rejoin(
            standing,
            demoted_at,
            &r1,
            &r1,
            demoted_at + Duration::hours(25),
        );
        assert_eq!(allowed, RejoinDecision::Allowed);
    }

    #[test]
    fn cooldown_boundary_first_removal() {
        let r1 = round(1, t0(), 30.0);
        let demoted_at = t0();
        let standing = ObserverStanding::MutualRemoval {
            posted_in_round: true,
            removal_count: 1,
        };
        let r3 = round(3, t0() + Duration::minutes(1), 30.0);

        let just_before = evaluate_rejoin(
            standing,
            demoted_at,
            &r1,
            &r3,
            demoted_at + Duration::hours(23) + Duration::minutes(59) + Duration::seconds(59),
        );
        assert!(matches!(
            just_before,
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(_))
        ));

        let just_after = evaluate_rejoin(
            standing,
            demoted_at,
            &r1,
            &r3,
            demoted_at + Duration::hours(24) + Duration::seconds(1),
        );
        assert_eq!(just_after, RejoinDecision::Allowed);
    }

    #[test]
    fn cooldown_boundary_second_removal() {
        let r1 = round(1, t0(), 30.0);
        let standing = ObserverStanding::MutualRemoval {
            posted_in_round: true,
            removal_count: 2,
        };
        let r3 = round(3, t0() + Duration::minutes(1), 30.0);

        let day_six = evaluate_rejoin(standing, t0(), &r1, &r3, t0() + Duration::days(6));
        assert!(matches!(
            day_six,
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(_))
        ));

        let day_eight = evaluate_rejoin(standing, t0(), &r1, &r3, t0() + Duration::days(8));
        assert_eq!(day_eight, RejoinDecision::Allowed);
    }

    #[test]
    fn third_removal_never_returns() {
        let r1 = round(1, t0(), 30.0);
        let standing = ObserverStanding::MutualRemoval {
            posted_in_round: true,
            removal_count: 3,
        };
        let r9 = round(9, t0() + Duration::days(399), 30.0);

        let decision = evaluate_rejoin(standing, t0(), &r1, &r9, t0() + Duration::days(400));
        assert_eq!(decision, RejoinDecision::Denied(RejoinDenial::Permanent));
        assert_eq!(
            rejoin_wait_end(standing, t0(), &r1, &r9),
            None
        );
    }

    #[test]
    fn vote_based_removal_is_terminal() {
        let r1 = round(1, t0(), 30.0);
        let decision = evaluate_rejoin(
            ObserverStanding::VoteBasedRemoval,
            t0(),
            &r1,
            &r1,
            t0() + Duration::days(365),
        );
        assert_eq!(decision, RejoinDecision::Denied(RejoinDenial::RemovedByVote));
    }

    #[test]
    fn wait_end_matches_evaluation() {
        let r1 = round(1, t0(), 45.0);
        let demoted_at = t0() + Duration::minutes(45);
        let r2 = round(2, demoted_at + Duration::minutes(10), 45.0);
        let standing = ObserverStanding::MrpExpired {
            posted_in_round: false,
        };

        let end = rejoin_wait_end(standing, demoted_at, &r1, &r2).unwrap();
        assert_eq!(end, r2.start_time + Duration::minutes(45));
        assert_eq!(
            evaluate_rejoin(standing, demoted_at, &r1, &r2, end),
            RejoinDecision::Allowed
        );
        assert!(matches!(
            evaluate_rejoin(standing, demoted_at, &r1, &r2, end - Duration::seconds(1)),
            RejoinDecision::Denied(RejoinDenial::WaitMinutes(1))
        ));
    }

    #[test]
    fn denial_codes_render() {
        assert_eq!(RejoinDenial::Permanent.to_string(), "permanent");
        assert_eq!(
            RejoinDenial::MustSkipRound {
                skip_round: 2,
                rejoin_round: 3
            }
            .to_string(),
            "must_skip_round_2 / rejoin_in_round_3"
        );
        assert_eq!(RejoinDenial::WaitMinutes(17).to_string(), "wait_17_minutes");
    }
}
