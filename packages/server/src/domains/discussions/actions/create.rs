//! Discussion creation: the discussion row, its initiator participant, and
//! round 1 commit together.

use sqlx::PgPool;
use tracing::info;

use crate::common::{DomainError, DomainResult, UserId};
use crate::domains::discussions::models::Discussion;
use crate::domains::participants::models::{Participant, ParticipantRole};
use crate::domains::platform::PlatformConfig;
use crate::domains::rounds::Round;

/// Requested parameters for a new discussion.
#[derive(Debug, Clone)]
pub struct NewDiscussion<'a> {
    pub topic_headline: &'a str,
    pub topic_details: &'a str,
    pub max_response_length_chars: i32,
    pub response_time_multiplier: f64,
    pub min_response_time_minutes: i32,
}

fn validate_parameters(params: &NewDiscussion<'_>, config: &PlatformConfig) -> DomainResult<()> {
    if params.topic_headline.trim().is_empty() {
        return Err(DomainError::ContentEmpty);
    }
    let mrl_ok = (config.mrl_min_chars..=config.mrl_max_chars)
        .contains(&params.max_response_length_chars);
    let mrm_ok = (config.mrm_min_minutes..=config.mrm_max_minutes)
        .contains(&params.min_response_time_minutes);
    let rtm_ok = params.response_time_multiplier >= config.rtm_min
        && params.response_time_multiplier <= config.rtm_max;
    if !mrl_ok || !mrm_ok || !rtm_ok {
        return Err(DomainError::ParametersOutOfBounds);
    }
    Ok(())
}

/// Create a discussion with its initiator participant and an in-progress
/// round 1. Round 1 opens with the floor response period, `MRM × RTM`.
pub async fn create_discussion(
    pool: &PgPool,
    initiator_id: UserId,
    params: NewDiscussion<'_>,
) -> DomainResult<Discussion> {
    let config = PlatformConfig::load(pool).await?;
    validate_parameters(&params, &config)?;

    let mut tx = pool.begin().await?;

    let discussion = Discussion::create(
        initiator_id,
        params.topic_headline,
        params.topic_details,
        params.max_response_length_chars,
        params.response_time_multiplier,
        params.min_response_time_minutes,
        &mut *tx,
    )
    .await?;

    Participant::create(
        discussion.id,
        initiator_id,
        ParticipantRole::Initiator,
        &mut *tx,
    )
    .await?;

    let initial_mrp =
        f64::from(params.min_response_time_minutes) * params.response_time_multiplier;
    Round::create(discussion.id, 1, initial_mrp, &mut *tx).await?;

    tx.commit().await?;

    info!(
        discussion_id = %discussion.id,
        initiator_id = %initiator_id,
        initial_mrp_minutes = initial_mrp,
        "discussion created"
    );
    Ok(discussion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NewDiscussion<'static> {
        NewDiscussion {
            topic_headline: "Trail maintenance this fall",
            topic_details: "Scope and volunteer schedule",
            max_response_length_chars: 1000,
            response_time_multiplier: 1.0,
            min_response_time_minutes: 30,
        }
    }

    #[test]
    fn in_bound_parameters_validate() {
        assert!(validate_parameters(&params(), &PlatformConfig::default()).is_ok());
    }

    #[test]
    fn out_of_bound_parameters_rejected() {
        let config = PlatformConfig::default();

        let mut p = params();
        p.max_response_length_chars = 50; // below mrl_min_chars
        assert!(validate_parameters(&p, &config).is_err());

        let mut p = params();
        p.response_time_multiplier = 3.0; // above rtm_max
        assert!(validate_parameters(&p, &config).is_err());

        let mut p = params();
        p.min_response_time_minutes = 1; // below mrm_min_minutes
        assert!(validate_parameters(&p, &config).is_err());
    }

    #[test]
    fn blank_headline_rejected() {
        let mut p = params();
        p.topic_headline = "  ";
        assert!(matches!(
            validate_parameters(&p, &PlatformConfig::default()),
            Err(DomainError::ContentEmpty)
        ));
    }
}
