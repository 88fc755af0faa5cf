use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

/// Platform-wide tunables, stored as a singleton row (`id = 1`).
///
/// A termination limit of 0 disables that specific check.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlatformConfig {
    pub id: i32,

    pub responses_to_unlock_invites: i32,
    pub max_discussion_participants: i32,

    // Inter-round voting
    pub voting_increment_percentage: i32,
    pub vote_based_removal_threshold: f64,

    // Termination limits
    pub max_discussion_duration_days: i32,
    pub max_discussion_rounds: i32,
    pub max_discussion_responses: i32,

    // Response editing
    pub response_edit_percentage: i32,
    pub response_edit_limit: i32,

    // MRP calculation
    pub mrp_calculation_scope: String, // 'current_round', 'last_x_rounds', 'all_rounds'
    pub mrp_calculation_x_rounds: i32,

    // Parameter bounds
    pub rtm_min: f64,
    pub rtm_max: f64,
    pub mrm_min_minutes: i32,
    pub mrm_max_minutes: i32,
    pub mrl_min_chars: i32,
    pub mrl_max_chars: i32,
}

impl PlatformConfig {
    /// Load the singleton configuration row.
    pub async fn load(pool: &PgPool) -> Result<Self> {
        Self::load_with(pool).await
    }

    /// Load inside an open transaction.
    pub async fn load_with(executor: impl PgExecutor<'_>) -> Result<Self> {
        let config =
            sqlx::query_as::<_, PlatformConfig>("SELECT * FROM platform_config WHERE id = 1")
                .fetch_one(executor)
                .await?;
        Ok(config)
    }
}

impl Default for PlatformConfig {
    /// Defaults mirroring the seeded configuration row. Used by unit tests
    /// that exercise pure logic without a database.
    fn default() -> Self {
        Self {
            id: 1,
            responses_to_unlock_invites: 3,
            max_discussion_participants: 10,
            voting_increment_percentage: 20,
            vote_based_removal_threshold: 0.5,
            max_discussion_duration_days: 90,
            max_discussion_rounds: 50,
            max_discussion_responses: 500,
            response_edit_percentage: 20,
            response_edit_limit: 2,
            mrp_calculation_scope: "current_round".to_string(),
            mrp_calculation_x_rounds: 3,
            rtm_min: 0.5,
            rtm_max: 2.0,
            mrm_min_minutes: 5,
            mrm_max_minutes: 1440,
            mrl_min_chars: 100,
            mrl_max_chars: 5000,
        }
    }
}
