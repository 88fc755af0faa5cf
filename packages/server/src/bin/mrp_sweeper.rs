//! MRP expiration sweeper.
//!
//! Periodically scans for in-progress rounds whose response window has
//! elapsed and runs expiration handling for each: non-posters are demoted to
//! observers and the round either archives its discussion or moves into
//! voting.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::domains::rounds::{lifecycle, Round};
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(schedule = %config.sweep_schedule, "starting MRP sweeper");

    let scheduler = JobScheduler::new().await?;
    let sweep_pool = pool.clone();
    let sweep_job = Job::new_async(config.sweep_schedule.as_str(), move |_uuid, _lock| {
        let pool = sweep_pool.clone();
        Box::pin(async move {
            if let Err(e) = run_sweep(&pool).await {
                tracing::error!("MRP sweep failed: {}", e);
            }
        })
    })?;
    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down MRP sweeper");
    Ok(())
}

/// One pass: every expired round gets its own transaction, so one failure
/// does not stall the rest.
async fn run_sweep(pool: &PgPool) -> Result<()> {
    let expired = Round::find_expired_in_progress(pool).await?;
    if expired.is_empty() {
        return Ok(());
    }
    tracing::info!(count = expired.len(), "expired rounds found");

    for round in expired {
        if let Err(e) = lifecycle::handle_mrp_expiration(pool, round.id).await {
            tracing::error!(
                round_id = %round.id,
                discussion_id = %round.discussion_id,
                "expiration handling failed: {}",
                e
            );
        }
    }
    Ok(())
}
