//! Recovery command handlers: one-shot `recover` and the periodic `sweep`

use super::{print_json, OutputFormat};
use crate::app::ScoutApp;
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;
use chrono::Utc;
use scout_core::{RecoveryPolicy, RecoverySweeper};
use std::time::Duration;
use tracing::info;

/// Handle `scout recover`: sweep once, optionally overriding the policy
pub async fn handle_recover(
    app: &ScoutApp,
    shutdown: &ShutdownCoordinator,
    staleness_minutes: Option<u64>,
    max_retries: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut policy: RecoveryPolicy = app.config().recovery.policy();
    if let Some(minutes) = staleness_minutes {
        policy.staleness = chrono::Duration::minutes(i64::try_from(minutes).unwrap_or(i64::MAX / 60_000));
    }
    if let Some(ceiling) = max_retries {
        policy.max_retries = ceiling;
    }

    let sweeper = RecoverySweeper::new(app.engine().clone(), policy);
    let summary = tokio::select! {
        summary = sweeper.sweep(Utc::now()) => summary?,
        _ = shutdown.wait_for_shutdown() => {
            println!("Sweep interrupted, recovered jobs stay at their last checkpoint");
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            println!(
                "Recovered: {}  Failed: {}  Max retries reached: {}",
                summary.recovered, summary.failed, summary.max_retries_reached
            );
            Ok(())
        }
    }
}

/// Handle `scout sweep`: sweep periodically until SIGINT/SIGTERM
pub async fn handle_sweep(
    app: &ScoutApp,
    shutdown: &ShutdownCoordinator,
    interval_secs: Option<u64>,
) -> Result<()> {
    let interval = interval_secs
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| app.config().recovery.sweep_interval());

    info!(interval_secs = interval.as_secs(), "Starting recovery sweeper");
    app.sweeper()
        .run_periodic(interval, shutdown.wait_for_shutdown())
        .await;
    info!("Recovery sweeper stopped");
    Ok(())
}
