//! Command handlers for the scout CLI

pub mod init;
pub mod job;
pub mod recovery;

use crate::error::Result;
use clap::ValueEnum;
use scout_core::RunOutcome;
use serde::Serialize;

/// Output format for read commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line description of how a run halted
pub fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::RateLimited { provider, reset_at } => format!(
            "paused: {} rate limited until {}",
            provider,
            reset_at.to_rfc3339()
        ),
        RunOutcome::Failed { message } => format!("failed: {}", message),
    }
}
