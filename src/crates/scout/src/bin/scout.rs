//! scout CLI - checkpointed candidate sourcing
//!
//! Main entry point for the scout command-line tool.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use scout::cli::{self, OutputFormat};
use scout::{ConfigLoader, ScoutApp, ScoutConfig, ShutdownCoordinator};
use scout_checkpoint::{JobId, JobRequirements};
use scout_core::JobRequest;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "scout - checkpointed candidate sourcing", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file to use instead of ~/.scout/scout.toml and ./.scout/scout.toml
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Create a sourcing job
    Create(CreateArgs),

    /// Run a job from its last checkpoint
    Run {
        job_id: JobId,
    },

    /// Retry a failed, stuck or rate-limited job
    Retry {
        job_id: JobId,
    },

    /// Show progress of a job
    Status {
        job_id: JobId,
        /// Number of top scored candidates to show
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List jobs, newest first
    List {
        /// Only jobs of this owner
        #[arg(long)]
        owner: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Delete a job with its candidates and batch payloads
    Delete {
        job_id: JobId,
    },

    /// Sweep stale and rate-limited jobs once
    Recover {
        /// Override the staleness window
        #[arg(long)]
        staleness_minutes: Option<u64>,
        /// Override the retry ceiling
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Sweep periodically until interrupted
    Sweep {
        /// Override the sweep interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl Commands {
    /// Commands that stop at a checkpoint on SIGINT/SIGTERM; the rest keep
    /// the default signal behavior
    fn watches_shutdown(&self) -> bool {
        match self {
            Commands::Create(create) => create.run,
            Commands::Run { .. }
            | Commands::Retry { .. }
            | Commands::Recover { .. }
            | Commands::Sweep { .. } => true,
            Commands::Init { .. }
            | Commands::Status { .. }
            | Commands::List { .. }
            | Commands::Delete { .. } => false,
        }
    }
}

#[derive(Args)]
struct CreateArgs {
    /// Job title
    #[arg(long)]
    title: String,

    /// Free-text job description
    #[arg(long, conflicts_with = "description_file")]
    description: Option<String>,

    /// Read the job description from a file
    #[arg(long)]
    description_file: Option<PathBuf>,

    /// Owner of the job; duplicates are flagged across one owner's jobs
    #[arg(long, env = "SCOUT_OWNER", default_value = "local")]
    owner: String,

    /// Number of candidates to source
    #[arg(long, default_value_t = 20)]
    max_candidates: u32,

    /// Target job titles (comma separated)
    #[arg(long, value_delimiter = ',')]
    titles: Vec<String>,

    /// Required skills (comma separated)
    #[arg(long, value_delimiter = ',')]
    skills: Vec<String>,

    /// Nice-to-have skills (comma separated)
    #[arg(long, value_delimiter = ',')]
    nice_to_have: Vec<String>,

    /// Locations (comma separated)
    #[arg(long, value_delimiter = ',')]
    locations: Vec<String>,

    /// Industries (comma separated)
    #[arg(long, value_delimiter = ',')]
    industries: Vec<String>,

    #[arg(long)]
    seniority: Option<String>,

    #[arg(long)]
    min_years: Option<u32>,

    /// Run the job in the foreground right away
    #[arg(long)]
    run: bool,
}

impl CreateArgs {
    async fn into_request(self) -> anyhow::Result<(JobRequest, bool)> {
        let raw_description = match (self.description, self.description_file) {
            (Some(text), _) => text,
            (None, Some(path)) => tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
            (None, None) => anyhow::bail!("either --description or --description-file is required"),
        };

        let request = JobRequest {
            owner_id: self.owner,
            title: self.title,
            raw_description,
            requirements: JobRequirements {
                job_titles: self.titles,
                skills: self.skills,
                nice_to_have: self.nice_to_have,
                locations: self.locations,
                industries: self.industries,
                seniority: self.seniority,
                min_years_experience: self.min_years,
            },
            max_candidates: self.max_candidates,
        };
        Ok((request, self.run))
    }
}

async fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ScoutConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_file(path).await?,
        None => ConfigLoader::new().load().await?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if let Commands::Init { force } = args.command {
        scout::logging::init_logging(&ScoutConfig::default().logging)?;
        cli::init::handle_init(args.config, force).await?;
        return Ok(());
    }

    let config = load_config(args.config.as_ref()).await?;
    scout::logging::init_logging(&config.logging)?;

    let shutdown = ShutdownCoordinator::new();
    let _signal_handler = args
        .command
        .watches_shutdown()
        .then(|| shutdown.install_signal_handlers());

    let app = ScoutApp::open(config).await?;

    let result = match args.command {
        Commands::Init { .. } => Ok(()),
        Commands::Create(create) => {
            let (request, run) = create.into_request().await?;
            cli::job::handle_create(&app, &shutdown, request, run).await
        }
        Commands::Run { job_id } => cli::job::handle_run(&app, &shutdown, job_id).await,
        Commands::Retry { job_id } => cli::job::handle_retry(&app, &shutdown, job_id).await,
        Commands::Status {
            job_id,
            top,
            format,
        } => cli::job::handle_status(&app, job_id, top, format).await,
        Commands::List { owner, format } => {
            cli::job::handle_list(&app, owner.as_deref(), format).await
        }
        Commands::Delete { job_id } => cli::job::handle_delete(&app, job_id).await,
        Commands::Recover {
            staleness_minutes,
            max_retries,
            format,
        } => {
            cli::recovery::handle_recover(&app, &shutdown, staleness_minutes, max_retries, format)
                .await
        }
        Commands::Sweep { interval_secs } => {
            cli::recovery::handle_sweep(&app, &shutdown, interval_secs).await
        }
    };

    app.close().await;
    result?;
    Ok(())
}
