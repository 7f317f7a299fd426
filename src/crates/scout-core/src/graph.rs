//! The sourcing workflow graph
//!
//! ```text
//! format_description → generate_queries → search_profiles → enrich_candidates
//!                                              ↑                    │
//!                                              └──── loop ──────────┤
//!                                                                   ├→ scrape → parse → persist → score → END
//!                                                                   └→ handle_no_candidates → END
//! ```
//!
//! The only conditional edge leaves `enrich_candidates`; see
//! [`route_after_enrich`]. Every stage is bracketed by two commits: an entry
//! marker (coarse status and progress label) and the stage's own update
//! tagged with `last_completed_stage`.

use crate::error::{EngineError, Result, StageError};
use crate::planner::select_next;
use crate::settings::WorkflowSettings;
use crate::stages::{
    EnrichCandidates, FormatDescription, GenerateQueries, HandleNoCandidates, ParseCandidates,
    PersistCandidates, ScoreCandidates, ScrapeCandidates, SearchProfiles, Stage, StageContext,
};
use crate::state::{SourcingState, StateUpdate};
use chrono::{DateTime, Utc};
use scout_checkpoint::{CheckpointUpdate, JobOutcome, JobStatus, StageLabel, StageName};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where an edge leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Stage(StageName),
    End,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{}", stage),
            Self::End => f.write_str("END"),
        }
    }
}

/// Routing function of a conditional edge
pub type Router = Arc<dyn Fn(&SourcingState, &WorkflowSettings) -> Target + Send + Sync>;

/// Outgoing edge of a stage
#[derive(Clone)]
pub enum Edge {
    /// Always continue to the target
    Direct(Target),
    /// Ask the router; `branches` lists every target it may return
    Conditional { router: Router, branches: Vec<Target> },
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(target) => f.debug_tuple("Direct").field(target).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

/// How one invocation of the graph halted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    RateLimited {
        provider: String,
        reset_at: DateTime<Utc>,
    },
    Failed {
        message: String,
    },
}

/// Branch decision after enrichment.
///
/// - target reached → scrape
/// - iteration ceiling reached or query plan exhausted → scrape when any
///   contact was found, otherwise the no-candidates report
/// - otherwise → another search iteration
///
/// A rate limit never reaches the router; the graph halts before it.
pub fn route_after_enrich(state: &SourcingState, settings: &WorkflowSettings) -> Target {
    let record = &state.record;
    let found = record.counters.candidates_with_contact;
    if found >= record.max_candidates {
        return Target::Stage(StageName::ScrapeCandidates);
    }

    let exhausted = select_next(&state.queries, &record.used_query_ids, None).is_none();
    if record.search_iteration >= settings.max_iterations || exhausted {
        return if found > 0 {
            Target::Stage(StageName::ScrapeCandidates)
        } else {
            Target::Stage(StageName::HandleNoCandidates)
        };
    }

    Target::Stage(StageName::SearchProfiles)
}

/// Nominal successor of a stage along the linear path.
///
/// `enrich_candidates` maps to scrape here; callers that need the loop
/// decision use [`route_after_enrich`].
pub fn next_after(stage: StageName) -> Target {
    match stage {
        StageName::FormatDescription => Target::Stage(StageName::GenerateQueries),
        StageName::GenerateQueries => Target::Stage(StageName::SearchProfiles),
        StageName::SearchProfiles => Target::Stage(StageName::EnrichCandidates),
        StageName::EnrichCandidates => Target::Stage(StageName::ScrapeCandidates),
        StageName::ScrapeCandidates => Target::Stage(StageName::ParseCandidates),
        StageName::ParseCandidates => Target::Stage(StageName::PersistCandidates),
        StageName::PersistCandidates => Target::Stage(StageName::ScoreCandidates),
        StageName::ScoreCandidates | StageName::HandleNoCandidates => Target::End,
    }
}

/// Coarse status and label committed when a stage is entered
fn entry_marker(
    stage: StageName,
    state: &SourcingState,
    settings: &WorkflowSettings,
) -> (Option<JobStatus>, Option<StageLabel>) {
    let record = &state.record;
    match stage {
        StageName::FormatDescription => (
            Some(JobStatus::FormattingJd),
            Some(StageLabel::FormattingDescription),
        ),
        StageName::GenerateQueries => (None, Some(StageLabel::GeneratingQueries)),
        StageName::SearchProfiles => (
            Some(JobStatus::SearchingProfiles),
            Some(StageLabel::Searching {
                iteration: record.search_iteration + 1,
                max_iterations: settings.max_iterations,
            }),
        ),
        StageName::EnrichCandidates => (
            Some(JobStatus::SearchingProfiles),
            Some(StageLabel::Enriching {
                processed: 0,
                total: record.pending_enrichment().len(),
            }),
        ),
        StageName::ScrapeCandidates => (Some(JobStatus::ScrapingProfiles), None),
        StageName::ParseCandidates => (Some(JobStatus::ParsingProfiles), None),
        StageName::PersistCandidates => (Some(JobStatus::SavingProfiles), None),
        StageName::ScoreCandidates => (Some(JobStatus::ScoringProfiles), None),
        StageName::HandleNoCandidates => (None, Some(StageLabel::NoCandidatesFound)),
    }
}

/// Stage nodes, edges and the context they run against
pub struct SourcingGraph {
    nodes: HashMap<StageName, Arc<dyn Stage>>,
    edges: HashMap<StageName, Edge>,
    ctx: StageContext,
}

impl SourcingGraph {
    /// Build the standard sourcing graph
    pub fn new(ctx: StageContext) -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            ctx,
        };

        graph.add_node(Arc::new(FormatDescription));
        graph.add_node(Arc::new(GenerateQueries));
        graph.add_node(Arc::new(SearchProfiles));
        graph.add_node(Arc::new(EnrichCandidates));
        graph.add_node(Arc::new(ScrapeCandidates));
        graph.add_node(Arc::new(ParseCandidates));
        graph.add_node(Arc::new(PersistCandidates));
        graph.add_node(Arc::new(ScoreCandidates));
        graph.add_node(Arc::new(HandleNoCandidates));

        for stage in StageName::ALL {
            if stage != StageName::EnrichCandidates {
                graph.add_edge(stage, next_after(stage));
            }
        }
        graph.add_conditional_edge(
            StageName::EnrichCandidates,
            Arc::new(route_after_enrich),
            vec![
                Target::Stage(StageName::SearchProfiles),
                Target::Stage(StageName::ScrapeCandidates),
                Target::Stage(StageName::HandleNoCandidates),
            ],
        );
        graph
    }

    pub fn add_node(&mut self, stage: Arc<dyn Stage>) {
        self.nodes.insert(stage.name(), stage);
    }

    pub fn add_edge(&mut self, from: StageName, to: Target) {
        self.edges.insert(from, Edge::Direct(to));
    }

    pub fn add_conditional_edge(&mut self, from: StageName, router: Router, branches: Vec<Target>) {
        self.edges.insert(from, Edge::Conditional { router, branches });
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Check every stage has a node and an outgoing edge, and every edge
    /// target exists
    pub fn validate(&self) -> std::result::Result<(), String> {
        let exists = |target: &Target| match target {
            Target::Stage(stage) => self.nodes.contains_key(stage),
            Target::End => true,
        };

        for stage in StageName::ALL {
            if !self.nodes.contains_key(&stage) {
                return Err(format!("Stage {} has no node", stage));
            }
            match self.edges.get(&stage) {
                None => return Err(format!("Stage {} has no outgoing edge", stage)),
                Some(Edge::Direct(to)) => {
                    if !exists(to) {
                        return Err(format!("Edge target {} does not exist", to));
                    }
                }
                Some(Edge::Conditional { branches, .. }) => {
                    if let Some(missing) = branches.iter().find(|to| !exists(to)) {
                        return Err(format!("Branch target {} does not exist", missing));
                    }
                }
            }
        }
        Ok(())
    }

    fn route(&self, from: StageName, state: &SourcingState) -> Result<Target> {
        match self.edges.get(&from) {
            Some(Edge::Direct(to)) => Ok(*to),
            Some(Edge::Conditional { router, branches }) => {
                let to = router(state, &self.ctx.settings);
                if !branches.contains(&to) {
                    return Err(EngineError::Graph(format!(
                        "router of {} returned undeclared target {}",
                        from, to
                    )));
                }
                Ok(to)
            }
            None => Err(EngineError::Graph(format!("stage {} has no outgoing edge", from))),
        }
    }

    /// Run the graph from `entry` until END, a rate limit, or a fatal error.
    ///
    /// Halt outcomes are written with `mark_terminal`. A checkpoint store
    /// failure is returned as an error and leaves the job as last committed,
    /// where the recovery sweep will find it once it goes stale.
    pub async fn invoke(&self, state: SourcingState, entry: Target) -> Result<RunOutcome> {
        let job_id = state.job_id();
        let checkpoints = &self.ctx.checkpoints;
        let settings = &self.ctx.settings;
        let budget = 2 * settings.max_iterations as usize + StageName::ALL.len() + 2;

        let mut state = state;
        let mut current = entry;
        let mut steps = 0usize;

        loop {
            let stage_name = match current {
                Target::End => {
                    checkpoints.mark_terminal(job_id, JobOutcome::Completed).await?;
                    info!(job_id = %job_id, "Job completed");
                    return Ok(RunOutcome::Completed);
                }
                Target::Stage(stage) => stage,
            };

            steps += 1;
            if steps > budget {
                return Err(EngineError::Graph(format!(
                    "job {} exceeded {} stage executions",
                    job_id, budget
                )));
            }

            let node = self
                .nodes
                .get(&stage_name)
                .ok_or_else(|| EngineError::Graph(format!("stage {} has no node", stage_name)))?;

            let (status, label) = entry_marker(stage_name, &state, settings);
            let mut entry_update = CheckpointUpdate::new();
            entry_update.status = status;
            entry_update.current_stage = label;
            let fresh = checkpoints.commit(job_id, entry_update).await?;
            state = state.refreshed(fresh);

            debug!(job_id = %job_id, stage = %stage_name, version = state.version, "Entering stage");
            match node.run(&state, &self.ctx).await {
                Ok(update) => {
                    let update = StateUpdate {
                        checkpoint: update.checkpoint.with_completed(stage_name),
                        queries: update.queries,
                    };
                    checkpoints.commit(job_id, update.checkpoint.clone()).await?;
                    state = state.apply(update);
                }
                Err(StageError::RateLimited(signal)) => {
                    warn!(
                        job_id = %job_id,
                        stage = %stage_name,
                        provider = %signal.provider,
                        reset_at = %signal.reset_at,
                        "Rate limited, pausing job"
                    );
                    let provider = signal.provider.clone();
                    let reset_at = signal.reset_at;
                    checkpoints
                        .mark_terminal(job_id, JobOutcome::RateLimited(signal.into_info(Utc::now())))
                        .await?;
                    return Ok(RunOutcome::RateLimited { provider, reset_at });
                }
                Err(StageError::Fatal(message)) => {
                    let message = format!("{} failed: {}", stage_name, message);
                    error!(job_id = %job_id, stage = %stage_name, error = %message, "Stage failed");
                    checkpoints
                        .mark_terminal(
                            job_id,
                            JobOutcome::Failed {
                                message: message.clone(),
                            },
                        )
                        .await?;
                    return Ok(RunOutcome::Failed { message });
                }
                Err(StageError::Checkpoint(err)) => return Err(err.into()),
            }

            current = self.route(stage_name, &state)?;
            debug!(job_id = %job_id, from = %stage_name, to = %current, "Routing");
        }
    }
}

impl fmt::Debug for SourcingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcingGraph")
            .field("stages", &self.nodes.len())
            .field("edges", &self.edges)
            .finish()
    }
}
