//! Pipeline orchestration.
//!
//! Runs each declared resource through extract, normalize and load, in load
//! order, with one run-log entry per resource. A failing resource does not
//! stop the others unless it failed to authenticate, in which case the rest
//! of the invocation is skipped.

mod state;

pub use state::{IllegalTransition, PipelineState};

use crate::config::ResourcePlan;
use crate::normalize::{normalize, NormalizeError};
use crate::resource::Resource;
use crate::run_log::{RunGuard, RunLogError, SqliteRunLog};
use crate::spotify::{ExtractError, Extractor};
use crate::warehouse::{table_for, LoadError, LoadStrategy, SqliteWarehouse};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("run log failed: {0}")]
    RunLog(#[from] RunLogError),

    #[error(transparent)]
    State(#[from] IllegalTransition),
}

impl PipelineError {
    pub fn aborts_invocation(&self) -> bool {
        matches!(self, PipelineError::Extract(e) if e.is_fatal_for_invocation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    /// Not attempted because an earlier resource aborted the invocation.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    pub resource: Resource,
    pub strategy: LoadStrategy,
    pub status: OutcomeStatus,
    pub state: PipelineState,
    pub run_id: Option<i64>,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub error: Option<String>,
}

impl ResourceOutcome {
    fn skipped(plan: &ResourcePlan, reason: &str) -> Self {
        Self {
            resource: plan.resource,
            strategy: plan.strategy,
            status: OutcomeStatus::Skipped,
            state: PipelineState::NotStarted,
            run_id: None,
            rows_extracted: 0,
            rows_loaded: 0,
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pipeline_name: String,
    pub outcomes: Vec<ResourceOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == OutcomeStatus::Succeeded)
    }

    pub fn outcome(&self, resource: Resource) -> Option<&ResourceOutcome> {
        self.outcomes.iter().find(|o| o.resource == resource)
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

pub struct Pipeline<'a> {
    name: String,
    extractor: &'a dyn Extractor,
    warehouse: &'a SqliteWarehouse,
    run_log: &'a SqliteRunLog,
    plans: Vec<ResourcePlan>,
}

impl<'a> Pipeline<'a> {
    /// `plans` may come in any order; they always run in load order.
    pub fn new(
        name: impl Into<String>,
        extractor: &'a dyn Extractor,
        warehouse: &'a SqliteWarehouse,
        run_log: &'a SqliteRunLog,
        plans: &[ResourcePlan],
    ) -> Self {
        let mut plans = plans.to_vec();
        plans.sort_by_key(|p| p.resource);
        Self {
            name: name.into(),
            extractor,
            warehouse,
            run_log,
            plans,
        }
    }

    pub fn plans(&self) -> &[ResourcePlan] {
        &self.plans
    }

    pub fn run(&self) -> RunSummary {
        info!(
            pipeline = %self.name,
            resources = self.plans.len(),
            "Starting pipeline"
        );

        let mut outcomes = Vec::with_capacity(self.plans.len());
        let mut abort_reason: Option<String> = None;

        for plan in &self.plans {
            if let Some(reason) = &abort_reason {
                warn!(resource = %plan.resource, "Skipping resource: {}", reason);
                outcomes.push(ResourceOutcome::skipped(plan, reason));
                continue;
            }

            let (outcome, aborts) = self.run_resource(plan);
            if aborts {
                abort_reason = Some(format!(
                    "invocation aborted after {} failed to authenticate",
                    plan.resource
                ));
            }
            outcomes.push(outcome);
        }

        let summary = RunSummary {
            pipeline_name: self.name.clone(),
            outcomes,
        };
        info!(
            pipeline = %self.name,
            succeeded = summary.count(OutcomeStatus::Succeeded),
            failed = summary.count(OutcomeStatus::Failed),
            skipped = summary.count(OutcomeStatus::Skipped),
            "Pipeline finished"
        );
        summary
    }

    /// Returns the outcome and whether the rest of the invocation must be skipped.
    fn run_resource(&self, plan: &ResourcePlan) -> (ResourceOutcome, bool) {
        let mut outcome = ResourceOutcome {
            resource: plan.resource,
            strategy: plan.strategy,
            status: OutcomeStatus::Failed,
            state: PipelineState::NotStarted,
            run_id: None,
            rows_extracted: 0,
            rows_loaded: 0,
            error: None,
        };

        let config = serde_json::json!({
            "pipeline_name": self.name,
            "resource": plan.resource,
            "strategy": plan.strategy,
        });
        let mut guard = match self.run_log.guard(&self.name, plan.resource, &config) {
            Ok(guard) => guard,
            Err(e) => {
                error!(resource = %plan.resource, error = %e, "Could not start run");
                outcome.state = PipelineState::Failed;
                outcome.error = Some(PipelineError::from(e).to_string());
                return (outcome, false);
            }
        };
        outcome.run_id = guard.run_id();

        let mut state = PipelineState::NotStarted;
        let result = self.execute(plan, &mut state, &mut guard);
        outcome.rows_extracted = guard.rows_extracted();
        outcome.rows_loaded = guard.rows_loaded();

        match result {
            Ok(()) => {
                outcome.state = state;
                match guard.succeed() {
                    Ok(()) => {
                        outcome.status = OutcomeStatus::Succeeded;
                        info!(
                            resource = %plan.resource,
                            run_id = ?outcome.run_id,
                            rows_extracted = outcome.rows_extracted,
                            rows_loaded = outcome.rows_loaded,
                            "Resource done"
                        );
                    }
                    Err(e) => {
                        error!(
                            resource = %plan.resource,
                            run_id = ?outcome.run_id,
                            error = %e,
                            "Resource loaded but its run could not be recorded"
                        );
                        outcome.error = Some(PipelineError::from(e).to_string());
                    }
                }
                (outcome, false)
            }
            Err(e) => {
                let failed_in = state;
                outcome.state = state.transition(PipelineState::Failed).unwrap_or(state);
                let aborts = e.aborts_invocation();
                let message = e.to_string();
                error!(
                    resource = %plan.resource,
                    run_id = ?outcome.run_id,
                    state = %failed_in,
                    rows_extracted = outcome.rows_extracted,
                    error = %message,
                    "Resource failed"
                );
                if let Err(log_err) = guard.fail(&message) {
                    error!(
                        resource = %plan.resource,
                        error = %log_err,
                        "Failed to record run failure"
                    );
                }
                outcome.error = Some(message);
                (outcome, aborts)
            }
        }
    }

    fn execute(
        &self,
        plan: &ResourcePlan,
        state: &mut PipelineState,
        guard: &mut RunGuard<'_>,
    ) -> Result<(), PipelineError> {
        *state = state.transition(PipelineState::Extracting)?;
        let records = self.extractor.extract(plan.resource)?;
        guard.set_rows_extracted(records.len() as u64);
        info!(
            resource = %plan.resource,
            records = records.len(),
            "Extracted records"
        );

        *state = state.transition(PipelineState::Normalizing)?;
        let rows = normalize(plan.resource, &records)?;

        *state = state.transition(PipelineState::Loading)?;
        let loaded = self
            .warehouse
            .load(table_for(plan.resource), &rows, plan.strategy)?;
        guard.set_rows_loaded(loaded as u64);

        *state = state.transition(PipelineState::Done)?;
        Ok(())
    }
}
