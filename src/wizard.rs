//! Three-stage wizard state machine.
//!
//! Transitions are plain methods: the controller asks [`Wizard::next_step`] which
//! computation the current state calls for, runs it, and feeds the outcome back
//! through [`Wizard::apply`]. Nothing here performs I/O.

use crate::error::{FailureKind, GatewayError};
use crate::gateway::{ClusteringReport, Computation, PricingReport, ProjectSetup};
use crate::model::{
    Metrics, ProjectInputs, ProjectState, Stage, StageFailure, StageVector, WizardSnapshot,
};
use tracing::{debug, info, warn};

/// A computation in the main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SetupProject,
    CalculateMetrics,
    RunClustering,
    RunElasticPricing,
}

impl Step {
    /// Stage whose loading flag covers this step and which a failure is charged to.
    pub fn stage(self) -> Stage {
        match self {
            Step::SetupProject | Step::CalculateMetrics => Stage::Input,
            Step::RunClustering => Stage::Clustering,
            Step::RunElasticPricing => Stage::Results,
        }
    }

    pub fn computation(self) -> Computation {
        match self {
            Step::SetupProject => Computation::SetupProject,
            Step::CalculateMetrics => Computation::CalculateMetrics,
            Step::RunClustering => Computation::RunClustering,
            Step::RunElasticPricing => Computation::RunElasticPricing,
        }
    }
}

/// Resolved outcome of a [`Step`], handed back to the wizard.
#[derive(Debug, Clone)]
pub enum StepResult {
    Setup(Result<ProjectSetup, GatewayError>),
    Metrics(Result<Metrics, GatewayError>),
    Clustering(Result<ClusteringReport, GatewayError>),
    Pricing(Result<PricingReport, GatewayError>),
}

impl StepResult {
    pub fn step(&self) -> Step {
        match self {
            StepResult::Setup(_) => Step::SetupProject,
            StepResult::Metrics(_) => Step::CalculateMetrics,
            StepResult::Clustering(_) => Step::RunClustering,
            StepResult::Pricing(_) => Step::RunElasticPricing,
        }
    }
}

/// What pressing "advance" on the current stage did.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Stage 0 before completion: start the chain with this step.
    Trigger(Step),
    Navigate(Stage),
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct Wizard {
    seed: ProjectInputs,
    project: ProjectState,
    stages: StageVector,
    current: Stage,
    in_flight: Option<Step>,
    failure: Option<StageFailure>,
}

impl Wizard {
    /// A fresh session. `seed` is what a restart returns to.
    pub fn new(seed: ProjectInputs) -> Self {
        Self {
            project: ProjectState::with_inputs(seed.clone()),
            seed,
            stages: StageVector::default(),
            current: Stage::Input,
            in_flight: None,
            failure: None,
        }
    }

    pub fn project(&self) -> &ProjectState {
        &self.project
    }

    pub fn stages(&self) -> StageVector {
        self.stages
    }

    #[cfg(test)]
    pub fn current(&self) -> Stage {
        self.current
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> Option<Step> {
        self.in_flight
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Restart is offered after any failure and once the whole chain is done.
    pub fn restart_offered(&self) -> bool {
        self.failure.is_some() || self.stages.all_completed()
    }

    fn busy(&self) -> bool {
        self.in_flight.is_some() || self.stages.any_loading()
    }

    /// Replace the input-stage values. Only allowed before setup has run.
    pub fn set_inputs(&mut self, inputs: ProjectInputs) -> Result<(), String> {
        if self.busy() || !self.project.project_path.is_empty() || self.failure.is_some() {
            return Err("inputs are locked once the project is set up".into());
        }
        self.project.inputs = inputs;
        Ok(())
    }

    /// Index-widget navigation: honored only for completed stages.
    pub fn go_to(&mut self, stage: Stage) -> bool {
        if !self.stages.is_completed(stage) {
            debug!(?stage, "navigation ignored, stage not completed");
            return false;
        }
        self.current = stage;
        true
    }

    pub fn advance_enabled(&self) -> bool {
        if self.busy() || self.failure.is_some() {
            return false;
        }
        match self.current {
            Stage::Input if !self.stages.is_completed(Stage::Input) => {
                self.project.project_path.is_empty() && self.project.inputs.missing().is_empty()
            }
            Stage::Results => false,
            stage => self.stages.is_completed(stage),
        }
    }

    /// The advance control. On stage 0 before completion this starts setup;
    /// elsewhere it moves to the next stage once the current one is complete.
    pub fn advance(&mut self) -> Advance {
        if self.failure.is_some() {
            return Advance::Rejected("a stage failed; restart to continue".into());
        }
        if self.busy() {
            return Advance::Rejected("a computation is already running".into());
        }
        let current = self.current;
        if current == Stage::Input && !self.stages.is_completed(Stage::Input) {
            let missing = self.project.inputs.missing();
            if !missing.is_empty() {
                return Advance::Rejected(format!("missing: {}", missing.join(", ")));
            }
            self.start(Step::SetupProject);
            return Advance::Trigger(Step::SetupProject);
        }
        match Stage::from_index(current.index() + 1) {
            Some(next) if self.stages.is_completed(current) => {
                self.current = next;
                Advance::Navigate(next)
            }
            Some(_) => Advance::Rejected(format!("{} is not complete yet", current.label())),
            None => Advance::Rejected("already on the last stage".into()),
        }
    }

    fn start(&mut self, step: Step) {
        self.in_flight = Some(step);
        self.stages.set_loading(step.stage());
        info!(?step, stage = ?step.stage(), "starting step");
    }

    /// Automatic advancement. Returns the step the current data calls for, if
    /// any, and marks it in flight. Each rule fires once per session.
    pub fn next_step(&mut self) -> Option<Step> {
        if self.in_flight.is_some() || self.failure.is_some() {
            return None;
        }
        let p = &self.project;
        let step = if !self.stages.is_completed(Stage::Input)
            && p.metrics.is_none()
            && !p.prices_file_path.is_empty()
            && !p.elasticities_file_path.is_empty()
        {
            Step::CalculateMetrics
        } else if p.metrics.is_some()
            && !self.stages.is_completed(Stage::Clustering)
            && !self.stages.is_loading(Stage::Results)
        {
            Step::RunClustering
        } else if self.stages.is_loading(Stage::Results) && !self.stages.is_completed(Stage::Results)
        {
            Step::RunElasticPricing
        } else {
            return None;
        };
        self.start(step);
        Some(step)
    }

    /// Fold a finished step into the session. Results for a step that is not
    /// in flight are dropped and `false` is returned.
    pub fn apply(&mut self, result: StepResult) -> bool {
        let step = result.step();
        if self.in_flight != Some(step) {
            warn!(?step, in_flight = ?self.in_flight, "ignoring result for a step that is not running");
            return false;
        }
        self.in_flight = None;
        match result {
            StepResult::Setup(Ok(setup)) if !setup.is_complete() => self.report_failure(
                Stage::Input,
                GatewayError::new(
                    Computation::SetupProject,
                    FailureKind::Remote,
                    "project setup returned an empty path",
                ),
            ),
            StepResult::Setup(Ok(setup)) => {
                self.project.project_path = setup.path;
                self.project.prices_file_path = setup.files.prices_file;
                self.project.elasticities_file_path = setup.files.elasticities_file;
            }
            StepResult::Metrics(Ok(metrics)) => {
                self.project.metrics = Some(metrics);
                self.stages.mark_completed(Stage::Input);
                self.stages.clear_loading();
            }
            StepResult::Clustering(Ok(_)) => {
                self.stages.mark_completed(Stage::Clustering);
                self.stages.set_loading(Stage::Results);
            }
            StepResult::Pricing(Ok(_)) => {
                for stage in Stage::ALL {
                    self.stages.mark_completed(stage);
                }
                self.stages.clear_loading();
            }
            StepResult::Setup(Err(e))
            | StepResult::Metrics(Err(e))
            | StepResult::Clustering(Err(e))
            | StepResult::Pricing(Err(e)) => self.report_failure(step.stage(), e),
        }
        true
    }

    /// Any failure halts the chain until a restart.
    pub fn report_failure(&mut self, stage: Stage, error: GatewayError) {
        warn!(?stage, %error, "stage failed");
        self.in_flight = None;
        self.stages.clear_loading();
        self.failure = Some(StageFailure { stage, error });
    }

    pub fn record_cluster_count(&mut self, count: u32) {
        self.project.cluster_count = Some(count);
    }

    /// Discard the session and return to stage 0 with the seed inputs.
    pub fn restart(&mut self) {
        info!("restarting session");
        *self = Wizard::new(self.seed.clone());
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            current: self.current,
            stages: self.stages,
            project: self.project.clone(),
            running: self.in_flight.map(Step::computation),
            failure: self.failure.clone(),
            advance_enabled: self.advance_enabled(),
        }
    }
}
