//! Session controller.
//!
//! Owns the wizard, serialises every gateway call through a single job slot and
//! emits events for presentation layers.

use super::post_process::collect_session_report;
use crate::error::{FailureKind, GatewayError};
use crate::gateway::{Computation, ComputationGateway};
use crate::model::{
    ClusterRecord, InfoEvent, ProjectInputs, ProjectState, SessionReport, Stage, WizardEvent,
};
use crate::wizard::{Advance, Step, StepResult, Wizard};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands emitted by UI layers to drive the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    SetInputs(ProjectInputs),
    Advance,
    GoTo(Stage),
    SelectCluster(u32),
    Restart,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ControllerOptions {
    /// Press "advance" on stage 0 as soon as the controller starts.
    pub auto_start: bool,
    /// Load cluster 1 once the cluster count is known.
    pub browse_clusters: bool,
    pub num_reads: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Step(Step),
    DiscoverClusters,
    LoadCluster(u32),
    LoadResults,
}

impl Job {
    fn computation(self) -> Computation {
        match self {
            Job::Step(step) => step.computation(),
            Job::DiscoverClusters => Computation::GetClusterFiles,
            Job::LoadCluster(_) => Computation::GetClusterData,
            Job::LoadResults => Computation::GetResultsData,
        }
    }
}

enum JobOutput {
    Step(StepResult),
    Clusters(Result<u32, GatewayError>),
    Cluster(Result<ClusterRecord, GatewayError>),
    Results(Result<SessionReport, GatewayError>),
}

/// The single job currently executing.
struct Running {
    generation: u64,
    job: Job,
    started: Instant,
    handle: JoinHandle<JobOutput>,
}

fn missing(computation: Computation, what: &str) -> GatewayError {
    GatewayError::new(computation, FailureKind::Launch, format!("{what} is not set"))
}

async fn execute(
    gateway: &ComputationGateway,
    num_reads: u32,
    project: &ProjectState,
    job: Job,
) -> JobOutput {
    let inputs = &project.inputs;
    match job {
        Job::Step(Step::SetupProject) => JobOutput::Step(StepResult::Setup(
            gateway
                .setup_project(
                    &inputs.project_name,
                    &inputs.prices_source,
                    &inputs.elasticities_source,
                )
                .await,
        )),
        Job::Step(Step::CalculateMetrics) => JobOutput::Step(StepResult::Metrics(
            gateway
                .calculate_metrics(&project.prices_file_path, &project.elasticities_file_path)
                .await,
        )),
        Job::Step(Step::RunClustering) => {
            let c = Computation::RunClustering;
            let result = match (inputs.clustering_method, inputs.solver_type) {
                (Some(method), Some(solver)) => {
                    gateway
                        .run_clustering(
                            method,
                            &project.project_path,
                            &project.prices_file_path,
                            &project.elasticities_file_path,
                            solver,
                        )
                        .await
                }
                (None, _) => Err(missing(c, "clustering method")),
                (_, None) => Err(missing(c, "solver")),
            };
            JobOutput::Step(StepResult::Clustering(result))
        }
        Job::Step(Step::RunElasticPricing) => {
            let result = match inputs.solver_type {
                Some(solver) => {
                    gateway
                        .run_elastic_pricing(
                            &project.clusters_dir(),
                            &project.results_file(),
                            solver,
                            num_reads,
                            &inputs.api_key,
                        )
                        .await
                }
                None => Err(missing(Computation::RunElasticPricing, "solver")),
            };
            JobOutput::Step(StepResult::Pricing(result))
        }
        Job::DiscoverClusters => {
            JobOutput::Clusters(gateway.get_cluster_files(&project.clusters_dir()).await)
        }
        Job::LoadCluster(index) => JobOutput::Cluster(
            gateway
                .get_cluster_data(&project.clusters_dir(), index)
                .await,
        ),
        Job::LoadResults => JobOutput::Results(collect_session_report(gateway, project).await),
    }
}

struct Session {
    gateway: Arc<ComputationGateway>,
    options: ControllerOptions,
    wizard: Wizard,
    queue: VecDeque<Job>,
    generation: u64,
    event_tx: UnboundedSender<WizardEvent>,
}

impl Session {
    fn emit(&self, ev: WizardEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn info(&self, ev: InfoEvent) {
        self.emit(WizardEvent::Info(ev));
    }

    fn publish(&self) {
        self.emit(WizardEvent::StateChanged(Box::new(self.wizard.snapshot())));
    }

    /// Start the next job if the slot is free: queued work first, then
    /// whatever the wizard's rules call for.
    fn pump(&mut self, running: &mut Option<Running>) {
        if running.is_some() {
            return;
        }
        let job = match self.queue.pop_front() {
            Some(job) => job,
            None => match self.wizard.next_step() {
                Some(step) => Job::Step(step),
                None => return,
            },
        };
        let computation = job.computation();
        debug!(?job, generation = self.generation, "spawning job");
        self.info(InfoEvent::ComputationStarted { computation });
        self.publish();

        let gateway = Arc::clone(&self.gateway);
        let project = self.wizard.project().clone();
        let num_reads = self.options.num_reads;
        let handle =
            tokio::spawn(async move { execute(&gateway, num_reads, &project, job).await });
        *running = Some(Running {
            generation: self.generation,
            job,
            started: Instant::now(),
            handle,
        });
    }

    fn fail(&mut self, stage: Stage, error: GatewayError) {
        self.wizard.report_failure(stage, error);
        self.queue.clear();
        if let Some(failure) = self.wizard.failure().cloned() {
            self.emit(WizardEvent::Failed(failure));
        }
    }

    fn finish(&mut self, output: JobOutput) {
        match output {
            JobOutput::Step(result) => {
                let pricing_done = matches!(result, StepResult::Pricing(Ok(_)));
                if !self.wizard.apply(result) {
                    return;
                }
                if let Some(failure) = self.wizard.failure().cloned() {
                    self.queue.clear();
                    self.emit(WizardEvent::Failed(failure));
                } else if pricing_done {
                    self.queue.push_back(Job::DiscoverClusters);
                    self.queue.push_back(Job::LoadResults);
                }
            }
            JobOutput::Clusters(Ok(count)) => {
                self.wizard.record_cluster_count(count);
                self.emit(WizardEvent::ClustersDiscovered { count });
                if self.options.browse_clusters && count > 0 {
                    self.queue.push_front(Job::LoadCluster(1));
                }
            }
            JobOutput::Clusters(Err(e)) => self.fail(Stage::Clustering, e),
            JobOutput::Cluster(Ok(record)) => self.emit(WizardEvent::ClusterLoaded(Box::new(record))),
            JobOutput::Cluster(Err(e)) => self.fail(Stage::Clustering, e),
            JobOutput::Results(Ok(report)) => self.emit(WizardEvent::ResultsReady(Box::new(report))),
            JobOutput::Results(Err(e)) => self.fail(Stage::Results, e),
        }
    }

    fn handle_command(&mut self, cmd: UiCommand, running: &mut Option<Running>) {
        match cmd {
            UiCommand::SetInputs(inputs) => {
                if let Err(reason) = self.wizard.set_inputs(inputs) {
                    self.info(InfoEvent::Rejected(reason));
                }
            }
            UiCommand::Advance => match self.wizard.advance() {
                Advance::Trigger(step) => self.queue.push_back(Job::Step(step)),
                Advance::Navigate(stage) => debug!(?stage, "advanced"),
                Advance::Rejected(reason) => self.info(InfoEvent::Rejected(reason)),
            },
            UiCommand::GoTo(stage) => {
                if !self.wizard.go_to(stage) {
                    self.info(InfoEvent::Rejected(format!(
                        "{} is not complete yet",
                        stage.label()
                    )));
                }
            }
            UiCommand::SelectCluster(index) => {
                let stages = self.wizard.stages();
                let count = self.wizard.project().cluster_count.unwrap_or(0);
                if self.wizard.failure().is_some()
                    || !stages.is_completed(Stage::Clustering)
                    || stages.any_loading()
                {
                    self.info(InfoEvent::Rejected("clusters are not available yet".into()));
                } else if index == 0 || index > count {
                    self.info(InfoEvent::Rejected(format!(
                        "cluster {index} does not exist (1-{count})"
                    )));
                } else {
                    self.queue.retain(|j| !matches!(j, Job::LoadCluster(_)));
                    self.queue.push_back(Job::LoadCluster(index));
                }
            }
            UiCommand::Restart => {
                if !self.wizard.restart_offered() {
                    self.info(InfoEvent::Rejected(
                        "restart is available after a failure or once results are ready".into(),
                    ));
                    return;
                }
                if let Some(r) = running.take() {
                    debug!(job = ?r.job, "discarding job from previous session");
                    r.handle.abort();
                }
                self.generation += 1;
                self.queue.clear();
                self.wizard.restart();
                self.info(InfoEvent::Restarted);
            }
            UiCommand::Quit => {}
        }
        self.publish();
    }
}

/// Drive one wizard session from UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    gateway: Arc<ComputationGateway>,
    seed: ProjectInputs,
    options: ControllerOptions,
    event_tx: UnboundedSender<WizardEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut session = Session {
        gateway,
        options,
        wizard: Wizard::new(seed),
        queue: VecDeque::new(),
        generation: 0,
        event_tx,
    };
    let mut running: Option<Running> = None;

    session.publish();
    if options.auto_start {
        session.handle_command(UiCommand::Advance, &mut running);
    }

    loop {
        session.pump(&mut running);
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Quit) | None => {
                        if let Some(r) = running.take() {
                            r.handle.abort();
                        }
                        break;
                    }
                    Some(cmd) => session.handle_command(cmd, &mut running),
                }
            }
            // Keep the JoinHandle in place until this branch wins; taking it
            // early would lose the result if the command branch fires first.
            joined = async {
                if let Some(r) = running.as_mut() {
                    return (&mut r.handle).await;
                }
                futures::future::pending().await
            } => {
                let Some(done) = running.take() else { continue };
                let elapsed_ms = done.started.elapsed().as_millis();
                let computation = done.job.computation();
                if done.generation != session.generation {
                    debug!(job = ?done.job, "dropping result from a previous session");
                    continue;
                }
                match joined {
                    Ok(output) => {
                        session.info(InfoEvent::ComputationFinished { computation, elapsed_ms });
                        session.finish(output);
                    }
                    Err(e) => {
                        warn!(error = %e, job = ?done.job, "job task failed");
                        let stage = match done.job {
                            Job::Step(step) => step.stage(),
                            Job::DiscoverClusters | Job::LoadCluster(_) => Stage::Clustering,
                            Job::LoadResults => Stage::Results,
                        };
                        session.fail(
                            stage,
                            GatewayError::new(computation, FailureKind::Launch, format!("job task failed: {e}")),
                        );
                    }
                }
                session.publish();
            }
        }
    }

    info!("controller stopped");
    Ok(())
}
