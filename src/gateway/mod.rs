//! Computation gateway.
//!
//! One operation per catalog entry. Each builds a [`ComputationRequest`], runs it
//! through the configured [`ProcessRunner`] and maps the outcome into a typed
//! response or a uniform [`GatewayError`].

mod catalog;
pub mod discovery;

pub use catalog::{Computation, ComputationRequest};

use crate::config::WizardConfig;
use crate::error::{ComputationError, FailureKind, GatewayError};
use crate::model::{
    string_or_number, ClusterMetrics, ClusterRecord, ClusteringMethod, ElasticityRow, Metrics,
    PriceRow, ResultRow, SolverType,
};
use crate::runner::{Invocation, Payload, ProcessRunner};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of setup-project: where the project lives and its copied inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSetup {
    pub path: String,
    pub files: ProjectFiles,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFiles {
    pub prices_file: String,
    pub elasticities_file: String,
}

impl ProjectSetup {
    /// Every path the rest of the chain depends on is present.
    pub fn is_complete(&self) -> bool {
        ![&self.path, &self.files.prices_file, &self.files.elasticities_file]
            .iter()
            .any(|p| p.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    status: String,
    metrics: Option<Metrics>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringReport {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ClusterData {
    metrics: ClusterMetrics,
    prices: Vec<PriceRow>,
    elasticities: Vec<ElasticityRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingReport {
    pub status: String,
    pub message: String,
    pub output: String,
}

/// Result of calculate-result-metrics: per-row margins adjusted by elasticities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub results: Vec<AdjustedResult>,
    pub total_expected_margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedResult {
    #[serde(deserialize_with = "string_or_number")]
    pub product: String,
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(deserialize_with = "string_or_number", default)]
    pub cluster: String,
    #[serde(default)]
    pub adjusted_margin: Option<f64>,
}

type FlightKey = (Computation, Vec<String>);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a request key in the in-flight set until dropped.
struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<FlightKey>>,
    key: Option<FlightKey>,
}

impl<'a> FlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<FlightKey>>, key: FlightKey) -> Option<Self> {
        if !lock(set).insert(key.clone()) {
            return None;
        }
        Some(Self {
            set,
            key: Some(key),
        })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(self.set).remove(&key);
        }
    }
}

pub struct ComputationGateway {
    runner: Arc<dyn ProcessRunner>,
    interpreter: String,
    scripts_dir: PathBuf,
    timeout: Option<Duration>,
    in_flight: Mutex<HashSet<FlightKey>>,
}

impl ComputationGateway {
    pub fn new(runner: Arc<dyn ProcessRunner>, cfg: &WizardConfig) -> Self {
        Self {
            runner,
            interpreter: cfg.interpreter.clone(),
            scripts_dir: cfg.scripts_dir.clone(),
            timeout: cfg.computation_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Command line for a request: `<interpreter> <scripts_dir>/<script> <args...>`.
    pub fn invocation(&self, request: &ComputationRequest) -> Invocation {
        let computation = request.computation();
        let mut args = Vec::with_capacity(request.arguments().len() + 1);
        if let Some(script) = computation.script() {
            args.push(self.scripts_dir.join(script).to_string_lossy().into_owned());
        }
        args.extend(request.arguments().iter().cloned());
        Invocation {
            program: self.interpreter.clone(),
            args,
            decode: computation.decode_mode(),
            timeout: self.timeout,
        }
    }

    async fn execute(&self, request: ComputationRequest) -> Result<Payload, GatewayError> {
        let computation = request.computation();
        let key = (computation, request.arguments().to_vec());
        let Some(_guard) = FlightGuard::acquire(&self.in_flight, key) else {
            warn!(%computation, "identical computation already running, rejecting");
            return Err(GatewayError::from_computation(
                computation,
                ComputationError::InFlight,
            ));
        };

        let invocation = self.invocation(&request);
        debug!(
            %computation,
            program = %invocation.program,
            args = ?request.redacted_arguments(),
            payload = ?request.payload(),
            "invoking computation"
        );
        let started = Instant::now();
        let outcome = self.runner.run(&invocation).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(%computation, elapsed_ms, "computation succeeded"),
            Err(e) => warn!(%computation, elapsed_ms, kind = ?e.kind(), error = %e, "computation failed"),
        }
        outcome.map_err(|e| GatewayError::from_computation(computation, e))
    }

    pub async fn setup_project(
        &self,
        project_name: &str,
        prices: &str,
        elasticities: &str,
    ) -> Result<ProjectSetup, GatewayError> {
        let c = Computation::SetupProject;
        let payload = self
            .execute(ComputationRequest::setup_project(project_name, prices, elasticities))
            .await
            .map_err(opaque_parse_failure)?;
        let setup: ProjectSetup = decode(c, payload).map_err(opaque_parse_failure)?;
        if !setup.is_complete() {
            return Err(GatewayError::new(
                c,
                FailureKind::Remote,
                "project setup returned an empty path",
            ));
        }
        Ok(setup)
    }

    pub async fn calculate_metrics(
        &self,
        prices: &str,
        elasticities: &str,
    ) -> Result<Metrics, GatewayError> {
        let c = Computation::CalculateMetrics;
        let payload = self
            .execute(ComputationRequest::calculate_metrics(prices, elasticities))
            .await?;
        let response: MetricsResponse = decode(c, payload)?;
        match (response.status.as_str(), response.metrics) {
            ("success", Some(metrics)) => Ok(metrics),
            (_, _) => Err(GatewayError::new(
                c,
                FailureKind::Remote,
                response
                    .message
                    .unwrap_or_else(|| "metrics calculation did not succeed".into()),
            )),
        }
    }

    pub async fn run_clustering(
        &self,
        method: ClusteringMethod,
        output_dir: &str,
        prices: &str,
        elasticities: &str,
        solver: SolverType,
    ) -> Result<ClusteringReport, GatewayError> {
        let c = Computation::RunClustering;
        let payload = self
            .execute(ComputationRequest::run_clustering(
                method,
                output_dir,
                prices,
                elasticities,
                solver,
            ))
            .await
            .map_err(opaque_parse_failure)?;
        let report: ClusteringReport = decode(c, payload).map_err(opaque_parse_failure)?;
        if report.status != "success" {
            let message = if report.message.is_empty() {
                "clustering did not succeed".to_string()
            } else {
                report.message
            };
            return Err(GatewayError::new(c, FailureKind::Remote, message));
        }
        Ok(report)
    }

    /// Count clusters from the directory listing. Nothing is spawned.
    pub async fn get_cluster_files(&self, clusters_dir: &str) -> Result<u32, GatewayError> {
        let request = ComputationRequest::get_cluster_files(clusters_dir);
        debug!(payload = ?request.payload(), "listing clusters directory");
        discovery::count_clusters(Path::new(clusters_dir)).await.map_err(|e| {
            warn!(clusters_dir, error = %e, "cluster discovery failed");
            GatewayError::new(
                request.computation(),
                FailureKind::Remote,
                format!("cannot read {clusters_dir}: {e}"),
            )
        })
    }

    pub async fn get_cluster_data(
        &self,
        clusters_dir: &str,
        index: u32,
    ) -> Result<ClusterRecord, GatewayError> {
        let c = Computation::GetClusterData;
        if index == 0 {
            return Err(GatewayError::new(
                c,
                FailureKind::Remote,
                "cluster indices start at 1",
            ));
        }
        let payload = self
            .execute(ComputationRequest::get_cluster_data(clusters_dir, index))
            .await?;
        let data: ClusterData = decode(c, payload)?;
        Ok(ClusterRecord {
            index,
            metrics: data.metrics,
            prices: data.prices,
            elasticities: data.elasticities,
        })
    }

    pub async fn run_elastic_pricing(
        &self,
        clusters_dir: &str,
        output_file: &str,
        solver: SolverType,
        num_reads: u32,
        token: &str,
    ) -> Result<PricingReport, GatewayError> {
        let c = Computation::RunElasticPricing;
        let request = ComputationRequest::run_elastic_pricing(
            clusters_dir,
            output_file,
            solver,
            num_reads,
            token,
        );
        match self.execute(request).await {
            Ok(Payload::Text(output)) | Ok(Payload::Json(serde_json::Value::String(output))) => {
                Ok(PricingReport {
                    status: "success".into(),
                    message: "price assignment completed".into(),
                    output,
                })
            }
            Ok(Payload::Json(other)) => Ok(PricingReport {
                status: "success".into(),
                message: "price assignment completed".into(),
                output: other.to_string(),
            }),
            Err(e) if e.kind == FailureKind::Remote => Err(GatewayError::new(
                c,
                FailureKind::Remote,
                format!("error executing elastic pricing: {}", e.message),
            )),
            Err(e) => Err(e),
        }
    }

    pub async fn get_results_data(&self, results_file: &str) -> Result<Vec<ResultRow>, GatewayError> {
        let c = Computation::GetResultsData;
        if !matches!(tokio::fs::try_exists(results_file).await, Ok(true)) {
            return Err(GatewayError::new(
                c,
                FailureKind::Remote,
                "results file does not exist",
            ));
        }
        let payload = self
            .execute(ComputationRequest::get_results_data(results_file))
            .await?;
        decode(c, payload)
    }

    pub async fn get_margin_of_sales(
        &self,
        results_file: &str,
        prices_file: &str,
    ) -> Result<f64, GatewayError> {
        let c = Computation::GetMarginOfSales;
        let payload = self
            .execute(ComputationRequest::get_margin_of_sales(results_file, prices_file))
            .await?;
        match payload {
            Payload::Json(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| {
                GatewayError::new(c, FailureKind::Parse, format!("not a finite number: {n}"))
            }),
            other => Err(GatewayError::new(
                c,
                FailureKind::Parse,
                format!("expected a number, got {other:?}"),
            )),
        }
    }

    pub async fn calculate_result_metrics(
        &self,
        results_file: &str,
        prices_file: &str,
        elasticities_file: &str,
    ) -> Result<ResultMetrics, GatewayError> {
        let c = Computation::CalculateResultMetrics;
        let payload = self
            .execute(ComputationRequest::calculate_result_metrics(
                results_file,
                prices_file,
                elasticities_file,
            ))
            .await?;
        decode(c, payload)
    }
}

fn decode<T: DeserializeOwned>(computation: Computation, payload: Payload) -> Result<T, GatewayError> {
    match payload {
        Payload::Json(value) => serde_json::from_value(value).map_err(|e| {
            GatewayError::new(
                computation,
                FailureKind::Parse,
                format!("unexpected result shape: {e}"),
            )
        }),
        Payload::Text(text) => Err(GatewayError::new(computation, FailureKind::Parse, text)),
    }
}

/// Setup and clustering report unparseable output with a fixed message.
fn opaque_parse_failure(err: GatewayError) -> GatewayError {
    if err.kind == FailureKind::Parse {
        GatewayError::new(err.computation, FailureKind::Parse, "could not parse result")
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::Outcome;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    fn config() -> WizardConfig {
        WizardConfig {
            interpreter: "python".into(),
            scripts_dir: PathBuf::from("/opt/scripts"),
            ..WizardConfig::default()
        }
    }

    fn gateway(runner: Arc<ScriptedRunner>) -> ComputationGateway {
        ComputationGateway::new(runner, &config())
    }

    #[test]
    fn invocation_prefixes_script_path() {
        let gw = gateway(Arc::new(ScriptedRunner::new()));
        let inv = gw.invocation(&ComputationRequest::get_cluster_data("/p/clusters", 4));
        assert_eq!(inv.program, "python");
        assert_eq!(
            inv.args,
            ["/opt/scripts/get_cluster_data.py", "/p/clusters", "4"]
        );
    }

    #[tokio::test]
    async fn setup_project_decodes_paths() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.json(
            "setup_project.py",
            json!({
                "status": "success",
                "path": "/qap/demo",
                "files": {"prices_file": "/qap/demo/p.csv", "elasticities_file": "/qap/demo/e.csv"}
            }),
        );
        let setup = gateway(runner.clone())
            .setup_project("demo", "/in/p.csv", "/in/e.csv")
            .await
            .unwrap();
        assert_eq!(setup.path, "/qap/demo");
        assert_eq!(setup.files.elasticities_file, "/qap/demo/e.csv");
        assert_eq!(
            runner.calls()[0].args[1..],
            ["demo", "/in/p.csv", "/in/e.csv"]
        );
    }

    #[tokio::test]
    async fn setup_project_rejects_empty_paths() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.json(
            "setup_project.py",
            json!({
                "status": "success",
                "path": "/qap/demo",
                "files": {"prices_file": "", "elasticities_file": ""}
            }),
        );
        let err = gateway(runner)
            .setup_project("demo", "p", "e")
            .await
            .unwrap_err();
        assert_eq!(err.computation, Computation::SetupProject);
        assert_eq!(err.kind, FailureKind::Remote);
        assert_eq!(err.message, "project setup returned an empty path");
    }

    #[tokio::test]
    async fn setup_project_parse_failure_is_opaque() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.exit("setup_project.py", 0, "Traceback (most recent call last)", "");
        let err = gateway(runner)
            .setup_project("demo", "p", "e")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
        assert_eq!(err.message, "could not parse result");
    }

    #[tokio::test]
    async fn setup_project_remote_error_keeps_script_message() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.exit(
            "setup_project.py",
            1,
            r#"{"status":"error","message":"project name already in use"}"#,
            "",
        );
        let err = gateway(runner)
            .setup_project("demo", "p", "e")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Remote);
        assert_eq!(err.message, "project name already in use");
    }

    #[tokio::test]
    async fn metrics_require_success_status() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.json(
            "calculate_metrics.py",
            json!({"status": "error", "message": "files must be valid"}),
        );
        let err = gateway(runner).calculate_metrics("p", "e").await.unwrap_err();
        assert_eq!(err.message, "files must be valid");
    }

    #[tokio::test]
    async fn launch_error_propagates_with_kind() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.launch_error("calculate_metrics.py", "python: not found");
        let err = gateway(runner).calculate_metrics("p", "e").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Launch);
        assert_eq!(err.computation, Computation::CalculateMetrics);
    }

    #[tokio::test]
    async fn cluster_data_is_tagged_with_its_index() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.json(
            "get_cluster_data.py",
            json!({
                "metrics": {"num_products": 2, "avg_prices": 1.5, "min_prices": 1, "max_prices": 2, "num_elasticities": 1},
                "prices": [{"product": 1, "price": 10, "margin_of_sales": 0.3}],
                "elasticities": [{"product_A": 1, "affected_product_B": 2, "price_A": 10, "affected_margin_B": -4.5}]
            }),
        );
        let record = gateway(runner).get_cluster_data("/c", 3).await.unwrap();
        assert_eq!(record.index, 3);
        assert_eq!(record.prices[0].price, 10.0);
        assert_eq!(record.elasticities[0].affected_margin_b, -4.5);
    }

    #[tokio::test]
    async fn cluster_index_zero_is_rejected_without_spawning() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = gateway(runner.clone())
            .get_cluster_data("/c", 0)
            .await
            .unwrap_err();
        assert_eq!(err.computation, Computation::GetClusterData);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn elastic_pricing_wraps_text_output() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.exit(
            "elastic_pricing_clustering.py",
            0,
            "Solutions integrated and saved to /p/solutions.csv\n",
            "",
        );
        let report = gateway(runner)
            .run_elastic_pricing("/p/clusters", "/p/solutions.csv", SolverType::Exact, 10, "tok")
            .await
            .unwrap();
        assert_eq!(report.status, "success");
        assert!(report.output.contains("saved to /p/solutions.csv"));
    }

    #[tokio::test]
    async fn elastic_pricing_failure_carries_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.exit("elastic_pricing_clustering.py", 1, "", "solver quota exceeded");
        let err = gateway(runner)
            .run_elastic_pricing("/p/clusters", "/p/solutions.csv", SolverType::Quantum, 10, "tok")
            .await
            .unwrap_err();
        assert_eq!(
            err.message,
            "error executing elastic pricing: solver quota exceeded"
        );
    }

    #[tokio::test]
    async fn results_require_an_existing_file() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = gateway(runner.clone())
            .get_results_data("/nonexistent/solutions.csv")
            .await
            .unwrap_err();
        assert_eq!(err.message, "results file does not exist");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn results_rows_decode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("solutions.csv");
        std::fs::write(&file, "product;price\n1;10\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.json(
            "get_results_data.py",
            json!([{"product": 1, "price": 10.0, "cluster": "1"}]),
        );
        let rows = gateway(runner)
            .get_results_data(&file.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product, "1");
    }

    #[tokio::test]
    async fn margin_is_numeric() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.exit("get_margin_of_sales.py", 0, "2045.75\n", "");
        runner.exit("get_margin_of_sales.py", 0, "not a number", "");
        let gw = gateway(runner);
        assert_eq!(gw.get_margin_of_sales("r", "p").await.unwrap(), 2045.75);
        let err = gw.get_margin_of_sales("r", "p").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
    }

    #[tokio::test]
    async fn cluster_files_counts_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1_elasticity_prices.csv", "1_cross_elasticity_prices.csv"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let gw = gateway(Arc::new(ScriptedRunner::new()));
        assert_eq!(gw.get_cluster_files(&dir.path().to_string_lossy()).await.unwrap(), 1);
        let err = gw.get_cluster_files("/nonexistent/clusters").await.unwrap_err();
        assert_eq!(err.computation, Computation::GetClusterFiles);
    }

    #[derive(Default)]
    struct BlockingRunner {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ProcessRunner for BlockingRunner {
        async fn run(&self, _invocation: &Invocation) -> Outcome {
            self.started.notify_one();
            self.release.notified().await;
            Ok(Payload::Json(json!({
                "status": "success",
                "metrics": {"num_productos": 1, "max_precios": 1, "min_precios": 1, "media_precios": 1.0, "num_elasticidades": 0}
            })))
        }
    }

    #[tokio::test]
    async fn identical_request_is_rejected_while_running() {
        let runner = Arc::new(BlockingRunner::default());
        let gw = Arc::new(ComputationGateway::new(runner.clone(), &config()));

        let first = tokio::spawn({
            let gw = gw.clone();
            async move { gw.calculate_metrics("p", "e").await }
        });
        runner.started.notified().await;

        let second = gw.calculate_metrics("p", "e").await.unwrap_err();
        assert_eq!(second.kind, FailureKind::InFlight);

        runner.release.notify_one();
        assert!(first.await.unwrap().is_ok());

        // The key is released once the first call resolves.
        runner.release.notify_one();
        assert!(gw.calculate_metrics("p", "e").await.is_ok());
    }
}
