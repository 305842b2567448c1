use crate::error::GatewayError;
use crate::gateway::Computation;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// One of the three wizard steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Input,
    Clustering,
    Results,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Input, Stage::Clustering, Stage::Results];

    pub fn index(self) -> usize {
        match self {
            Stage::Input => 0,
            Stage::Clustering => 1,
            Stage::Results => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Input => "Input data",
            Stage::Clustering => "Clustering",
            Stage::Results => "Results",
        }
    }
}

/// Completion and loading flags for the three stages.
///
/// Loading is exclusive: setting one stage loading clears the others, so at most
/// one flag is ever raised. Completion flags only move from false to true; the
/// only way back is building a fresh vector on restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVector {
    completed: [bool; 3],
    loading: [bool; 3],
}

impl StageVector {
    pub fn completed(&self) -> [bool; 3] {
        self.completed
    }

    pub fn loading(&self) -> [bool; 3] {
        self.loading
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed[stage.index()]
    }

    pub fn is_loading(&self, stage: Stage) -> bool {
        self.loading[stage.index()]
    }

    pub fn any_loading(&self) -> bool {
        self.loading.iter().any(|l| *l)
    }

    pub fn all_completed(&self) -> bool {
        self.completed.iter().all(|c| *c)
    }

    pub(crate) fn mark_completed(&mut self, stage: Stage) {
        self.completed[stage.index()] = true;
    }

    pub(crate) fn set_loading(&mut self, stage: Stage) {
        self.loading = [false; 3];
        self.loading[stage.index()] = true;
    }

    pub(crate) fn clear_loading(&mut self) {
        self.loading = [false; 3];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMethod {
    KernighanLin,
    LouvainSpectral,
}

impl ClusteringMethod {
    pub const ALL: [ClusteringMethod; 2] =
        [ClusteringMethod::KernighanLin, ClusteringMethod::LouvainSpectral];

    /// Value passed to the clustering script's `--method` flag.
    pub fn as_arg(self) -> &'static str {
        match self {
            ClusteringMethod::KernighanLin => "kernighan_lin",
            ClusteringMethod::LouvainSpectral => "louvain_spectral",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ClusteringMethod::KernighanLin => "Kernighan-Lin",
            ClusteringMethod::LouvainSpectral => "Louvain/Spectral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SolverType {
    Quantum,
    Hybrid,
    Exact,
}

impl SolverType {
    pub const ALL: [SolverType; 3] = [SolverType::Quantum, SolverType::Hybrid, SolverType::Exact];

    pub fn as_arg(self) -> &'static str {
        match self {
            SolverType::Quantum => "quantum",
            SolverType::Hybrid => "hybrid",
            SolverType::Exact => "exact",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SolverType::Quantum => "Quantum",
            SolverType::Hybrid => "Hybrid",
            SolverType::Exact => "Simulator",
        }
    }
}

/// Values the user provides on the input stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInputs {
    pub project_name: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub clustering_method: Option<ClusteringMethod>,
    pub solver_type: Option<SolverType>,
    pub prices_source: String,
    pub elasticities_source: String,
}

impl ProjectInputs {
    /// Names of the inputs that still need a value before the project can be set up.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project_name.trim().is_empty() {
            missing.push("project name");
        }
        if self.api_key.trim().is_empty() {
            missing.push("API key");
        }
        if self.clustering_method.is_none() {
            missing.push("clustering method");
        }
        if self.solver_type.is_none() {
            missing.push("solver");
        }
        if self.prices_source.trim().is_empty() {
            missing.push("prices file");
        }
        if self.elasticities_source.trim().is_empty() {
            missing.push("elasticities file");
        }
        missing
    }
}

/// Per-session project record. Owned by the wizard; everything else sees copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub inputs: ProjectInputs,
    pub project_path: String,
    pub prices_file_path: String,
    pub elasticities_file_path: String,
    pub metrics: Option<Metrics>,
    pub cluster_count: Option<u32>,
}

impl ProjectState {
    pub fn with_inputs(inputs: ProjectInputs) -> Self {
        Self {
            inputs,
            ..Default::default()
        }
    }

    pub fn clusters_dir(&self) -> String {
        join_path(&self.project_path, "clusters")
    }

    pub fn results_file(&self) -> String {
        join_path(&self.project_path, "solutions.csv")
    }
}

fn join_path(base: &str, leaf: &str) -> String {
    Path::new(base).join(leaf).to_string_lossy().into_owned()
}

/// Descriptive metrics over the uploaded datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "num_productos")]
    pub num_products: u64,
    #[serde(rename = "max_precios")]
    pub max_prices: u64,
    #[serde(rename = "min_precios")]
    pub min_prices: u64,
    #[serde(rename = "media_precios")]
    pub avg_prices: f64,
    #[serde(rename = "media_margin_of_sales", default)]
    pub avg_margin_of_sales: Option<f64>,
    #[serde(rename = "num_elasticidades")]
    pub num_elasticities: u64,
    #[serde(rename = "max_elasticidad", default)]
    pub max_elasticity: Option<f64>,
    #[serde(rename = "min_elasticidad", default)]
    pub min_elasticity: Option<f64>,
    #[serde(rename = "media_elasticidad", default)]
    pub avg_elasticity: Option<f64>,
    #[serde(default)]
    pub elasticity_summary: Vec<ElasticityBucket>,
}

/// Histogram bucket of cross elasticities, grouped in steps of 5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityBucket {
    pub elasticity: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub num_products: u64,
    pub avg_prices: f64,
    pub min_prices: u64,
    pub max_prices: u64,
    pub num_elasticities: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub product: u64,
    pub price: f64,
    pub margin_of_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityRow {
    #[serde(rename = "product_A")]
    pub product_a: u64,
    #[serde(rename = "affected_product_B")]
    pub product_b: u64,
    #[serde(rename = "price_A")]
    pub price_a: f64,
    #[serde(rename = "affected_margin_B")]
    pub affected_margin_b: f64,
}

/// One cluster as loaded for browsing. Never cached past the current selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub index: u32,
    pub metrics: ClusterMetrics,
    pub prices: Vec<PriceRow>,
    pub elasticities: Vec<ElasticityRow>,
}

/// One optimised price assignment. `price` keeps the textual form since a
/// product may carry several prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(deserialize_with = "string_or_number")]
    pub product: String,
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(deserialize_with = "string_or_number")]
    pub cluster: String,
}

/// Accepts a JSON string or number and keeps it as text.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

/// Everything the results stage shows, assembled once the chain has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub generated_utc: String,
    pub project_name: String,
    pub clustering_method: Option<ClusteringMethod>,
    pub solver_type: Option<SolverType>,
    pub project_path: String,
    pub results_file: String,
    pub metrics: Option<Metrics>,
    pub cluster_count: Option<u32>,
    pub rows: Vec<ResultRow>,
    pub margin_of_sales: Option<f64>,
    #[serde(default)]
    pub expected_margin: Option<f64>,
}

/// Read-only copy of the wizard handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardSnapshot {
    pub current: Stage,
    pub stages: StageVector,
    pub project: ProjectState,
    pub running: Option<Computation>,
    pub failure: Option<StageFailure>,
    /// Whether the "next" control would do anything right now.
    pub advance_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: GatewayError,
}

#[derive(Debug, Clone)]
pub enum WizardEvent {
    StateChanged(Box<WizardSnapshot>),
    ClustersDiscovered {
        count: u32,
    },
    ClusterLoaded(Box<ClusterRecord>),
    // Box to keep WizardEvent small; the report carries every result row.
    ResultsReady(Box<SessionReport>),
    /// A stage failed; the only way forward is a restart.
    Failed(StageFailure),
    Info(InfoEvent),
}

/// Structured info events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoEvent {
    ComputationStarted { computation: Computation },
    ComputationFinished { computation: Computation, elapsed_ms: u128 },
    Rejected(String),
    Restarted,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::ComputationStarted { computation } => format!("Running {computation}…"),
            InfoEvent::ComputationFinished {
                computation,
                elapsed_ms,
            } => format!("{computation} finished in {:.1}s", *elapsed_ms as f64 / 1000.0),
            InfoEvent::Rejected(reason) => reason.clone(),
            InfoEvent::Restarted => "Session restarted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_is_exclusive() {
        let mut v = StageVector::default();
        v.set_loading(Stage::Clustering);
        v.set_loading(Stage::Results);
        assert_eq!(v.loading(), [false, false, true]);
        v.clear_loading();
        assert!(!v.any_loading());
    }

    #[test]
    fn missing_inputs_lists_every_empty_field() {
        let inputs = ProjectInputs {
            project_name: "demo".into(),
            ..Default::default()
        };
        assert_eq!(
            inputs.missing(),
            vec![
                "API key",
                "clustering method",
                "solver",
                "prices file",
                "elasticities file"
            ]
        );
    }

    #[test]
    fn metrics_decode_from_script_field_names() {
        let m: Metrics = serde_json::from_value(serde_json::json!({
            "num_productos": 42,
            "max_precios": 5,
            "min_precios": 1,
            "media_precios": 3.25,
            "num_elasticidades": 120,
            "elasticity_summary": [{"elasticity": -5, "count": 3}]
        }))
        .unwrap();
        assert_eq!(m.num_products, 42);
        assert_eq!(m.avg_margin_of_sales, None);
        assert_eq!(m.elasticity_summary[0].count, 3);
    }

    #[test]
    fn result_rows_accept_numbers_or_strings() {
        let rows: Vec<ResultRow> = serde_json::from_value(serde_json::json!([
            {"product": 7, "price": 12.5, "cluster": "2"},
            {"product": "8", "price": "10;11", "cluster": 3}
        ]))
        .unwrap();
        assert_eq!(rows[0].product, "7");
        assert_eq!(rows[0].price, "12.5");
        assert_eq!(rows[1].price, "10;11");
        assert_eq!(rows[1].cluster, "3");
    }

    #[test]
    fn project_paths_derive_from_project_dir() {
        let p = ProjectState {
            project_path: "/tmp/demo".into(),
            ..Default::default()
        };
        assert_eq!(p.clusters_dir(), "/tmp/demo/clusters");
        assert_eq!(p.results_file(), "/tmp/demo/solutions.csv");
    }

    #[test]
    fn api_key_is_never_serialized() {
        let inputs = ProjectInputs {
            api_key: "secret".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&inputs).unwrap();
        assert!(!json.contains("secret"));
    }
}
