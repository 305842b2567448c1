//! The fixed catalog of external computations and how each one is invoked.

use crate::model::{ClusteringMethod, SolverType};
use crate::runner::DecodeMode;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Computation {
    SetupProject,
    CalculateMetrics,
    RunClustering,
    GetClusterFiles,
    GetClusterData,
    RunElasticPricing,
    GetResultsData,
    GetMarginOfSales,
    CalculateResultMetrics,
}

impl Computation {
    #[cfg(test)]
    pub const ALL: [Computation; 9] = [
        Computation::SetupProject,
        Computation::CalculateMetrics,
        Computation::RunClustering,
        Computation::GetClusterFiles,
        Computation::GetClusterData,
        Computation::RunElasticPricing,
        Computation::GetResultsData,
        Computation::GetMarginOfSales,
        Computation::CalculateResultMetrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Computation::SetupProject => "setup-project",
            Computation::CalculateMetrics => "calculate-metrics",
            Computation::RunClustering => "run-clustering",
            Computation::GetClusterFiles => "get-cluster-files",
            Computation::GetClusterData => "get-cluster-data",
            Computation::RunElasticPricing => "run-elastic-pricing",
            Computation::GetResultsData => "get-results-data",
            Computation::GetMarginOfSales => "get-margin-of-sales",
            Computation::CalculateResultMetrics => "calculate-result-metrics",
        }
    }

    /// Script run by the interpreter. `None` for operations answered locally.
    pub fn script(self) -> Option<&'static str> {
        match self {
            Computation::SetupProject => Some("setup_project.py"),
            Computation::CalculateMetrics => Some("calculate_metrics.py"),
            Computation::RunClustering => Some("clustering.py"),
            Computation::GetClusterFiles => None,
            Computation::GetClusterData => Some("get_cluster_data.py"),
            Computation::RunElasticPricing => Some("elastic_pricing_clustering.py"),
            Computation::GetResultsData => Some("get_results_data.py"),
            Computation::GetMarginOfSales => Some("get_margin_of_sales.py"),
            Computation::CalculateResultMetrics => Some("calculate_result_metrics.py"),
        }
    }

    pub fn decode_mode(self) -> DecodeMode {
        match self {
            Computation::RunElasticPricing => DecodeMode::Text,
            Computation::GetMarginOfSales => DecodeMode::Numeric,
            _ => DecodeMode::Json,
        }
    }
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single request to the gateway: which computation, with which arguments.
///
/// Arguments are already marshalled into the script's argv order. Fields are
/// private so a request cannot change after it is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationRequest {
    computation: Computation,
    arguments: Vec<String>,
    payload: Option<serde_json::Value>,
}

impl ComputationRequest {
    fn new(computation: Computation, arguments: Vec<String>) -> Self {
        Self {
            computation,
            arguments,
            payload: None,
        }
    }

    pub fn computation(&self) -> Computation {
        self.computation
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Structured inputs that are not passed on the command line.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    /// Arguments safe to log: the value following `--token` is masked.
    pub fn redacted_arguments(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.arguments.len());
        let mut mask_next = false;
        for arg in &self.arguments {
            if mask_next {
                out.push("***".to_string());
                mask_next = false;
                continue;
            }
            mask_next = arg == "--token";
            out.push(arg.clone());
        }
        out
    }

    pub fn setup_project(project_name: &str, prices: &str, elasticities: &str) -> Self {
        Self::new(
            Computation::SetupProject,
            vec![project_name.into(), prices.into(), elasticities.into()],
        )
    }

    pub fn calculate_metrics(prices: &str, elasticities: &str) -> Self {
        Self::new(
            Computation::CalculateMetrics,
            vec![prices.into(), elasticities.into()],
        )
    }

    pub fn run_clustering(
        method: ClusteringMethod,
        output_dir: &str,
        prices: &str,
        elasticities: &str,
        solver: SolverType,
    ) -> Self {
        Self::new(
            Computation::RunClustering,
            vec![
                "--method".into(),
                method.as_arg().into(),
                "--output_dir".into(),
                output_dir.into(),
                "--prices_file".into(),
                prices.into(),
                "--cross_elasticity_file".into(),
                elasticities.into(),
                "--solver_type".into(),
                solver.as_arg().into(),
            ],
        )
    }

    /// Directory listing; carried as payload since nothing is spawned.
    pub fn get_cluster_files(clusters_dir: &str) -> Self {
        Self {
            payload: Some(serde_json::json!({ "clusters_dir": clusters_dir })),
            ..Self::new(Computation::GetClusterFiles, Vec::new())
        }
    }

    pub fn get_cluster_data(clusters_dir: &str, index: u32) -> Self {
        Self::new(
            Computation::GetClusterData,
            vec![clusters_dir.into(), index.to_string()],
        )
    }

    pub fn run_elastic_pricing(
        clusters_dir: &str,
        output_file: &str,
        solver: SolverType,
        num_reads: u32,
        token: &str,
    ) -> Self {
        Self {
            payload: Some(serde_json::json!({
                "solver": solver.as_arg(),
                "num_reads": num_reads,
            })),
            ..Self::new(
                Computation::RunElasticPricing,
                vec![
                    "--folder".into(),
                    clusters_dir.into(),
                    "--output".into(),
                    output_file.into(),
                    "--solver".into(),
                    solver.as_arg().into(),
                    "--num_reads".into(),
                    num_reads.to_string(),
                    "--token".into(),
                    token.into(),
                ],
            )
        }
    }

    pub fn get_results_data(results_file: &str) -> Self {
        Self::new(Computation::GetResultsData, vec![results_file.into()])
    }

    pub fn get_margin_of_sales(results_file: &str, prices_file: &str) -> Self {
        Self::new(
            Computation::GetMarginOfSales,
            vec![results_file.into(), prices_file.into()],
        )
    }

    pub fn calculate_result_metrics(
        results_file: &str,
        prices_file: &str,
        elasticities_file: &str,
    ) -> Self {
        Self::new(
            Computation::CalculateResultMetrics,
            vec![
                results_file.into(),
                prices_file.into(),
                elasticities_file.into(),
            ],
        )
    }
}
