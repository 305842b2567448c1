//! Post-results processing.
//!
//! Once pricing has finished, fetches the result rows and the margin totals and
//! assembles them into a [`SessionReport`].

use crate::error::GatewayError;
use crate::gateway::ComputationGateway;
use crate::model::{ProjectState, SessionReport};
use tracing::{info, warn};

/// Collect the results stage. Missing rows fail the stage; the margin totals
/// are best effort and left empty when their computation fails.
pub(crate) async fn collect_session_report(
    gateway: &ComputationGateway,
    project: &ProjectState,
) -> Result<SessionReport, GatewayError> {
    let results_file = project.results_file();
    let rows = gateway.get_results_data(&results_file).await?;

    let margin_of_sales = match gateway
        .get_margin_of_sales(&results_file, &project.prices_file_path)
        .await
    {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "margin of sales unavailable");
            None
        }
    };

    let expected_margin = match gateway
        .calculate_result_metrics(
            &results_file,
            &project.prices_file_path,
            &project.elasticities_file_path,
        )
        .await
    {
        Ok(m) => Some(m.total_expected_margin),
        Err(e) => {
            warn!(error = %e, "expected margin unavailable");
            None
        }
    };

    info!(rows = rows.len(), ?margin_of_sales, "results collected");
    Ok(SessionReport {
        generated_utc: now_rfc3339(),
        project_name: project.inputs.project_name.clone(),
        clustering_method: project.inputs.clustering_method,
        solver_type: project.inputs.solver_type,
        project_path: project.project_path.clone(),
        results_file,
        metrics: project.metrics.clone(),
        cluster_count: project.cluster_count,
        rows,
        margin_of_sales,
        expected_margin,
    })
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
