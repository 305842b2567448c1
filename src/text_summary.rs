//! Text summary builder for CLI output.

use crate::model::SessionReport;
use crate::results::{Pager, ResultsView};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn opt_f(v: Option<f64>, decimals: usize) -> String {
    v.map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".into())
}

/// Build a text summary of a finished session. `max_rows` caps the result
/// table; the remainder is reported as a count.
pub(crate) fn build_text_summary(report: &SessionReport, max_rows: usize) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Project: {} ({})", report.project_name, report.project_path));
    lines.push(format!(
        "Clustering: {}   Solver: {}",
        report
            .clustering_method
            .map(|m| m.display_name())
            .unwrap_or("unknown"),
        report
            .solver_type
            .map(|s| s.display_name())
            .unwrap_or("unknown"),
    ));

    if let Some(m) = report.metrics.as_ref() {
        lines.push(format!(
            "Products: {}   Prices per product: min {} avg {:.2} max {}",
            m.num_products, m.min_prices, m.avg_prices, m.max_prices
        ));
        lines.push(format!(
            "Elasticities: {}   min {} avg {} max {}",
            m.num_elasticities,
            opt_f(m.min_elasticity, 2),
            opt_f(m.avg_elasticity, 2),
            opt_f(m.max_elasticity, 2),
        ));
        if let Some(margin) = m.avg_margin_of_sales {
            lines.push(format!("Avg margin of sales (input): {margin:.2}"));
        }
    }

    lines.push(format!("Clusters: {}", opt(report.cluster_count)));
    lines.push(format!("Solutions file: {}", report.results_file));
    lines.push(format!(
        "Margin of sales: {}   Expected margin: {}",
        opt_f(report.margin_of_sales, 2),
        opt_f(report.expected_margin, 2)
    ));

    lines.push(String::new());
    let view = ResultsView::new(report.rows.clone(), max_rows.max(1));
    let shown = view.visible();
    lines.push(format!("{:>10}  {:<24}  {:>7}", "Product", "Price", "Cluster"));
    for row in &shown {
        lines.push(format!("{:>10}  {:<24}  {:>7}", row.product, row.price, row.cluster));
    }
    let pager: &Pager = view.pager();
    if pager.total() > shown.len() {
        lines.push(format!(
            "… {} more rows ({} pages of {})",
            pager.total() - shown.len(),
            pager.page_count(),
            pager.page_size()
        ));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusteringMethod, Metrics, ResultRow, SolverType};

    fn report(rows: usize) -> SessionReport {
        SessionReport {
            generated_utc: "2024-05-01T10:00:00Z".into(),
            project_name: "demo".into(),
            clustering_method: Some(ClusteringMethod::KernighanLin),
            solver_type: Some(SolverType::Exact),
            project_path: "/qap/demo".into(),
            results_file: "/qap/demo/solutions.csv".into(),
            metrics: Some(Metrics {
                num_products: 42,
                ..Default::default()
            }),
            cluster_count: Some(3),
            rows: (0..rows)
                .map(|i| ResultRow {
                    product: i.to_string(),
                    price: "10".into(),
                    cluster: "1".into(),
                })
                .collect(),
            margin_of_sales: Some(1534.256),
            expected_margin: None,
        }
    }

    #[test]
    fn summary_names_methods_and_totals() {
        let s = build_text_summary(&report(2), 10);
        let text = s.lines.join("\n");
        assert!(text.contains("Clustering: Kernighan-Lin   Solver: Simulator"));
        assert!(text.contains("Products: 42"));
        assert!(text.contains("Margin of sales: 1534.26   Expected margin: -"));
        assert!(!text.contains("more rows"));
    }

    #[test]
    fn long_tables_are_truncated() {
        let s = build_text_summary(&report(25), 10);
        assert!(s.lines.iter().any(|l| l.contains("15 more rows (3 pages of 10)")));
    }
}
