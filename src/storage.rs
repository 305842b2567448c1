//! Session report export.

use crate::model::SessionReport;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn export_json(path: &Path, report: &SessionReport) -> Result<()> {
    ensure_parent(path)?;
    let data = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Quote a field when it contains the delimiter, a quote or a newline.
fn csv_field(value: &str) -> String {
    if value.contains([';', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `;`-delimited result rows, matching the delimiter of the input datasets.
pub fn render_csv(report: &SessionReport) -> String {
    let mut out = String::from("product;price;cluster\n");
    for row in &report.rows {
        let _ = writeln!(
            out,
            "{};{};{}",
            csv_field(&row.product),
            csv_field(&row.price),
            csv_field(&row.cluster)
        );
    }
    out
}

pub fn export_csv(path: &Path, report: &SessionReport) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, render_csv(report))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Export target inside the project directory, named after the report time.
pub fn default_export_path(report: &SessionReport, extension: &str) -> PathBuf {
    let stamp = report.generated_utc.replace(':', "-").replace('T', "_");
    Path::new(&report.project_path).join(format!(
        "{}-results-{stamp}.{extension}",
        report.project_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultRow;

    fn report(project_path: &str) -> SessionReport {
        SessionReport {
            generated_utc: "2024-05-01T10:00:00Z".into(),
            project_name: "demo".into(),
            clustering_method: None,
            solver_type: None,
            project_path: project_path.into(),
            results_file: format!("{project_path}/solutions.csv"),
            metrics: None,
            cluster_count: Some(1),
            rows: vec![
                ResultRow {
                    product: "1".into(),
                    price: "10;12".into(),
                    cluster: "1".into(),
                },
                ResultRow {
                    product: "2".into(),
                    price: "9,5".into(),
                    cluster: "1".into(),
                },
            ],
            margin_of_sales: Some(12.0),
            expected_margin: None,
        }
    }

    #[test]
    fn csv_quotes_multi_valued_prices() {
        let csv = render_csv(&report("/p"));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, ["product;price;cluster", "1;\"10;12\";1", "2;9,5;1"]);
    }

    #[test]
    fn json_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let r = report("/p");
        export_json(&path, &r).unwrap();
        let back: SessionReport =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn default_path_lives_in_project_dir() {
        let path = default_export_path(&report("/qap/demo"), "csv");
        assert_eq!(
            path,
            PathBuf::from("/qap/demo/demo-results-2024-05-01_10-00-00Z.csv")
        );
    }
}
