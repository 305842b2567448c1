use crate::model::SessionReport;
use anyhow::Result;
use std::path::PathBuf;

use super::state::UiState;

/// Export the finished session as JSON next to the project files.
pub fn export_report_json(r: &SessionReport) -> Result<PathBuf> {
    let path = crate::storage::default_export_path(r, "json");
    crate::storage::export_json(&path, r)?;
    Ok(path)
}

pub fn export_report_csv(r: &SessionReport) -> Result<PathBuf> {
    let path = crate::storage::default_export_path(r, "csv");
    crate::storage::export_csv(&path, r)?;
    Ok(path)
}

/// Run an export and report the outcome on the status line.
pub fn export_and_show_path(
    state: &mut UiState,
    kind: &str,
    export: fn(&SessionReport) -> Result<PathBuf>,
) {
    let Some(report) = state.report.as_ref() else {
        state.info = "No results to export yet.".into();
        return;
    };
    match export(report) {
        Ok(path) => {
            state.info = format!("Exported {kind}: {}", path.display());
            state.last_exported_path = Some(path.to_string_lossy().into_owned());
        }
        Err(e) => state.info = format!("{kind} export failed: {e:#}"),
    }
}
