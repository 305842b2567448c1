use crate::model::{
    ClusterRecord, ClusteringMethod, InfoEvent, ProjectInputs, SessionReport, SolverType, Stage,
    WizardEvent, WizardSnapshot,
};
use crate::results::{page_size_for_height, Pager, ResultsView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    ProjectName,
    ApiKey,
    Clustering,
    Solver,
    Prices,
    Elasticities,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::ProjectName,
        FormField::ApiKey,
        FormField::Clustering,
        FormField::Solver,
        FormField::Prices,
        FormField::Elasticities,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::ProjectName => "Project name",
            FormField::ApiKey => "API key",
            FormField::Clustering => "Clustering method",
            FormField::Solver => "Solver",
            FormField::Prices => "Prices file",
            FormField::Elasticities => "Elasticities file",
        }
    }

    pub fn is_choice(self) -> bool {
        matches!(self, FormField::Clustering | FormField::Solver)
    }
}

fn cycle<T: Copy + PartialEq>(all: &[T], current: Option<T>, forward: bool) -> Option<T> {
    let n = all.len();
    if n == 0 {
        return None;
    }
    let next = match current.and_then(|c| all.iter().position(|v| *v == c)) {
        None if forward => 0,
        None => n - 1,
        Some(i) if forward => (i + 1) % n,
        Some(i) => (i + n - 1) % n,
    };
    all.get(next).copied()
}

/// Editable copy of the stage-0 inputs.
#[derive(Debug, Clone, Default)]
pub struct InputForm {
    pub inputs: ProjectInputs,
    pub focus: usize,
    /// `Some` while a text field is being edited; holds the pending buffer.
    pub editing: Option<String>,
}

impl InputForm {
    pub fn new(inputs: ProjectInputs) -> Self {
        Self {
            inputs,
            ..Default::default()
        }
    }

    pub fn focused(&self) -> FormField {
        FormField::ALL[self.focus % FormField::ALL.len()]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % FormField::ALL.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + FormField::ALL.len() - 1) % FormField::ALL.len();
    }

    pub fn value(&self, field: FormField) -> String {
        let i = &self.inputs;
        match field {
            FormField::ProjectName => i.project_name.clone(),
            FormField::ApiKey if i.api_key.is_empty() => String::new(),
            FormField::ApiKey => "•".repeat(i.api_key.chars().count().min(16)),
            FormField::Clustering => i
                .clustering_method
                .map(|m| m.display_name().to_string())
                .unwrap_or_default(),
            FormField::Solver => i
                .solver_type
                .map(|s| s.display_name().to_string())
                .unwrap_or_default(),
            FormField::Prices => i.prices_source.clone(),
            FormField::Elasticities => i.elasticities_source.clone(),
        }
    }

    fn text_mut(&mut self, field: FormField) -> Option<&mut String> {
        let i = &mut self.inputs;
        match field {
            FormField::ProjectName => Some(&mut i.project_name),
            FormField::ApiKey => Some(&mut i.api_key),
            FormField::Prices => Some(&mut i.prices_source),
            FormField::Elasticities => Some(&mut i.elasticities_source),
            FormField::Clustering | FormField::Solver => None,
        }
    }

    /// Enter edit mode on the focused text field.
    pub fn begin_edit(&mut self) -> bool {
        let field = self.focused();
        match self.text_mut(field) {
            Some(current) => {
                let buffer = current.clone();
                self.editing = Some(buffer);
                true
            }
            None => false,
        }
    }

    /// Leave edit mode, keeping the buffer. Returns whether the inputs changed.
    pub fn commit_edit(&mut self) -> bool {
        let Some(buffer) = self.editing.take() else {
            return false;
        };
        let field = self.focused();
        match self.text_mut(field) {
            Some(target) if *target != buffer => {
                *target = buffer;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Cycle the focused choice field. Returns whether the inputs changed.
    pub fn cycle_choice(&mut self, forward: bool) -> bool {
        match self.focused() {
            FormField::Clustering => {
                self.inputs.clustering_method = cycle(
                    &ClusteringMethod::ALL,
                    self.inputs.clustering_method,
                    forward,
                );
                true
            }
            FormField::Solver => {
                self.inputs.solver_type =
                    cycle(&SolverType::ALL, self.inputs.solver_type, forward);
                true
            }
            _ => false,
        }
    }
}

/// Cluster browsing state. `selected` follows the loaded record; a requested
/// cluster stays in `pending` until the controller delivers or rejects it.
#[derive(Debug, Clone)]
pub struct ClusterBrowser {
    pub count: u32,
    pub selected: u32,
    pub pending: Option<u32>,
    pub record: Option<ClusterRecord>,
    pub prices: Pager,
    pub elasticities: Pager,
}

impl Default for ClusterBrowser {
    fn default() -> Self {
        Self {
            count: 0,
            selected: 1,
            pending: None,
            record: None,
            prices: Pager::new(0, 4),
            elasticities: Pager::new(0, 4),
        }
    }
}

impl ClusterBrowser {
    /// The adjacent cluster index in the given direction, if there is one.
    pub fn neighbour(&self, forward: bool) -> Option<u32> {
        let from = self.pending.unwrap_or(self.selected);
        if forward && from < self.count {
            Some(from + 1)
        } else if !forward && from > 1 {
            Some(from - 1)
        } else {
            None
        }
    }

    pub fn select(&mut self, index: u32) {
        self.pending = Some(index);
    }

    pub fn load(&mut self, record: ClusterRecord) {
        self.pending = None;
        self.selected = record.index;
        let size = self.prices.page_size();
        self.prices = Pager::new(record.prices.len(), size);
        self.elasticities = Pager::new(record.elasticities.len(), size);
        self.record = Some(record);
    }

    pub fn fit_height(&mut self, height: u16) {
        let size = page_size_for_height(height);
        self.prices.set_page_size(size);
        self.elasticities.set_page_size(size);
    }
}

pub struct UiState {
    pub snapshot: Option<WizardSnapshot>,
    pub form: InputForm,
    pub clusters: ClusterBrowser,
    pub report: Option<SessionReport>,
    pub results: Option<ResultsView>,
    pub results_page_size: usize,
    /// Digits typed after `g` on the results page.
    pub page_input: Option<String>,
    pub show_variants: bool,
    pub show_help: bool,
    pub info: String,
    pub last_exported_path: Option<String>,
}

impl UiState {
    pub fn new(seed: ProjectInputs, results_page_size: usize) -> Self {
        Self {
            snapshot: None,
            form: InputForm::new(seed),
            clusters: ClusterBrowser::default(),
            report: None,
            results: None,
            results_page_size,
            page_input: None,
            show_variants: true,
            show_help: false,
            info: String::new(),
            last_exported_path: None,
        }
    }

    pub fn current_stage(&self) -> Stage {
        self.snapshot
            .as_ref()
            .map(|s| s.current)
            .unwrap_or(Stage::Input)
    }

    pub fn apply_event(&mut self, ev: WizardEvent) {
        match ev {
            WizardEvent::StateChanged(snapshot) => {
                if self.snapshot.is_none() {
                    self.form = InputForm::new(snapshot.project.inputs.clone());
                }
                self.snapshot = Some(*snapshot);
            }
            WizardEvent::ClustersDiscovered { count } => {
                self.clusters.count = count;
                self.info = format!("{count} clusters found");
            }
            WizardEvent::ClusterLoaded(record) => self.clusters.load(*record),
            WizardEvent::ResultsReady(report) => {
                self.results = Some(ResultsView::from_report(&report, self.results_page_size));
                self.info = format!("{} result rows loaded", report.rows.len());
                self.report = Some(*report);
            }
            WizardEvent::Failed(failure) => {
                self.clusters.pending = None;
                self.info = format!(
                    "{} failed: {} (press r to restart)",
                    failure.stage.label(),
                    failure.error
                );
            }
            WizardEvent::Info(InfoEvent::Restarted) => {
                // The next snapshot belongs to a fresh session; reseed the form from it.
                self.snapshot = None;
                self.clusters = ClusterBrowser::default();
                self.report = None;
                self.results = None;
                self.page_input = None;
                self.info = InfoEvent::Restarted.to_message();
            }
            WizardEvent::Info(InfoEvent::Rejected(reason)) => {
                // The requested cluster will not arrive; keep showing the loaded one.
                self.clusters.pending = None;
                self.info = reason;
            }
            WizardEvent::Info(info) => self.info = info.to_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_fields_cycle_both_ways() {
        let mut form = InputForm::default();
        form.focus = 2;
        assert!(form.cycle_choice(true));
        assert_eq!(
            form.inputs.clustering_method,
            Some(ClusteringMethod::KernighanLin)
        );
        form.cycle_choice(true);
        form.cycle_choice(true);
        assert_eq!(
            form.inputs.clustering_method,
            Some(ClusteringMethod::KernighanLin)
        );
        form.focus_next();
        form.cycle_choice(false);
        assert_eq!(form.inputs.solver_type, Some(SolverType::Exact));
    }

    #[test]
    fn text_edit_commits_buffer() {
        let mut form = InputForm::default();
        assert!(form.begin_edit());
        form.editing.as_mut().unwrap().push_str("demo");
        assert!(form.commit_edit());
        assert_eq!(form.inputs.project_name, "demo");

        form.focus = 2;
        assert!(!form.begin_edit());
    }

    #[test]
    fn api_key_is_masked() {
        let form = InputForm::new(ProjectInputs {
            api_key: "abc".into(),
            ..Default::default()
        });
        assert_eq!(form.value(FormField::ApiKey), "•••");
    }

    #[test]
    fn cluster_change_resets_pages() {
        let mut browser = ClusterBrowser::default();
        browser.count = 3;
        browser.load(ClusterRecord {
            index: 1,
            metrics: Default::default(),
            prices: Vec::new(),
            elasticities: Vec::new(),
        });
        browser.prices.set_total(40);
        browser.prices.jump(5);
        let next = browser.neighbour(true).unwrap();
        browser.select(next);
        assert_eq!(browser.pending, Some(2));
        assert_eq!(browser.record.as_ref().map(|r| r.index), Some(1));
        browser.load(ClusterRecord {
            index: next,
            metrics: Default::default(),
            prices: Vec::new(),
            elasticities: Vec::new(),
        });
        assert_eq!(browser.prices.page(), 1);
        assert_eq!(browser.selected, 2);
        assert_eq!(browser.pending, None);
        assert_eq!(browser.neighbour(false), Some(1));
    }

    #[test]
    fn rejected_selection_keeps_loaded_cluster() {
        let mut state = UiState::new(ProjectInputs::default(), 10);
        state.apply_event(WizardEvent::ClustersDiscovered { count: 3 });
        state.apply_event(WizardEvent::ClusterLoaded(Box::new(ClusterRecord {
            index: 1,
            metrics: Default::default(),
            prices: Vec::new(),
            elasticities: Vec::new(),
        })));
        state.clusters.select(2);
        state.apply_event(WizardEvent::Info(InfoEvent::Rejected(
            "a computation is already running".into(),
        )));

        assert_eq!(state.clusters.pending, None);
        assert_eq!(state.clusters.selected, 1);
        assert_eq!(state.clusters.record.as_ref().map(|r| r.index), Some(1));
        assert_eq!(state.info, "a computation is already running");
    }
}
