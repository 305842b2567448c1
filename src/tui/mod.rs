mod export;
mod help;
mod pages;
mod state;

use crate::cli::{seed_inputs, Cli};
use crate::config::WizardConfig;
use crate::gateway::ComputationGateway;
use crate::model::{ProjectInputs, Stage, WizardEvent};
use crate::orchestrator::{self, ControllerOptions, UiCommand};
use crate::results::SortField;
use crate::runner::SubprocessRunner;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::UiState;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli, cfg: WizardConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WizardEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let gateway = Arc::new(ComputationGateway::new(Arc::new(SubprocessRunner), &cfg));
    let seed = seed_inputs(&args, &cfg);
    let options = ControllerOptions {
        auto_start: args.start,
        browse_clusters: true,
        num_reads: cfg.num_reads,
    };

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_seed = seed.clone();
    let page_size = cfg.page_size;
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_seed, page_size, event_rx, cmd_tx));

    let res = orchestrator::run_controller(gateway, seed, options, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    seed: ProjectInputs,
    results_page_size: usize,
    mut event_rx: UnboundedReceiver<WizardEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(seed, results_page_size);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            if let Ok(size) = terminal.size() {
                state.clusters.fit_height(size.height);
            }
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key(&mut state, k, &cmd_tx) == KeyOutcome::Quit {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Quit,
}

fn inputs_locked(state: &UiState) -> bool {
    state.snapshot.as_ref().is_some_and(|s| {
        !s.project.project_path.is_empty()
            || s.running.is_some()
            || s.stages.any_loading()
            || s.failure.is_some()
    })
}

fn handle_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) -> KeyOutcome {
    if k.modifiers == KeyModifiers::CONTROL && k.code == KeyCode::Char('c') {
        return KeyOutcome::Quit;
    }

    // Text entry swallows every other key until it is committed or cancelled.
    if let Some(buffer) = state.form.editing.as_mut() {
        match k.code {
            KeyCode::Char(c) => buffer.push(c),
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Esc => state.form.cancel_edit(),
            KeyCode::Enter => {
                if state.form.commit_edit() {
                    let _ = cmd_tx.send(UiCommand::SetInputs(state.form.inputs.clone()));
                }
            }
            _ => {}
        }
        return KeyOutcome::Continue;
    }
    if let Some(buffer) = state.page_input.as_mut() {
        match k.code {
            KeyCode::Char(c) if c.is_ascii_digit() => buffer.push(c),
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Esc => state.page_input = None,
            KeyCode::Enter => {
                let input = state.page_input.take().unwrap_or_default();
                if let Some(view) = state.results.as_mut() {
                    if !view.pager_mut().jump_input(&input) {
                        state.info = format!(
                            "No page {input}; pick 1 to {}",
                            view.pager().page_count().max(1)
                        );
                    }
                }
            }
            _ => {}
        }
        return KeyOutcome::Continue;
    }

    match k.code {
        KeyCode::Char('q') => return KeyOutcome::Quit,
        KeyCode::Char('?') => state.show_help = !state.show_help,
        KeyCode::Esc if state.show_help => state.show_help = false,
        KeyCode::Char(c @ '1'..='3') => {
            let index = c as usize - '1' as usize;
            if let Some(stage) = Stage::from_index(index) {
                let _ = cmd_tx.send(UiCommand::GoTo(stage));
            }
        }
        KeyCode::Char('n') => {
            let _ = cmd_tx.send(UiCommand::Advance);
        }
        KeyCode::Char('r') => {
            state.info = "Restart requested…".into();
            let _ = cmd_tx.send(UiCommand::Restart);
        }
        _ => match state.current_stage() {
            Stage::Input => handle_input_key(state, k.code, cmd_tx),
            Stage::Clustering => handle_clustering_key(state, k.code, cmd_tx),
            Stage::Results => handle_results_key(state, k.code),
        },
    }
    KeyOutcome::Continue
}

fn handle_input_key(state: &mut UiState, code: KeyCode, cmd_tx: &UnboundedSender<UiCommand>) {
    match code {
        KeyCode::Up => state.form.focus_prev(),
        KeyCode::Down | KeyCode::Tab => state.form.focus_next(),
        KeyCode::Enter | KeyCode::Left | KeyCode::Right if inputs_locked(state) => {
            state.info = "Inputs are fixed once the project is set up.".into();
        }
        KeyCode::Enter => {
            if !state.form.begin_edit() {
                state.info = "Use ←/→ to change this field.".into();
            }
        }
        KeyCode::Left | KeyCode::Right => {
            if state.form.cycle_choice(code == KeyCode::Right) {
                let _ = cmd_tx.send(UiCommand::SetInputs(state.form.inputs.clone()));
            }
        }
        _ => {}
    }
}

fn handle_clustering_key(
    state: &mut UiState,
    code: KeyCode,
    cmd_tx: &UnboundedSender<UiCommand>,
) {
    let browser = &mut state.clusters;
    match code {
        KeyCode::Char('[') | KeyCode::Char(']') => {
            if let Some(index) = browser.neighbour(code == KeyCode::Char(']')) {
                browser.select(index);
                let _ = cmd_tx.send(UiCommand::SelectCluster(index));
            }
        }
        KeyCode::Left => browser.prices.prev(),
        KeyCode::Right => browser.prices.next(),
        KeyCode::Char(',') => browser.elasticities.prev(),
        KeyCode::Char('.') => browser.elasticities.next(),
        _ => {}
    }
}

fn handle_results_key(state: &mut UiState, code: KeyCode) {
    match code {
        KeyCode::Char('e') => {
            export::export_and_show_path(state, "JSON", export::export_report_json)
        }
        KeyCode::Char('c') => export::export_and_show_path(state, "CSV", export::export_report_csv),
        KeyCode::Char('v') => state.show_variants = !state.show_variants,
        _ => {
            let Some(view) = state.results.as_mut() else {
                return;
            };
            match code {
                KeyCode::Left => view.pager_mut().prev(),
                KeyCode::Right => view.pager_mut().next(),
                KeyCode::Char('g') => state.page_input = Some(String::new()),
                KeyCode::Char('a') => view.sort_by(SortField::Product),
                KeyCode::Char('s') => view.sort_by(SortField::Price),
                KeyCode::Char('d') => view.sort_by(SortField::Cluster),
                _ => {}
            }
        }
    }
}

fn stage_tab(state: &UiState, stage: Stage) -> Line<'static> {
    let stages = state.snapshot.as_ref().map(|s| s.stages).unwrap_or_default();
    let (loading, completed) = (stages.loading(), stages.completed());
    let mark = if loading[stage.index()] {
        " …"
    } else if completed[stage.index()] {
        " ✓"
    } else {
        ""
    };
    Line::from(format!("{} {}{mark}", stage.index() + 1, stage.label()))
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let failed = state.snapshot.as_ref().and_then(|s| s.failure.as_ref());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(if failed.is_some() { 4 } else { 0 }),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let title = match state.snapshot.as_ref() {
        Some(s) if !s.project.inputs.project_name.is_empty() => {
            format!("pricing-wizard · {}", s.project.inputs.project_name)
        }
        _ => "pricing-wizard".to_string(),
    };
    let tabs = Tabs::new(Stage::ALL.iter().map(|s| stage_tab(state, *s)).collect::<Vec<_>>())
        .select(state.current_stage().index())
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    if let Some(failure) = failed {
        let banner = Paragraph::new(vec![
            Line::from(Span::styled(
                format!("{} failed: {}", failure.stage.label(), failure.error),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from("Press r to restart the wizard."),
        ])
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Error"));
        f.render_widget(banner, chunks[1]);
    }

    match state.current_stage() {
        Stage::Input => pages::draw_input(chunks[2], f, state),
        Stage::Clustering => pages::draw_clustering(chunks[2], f, state),
        Stage::Results => pages::draw_results(chunks[2], f, state),
    }

    let hint = match state.snapshot.as_ref() {
        Some(s) if s.failure.is_some() => "r restart · q quit",
        Some(s) if s.stages.all_completed() => "1-3 stages · r restart · ? help · q quit",
        Some(s) if !s.advance_enabled => "1-3 stages · ? help · q quit",
        _ => "n next · 1-3 stages · ? help · q quit",
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(state.info.clone()),
        Span::styled(format!("   {hint}"), Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[3]);

    if state.show_help {
        help::draw_help(centered(area, 70, 28), f);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResultRow, SessionReport};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn results_state(rows: usize) -> UiState {
        let mut state = UiState::new(ProjectInputs::default(), 10);
        state.apply_event(WizardEvent::ResultsReady(Box::new(SessionReport {
            generated_utc: String::new(),
            project_name: "demo".into(),
            clustering_method: None,
            solver_type: None,
            project_path: "/tmp/demo".into(),
            results_file: "/tmp/demo/solutions.csv".into(),
            metrics: None,
            cluster_count: None,
            rows: (0..rows)
                .map(|i| ResultRow {
                    product: i.to_string(),
                    price: "1".into(),
                    cluster: "1".into(),
                })
                .collect(),
            margin_of_sales: None,
            expected_margin: None,
        })));
        state
    }

    #[test]
    fn typing_goes_to_the_edit_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = UiState::new(ProjectInputs::default(), 10);
        handle_key(&mut state, press(KeyCode::Enter), &tx);
        for c in "qa".chars() {
            assert_eq!(handle_key(&mut state, press(KeyCode::Char(c)), &tx), KeyOutcome::Continue);
        }
        handle_key(&mut state, press(KeyCode::Enter), &tx);
        assert_eq!(state.form.inputs.project_name, "qa");
        match rx.try_recv() {
            Ok(UiCommand::SetInputs(inputs)) => assert_eq!(inputs.project_name, "qa"),
            other => panic!("expected SetInputs, got {other:?}"),
        }
    }

    #[test]
    fn page_jump_out_of_range_keeps_page() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = results_state(25);
        // Results keys only apply on the results stage; drive the handler directly.
        handle_results_key(&mut state, KeyCode::Right);
        handle_results_key(&mut state, KeyCode::Char('g'));
        handle_key(&mut state, press(KeyCode::Char('9')), &tx);
        handle_key(&mut state, press(KeyCode::Enter), &tx);
        let view = state.results.as_ref().unwrap();
        assert_eq!(view.pager().page(), 2);
        assert!(state.info.contains("No page 9"));
    }

    #[test]
    fn quit_keys() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = UiState::new(ProjectInputs::default(), 10);
        assert_eq!(handle_key(&mut state, press(KeyCode::Char('q')), &tx), KeyOutcome::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_key(&mut state, ctrl_c, &tx), KeyOutcome::Quit);
    }
}
