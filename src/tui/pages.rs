//! One drawing function per wizard stage.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph, Row, Table, Wrap},
    Frame,
};

use super::state::{FormField, UiState};
use crate::model::{Metrics, Stage};
use crate::results::{Direction as SortDirection, Pager, SortField};

fn label(text: &str) -> Span<'static> {
    Span::styled(format!("{text}: "), Style::default().fg(Color::Gray))
}

fn kv(name: &str, value: impl Into<String>) -> Line<'static> {
    Line::from(vec![label(name), Span::raw(value.into())])
}

fn opt_f(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into())
}

fn pager_footer(p: &Pager) -> String {
    format!("page {} of {}", p.page(), p.page_count().max(1))
}

fn loading_line(state: &UiState, stage: Stage) -> Option<Line<'static>> {
    let snap = state.snapshot.as_ref()?;
    if !snap.stages.is_loading(stage) {
        return None;
    }
    let what = snap
        .running
        .map(|c| c.to_string())
        .unwrap_or_else(|| "working".into());
    Some(Line::from(Span::styled(
        format!("⏳ {what}…"),
        Style::default().fg(Color::Yellow),
    )))
}

pub fn draw_input(area: Rect, f: &mut Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let locked = state
        .snapshot
        .as_ref()
        .is_some_and(|s| !s.project.project_path.is_empty());
    let mut lines = Vec::new();
    for (i, field) in FormField::ALL.iter().enumerate() {
        let focused = i == state.form.focus && !locked;
        let value = match (&state.form.editing, focused) {
            (Some(buffer), true) if *field == FormField::ApiKey => {
                format!("{}▏", "•".repeat(buffer.chars().count()))
            }
            (Some(buffer), true) => format!("{buffer}▏"),
            _ => state.form.value(*field),
        };
        let value = if value.is_empty() { "<unset>".into() } else { value };
        let marker = if focused { "› " } else { "  " };
        let value_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let hint = if focused && field.is_choice() { "  ←/→" } else { "" };
        lines.push(Line::from(vec![
            Span::raw(marker),
            label(field.label()),
            Span::styled(value, value_style),
            Span::styled(hint, Style::default().fg(Color::DarkGray)),
        ]));
    }
    lines.push(Line::from(""));
    if let Some(snap) = state.snapshot.as_ref() {
        if !snap.project.project_path.is_empty() {
            lines.push(kv("Project folder", snap.project.project_path.clone()));
        }
    }
    if let Some(l) = loading_line(state, Stage::Input) {
        lines.push(l);
    } else if !locked {
        let missing = state.form.inputs.missing();
        if missing.is_empty() {
            lines.push(Line::from("Press n to set up the project."));
        } else {
            lines.push(Line::from(Span::styled(
                format!("Missing: {}", missing.join(", ")),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Project inputs")),
        cols[0],
    );

    let metrics = state.snapshot.as_ref().and_then(|s| s.project.metrics.as_ref());
    match metrics {
        Some(m) => draw_metrics(cols[1], f, m),
        None => f.render_widget(
            Paragraph::new("Metrics appear once the datasets are processed.")
                .block(Block::default().borders(Borders::ALL).title("Metrics")),
            cols[1],
        ),
    }
}

fn draw_metrics(area: Rect, f: &mut Frame, m: &Metrics) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(area);

    let lines = vec![
        kv("Products", m.num_products.to_string()),
        kv(
            "Prices per product",
            format!("min {} / avg {:.2} / max {}", m.min_prices, m.avg_prices, m.max_prices),
        ),
        kv("Avg margin of sales", opt_f(m.avg_margin_of_sales)),
        kv("Cross elasticities", m.num_elasticities.to_string()),
        kv(
            "Elasticity",
            format!(
                "min {} / avg {} / max {}",
                opt_f(m.min_elasticity),
                opt_f(m.avg_elasticity),
                opt_f(m.max_elasticity)
            ),
        ),
    ];
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Metrics")),
        rows[0],
    );

    let bars: Vec<Bar> = m
        .elasticity_summary
        .iter()
        .map(|b| {
            Bar::default()
                .value(b.count)
                .label(Line::from(format!("{:.0}", b.elasticity)))
        })
        .collect();
    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Cross elasticities (count per bucket of 5)"),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(4)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(chart, rows[1]);
}

pub fn draw_clustering(area: Rect, f: &mut Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    let browser = &state.clusters;
    let mut header = Vec::new();
    if let Some(l) = loading_line(state, Stage::Clustering) {
        header.push(l);
    }
    let clustered = state
        .snapshot
        .as_ref()
        .is_some_and(|s| s.stages.is_completed(Stage::Clustering));
    if !clustered {
        header.push(Line::from("Clusters appear once clustering has finished."));
    } else if browser.count == 0 {
        header.push(Line::from("Waiting for pricing to finish before browsing clusters."));
    } else {
        let mut spans = vec![
            label("Cluster"),
            Span::styled(
                format!("{} / {}", browser.selected, browser.count),
                Style::default().fg(Color::Yellow),
            ),
            Span::styled("  [ / ] to switch", Style::default().fg(Color::DarkGray)),
        ];
        if let Some(next) = browser.pending {
            spans.push(Span::styled(
                format!("   loading cluster {next}…"),
                Style::default().fg(Color::Yellow),
            ));
        } else if let Some(rec) = browser.record.as_ref() {
            spans.push(Span::raw(format!(
                "   products {}  prices avg {:.2} (min {} max {})  elasticities {}",
                rec.metrics.num_products,
                rec.metrics.avg_prices,
                rec.metrics.min_prices,
                rec.metrics.max_prices,
                rec.metrics.num_elasticities
            )));
        } else {
            spans.push(Span::styled("   loading…", Style::default().fg(Color::Yellow)));
        }
        header.push(Line::from(spans));
    }
    f.render_widget(
        Paragraph::new(header).block(Block::default().borders(Borders::ALL).title("Clusters")),
        rows[0],
    );

    let tables = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[1]);

    let Some(rec) = browser.record.as_ref() else {
        f.render_widget(Block::default().borders(Borders::ALL).title("Prices"), tables[0]);
        f.render_widget(
            Block::default().borders(Borders::ALL).title("Cross elasticities"),
            tables[1],
        );
        return;
    };

    let price_rows: Vec<Row> = browser
        .prices
        .slice(&rec.prices)
        .iter()
        .map(|p| {
            Row::new(vec![
                p.product.to_string(),
                format!("{:.2}", p.price),
                format!("{:.2}", p.margin_of_sales),
            ])
        })
        .collect();
    let prices = Table::new(
        price_rows,
        [Constraint::Length(10), Constraint::Length(10), Constraint::Min(8)],
    )
    .header(header_row(&["Product", "Price", "Margin"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Prices · {} (←/→)", pager_footer(&browser.prices))),
    );
    f.render_widget(prices, tables[0]);

    let elasticity_rows: Vec<Row> = browser
        .elasticities
        .slice(&rec.elasticities)
        .iter()
        .map(|e| {
            Row::new(vec![
                e.product_a.to_string(),
                e.product_b.to_string(),
                format!("{:.2}", e.price_a),
                format!("{:.2}", e.affected_margin_b),
            ])
        })
        .collect();
    let elasticities = Table::new(
        elasticity_rows,
        [
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["Product A", "Product B", "Price A", "Margin B"]))
    .block(Block::default().borders(Borders::ALL).title(format!(
        "Cross elasticities · {} (,/.)",
        pager_footer(&browser.elasticities)
    )));
    f.render_widget(elasticities, tables[1]);
}

fn header_row(cells: &[&'static str]) -> Row<'static> {
    Row::new(cells.to_vec()).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )
}

fn sort_marker(state_sort: Option<(SortField, SortDirection)>, field: SortField) -> String {
    match state_sort {
        Some((f, SortDirection::Ascending)) if f == field => format!("{} ▲", field.label()),
        Some((f, SortDirection::Descending)) if f == field => format!("{} ▼", field.label()),
        _ => field.label().to_string(),
    }
}

pub fn draw_results(area: Rect, f: &mut Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(44), Constraint::Min(0)])
        .split(area);

    let mut summary = Vec::new();
    if let Some(l) = loading_line(state, Stage::Results) {
        summary.push(l);
    }
    if let Some(snap) = state.snapshot.as_ref() {
        let p = &snap.project;
        let m = p.metrics.as_ref();
        summary.push(kv(
            "Products",
            m.map(|m| m.num_products.to_string()).unwrap_or_else(|| "-".into()),
        ));
        summary.push(kv(
            "Avg prices per product",
            m.map(|m| format!("{:.2}", m.avg_prices))
                .unwrap_or_else(|| "-".into()),
        ));
        summary.push(kv(
            "Elasticities",
            m.map(|m| m.num_elasticities.to_string())
                .unwrap_or_else(|| "-".into()),
        ));
        summary.push(kv(
            "Clustering",
            p.inputs
                .clustering_method
                .map(|c| c.display_name())
                .unwrap_or("unknown"),
        ));
        summary.push(kv(
            "Solver",
            p.inputs.solver_type.map(|s| s.display_name()).unwrap_or("unknown"),
        ));
        if !p.project_path.is_empty() {
            summary.push(kv("Solutions file", p.results_file()));
        }
    }
    if let Some(view) = state.results.as_ref() {
        summary.push(Line::from(""));
        summary.push(kv("Margin of sales", opt_f(view.margin_total())));
        summary.push(kv("Expected margin", opt_f(view.expected_margin())));
    }
    if let Some(path) = state.last_exported_path.as_ref() {
        summary.push(Line::from(""));
        summary.push(kv("Last export", path.clone()));
    }
    f.render_widget(
        Paragraph::new(summary)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Summary")),
        cols[0],
    );

    let Some(view) = state.results.as_ref() else {
        f.render_widget(
            Paragraph::new("Results appear once pricing has finished.")
                .block(Block::default().borders(Borders::ALL).title("Results")),
            cols[1],
        );
        return;
    };

    if view.is_empty() {
        f.render_widget(
            Paragraph::new("The solver returned no result rows.")
                .block(Block::default().borders(Borders::ALL).title("Results")),
            cols[1],
        );
        return;
    }

    // Variants are redrawn every frame.
    let mut rng = rand::thread_rng();
    let shown = view.visible_with_variants(&mut rng);
    let rows: Vec<Row> = shown
        .iter()
        .map(|d| {
            let mut cells = vec![
                d.row.product.clone(),
                d.row.price.clone(),
                d.row.cluster.clone(),
            ];
            if state.show_variants {
                cells.push(d.variant.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into()));
            }
            Row::new(cells)
        })
        .collect();

    let sort = view.sort();
    let mut headers = vec![
        sort_marker(sort, SortField::Product),
        sort_marker(sort, SortField::Price),
        sort_marker(sort, SortField::Cluster),
    ];
    let mut widths = vec![
        Constraint::Length(12),
        Constraint::Min(14),
        Constraint::Length(10),
    ];
    if state.show_variants {
        headers.push("Simulated".into());
        widths.push(Constraint::Length(11));
    }

    let page_title = match state.page_input.as_ref() {
        Some(buffer) => format!("go to page: {buffer}▏"),
        None => pager_footer(view.pager()),
    };
    let table = Table::new(rows, widths)
        .header(
            Row::new(headers).style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Results · {} rows · {page_title}", view.len())),
        );
    f.render_widget(table, cols[1]);
}
