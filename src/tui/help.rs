use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

fn key_line(key: &'static str, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(action),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("q / Ctrl-C", "Quit"),
        key_line("1 2 3", "Go to a completed stage"),
        key_line("n", "Advance (starts the project on the input stage)"),
        key_line("r", "Restart after a failure or a finished session"),
        key_line("?", "Toggle this help"),
        Line::from(""),
        Line::from("Input stage:"),
        key_line("↑/↓", "Select field"),
        key_line("Enter", "Edit text field / confirm"),
        key_line("Esc", "Cancel edit"),
        key_line("←/→", "Change clustering method or solver"),
        Line::from(""),
        Line::from("Clustering stage:"),
        key_line("[ / ]", "Previous / next cluster"),
        key_line("←/→", "Prices table page"),
        key_line(", / .", "Elasticities table page"),
        Line::from(""),
        Line::from("Results stage:"),
        key_line("←/→", "Previous / next page"),
        key_line("g", "Go to page (type number, Enter)"),
        key_line("a s d", "Sort by product / price / cluster (again to reverse)"),
        key_line("v", "Toggle simulated price variants"),
        key_line("e / c", "Export JSON / CSV into the project folder"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
