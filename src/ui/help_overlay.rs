//! Key help modal drawn over the badge view

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Keys handled by `App::handle_key`, in display order
const KEYS: [(&str, &str); 3] = [
    ("r", "Fetch the price now"),
    ("?", "Show or hide this help"),
    ("q, Esc", "Quit"),
];

const WIDTH: u16 = 44;

pub fn render(frame: &mut Frame) {
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = Vec::with_capacity(KEYS.len() + 4);
    lines.push(Line::from(Span::styled(
        "Keys",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.extend(KEYS.iter().map(|(key, action)| {
        Line::from(vec![
            Span::styled(format!(" {:<8}", key), Style::default().fg(Color::Yellow)),
            Span::raw(*action),
        ])
    }));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Failed requests are retried once.",
        dim,
    )));

    // Two rows of border on top of the content
    let height = lines.len() as u16 + 2;
    let area = centered(frame.area(), WIDTH, height);

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// A `width` x `height` rect centred in `outer`, clamped to fit
fn centered(outer: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(outer.width);
    let height = height.min(outer.height);
    Rect::new(
        outer.x + (outer.width - width) / 2,
        outer.y + (outer.height - height) / 2,
        width,
        height,
    )
}
