//! Badge screen rendering
//!
//! Draws the badge as a small coloured block in the centre of the terminal,
//! with the full cached price and the time of the last successful update
//! underneath.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::badge::{Badge, BadgeColor};

/// Width of the badge block including borders
const BADGE_WIDTH: u16 = 10;

/// Height of the badge block including borders
const BADGE_HEIGHT: u16 = 3;

/// Converts a badge colour to a terminal colour
pub fn terminal_color(color: BadgeColor) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

/// Renders the main badge screen
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(BADGE_HEIGHT + 3),
            Constraint::Length(1),
        ])
        .split(area);

    render_title(frame, app, chunks[0]);
    render_body(frame, app, chunks[1]);
    render_footer(frame, chunks[2]);
}

fn render_title(frame: &mut Frame, app: &App, area: Rect) {
    let title = Line::from(vec![
        Span::styled(
            " pricebadge ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "{}/{}",
            app.asset,
            app.fiat.to_uppercase()
        )),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

fn render_body(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(BADGE_HEIGHT + 2) / 2),
            Constraint::Length(BADGE_HEIGHT),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    let badge_area = centered_columns(BADGE_WIDTH, rows[1]);
    if app.is_loading() {
        let loading = Paragraph::new("...")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(loading, badge_area);
    } else {
        frame.render_widget(badge_widget(&app.badge()), badge_area);
    }

    let price_line = match app.last_entry {
        Some(entry) => format!("{} {}", entry.price, app.fiat.to_uppercase()),
        None => "no cached price".to_string(),
    };
    frame.render_widget(
        Paragraph::new(price_line).alignment(Alignment::Center),
        rows[2],
    );

    let updated_line = match app.last_updated() {
        Some(time) => format!("updated {}", time.format("%Y-%m-%d %H:%M:%S")),
        None => "never updated".to_string(),
    };
    frame.render_widget(
        Paragraph::new(updated_line)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        rows[3],
    );
}

/// Builds the coloured badge block
fn badge_widget(badge: &Badge) -> Paragraph<'static> {
    let background = terminal_color(badge.color());
    Paragraph::new(Span::styled(
        badge.text.clone(),
        Style::default()
            .fg(Color::White)
            .bg(background)
            .add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
    .style(Style::default().bg(background))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(background)),
    )
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let footer = Line::from(Span::styled(
        " r refresh  ? help  q quit",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(footer), area);
}

/// Horizontally centres a column of `width` inside `area`
fn centered_columns(width: u16, area: Rect) -> Rect {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(area.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(area);
    columns[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::BadgeSink;
    use crate::cache::{MemoryStore, PriceCache};
    use crate::refresh::WatchBadgeSink;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    fn render_to_string(app: &App) -> String {
        let backend = TestBackend::new(60, 16);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_terminal_color_conversion() {
        assert_eq!(terminal_color(BadgeColor::ERROR), Color::Rgb(255, 0, 0));
        assert_eq!(terminal_color(BadgeColor::NEUTRAL), Color::Rgb(0x22, 0x22, 0x22));
    }

    #[test]
    fn test_renders_loading_state() {
        let (_sink, rx) = WatchBadgeSink::new();
        let app = App::new(rx, PriceCache::new(Arc::new(MemoryStore::new())), "monero", "usd");

        let content = render_to_string(&app);

        assert!(content.contains("pricebadge"));
        assert!(content.contains("monero/USD"));
        assert!(content.contains("never updated"));
    }

    #[test]
    fn test_renders_badge_and_price() {
        let (sink, rx) = WatchBadgeSink::new();
        let cache = PriceCache::new(Arc::new(MemoryStore::new()));
        let mut app = App::new(rx, cache.clone(), "monero", "usd");

        cache.write(187.32, 1_700_000_000_000).unwrap();
        sink.set_badge("187", BadgeColor::NEUTRAL);
        app.sync();

        let content = render_to_string(&app);

        assert!(content.contains("187"));
        assert!(content.contains("187.32 USD"));
        assert!(content.contains("updated"));
    }

    #[test]
    fn test_renders_error_badge() {
        let (sink, rx) = WatchBadgeSink::new();
        let mut app = App::new(rx, PriceCache::new(Arc::new(MemoryStore::new())), "monero", "usd");

        sink.set_badge("Err", BadgeColor::ERROR);
        app.sync();

        let content = render_to_string(&app);
        assert!(content.contains("Err"));
    }
}
