//! Application state for the pricebadge terminal UI
//!
//! The app holds the latest badge published by the update loop, the cache
//! entry it was rendered from, and keyboard-driven flags.

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::watch;
use tracing::warn;

use crate::badge::Badge;
use crate::cache::{CacheEntry, PriceCache};

/// Main application struct managing state and data
pub struct App {
    /// Latest badge published by the update loop
    badge_rx: watch::Receiver<Badge>,
    /// Shared cache, read to show the full price and last update time
    cache: PriceCache,
    /// Cache entry as of the last badge change
    pub last_entry: Option<CacheEntry>,
    /// Asset id shown in the title
    pub asset: String,
    /// Fiat currency shown next to the price
    pub fiat: String,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// Flag to show help overlay
    pub show_help: bool,
    /// Flag indicating a manual refresh has been requested
    refresh_requested: bool,
}

impl App {
    pub fn new(
        badge_rx: watch::Receiver<Badge>,
        cache: PriceCache,
        asset: impl Into<String>,
        fiat: impl Into<String>,
    ) -> Self {
        let mut app = Self {
            badge_rx,
            cache,
            last_entry: None,
            asset: asset.into(),
            fiat: fiat.into(),
            should_quit: false,
            show_help: false,
            refresh_requested: false,
        };
        app.reload_entry();
        app
    }

    /// The badge currently displayed
    pub fn badge(&self) -> Badge {
        self.badge_rx.borrow().clone()
    }

    /// Whether the update loop has rendered anything yet
    pub fn is_loading(&self) -> bool {
        self.badge_rx.borrow().text.is_empty()
    }

    /// Time of the last successful fetch in the local timezone
    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.last_entry
            .and_then(|entry| entry.updated_at())
            .map(|utc| utc.with_timezone(&Local))
    }

    /// Picks up a newly published badge, re-reading the cache when it changed
    ///
    /// Returns `true` if the badge changed since the last call.
    pub fn sync(&mut self) -> bool {
        match self.badge_rx.has_changed() {
            Ok(true) => {
                self.badge_rx.borrow_and_update();
                self.reload_entry();
                true
            }
            _ => false,
        }
    }

    fn reload_entry(&mut self) {
        match self.cache.read() {
            Ok(entry) => self.last_entry = entry,
            Err(e) => warn!(error = %e, "could not read cache for display"),
        }
    }

    /// Returns and clears the pending manual refresh request
    pub fn take_refresh_request(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    /// Handles a keyboard event
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        // Help overlay intercepts all keys when shown
        if self.show_help {
            if matches!(
                key_event.code,
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                self.show_help = false;
            }
            return;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => {
                self.refresh_requested = true;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
            }
            _ => {}
        }
    }
}
