//! UI rendering module for pricebadge
//!
//! Terminal rendering with ratatui: the badge screen plus a help overlay.

pub mod badge_view;
pub mod help_overlay;

pub use badge_view::render as render_badge_view;
pub use help_overlay::render as render_help_overlay;
