//! pricebadge library
//!
//! Periodically fetches a single exchange rate, keeps the last good value in a
//! persistent cache, and renders it as a compact badge. The state machine in
//! `scheduler` is wired to its collaborators through small port traits so it
//! can run against fakes in tests.

pub mod app;
pub mod badge;
pub mod cache;
pub mod cli;
pub mod logging;
pub mod price;
pub mod refresh;
pub mod scheduler;
pub mod ui;
