//! pricebadge - a periodically refreshed exchange-rate badge
//!
//! Runs the update loop in the background and shows the badge in a small
//! terminal UI, or performs a single update with `--once`.

use std::io;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use pricebadge::app::App;
use pricebadge::badge::Badge;
use pricebadge::cache::{FileStore, MemoryStore, PriceCache, Store};
use pricebadge::cli::{Cli, Config};
use pricebadge::logging;
use pricebadge::price::CoinGeckoClient;
use pricebadge::refresh::{self, RefreshHandle, TokioRetryTimer, WatchBadgeSink};
use pricebadge::scheduler::UpdateScheduler;
use pricebadge::ui;

/// How long to wait for an in-flight update when quitting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Sets up a panic hook that restores the terminal before printing the panic message.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));
}

/// Picks the storage backend: the configured directory, the XDG cache
/// directory, or memory as a last resort
fn open_store(config: &Config) -> (Arc<dyn Store>, Option<PathBuf>) {
    if let Some(dir) = &config.cache_dir {
        return (Arc::new(FileStore::with_dir(dir.clone())), Some(dir.clone()));
    }
    match FileStore::new() {
        Some(store) => {
            let dir = store.dir().to_path_buf();
            (Arc::new(store), Some(dir))
        }
        None => (Arc::new(MemoryStore::new()), None),
    }
}

/// Renders the UI based on the current application state
fn render_ui(frame: &mut ratatui::Frame, app: &App) {
    ui::render_badge_view(frame, app);
    if app.show_help {
        ui::render_help_overlay(frame);
    }
}

async fn run_once(config: &Config, client: CoinGeckoClient, cache: PriceCache) -> ExitCode {
    let (tx, mut rx) = refresh::trigger_channel();
    let (sink, _badge_rx) = WatchBadgeSink::new();
    let mut scheduler = UpdateScheduler::new(
        Arc::new(client),
        cache,
        Arc::new(sink),
        Arc::new(TokioRetryTimer::new(tx)),
    )
    .with_config(config.scheduler);

    let outcome = refresh::run_once(&mut scheduler, &mut rx, config.once_trigger()).await;
    let badge = Badge::from_value(outcome.badge_value());
    println!("{}", badge.text);

    if badge.is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_tui(
    config: &Config,
    client: CoinGeckoClient,
    cache: PriceCache,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = refresh::trigger_channel();
    let (sink, badge_rx) = WatchBadgeSink::new();
    let scheduler = UpdateScheduler::new(
        Arc::new(client),
        cache.clone(),
        Arc::new(sink),
        Arc::new(TokioRetryTimer::new(tx.clone())),
    )
    .with_config(config.scheduler);
    let handle = RefreshHandle::spawn(scheduler, (tx, rx), config.refresh.clone());

    setup_panic_hook();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(badge_rx, cache, config.asset.clone(), config.fiat.clone());

    loop {
        app.sync();
        terminal.draw(|f| render_ui(f, &app))?;

        // Poll for keyboard events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.take_refresh_request() && !handle.request_refresh() {
            warn!("update loop is not running, refresh ignored");
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    if tokio::time::timeout(SHUTDOWN_GRACE, handle.shutdown())
        .await
        .is_err()
    {
        warn!("update still in flight at exit");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let (store, store_dir) = open_store(&config);
    if config.once {
        logging::init_stderr();
    } else {
        let log_dir = store_dir.clone().unwrap_or_else(std::env::temp_dir);
        logging::init_file(&log_dir)?;
    }
    match &store_dir {
        Some(dir) => info!(dir = %dir.display(), "using file cache"),
        None => warn!("no cache directory available, prices will not persist"),
    }

    let cache = PriceCache::new(store);
    let client = CoinGeckoClient::new(config.asset.clone(), config.fiat.clone())
        .with_endpoint(config.endpoint.clone());

    if config.once {
        return Ok(run_once(&config, client, cache).await);
    }

    run_tui(&config, client, cache).await?;
    Ok(ExitCode::SUCCESS)
}
