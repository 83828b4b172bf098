// main.rs

mod app;
mod config;
mod daemon;
mod error;
mod live;
mod reminder;
mod remote;
mod store;
mod sync;
mod todo;
mod tui;

use crate::app::App;
use crate::config::{AppConfig, AppDirs, load_config, save_config};
use crate::daemon::{DesktopAlarms, DesktopNotifier};
use crate::reminder::ReminderScheduler;
use crate::remote::HttpRemoteSource;
use crate::store::{JsonFilePersistence, TaskStore};
use crate::sync::SyncedTaskView;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "todo-reminder.log";

// The terminal belongs to the TUI, so logs go to a file.
fn init_logging(dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("todo_reminder=info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

fn load_or_create_config(dirs: &AppDirs) -> AppConfig {
    let path = dirs.config_path();
    let config = load_config(&path).unwrap_or_else(|e| {
        warn!(error = %e, path = %path.display(), "using default config");
        AppConfig::default()
    });
    if !path.exists() {
        if let Err(e) = save_config(&path, &config) {
            warn!(error = %e, "failed to write default config");
        }
    }
    config.apply_env()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dirs = AppDirs::discover()?;
    std::fs::create_dir_all(&dirs.data_dir)?;
    let _log_guard = init_logging(&dirs.data_dir);

    let config = load_or_create_config(&dirs);
    let data_path = dirs.data_file(&config);
    info!(data = %data_path.display(), remote = %config.remote_base_url, "starting");

    let store = Arc::new(TaskStore::open(Box::new(JsonFilePersistence::new(&data_path)))?);
    let source = HttpRemoteSource::new(&config.remote_base_url, config.request_timeout())?;
    let view = Arc::new(SyncedTaskView::new(&store, Box::new(source)));

    let alarms = Arc::new(DesktopAlarms::start(Arc::new(DesktopNotifier)));
    let scheduler = Arc::new(ReminderScheduler::new(alarms.clone()));
    let rearmed = scheduler.rearm(&store.snapshot());
    info!(rearmed, "pending reminders restored");

    let mut app = App::new(store, view, scheduler);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the TUI event loop (blocks until exit)
    let res = tui::run_app(&mut terminal, &mut app);

    // Restore terminal state
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let pending = alarms.pending();
    if !pending.is_empty() {
        info!(count = pending.len(), "dropping pending reminders on exit");
    }
    alarms.shutdown();

    if let Err(err) = res {
        eprintln!("Application error: {}", err);
    }

    Ok(())
}
