//! Tickbook - Main entry point.
//!
//! # Commands
//!
//! - `tickbook serve` (default): run the HTTP/WebSocket server and file watcher
//! - `tickbook checklist`: print checklist completion
//! - `tickbook todos [--sample N]`: print todo counts, a sample and statistics
//!
//! # Configuration
//!
//! See [`tickbook_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! TICKBOOK_NOTES_DIR=~/notes PORT=8080 cargo run --release --bin tickbook
//! TICKBOOK_NOTES_DIR=~/notes cargo run --bin tickbook -- todos --sample 10
//! ```

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tickbook_core::stats::todo_stats_today;
use tickbook_core::{checklist_stats, parse_checklist_file, scan_all_todos, Tally};
use tickbook_server::config::Config;
use tickbook_server::debounce::Debouncer;
use tickbook_server::routes::{create_router, AppState};
use tickbook_server::watcher::{process_changes, NotesWatcher, WatcherError};

/// Capacity of the debounced change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// How long `serve` waits for in-flight requests after a shutdown signal.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of todos printed by `tickbook todos`.
const DEFAULT_SAMPLE: usize = 5;

/// Tickbook - live dashboard for markdown checklists and todos.
#[derive(Parser, Debug)]
#[command(name = "tickbook")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TICKBOOK_NOTES_DIR       Notes directory (default: ~/notes)
    TICKBOOK_CHECKLIST_PATH  Checklist file (default: <notes>/House Checklist.md)
    PORT                     HTTP port (default: 8080)
    TICKBOOK_DEBOUNCE_MS     File event coalescing window (default: 1000)
    TICKBOOK_WATCH           Set to 'false' to disable the file watcher
    RUST_LOG                 Log filter (default: info,tower_http=debug)

EXAMPLES:
    # Run the server
    tickbook

    # Print checklist progress
    tickbook checklist

    # Print ten todos and the todo statistics
    tickbook todos --sample 10
")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP and WebSocket server.
    ///
    /// Watches the notes directory and pushes changes to connected clients.
    Serve,

    /// Print checklist totals and the interior/exterior breakdown.
    Checklist,

    /// Print the todo count, a sample of todos and statistics.
    Todos {
        /// Number of todos to print.
        #[arg(short, long, default_value_t = DEFAULT_SAMPLE)]
        sample: usize,
    },
}

/// Log output style.
#[derive(Debug, Clone, Copy)]
enum LogFormat {
    /// One JSON object per line, for the long-running server.
    Json,
    /// Human-readable output on stderr, for the report commands.
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_server())
        }
        Command::Checklist => run_checklist(),
        Command::Todos { sample } => run_todos(sample),
    }
}

// ============================================================================
// serve
// ============================================================================

async fn run_server() -> Result<()> {
    init_logging(LogFormat::Json);

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        notes_dir = %config.notes_dir.display(),
        checklist = %config.checklist_path.display(),
        watch = config.watch,
        debounce_ms = config.debounce.as_millis(),
        "Tickbook server starting"
    );

    let state = AppState::new(config.clone());

    match state.refresh_todos().await {
        Ok(summary) => info!(
            count = summary.count,
            failures = summary.failures,
            "Initial todo scan complete"
        ),
        Err(err) => warn!(error = %err, "Initial todo scan failed"),
    }

    let watching = if config.watch {
        match start_watching(&config, state.clone()) {
            Ok(watching) => Some(watching),
            Err(err) => {
                warn!(error = %err, "File watcher disabled");
                None
            }
        }
    } else {
        info!("File watcher disabled by configuration");
        None
    };

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    info!(port = config.port, address = %bind_addr, "Server listening");

    let signalled = Arc::new(Notify::new());
    let graceful = {
        let signalled = Arc::clone(&signalled);
        async move {
            shutdown_signal().await;
            signalled.notify_one();
        }
    };
    let server = axum::serve(listener, app).with_graceful_shutdown(graceful);

    match drain_with_deadline(async move { server.await }, signalled, GRACEFUL_SHUTDOWN_TIMEOUT)
        .await
    {
        Ok(true) => info!("Server shutting down gracefully"),
        Ok(false) => warn!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
            "In-flight requests did not finish in time, forcing shutdown"
        ),
        Err(err) => {
            error!(error = %err, "Server error");
            return Err(err).context("Server failed");
        }
    }

    if let Some((watcher, processor)) = watching {
        drop(watcher);
        processor.abort();
        info!("File watcher stopped");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wires notify events through the debouncer into the change processor.
fn start_watching(
    config: &Config,
    state: AppState,
) -> Result<(NotesWatcher, JoinHandle<()>), WatcherError> {
    let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
    let debouncer = Debouncer::new(config.debounce, tx);
    let watcher = NotesWatcher::start(&config.notes_dir, &config.checklist_path, debouncer)?;
    let processor = tokio::spawn(process_changes(rx, state));
    Ok((watcher, processor))
}

/// Drives `server` until it finishes, or until `deadline` has passed since
/// `signalled` was notified.
///
/// Returns `Ok(false)` when the deadline cut the drain short.
async fn drain_with_deadline<F>(
    server: F,
    signalled: Arc<Notify>,
    deadline: Duration,
) -> io::Result<bool>
where
    F: Future<Output = io::Result<()>>,
{
    let expired = async {
        signalled.notified().await;
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        result = server => result.map(|()| true),
        () = expired => Ok(false),
    }
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    info!(
        timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
        "Waiting for in-flight requests to complete"
    );
}

// ============================================================================
// checklist / todos
// ============================================================================

fn run_checklist() -> Result<()> {
    init_logging(LogFormat::Compact);
    let config = Config::from_env().context("Failed to load configuration")?;

    let checklist = parse_checklist_file(&config.checklist_path).with_context(|| {
        format!(
            "Failed to read checklist at {}",
            config.checklist_path.display()
        )
    })?;
    let stats = checklist_stats(&checklist);

    println!("Checklist: {}", config.checklist_path.display());
    println!();
    println!("Total:     {}", format_tally(&stats.overall));
    println!("Interior:  {}", format_tally(&stats.interior));
    println!("Exterior:  {}", format_tally(&stats.exterior));

    if !stats.phases.is_empty() {
        println!();
        println!("Phases:");
        for (title, tally) in &stats.phases {
            println!("  {title}: {}", format_tally(tally));
        }
    }

    Ok(())
}

fn run_todos(sample: usize) -> Result<()> {
    init_logging(LogFormat::Compact);
    let config = Config::from_env().context("Failed to load configuration")?;

    let report = scan_all_todos(&config.notes_dir).with_context(|| {
        format!("Failed to scan notes at {}", config.notes_dir.display())
    })?;

    println!(
        "Found {} todos in {} files under {}",
        report.todos.len(),
        report.file_count(),
        config.notes_dir.display()
    );
    for failure in &report.failures {
        eprintln!("Skipped {}: {}", failure.path.display(), failure.error);
    }

    if sample > 0 && !report.todos.is_empty() {
        println!();
        for todo in report.todos.iter().take(sample) {
            let mark = if todo.completed { 'x' } else { ' ' };
            println!(
                "  [{mark}] {} ({}:{})",
                todo.text, todo.file, todo.line_number
            );
        }
    }

    let stats = todo_stats_today(&report.todos);
    println!();
    println!(
        "Completed:      {}/{} ({:.1}%)",
        stats.completed, stats.total, stats.completion_rate
    );
    println!("Pending:        {}", stats.pending);
    println!("High priority:  {}", stats.high_priority);
    println!("Overdue:        {}", stats.overdue);

    if !stats.by_tag.is_empty() {
        println!();
        println!("Tags:");
        for (tag, tally) in &stats.by_tag {
            println!("  #{tag}: {}", format_tally(tally));
        }
    }

    Ok(())
}

fn format_tally(tally: &Tally) -> String {
    format!(
        "{}/{} ({:.1}%)",
        tally.completed, tally.total, tally.percentage
    )
}

// ============================================================================
// Logging
// ============================================================================

/// Initializes tracing with `RUST_LOG`, falling back to a per-format default.
fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Json => {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

            let json_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_file(false)
                .with_line_number(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .init();
        }
        LogFormat::Compact => {
            // Reports go to stdout; keep stderr quiet unless asked.
            let env_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_stops_waiting_after_the_deadline() {
        let signalled = Arc::new(Notify::new());
        signalled.notify_one();

        let stuck = std::future::pending::<io::Result<()>>();
        let finished = drain_with_deadline(stuck, signalled, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!finished);
    }

    #[tokio::test]
    async fn drain_has_no_deadline_before_the_signal() {
        let signalled = Arc::new(Notify::new());

        let server = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        };
        let finished = drain_with_deadline(server, signalled, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(finished);
    }

    #[tokio::test]
    async fn drain_passes_server_errors_through() {
        let signalled = Arc::new(Notify::new());

        let server = async { Err(io::Error::other("listener closed")) };
        let err = drain_with_deadline(server, signalled, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "listener closed");
    }
}
