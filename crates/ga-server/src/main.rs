//! gmail-analyzer: Gmail Analyzer Main Binary
//!
//! Main entry point for the Gmail Analyzer application.
//!
//! Usage:
//!   gmail-analyzer              - Start server mode (HTTP API)
//!   gmail-analyzer --sync       - Run one sync and exit
//!   gmail-analyzer --report [N] - Print top senders and domains
//!   gmail-analyzer --cli        - Start interactive CLI mode
//!   gmail-analyzer --help       - Show help

mod cli;
mod report;

use ga_api::AppState;
use ga_core::{Config, MailSourceProvider, QueryEngine, RecordStore, SyncEngine, SyncReport};
use ga_gmail::GmailProvider;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Server mode (HTTP API)
    Server,
    /// One-shot sync
    Sync,
    /// Top senders/domains report, optionally overriding `analytics.top_n`
    Report(Option<usize>),
    /// Interactive CLI mode
    Cli,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let mode = parse_args(std::env::args().skip(1));

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("gmail-analyzer {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration (gmail-analyzer.toml + environment)
    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting gmail-analyzer...");
    tracing::info!("Database: {}", config.store.db_path);

    let store = Arc::new(
        RecordStore::new(&config.store.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open record store: {}", e))?,
    );
    let provider: Arc<dyn MailSourceProvider> = Arc::new(
        GmailProvider::new(config.gmail.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create Gmail client: {}", e))?,
    );

    match mode {
        RunMode::Server => run_server(config, store, provider).await,
        RunMode::Sync => {
            if let Some(report) = run_sync(&store, provider.as_ref(), &config).await? {
                println!("{}", report.message());
            }
            Ok(())
        }
        RunMode::Report(top_n) => {
            let top_n = top_n.unwrap_or(config.analytics.top_n);
            let analytics = QueryEngine::new(&store).analytics(top_n)?;
            print!("{}", report::render(&analytics, store.count()?));
            Ok(())
        }
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(config, store, provider).await
        }
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

/// Parse command line arguments (without the program name)
fn parse_args<I>(args: I) -> RunMode
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cli" | "-c" => return RunMode::Cli,
            "--sync" | "-s" => return RunMode::Sync,
            "--report" | "-r" => {
                let top_n = args.next_if(|a| a.parse::<usize>().is_ok());
                return RunMode::Report(top_n.and_then(|n| n.parse().ok()));
            }
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("gmail-analyzer - Gmail sender and domain analytics");
    println!();
    println!("Usage:");
    println!("  gmail-analyzer              Start server mode (HTTP API)");
    println!("  gmail-analyzer --sync       Sync new messages once and exit");
    println!("  gmail-analyzer --report [N] Print the top N senders and domains");
    println!("  gmail-analyzer --cli        Start interactive CLI mode");
    println!("  gmail-analyzer --help       Show this help message");
    println!("  gmail-analyzer --version    Show version");
    println!();
    println!("Configuration file: ./gmail-analyzer.toml (optional)");
    println!();
    println!("Environment Variables:");
    println!("  API_PORT               HTTP API port (default: 8000)");
    println!("  CORS_ORIGINS           Comma separated allowed origins (default: http://localhost:3000)");
    println!("  DB_PATH                SQLite database path (default: gmail_analyzer.db)");
    println!("  GMAIL_CLIENT_ID        OAuth client id");
    println!("  GMAIL_CLIENT_SECRET    OAuth client secret");
    println!("  GMAIL_REFRESH_TOKEN    OAuth refresh token");
    println!("  GMAIL_ACCESS_TOKEN     Pre-issued access token (skips refresh)");
    println!("  GMAIL_CREDENTIALS_FILE Credentials JSON file (default: credentials.json)");
    println!("  SYNC_PAGE_SIZE         Message ids per listing call (default: 500)");
    println!("  SYNC_FLUSH_EVERY       Records per commit (default: 100)");
}

/// Run server mode (HTTP API)
async fn run_server(
    config: Config,
    store: Arc<RecordStore>,
    provider: Arc<dyn MailSourceProvider>,
) -> anyhow::Result<()> {
    let api_port = config.api.port;
    let state = AppState::new(config, store, provider);

    let handle = tokio::spawn(async move {
        if let Err(e) = ga_api::start_server(state).await {
            tracing::error!("HTTP API error: {}", e);
        }
    });
    tracing::info!("HTTP API server started on port {}", api_port);
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    handle.abort();
    Ok(())
}

/// Run one sync, stopping early on Ctrl+C.
///
/// Returns `None` when cancelled; batches committed before the signal stay
/// in the store.
pub(crate) async fn run_sync(
    store: &RecordStore,
    provider: &dyn MailSourceProvider,
    config: &Config,
) -> anyhow::Result<Option<SyncReport>> {
    let source = provider.open().await?;
    let engine = SyncEngine::new(store, &config.sync);

    tokio::select! {
        result = engine.run(source.as_ref()) => Ok(Some(result?)),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Sync cancelled; committed batches are kept");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(args(&[])), RunMode::Server);
        assert_eq!(parse_args(args(&["--sync"])), RunMode::Sync);
        assert_eq!(parse_args(args(&["-c"])), RunMode::Cli);
        assert_eq!(parse_args(args(&["--help"])), RunMode::Help);
        assert_eq!(parse_args(args(&["--version"])), RunMode::Version);
        assert_eq!(parse_args(args(&["--unknown"])), RunMode::Server);
    }

    #[test]
    fn test_parse_report_count() {
        assert_eq!(parse_args(args(&["--report"])), RunMode::Report(None));
        assert_eq!(parse_args(args(&["--report", "5"])), RunMode::Report(Some(5)));
        assert_eq!(
            parse_args(args(&["--report", "--cli"])),
            RunMode::Report(None)
        );
    }
}
