//! tokenrelay - call an authenticated JSON backend from the terminal.
//!
//! Sessions persist between runs; an expired access token is refreshed
//! transparently, and a dead session asks the user to log in again.

mod commands;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for daily-rotated log files. Unset means stderr only.
const LOG_DIR_ENV: &str = "TOKENRELAY_LOG_DIR";

#[derive(Parser)]
#[command(name = "tokenrelay", version, about)]
struct Cli {
    /// Backend base URL (overrides config and TOKENRELAY_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        /// Username; defaults to the last one used
        #[arg(short, long)]
        username: Option<String>,
        /// Save the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Forget the stored session
    Logout {
        /// Also delete the saved password
        #[arg(long)]
        forget: bool,
    },
    /// Show whether a session is stored
    Status,
    /// Send a request and print the response envelope
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path relative to the base URL
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Query parameter as key=value, repeatable
        #[arg(short, long = "query")]
        query: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tokenrelay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();
    info!("tokenrelay starting");

    let ctx = commands::Context::open(cli.base_url)?;
    match cli.command {
        Command::Login { username, remember } => ctx.login(username, remember).await,
        Command::Logout { forget } => ctx.logout(forget),
        Command::Status => ctx.status(),
        Command::Request {
            method,
            path,
            data,
            query,
        } => ctx.request(&method, &path, data.as_deref(), &query).await,
    }
}
