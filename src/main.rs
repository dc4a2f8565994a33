use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use lightbulb::config::{self, BackendConfig, SyncTuning};
use lightbulb::error::{BackendError, ErrorCode, SyncError, describe_backend_error};
use lightbulb::realtime::RealtimeClient;
use lightbulb::rest::RestClient;
use lightbulb::services::synchronizer::{SyncHandle, Synchronizer};
use lightbulb::state::WidgetState;
use lightbulb::view::View;

const DEFAULT_LOG_FILTER: &str = "lightbulb=warn";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const KEY_HELP: &str = "[t] toggle  [r] reconnect  [q] quit";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(e) => e.error_code(),
            Self::Sync(e) => e.error_code(),
            Self::Stdin(_) => "E_STDIN",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lightbulb", about = "A lightbulb shared by everyone, synced in real time")]
struct Cli {
    /// Supabase project URL (falls back to NEXT_PUBLIC_SUPABASE_URL).
    #[arg(long, env = "SUPABASE_URL")]
    url: Option<String>,

    /// Supabase anon key (falls back to NEXT_PUBLIC_SUPABASE_ANON_KEY).
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Show the bulb and keep it in sync (default).
    Watch,
    /// Print the current state once.
    Status,
    /// Flip the bulb once and print the result.
    Toggle,
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, code = e.code(), "lightbulb exited with error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let backend = match BackendConfig::from_env_with(cli.url, cli.anon_key) {
        Ok(backend) => backend,
        Err(e) => {
            println!("{}", View::ConfigurationError(&e).render());
            return Err(SyncError::Configuration(e).into());
        }
    };
    info!(url = %backend.url, table = %backend.table, row_id = backend.row_id, "backend configured");
    let rest = RestClient::new(&backend).inspect_err(print_connection_error)?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => run_watch(&backend, SyncTuning::from_env(), rest).await,
        Command::Status => run_status(&rest).await,
        Command::Toggle => run_toggle(&rest).await,
    }
}

async fn run_status(rest: &RestClient) -> Result<(), CliError> {
    let row = rest.fetch_row().await.inspect_err(print_connection_error)?;
    println!("{}", light_line(row.value));
    Ok(())
}

async fn run_toggle(rest: &RestClient) -> Result<(), CliError> {
    let current = rest.fetch_row().await.inspect_err(print_connection_error)?;
    let updated = rest.update_row(!current.value).await.map_err(|e| {
        println!("Error toggling lightbulb: {}", describe_backend_error(&e));
        e
    })?;
    println!("{}", light_line(updated.value));
    Ok(())
}

async fn run_watch(backend: &BackendConfig, tuning: SyncTuning, rest: RestClient) -> Result<(), CliError> {
    println!("{CLEAR_SCREEN}{}", View::Loading.render());

    let realtime = RealtimeClient::new(backend, &tuning);
    let mut handle = match Synchronizer::new(Arc::new(rest), Arc::new(realtime), tuning).start().await {
        Ok(handle) => handle,
        Err(SyncError::Connection(e)) => {
            print_connection_error(&e);
            return Err(SyncError::Connection(e).into());
        }
        Err(e) => return Err(e.into()),
    };
    draw(&handle.state());

    let result = watch_loop(&mut handle).await;
    handle.shutdown().await;
    result
}

async fn watch_loop(handle: &mut SyncHandle) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = handle.changed() => match changed {
                Ok(state) => draw(&state),
                Err(_) => return Ok(()),
            },
            line = lines.next_line() => {
                let Some(input) = line? else {
                    return Ok(());
                };
                match input.trim() {
                    "t" => {
                        let commands = handle.commands();
                        tokio::spawn(async move {
                            match commands.toggle().await {
                                Ok(_) => {}
                                Err(e @ SyncError::Busy) => {
                                    warn!(error = %e, code = e.error_code(), retryable = e.retryable(), "toggle ignored");
                                }
                                // The synchronizer has already logged the write failure and shows the banner.
                                Err(e) => debug!(error = %e, code = e.error_code(), "toggle not applied"),
                            }
                        });
                    }
                    "r" => {
                        let commands = handle.commands();
                        tokio::spawn(async move {
                            if let Err(e) = commands.reconnect().await {
                                debug!(error = %e, code = e.error_code(), retryable = e.retryable(), "reconnect did not restore realtime");
                            }
                        });
                    }
                    "q" => return Ok(()),
                    "" => {}
                    other => debug!(input = other, "unrecognized key"),
                }
            }
        }
    }
}

fn draw(state: &WidgetState) {
    println!("{CLEAR_SCREEN}{}\n\n{KEY_HELP}", View::Ready(state).render());
}

fn print_connection_error(e: &BackendError) {
    println!("{}", View::ConnectionError(&describe_backend_error(e)).render());
}

fn light_line(on: bool) -> &'static str {
    if on { "The light is ON!" } else { "The light is OFF!" }
}
