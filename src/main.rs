mod adapter;
mod backend_client;
mod backend_schema;
mod client_schema;
mod cli;
mod config;
mod console;
mod error;
mod os_family;
mod registry;
mod selector;
mod server;
mod transform;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adapter::{Adapter, GroqAdapter, XaiAdapter};
use backend_client::BackendClient;
use cli::{AdapterKind, Cli};
use config::{Config, ConfigError};
use registry::ToolRegistry;
use server::{AppState, PortProbe};

const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_PORT_OCCUPIED: u8 = 3;
const EXIT_MISSING_CREDENTIAL: u8 = 4;

fn main() -> ExitCode {
    config::load_dotenv();

    let cli = Cli::parse();
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            // tracing is not initialized yet at this point, so this one path
            // prints straight to stderr.
            eprintln!("configuration error: {e}");
            let code = match e {
                ConfigError::MissingCredential { .. } => EXIT_MISSING_CREDENTIAL,
                ConfigError::InvalidAdapter(_) | ConfigError::InvalidPort(_) => EXIT_CONFIG_ERROR,
            };
            return ExitCode::from(code);
        }
    };

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_ansi(false).init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    runtime.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    match server::probe_port(config.port).await {
        PortProbe::Free => {}
        PortProbe::OccupiedByEarlierInstance => {
            eprintln!("port {} is held by an earlier instance of this proxy; stop it first", config.port);
            return ExitCode::from(EXIT_PORT_OCCUPIED);
        }
        PortProbe::OccupiedByOther => {
            eprintln!("port {} is already in use by another process", config.port);
            return ExitCode::from(EXIT_PORT_OCCUPIED);
        }
    }

    let registry = ToolRegistry::new();
    let catalog = config.model_catalog();
    let client = BackendClient::new(config.base_url.clone(), config.credential.clone());

    let adapter: Arc<dyn Adapter> = match config.adapter {
        AdapterKind::Xai => {
            Arc::new(XaiAdapter::new(client, registry, catalog, config.os, config.max_tokens_ceiling))
        }
        AdapterKind::Groq => {
            Arc::new(GroqAdapter::new(client, registry, catalog, config.os, config.max_tokens_ceiling))
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = %config.os,
        adapter = %config.adapter,
        port = config.port,
        tools = adapter.tool_count(),
        "claudeproxy starting"
    );

    let listener = match TcpListener::bind(("127.0.0.1", config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind 127.0.0.1:{}: {e}", config.port);
            return ExitCode::from(EXIT_PORT_OCCUPIED);
        }
    };

    let in_flight = Arc::new(AtomicUsize::new(0));
    let state = AppState { adapter, in_flight: Arc::clone(&in_flight) };
    let router = server::router(state);
    let shutdown = Arc::new(Notify::new());

    let serve_task = tokio::spawn(server::serve(listener, router, Arc::clone(&shutdown)));
    let console_task = tokio::spawn(console::run(Arc::clone(&shutdown)));

    let restart = tokio::select! {
        result = serve_task => {
            if let Err(e) = result {
                warn!(error = %e, "server task panicked");
            }
            console_task.abort();
            false
        }
        result = console_task => {
            shutdown.notify_waiters();
            result.unwrap_or(false)
        }
        _ = wait_for_signal() => {
            info!("received shutdown signal");
            shutdown.notify_waiters();
            false
        }
    };

    console::drain(&in_flight).await;

    if restart {
        info!("restarting");
        exec_self();
    }

    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Re-execs the current binary with the same arguments and environment (§4.7
/// `R` command). Unix-only: `exec` replaces the process image in place so no
/// child process or PID change is observed by a supervisor.
#[cfg(unix)]
fn exec_self() {
    use std::os::unix::process::CommandExt;
    let exe = std::env::current_exe().expect("failed to resolve current executable path");
    let err = std::process::Command::new(exe).args(std::env::args().skip(1)).exec();
    eprintln!("re-exec failed: {err}");
}

#[cfg(not(unix))]
fn exec_self() {
    eprintln!("restart is only supported on unix; exiting instead");
}
