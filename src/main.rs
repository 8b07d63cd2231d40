use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sitegate::config::SitegateConfig;
use sitegate::edge::{default_routes, EdgeServer, EdgeState};
use sitegate::ratelimit::{AdmissionController, Reaper, WindowStore};

/// Per-IP admission control and security headers for a multi-tenant site builder.
#[derive(Parser, Debug)]
#[command(name = "sitegate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Sitegate admission gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => SitegateConfig::from_file(path)?,
        None => SitegateConfig::from_env()?,
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    config.validate()?;
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let policies = config.route_policies()?;
    info!(policies = policies.len(), "Policy table loaded");

    let store = Arc::new(WindowStore::with_capacity(config.admission.initial_capacity));
    let controller = Arc::new(AdmissionController::new(store.clone(), policies));

    let reaper = Reaper::new(store, config.admission.reaper_interval()).spawn();

    if let Some(path) = args.config.clone() {
        spawn_reload_task(path, controller.clone());
    }

    let mut state = EdgeState::new(controller, config.security_headers()?);
    state.trust_forwarded_headers = config.server.trust_forwarded_headers;
    state.enforce_https = config.server.enforce_https;
    state.exempt_paths = Arc::new(config.admission.exempt.clone());

    let server = EdgeServer::new(config.server.listen_addr, state);
    let result = server
        .serve_with_shutdown(default_routes(), shutdown_signal())
        .await;

    reaper.stop().await;
    result?;

    info!("Sitegate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Reload the policy table from `path` on every SIGHUP.
///
/// An invalid file is logged and ignored; the running table stays in place.
#[cfg(unix)]
fn spawn_reload_task(path: PathBuf, controller: Arc<AdmissionController>) {
    tokio::spawn(async move {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!(path = %path.display(), "Received SIGHUP, reloading policies");
            match SitegateConfig::from_file(&path).and_then(|config| config.route_policies()) {
                Ok(policies) => controller.replace_policies(policies),
                Err(e) => warn!(error = %e, "Rejected policy reload, keeping current table"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_task(_path: PathBuf, _controller: Arc<AdmissionController>) {}

/// Wait for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
