// Main entrypoint for the fleetcore service.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fleetcore::app::App;
use fleetcore::config::{Config, ConfigTrait};
use fleetcore::dedlog;
use fleetcore::metrics;
use fleetcore::shutdown::GracefulShutdown;

const CONFIG_PATH: &str = "cfg/fleetcore.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/fleetcore.cfg.local.yaml";

/// Extra time on top of the scheduler drain for the remaining closers.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(5);

/// fleetcore - job scheduler and tiered cache for the printer fleet backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok((cfg, custom_path));
    }

    match Config::load(CONFIG_PATH_LOCAL) {
        Ok(cfg) => Ok((cfg, PathBuf::from(CONFIG_PATH_LOCAL))),
        Err(_) => {
            let cfg = Config::load(CONFIG_PATH)
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            Ok((cfg, PathBuf::from(CONFIG_PATH)))
        }
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn worker_threads(cfg: &Config) -> usize {
    match cfg.runtime().num_cpus {
        0 => num_cpus::get(),
        n => n,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (cfg, cfg_path) = load_cfg(args.cfg)?;
    configure_logger(&cfg);
    info!(
        component = "config",
        event = "load_success",
        path = ?cfg_path,
        "config loaded"
    );

    let threads = worker_threads(&cfg);
    info!(
        component = "main",
        event = "num_cpus_configured",
        num_cpus = threads,
        "runtime worker threads configured"
    );

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?
        .block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<()> {
    let shutdown_token = CancellationToken::new();

    let dedup_logger_token = shutdown_token.clone();
    tokio::task::spawn(async move {
        dedlog::start_dedup_logger(dedup_logger_token).await;
    });

    if let Some(m) = cfg.metrics().filter(|m| m.enabled) {
        let listen = m.listen.as_deref().unwrap_or("0.0.0.0:9090");
        match metrics::init_exporter(listen) {
            Ok(()) => info!(component = "main", event = "metrics_exporter_started", listen, "prometheus exporter listening"),
            Err(e) => warn!(component = "main", event = "metrics_exporter_failed", error = %e, "metrics endpoint will not be available"),
        }
    }

    let graceful_shutdown = GracefulShutdown::new(
        shutdown_token.clone(),
        cfg.scheduler().shutdown_timeout + SHUTDOWN_MARGIN,
    );

    let app = Arc::new(App::new(shutdown_token.child_token(), cfg).await?);
    app.serve()?;

    let closing = app.clone();
    graceful_shutdown.on_shutdown(async move {
        closing.close().await;
    });

    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e);
    }

    Ok(())
}
