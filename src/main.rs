#![forbid(unsafe_code)]

//! `chardev` — device host binary.
//!
//! Registers the device (assigning its major number), publishes the endpoint
//! under its well-known name, serves clients until a shutdown signal, then
//! unregisters.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chardev::device::DeviceRegistry;
use chardev::ipc::server;
use chardev::{AppError, DeviceConfig, LengthConvention, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chardev", about = "Read/write character device host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the name the device is published under.
    #[arg(long)]
    device_name: Option<String>,

    /// Override the reported-count convention.
    #[arg(long, value_enum)]
    length_convention: Option<LengthConvention>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chardev host bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => DeviceConfig::load_from_path(path)?,
        None => DeviceConfig::default(),
    };
    if let Some(name) = args.device_name {
        config.device_name = name;
    }
    if let Some(convention) = args.length_convention {
        config.length_convention = convention;
    }
    config.validate()?;
    info!(
        device = %config.device_name,
        convention = ?config.length_convention,
        "configuration loaded"
    );

    // ── Register the device ─────────────────────────────
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config).map_err(|err| {
        error!(%err, "registering char device failed");
        err
    })?;

    // ── Publish the endpoint ────────────────────────────
    let ct = CancellationToken::new();
    let endpoint = Arc::clone(registration.endpoint());
    let server_handle = match server::spawn_device_server(endpoint, ct.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            error!(%err, "publishing device failed");
            if let Err(unregister_err) = registry.unregister(&registration) {
                warn!(%unregister_err, "cleanup after failed publish");
            }
            return Err(err);
        }
    };

    info!(id = %registration.id(), path = %config.device_path(), "device ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = server_handle.await {
        error!(%err, "device server task failed");
    }

    if let Err(err) = registry.unregister(&registration) {
        warn!(%err, "unregistering device failed");
    }
    info!("chardev host shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
