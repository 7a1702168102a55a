// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tunnelsync::{
    cloudflare::CloudflareClient,
    config::Config,
    constants::{
        DEFAULT_API_BASE_URL, DEFAULT_CREDENTIAL_PATH, DEFAULT_REQUEST_TIMEOUT_SECS,
        DEFAULT_SNAPSHOT_PATH, DEFAULT_STATE_PATH, DEFAULT_TUNNEL_DOMAIN,
        DEFAULT_WATCH_INTERVAL_SECS, EXIT_FATAL,
    },
    reconciler::{CycleOutcome, Reconciler},
    route::{FileSnapshotSource, SnapshotSource},
    server,
    state::FileStateStore,
    tunnel::FileCredentialStore,
};
use url::Url;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cloudflare API token with tunnel and DNS edit permissions
    #[arg(long, env = "CF_API_TOKEN", hide_env_values = true)]
    api_token: String,

    #[arg(long, env = "CF_ACCOUNT_ID")]
    account_id: String,

    #[arg(long, env = "CF_ZONE_ID")]
    zone_id: String,

    /// Name of the tunnel to find or create
    #[arg(long, env = "TUNNEL_NAME")]
    tunnel_name: String,

    #[arg(long, env = "CF_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: Url,

    #[arg(long, env = "TUNNEL_DOMAIN", default_value = DEFAULT_TUNNEL_DOMAIN)]
    tunnel_domain: String,

    /// Route snapshot written by the discovery side
    #[arg(long, env = "SNAPSHOT_PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    snapshot_path: PathBuf,

    #[arg(long, env = "STATE_PATH", default_value = DEFAULT_STATE_PATH)]
    state_path: PathBuf,

    /// Where the tunnel token is written for cloudflared
    #[arg(long, env = "CREDENTIAL_PATH", default_value = DEFAULT_CREDENTIAL_PATH)]
    credential_path: PathBuf,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Proxy DNS records through the Cloudflare edge
    #[arg(long, env = "PROXIED", default_value_t = true, action = clap::ArgAction::Set)]
    proxied: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single reconciliation cycle and exit
    Reconcile,
    /// Run reconciliation cycles on a fixed interval until stopped
    Watch {
        #[arg(
            long,
            env = "WATCH_INTERVAL_SECS",
            default_value_t = DEFAULT_WATCH_INTERVAL_SECS,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        interval_secs: u64,

        /// Serve /metrics and /healthz on this address
        #[arg(long, env = "METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
}

impl Args {
    fn config(&self) -> Config {
        Config {
            api_token: self.api_token.clone(),
            account_id: self.account_id.clone(),
            zone_id: self.zone_id.clone(),
            tunnel_name: self.tunnel_name.clone(),
            api_base_url: self.api_base_url.clone(),
            tunnel_domain: self.tunnel_domain.clone(),
            snapshot_path: self.snapshot_path.clone(),
            state_path: self.state_path.clone(),
            credential_path: self.credential_path.clone(),
            request_timeout_secs: self.request_timeout_secs,
            proxied: self.proxied,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("tunnelsync")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match runtime.block_on(async_main(args)) {
        Ok(code) => code,
        Err(e) => {
            error!("tunnelsync failed: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Format: timestamp file:line LEVEL message
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or `text`).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<ExitCode> {
    let config = args.config();
    config.validate().context("Invalid configuration")?;

    info!(
        tunnel_name = %config.tunnel_name,
        api_base_url = %config.api_base_url,
        snapshot_path = %config.snapshot_path.display(),
        state_path = %config.state_path.display(),
        "Starting tunnelsync"
    );

    let client = CloudflareClient::new(
        config.api_base_url.clone(),
        config.api_token.clone(),
        config.request_timeout_secs,
    )
    .context("Failed to build HTTP client")?;

    let reconciler = Reconciler::new(
        Arc::new(client),
        Arc::new(FileStateStore::new(config.state_path.clone())),
        Arc::new(FileCredentialStore::new(config.credential_path.clone())),
        config.reconciler_settings(),
    );
    let source = FileSnapshotSource::new(config.snapshot_path.clone());

    match args.command {
        Command::Reconcile => {
            let outcome = reconciler.run_cycle(&source).await;
            log_fatal(&outcome);
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Command::Watch {
            interval_secs,
            metrics_addr,
        } => {
            if let Some(addr) = metrics_addr {
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("Failed to bind metrics address {addr}"))?;
                tokio::spawn(async move {
                    if let Err(e) = server::serve(listener).await {
                        error!(error = %e, "Metrics server stopped");
                    }
                });
            }
            watch(
                &reconciler,
                &source,
                Duration::from_secs(interval_secs),
                shutdown_signal(),
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run cycles every `interval` until `shutdown` resolves.
///
/// A cycle always runs to completion; ticks missed while it runs are skipped.
/// A pending shutdown is honoured before the next tick.
async fn watch(
    reconciler: &Reconciler,
    source: &dyn SnapshotSource,
    interval: Duration,
    shutdown: impl Future<Output = Result<()>>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    info!(interval = ?interval, "Watching for route changes");

    loop {
        tokio::select! {
            biased;
            result = &mut shutdown => {
                result?;
                info!("Shutdown signal received, stopping");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let outcome = reconciler.run_cycle(source).await;
        log_fatal(&outcome);
    }
}

fn log_fatal(outcome: &CycleOutcome) {
    if let CycleOutcome::Fatal { phase, error, .. } = outcome {
        warn!(
            phase = %phase,
            kind = %error.kind(),
            "Cycle aborted; remote state may be partially applied and will be retried"
        );
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where supported.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    Ok(())
}
