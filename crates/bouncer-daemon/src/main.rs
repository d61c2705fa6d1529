//! bouncer - gatekeeper for Telegram group join requests.
//!
//! Approves join requests from identities verified in the forum, sends one
//! informational message to everyone else and exposes an HTTP endpoint that
//! revokes an identity's membership in every monitored group.
//!
//! # Usage
//!
//! ```bash
//! bouncer --config config/bouncer.yaml
//! bouncer --config /etc/bouncer.yaml --log-level debug --log-json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use bouncer_channels::TelegramClient;
use bouncer_core::{CycleScheduler, Reconciler, ReconcilerConfig, RevocationHandler};
use bouncer_daemon::http;
use bouncer_registry::PgIdentityRegistry;
use bouncer_types::config_loader::{ConfigLoader, LoadedConfig};
use bouncer_types::errors::BouncerError;
use bouncer_types::traits::{IdentityRegistry, PlatformClient};

/// bouncer daemon
#[derive(Parser, Debug)]
#[command(name = "bouncer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/bouncer.yaml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `bouncer_core=debug`
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), BouncerError> {
    let args = Args::parse();
    init_tracing(&args);

    let LoadedConfig { config, templates } = ConfigLoader::load(&args.config)?;
    if !config.enabled {
        info!(config = %args.config.display(), "bouncer is disabled, exiting");
        return Ok(());
    }

    let groups = config.telegram.monitored_groups();
    let platform: Arc<dyn PlatformClient> =
        Arc::new(TelegramClient::from_config(&config.telegram)?);
    let registry: Arc<dyn IdentityRegistry> = Arc::new(PgIdentityRegistry::new(&config.registry)?);

    let reconciler = Reconciler::new(
        Arc::clone(&platform),
        registry,
        templates,
        ReconcilerConfig::from_config(&config),
    );
    let scheduler = CycleScheduler::new(reconciler, config.schedule.poll_interval());
    let revocation = Arc::new(RevocationHandler::new(platform, groups.clone()));

    let listener = TcpListener::bind(&config.http.listen_addr)
        .await
        .map_err(|e| {
            BouncerError::Config(format!(
                "cannot listen on {}: {e}",
                config.http.listen_addr
            ))
        })?;
    info!(
        listen_addr = %config.http.listen_addr,
        groups = groups.len(),
        poll_interval_secs = config.schedule.poll_interval_secs,
        "bouncer started"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let server = tokio::spawn(http::serve(
        listener,
        http::router(revocation),
        stopped(stop_rx.clone()),
    ));
    scheduler.run(stopped(stop_rx)).await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task aborted"),
    }
    info!("bouncer stopped");
    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Resolves once the stop flag is raised.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
