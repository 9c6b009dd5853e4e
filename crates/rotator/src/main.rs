//! cdm - custom domain certificate manager

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cdm_common::{init_logging, ListenerId};
use cdm_config::Config;
use cdm_rotator::acme::{AcmeClient, AcmeSettings};
use cdm_rotator::cloud::{self, AcmCertificateStore, ElbListenerManager, S3StateStore};
use cdm_rotator::http::{self, AppState, ChallengeProxy};
use cdm_rotator::registry::PgDomainRegistry;
use cdm_rotator::rotation::{
    load_or_bootstrap, ReleasePolicy, RotationScheduler, RotationWorkflow,
};
use cdm_rotator::shutdown;

/// Rotates the TLS certificate of a load balancer listener for custom domains
#[derive(Parser, Debug)]
#[command(name = "cdm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Validate configuration from the environment and exit
    #[arg(short = 't', long = "check-config")]
    check_config: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to read configuration from environment")?;
    init_logging(config.log_format, cli.verbose);

    config.validate().context("Invalid configuration")?;
    if cli.check_config {
        info!(config = ?config, "Configuration is valid");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        acme_directory = %config.acme_directory_url(),
        "Starting custom domain certificate manager"
    );

    let registry = Arc::new(
        PgDomainRegistry::connect(&config)
            .await
            .context("Failed to connect to domain registry")?,
    );

    let sdk_config = cloud::load_sdk_config(&config.aws_region).await;
    let state_store = Arc::new(S3StateStore::new(
        &sdk_config,
        &config.state_bucket,
        &config.state_file_path,
    ));
    let certificates = Arc::new(AcmCertificateStore::new(&sdk_config, &config.aws_region));
    let listener = Arc::new(ElbListenerManager::new(
        &sdk_config,
        &config.aws_region,
        ListenerId::new(&config.listener_arn),
    ));
    let authority = Arc::new(AcmeClient::new(AcmeSettings {
        directory_url: config.acme_directory_url().to_string(),
        email: config.email.clone(),
        challenge_port: config.challenge_server_port,
    }));

    let initial = load_or_bootstrap(state_store.as_ref())
        .await
        .context("Failed to load rotation state")?;

    let workflow = RotationWorkflow::new(
        authority,
        certificates,
        listener,
        state_store.clone(),
        ReleasePolicy {
            poll_interval: config.release_poll_interval(),
            timeout: config.release_timeout(),
        },
    );
    let scheduler = RotationScheduler::new(
        registry.clone(),
        workflow,
        initial,
        config.check_interval(),
        config.escalation,
    );

    let app = http::router(AppState {
        registry,
        state_store,
        rotation: scheduler.handle(),
        challenges: ChallengeProxy::new(config.challenge_upstream())
            .context("Failed to build challenge proxy client")?,
    });
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let tcp = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    let cancel = CancellationToken::new();
    let signals = shutdown::spawn_signal_listener(cancel.clone());
    let mut server = tokio::spawn(http::serve(tcp, app, cancel.clone()));
    let mut rotation = tokio::spawn(scheduler.run(cancel.clone()));

    let mut escalated = None;
    let mut scheduler_joined = false;
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = &mut rotation => {
            scheduler_joined = true;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => escalated = Some(e),
                Err(e) => error!(error = %e, "Rotation scheduler task panicked"),
            }
            cancel.cancel();
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
            cancel.cancel();
        }
    }

    info!("Shutting down");
    if !server.is_finished() {
        shutdown::drain("http", server, config.shutdown_grace()).await;
    }
    // A rotation past import must reach persistence, so the scheduler is
    // never aborted. Everything before import returns on cancellation.
    if !scheduler_joined {
        if !rotation.is_finished() {
            info!("Waiting for in-progress rotation to finish");
        }
        match rotation.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => escalated = Some(e),
            Err(e) => error!(error = %e, "Rotation scheduler task panicked"),
        }
    }
    signals.abort();

    if let Some(e) = escalated {
        error!(error = %e, "Exiting after escalated rotation failure");
        bail!(e);
    }

    info!("Shutdown complete");
    Ok(())
}
