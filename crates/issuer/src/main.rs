//! Certflow - ACME issuance command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use certflow_config::{validate_issuer, validate_polling, CertflowConfig};
use certflow_issuer::{
    build_issuer, Certificate, ChallengeType, FileCredentialStore, InstantClientFactory,
    ReadyNotifier, TracingRecorder,
};

/// Certflow - ACME certificate issuance orchestrator
#[derive(Parser, Debug)]
#[command(name = "certflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTFLOW_CONFIG", global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and exit
    Check,

    /// Create an order for the given domains and solve its challenges
    Order {
        /// Domain to include in the order (repeatable)
        #[arg(short = 'd', long = "domain", required = true)]
        domains: Vec<String>,

        /// Challenge type to use for every domain
        #[arg(long = "challenge", value_parser = parse_challenge_type)]
        challenge: Option<ChallengeType>,

        /// Scope of the certificate
        #[arg(long = "scope", default_value = "default")]
        scope: String,

        /// Name of the certificate
        #[arg(long = "name", default_value = "certflow-cli")]
        name: String,

        /// Address to serve HTTP-01 challenge responses on
        #[arg(long = "http01-listen")]
        http01_listen: Option<SocketAddr>,
    },
}

fn parse_challenge_type(value: &str) -> Result<ChallengeType, String> {
    ChallengeType::parse(value).ok_or_else(|| format!("unsupported challenge type {value:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let path = cli
        .config
        .as_deref()
        .context("No configuration file given (use --config or CERTFLOW_CONFIG)")?;
    let config = CertflowConfig::from_file(path).context("Failed to load configuration file")?;

    match cli.command {
        Commands::Check => check_config(path, &config),
        Commands::Order {
            domains,
            challenge,
            scope,
            name,
            http01_listen,
        } => {
            let mut certificate = Certificate::new(scope, name, domains.clone());
            if let Some(challenge) = challenge {
                certificate = certificate.with_preference(challenge, domains);
            }
            run_order(&config, certificate, http01_listen).await
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

/// Validate configuration and print a summary
fn check_config(path: &str, config: &CertflowConfig) -> Result<()> {
    let acme = validate_issuer(&config.issuer, config.resource_scope())
        .context("Configuration validation failed")?;
    validate_polling(&config.polling)
        .into_result()
        .context("Configuration validation failed")?;

    info!("Configuration test successful:");
    info!("  - issuer: {} ({:?})", config.issuer.name, config.issuer.kind);
    info!("  - server: {}", acme.server);
    info!("  - resource scope: {}", config.resource_scope());
    info!(
        "  - DNS-01 webhook: {}",
        if config.solvers.dns01.webhook.is_some() { "configured" } else { "none" }
    );

    println!("certflow: configuration file {} test is successful", path);
    Ok(())
}

/// Create an order and drive its challenges to completion
async fn run_order(
    config: &CertflowConfig,
    mut certificate: Certificate,
    http01_listen: Option<SocketAddr>,
) -> Result<()> {
    let credentials = Arc::new(FileCredentialStore::new(&config.controller.credentials_root));
    let built = build_issuer(
        config,
        credentials,
        Arc::new(TracingRecorder),
        Arc::new(InstantClientFactory::default()),
    )
    .await
    .context("Failed to build issuer")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let responder_task = match http01_listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind HTTP-01 responder on {addr}"))?;
            Some(tokio::spawn(
                built.responder.clone().serve(listener, cancel.child_token()),
            ))
        }
        None => None,
    };

    let finalizer = ReadyNotifier::new(config.polling.interval(), config.polling.timeout());
    let result = built
        .issuer
        .issue(&cancel, &mut certificate, &finalizer)
        .await;

    cancel.cancel();
    if let Some(task) = responder_task {
        let _ = task.await;
    }

    let order = result.with_context(|| format!("Issuance failed for {}", certificate.key()))?;
    info!(order = %order.url, "Order validated");
    println!("{}", order.url);
    Ok(())
}
