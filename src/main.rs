use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipwarden::config::{LoggingConfig, WardenConfig};
use ipwarden::ratelimit::RateLimiter;
use ipwarden::service::{AdmissionRequest, AdmissionService};

/// Per-IP admission filter.
///
/// Reads one request per line from stdin, either a bare remote address or a
/// JSON object `{"remote_addr": "...", "headers": {...}}`, and writes one JSON
/// decision per line to stdout.
#[derive(Parser, Debug)]
#[command(name = "ipwarden", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides the configured level (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Refuse to start if a whitelist or blacklist entry is malformed
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = WardenConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.json_logs;

    init_tracing(&config.logging);

    info!("Starting Ipwarden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.rate_limiting.validate() {
        if args.strict {
            return Err(e).context("Invalid rate limiting configuration");
        }
        warn!(error = %e, "Rate limiting configuration has problems, continuing");
    }

    let (rate_limiter, sweeper) = RateLimiter::start(config.rate_limiting.clone());
    info!(
        requests_per_minute = config.rate_limiting.requests_per_minute,
        block_duration_secs = config.rate_limiting.block_duration_secs,
        cleanup_interval_secs = config.rate_limiting.cleanup_interval_secs,
        "Rate limiter initialized"
    );

    let service = AdmissionService::new(rate_limiter, config.service.clone());

    let result = serve_stdin(&service).await;

    sweeper.shutdown().await;
    info!("Ipwarden stopped");
    result
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // stdout carries decisions, so logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Answer admission requests from stdin until EOF or a shutdown signal.
async fn serve_stdin(service: &AdmissionService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = &mut shutdown => break,
        };

        let Some(line) = line else {
            info!("Input closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = if line.starts_with('{') {
            match serde_json::from_str::<AdmissionRequest>(line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed request line");
                    continue;
                }
            }
        } else {
            AdmissionRequest::from_remote_addr(line)
        };

        let decision = service.check(&request);
        let mut out = serde_json::to_vec(&decision)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
