use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use idempotency_gate::IdempotencyConfig;
use idempotency_gate::config::{DEFAULT_MIN_KEY_LENGTH, DEFAULT_RECHECK_INTERVAL};
use idempotency_gate::server::{AppState, build_router};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Demo server guarded by Idempotency-Key coordination")]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "IDEMPOTENCY_PORT", default_value_t = 8080)]
    port: u16,

    /// Seconds an entry lives after its last write.
    #[arg(long, env = "IDEMPOTENCY_EXPIRATION_SECS", default_value_t = 30)]
    expiration_secs: u64,

    /// Seconds between sweeps of expired entries.
    #[arg(long, env = "IDEMPOTENCY_CLEANUP_SECS", default_value_t = 60)]
    cleanup_secs: u64,

    /// Minimum accepted key length in bytes.
    #[arg(long, env = "IDEMPOTENCY_MIN_KEY_LENGTH", default_value_t = DEFAULT_MIN_KEY_LENGTH)]
    min_key_length: usize,

    /// Seconds a follower waits for the executor before answering 504.
    #[arg(long, env = "IDEMPOTENCY_WAIT_TIMEOUT_SECS", default_value_t = 30)]
    wait_timeout_secs: u64,
}

impl Cli {
    fn idempotency_config(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            expiration: Duration::from_secs(self.expiration_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_secs),
            min_key_length: self.min_key_length,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idempotency_gate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.idempotency_config();
    tracing::info!(?config, "Starting idempotency gate");

    let state = AppState::new(config);
    let coordinator = state.coordinator().clone();
    let shutdown = CancellationToken::new();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    coordinator.shutdown();
    tracing::info!("Shut down");
    Ok(())
}

/// Resolves on Ctrl-C, or when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    shutdown.cancelled().await;
                }
            }
        }
        _ = shutdown.cancelled() => {}
    }
}
