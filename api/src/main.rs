mod config;
mod handlers;
mod processors;
mod worker;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::processors::Processor;
use crate::worker::{JobQueue, WorkerPool, WorkerStats};
use prbot_auth::AuthContext;
use prbot_github::{GitHubClient, WebhookValidator};

#[derive(Parser, Debug)]
#[command(name = "prbot-api")]
#[command(about = "GitHub App webhook listener that opens and updates pull requests")]
struct Cli {
    /// Environment file holding the App configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Address to listen on, overriding LISTEN_ADDR
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub validator: Arc<WebhookValidator>,
    pub queue: JobQueue,
    pub stats: Arc<WorkerStats>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/github",
            post(handlers::github_webhook).fallback(handlers::github_webhook_invalid_method),
        )
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "prbot_api=debug,prbot_auth=debug,prbot_github=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.env_file)?);

    let auth = AuthContext::bootstrap(
        config.app_id,
        &config.cert_path,
        &config.org_id,
        &config.github_api_base,
    )
    .await?;
    tracing::info!(
        installation_id = auth.installation_id(),
        account = %auth.installation.account.login,
        events = ?auth.installation.events,
        "Successfully initialized GitHub App client"
    );

    let stats = Arc::new(WorkerStats::default());
    let (queue, jobs) = JobQueue::bounded(config.queue_capacity, Arc::clone(&stats));
    let processor = Processor::new(
        Arc::new(GitHubClient::new(Arc::new(auth))),
        config.repo_target(),
    );
    let workers = WorkerPool::spawn(
        jobs,
        Arc::new(processor),
        config.worker_concurrency,
        Arc::clone(&stats),
    );

    let state = AppState {
        validator: Arc::new(WebhookValidator::new(config.webhook_secret.as_bytes())),
        config: Arc::clone(&config),
        queue,
        stats,
    };

    let addr = cli.listen.unwrap_or(config.listen_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router and its queue handle are gone; let the workers finish what
    // was already accepted.
    workers.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}
