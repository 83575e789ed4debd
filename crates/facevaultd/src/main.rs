use anyhow::{Context, Result};
use facevault_core::ModelContext;
use facevaultd::{server, Config, FaceService, FaceStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facevaultd starting");

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let detector_path = config.detector_model_path();
    let recognizer_path = config.recognizer_model_path();
    let threads = config.intra_threads;
    let models = tokio::task::spawn_blocking(move || {
        ModelContext::load(&detector_path, &recognizer_path, threads)
    })
    .await?
    .context("failed to load face models")?;

    let store = FaceStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    tracing::info!(db = %config.db_path.display(), "database ready");

    let service = Arc::new(FaceService::new(
        Arc::new(models),
        store,
        config.output_dir.clone(),
    ));
    let app = server::create_app(service, config.body_limit_bytes);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "facevaultd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("facevaultd shutting down");
    Ok(())
}
