use anyhow::{Context, Result};
use clockface_core::{ImageSource, PixelHashModel};
use clockface_store::SqliteStore;
use clockfaced::engine::spawn_engine;
use clockfaced::session::{ContinuousSession, SessionConfig, SessionEvent};
use clockfaced::stubs::{FullFrameDetector, OfflineSource, StaticImageSource};
use clockfaced::{Config, JsonDirectory, RegistrationOrchestrator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("clockfaced starting");

    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let directory = Arc::new(JsonDirectory::load(&config.directory_path)?);

    // CLOCKFACE_CAMERA_IMAGE points the engine at a still image until the
    // platform camera adapter is wired in.
    let camera_image = std::env::var("CLOCKFACE_CAMERA_IMAGE").ok();
    let has_camera = camera_image.is_some();
    let source: Box<dyn ImageSource + Send> = match camera_image {
        Some(path) => Box::new(StaticImageSource::new(path)),
        None => Box::new(OfflineSource),
    };

    let engine = spawn_engine(
        source,
        Box::new(FullFrameDetector),
        Box::new(PixelHashModel::new(config.extractor.embedding_dim)),
        config.extractor.clone(),
        config.matcher.clone(),
        store.clone(),
    );

    let orchestrator = RegistrationOrchestrator::new(
        directory.clone(),
        engine.clone(),
        store.clone(),
        store.clone(),
        config.detection_mode,
    );

    // Refresh the gallery from the directory export on every start.
    let report = orchestrator.reprocess_all().await?;
    let diagnostics = orchestrator.diagnostics()?;
    tracing::info!(
        processed = report.processed,
        total = diagnostics.total_employees,
        pending = diagnostics.pending_registrations,
        "startup registration pass complete"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let session_task = if has_camera {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    SessionEvent::Identified { employee_id, employee_name, score, tier } => {
                        tracing::info!(%employee_id, %employee_name, ?score, ?tier, "clock-in");
                    }
                    SessionEvent::NotRecognized => tracing::info!("not recognized"),
                    SessionEvent::Error { reason } => tracing::warn!(%reason, "session error"),
                    SessionEvent::Cancelled => tracing::info!("prompt cancelled"),
                }
            }
        });

        let session = ContinuousSession::face(
            engine,
            config.detection_mode,
            directory,
            Box::new(event_tx),
            SessionConfig {
                retry_cooldown: config.retry_cooldown,
                success_hold: config.success_hold,
                cancel_restart_delay: config.cancel_restart_delay,
                max_consecutive_errors: config.max_consecutive_errors,
            },
            shutdown_rx,
        );
        Some(tokio::spawn(session.run()))
    } else {
        tracing::info!("no camera configured, identification session disabled");
        None
    };

    tracing::info!("clockfaced ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("clockfaced shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(task) = session_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "session ended with error"),
            Err(err) => tracing::error!(error = %err, "session task panicked"),
        }
    }

    Ok(())
}
