//! Dedicated engine thread for CPU-bound extraction and matching.
//!
//! Embedding extraction and gallery comparison never run on the interactive
//! task: requests go over an mpsc channel to one OS thread that owns the
//! image source, the detector, the embedding model, and the store handle.
//! Store writes all happen on this thread, so registration and matching for
//! the same employee are naturally sequenced.

use chrono::Utc;
use clockface_core::{
    CaptureError, DetectionMode, EmbeddingModel, ExtractError, FaceDetector, FaceEmbeddingExtractor,
    FaceEmbeddingRecord, FaceMatch, FaceMatcher, ImageSource, MatchError, MatcherConfig,
};
use clockface_store::{EmbeddingStore, StoreError};
use image::GrayImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),
    #[error("match error: {0}")]
    Match(#[from] MatchError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async tasks to the engine thread.
enum EngineRequest {
    /// Capture one image, extract a probe, match against the gallery.
    Identify {
        mode: DetectionMode,
        reply: oneshot::Sender<Result<Option<FaceMatch>, EngineError>>,
    },
    /// Extract from a supplied reference image and persist the record.
    Register {
        employee_id: String,
        image: GrayImage,
        mode: DetectionMode,
        reply: oneshot::Sender<Result<FaceEmbeddingRecord, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture → extract → match. `Ok(None)` means no candidate cleared the
    /// similarity threshold.
    pub async fn identify(&self, mode: DetectionMode) -> Result<Option<FaceMatch>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Identify { mode, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Extract an embedding from a reference image and overwrite the
    /// employee's stored record.
    pub async fn register(
        &self,
        employee_id: &str,
        image: GrayImage,
        mode: DetectionMode,
    ) -> Result<FaceEmbeddingRecord, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                employee_id: employee_id.to_string(),
                image,
                mode,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
pub fn spawn_engine(
    source: Box<dyn ImageSource + Send>,
    detector: Box<dyn FaceDetector + Send>,
    model: Box<dyn EmbeddingModel + Send>,
    extractor_config: clockface_core::ExtractorConfig,
    matcher_config: MatcherConfig,
    store: Arc<dyn EmbeddingStore>,
) -> EngineHandle {
    let extractor = FaceEmbeddingExtractor::new(detector, model, extractor_config);
    let matcher = FaceMatcher::new(matcher_config);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("clockface-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Identify { mode, reply } => {
                        let result = run_identify(&*source, &extractor, &matcher, &*store, mode);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Register { employee_id, image, mode, reply } => {
                        let result = run_register(&extractor, &*store, &employee_id, &image, mode);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_identify(
    source: &dyn ImageSource,
    extractor: &FaceEmbeddingExtractor<Box<dyn FaceDetector + Send>, Box<dyn EmbeddingModel + Send>>,
    matcher: &FaceMatcher,
    store: &dyn EmbeddingStore,
    mode: DetectionMode,
) -> Result<Option<FaceMatch>, EngineError> {
    let image = source.capture()?;
    let extraction = extractor.extract(&image, mode)?;
    let gallery = store.list_all()?;
    let found = matcher.best_match(&extraction.embedding, &gallery)?;

    match &found {
        Some(m) => tracing::info!(
            employee_id = %m.employee_id,
            score = m.score,
            tier = ?m.tier,
            "probe matched"
        ),
        None => tracing::debug!("probe did not clear threshold"),
    }

    Ok(found)
}

fn run_register(
    extractor: &FaceEmbeddingExtractor<Box<dyn FaceDetector + Send>, Box<dyn EmbeddingModel + Send>>,
    store: &dyn EmbeddingStore,
    employee_id: &str,
    image: &GrayImage,
    mode: DetectionMode,
) -> Result<FaceEmbeddingRecord, EngineError> {
    // Extraction runs first: a failed pipeline must leave the store
    // untouched. On success the put overwrites any previous record, so the
    // store never holds more than one row per employee.
    let extraction = extractor.extract(image, mode)?;

    let record = FaceEmbeddingRecord {
        employee_id: employee_id.to_string(),
        embedding: extraction.embedding,
        crop_ref: uuid::Uuid::new_v4().to_string(),
        extraction_confidence: extraction.confidence,
        registered_at: Utc::now(),
    };
    store.put(&record)?;

    tracing::info!(
        employee_id,
        confidence = record.extraction_confidence,
        "face registered"
    );
    Ok(record)
}
