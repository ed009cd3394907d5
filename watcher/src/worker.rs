use crate::action::Dispatcher;
use crate::capture::{CaptureError, FrameSource};
use crate::corpus::{CorpusIndex, PhotoLibrary};
use crate::matcher::MatchEngine;
use crate::ocr::{recognize_degraded, OcrBackend};
use crate::preprocess;
use snapmatch_common::config::PreprocessConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The capture → extract → match → act loop, run on one dedicated worker
/// task. Cycles are strictly sequential; a slow OCR pass throttles the
/// effective capture rate below the configured interval.
pub struct CaptureLoop {
    interval: Duration,
    source: Box<dyn FrameSource>,
    preprocess: PreprocessConfig,
    ocr: Box<dyn OcrBackend>,
    library: PhotoLibrary,
    engine: MatchEngine,
    dispatcher: Dispatcher,
}

/// Control handle owned by whoever started the loop.
///
/// The running flag transitions true→false exactly once; a stopped loop
/// cannot be restarted — build a fresh `CaptureLoop` instead.
pub struct LoopHandle {
    running: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl LoopHandle {
    /// Ask the worker to stop. Observed cooperatively at the top of its next
    /// iteration; an in-flight cycle always runs to completion.
    pub fn request_stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("stop requested, worker will exit after the in-flight cycle");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until the worker has fully terminated. Returns only after the
    /// in-flight cycle (if any) completed and released its frame.
    pub async fn stopped(self) {
        if let Err(e) = self.worker.await {
            warn!(error = %e, "capture worker terminated abnormally");
        }
        info!("capture loop stopped");
    }
}

impl CaptureLoop {
    pub fn new(
        interval: Duration,
        source: Box<dyn FrameSource>,
        preprocess: PreprocessConfig,
        ocr: Box<dyn OcrBackend>,
        library: PhotoLibrary,
        engine: MatchEngine,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            interval,
            source,
            preprocess,
            ocr,
            library,
            engine,
            dispatcher,
        }
    }

    /// Start the background worker and hand back its control handle.
    pub fn spawn(self) -> LoopHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = tokio::spawn(async move {
            self.run(flag).await;
        });
        LoopHandle { running, worker }
    }

    async fn run(self, running: Arc<AtomicBool>) {
        info!(
            source = self.source.name(),
            interval_ms = self.interval.as_millis() as u64,
            library = %self.library.dir().display(),
            "capture loop running"
        );

        let mut index = CorpusIndex::new();
        let mut seq: u64 = 0;
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.interval).await;
            seq += 1;
            self.run_cycle(seq, &mut index).await;
        }

        info!(cycles = seq, "capture worker exiting");
    }

    /// One cycle. The frame is owned by this function; dropping it at any
    /// exit releases its temporary artifact.
    async fn run_cycle(&self, seq: u64, index: &mut CorpusIndex) {
        let frame = match self.source.acquire(seq).await {
            Ok(frame) => frame,
            Err(e @ CaptureError::Unavailable(_)) => {
                warn!(seq, error = %e, "capture unavailable, skipping cycle");
                return;
            }
            Err(e) => {
                warn!(seq, error = %e, "capture failed, skipping cycle");
                return;
            }
        };

        let bytes = match frame.read_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(seq, error = %e, "failed to read captured frame, skipping cycle");
                return;
            }
        };

        let normalized = match preprocess::normalize(&bytes, &self.preprocess) {
            Ok(img) => img,
            Err(e) => {
                warn!(seq, error = %e, "failed to preprocess captured frame, skipping cycle");
                return;
            }
        };

        let text = recognize_degraded(self.ocr.as_ref(), &normalized).await;
        debug!(seq, chars = text.len(), "extracted text");

        let entries = match self.library.list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(seq, error = %e, "failed to enumerate photo library, skipping cycle");
                return;
            }
        };

        let matches = self
            .engine
            .find_matches(&text, &entries, index, self.ocr.as_ref())
            .await;
        let outcome = self.dispatcher.dispatch(
            &bytes,
            frame.captured_at_ms,
            &text,
            &matches,
            &self.library,
            index,
        );
        debug!(seq, ?outcome, "cycle complete");
    }
}
