use anyhow::Result;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::{MotionConfig, OcrConfig, PipelineConfig};
use crate::logfile::FrameBlock;
use crate::motion::MotionGate;
use crate::ocr::{binarize, EngineFactory, LineFilter};
use crate::video::{Frame, FrameSource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking worker never leaves the map half-written
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// OCR results keyed by frame index, shared by the workers of a run.
#[derive(Debug, Default)]
pub struct ResultStore {
    frames: Mutex<BTreeMap<u64, FrameBlock>>,
    processed: Mutex<u64>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: FrameBlock) {
        lock(&self.frames).insert(block.frame, block);
    }

    pub fn set_processed(&self, frames: u64) {
        *lock(&self.processed) = frames;
    }

    pub fn processed(&self) -> u64 {
        *lock(&self.processed)
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the store in ascending frame order.
    pub fn take_sorted(&self) -> Vec<FrameBlock> {
        std::mem::take(&mut *lock(&self.frames))
            .into_values()
            .collect()
    }
}

/// Counters for one dispatcher run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub batches: u64,
}

/// Runs motion gating, OCR and line filtering over a frame source in
/// batches of at most `workers` frames.
pub struct Dispatcher {
    factory: Arc<dyn EngineFactory>,
    filter: LineFilter,
    ocr: OcrConfig,
    motion: MotionConfig,
    workers: usize,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn EngineFactory>, config: &PipelineConfig) -> Self {
        Self {
            factory,
            filter: LineFilter::new(&config.filter),
            ocr: config.ocr.clone(),
            motion: config.motion.clone(),
            workers: config.worker_count(),
        }
    }

    /// Pull every frame from `source`, OCR the ones the motion gate admits,
    /// and record surviving lines in `store`.
    ///
    /// A batch is only formed once the previous one has fully finished.
    pub async fn run<S: FrameSource>(
        &self,
        source: &mut S,
        store: &Arc<ResultStore>,
    ) -> Result<DispatchStats> {
        let total = source.info().total_frames;
        let mut gate = MotionGate::new(self.motion.clone());
        let mut stats = DispatchStats::default();

        info!(
            "Processing {} frames at {:.2} FPS using {} workers",
            total,
            source.info().fps,
            self.workers
        );

        loop {
            let mut batch = Vec::with_capacity(self.workers);
            let mut exhausted = false;
            while batch.len() < self.workers {
                match source.next_frame()? {
                    Some(frame) => {
                        stats.frames_read += 1;
                        if gate.admit(&frame.pixels) {
                            batch.push(frame);
                        }
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                stats.frames_sampled += batch.len() as u64;
                stats.batches += 1;
                self.run_batch(batch, store).await;
            }

            store.set_processed(stats.frames_read);
            let percent = if total > 0 {
                (store.processed() * 100 / total).min(100)
            } else {
                100
            };
            info!(
                "Progress: {}% ({}/{} frames, {} sampled)",
                percent,
                store.processed(),
                total,
                stats.frames_sampled
            );

            if exhausted {
                break;
            }
        }

        info!(
            "OCR complete: {}/{} sampled frames contain combat lines",
            store.len(),
            stats.frames_sampled
        );
        Ok(stats)
    }

    /// OCR every frame of `batch` on its own blocking task and wait for all.
    pub async fn run_batch(&self, batch: Vec<Frame>, store: &Arc<ResultStore>) {
        let tasks = batch.into_iter().map(|frame| {
            let factory = Arc::clone(&self.factory);
            let filter = self.filter.clone();
            let ocr = self.ocr.clone();
            let store = Arc::clone(store);
            tokio::task::spawn_blocking(move || {
                process_frame(factory.as_ref(), &filter, &ocr, frame, &store)
            })
        });

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("OCR task panicked: {}", e);
            }
        }
    }
}

/// One worker: acquire an engine, read the crop, keep combat lines.
///
/// The engine lives exactly as long as this call.
fn process_frame(
    factory: &dyn EngineFactory,
    filter: &LineFilter,
    ocr: &OcrConfig,
    frame: Frame,
    store: &ResultStore,
) {
    let mut engine = match factory.create() {
        Ok(engine) => engine,
        Err(e) => {
            warn!("Frame {}: could not initialize OCR engine: {:#}", frame.index, e);
            return;
        }
    };

    let prepared = binarize(&frame.pixels, ocr);
    let text = match engine.recognize(&prepared) {
        Ok(text) => text,
        Err(e) => {
            warn!("Frame {}: OCR failed: {:#}", frame.index, e);
            return;
        }
    };

    let lines = filter.filter(&text);
    if lines.is_empty() {
        return;
    }
    debug!("Frame {}: {} combat lines", frame.index, lines.len());

    store.insert(FrameBlock {
        frame: frame.index,
        timestamp: frame.timestamp,
        lines,
    });
}
