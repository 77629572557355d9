use crate::detector::Detector;
use crate::error::PipelineError;
use crate::mapping::FrameResult;
use crate::processor::{FrameProcessor, PipelineState, StateCell};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use preprocess::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames accepted by `submit`.
    pub submitted: u64,
    /// Pending frames replaced by a newer one before processing started.
    pub superseded: u64,
    /// Frames rejected because the pipeline was shut down.
    pub rejected: u64,
    pub processed: u64,
    pub failed: u64,
    /// Results handed to the result channel.
    pub delivered: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    superseded: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

struct Metrics {
    duration: Histogram<f64>,
    frames: Counter<u64>,
    superseded: Counter<u64>,
    failed: Counter<u64>,
    detections: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.001, 0.002, 0.005, 0.01, 0.015, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.5,
    ];

    Metrics {
        duration: meter
            .f64_histogram("pipeline_frame_duration_seconds")
            .with_description("Time to process a single frame (convert + transform + detect + map)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        frames: meter
            .u64_counter("pipeline_frames_total")
            .with_description("Total frames processed")
            .build(),
        superseded: meter
            .u64_counter("pipeline_frames_superseded_total")
            .with_description("Pending frames dropped in favour of a newer one")
            .build(),
        failed: meter
            .u64_counter("pipeline_frames_failed_total")
            .with_description("Frames dropped because a stage failed")
            .build(),
        detections: meter
            .u64_counter("pipeline_detections_total")
            .with_description("Total detections delivered")
            .build(),
    }
}

/// Single-slot, newest-wins handoff between producer and worker.
struct Mailbox {
    pending: Option<Frame>,
    accepting: bool,
    stop: bool,
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    ready: Condvar,
    counters: Counters,
    metrics: Metrics,
    state: StateCell,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting frames and hand back anything still pending.
    fn close(&self) -> Option<Frame> {
        let mut mailbox = self.lock();
        mailbox.accepting = false;
        mailbox.stop = true;
        self.ready.notify_all();
        mailbox.pending.take()
    }
}

/// Feeds frames to one dedicated worker thread that owns a
/// [`FrameProcessor`].
///
/// At most one frame is in flight. A frame submitted while another is
/// pending replaces it, and the replaced frame is released at once, so the
/// producer never blocks and never queues. Results are posted to an
/// unbounded channel; the worker never waits on the consumer.
pub struct FramePipeline {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FramePipeline {
    pub fn start<D>(
        processor: FrameProcessor<D>,
        results: UnboundedSender<FrameResult>,
    ) -> Result<Self, PipelineError>
    where
        D: Detector + 'static,
    {
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox {
                pending: None,
                accepting: true,
                stop: false,
            }),
            ready: Condvar::new(),
            counters: Counters::default(),
            metrics: init_metrics("inference"),
            state: processor.state_cell(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || run_worker(processor, worker_shared, results))
            .map_err(PipelineError::Spawn)?;

        tracing::info!("Frame pipeline started");

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Hand a frame to the worker without waiting for it.
    ///
    /// Fails with [`PipelineError::ShutDown`] once the pipeline stopped
    /// accepting frames; the frame is released either way.
    pub fn submit(&self, frame: Frame) -> Result<(), PipelineError> {
        let superseded = {
            let mut mailbox = self.shared.lock();
            if !mailbox.accepting {
                drop(mailbox);
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(sequence = frame.sequence(), "Rejected frame after shutdown");
                return Err(PipelineError::ShutDown);
            }
            let previous = mailbox.pending.replace(frame);
            self.shared.ready.notify_one();
            previous
        };

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = superseded {
            self.shared.counters.superseded.fetch_add(1, Ordering::Relaxed);
            self.shared.metrics.superseded.add(1, &[]);
            tracing::trace!(sequence = old.sequence(), "Superseded pending frame");
        }

        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.get()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot()
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    /// Stop accepting frames, let the in-flight and already pending frames
    /// finish, then join the worker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut mailbox = self.shared.lock();
            mailbox.accepting = false;
            mailbox.stop = true;
            self.shared.ready.notify_all();
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Frame pipeline worker panicked");
            }
            let stats = self.stats();
            tracing::info!(
                submitted = stats.submitted,
                superseded = stats.superseded,
                processed = stats.processed,
                failed = stats.failed,
                delivered = stats.delivered,
                "Frame pipeline stopped"
            );
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn next_frame(shared: &Shared) -> Option<Frame> {
    let mut mailbox = shared.lock();
    loop {
        if let Some(frame) = mailbox.pending.take() {
            return Some(frame);
        }
        if mailbox.stop {
            return None;
        }
        mailbox = shared
            .ready
            .wait(mailbox)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Closes the mailbox however the worker exits, so a dead worker never
/// leaves `submit` accepting frames nobody will process.
struct WorkerExit<'a> {
    shared: &'a Shared,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.shared.metrics.failed.add(1, &[]);
            tracing::error!("Frame pipeline worker panicked, closing pipeline");
        }
        self.shared.state.set(PipelineState::Idle);
        drop(self.shared.close());
    }
}

fn run_worker<D: Detector>(
    mut processor: FrameProcessor<D>,
    shared: Arc<Shared>,
    results: UnboundedSender<FrameResult>,
) {
    let _exit = WorkerExit { shared: &shared };

    while let Some(frame) = next_frame(&shared) {
        let sequence = frame.sequence();
        let start = Instant::now();

        let outcome = processor.process_with(frame, |result| {
            let detections = result.detections.len() as u64;
            if results.send(result).is_ok() {
                shared.counters.delivered.fetch_add(1, Ordering::Relaxed);
                shared.metrics.detections.add(detections, &[]);
            } else {
                tracing::debug!(sequence, "Result receiver dropped, discarding result");
            }
        });

        match outcome {
            Ok(()) => {
                shared.counters.processed.fetch_add(1, Ordering::Relaxed);
                shared.metrics.frames.add(1, &[]);
                shared.metrics.duration.record(start.elapsed().as_secs_f64(), &[]);
            }
            Err(e) if e.is_fatal() => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                shared.metrics.failed.add(1, &[]);
                tracing::error!(sequence, error = %e, "Fatal pipeline error, stopping worker");
                break;
            }
            Err(e) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                shared.metrics.failed.add(1, &[]);
                tracing::warn!(sequence, error = %e, "Failed to process frame");
            }
        }
    }

    tracing::debug!("Frame pipeline worker exiting");
}
