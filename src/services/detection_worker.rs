use crate::debug_if_enabled;
use crate::error::{Result, ScopeError};
use crate::scope_error;
use crate::services::capture::{CaptureBackend, CaptureSource};
use crate::services::detector::{Detector, DetectorFactory};
use crate::services::result_table::ResultTable;
use crate::services::stop_signal::StopSignal;
use crate::types::{Detection, Region};
use crate::utils::panic_message;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Lifecycle of one worker: `Starting -> Looping -> Failed | Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Looping,
    Failed(String),
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Failed(_) | WorkerState::Stopped)
    }
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub iterations: AtomicU64,
    pub published: AtomicU64,
    pub last_cycle_us: AtomicU64,
}

/// Everything one worker needs; consumed by [`DetectionWorker::spawn`].
pub struct DetectionWorker {
    region: Region,
    table: Arc<ResultTable>,
    capture: Arc<dyn CaptureBackend>,
    detectors: Arc<dyn DetectorFactory>,
    confidence_threshold: f32,
    min_interval: Duration,
}

impl DetectionWorker {
    pub fn new(
        region: Region,
        table: Arc<ResultTable>,
        capture: Arc<dyn CaptureBackend>,
        detectors: Arc<dyn DetectorFactory>,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            region,
            table,
            capture,
            detectors,
            confidence_threshold,
            min_interval: Duration::ZERO,
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Start the worker thread. Detector loading happens on that thread;
    /// use [`WorkerHandle::wait_started`] to learn whether it succeeded.
    pub fn spawn(self) -> Result<WorkerHandle> {
        let region = self.region;
        let (state_tx, state_rx) = watch::channel(WorkerState::Starting);
        let stop = Arc::new(StopSignal::new());
        let stats = Arc::new(WorkerStats::default());

        let thread = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name(format!("detect-region-{}", region.id))
                .spawn(move || self.run(state_tx, stop, stats))?
        };

        info!("Worker for {} spawned", region);

        Ok(WorkerHandle {
            region,
            state: state_rx,
            stop,
            stats,
            thread: Some(thread),
        })
    }

    fn run(self, state: watch::Sender<WorkerState>, stop: Arc<StopSignal>, stats: Arc<WorkerStats>) {
        let region_id = self.region.id;

        let mut detector = match contain_panic(region_id, || self.detectors.load(&self.region)) {
            Ok(detector) => detector,
            Err(e) => {
                error!("Region {}: detector failed to load: {}", region_id, e);
                state.send_replace(WorkerState::Failed(e.to_string()));
                return;
            }
        };

        let mut capture = match contain_panic(region_id, || self.capture.open()) {
            Ok(capture) => capture,
            Err(e) => {
                error!("Region {}: capture failed to open: {}", region_id, e);
                state.send_replace(WorkerState::Failed(e.to_string()));
                return;
            }
        };

        state.send_replace(WorkerState::Looping);
        let outcome = contain_panic(region_id, || {
            self.detection_loop(detector.as_mut(), capture.as_mut(), &stop, &stats)
        });

        // capture and model are released before anyone sees a terminal state
        drop(capture);
        drop(detector);

        let final_state = match outcome {
            Ok(()) | Err(ScopeError::SlotSealed(_)) => {
                info!("Region {}: worker stopped", region_id);
                WorkerState::Stopped
            }
            Err(e) => {
                error!("Region {}: worker terminated: {}", region_id, e);
                WorkerState::Failed(e.to_string())
            }
        };
        state.send_replace(final_state);
    }

    fn detection_loop(
        &self,
        detector: &mut dyn Detector,
        capture: &mut dyn CaptureSource,
        stop: &StopSignal,
        stats: &WorkerStats,
    ) -> Result<()> {
        while !stop.is_stopped() {
            let started = Instant::now();
            let detections = detect_once(&self.region, detector, capture, self.confidence_threshold)?;

            if stop.is_stopped() {
                break;
            }
            let count = detections.len();
            self.table.write(self.region.id, detections)?;

            let elapsed = started.elapsed();
            stats.iterations.fetch_add(1, Ordering::Relaxed);
            stats.published.fetch_add(count as u64, Ordering::Relaxed);
            stats.last_cycle_us.store(elapsed.as_micros() as u64, Ordering::Relaxed);
            debug_if_enabled!(
                "Region {}: published {} detections in {:?}",
                self.region.id,
                count,
                elapsed
            );

            if !self.min_interval.is_zero() && stop.wait_timeout(self.min_interval.saturating_sub(elapsed)) {
                break;
            }
        }
        Ok(())
    }
}

/// Run `f`, turning a panic into `WorkerRuntime` for `region_id`.
fn contain_panic<T>(region_id: u32, f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(ScopeError::WorkerRuntime {
            region_id,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

/// One capture + inference pass for `region`, boxes lifted into screen space.
pub fn detect_once(
    region: &Region,
    detector: &mut dyn Detector,
    capture: &mut dyn CaptureSource,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let frame = capture.grab(&region.rect)?;
    let image = frame.to_rgb()?;

    let raw = catch_unwind(AssertUnwindSafe(|| detector.detect(&image, confidence_threshold)))
        .map_err(|p| scope_error!(detector, "detector panicked: {}", panic_message(p.as_ref())))??;

    Ok(raw
        .into_iter()
        .map(|raw| Detection::from_raw(raw, region))
        .collect())
}

/// Owner-side view of a running worker.
pub struct WorkerHandle {
    region: Region,
    state: watch::Receiver<WorkerState>,
    stop: Arc<StopSignal>,
    stats: Arc<WorkerStats>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait until the worker leaves `Starting`. A start failure is returned as `WorkerStart`.
    pub async fn wait_started(&mut self) -> Result<()> {
        let state = self
            .state
            .wait_for(|s| *s != WorkerState::Starting)
            .await
            .map(|s| s.clone())
            .map_err(|_| scope_error!(internal, "worker {} vanished", self.region.id))?;

        match state {
            WorkerState::Failed(reason) => Err(ScopeError::WorkerStart {
                region_id: self.region.id,
                reason,
            }),
            _ => Ok(()),
        }
    }

    pub fn signal_stop(&self) {
        self.stop.stop();
    }

    /// Wait up to `timeout` for a terminal state. Returns the last observed state.
    pub async fn wait_terminated(&mut self, timeout: Duration) -> WorkerState {
        let waited = tokio::time::timeout(timeout, self.state.wait_for(|s| s.is_terminal()))
            .await
            .map(|r| r.map(|s| s.clone()));
        match waited {
            Ok(Ok(state)) => {
                if let Some(thread) = self.thread.take_if(|t| t.is_finished()) {
                    let _ = thread.join();
                }
                state
            }
            Ok(Err(_)) => self.state(),
            Err(_) => {
                warn!(
                    "Region {}: worker did not stop within {:?}, detaching it",
                    self.region.id, timeout
                );
                self.state()
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}
