use super::compose::compose_frame;
use crate::error::Result;
use crate::scope_error;
use crate::services::capture::{CaptureBackend, CaptureSource};
use crate::services::display::DisplaySurface;
use crate::services::result_table::ResultTable;
use crate::services::stop_signal::StopSignal;
use crate::trace_if_enabled;
use crate::utils::panic_message;
use crate::types::Rect;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RendererStats {
    pub frames: AtomicU64,
    pub errors: AtomicU64,
}

/// Draws every published detection onto one capture of the whole window.
pub struct CompositeRenderer {
    window: Rect,
    table: Arc<ResultTable>,
    capture: Arc<dyn CaptureBackend>,
    surface: Arc<dyn DisplaySurface>,
    frame_interval: Duration,
    box_thickness: u32,
}

impl CompositeRenderer {
    pub fn new(
        window: Rect,
        table: Arc<ResultTable>,
        capture: Arc<dyn CaptureBackend>,
        surface: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self {
            window,
            table,
            capture,
            surface,
            frame_interval: Duration::from_millis(33),
            box_thickness: 2,
        }
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    pub fn with_box_thickness(mut self, box_thickness: u32) -> Self {
        self.box_thickness = box_thickness;
        self
    }

    pub fn spawn(self) -> Result<RendererHandle> {
        let stop = Arc::new(StopSignal::new());
        let stats = Arc::new(RendererStats::default());
        let (done_tx, done_rx) = watch::channel(false);

        {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("composite-renderer".to_string())
                .spawn(move || {
                    let _done = DoneGuard(done_tx);
                    self.run(&stop, &stats);
                })?;
        }

        Ok(RendererHandle {
            stop,
            stats,
            done: done_rx,
        })
    }

    fn run(self, stop: &StopSignal, stats: &RendererStats) {
        info!("Renderer started for window {}", self.window);
        let mut capture: Option<Box<dyn CaptureSource>> = None;
        let mut sequence = 0u64;

        while !stop.is_stopped() {
            let started = Instant::now();

            let rendered = catch_unwind(AssertUnwindSafe(|| self.render_once(&mut capture, sequence + 1)))
                .unwrap_or_else(|payload| {
                    Err(scope_error!(render, "render pass panicked: {}", panic_message(payload.as_ref())))
                });

            match rendered {
                Ok(()) => {
                    sequence += 1;
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Render iteration failed: {}", e);
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    // next iteration starts from a fresh capture handle
                    capture = None;
                }
            }

            if stop.wait_timeout(self.frame_interval.saturating_sub(started.elapsed())) {
                break;
            }
        }

        drop(capture);
        info!(
            "Renderer stopped after {} frames ({} errors)",
            stats.frames.load(Ordering::Relaxed),
            stats.errors.load(Ordering::Relaxed)
        );
    }

    fn render_once(&self, capture: &mut Option<Box<dyn CaptureSource>>, sequence: u64) -> Result<()> {
        let source = match capture {
            Some(source) => source,
            None => capture.insert(self.capture.open()?),
        };

        let frame = source.grab(&self.window)?;
        let slots = self.table.read_all();
        let detections = slots.iter().flat_map(|(_, slot)| slot.iter());

        let composite = compose_frame(
            &frame,
            &self.window,
            detections,
            self.box_thickness,
            self.surface.size(),
            self.surface.layout(),
            sequence,
        )?;
        trace_if_enabled!(
            "Composite #{} {}x{} at +{}+{}",
            sequence,
            composite.image.width,
            composite.image.height,
            composite.offset_x,
            composite.offset_y
        );

        self.surface.present(Arc::new(composite))
    }
}

/// Reports the render thread as finished on every exit path, unwinding included.
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

pub struct RendererHandle {
    stop: Arc<StopSignal>,
    stats: Arc<RendererStats>,
    done: watch::Receiver<bool>,
}

impl RendererHandle {
    pub fn signal_stop(&self) {
        self.stop.stop();
    }

    pub fn stats(&self) -> &RendererStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// True if the render loop exited within `timeout`.
    pub async fn wait_finished(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.done.wait_for(|done| *done)).await {
            Ok(Ok(_)) => true,
            // sender dropped: the thread is gone either way
            Ok(Err(_)) => true,
            Err(_) => {
                warn!("Renderer did not stop within {:?}", timeout);
                false
            }
        }
    }
}

impl Drop for RendererHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}
