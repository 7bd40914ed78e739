//! Session lifecycle: `Idle -> Resolving -> Running -> Stopping -> Idle`.
//!
//! A start request resolves the target window, splits it into regions, gives
//! every region its own detection worker and result slot, then starts the
//! composite renderer. Stopping seals the result table before waiting on the
//! workers, so nothing is published once the session has left `Running`.

use crate::config::Config;
use crate::error::{Result, ScopeError};
use crate::services::capture::CaptureBackend;
use crate::services::detection_worker::{DetectionWorker, WorkerHandle, WorkerState};
use crate::services::detector::DetectorFactory;
use crate::services::display::DisplaySurface;
use crate::services::partitioner::{partition, Regions};
use crate::services::renderer::{CompositeRenderer, RendererHandle};
use crate::services::result_table::ResultTable;
use crate::services::window_resolver::WindowResolver;
use crate::types::WindowInfo;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Running,
    Stopping,
}

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn WindowResolver>,
    pub capture: Arc<dyn CaptureBackend>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub surface: Arc<dyn DisplaySurface>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub divisions: u32,
    pub confidence_threshold: f32,
    pub min_interval: Duration,
    pub frame_interval: Duration,
    pub box_thickness: u32,
    pub stop_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            divisions: config.regions.divisions,
            confidence_threshold: config.detector.confidence_threshold,
            min_interval: Duration::from_millis(config.worker.min_interval_ms),
            frame_interval: Duration::from_millis(config.render.frame_interval_ms),
            box_thickness: config.render.box_thickness,
            stop_timeout: Duration::from_millis(config.session.stop_timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub window: WindowInfo,
    pub regions: Regions,
}

/// Counters of one worker at the time of the call.
#[derive(Debug, Clone)]
pub struct WorkerActivity {
    pub region_id: u32,
    pub state: WorkerState,
    pub iterations: u64,
    pub published: u64,
    pub last_cycle: Duration,
}

/// Live view of a running session, used by the periodic summary.
#[derive(Debug, Clone)]
pub struct SessionActivity {
    pub window: WindowInfo,
    pub workers: Vec<WorkerActivity>,
    pub frames: u64,
    pub render_errors: u64,
    pub renderer_running: bool,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    /// Last observed state of every worker, by region id.
    pub workers: Vec<(u32, WorkerState)>,
    pub renderer_exited: bool,
}

impl StopReport {
    pub fn all_terminated(&self) -> bool {
        self.workers.iter().all(|(_, state)| state.is_terminal())
    }
}

struct Session {
    info: SessionInfo,
    table: Arc<ResultTable>,
    workers: Vec<WorkerHandle>,
    renderer: RendererHandle,
}

impl Drop for Session {
    fn drop(&mut self) {
        // handles signal their threads on drop; sealing keeps the slots frozen
        self.table.seal();
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    session: Mutex<Option<Session>>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: SessionSettings) -> Self {
        Self {
            collaborators,
            settings,
            state: Mutex::new(SessionState::Idle),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            info!("Session state: {:?} -> {:?}", previous, state);
        }
    }


    pub fn result_table(&self) -> Option<Arc<ResultTable>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.table))
    }

    pub fn activity(&self) -> Option<SessionActivity> {
        let session = self.session.lock();
        let session = session.as_ref()?;

        let workers = session
            .workers
            .iter()
            .map(|w| {
                let stats = w.stats();
                WorkerActivity {
                    region_id: w.region().id,
                    state: w.state(),
                    iterations: stats.iterations.load(Ordering::Relaxed),
                    published: stats.published.load(Ordering::Relaxed),
                    last_cycle: Duration::from_micros(stats.last_cycle_us.load(Ordering::Relaxed)),
                }
            })
            .collect();
        let render = session.renderer.stats();

        Some(SessionActivity {
            window: session.info.window.clone(),
            workers,
            frames: render.frames.load(Ordering::Relaxed),
            render_errors: render.errors.load(Ordering::Relaxed),
            renderer_running: !session.renderer.is_finished(),
        })
    }

    /// Start a session on the first visible window whose title contains `keyword`.
    pub async fn start(&self, keyword: &str) -> Result<SessionInfo> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Idle {
                warn!("Start requested while {:?}", *state);
                return Err(ScopeError::AlreadyRunning);
            }
            *state = SessionState::Resolving;
        }
        info!("Session state: Idle -> Resolving ('{}')", keyword);
        // covers errors and a start future dropped mid-await
        let guard = IdleOnDrop::new(&self.state, "start");

        match self.launch(keyword).await {
            Ok(session) => {
                let info = session.info.clone();
                *self.session.lock() = Some(session);
                self.set_state(SessionState::Running);
                guard.disarm();
                Ok(info)
            }
            Err(e) => {
                error!("Session start failed: {}", e);
                Err(e)
            }
        }
    }

    async fn launch(&self, keyword: &str) -> Result<Session> {
        let c = &self.collaborators;

        c.detectors.check()?;
        let window = c.resolver.resolve(keyword).await?;
        info!("Resolved window {} via {}", window, c.resolver.name());

        let regions = partition(&window.geometry, self.settings.divisions)?;
        let table = Arc::new(ResultTable::new(regions.len()));

        let mut workers = Vec::with_capacity(regions.len());
        for region in &regions {
            let spawned = DetectionWorker::new(
                *region,
                Arc::clone(&table),
                Arc::clone(&c.capture),
                Arc::clone(&c.detectors),
                self.settings.confidence_threshold,
            )
            .with_min_interval(self.settings.min_interval)
            .spawn();

            match spawned {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    self.abort_workers(&table, &mut workers).await;
                    return Err(e);
                }
            }
        }

        let mut failure = None;
        for worker in workers.iter_mut() {
            if let Err(e) = worker.wait_started().await {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            self.abort_workers(&table, &mut workers).await;
            return Err(e);
        }

        let renderer = match CompositeRenderer::new(
            window.geometry,
            Arc::clone(&table),
            Arc::clone(&c.capture),
            Arc::clone(&c.surface),
        )
        .with_frame_interval(self.settings.frame_interval)
        .with_box_thickness(self.settings.box_thickness)
        .spawn()
        {
            Ok(renderer) => renderer,
            Err(e) => {
                self.abort_workers(&table, &mut workers).await;
                return Err(e);
            }
        };

        info!(
            "Session running: {} regions over {} using detector '{}'",
            regions.len(),
            window.geometry,
            c.detectors.name()
        );

        Ok(Session {
            info: SessionInfo { window, regions },
            table,
            workers,
            renderer,
        })
    }

    async fn abort_workers(&self, table: &ResultTable, workers: &mut [WorkerHandle]) {
        for worker in workers.iter() {
            worker.signal_stop();
        }
        table.seal();
        for worker in workers.iter_mut() {
            worker.wait_terminated(self.settings.stop_timeout).await;
        }
    }

    /// Stop the running session. Stopping an idle orchestrator does nothing.
    pub async fn stop(&self) -> Result<StopReport> {
        let session = {
            let mut state = self.state.lock();
            if *state != SessionState::Running {
                info!("Stop requested while {:?}, nothing to do", *state);
                return Ok(StopReport::default());
            }
            let session = self.session.lock().take();
            // sealed before the state leaves Running
            if let Some(session) = &session {
                session.table.seal();
            }
            *state = SessionState::Stopping;
            session
        };
        info!("Session state: Running -> Stopping");
        let guard = IdleOnDrop::new(&self.state, "stop");

        let Some(mut session) = session else {
            return Err(ScopeError::NotRunning);
        };

        for worker in &session.workers {
            worker.signal_stop();
        }
        session.renderer.signal_stop();

        let timeout = self.settings.stop_timeout;
        let mut report = StopReport::default();
        for worker in session.workers.iter_mut() {
            let state = worker.wait_terminated(timeout).await;
            report.workers.push((worker.region().id, state));
        }
        report.renderer_exited = session.renderer.wait_finished(timeout).await;

        if report.all_terminated() && report.renderer_exited {
            info!("Session stopped cleanly on '{}'", session.info.window.title);
        } else {
            warn!("Session stopped with unfinished threads: {:?}", report);
        }

        drop(session);
        guard.disarm();
        self.set_state(SessionState::Idle);
        Ok(report)
    }
}

/// Puts the orchestrator back to `Idle` when a transition does not complete.
struct IdleOnDrop<'a> {
    state: &'a Mutex<SessionState>,
    transition: &'static str,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn new(state: &'a Mutex<SessionState>, transition: &'static str) -> Self {
        Self {
            state,
            transition,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let previous = std::mem::replace(&mut *self.state.lock(), SessionState::Idle);
            info!("Session state: {:?} -> Idle ({} did not complete)", previous, self.transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::display::MemorySurface;
    use crate::services::testing::{wait_until_async, FixedDetectorFactory, ScriptedCapture, SlowResolver};
    use crate::services::window_resolver::DryRunResolver;
    use crate::types::{BoundingBox, PixelLayout, Rect, Region};
    use std::sync::atomic::Ordering;

    struct Fixture {
        capture: Arc<ScriptedCapture>,
        surface: Arc<MemorySurface>,
        orchestrator: Orchestrator,
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            divisions: 4,
            confidence_threshold: 0.5,
            min_interval: Duration::ZERO,
            frame_interval: Duration::from_millis(10),
            box_thickness: 1,
            stop_timeout: Duration::from_secs(5),
        }
    }

    fn desktop() -> DryRunResolver {
        DryRunResolver::with_windows(vec![
            WindowInfo::new("Docs - Chrome".to_string(), Rect::new(0, 0, 800, 600)),
            WindowInfo::new("Player - Chrome".to_string(), Rect::new(0, 0, 320, 200)).with_visible(false),
            WindowInfo::new("Minimized".to_string(), Rect::new(0, 0, 320, 200)).with_visible(false),
        ])
    }

    fn fixture_with(detectors: FixedDetectorFactory, capture: ScriptedCapture) -> Fixture {
        build_fixture(Arc::new(desktop()), detectors, capture)
    }

    fn build_fixture(
        resolver: Arc<dyn WindowResolver>,
        detectors: FixedDetectorFactory,
        capture: ScriptedCapture,
    ) -> Fixture {
        let capture = Arc::new(capture);
        let surface = Arc::new(MemorySurface::new(1200, 400, PixelLayout::Rgba8));
        let orchestrator = Orchestrator::new(
            Collaborators {
                resolver,
                capture: Arc::clone(&capture) as Arc<dyn CaptureBackend>,
                detectors: Arc::new(detectors),
                surface: Arc::clone(&surface) as Arc<dyn DisplaySurface>,
            },
            settings(),
        );
        Fixture {
            capture,
            surface,
            orchestrator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FixedDetectorFactory::new(), ScriptedCapture::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_partitions_window_and_publishes() {
        let f = fixture();

        let info = f.orchestrator.start("chrome").await.unwrap();
        assert_eq!(f.orchestrator.state(), SessionState::Running);
        assert_eq!(info.window.title, "Docs - Chrome");
        assert_eq!(
            info.regions.as_slice(),
            &[
                Region::new(0, 0, 0, 400, 300),
                Region::new(1, 400, 0, 400, 300),
                Region::new(2, 0, 300, 400, 300),
                Region::new(3, 400, 300, 400, 300),
            ]
        );

        let table = f.orchestrator.result_table().unwrap();
        assert!(wait_until_async(Duration::from_secs(5), || (0..4).all(|id| table.version(id).unwrap() > 0)).await);
        assert_eq!(table.read(3).unwrap()[0].bbox, BoundingBox::new(410, 320, 450, 360));
        assert!(wait_until_async(Duration::from_secs(5), || f.surface.presents() > 0).await);

        let shown = f.surface.current().unwrap();
        assert_eq!((shown.image.width, shown.image.height), (533, 400));
        assert_eq!(shown.offset_x, 333);

        assert!(
            wait_until_async(Duration::from_secs(5), || {
                f.orchestrator.activity().is_some_and(|a| {
                    a.frames > 0 && a.workers.iter().all(|w| w.iterations > 0 && w.published > 0)
                })
            })
            .await
        );
        let activity = f.orchestrator.activity().unwrap();
        assert_eq!(activity.window.title, "Docs - Chrome");
        assert_eq!(activity.workers.len(), 4);
        assert_eq!(activity.render_errors, 0);
        assert!(activity.renderer_running);

        let report = f.orchestrator.stop().await.unwrap();
        assert_eq!(report.workers.len(), 4);
        assert!(report.workers.iter().all(|(_, s)| *s == WorkerState::Stopped));
        assert!(report.renderer_exited);
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
        assert_eq!(f.capture.live.load(Ordering::SeqCst), 0);
        assert!(f.orchestrator.activity().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_writes_after_stop() {
        let f = fixture_with(
            FixedDetectorFactory::new(),
            ScriptedCapture::with_delay(Duration::from_millis(15)),
        );
        f.orchestrator.start("Docs").await.unwrap();
        let table = f.orchestrator.result_table().unwrap();
        assert!(wait_until_async(Duration::from_secs(5), || table.version(0).unwrap() >= 2).await);

        let report = f.orchestrator.stop().await.unwrap();
        assert!(report.all_terminated());

        let frozen: Vec<u64> = (0..4).map(|id| table.version(id).unwrap()).collect();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let later: Vec<u64> = (0..4).map(|id| table.version(id).unwrap()).collect();
        assert_eq!(frozen, later);
        assert!(table.is_sealed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_region_goes_stale_while_others_continue() {
        let mut detectors = FixedDetectorFactory::new();
        detectors.fail_on_call = Some((2, 3));
        let f = fixture_with(detectors, ScriptedCapture::default());

        f.orchestrator.start("Docs").await.unwrap();
        let table = f.orchestrator.result_table().unwrap();

        assert!(
            wait_until_async(Duration::from_secs(5), || {
                f.orchestrator.activity().is_some_and(|a| {
                    a.workers
                        .iter()
                        .any(|w| w.region_id == 2 && matches!(w.state, WorkerState::Failed(_)))
                })
            })
            .await
        );
        let stale = table.read(2).unwrap();
        let before: Vec<u64> = [0, 1, 3].iter().map(|id| table.version(*id).unwrap()).collect();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let after: Vec<u64> = [0, 1, 3].iter().map(|id| table.version(*id).unwrap()).collect();
        assert!(before.iter().zip(&after).all(|(b, a)| a > b));
        assert_eq!(table.version(2).unwrap(), 2);
        assert_eq!(*table.read(2).unwrap(), *stale);
        assert_eq!(stale[0].bbox, BoundingBox::new(10, 320, 50, 360));
        assert_eq!(f.orchestrator.state(), SessionState::Running);

        let report = f.orchestrator.stop().await.unwrap();
        assert!(matches!(report.workers[2].1, WorkerState::Failed(_)));
        assert_eq!(report.workers[0].1, WorkerState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_start_failure_aborts_start() {
        let mut detectors = FixedDetectorFactory::new();
        detectors.fail_load_region = Some(3);
        let f = fixture_with(detectors, ScriptedCapture::default());

        let err = f.orchestrator.start("Docs").await.unwrap_err();
        assert!(matches!(err, ScopeError::WorkerStart { region_id: 3, .. }));
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
        assert!(f.orchestrator.result_table().is_none());
        assert!(wait_until_async(Duration::from_secs(5), || f.capture.live.load(Ordering::SeqCst) == 0).await);
        assert_eq!(f.surface.presents(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolvable_windows_are_configuration_errors() {
        let f = fixture();

        let err = f.orchestrator.start("Firefox").await.unwrap_err();
        assert!(matches!(err, ScopeError::WindowNotFound(_)));

        let err = f.orchestrator.start("Minimized").await.unwrap_err();
        assert!(matches!(err, ScopeError::WindowNotVisible(_)));
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
        assert_eq!(f.capture.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_model_fails_before_resolving() {
        let mut detectors = FixedDetectorFactory::new();
        detectors.model_path = Some("/nonexistent/weights.onnx".into());
        let f = fixture_with(detectors, ScriptedCapture::default());

        let err = f.orchestrator.start("Firefox").await.unwrap_err();
        assert!(matches!(err, ScopeError::ModelNotFound(_)));
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_requests_are_rejected_or_ignored() {
        let f = fixture();

        let report = f.orchestrator.stop().await.unwrap();
        assert!(report.workers.is_empty());

        f.orchestrator.start("Docs").await.unwrap();
        assert!(matches!(
            f.orchestrator.start("Docs").await,
            Err(ScopeError::AlreadyRunning)
        ));

        f.orchestrator.stop().await.unwrap();
        let again = f.orchestrator.stop().await.unwrap();
        assert!(again.workers.is_empty());

        // a stopped orchestrator can start a fresh session
        f.orchestrator.start("Docs").await.unwrap();
        assert_eq!(f.orchestrator.state(), SessionState::Running);
        f.orchestrator.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_start_returns_to_idle() {
        let resolver = SlowResolver::new(desktop(), Duration::from_millis(200));
        let f = build_fixture(Arc::new(resolver), FixedDetectorFactory::new(), ScriptedCapture::default());

        let first = tokio::time::timeout(Duration::from_millis(20), f.orchestrator.start("Docs")).await;
        assert!(first.is_err());
        assert_eq!(f.orchestrator.state(), SessionState::Idle);

        let info = f.orchestrator.start("Docs").await.unwrap();
        assert_eq!(info.regions.len(), 4);
        assert_eq!(f.orchestrator.state(), SessionState::Running);

        let report = f.orchestrator.stop().await.unwrap();
        assert!(report.all_terminated());
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_seals_results_before_leaving_running() {
        let f = fixture();
        f.orchestrator.start("Docs").await.unwrap();
        let table = f.orchestrator.result_table().unwrap();

        let stopping = f.orchestrator.stop();
        tokio::pin!(stopping);
        // first poll runs up to the first bounded wait
        let finished = poll_once(stopping.as_mut()).await;
        assert!(table.is_sealed());
        assert_ne!(f.orchestrator.state(), SessionState::Running);

        match finished {
            Some(report) => assert!(report.is_ok()),
            None => assert!(stopping.await.is_ok()),
        }
        assert_eq!(f.orchestrator.state(), SessionState::Idle);
    }

    async fn poll_once<F: std::future::Future + Unpin>(future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = future => Some(out),
            _ = std::future::ready(()) => None,
        }
    }
}
