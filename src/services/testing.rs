//! Scripted collaborators shared by the service tests.

use crate::error::Result;
use crate::scope_error;
use crate::services::capture::{CaptureBackend, CaptureSource};
use crate::services::detector::{Detector, DetectorFactory};
use crate::services::window_resolver::{DryRunResolver, WindowResolver};
use crate::types::{BoundingBox, Frame, PixelLayout, RawDetection, Rect, Region, WindowInfo};
use image::RgbImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Capture backend producing solid BGRA frames and tracking open handles.
#[derive(Default)]
pub struct ScriptedCapture {
    pub opened: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub grabs: Arc<AtomicUsize>,
    pub delay: Duration,
    /// Every n-th grab (1-based, across handles) fails.
    pub fail_every: Option<usize>,
    /// Every n-th grab panics instead of returning.
    pub panic_every: Option<usize>,
}

impl ScriptedCapture {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

impl CaptureBackend for ScriptedCapture {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            live: Arc::clone(&self.live),
            grabs: Arc::clone(&self.grabs),
            delay: self.delay,
            fail_every: self.fail_every,
            panic_every: self.panic_every,
        }))
    }
}

struct ScriptedSource {
    live: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
    delay: Duration,
    fail_every: Option<usize>,
    panic_every: Option<usize>,
}

impl CaptureSource for ScriptedSource {
    fn grab(&mut self, rect: &Rect) -> Result<Frame> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let n = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
        if matches!(self.fail_every, Some(every) if n % every == 0) {
            return Err(scope_error!(capture, "scripted failure on grab {}", n));
        }
        if matches!(self.panic_every, Some(every) if n % every == 0) {
            panic!("scripted panic on grab {}", n);
        }
        let pixels = rect.width as usize * rect.height as usize;
        let data = [30u8, 20, 10, 255].repeat(pixels);
        Frame::new(rect.width as u32, rect.height as u32, PixelLayout::Bgra8, data)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Detector factory returning one fixed region-local box per call.
pub struct FixedDetectorFactory {
    pub local_box: BoundingBox,
    pub label: String,
    pub confidence: f32,
    pub delay: Duration,
    /// `(region_id, call)`: that region's detector errors on its n-th call (1-based).
    pub fail_on_call: Option<(u32, usize)>,
    pub fail_load_region: Option<u32>,
    pub model_path: Option<PathBuf>,
    pub calls: Arc<Mutex<HashMap<u32, usize>>>,
}

impl FixedDetectorFactory {
    pub fn new() -> Self {
        Self {
            local_box: BoundingBox::new(10, 20, 50, 60),
            label: "person".to_string(),
            confidence: 0.9,
            delay: Duration::from_millis(2),
            fail_on_call: None,
            fail_load_region: None,
            model_path: None,
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl DetectorFactory for FixedDetectorFactory {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    fn load(&self, region: &Region) -> Result<Box<dyn Detector>> {
        if self.fail_load_region == Some(region.id) {
            return Err(scope_error!(detector, "weights rejected for region {}", region.id));
        }
        Ok(Box::new(FixedDetector {
            region_id: region.id,
            local_box: self.local_box,
            label: self.label.clone(),
            confidence: self.confidence,
            delay: self.delay,
            fail_at: self
                .fail_on_call
                .filter(|(id, _)| *id == region.id)
                .map(|(_, call)| call),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FixedDetector {
    region_id: u32,
    local_box: BoundingBox,
    label: String,
    confidence: f32,
    delay: Duration,
    fail_at: Option<usize>,
    calls: Arc<Mutex<HashMap<u32, usize>>>,
}

impl Detector for FixedDetector {
    fn detect(&mut self, _image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let call = {
            let mut calls = self.calls.lock();
            let entry = calls.entry(self.region_id).or_insert(0);
            *entry += 1;
            *entry
        };
        if self.fail_at == Some(call) {
            return Err(scope_error!(detector, "scripted failure on call {}", call));
        }
        if self.confidence < confidence_threshold {
            return Ok(Vec::new());
        }
        Ok(vec![RawDetection::new(self.local_box, self.confidence, self.label.clone())])
    }
}

/// Resolver that takes `delay` before answering.
pub struct SlowResolver {
    inner: DryRunResolver,
    delay: Duration,
}

impl SlowResolver {
    pub fn new(inner: DryRunResolver, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait::async_trait]
impl WindowResolver for SlowResolver {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_windows().await
    }
}

/// Poll `condition` from a blocking context until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async flavour of [`wait_until`] for tokio tests.
pub async fn wait_until_async(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
