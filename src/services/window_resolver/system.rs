use super::r#trait::WindowResolver;
use super::wmctrl::WmctrlResolver;
use super::xdotool::XdotoolResolver;
use crate::error::{Result, ScopeError};
use crate::types::WindowInfo;
use parking_lot::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkingMethod {
    Xdotool,
    Wmctrl,
}

/// Picks the first working desktop tool and sticks with it until it fails.
pub struct SystemWindowResolver {
    working_method: RwLock<Option<WorkingMethod>>,
    xdotool: XdotoolResolver,
    wmctrl: WmctrlResolver,
}

impl SystemWindowResolver {
    pub fn new() -> Self {
        Self {
            working_method: RwLock::new(None),
            xdotool: XdotoolResolver::new(),
            wmctrl: WmctrlResolver::new(),
        }
    }

    async fn detect_working_method(&self) -> Result<WorkingMethod> {
        info!("Detecting a working window enumeration method...");

        if self.xdotool.test().await.is_ok() {
            info!("Using xdotool");
            return Ok(WorkingMethod::Xdotool);
        }

        if self.wmctrl.test().await.is_ok() {
            info!("Using wmctrl");
            return Ok(WorkingMethod::Wmctrl);
        }

        Err(ScopeError::ServiceUnavailable(
            "neither xdotool nor wmctrl is available".to_string(),
        ))
    }

    async fn method(&self) -> Result<WorkingMethod> {
        let cached = *self.working_method.read();
        if let Some(method) = cached {
            return Ok(method);
        }
        let method = self.detect_working_method().await?;
        *self.working_method.write() = Some(method);
        Ok(method)
    }

    fn backend(&self, method: WorkingMethod) -> &dyn WindowResolver {
        match method {
            WorkingMethod::Xdotool => &self.xdotool,
            WorkingMethod::Wmctrl => &self.wmctrl,
        }
    }

    fn forget_method(&self, method: WorkingMethod, error: &ScopeError) {
        warn!("Window method {:?} stopped working: {}", method, error);
        *self.working_method.write() = None;
    }
}

impl Default for SystemWindowResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WindowResolver for SystemWindowResolver {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let method = self.method().await?;
        let result = self.backend(method).list_windows().await;
        if let Err(e @ ScopeError::ServiceUnavailable(_)) = &result {
            self.forget_method(method, e);
        }
        result
    }

    async fn resolve(&self, keyword: &str) -> Result<WindowInfo> {
        let method = self.method().await?;
        let result = self.backend(method).resolve(keyword).await;
        if let Err(e @ ScopeError::ServiceUnavailable(_)) = &result {
            self.forget_method(method, e);
        }
        result
    }
}
