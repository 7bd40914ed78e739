use crate::config::Config;
use crate::error::{Result, ScopeError};
use crate::scope_error;
use crate::types::WindowInfo;
use std::sync::Arc;

/// Trait for window enumeration backends
#[async_trait::async_trait]
pub trait WindowResolver: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// All titled windows the backend can see, visible ones flagged as such
    async fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// First visible window whose title contains `keyword`
    async fn resolve(&self, keyword: &str) -> Result<WindowInfo> {
        let windows = self.list_windows().await?;
        select_window(&windows, keyword)
    }
}

/// Pick the first visible match. Matches that are all hidden yield `WindowNotVisible`.
pub fn select_window(windows: &[WindowInfo], keyword: &str) -> Result<WindowInfo> {
    let mut matches = windows.iter().filter(|w| w.title_contains(keyword)).peekable();

    let first = match matches.peek() {
        Some(window) => (*window).clone(),
        None => return Err(ScopeError::WindowNotFound(keyword.to_string())),
    };

    matches
        .find(|w| w.visible)
        .cloned()
        .ok_or(ScopeError::WindowNotVisible(first.title))
}

/// Factory function to create the window resolver for the configured mode
pub fn create_window_resolver(config: &Config, dry_run: bool) -> Result<Arc<dyn WindowResolver>> {
    if dry_run {
        return Ok(Arc::new(super::dry_run::DryRunResolver::new()));
    }

    match config.window.resolver.as_str() {
        "auto" => Ok(Arc::new(super::system::SystemWindowResolver::new())),
        "xdotool" => Ok(Arc::new(super::xdotool::XdotoolResolver::new())),
        "wmctrl" => Ok(Arc::new(super::wmctrl::WmctrlResolver::new())),
        other => Err(scope_error!(service_unavailable, "unknown window resolver '{}'", other)),
    }
}
