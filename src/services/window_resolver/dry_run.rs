use super::r#trait::WindowResolver;
use crate::error::Result;
use crate::types::{Rect, WindowInfo};
use tracing::info;

/// Fixed fake desktop for dry-run sessions and tests.
pub struct DryRunResolver {
    windows: Vec<WindowInfo>,
}

impl DryRunResolver {
    pub fn new() -> Self {
        let windows = vec![
            WindowInfo::new("Chrome - dry_run".to_string(), Rect::new(0, 0, 1280, 720))
                .with_class("DryRun".to_string()),
            WindowInfo::new("Terminal - dry_run".to_string(), Rect::new(100, 100, 800, 600))
                .with_class("DryRun".to_string()),
            WindowInfo::new("Editor - dry_run".to_string(), Rect::new(0, 0, 1024, 768))
                .with_class("DryRun".to_string())
                .with_visible(false),
        ];
        Self { windows }
    }

    pub fn with_windows(windows: Vec<WindowInfo>) -> Self {
        Self { windows }
    }
}

impl Default for DryRunResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WindowResolver for DryRunResolver {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        info!("Dry-run: reporting {} emulated windows", self.windows.len());
        Ok(self.windows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScopeError;

    #[tokio::test]
    async fn resolves_emulated_windows() {
        let resolver = DryRunResolver::new();

        let window = resolver.resolve("chrome").await.unwrap();
        assert_eq!(window.geometry, Rect::new(0, 0, 1280, 720));

        assert!(matches!(
            resolver.resolve("Editor").await,
            Err(ScopeError::WindowNotVisible(_))
        ));
        assert!(matches!(
            resolver.resolve("Firefox").await,
            Err(ScopeError::WindowNotFound(_))
        ));
    }
}
