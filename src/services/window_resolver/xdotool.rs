use super::r#trait::{select_window, WindowResolver};
use crate::error::{Result, ScopeError};
use crate::scope_error;
use crate::types::{Rect, WindowInfo};
use std::collections::HashSet;
use tokio::process::Command;
use tracing::debug;

pub struct XdotoolResolver;

impl XdotoolResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn test(&self) -> Result<()> {
        let output = Command::new("xdotool").arg("version").output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ScopeError::ServiceUnavailable("xdotool failed".to_string()))
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("xdotool")
            .args(args)
            .output()
            .await
            .map_err(|e| {
                debug!("xdotool is missing or not working: {}", e);
                scope_error!(service_unavailable, "xdotool not found: {}", e)
            })?;

        // `search` exits with 1 when nothing matched, which is not an error for us
        if !output.status.success() && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("xdotool {:?} returned an error: {}", args, stderr);
            return Err(scope_error!(
                service_unavailable,
                "xdotool returned an error: {}",
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn search(&self, pattern: &str, only_visible: bool) -> Result<Vec<u64>> {
        let mut args = vec!["search"];
        if only_visible {
            args.push("--onlyvisible");
        }
        args.extend(["--name", pattern]);

        let stdout = self.run(&args).await?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.trim().parse::<u64>().ok())
            .collect())
    }

    async fn describe(&self, id: u64, visible: bool) -> Result<Option<WindowInfo>> {
        let id_arg = id.to_string();
        let title = self.run(&["getwindowname", &id_arg]).await?.trim().to_string();
        if title.is_empty() {
            return Ok(None);
        }

        let geometry_output = self.run(&["getwindowgeometry", "--shell", &id_arg]).await?;
        let Some(geometry) = parse_shell_geometry(&geometry_output) else {
            debug!("xdotool gave no geometry for window {}", id);
            return Ok(None);
        };

        Ok(Some(
            WindowInfo::new(title, geometry)
                .with_id(id)
                .with_visible(visible),
        ))
    }

    async fn collect(&self, pattern: &str) -> Result<Vec<WindowInfo>> {
        let visible: HashSet<u64> = self.search(pattern, true).await?.into_iter().collect();
        let all = self.search(pattern, false).await?;

        let mut windows = Vec::new();
        for id in all {
            if let Some(window) = self.describe(id, visible.contains(&id)).await? {
                windows.push(window);
            }
        }
        // visible windows first so "first visible match" prefers them in list order
        windows.sort_by_key(|w| !w.visible);
        Ok(windows)
    }
}

#[async_trait::async_trait]
impl WindowResolver for XdotoolResolver {
    fn name(&self) -> &'static str {
        "xdotool"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let visible = self.search(".", true).await?;
        let mut windows = Vec::new();
        for id in visible {
            if let Some(window) = self.describe(id, true).await? {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    async fn resolve(&self, keyword: &str) -> Result<WindowInfo> {
        debug!("Resolving window '{}' via xdotool", keyword);
        let windows = self.collect(&escape_regex(keyword)).await?;
        select_window(&windows, keyword)
    }
}

/// Parse `xdotool getwindowgeometry --shell` output.
pub(super) fn parse_shell_geometry(output: &str) -> Option<Rect> {
    let mut x = None;
    let mut y = None;
    let mut width = None;
    let mut height = None;

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().parse::<i32>().ok();
        match key {
            "X" => x = value,
            "Y" => y = value,
            "WIDTH" => width = value,
            "HEIGHT" => height = value,
            _ => {}
        }
    }

    Some(Rect::new(x?, y?, width?, height?))
}

/// xdotool matches names as POSIX regexes; keywords are literal.
pub(super) fn escape_regex(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for ch in keyword.chars() {
        if "\\.^$|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
