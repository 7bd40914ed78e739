use super::r#trait::WindowResolver;
use crate::error::{Result, ScopeError};
use crate::scope_error;
use crate::types::{Rect, WindowInfo};
use tokio::process::Command;

/// `wmctrl -lG` only lists managed windows; all of them are treated as visible.
pub struct WmctrlResolver;

impl WmctrlResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn test(&self) -> Result<()> {
        let output = Command::new("wmctrl").arg("-m").output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ScopeError::ServiceUnavailable("wmctrl failed".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl WindowResolver for WmctrlResolver {
    fn name(&self) -> &'static str {
        "wmctrl"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let output = Command::new("wmctrl")
            .arg("-lG")
            .output()
            .await
            .map_err(|e| scope_error!(service_unavailable, "wmctrl not found: {}", e))?;

        if !output.status.success() {
            return Err(scope_error!(service_unavailable, "wmctrl returned an error"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_wmctrl_line).collect())
    }
}

/// One `wmctrl -lG` line: `id desktop x y width height host title...`.
pub(super) fn parse_wmctrl_line(line: &str) -> Option<WindowInfo> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return None;
    }

    let id = u64::from_str_radix(parts[0].trim_start_matches("0x"), 16).ok()?;
    let x = parts[2].parse().ok()?;
    let y = parts[3].parse().ok()?;
    let width = parts[4].parse().ok()?;
    let height = parts[5].parse().ok()?;
    let title = parts[7..].join(" ");

    Some(WindowInfo::new(title, Rect::new(x, y, width, height)).with_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_line() {
        let line = "0x03a00007  0 1920 27   1280 720  workstation Google Chrome - Docs";
        let window = parse_wmctrl_line(line).unwrap();

        assert_eq!(window.title, "Google Chrome - Docs");
        assert_eq!(window.id, Some(0x03a00007));
        assert_eq!(window.geometry, Rect::new(1920, 27, 1280, 720));
        assert!(window.visible);
    }

    #[test]
    fn skips_untitled_and_malformed_lines() {
        assert!(parse_wmctrl_line("0x01 -1 0 0 10 10 host").is_none());
        assert!(parse_wmctrl_line("garbage").is_none());
        assert!(parse_wmctrl_line("zz 0 a b c d host title").is_none());
    }
}
