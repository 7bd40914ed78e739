use super::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window reported by the desktop enumeration backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub class: String,
    pub id: Option<u64>,
    pub geometry: Rect,
    pub visible: bool,
}

impl WindowInfo {
    pub fn new(title: String, geometry: Rect) -> Self {
        Self {
            title,
            class: String::new(),
            id: None,
            geometry,
            visible: true,
        }
    }

    pub fn with_class(mut self, class: String) -> Self {
        self.class = class;
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Case-insensitive title substring match. An empty keyword matches nothing.
    pub fn title_contains(&self, keyword: &str) -> bool {
        if keyword.is_empty() {
            return false;
        }
        self.title.to_lowercase().contains(&keyword.to_lowercase())
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_empty() {
            write!(f, "\"{}\" {}", self.title, self.geometry)
        } else {
            write!(f, "\"{}\" ({}) {}", self.title, self.class, self.geometry)
        }
    }
}
