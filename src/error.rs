use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid window rectangle {width}x{height}: {reason}")]
    InvalidWindow {
        width: i32,
        height: i32,
        reason: String,
    },

    #[error("No window with a title containing '{0}'")]
    WindowNotFound(String),

    #[error("Window '{0}' is not visible (minimized or hidden)")]
    WindowNotVisible(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Unsupported model file {path}: {reason}")]
    UnsupportedModel { path: PathBuf, reason: String },

    #[error("Worker for region {region_id} failed to start: {reason}")]
    WorkerStart { region_id: u32, reason: String },

    #[error("Worker for region {region_id} failed: {reason}")]
    WorkerRuntime { region_id: u32, reason: String },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Detector failed: {0}")]
    Detector(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("A session is already running")]
    AlreadyRunning,

    #[error("No session is running")]
    NotRunning,

    #[error("Result slot {0} is sealed")]
    SlotSealed(u32),

    #[error("Unknown region id {0}")]
    UnknownRegion(u32),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal to session start, reported before any worker runs.
    Configuration,
    /// Local to one worker; ends that worker only.
    WorkerRuntime,
    /// Local to one render iteration.
    RenderRuntime,
    /// Rejected or no-op lifecycle request.
    Lifecycle,
    Internal,
}

impl ScopeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScopeError::Config(_)
            | ScopeError::InvalidWindow { .. }
            | ScopeError::WindowNotFound(_)
            | ScopeError::WindowNotVisible(_)
            | ScopeError::ModelNotFound(_)
            | ScopeError::UnsupportedModel { .. }
            | ScopeError::WorkerStart { .. }
            | ScopeError::ServiceUnavailable(_) => ErrorKind::Configuration,
            ScopeError::Capture(_) | ScopeError::Detector(_) | ScopeError::WorkerRuntime { .. } => {
                ErrorKind::WorkerRuntime
            }
            ScopeError::Render(_) => ErrorKind::RenderRuntime,
            ScopeError::AlreadyRunning | ScopeError::NotRunning | ScopeError::SlotSealed(_) => {
                ErrorKind::Lifecycle
            }
            ScopeError::Io(_) | ScopeError::Internal(_) | ScopeError::UnknownRegion(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn invalid_window<T>(width: i32, height: i32, reason: impl Into<String>) -> Result<T> {
        Err(ScopeError::InvalidWindow {
            width,
            height,
            reason: reason.into(),
        })
    }
}

pub type Result<T> = std::result::Result<T, ScopeError>;

#[macro_export]
macro_rules! scope_error {
    (capture, $($arg:tt)*) => {
        $crate::error::ScopeError::Capture(format!($($arg)*))
    };
    (detector, $($arg:tt)*) => {
        $crate::error::ScopeError::Detector(format!($($arg)*))
    };
    (render, $($arg:tt)*) => {
        $crate::error::ScopeError::Render(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::ScopeError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::ScopeError::Internal(format!($($arg)*))
    };
}
