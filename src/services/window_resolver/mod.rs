//! WindowResolver service: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for enumerating desktop windows
//! and resolving a title keyword to one window with its screen geometry.
//! It MUST NOT capture pixels or know about regions, detectors or rendering;
//! the Orchestrator consumes the resolved rectangle.

mod dry_run;
mod system;
mod r#trait;
mod wmctrl;
mod xdotool;

#[cfg(test)]
pub use self::dry_run::DryRunResolver;
pub use self::r#trait::{create_window_resolver, WindowResolver};
