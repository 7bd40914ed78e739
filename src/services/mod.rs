pub mod capture;
pub mod detection_worker;
pub mod detector;
pub mod display;
pub mod orchestrator;
pub mod partitioner;
pub mod renderer;
pub mod result_table;
pub mod stop_signal;
pub mod window_resolver;

#[cfg(test)]
pub mod testing;

pub use capture::create_capture_backend;
pub use detector::create_detector_factory;
pub use display::create_display_surface;
pub use orchestrator::{Collaborators, Orchestrator, SessionSettings};
pub use window_resolver::create_window_resolver;
