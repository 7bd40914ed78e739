mod memory;
mod snapshot;
mod r#trait;

#[cfg(test)]
pub use self::memory::MemorySurface;
pub use self::r#trait::{create_display_surface, DisplayFrame, DisplaySurface};
