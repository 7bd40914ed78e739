mod compose;
mod render_loop;

pub use self::render_loop::{CompositeRenderer, RendererHandle};
