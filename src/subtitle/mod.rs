pub mod renderer;

pub use renderer::SubtitleRenderer;
