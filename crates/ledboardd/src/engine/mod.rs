#[allow(clippy::module_inception)]
mod engine;
mod renderer;

pub use engine::Engine;
pub use engine::EngineClosed;
pub use engine::EngineEvent;
pub use engine::EngineHandle;
pub use renderer::AggregationRenderer;
