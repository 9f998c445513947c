pub mod color;
pub mod config;
pub mod driver;
pub mod engine;
pub mod heartbeat;
pub mod mapping;
pub mod registry;
pub mod source;

pub use color::Color;
pub use config::Board;
pub use config::Config;
pub use engine::AggregationRenderer;
pub use engine::Engine;
pub use engine::EngineHandle;
pub use heartbeat::Heartbeat;
pub use mapping::LedMapTable;
pub use registry::StateRegistry;
