pub mod backend;
pub mod common;
pub mod engine;
pub mod events;
pub mod geometry;
pub mod model;

pub use backend::{RecordingBackend, WindowBackend};
pub use common::config::Settings;
pub use engine::Engine;
pub use events::{Event, EventSink};
