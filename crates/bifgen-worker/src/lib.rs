//! Preview-generation worker: configuration, manifest loading, and the
//! console/feed progress consumers around the pool.

pub mod capabilities;
pub mod config;
pub mod console;
pub mod error;
pub mod feed;
pub mod manifest;

pub use capabilities::parse_accel_spec;
pub use config::GenerateConfig;
pub use console::ConsoleSink;
pub use error::{WorkerError, WorkerResult};
pub use feed::spawn_feed_writer;
pub use manifest::load_manifest;
