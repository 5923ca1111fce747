//! dae-export library
//!
//! Serializes scene snapshots to COLLADA documents laid out for the
//! CryEngine resource compiler.

pub mod animation;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod material;
pub mod scene;
pub mod skin;
pub mod visual_scene;

// Re-export the assembly entry points
pub use error::ExportError;
pub use export::{DaeExporter, ExportConfig};
pub use scene::SceneSnapshot;

// Re-export document primitives used by downstream checks
pub use document::{
    collect_ids, duplicate_ids, verify_cross_references, write_input, write_source, SourceData,
};
