//! Export error taxonomy.
//!
//! Fatal errors abort the whole export; recoverable errors are caught at the
//! controller/animation/visual-scene stage boundary and turn into a skipped
//! stage. Soft diagnostics (influence caps, duplicate node names) never
//! surface here, they go through `tracing` instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// The configured downstream asset compiler does not exist. Checked
    /// before any document work begins.
    #[error("asset compiler not found at '{path}'")]
    CompilerNotFound { path: String },

    /// A material texture slot has no image assigned. No partial document
    /// is handed downstream in this case.
    #[error("a texture slot of material '{material}' has no image assigned")]
    TextureWithoutImage { material: String },

    /// A bone of a skinned armature carries no bind pose matrix. Recoverable:
    /// controllers, animations and the visual scene are skipped for the run,
    /// geometry and material libraries already written stay valid.
    #[error("bone '{bone}' of armature '{armature}' has no bind pose matrix")]
    MissingBindPose { armature: String, bone: String },
}

impl ExportError {
    /// Recoverable errors skip the guarded document stages instead of
    /// aborting the export.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExportError::MissingBindPose { .. })
    }
}
