//! Error taxonomy shared by every scene operation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the scene operations.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to load scene {}: {message}", path.display())]
    SceneLoad { path: PathBuf, message: String },

    #[error("Prim not found: {0}")]
    PrimNotFound(String),

    #[error("Not a mesh prim: {0}")]
    NotAMesh(String),

    #[error("Variant set '{set}' not found on {prim}")]
    UnknownVariantSet { prim: String, set: String },

    #[error("Variant '{option}' not found in set '{set}' on {prim}. Available: {}", available.join(", "))]
    UnknownVariantOption {
        prim: String,
        set: String,
        option: String,
        available: Vec<String>,
    },

    #[error("Mesh has no geometry data: {0}")]
    EmptyMesh(String),

    #[error("Degenerate face {face} in {prim}: {reason}")]
    DegenerateFace {
        prim: String,
        face: usize,
        reason: String,
    },

    #[error("Unsupported export format: {0} (expected stl or obj)")]
    UnsupportedFormat(String),

    #[error("Corrupt STL data: {0}")]
    CorruptStl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SceneError {
    /// Build a load error for `path`.
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SceneError::SceneLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used by the tool transport.
    pub fn code(&self) -> &'static str {
        match self {
            SceneError::SceneLoad { .. } => "scene_load",
            SceneError::PrimNotFound(_) => "prim_not_found",
            SceneError::NotAMesh(_) => "not_a_mesh",
            SceneError::UnknownVariantSet { .. } => "unknown_variant_set",
            SceneError::UnknownVariantOption { .. } => "unknown_variant_option",
            SceneError::EmptyMesh(_) => "empty_mesh",
            SceneError::DegenerateFace { .. } => "degenerate_face",
            SceneError::UnsupportedFormat(_) => "unsupported_format",
            SceneError::CorruptStl(_) => "corrupt_stl",
            SceneError::Io(_) => "io",
        }
    }
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
