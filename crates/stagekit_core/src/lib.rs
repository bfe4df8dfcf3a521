//! Stagekit Core - scene graph composition and mesh export for USD stages.
//!
//! This crate provides:
//!
//! - **Stage access**: USDA parsing (plain `.usda` and `.usdz` packages) into a
//!   snapshot that keeps every variant option
//! - **Composition**: the resolved prim tree for the current variant selections
//! - **Transforms and bounds**: world-space matrices and axis-aligned bounds
//! - **Aggregation**: prim/mesh/material counts and the scene bound
//! - **Export**: binary STL and Wavefront OBJ mesh encoders
//! - **Tools**: the eight scene operations exposed to remote callers
//!
//! # Example
//!
//! ```ignore
//! use stagekit_core::SceneTools;
//!
//! let tools = SceneTools::default();
//! let stats = tools.scene_stats("desk_setup.usda")?;
//! println!("{} meshes, {} materials", stats.mesh_count, stats.material_count);
//! ```

pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod material;
pub mod mesh;
pub mod stage;
pub mod stats;
pub mod tools;
pub mod usd;
pub mod value;
pub mod variants;
pub mod xform;

// Re-export commonly used types
pub use compose::{ComposedPrim, ComposedStage, PrimId, PrimKind};
pub use config::ToolConfig;
pub use error::{SceneError, SceneResult};
pub use export::{ExportFormat, ExportReport};
pub use material::{MaterialInfo, PbrSummary};
pub use mesh::{MeshGeometry, WorldMesh};
pub use stage::{SharedStage, Stage};
pub use stats::SceneStats;
pub use tools::SceneTools;
pub use usd::{StageSource, UsdFileSource};
pub use value::{Attribute, AttributeValue};
pub use variants::{VariantChange, VariantSet};
