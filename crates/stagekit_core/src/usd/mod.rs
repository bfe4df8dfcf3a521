//! USD (Universal Scene Description) stage access.
//!
//! This module parses USDA (ASCII) layers, plain or packaged in a `.usdz`
//! zip, into an uncomposed layer representation that keeps every variant
//! option. Composition into the resolved prim tree lives in
//! [`crate::compose`].
//!
//! ## Supported USD Features
//!
//! - `def` / `over` prim specs with typed attributes and relationships
//! - Variant sets with per-option bodies and authored selections
//! - `Xform` stacks (`xformOp:*` plus `xformOpOrder`)
//! - `UsdShade` connections (`inputs:*.connect`, `outputs:surface.connect`)
//!
//! ## Not Supported
//!
//! - Binary `.usdc` layers (rejected with a load error)
//! - References, payloads, inherits (recorded, not resolved)
//! - Animation / time samples (skipped)
//!
//! # Example
//!
//! ```ignore
//! use stagekit_core::usd::load_stage;
//!
//! let stage = load_stage("desk_setup.usda")?;
//! println!("{} prims", stage.composed().len());
//! ```

mod loader;
mod parser;
mod types;
mod values;

pub use loader::*;
pub use parser::*;
pub use types::*;
pub use values::*;
