//! USD layer types for the intermediate (uncomposed) representation.
//!
//! These types mirror what is authored in a layer: every prim spec keeps all
//! of its variant options, and `over` specs are kept apart from `def` specs.
//! Composition into the resolved prim tree happens in [`crate::compose`].

use std::collections::BTreeMap;

use serde::Serialize;
use stagekit_math::{DMat4, DQuat, DVec3};

use crate::value::Attribute;

/// A parsed layer: stage metadata plus root prim specs.
#[derive(Clone, Debug, Default)]
pub struct UsdLayer {
    pub metadata: LayerMetadata,
    pub prims: Vec<PrimSpec>,
}

/// Layer-level metadata from the header block.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LayerMetadata {
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub default_prim: Option<String>,
    pub documentation: Option<String>,
}

impl LayerMetadata {
    /// Stage up axis, USD's fallback is Y.
    pub fn up_axis(&self) -> &str {
        self.up_axis.as_deref().unwrap_or("Y")
    }

    /// Stage linear units, USD's fallback is centimeters.
    pub fn meters_per_unit(&self) -> f64 {
        self.meters_per_unit.unwrap_or(0.01)
    }
}

/// How a prim spec contributes to the stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Specifier {
    /// `def` - defines the prim
    #[default]
    Def,
    /// `over` - overrides opinions on a prim defined elsewhere
    Over,
    /// `class` - abstract, never part of the resolved tree
    Class,
}

/// Prim-level metadata (the parenthesized block after a prim header).
#[derive(Clone, Debug, Default)]
pub struct PrimMetadata {
    pub kind: Option<String>,
    pub active: Option<bool>,
    pub api_schemas: Vec<String>,
    /// Authored asset references (recorded, not resolved)
    pub references: Vec<String>,
    pub documentation: Option<String>,
    /// Authored variant selections (`variants = { string set = "option" }`)
    pub variant_selection: BTreeMap<String, String>,
}

/// A prim as authored in one place of a layer.
#[derive(Clone, Debug, Default)]
pub struct PrimSpec {
    pub specifier: Specifier,

    /// Schema type name (e.g. "Mesh"); empty for typeless prims and overs
    pub type_name: String,

    /// Prim name (last component of path)
    pub name: String,

    pub metadata: PrimMetadata,

    pub attributes: BTreeMap<String, Attribute>,

    /// Relationship targets (e.g. `material:binding`)
    pub relationships: BTreeMap<String, Vec<String>>,

    /// Authored xformOps, in authored order
    pub xform_ops: Vec<XformOpSpec>,

    /// Authored xformOpOrder
    pub xform_op_order: Option<Vec<String>>,

    pub variant_sets: Vec<VariantSetSpec>,

    pub children: Vec<PrimSpec>,
}

impl PrimSpec {
    /// Create an empty spec.
    pub fn new(
        specifier: Specifier,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            specifier,
            type_name: type_name.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// True if this spec authors any transform opinion.
    pub fn has_xform_opinion(&self) -> bool {
        !self.xform_ops.is_empty() || self.xform_op_order.is_some()
    }

    /// Find a declared variant set by name.
    pub fn variant_set(&self, name: &str) -> Option<&VariantSetSpec> {
        self.variant_sets.iter().find(|set| set.name == name)
    }
}

/// A declared variant set with every option body.
#[derive(Clone, Debug, Default)]
pub struct VariantSetSpec {
    pub name: String,
    pub options: Vec<VariantOptionSpec>,
}

impl VariantSetSpec {
    pub fn option_names(&self) -> Vec<String> {
        self.options.iter().map(|o| o.name.clone()).collect()
    }

    pub fn option_index(&self, name: &str) -> Option<usize> {
        self.options.iter().position(|o| o.name == name)
    }
}

/// One option of a variant set. The body holds the opinions the option
/// contributes to the owning prim (attributes, xformOps, children, overs).
#[derive(Clone, Debug, Default)]
pub struct VariantOptionSpec {
    pub name: String,
    pub body: PrimSpec,
}

/// An xformOp together with its full attribute name (e.g. `xformOp:scale:size`).
#[derive(Clone, Debug)]
pub struct XformOpSpec {
    pub name: String,
    pub op: XformOp,
}

/// Transform operation types found in USD xformOps.
#[derive(Clone, Debug, PartialEq)]
pub enum XformOp {
    /// Translation (xformOp:translate)
    Translate(DVec3),

    /// Rotation in degrees around X axis
    RotateX(f64),

    /// Rotation in degrees around Y axis
    RotateY(f64),

    /// Rotation in degrees around Z axis
    RotateZ(f64),

    /// Euler rotation in degrees; `order` names the axes in application order
    /// (`rotateXYZ` rotates about X first)
    RotateEuler { order: [Axis; 3], degrees: DVec3 },

    /// Quaternion orientation (xformOp:orient)
    Orient(DQuat),

    /// Scale (uniform or non-uniform)
    Scale(DVec3),

    /// Full 4x4 transform matrix
    Transform(DMat4),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn rotation(self, radians: f64) -> DMat4 {
        match self {
            Axis::X => DMat4::from_rotation_x(radians),
            Axis::Y => DMat4::from_rotation_y(radians),
            Axis::Z => DMat4::from_rotation_z(radians),
        }
    }

    fn component(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

impl XformOp {
    /// Convert this operation to a transformation matrix.
    pub fn to_matrix(&self) -> DMat4 {
        match self {
            XformOp::Translate(t) => DMat4::from_translation(*t),
            XformOp::RotateX(deg) => DMat4::from_rotation_x(deg.to_radians()),
            XformOp::RotateY(deg) => DMat4::from_rotation_y(deg.to_radians()),
            XformOp::RotateZ(deg) => DMat4::from_rotation_z(deg.to_radians()),
            XformOp::RotateEuler { order, degrees } => {
                // First axis is applied first, so it ends up rightmost
                order.iter().fold(DMat4::IDENTITY, |m, axis| {
                    axis.rotation(axis.component(*degrees).to_radians()) * m
                })
            }
            XformOp::Orient(q) => DMat4::from_quat(q.normalize()),
            XformOp::Scale(s) => DMat4::from_scale(*s),
            XformOp::Transform(m) => *m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xform_ops() {
        let translate = XformOp::Translate(DVec3::new(1.0, 2.0, 3.0));
        let matrix = translate.to_matrix();

        let origin = matrix.transform_point3(DVec3::ZERO);
        assert!((origin - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-12);
    }

    #[test]
    fn test_compose_translate_then_scale() {
        // xformOpOrder = [translate, scale]: scale applies to the point first
        let ops = [
            XformOp::Translate(DVec3::new(1.0, 0.0, 0.0)),
            XformOp::Scale(DVec3::splat(2.0)),
        ];
        let m = ops.iter().fold(DMat4::IDENTITY, |m, op| m * op.to_matrix());
        let p = m.transform_point3(DVec3::new(1.0, 0.0, 0.0));
        assert!((p - DVec3::new(3.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_rotate_xyz_applies_x_first() {
        let op = XformOp::RotateEuler {
            order: [Axis::X, Axis::Y, Axis::Z],
            degrees: DVec3::new(90.0, 90.0, 0.0),
        };
        // Y axis: X rotation takes it to +Z, then Y rotation takes +Z to +X
        let p = op.to_matrix().transform_vector3(DVec3::Y);
        assert!((p - DVec3::X).length() < 1e-9);
    }

    #[test]
    fn test_orient_identity() {
        let op = XformOp::Orient(DQuat::IDENTITY);
        assert_eq!(op.to_matrix(), DMat4::IDENTITY);
    }

    #[test]
    fn test_layer_metadata_fallbacks() {
        let meta = LayerMetadata::default();
        assert_eq!(meta.up_axis(), "Y");
        assert_eq!(meta.meters_per_unit(), 0.01);
    }
}
