//! Scene-wide statistics.

use std::collections::HashSet;

use serde::Serialize;
use stagekit_math::{Aabb, DMat4};

use crate::compose::{ComposedStage, PrimKind};
use crate::mesh::FACE_VERTEX_COUNTS;
use crate::stage::Stage;
use crate::usd::LayerMetadata;

/// A non-empty world-space bound.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundsReport {
    pub min: [f64; 3],
    pub max: [f64; 3],
    pub size: [f64; 3],
    pub center: [f64; 3],
}

impl BoundsReport {
    /// `None` for the empty bound.
    pub fn from_aabb(aabb: &Aabb) -> Option<Self> {
        let min = aabb.min_corner()?;
        let max = aabb.max_corner()?;
        Some(Self {
            min: min.to_array(),
            max: max.to_array(),
            size: aabb.size().to_array(),
            center: aabb.centroid().to_array(),
        })
    }
}

/// Bound size in millimetres, rounded to 0.1 mm.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ExtentMm {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Aggregate counts and bounds of the composed scene.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneStats {
    pub prim_count: usize,
    pub mesh_count: usize,
    /// Distinct `Material` prims
    pub material_count: usize,
    pub total_faces: usize,
    pub up_axis: String,
    pub meters_per_unit: f64,
    /// Union of all mesh world bounds, `null` for a scene without geometry
    pub bounds: Option<BoundsReport>,
    pub bounds_mm: Option<ExtentMm>,
}

impl SceneStats {
    /// One depth-first pass over the composed tree, carrying world matrices
    /// down a stack so no transform is computed twice.
    pub fn compute(stage: &ComposedStage, metadata: &LayerMetadata) -> Self {
        let mut prim_count = 0;
        let mut mesh_count = 0;
        let mut total_faces = 0;
        let mut materials = HashSet::new();
        let mut bounds = Aabb::EMPTY;

        let mut stack: Vec<_> = stage
            .roots()
            .iter()
            .rev()
            .map(|id| (*id, DMat4::IDENTITY))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let prim = stage.get(id);
            let world = parent_world * prim.local_transform;
            prim_count += 1;

            match prim.kind {
                PrimKind::Mesh => {
                    mesh_count += 1;
                    total_faces += prim
                        .attribute(FACE_VERTEX_COUNTS)
                        .and_then(|attr| attr.value.as_ref())
                        .and_then(|value| value.array_len())
                        .unwrap_or(0);
                    bounds = Aabb::surrounding(&bounds, &stage.mesh_world_bounds(id, &world));
                }
                PrimKind::Material => {
                    materials.insert(prim.path.as_str());
                }
                _ => {}
            }

            stack.extend(prim.children.iter().rev().map(|child| (*child, world)));
        }

        let meters_per_unit = metadata.meters_per_unit();
        let to_mm = 1000.0 * meters_per_unit;
        let round = |v: f64| (v * to_mm * 10.0).round() / 10.0;
        let report = BoundsReport::from_aabb(&bounds);

        Self {
            prim_count,
            mesh_count,
            material_count: materials.len(),
            total_faces,
            up_axis: metadata.up_axis().to_string(),
            meters_per_unit,
            bounds_mm: report.map(|b| ExtentMm {
                x: round(b.size[0]),
                y: round(b.size[1]),
                z: round(b.size[2]),
            }),
            bounds: report,
        }
    }
}

impl Stage {
    /// Statistics for the current variant selections.
    pub fn stats(&self) -> SceneStats {
        SceneStats::compute(&self.composed(), self.metadata())
    }
}
