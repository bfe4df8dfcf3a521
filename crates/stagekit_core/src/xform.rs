//! World-space transforms and bounds.
//!
//! `world(prim) = world(parent) * local(prim)`; root prims sit under the
//! implicit pseudo-root, so their world transform is their local transform.
//! All composition is done in double precision.

use stagekit_math::{Aabb, DMat4};

use crate::compose::{ComposedStage, PrimId};
use crate::mesh::POINTS;

impl ComposedStage {
    /// World transform of `id`, composed from the root down.
    pub fn world_transform(&self, id: PrimId) -> DMat4 {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(prim_id) = current {
            let prim = self.get(prim_id);
            chain.push(prim.local_transform);
            current = prim.parent;
        }

        chain
            .iter()
            .rev()
            .fold(DMat4::IDENTITY, |world, local| world * *local)
    }

    /// World transforms of every prim, indexed by [`PrimId::index`].
    ///
    /// Prims are stored parents-first, so one forward pass suffices.
    pub fn world_transforms(&self) -> Vec<DMat4> {
        let mut worlds: Vec<DMat4> = Vec::with_capacity(self.len());
        for (_, prim) in self.iter() {
            let parent_world = prim
                .parent
                .map(|parent| worlds[parent.index()])
                .unwrap_or(DMat4::IDENTITY);
            worlds.push(parent_world * prim.local_transform);
        }
        worlds
    }

    /// World-space bound of `id`: its own points for a mesh, plus the union
    /// of everything beneath it. Empty when there is no geometry.
    pub fn world_bounds(&self, id: PrimId) -> Aabb {
        let worlds = self.world_transforms();
        self.world_bounds_with(id, &worlds)
    }

    /// Like [`world_bounds`](Self::world_bounds), reusing precomputed world transforms.
    pub fn world_bounds_with(&self, id: PrimId, worlds: &[DMat4]) -> Aabb {
        self.subtree(id)
            .into_iter()
            .fold(Aabb::EMPTY, |bounds, prim_id| {
                let mesh = self.mesh_world_bounds(prim_id, &worlds[prim_id.index()]);
                Aabb::surrounding(&bounds, &mesh)
            })
    }

    /// World-space bound of one prim's own points (empty for non-meshes).
    pub(crate) fn mesh_world_bounds(&self, id: PrimId, world: &DMat4) -> Aabb {
        let prim = self.get(id);
        if !prim.is_mesh() {
            return Aabb::EMPTY;
        }

        let points = prim
            .attribute(POINTS)
            .and_then(|attr| attr.value.as_ref())
            .and_then(|value| value.as_vec3_array())
            .unwrap_or_default();

        Aabb::enclosing(points.iter().map(|p| world.transform_point3(*p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::parse_usda;
    use stagekit_math::DVec3;

    const BOXES: &str = r#"
def Xform "Root"
{
    float3 xformOp:scale = (2, 2, 2)
    uniform token[] xformOpOrder = ["xformOp:scale"]

    def Mesh "BoxA"
    {
        double3 xformOp:translate = (1, 0, 0)
        uniform token[] xformOpOrder = ["xformOp:translate"]
        point3f[] points = [(-0.5, -0.5, -0.5), (0.5, -0.5, -0.5), (0.5, 0.5, -0.5), (-0.5, 0.5, -0.5),
                            (-0.5, -0.5, 0.5), (0.5, -0.5, 0.5), (0.5, 0.5, 0.5), (-0.5, 0.5, 0.5)]
        int[] faceVertexCounts = [4, 4, 4, 4, 4, 4]
        int[] faceVertexIndices = [0, 3, 2, 1, 4, 5, 6, 7, 0, 1, 5, 4, 2, 3, 7, 6, 1, 2, 6, 5, 0, 4, 7, 3]
    }

    def Xform "Group"
    {
        double3 xformOp:translate = (0, 0, 10)

        def Mesh "Tri"
        {
            point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
            int[] faceVertexCounts = [3]
            int[] faceVertexIndices = [0, 1, 2]
        }
    }

    def Xform "Empty"
    {
    }
}
"#;

    fn stage() -> ComposedStage {
        ComposedStage::compose(&parse_usda(BOXES).unwrap())
    }

    #[test]
    fn test_root_world_is_local() {
        let stage = stage();
        let root = stage.find("/Root").unwrap();
        assert_eq!(stage.world_transform(root), stage.get(root).local_transform);
    }

    #[test]
    fn test_world_transform_parent_then_local() {
        let stage = stage();
        let box_a = stage.find("/Root/BoxA").unwrap();
        let world = stage.world_transform(box_a);

        let expected = DMat4::from_scale(DVec3::splat(2.0))
            * DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0));
        assert!(world.abs_diff_eq(expected, 1e-12));

        let origin = world.transform_point3(DVec3::ZERO);
        assert!((origin - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_world_transforms_match_per_prim() {
        let stage = stage();
        let worlds = stage.world_transforms();
        for (id, _) in stage.iter() {
            assert!(worlds[id.index()].abs_diff_eq(stage.world_transform(id), 1e-12));
        }
    }

    #[test]
    fn test_mesh_bounds() {
        let stage = stage();
        let bounds = stage.world_bounds(stage.find("/Root/BoxA").unwrap());
        assert_eq!(bounds.min_corner(), Some(DVec3::new(1.0, -1.0, -1.0)));
        assert_eq!(bounds.max_corner(), Some(DVec3::new(3.0, 1.0, 1.0)));
    }

    #[test]
    fn test_parent_bounds_contain_children() {
        let stage = stage();
        let worlds = stage.world_transforms();
        for (id, prim) in stage.iter() {
            let bounds = stage.world_bounds_with(id, &worlds);
            for child in &prim.children {
                assert!(bounds.contains(&stage.world_bounds_with(*child, &worlds)));
            }
        }
    }

    #[test]
    fn test_empty_subtree_has_empty_bounds() {
        let stage = stage();
        let bounds = stage.world_bounds(stage.find("/Root/Empty").unwrap());
        assert!(bounds.is_empty());
        assert_eq!(bounds.min_corner(), None);
    }
}
