//! The eight scene operations exposed to remote callers.
//!
//! Every operation takes a scene file path. Stages are opened through a
//! [`StageSource`] and cached per canonical path, so a variant selection
//! made by one call is seen by the calls that follow it. Reads hold the
//! stage's read lock for the whole operation; `set_variant` holds the write
//! lock.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use serde::Serialize;
use stagekit_math::{DMat4, DMat4Ext};

use crate::compose::{ComposedStage, PrimId, PrimKind};
use crate::config::ToolConfig;
use crate::error::{SceneError, SceneResult};
use crate::export::{self, ExportFormat, ExportReport};
use crate::material::MaterialInfo;
use crate::mesh::{MeshGeometry, WorldMesh};
use crate::stage::{SharedStage, Stage};
use crate::stats::{BoundsReport, SceneStats};
use crate::usd::{StageSource, UsdFileSource};
use crate::value::Attribute;
use crate::variants::{self, PrimVariants, VariantChange};

/// A 4x4 matrix as rows in USD's row-vector convention (translation in the last row).
pub type MatrixRows = [[f64; 4]; 4];

fn matrix_rows(m: &DMat4) -> MatrixRows {
    // glam columns are USD rows
    m.to_cols_array_2d()
}

/// One node of the `inspect` tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimNode {
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Face count, meshes only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PrimNode>,
}

/// Result of `inspect`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneTree {
    pub scene: Vec<PrimNode>,
    pub up_axis: String,
    pub meters_per_unit: f64,
}

/// Result of `get_prim`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimReport {
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: PrimKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_kind: Option<String>,
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub xform_op_order: Vec<String>,
    pub local_transform: MatrixRows,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variant_selections: BTreeMap<String, String>,
    /// Resolved bound material (own binding, else nearest ancestor's)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Local-space bound of a mesh's points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<BoundsReport>,
    /// `extent` carried through the world transform (corner bound, may be loose under rotation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_extent: Option<BoundsReport>,
}

/// One entry of `get_transforms`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransformEntry {
    pub path: String,
    pub local_transform: MatrixRows,
    pub world_transform: MatrixRows,
}

struct CachedStage {
    stage: SharedStage,
    modified: Option<SystemTime>,
}

/// Entry point for the scene operations.
pub struct SceneTools {
    source: Box<dyn StageSource>,
    config: ToolConfig,
    cache: Mutex<HashMap<PathBuf, CachedStage>>,
}

impl Default for SceneTools {
    fn default() -> Self {
        Self::new(UsdFileSource, ToolConfig::default())
    }
}

impl SceneTools {
    pub fn new(source: impl StageSource + 'static, config: ToolConfig) -> Self {
        Self {
            source: Box::new(source),
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Open (or reuse) the stage for `scene`.
    pub fn open(&self, scene: impl AsRef<Path>) -> SceneResult<SharedStage> {
        let requested = scene.as_ref();
        let key = std::fs::canonicalize(requested).unwrap_or_else(|_| requested.to_path_buf());
        let modified = self.source.modified(&key);

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(&key) {
                if !self.config.reload_on_change || cached.modified == modified {
                    return Ok(cached.stage.clone());
                }
                log::info!("{} changed on disk, reloading", key.display());
            }
        }

        // Load without holding the cache lock so other files open in parallel
        let stage = self.source.open(&key)?.into_shared();

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.entry(key) {
            // Another call loaded the same file meanwhile; keep its snapshot and
            // any selections already made on it
            Entry::Occupied(entry)
                if !self.config.reload_on_change || entry.get().modified == modified =>
            {
                Ok(entry.get().stage.clone())
            }
            Entry::Occupied(mut entry) => {
                entry.insert(CachedStage {
                    stage: stage.clone(),
                    modified,
                });
                Ok(stage)
            }
            Entry::Vacant(entry) => {
                entry.insert(CachedStage {
                    stage: stage.clone(),
                    modified,
                });
                Ok(stage)
            }
        }
    }

    /// Drop the cached stage for `scene`. Returns whether one was cached.
    pub fn close(&self, scene: impl AsRef<Path>) -> bool {
        let requested = scene.as_ref();
        let key = std::fs::canonicalize(requested).unwrap_or_else(|_| requested.to_path_buf());
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.remove(&key).is_some()
    }

    /// Run `f` against the stage under its read lock.
    fn read<T>(&self, scene: &Path, f: impl FnOnce(&Stage) -> SceneResult<T>) -> SceneResult<T> {
        let shared = self.open(scene)?;
        let stage = shared.read().unwrap_or_else(PoisonError::into_inner);
        f(&stage)
    }

    /// The full prim tree.
    pub fn inspect(&self, scene: impl AsRef<Path>) -> SceneResult<SceneTree> {
        self.read(scene.as_ref(), |stage| {
            let composed = stage.composed();
            Ok(SceneTree {
                scene: composed
                    .roots()
                    .iter()
                    .map(|id| prim_node(&composed, *id))
                    .collect(),
                up_axis: stage.metadata().up_axis().to_string(),
                meters_per_unit: stage.metadata().meters_per_unit(),
            })
        })
    }

    /// Attributes and metadata of one prim.
    pub fn get_prim(&self, scene: impl AsRef<Path>, prim_path: &str) -> SceneResult<PrimReport> {
        self.read(scene.as_ref(), |stage| {
            let composed = stage.composed();
            let id = find(&composed, prim_path)?;
            let prim = composed.get(id);

            let (extent, world_extent) = if prim.is_mesh() {
                let local = MeshGeometry::from_prim(prim)?.bounds();
                let world = composed.world_transform(id).transform_aabb(&local);
                (BoundsReport::from_aabb(&local), BoundsReport::from_aabb(&world))
            } else {
                (None, None)
            };

            Ok(PrimReport {
                path: prim.path.clone(),
                type_name: prim.type_name.clone(),
                kind: prim.kind,
                model_kind: prim.model_kind.clone(),
                attributes: prim.attributes.clone(),
                relationships: prim.relationships.clone(),
                xform_op_order: prim.xform_op_order.clone(),
                local_transform: matrix_rows(&prim.local_transform),
                variant_selections: prim
                    .variant_sets
                    .iter()
                    .filter_map(|set| Some((set.name.clone(), set.selected.clone()?)))
                    .collect(),
                material: composed.bound_material(id).map(str::to_string),
                extent,
                world_extent,
            })
        })
    }

    /// Every material with its shader parameters.
    pub fn get_materials(&self, scene: impl AsRef<Path>) -> SceneResult<Vec<MaterialInfo>> {
        self.read(scene.as_ref(), |stage| Ok(MaterialInfo::collect(&stage.composed())))
    }

    /// Local and world transforms of `prim_path`, or of every transformable prim.
    pub fn get_transforms(
        &self,
        scene: impl AsRef<Path>,
        prim_path: Option<&str>,
    ) -> SceneResult<Vec<TransformEntry>> {
        self.read(scene.as_ref(), |stage| {
            let composed = stage.composed();
            let worlds = composed.world_transforms();

            let ids: Vec<PrimId> = match prim_path {
                Some(path) => vec![find(&composed, path)?],
                None => composed
                    .iter()
                    .filter(|(_, prim)| prim.is_xformable())
                    .map(|(id, _)| id)
                    .collect(),
            };

            Ok(ids
                .into_iter()
                .map(|id| {
                    let prim = composed.get(id);
                    TransformEntry {
                        path: prim.path.clone(),
                        local_transform: matrix_rows(&prim.local_transform),
                        world_transform: matrix_rows(&worlds[id.index()]),
                    }
                })
                .collect())
        })
    }

    /// Variant sets of `prim_path`, or of every prim declaring any.
    pub fn list_variants(
        &self,
        scene: impl AsRef<Path>,
        prim_path: Option<&str>,
    ) -> SceneResult<Vec<PrimVariants>> {
        self.read(scene.as_ref(), |stage| {
            variants::list_variants(&stage.composed(), prim_path)
        })
    }

    /// Switch a variant selection in the cached stage.
    pub fn set_variant(
        &self,
        scene: impl AsRef<Path>,
        prim_path: &str,
        variant_set: &str,
        option: &str,
    ) -> SceneResult<VariantChange> {
        let shared = self.open(scene)?;
        let mut stage = shared.write().unwrap_or_else(PoisonError::into_inner);
        stage.set_variant(prim_path, variant_set, option)
    }

    /// Export a mesh prim in world space. `format` falls back to the
    /// configured default.
    pub fn export_mesh(
        &self,
        scene: impl AsRef<Path>,
        prim_path: &str,
        output: impl AsRef<Path>,
        format: Option<ExportFormat>,
    ) -> SceneResult<ExportReport> {
        let format = format.unwrap_or(self.config.default_export_format);
        self.read(scene.as_ref(), |stage| {
            let composed = stage.composed();
            let id = find(&composed, prim_path)?;
            let prim = composed.get(id);

            let geometry = MeshGeometry::from_prim(prim)?;
            let mesh = WorldMesh::new(prim, &geometry, &composed.world_transform(id))?;
            export::export_mesh(&mesh, output.as_ref(), format)
        })
    }

    /// Counts and bounds for the current variant selections.
    pub fn scene_stats(&self, scene: impl AsRef<Path>) -> SceneResult<SceneStats> {
        self.read(scene.as_ref(), |stage| Ok(stage.stats()))
    }
}

fn find(stage: &ComposedStage, path: &str) -> SceneResult<PrimId> {
    stage
        .find(path)
        .ok_or_else(|| SceneError::PrimNotFound(path.to_string()))
}

fn prim_node(stage: &ComposedStage, id: PrimId) -> PrimNode {
    let prim = stage.get(id);
    let faces = if prim.is_mesh() {
        MeshGeometry::from_prim(prim)
            .ok()
            .map(|geometry| geometry.face_count())
            .filter(|count| *count > 0)
    } else {
        None
    };

    PrimNode {
        path: prim.path.clone(),
        type_name: prim.type_name.clone(),
        faces,
        children: prim
            .children
            .iter()
            .map(|child| prim_node(stage, *child))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::usd::load_usda_from_string;

    const SCENE: &str = r#"#usda 1.0
(
    upAxis = "Z"
    metersPerUnit = 1
)

def Xform "World"
{
    double3 xformOp:translate = (0, 0, 5)
    uniform token[] xformOpOrder = ["xformOp:translate"]

    def Mesh "Tri"
    {
        point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
        int[] faceVertexCounts = [3]
        int[] faceVertexIndices = [0, 1, 2]
        rel material:binding = </World/Red>
    }

    def Material "Red"
    {
    }

    def Scope "Empty"
    {
    }
}
"#;

    /// Serves one in-memory scene and counts how often it is opened.
    struct MemorySource {
        opens: Arc<AtomicUsize>,
    }

    impl StageSource for MemorySource {
        fn open(&self, path: &Path) -> SceneResult<Stage> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            load_usda_from_string(SCENE, path)
        }

        fn modified(&self, _path: &Path) -> Option<SystemTime> {
            None
        }
    }

    fn tools() -> (SceneTools, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let source = MemorySource {
            opens: opens.clone(),
        };
        (SceneTools::new(source, ToolConfig::default()), opens)
    }

    #[test]
    fn test_inspect_tree() {
        let (tools, _) = tools();
        let tree = tools.inspect("mem.usda").unwrap();
        assert_eq!(tree.up_axis, "Z");
        assert_eq!(tree.meters_per_unit, 1.0);
        assert_eq!(tree.scene.len(), 1);

        let world = &tree.scene[0];
        assert_eq!(world.type_name, "Xform");
        assert_eq!(world.children.len(), 3);
        assert_eq!(world.children[0].faces, Some(1));
        assert_eq!(world.children[1].faces, None);
    }

    #[test]
    fn test_get_prim() {
        let (tools, _) = tools();
        let report = tools.get_prim("mem.usda", "/World/Tri").unwrap();
        assert_eq!(report.kind, PrimKind::Mesh);
        assert_eq!(report.material.as_deref(), Some("/World/Red"));
        assert!(report.attributes.contains_key("points"));
        let extent = report.extent.unwrap();
        assert_eq!(extent.max, [1.0, 1.0, 0.0]);
        let world_extent = report.world_extent.unwrap();
        assert_eq!(world_extent.min, [0.0, 0.0, 5.0]);
        assert_eq!(world_extent.max, [1.0, 1.0, 5.0]);

        let err = tools.get_prim("mem.usda", "/World/Nope").unwrap_err();
        assert!(matches!(err, SceneError::PrimNotFound(ref p) if p == "/World/Nope"));
    }

    #[test]
    fn test_get_transforms() {
        let (tools, _) = tools();
        let all = tools.get_transforms("mem.usda", None).unwrap();
        let paths: Vec<&str> = all.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["/World", "/World/Tri"]);

        let tri = tools.get_transforms("mem.usda", Some("/World/Tri")).unwrap();
        assert_eq!(tri[0].world_transform[3], [0.0, 0.0, 5.0, 1.0]);
        assert_eq!(tri[0].local_transform[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_stage_is_cached_between_calls() {
        let (tools, opens) = tools();
        tools.scene_stats("mem.usda").unwrap();
        tools.get_materials("mem.usda").unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        assert!(tools.close("mem.usda"));
        tools.scene_stats("mem.usda").unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_export_non_mesh() {
        let (tools, _) = tools();
        let dir = tempfile::tempdir().unwrap();
        let err = tools
            .export_mesh("mem.usda", "/World", dir.path().join("out.stl"), None)
            .unwrap_err();
        assert!(matches!(err, SceneError::NotAMesh(_)));
    }

    #[test]
    fn test_export_uses_world_space() {
        let (tools, _) = tools();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("tri.obj");
        let report = tools
            .export_mesh("mem.usda", "/World/Tri", &output, Some(ExportFormat::Obj))
            .unwrap();
        assert_eq!(report.format, ExportFormat::Obj);

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("v 1 0 5\n"));
    }

    const GPRIMS: &str = r#"#usda 1.0

def Xform "World"
{
    def Cube "Box"
    {
        double size = 2
    }

    def Camera "Cam"
    {
    }

    def Scope "Looks"
    {
        def Material "Mat"
        {
        }
    }

    def "Group"
    {
    }
}
"#;

    struct GprimSource;

    impl StageSource for GprimSource {
        fn open(&self, path: &Path) -> SceneResult<Stage> {
            load_usda_from_string(GPRIMS, path)
        }

        fn modified(&self, _path: &Path) -> Option<SystemTime> {
            None
        }
    }

    #[test]
    fn test_get_transforms_includes_gprims_without_ops() {
        let tools = SceneTools::new(GprimSource, ToolConfig::default());
        let all = tools.get_transforms("gprims.usda", None).unwrap();
        let paths: Vec<&str> = all.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["/World", "/World/Box", "/World/Cam"]);
    }

    const PRODUCT: &str = r#"#usda 1.0

def Xform "Product" (
    variants = {
        string color = "red"
    }
)
{
    variantSet "color" = {
        "red" {
        }
        "blue" {
        }
    }
}
"#;

    /// Every open after the first takes much longer than the first.
    struct SlowSource {
        opens: AtomicUsize,
    }

    impl StageSource for SlowSource {
        fn open(&self, path: &Path) -> SceneResult<Stage> {
            let delay = match self.opens.fetch_add(1, Ordering::SeqCst) {
                0 => 50,
                _ => 300,
            };
            std::thread::sleep(Duration::from_millis(delay));
            load_usda_from_string(PRODUCT, path)
        }

        fn modified(&self, _path: &Path) -> Option<SystemTime> {
            None
        }
    }

    #[test]
    fn test_late_first_open_keeps_selection() {
        let source = SlowSource {
            opens: AtomicUsize::new(0),
        };
        let tools = SceneTools::new(source, ToolConfig::default());

        std::thread::scope(|s| {
            let writer = s.spawn(|| tools.set_variant("product.usda", "/Product", "color", "blue"));
            std::thread::sleep(Duration::from_millis(10));
            let reader = s.spawn(|| tools.scene_stats("product.usda"));

            let change = writer.join().unwrap().unwrap();
            assert_eq!(change.selected, "blue");
            reader.join().unwrap().unwrap();
        });

        let listing = tools.list_variants("product.usda", Some("/Product")).unwrap();
        assert_eq!(listing[0].variant_sets[0].selected.as_deref(), Some("blue"));
    }

    #[test]
    fn test_missing_file() {
        let tools = SceneTools::default();
        let err = tools.scene_stats("/no/such/scene.usda").unwrap_err();
        assert_eq!(err.code(), "scene_load");
    }
}
