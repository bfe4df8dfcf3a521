//! End-to-end runs of the scene operations against files on disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use stagekit_core::{ExportFormat, SceneError, SceneTools, ToolConfig};

const BOXES: &str = r#"#usda 1.0
(
    defaultPrim = "Root"
    upAxis = "Y"
    metersPerUnit = 0.01
)

def Xform "Root"
{
    double3 xformOp:scale = (2, 2, 2)
    uniform token[] xformOpOrder = ["xformOp:scale"]

    def Mesh "BoxA"
    {
        double3 xformOp:translate = (1, 0, 0)
        uniform token[] xformOpOrder = ["xformOp:translate"]

        point3f[] points = [(0, 0, 0), (1, 0, 0), (1, 1, 0), (0, 1, 0), (0, 0, 1), (1, 0, 1), (1, 1, 1), (0, 1, 1)]
        int[] faceVertexCounts = [4, 4, 4, 4, 4, 4]
        int[] faceVertexIndices = [0, 3, 2, 1, 4, 5, 6, 7, 0, 1, 5, 4, 1, 2, 6, 5, 2, 3, 7, 6, 3, 0, 4, 7]
    }
}
"#;

const PRODUCT: &str = r#"#usda 1.0
(
    upAxis = "Z"
    metersPerUnit = 1
)

def Xform "Product" (
    variants = {
        string color = "red"
    }
    prepend variantSets = "color"
)
{
    def Mesh "Body"
    {
        point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
        int[] faceVertexCounts = [3]
        int[] faceVertexIndices = [0, 1, 2]
    }

    def Material "RedPaint"
    {
    }

    def Material "BluePaint"
    {
    }

    variantSet "color" = {
        "red" {
            over "Body"
            {
                rel material:binding = </Product/RedPaint>
            }

            def Mesh "Stripe"
            {
                point3f[] points = [(0, 0, 2), (1, 0, 2), (1, 1, 2), (0, 1, 2)]
                int[] faceVertexCounts = [4]
                int[] faceVertexIndices = [0, 1, 2, 3]
            }
        }
        "blue" {
            over "Body"
            {
                rel material:binding = </Product/BluePaint>
            }
        }
    }
}
"#;

const BROKEN_INDICES: &str = r#"#usda 1.0

def Mesh "Bad"
{
    point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 1, 7]
}
"#;

fn write_scene(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_nested_transform_export() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "boxes.usda", BOXES);
    let tools = SceneTools::default();

    let transforms = tools.get_transforms(&scene, Some("/Root/BoxA")).unwrap();
    let world = transforms[0].world_transform;
    // Scale 2 applied after the local translate
    assert_eq!(world[0], [2.0, 0.0, 0.0, 0.0]);
    assert_eq!(world[1], [0.0, 2.0, 0.0, 0.0]);
    assert_eq!(world[2], [0.0, 0.0, 2.0, 0.0]);
    assert_eq!(world[3], [2.0, 0.0, 0.0, 1.0]);

    let stl = dir.path().join("box.stl");
    let report = tools
        .export_mesh(&scene, "/Root/BoxA", &stl, Some(ExportFormat::Stl))
        .unwrap();
    assert_eq!(report.triangles, 12);
    assert_eq!(report.size_bytes, 84 + 50 * 12);
    let bytes = fs::read(&stl).unwrap();
    assert_eq!(bytes.len(), 684);
    assert_eq!(u32::from_le_bytes(bytes[80..84].try_into().unwrap()), 12);

    let obj = dir.path().join("box.obj");
    let report = tools
        .export_mesh(&scene, "/Root/BoxA", &obj, Some(ExportFormat::Obj))
        .unwrap();
    assert_eq!(report.faces, 6);
    assert_eq!(report.points, 8);

    let text = fs::read_to_string(&obj).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 8);
    let faces: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
    assert_eq!(faces.len(), 6);
    for face in faces {
        for index in face.split_whitespace().skip(1) {
            let index: usize = index.parse().unwrap();
            assert!((1..=8).contains(&index));
        }
    }
    // Last point (0, 1, 1) lands at 2 * (1, 1, 1)
    assert!(text.contains("v 2 2 2\n"));
}

#[test]
fn test_export_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "boxes.usda", BOXES);
    let tools = SceneTools::default();

    for format in [ExportFormat::Stl, ExportFormat::Obj] {
        let first = dir.path().join(format!("first.{}", format.extension()));
        let second = dir.path().join(format!("second.{}", format.extension()));
        tools.export_mesh(&scene, "/Root/BoxA", &first, Some(format)).unwrap();
        tools.export_mesh(&scene, "/Root/BoxA", &second, Some(format)).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }
}

#[test]
fn test_scene_bounds_in_world_space() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "boxes.usda", BOXES);
    let tools = SceneTools::default();

    let stats = tools.scene_stats(&scene).unwrap();
    assert_eq!(stats.prim_count, 2);
    assert_eq!(stats.mesh_count, 1);
    assert_eq!(stats.total_faces, 6);
    assert_eq!(stats.up_axis, "Y");

    let bounds = stats.bounds.unwrap();
    assert_eq!(bounds.min, [2.0, 0.0, 0.0]);
    assert_eq!(bounds.max, [4.0, 2.0, 2.0]);

    // 2 units at 1 cm per unit
    let mm = stats.bounds_mm.unwrap();
    assert!(approx(mm.x, 20.0));
    assert!(approx(mm.y, 20.0));
    assert!(approx(mm.z, 20.0));

    // The mesh bound is inside the scene bound
    let prim = tools.get_prim(&scene, "/Root/BoxA").unwrap();
    let world_extent = prim.world_extent.unwrap();
    for axis in 0..3 {
        assert!(world_extent.min[axis] >= bounds.min[axis]);
        assert!(world_extent.max[axis] <= bounds.max[axis]);
    }
}

#[test]
fn test_unknown_option_keeps_selection() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "product.usda", PRODUCT);
    let tools = SceneTools::default();

    let err = tools
        .set_variant(&scene, "/Product", "color", "green")
        .unwrap_err();
    match err {
        SceneError::UnknownVariantOption {
            ref option,
            ref available,
            ..
        } => {
            assert_eq!(option, "green");
            assert_eq!(available, &vec!["red".to_string(), "blue".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let listed = tools.list_variants(&scene, Some("/Product")).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].variant_sets[0].selected.as_deref(), Some("red"));

    let err = tools
        .set_variant(&scene, "/Product", "size", "large")
        .unwrap_err();
    assert_eq!(err.code(), "unknown_variant_set");
}

#[test]
fn test_variant_switch_changes_scene() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "product.usda", PRODUCT);
    let tools = SceneTools::default();

    let before = tools.scene_stats(&scene).unwrap();
    assert_eq!(before.mesh_count, 2);
    assert_eq!(before.material_count, 2);
    assert_eq!(
        tools.get_prim(&scene, "/Product/Body").unwrap().material.as_deref(),
        Some("/Product/RedPaint")
    );

    let change = tools.set_variant(&scene, "/Product", "color", "blue").unwrap();
    assert_eq!(change.previous.as_deref(), Some("red"));
    assert_eq!(change.selected, "blue");

    let after = tools.scene_stats(&scene).unwrap();
    assert_eq!(after.mesh_count, 1);
    assert_eq!(after.total_faces, 1);
    assert_eq!(after.bounds.unwrap().max, [1.0, 1.0, 0.0]);

    let err = tools.get_prim(&scene, "/Product/Stripe").unwrap_err();
    assert!(matches!(err, SceneError::PrimNotFound(_)));
    assert_eq!(
        tools.get_prim(&scene, "/Product/Body").unwrap().material.as_deref(),
        Some("/Product/BluePaint")
    );

    let materials = tools.get_materials(&scene).unwrap();
    let blue = materials
        .iter()
        .find(|m| m.path == "/Product/BluePaint")
        .unwrap();
    assert_eq!(blue.bound_meshes, vec!["/Product/Body".to_string()]);

    let inspect = tools.inspect(&scene).unwrap();
    let names: Vec<&str> = inspect.scene[0]
        .children
        .iter()
        .map(|c| c.path.as_str())
        .collect();
    assert_eq!(names, vec!["/Product/Body", "/Product/RedPaint", "/Product/BluePaint"]);
}

#[test]
fn test_selection_survives_until_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "product.usda", PRODUCT);
    let tools = SceneTools::default();

    tools.set_variant(&scene, "/Product", "color", "blue").unwrap();
    assert_eq!(tools.scene_stats(&scene).unwrap().mesh_count, 1);

    // Rewriting the file with a later mtime drops the session selection
    let mut file = fs::File::create(&scene).unwrap();
    file.write_all(PRODUCT.as_bytes()).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
    drop(file);

    assert_eq!(tools.scene_stats(&scene).unwrap().mesh_count, 2);
}

#[test]
fn test_selection_kept_without_reload() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "product.usda", PRODUCT);
    let config = ToolConfig {
        reload_on_change: false,
        ..ToolConfig::default()
    };
    let tools = SceneTools::new(stagekit_core::UsdFileSource, config);

    tools.set_variant(&scene, "/Product", "color", "blue").unwrap();
    let file = fs::File::options().write(true).open(&scene).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
    drop(file);

    assert_eq!(tools.scene_stats(&scene).unwrap().mesh_count, 1);
}

#[test]
fn test_bad_index_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "bad.usda", BROKEN_INDICES);
    let tools = SceneTools::default();

    let output = dir.path().join("bad.stl");
    let err = tools.export_mesh(&scene, "/Bad", &output, None).unwrap_err();
    assert!(matches!(err, SceneError::DegenerateFace { face: 0, .. }));
    assert!(!output.exists());
    // Only the scene file is in the directory
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_default_format_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "boxes.usda", BOXES);
    let config: ToolConfig = serde_json::from_str(r#"{"default_export_format": "text-polygon"}"#).unwrap();
    let tools = SceneTools::new(stagekit_core::UsdFileSource, config);

    let output = dir.path().join("box.out");
    let report = tools.export_mesh(&scene, "/Root/BoxA", &output, None).unwrap();
    assert_eq!(report.format, ExportFormat::Obj);
    assert!(fs::read_to_string(&output).unwrap().starts_with("# Exported from /Root/BoxA\n"));
}

#[test]
fn test_usdz_package() {
    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("boxes.usdz");

    let mut writer = zip::ZipWriter::new(fs::File::create(&package).unwrap());
    writer
        .start_file("boxes.usda", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(BOXES.as_bytes()).unwrap();
    writer.finish().unwrap();

    let tools = SceneTools::default();
    let tree = tools.inspect(&package).unwrap();
    assert_eq!(tree.scene[0].path, "/Root");
    assert_eq!(tree.scene[0].children[0].faces, Some(6));
}

#[test]
fn test_binary_crate_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let scene = dir.path().join("scene.usdc");
    fs::write(&scene, b"PXR-USDC\x00\x00\x00\x00").unwrap();

    let err = SceneTools::default().inspect(&scene).unwrap_err();
    assert_eq!(err.code(), "scene_load");
}

#[test]
fn test_parallel_readers() {
    let dir = tempfile::tempdir().unwrap();
    let scene = write_scene(dir.path(), "product.usda", PRODUCT);
    let tools = SceneTools::default();

    std::thread::scope(|scope| {
        for option in ["blue", "red", "blue", "red"] {
            let (tools, scene) = (&tools, &scene);
            scope.spawn(move || {
                tools.set_variant(scene, "/Product", "color", option).unwrap();
            });
            scope.spawn(move || {
                // Either selection, never a mix
                let stats = tools.scene_stats(scene).unwrap();
                assert!(stats.mesh_count == 1 || stats.mesh_count == 2);
                assert_eq!(stats.total_faces, stats.mesh_count);
            });
        }
    });
}
