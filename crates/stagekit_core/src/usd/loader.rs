//! High-level stage loading.
//!
//! Supported sources:
//! - `.usda` - ASCII text layer
//! - `.usdz` - zip package whose root layer is ASCII
//!
//! Binary crate layers (`PXR-USDC`) are detected and rejected.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{SceneError, SceneResult};
use crate::stage::Stage;
use crate::usd::parser::parse_usda;

/// Magic bytes at the start of a binary crate layer.
const USDC_MAGIC: &[u8] = b"PXR-USDC";

/// Opens scene files into stage snapshots.
pub trait StageSource: Send + Sync {
    /// Build a fresh snapshot of the scene at `path`.
    fn open(&self, path: &Path) -> SceneResult<Stage>;

    /// Modification time of the scene at `path`, used to refresh cached snapshots.
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// Reads `.usda` and `.usdz` files from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsdFileSource;

impl StageSource for UsdFileSource {
    fn open(&self, path: &Path) -> SceneResult<Stage> {
        load_stage(path)
    }
}

/// Load a stage from a `.usda` or `.usdz` file.
///
/// # Example
///
/// ```ignore
/// use stagekit_core::usd::load_stage;
///
/// let stage = load_stage("product_configurator.usda")?;
/// ```
pub fn load_stage<P: AsRef<Path>>(path: P) -> SceneResult<Stage> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SceneError::load(path, "file not found"));
    }

    let is_usdz = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("usdz"));

    let content = if is_usdz {
        read_usdz(path)?
    } else {
        let bytes = std::fs::read(path).map_err(|e| SceneError::load(path, e.to_string()))?;
        layer_text(path, bytes)?
    };

    load_usda_from_string(&content, path)
}

/// Load a stage from USDA text (useful for testing).
///
/// `source` names the snapshot in logs and errors; nothing is read from it.
pub fn load_usda_from_string(content: &str, source: impl Into<PathBuf>) -> SceneResult<Stage> {
    let source = source.into();
    let layer = parse_usda(content).map_err(|e| SceneError::load(&source, e.to_string()))?;

    let stage = Stage::new(source, layer);
    log::info!(
        "Opened stage {} ({} prims)",
        stage.source_path().display(),
        stage.composed().len()
    );
    Ok(stage)
}

/// Decode a layer's bytes as USDA text, rejecting binary crate layers.
fn layer_text(path: &Path, bytes: Vec<u8>) -> SceneResult<String> {
    if bytes.starts_with(USDC_MAGIC) {
        return Err(SceneError::load(path, "binary crate layers are not supported"));
    }
    String::from_utf8(bytes).map_err(|_| SceneError::load(path, "layer is not valid UTF-8 text"))
}

/// Read the root layer of a `.usdz` package.
///
/// The root layer is the first `.usd*` entry in the archive.
fn read_usdz(path: &Path) -> SceneResult<String> {
    let file = File::open(path).map_err(|e| SceneError::load(path, e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| SceneError::load(path, format!("Failed to open USDZ archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SceneError::load(path, format!("Failed to read archive entry: {e}")))?;

        let name = entry.name().to_string();
        let is_layer = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "usda" | "usdc" | "usd"));
        if !is_layer {
            continue;
        }

        log::debug!("Reading root layer {} from {}", name, path.display());
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| SceneError::load(path, format!("Failed to read {name}: {e}")))?;
        return layer_text(path, bytes);
    }

    Err(SceneError::load(path, "no USD layer found in USDZ archive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TRIANGLE: &str = r#"#usda 1.0
(
    upAxis = "Z"
)

def Mesh "Triangle" {
    point3f[] points = [(0, 0, 0), (1, 0, 0), (0.5, 1, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 1, 2]
}
"#;

    #[test]
    fn test_load_from_string() {
        let stage = load_usda_from_string(TRIANGLE, "test.usda").unwrap();
        assert_eq!(stage.metadata().up_axis(), "Z");
        assert!(stage.composed().find("/Triangle").is_some());
    }

    #[test]
    fn test_load_usda_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.usda");
        std::fs::write(&path, TRIANGLE).unwrap();

        let stage = UsdFileSource.open(&path).unwrap();
        assert_eq!(stage.composed().len(), 1);
        assert!(UsdFileSource.modified(&path).is_some());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_stage("/definitely/not/here.usda").unwrap_err();
        assert!(matches!(err, SceneError::SceneLoad { .. }));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_binary_crate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.usdc");
        std::fs::write(&path, b"PXR-USDC\x00\x00\x00\x00").unwrap();

        let err = load_stage(&path).unwrap_err();
        assert!(err.to_string().contains("binary crate"));
    }

    #[test]
    fn test_malformed_layer_is_load_error() {
        let err = load_usda_from_string("def Xform \"Open\"\n{\n", "broken.usda").unwrap_err();
        assert_eq!(err.code(), "scene_load");
    }

    #[test]
    fn test_load_usdz_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.usdz");

        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("textures/readme.txt", options).unwrap();
        writer.write_all(b"not a layer").unwrap();
        writer.start_file("scene.usda", options).unwrap();
        writer.write_all(TRIANGLE.as_bytes()).unwrap();
        writer.finish().unwrap();

        let stage = load_stage(&path).unwrap();
        assert!(stage.composed().find("/Triangle").is_some());
    }
}
