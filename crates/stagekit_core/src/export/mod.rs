//! Mesh export writers.
//!
//! - **STL**: binary triangle soup, fan-triangulated
//! - **OBJ**: Wavefront text polygons, original faces and optional normals
//!
//! Output is encoded fully in memory and validated before anything touches
//! the filesystem, then written to a sibling temporary file and renamed into
//! place. A failed export never leaves a partial file behind.

pub mod obj;
pub mod stl;

pub use obj::encode_obj;
pub use stl::{encode_stl, verify_stl};

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::mesh::WorldMesh;

/// Supported export targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Binary STL
    #[default]
    #[serde(alias = "binary-triangle")]
    Stl,
    /// Wavefront OBJ
    #[serde(alias = "text-polygon")]
    Obj,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Stl => "stl",
            ExportFormat::Obj => "obj",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stl" | "binary-triangle" => Ok(ExportFormat::Stl),
            "obj" | "text-polygon" => Ok(ExportFormat::Obj),
            _ => Err(SceneError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Result of a successful export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub output: PathBuf,
    pub format: ExportFormat,
    /// Triangles after fan triangulation
    pub triangles: usize,
    /// Faces as authored
    pub faces: usize,
    pub points: usize,
    pub size_bytes: u64,
}

/// Encode `mesh` in `format`.
pub fn encode(mesh: &WorldMesh, format: ExportFormat) -> Vec<u8> {
    match format {
        ExportFormat::Stl => encode_stl(mesh),
        ExportFormat::Obj => encode_obj(mesh).into_bytes(),
    }
}

/// Encode `mesh` and write it to `output`.
pub fn export_mesh(
    mesh: &WorldMesh,
    output: &Path,
    format: ExportFormat,
) -> SceneResult<ExportReport> {
    let bytes = encode(mesh, format);
    if format == ExportFormat::Stl {
        verify_stl(&bytes)?;
    }

    write_atomic(output, &bytes)?;
    log::info!(
        "Exported {} to {} ({}, {} triangles, {} bytes)",
        mesh.path,
        output.display(),
        format,
        mesh.triangle_count(),
        bytes.len()
    );

    Ok(ExportReport {
        output: output.to_path_buf(),
        format,
        triangles: mesh.triangle_count(),
        faces: mesh.faces.len(),
        points: mesh.points.len(),
        size_bytes: bytes.len() as u64,
    })
}

/// Write `bytes` to a temporary sibling of `path`, then rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name")
    })?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(format!(".{}.tmp", std::process::id()));
    let temp_path = path.with_file_name(temp_name);

    let result = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
