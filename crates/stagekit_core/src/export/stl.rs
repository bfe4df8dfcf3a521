//! Binary STL writer.
//!
//! Layout (little-endian):
//!
//! ```text
//! [80 bytes]  header, zero-filled
//! [u32]       triangle count
//! per triangle:
//!   [3 x f32] unit normal
//!   [3 x f32] vertex 0
//!   [3 x f32] vertex 1
//!   [3 x f32] vertex 2
//!   [u16]     attribute byte count, always 0
//! ```

use stagekit_math::DVec3;

use crate::error::{SceneError, SceneResult};
use crate::mesh::WorldMesh;

pub const HEADER_LEN: usize = 80;
/// Header plus the triangle count.
pub const PREAMBLE_LEN: usize = HEADER_LEN + 4;
/// 12 floats and the attribute word.
pub const RECORD_LEN: usize = 50;

/// Face normal of a triangle, zero when the triangle is degenerate.
pub fn triangle_normal(v0: DVec3, v1: DVec3, v2: DVec3) -> DVec3 {
    (v1 - v0).cross(v2 - v0).normalize_or_zero()
}

fn put_vec3(out: &mut Vec<u8>, v: DVec3) {
    for component in [v.x, v.y, v.z] {
        out.extend_from_slice(&(component as f32).to_le_bytes());
    }
}

/// Encode `mesh` as binary STL, fan-triangulating every face.
pub fn encode_stl(mesh: &WorldMesh) -> Vec<u8> {
    let triangles = mesh.triangles();
    let mut out = Vec::with_capacity(PREAMBLE_LEN + RECORD_LEN * triangles.len());

    out.extend_from_slice(&[0u8; HEADER_LEN]);
    out.extend_from_slice(&(triangles.len() as u32).to_le_bytes());

    for [a, b, c] in triangles {
        let (v0, v1, v2) = (mesh.points[a], mesh.points[b], mesh.points[c]);
        put_vec3(&mut out, triangle_normal(v0, v1, v2));
        put_vec3(&mut out, v0);
        put_vec3(&mut out, v1);
        put_vec3(&mut out, v2);
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

/// Check that the declared triangle count matches the record data.
///
/// Returns the triangle count.
pub fn verify_stl(bytes: &[u8]) -> SceneResult<u32> {
    let count_bytes: [u8; 4] = bytes
        .get(HEADER_LEN..PREAMBLE_LEN)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            SceneError::CorruptStl(format!("{} bytes is shorter than the header", bytes.len()))
        })?;
    let declared = u32::from_le_bytes(count_bytes);

    let body = bytes.len() - PREAMBLE_LEN;
    if body % RECORD_LEN != 0 || body / RECORD_LEN != declared as usize {
        return Err(SceneError::CorruptStl(format!(
            "header declares {} triangles but {} bytes of records follow",
            declared, body
        )));
    }

    Ok(declared)
}
