//! Wavefront OBJ writer.
//!
//! Points are written once in their original order and faces keep their
//! original winding; indices are 1-based. With normals, every face corner
//! is written as `v//vn`.

use std::fmt::Write;

use crate::mesh::WorldMesh;

/// Encode `mesh` as OBJ text.
pub fn encode_obj(mesh: &WorldMesh) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "# Exported from {}", mesh.path);
    let _ = writeln!(out, "o {}", mesh.name);

    for p in &mesh.points {
        let _ = writeln!(out, "v {} {} {}", p.x as f32, p.y as f32, p.z as f32);
    }
    for n in &mesh.normals {
        let _ = writeln!(out, "vn {} {} {}", n.x as f32, n.y as f32, n.z as f32);
    }

    for (face_index, face) in mesh.faces.iter().enumerate() {
        out.push('f');
        match mesh.face_normals.get(face_index) {
            Some(normals) if mesh.has_normals() => {
                for (vertex, normal) in face.iter().zip(normals) {
                    let _ = write!(out, " {}//{}", vertex + 1, normal + 1);
                }
            }
            _ => {
                for vertex in face {
                    let _ = write!(out, " {}", vertex + 1);
                }
            }
        }
        out.push('\n');
    }

    out
}
