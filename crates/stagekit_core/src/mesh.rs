//! Mesh geometry read from `Mesh` prims.
//!
//! [`MeshGeometry`] is the authored data as found on the prim (raw counts and
//! indices, possibly invalid). [`WorldMesh`] is the validated, world-space
//! form consumed by the exporters: every face has at least three corners and
//! every index is in range.

use stagekit_math::{Aabb, DMat4, DMat4Ext, DVec3};

use crate::compose::ComposedPrim;
use crate::error::{SceneError, SceneResult};

pub const POINTS: &str = "points";
pub const FACE_VERTEX_COUNTS: &str = "faceVertexCounts";
pub const FACE_VERTEX_INDICES: &str = "faceVertexIndices";
const NORMALS: &str = "normals";
const PRIMVARS_NORMALS: &str = "primvars:normals";

/// How normals map onto the mesh topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// One normal per point
    Vertex,
    /// One normal per face corner
    FaceVarying,
    /// One normal per face
    Uniform,
}

impl Interpolation {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "vertex" | "varying" => Some(Interpolation::Vertex),
            "faceVarying" => Some(Interpolation::FaceVarying),
            "uniform" => Some(Interpolation::Uniform),
            _ => None,
        }
    }
}

/// Authored normals with their interpolation.
#[derive(Clone, Debug, PartialEq)]
pub struct Normals {
    pub values: Vec<DVec3>,
    pub interpolation: Interpolation,
}

/// Geometry as authored on a `Mesh` prim, in local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGeometry {
    pub points: Vec<DVec3>,
    pub face_vertex_counts: Vec<i64>,
    pub face_vertex_indices: Vec<i64>,
    pub normals: Option<Normals>,
}

impl MeshGeometry {
    /// Read geometry from a composed prim. Fails with `NotAMesh` for any
    /// prim whose type is not `Mesh`.
    pub fn from_prim(prim: &ComposedPrim) -> SceneResult<Self> {
        if !prim.is_mesh() {
            return Err(SceneError::NotAMesh(prim.path.clone()));
        }

        let value = |name: &str| prim.attribute(name).and_then(|attr| attr.value.as_ref());

        let points = value(POINTS)
            .and_then(|v| v.as_vec3_array())
            .unwrap_or_default();
        let face_vertex_counts = value(FACE_VERTEX_COUNTS)
            .and_then(|v| v.as_int_array())
            .map(|counts| counts.to_vec())
            .unwrap_or_default();
        let face_vertex_indices = value(FACE_VERTEX_INDICES)
            .and_then(|v| v.as_int_array())
            .map(|indices| indices.to_vec())
            .unwrap_or_default();

        let mut geometry = Self {
            points,
            face_vertex_counts,
            face_vertex_indices,
            normals: None,
        };
        geometry.normals = geometry.read_normals(prim);
        Ok(geometry)
    }

    fn read_normals(&self, prim: &ComposedPrim) -> Option<Normals> {
        let attr = prim
            .attribute(NORMALS)
            .filter(|attr| attr.value.is_some())
            .or_else(|| prim.attribute(PRIMVARS_NORMALS))?;
        let values = attr.value.as_ref()?.as_vec3_array()?;

        let interpolation = match attr.interpolation.as_deref() {
            Some(token) => Interpolation::from_token(token),
            None => self.infer_interpolation(values.len()),
        };

        match interpolation {
            Some(interpolation) => Some(Normals {
                values,
                interpolation,
            }),
            None => {
                log::warn!(
                    "{}: ignoring {} normals that match no interpolation",
                    prim.path,
                    values.len()
                );
                None
            }
        }
    }

    fn infer_interpolation(&self, len: usize) -> Option<Interpolation> {
        if len == self.points.len() {
            Some(Interpolation::Vertex)
        } else if len == self.face_vertex_indices.len() {
            Some(Interpolation::FaceVarying)
        } else if len == self.face_vertex_counts.len() {
            Some(Interpolation::Uniform)
        } else {
            None
        }
    }

    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    /// Local-space bound of the points.
    pub fn bounds(&self) -> Aabb {
        Aabb::enclosing(self.points.iter().copied())
    }

    /// Split the index list into faces, checking the topology.
    ///
    /// Fails with `EmptyMesh` when there are no points or no faces, and with
    /// `DegenerateFace` for a face with fewer than three corners, an index
    /// outside the point list, or counts that disagree with the index list.
    pub fn faces(&self, path: &str) -> SceneResult<Vec<Vec<usize>>> {
        if self.points.is_empty() || self.face_vertex_counts.is_empty() {
            return Err(SceneError::EmptyMesh(path.to_string()));
        }

        let degenerate = |face: usize, reason: String| SceneError::DegenerateFace {
            prim: path.to_string(),
            face,
            reason,
        };

        let mut faces = Vec::with_capacity(self.face_vertex_counts.len());
        let mut cursor = 0usize;
        for (face, &count) in self.face_vertex_counts.iter().enumerate() {
            if count < 3 {
                return Err(degenerate(face, format!("face has {} vertices", count)));
            }
            let count = count as usize;
            let corners = self
                .face_vertex_indices
                .get(cursor..cursor + count)
                .ok_or_else(|| {
                    degenerate(face, "face runs past the end of faceVertexIndices".to_string())
                })?;

            let mut vertices = Vec::with_capacity(count);
            for &index in corners {
                if index < 0 || index as usize >= self.points.len() {
                    return Err(degenerate(
                        face,
                        format!("index {} out of range ({} points)", index, self.points.len()),
                    ));
                }
                vertices.push(index as usize);
            }

            faces.push(vertices);
            cursor += count;
        }

        if cursor != self.face_vertex_indices.len() {
            return Err(degenerate(
                faces.len(),
                format!(
                    "faceVertexCounts covers {} indices but faceVertexIndices has {}",
                    cursor,
                    self.face_vertex_indices.len()
                ),
            ));
        }

        Ok(faces)
    }
}

/// Fan triangulation of one polygon: `(0, i, i + 1)` for `i` in `1..n-1`.
pub fn fan_triangulate(face: &[usize]) -> impl Iterator<Item = [usize; 3]> + '_ {
    (1..face.len().saturating_sub(1)).map(move |i| [face[0], face[i], face[i + 1]])
}

/// Validated mesh geometry in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldMesh {
    /// Prim path the mesh came from
    pub path: String,
    /// Prim name
    pub name: String,
    pub points: Vec<DVec3>,
    /// Original (untriangulated) faces as point indices
    pub faces: Vec<Vec<usize>>,
    /// World-space unit normals, empty when none were authored
    pub normals: Vec<DVec3>,
    /// Per face corner, an index into `normals`; empty when there are no normals
    pub face_normals: Vec<Vec<usize>>,
}

impl WorldMesh {
    /// Validate `geometry` and move it into world space with `world`.
    pub fn new(prim: &ComposedPrim, geometry: &MeshGeometry, world: &DMat4) -> SceneResult<Self> {
        let faces = geometry.faces(&prim.path)?;
        let points = geometry
            .points
            .iter()
            .map(|p| world.transform_point3(*p))
            .collect();

        let (normals, face_normals) = match &geometry.normals {
            Some(normals) => match normal_indices(&faces, normals) {
                Some(face_normals) => (
                    normals
                        .values
                        .iter()
                        .map(|n| world.transform_normal(*n))
                        .collect(),
                    face_normals,
                ),
                None => {
                    log::warn!(
                        "{}: {} normals do not fit {:?} interpolation, exporting without normals",
                        prim.path,
                        normals.values.len(),
                        normals.interpolation
                    );
                    (Vec::new(), Vec::new())
                }
            },
            None => (Vec::new(), Vec::new()),
        };

        Ok(Self {
            path: prim.path.clone(),
            name: prim.name.clone(),
            points,
            faces,
            normals,
            face_normals,
        })
    }

    /// Triangles of every face, fan-triangulated in face order.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        self.faces
            .iter()
            .flat_map(|face| fan_triangulate(face))
            .collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|face| face.len() - 2).sum()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }
}

/// Map every face corner to a normal index, or `None` if the counts do not fit.
fn normal_indices(faces: &[Vec<usize>], normals: &Normals) -> Option<Vec<Vec<usize>>> {
    let corner_count: usize = faces.iter().map(|face| face.len()).sum();
    let fits = match normals.interpolation {
        Interpolation::Vertex => faces.iter().flatten().all(|&i| i < normals.values.len()),
        Interpolation::FaceVarying => normals.values.len() == corner_count,
        Interpolation::Uniform => normals.values.len() == faces.len(),
    };
    if !fits {
        return None;
    }

    let mut corner = 0;
    let indices = faces
        .iter()
        .enumerate()
        .map(|(face_index, face)| {
            let out = match normals.interpolation {
                Interpolation::Vertex => face.clone(),
                Interpolation::FaceVarying => (corner..corner + face.len()).collect(),
                Interpolation::Uniform => vec![face_index; face.len()],
            };
            corner += face.len();
            out
        })
        .collect();
    Some(indices)
}
