//! Material and surface shader lookup.
//!
//! Materials follow `UsdShade`: a `Material` prim's `outputs:surface`
//! connects to a `Shader` prim (usually `UsdPreviewSurface`) whose
//! `inputs:*` attributes are the shader parameters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::compose::{ComposedStage, PrimId, PrimKind};
use crate::value::AttributeValue;

const SURFACE_OUTPUT: &str = "outputs:surface";
const INPUT_PREFIX: &str = "inputs:";

/// A material with its surface shader parameters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaterialInfo {
    /// Material prim path
    pub path: String,

    /// Surface shader prim path, if one could be found
    pub shader: Option<String>,

    /// Shader inputs with the `inputs:` prefix stripped
    pub params: BTreeMap<String, AttributeValue>,

    /// Meshes whose resolved binding names this material
    pub bound_meshes: Vec<String>,

    /// Preview-surface inputs read out of `params`
    pub pbr: PbrSummary,
}

/// The `UsdPreviewSurface` inputs most callers want, when authored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PbrSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffuse_color: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metallic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl PbrSummary {
    pub fn from_params(params: &BTreeMap<String, AttributeValue>) -> Self {
        let scalar = |name: &str| params.get(name).and_then(|v| v.as_f64());
        Self {
            diffuse_color: params
                .get("diffuseColor")
                .and_then(|v| v.as_vec3())
                .map(|c| c.to_array()),
            metallic: scalar("metallic"),
            roughness: scalar("roughness"),
            opacity: scalar("opacity"),
        }
    }
}

impl MaterialInfo {
    /// Collect the material at `id`.
    pub fn from_prim(stage: &ComposedStage, id: PrimId) -> Self {
        let prim = stage.get(id);
        let shader = surface_shader(stage, id);

        let mut params = BTreeMap::new();
        if let Some(shader_id) = shader {
            for (name, attr) in &stage.get(shader_id).attributes {
                let (Some(param), Some(value)) = (name.strip_prefix(INPUT_PREFIX), &attr.value)
                else {
                    continue;
                };
                params.insert(param.to_string(), value.clone());
            }
        }

        Self {
            path: prim.path.clone(),
            shader: shader.map(|shader_id| stage.get(shader_id).path.clone()),
            pbr: PbrSummary::from_params(&params),
            params,
            bound_meshes: stage
                .meshes_bound_to(&prim.path)
                .iter()
                .map(|mesh| stage.get(*mesh).path.clone())
                .collect(),
        }
    }

    /// Every material of the stage, in traversal order.
    pub fn collect(stage: &ComposedStage) -> Vec<Self> {
        stage
            .iter()
            .filter(|(_, prim)| prim.kind == PrimKind::Material)
            .map(|(id, _)| Self::from_prim(stage, id))
            .collect()
    }
}

/// Resolve the surface shader of a material: the target of its
/// `outputs:surface` connection, else its first `Shader` child.
fn surface_shader(stage: &ComposedStage, material: PrimId) -> Option<PrimId> {
    let prim = stage.get(material);

    let connected = prim
        .attribute(SURFACE_OUTPUT)
        .and_then(|attr| attr.connections.first())
        .and_then(|target| {
            // `/Path/To/Shader.outputs:surface` names a property; keep the prim part
            let prim_path = target.split('.').next().unwrap_or(target);
            let found = stage.find(prim_path);
            if found.is_none() {
                log::warn!("{}: surface connection {} does not resolve", prim.path, target);
            }
            found
        });

    connected.or_else(|| {
        prim.children
            .iter()
            .copied()
            .find(|child| stage.get(*child).kind == PrimKind::Shader)
    })
}
