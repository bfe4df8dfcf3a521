//! Composition of authored prim specs into the resolved prim tree.
//!
//! Every prim is built from an ordered list of contributing specs, strongest
//! first: the prim's own spec, the bodies of its selected variant options,
//! then `over`s authored inside the selected variant bodies of its ancestors.
//! The result is an arena of [`ComposedPrim`]s addressed by [`PrimId`], in
//! depth-first order, with a path index and a material binding index beside it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use stagekit_math::DMat4;

use crate::usd::{PrimSpec, Specifier, UsdLayer, XformOp};
use crate::value::Attribute;
use crate::variants::VariantSet;

/// Relationship naming a prim's bound material.
pub const MATERIAL_BINDING: &str = "material:binding";

/// Prefix marking an inverted op in `xformOpOrder`.
const INVERT_PREFIX: &str = "!invert!";

/// Index of a prim in a [`ComposedStage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PrimId(usize);

impl PrimId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Coarse schema classification of a prim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PrimKind {
    Xform,
    Mesh,
    Material,
    Shader,
    Scope,
    Other,
}

impl PrimKind {
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "Xform" => PrimKind::Xform,
            "Mesh" => PrimKind::Mesh,
            "Material" => PrimKind::Material,
            "Shader" => PrimKind::Shader,
            "Scope" => PrimKind::Scope,
            _ => PrimKind::Other,
        }
    }
}

/// One step from a layer's root prims to a nested spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AddressStep {
    Child(usize),
    Variant { set: usize, option: usize },
}

/// Location of a prim spec inside a [`UsdLayer`], stable across recomposition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SpecAddress(Vec<AddressStep>);

impl SpecAddress {
    fn root(index: usize) -> Self {
        SpecAddress(vec![AddressStep::Child(index)])
    }

    fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(AddressStep::Child(index));
        SpecAddress(steps)
    }

    fn variant(&self, set: usize, option: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(AddressStep::Variant { set, option });
        SpecAddress(steps)
    }

    /// Follow this address into `layer`.
    pub(crate) fn resolve_mut<'a>(&self, layer: &'a mut UsdLayer) -> Option<&'a mut PrimSpec> {
        let mut steps = self.0.iter();
        let mut spec = match steps.next()? {
            AddressStep::Child(i) => layer.prims.get_mut(*i)?,
            AddressStep::Variant { .. } => return None,
        };
        for step in steps {
            spec = match *step {
                AddressStep::Child(i) => spec.children.get_mut(i)?,
                AddressStep::Variant { set, option } => {
                    &mut spec.variant_sets.get_mut(set)?.options.get_mut(option)?.body
                }
            };
        }
        Some(spec)
    }
}

/// A prim of the resolved tree.
#[derive(Clone, Debug)]
pub struct ComposedPrim {
    pub path: String,
    pub name: String,
    /// Schema type name, empty for typeless prims
    pub type_name: String,
    pub kind: PrimKind,
    pub parent: Option<PrimId>,
    pub children: Vec<PrimId>,
    pub attributes: BTreeMap<String, Attribute>,
    pub relationships: BTreeMap<String, Vec<String>>,
    /// Resolved `xformOpOrder` (or the authored op names when no order exists)
    pub xform_op_order: Vec<String>,
    /// True if any contributing spec authors a transform opinion
    pub has_xform_ops: bool,
    /// Product of the resolved op stack
    pub local_transform: DMat4,
    pub variant_sets: Vec<VariantSet>,
    /// Model kind metadata (`component`, `assembly`, ...)
    pub model_kind: Option<String>,
    pub documentation: Option<String>,
    pub api_schemas: Vec<String>,
    /// Where variant selections for this prim are written
    pub(crate) selection_address: SpecAddress,
}

impl ComposedPrim {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&[String]> {
        self.relationships.get(name).map(|targets| targets.as_slice())
    }

    /// First target of this prim's own `material:binding`.
    pub fn direct_material_binding(&self) -> Option<&str> {
        self.relationship(MATERIAL_BINDING)
            .and_then(|targets| targets.first())
            .map(|target| target.as_str())
    }

    pub fn variant_set(&self, name: &str) -> Option<&VariantSet> {
        self.variant_sets.iter().find(|set| set.name == name)
    }

    pub fn is_mesh(&self) -> bool {
        self.kind == PrimKind::Mesh
    }

    /// Whether the prim can carry a transform: any typed prim other than
    /// scopes and shading prims (gprims, cameras, lights), or anything with
    /// authored ops.
    pub fn is_xformable(&self) -> bool {
        match self.kind {
            PrimKind::Xform | PrimKind::Mesh => true,
            PrimKind::Scope | PrimKind::Material | PrimKind::Shader => self.has_xform_ops,
            PrimKind::Other => !self.type_name.is_empty() || self.has_xform_ops,
        }
    }
}

/// The resolved prim tree of a stage.
#[derive(Clone, Debug, Default)]
pub struct ComposedStage {
    prims: Vec<ComposedPrim>,
    roots: Vec<PrimId>,
    index: HashMap<String, PrimId>,
    /// Material path -> meshes whose resolved binding names it
    material_bindings: BTreeMap<String, Vec<PrimId>>,
}

impl ComposedStage {
    /// Compose `layer` with the variant selections it currently authors.
    pub fn compose(layer: &UsdLayer) -> Self {
        let mut composer = Composer::default();

        let mut seen = HashSet::new();
        let root_names: Vec<&str> = layer
            .prims
            .iter()
            .map(|spec| spec.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect();

        for name in root_names {
            let layers: Vec<Contribution> = layer
                .prims
                .iter()
                .enumerate()
                .filter(|(_, spec)| spec.name == name)
                .map(|(i, spec)| Contribution {
                    spec,
                    address: SpecAddress::root(i),
                })
                .collect();
            if let Some(id) = composer.compose_prim(name, "", None, layers) {
                composer.roots.push(id);
            }
        }

        composer.finish()
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    pub fn roots(&self) -> &[PrimId] {
        &self.roots
    }

    /// Get a prim by id. Ids are only valid for the stage that issued them.
    pub fn get(&self, id: PrimId) -> &ComposedPrim {
        &self.prims[id.0]
    }

    pub fn find(&self, path: &str) -> Option<PrimId> {
        self.index.get(path).copied()
    }

    pub fn prim(&self, path: &str) -> Option<&ComposedPrim> {
        self.find(path).map(|id| self.get(id))
    }

    /// All prims in depth-first pre-order.
    pub fn iter(&self) -> impl Iterator<Item = (PrimId, &ComposedPrim)> {
        self.prims.iter().enumerate().map(|(i, prim)| (PrimId(i), prim))
    }

    /// `id` and every prim beneath it, depth-first.
    pub fn subtree(&self, id: PrimId) -> Vec<PrimId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.get(current).children.iter().rev());
        }
        out
    }

    /// The material bound to `id`: its own binding, else the nearest ancestor's.
    pub fn bound_material(&self, id: PrimId) -> Option<&str> {
        let mut current = Some(id);
        while let Some(prim_id) = current {
            let prim = self.get(prim_id);
            if let Some(target) = prim.direct_material_binding() {
                return Some(target);
            }
            current = prim.parent;
        }
        None
    }

    /// Meshes whose resolved material binding names `material_path`.
    pub fn meshes_bound_to(&self, material_path: &str) -> &[PrimId] {
        self.material_bindings
            .get(material_path)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }
}

/// A prim spec contributing opinions to the prim being composed.
#[derive(Clone)]
struct Contribution<'a> {
    spec: &'a PrimSpec,
    address: SpecAddress,
}

/// Child names of all contributions, in order of first appearance.
fn child_names<'a>(layers: &[Contribution<'a>]) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for layer in layers {
        for child in &layer.spec.children {
            if seen.insert(child.name.as_str()) {
                names.push(child.name.as_str());
            }
        }
    }
    names
}

/// Specs named `name` beneath each contribution, strongest first.
fn contributions_named<'a>(layers: &[Contribution<'a>], name: &str) -> Vec<Contribution<'a>> {
    let mut out = Vec::new();
    for layer in layers {
        for (i, child) in layer.spec.children.iter().enumerate() {
            if child.name == name {
                out.push(Contribution {
                    spec: child,
                    address: layer.address.child(i),
                });
            }
        }
    }
    out
}

/// A variant set as seen from the prim being composed.
struct ResolvedSet {
    /// Contribution that declares the set
    layer: usize,
    /// Index of the set in that contribution's spec
    set: usize,
    selected: Option<usize>,
}

#[derive(Default)]
struct Composer {
    prims: Vec<ComposedPrim>,
    roots: Vec<PrimId>,
}

impl Composer {
    fn compose_prim(
        &mut self,
        name: &str,
        parent_path: &str,
        parent: Option<PrimId>,
        layers: Vec<Contribution<'_>>,
    ) -> Option<PrimId> {
        let path = format!("{}/{}", parent_path, name);

        if layers.iter().find_map(|l| l.spec.metadata.active) == Some(false) {
            log::debug!("Skipping inactive prim {}", path);
            return None;
        }
        if !layers.iter().any(|l| l.spec.specifier == Specifier::Def) {
            log::debug!("Skipping {} (no defining spec)", path);
            return None;
        }
        let selection_address = layers.first()?.address.clone();

        let (variant_sets, resolved) = resolve_variant_sets(&path, &layers);

        // Splice selected variant bodies in right after their declaring spec
        let mut expanded = Vec::with_capacity(layers.len() + resolved.len());
        for (i, layer) in layers.iter().enumerate() {
            expanded.push(layer.clone());
            for set in resolved.iter().filter(|s| s.layer == i) {
                if let Some(option) = set.selected {
                    let body = &layer.spec.variant_sets[set.set].options[option].body;
                    expanded.push(Contribution {
                        spec: body,
                        address: layer.address.variant(set.set, option),
                    });
                }
            }
        }

        let type_name = expanded
            .iter()
            .map(|l| l.spec.type_name.as_str())
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string();

        let (xform_op_order, local_transform) = resolve_xform(&path, &expanded);

        let mut api_schemas: Vec<String> = Vec::new();
        for layer in &expanded {
            for schema in &layer.spec.metadata.api_schemas {
                if !api_schemas.contains(schema) {
                    api_schemas.push(schema.clone());
                }
            }
        }

        let id = PrimId(self.prims.len());
        self.prims.push(ComposedPrim {
            path: path.clone(),
            name: name.to_string(),
            kind: PrimKind::from_type_name(&type_name),
            type_name,
            parent,
            children: Vec::new(),
            attributes: resolve_attributes(&expanded),
            relationships: resolve_relationships(&expanded),
            xform_op_order,
            has_xform_ops: expanded.iter().any(|l| l.spec.has_xform_opinion()),
            local_transform,
            variant_sets,
            model_kind: expanded.iter().find_map(|l| l.spec.metadata.kind.clone()),
            documentation: expanded
                .iter()
                .find_map(|l| l.spec.metadata.documentation.clone()),
            api_schemas,
            selection_address,
        });

        let mut children = Vec::new();
        for child_name in child_names(&expanded) {
            let child_layers = contributions_named(&expanded, child_name);
            if let Some(child) = self.compose_prim(child_name, &path, Some(id), child_layers) {
                children.push(child);
            }
        }
        self.prims[id.0].children = children;

        Some(id)
    }

    fn finish(self) -> ComposedStage {
        let index = self
            .prims
            .iter()
            .enumerate()
            .map(|(i, prim)| (prim.path.clone(), PrimId(i)))
            .collect();

        let mut stage = ComposedStage {
            prims: self.prims,
            roots: self.roots,
            index,
            material_bindings: BTreeMap::new(),
        };

        let mut bindings: BTreeMap<String, Vec<PrimId>> = BTreeMap::new();
        for (id, prim) in stage.iter() {
            if !prim.is_mesh() {
                continue;
            }
            if let Some(material) = stage.bound_material(id) {
                bindings.entry(material.to_string()).or_default().push(id);
            }
        }
        stage.material_bindings = bindings;

        stage
    }
}

/// Variant sets of a prim: the union over contributions by name, taking the
/// declaration and the selection from the strongest spec that authors them.
fn resolve_variant_sets(
    path: &str,
    layers: &[Contribution],
) -> (Vec<VariantSet>, Vec<ResolvedSet>) {
    let mut sets = Vec::new();
    let mut resolved = Vec::new();

    for (layer_index, layer) in layers.iter().enumerate() {
        for (set_index, spec) in layer.spec.variant_sets.iter().enumerate() {
            if sets.iter().any(|s: &VariantSet| s.name == spec.name) {
                continue;
            }

            let options = spec.option_names();
            let authored = layers
                .iter()
                .find_map(|l| l.spec.metadata.variant_selection.get(&spec.name));
            let selected = match authored {
                Some(option) => match spec.option_index(option) {
                    Some(index) => Some(index),
                    None => {
                        log::warn!(
                            "{}: selection '{}' is not an option of variant set '{}'",
                            path,
                            option,
                            spec.name
                        );
                        None
                    }
                },
                None => None,
            };

            sets.push(VariantSet {
                name: spec.name.clone(),
                selected: selected.map(|i| options[i].clone()),
                options,
            });
            resolved.push(ResolvedSet {
                layer: layer_index,
                set: set_index,
                selected,
            });
        }
    }

    (sets, resolved)
}

/// Strongest opinion per attribute. A weaker spec still fills in a value or
/// connections the stronger one only declares.
fn resolve_attributes(layers: &[Contribution]) -> BTreeMap<String, Attribute> {
    let mut out: BTreeMap<String, Attribute> = BTreeMap::new();
    for layer in layers {
        for (name, attr) in &layer.spec.attributes {
            match out.get_mut(name) {
                None => {
                    out.insert(name.clone(), attr.clone());
                }
                Some(existing) => {
                    if existing.value.is_none() {
                        existing.value = attr.value.clone();
                    }
                    if existing.connections.is_empty() {
                        existing.connections = attr.connections.clone();
                    }
                    if existing.interpolation.is_none() {
                        existing.interpolation = attr.interpolation.clone();
                    }
                }
            }
        }
    }
    out
}

fn resolve_relationships(layers: &[Contribution]) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    for layer in layers {
        for (name, targets) in &layer.spec.relationships {
            out.entry(name.clone()).or_insert_with(|| targets.clone());
        }
    }
    out
}

/// Resolve the op stack: the strongest `xformOpOrder` names the ops, each op
/// takes its value from the strongest spec authoring it.
fn resolve_xform(path: &str, layers: &[Contribution]) -> (Vec<String>, DMat4) {
    let find_op = |name: &str| -> Option<&XformOp> {
        layers
            .iter()
            .find_map(|l| l.spec.xform_ops.iter().find(|op| op.name == name))
            .map(|op| &op.op)
    };

    let order: Vec<String> = match layers.iter().find_map(|l| l.spec.xform_op_order.as_ref()) {
        Some(order) => order.clone(),
        None => layers
            .iter()
            .find(|l| !l.spec.xform_ops.is_empty())
            .map(|l| l.spec.xform_ops.iter().map(|op| op.name.clone()).collect())
            .unwrap_or_default(),
    };

    let mut matrix = DMat4::IDENTITY;
    for entry in &order {
        let (name, invert) = match entry.strip_prefix(INVERT_PREFIX) {
            Some(name) => (name, true),
            None => (entry.as_str(), false),
        };
        match find_op(name) {
            Some(op) if invert => matrix *= op.to_matrix().inverse(),
            Some(op) => matrix *= op.to_matrix(),
            None => log::warn!("{}: xformOpOrder names missing op {}", path, name),
        }
    }

    (order, matrix)
}
