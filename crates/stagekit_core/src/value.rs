//! Typed attribute values.
//!
//! Attributes are a closed set of value shapes rather than open-ended
//! dynamic values, so every consumer handles them exhaustively.

use serde::Serialize;
use stagekit_math::DVec3;

/// A resolved attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Strings, tokens and asset paths
    String(String),
    /// RGB color, components nominally 0-1
    Color([f64; 3]),
    /// Fixed-size tuple (float3, point3f, quatf, ...)
    Vector(Vec<f64>),
    /// 4x4 matrix, rows in USD row-vector convention
    Matrix([[f64; 4]; 4]),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    VectorArray(Vec<Vec<f64>>),
    StringArray(Vec<String>),
}

impl AttributeValue {
    /// Scalar numeric view (ints widen to f64).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Three-component view of colors and 3-tuples.
    pub fn as_vec3(&self) -> Option<DVec3> {
        match self {
            AttributeValue::Color(c) => Some(DVec3::from_array(*c)),
            AttributeValue::Vector(v) if v.len() == 3 => Some(DVec3::new(v[0], v[1], v[2])),
            _ => None,
        }
    }

    /// View as an array of 3-vectors (points, normals).
    ///
    /// Tuples that are not 3 wide are skipped.
    pub fn as_vec3_array(&self) -> Option<Vec<DVec3>> {
        match self {
            AttributeValue::VectorArray(items) => Some(
                items
                    .iter()
                    .filter(|v| v.len() == 3)
                    .map(|v| DVec3::new(v[0], v[1], v[2]))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            AttributeValue::IntArray(items) => Some(items),
            _ => None,
        }
    }

    /// Number of elements for array values, `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            AttributeValue::IntArray(v) => Some(v.len()),
            AttributeValue::FloatArray(v) => Some(v.len()),
            AttributeValue::VectorArray(v) => Some(v.len()),
            AttributeValue::StringArray(v) => Some(v.len()),
            _ => None,
        }
    }
}

/// An attribute as authored on a prim.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Attribute {
    /// USD value type name, e.g. `point3f[]`
    pub type_name: String,

    /// Authored default value (declarations without a value have none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<AttributeValue>,

    /// Connection targets (`inputs:x.connect = </Path.outputs:y>`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<String>,

    /// Primvar interpolation metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpolation: Option<String>,
}

impl Attribute {
    pub fn new(type_name: impl Into<String>, value: Option<AttributeValue>) -> Self {
        Self {
            type_name: type_name.into(),
            value,
            ..Default::default()
        }
    }
}
