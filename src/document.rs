//! The structured document that snapshots serialize to.
//!
//! A `Node` is a tree of objects (named children), arrays and scalars. Its
//! text form is JSON. Records never put large binary data in a document;
//! that goes to a [`BlobStore`](crate::blob::BlobStore) and the document
//! holds only the blob's id.
//!
//! The accessor methods here are shaped for deserializing records: the
//! `*_field` methods look up a required child of an object and convert it,
//! returning a `DocumentError` that names the field when it is missing or has
//! the wrong shape. Unknown children are simply never looked at.

use std::collections::BTreeMap;

use gleam::gl::{GLenum, GLint, GLuint};
use serde::{Deserialize, Serialize};

use crate::enums;
use crate::error::DocumentError;

/// The children of an object node, kept sorted by name.
pub type Map = BTreeMap<String, Node>;

// JSON has no spelling for these.
const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Node>),
    Object(Map),
}

impl Node {
    /// Build an object node from `(name, value)` pairs.
    pub fn object_from<I>(fields: I) -> Node
    where
        I: IntoIterator<Item = (&'static str, Node)>,
    {
        Node::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Build an array node from anything convertible to nodes.
    pub fn array_from<I, T>(items: I) -> Node
    where
        I: IntoIterator<Item = T>,
        T: Into<Node>,
    {
        Node::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Node::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Node::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Integers are accepted wherever floats are expected, and so are the
    /// names non-finite values are written as.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Float(f) => Some(*f),
            Node::Int(i) => Some(*i as f64),
            Node::String(s) => match s.as_str() {
                NAN => Some(f64::NAN),
                INFINITY => Some(f64::INFINITY),
                NEG_INFINITY => Some(f64::NEG_INFINITY),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a child of an object node. Explicit `null`s count as absent.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.as_object()
            .and_then(|map| map.get(name))
            .filter(|node| !node.is_null())
    }

    /// Look up a required child of an object node.
    pub fn field(&self, name: &str) -> Result<&Node, DocumentError> {
        if self.as_object().is_none() {
            return Err(DocumentError::WrongType {
                field: name.to_string(),
                expected: "object containing it",
            });
        }
        self.get(name)
            .ok_or_else(|| DocumentError::Missing(name.to_string()))
    }

    pub fn bool_field(&self, name: &str) -> Result<bool, DocumentError> {
        self.field(name)?
            .as_bool()
            .ok_or_else(|| wrong_type(name, "boolean"))
    }

    pub fn i64_field(&self, name: &str) -> Result<i64, DocumentError> {
        self.field(name)?
            .as_i64()
            .ok_or_else(|| wrong_type(name, "integer"))
    }

    pub fn i32_field(&self, name: &str) -> Result<GLint, DocumentError> {
        let value = self.i64_field(name)?;
        if value < i64::from(GLint::min_value()) || value > i64::from(GLint::max_value()) {
            return Err(wrong_type(name, "32-bit integer"));
        }
        Ok(value as GLint)
    }

    pub fn u32_field(&self, name: &str) -> Result<GLuint, DocumentError> {
        let value = self.i64_field(name)?;
        if value < 0 || value > i64::from(GLuint::max_value()) {
            return Err(wrong_type(name, "32-bit unsigned integer"));
        }
        Ok(value as GLuint)
    }

    pub fn f32_field(&self, name: &str) -> Result<f32, DocumentError> {
        self.field(name)?
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| wrong_type(name, "number"))
    }

    pub fn str_field(&self, name: &str) -> Result<&str, DocumentError> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| wrong_type(name, "string"))
    }

    pub fn array_field(&self, name: &str) -> Result<&[Node], DocumentError> {
        self.field(name)?
            .as_array()
            .ok_or_else(|| wrong_type(name, "array"))
    }

    /// Read a GL enumerant, written either by name or as a number.
    pub fn enum_field(&self, name: &str) -> Result<GLenum, DocumentError> {
        enum_value(self.field(name)?, name)
    }

    /// Read a fixed-arity vector of floats. Any other length is an error.
    pub fn vec4_field(&self, name: &str) -> Result<[f32; 4], DocumentError> {
        vec4_value(self.field(name)?, name)
    }
}

/// Interpret `node` as a GL enumerant. `what` names it in errors.
pub fn enum_value(node: &Node, what: &str) -> Result<GLenum, DocumentError> {
    match node {
        Node::String(s) => enums::value(s).ok_or_else(|| DocumentError::UnknownEnum {
            field: what.to_string(),
            value: s.clone(),
        }),
        Node::Int(i) if *i >= 0 && *i <= i64::from(GLenum::max_value()) => Ok(*i as GLenum),
        _ => Err(wrong_type(what, "GL enum name or number")),
    }
}

/// Interpret `node` as exactly four floats.
pub fn vec4_value(node: &Node, what: &str) -> Result<[f32; 4], DocumentError> {
    let items = node
        .as_array()
        .ok_or_else(|| wrong_type(what, "array of 4 numbers"))?;
    if items.len() != 4 {
        return Err(DocumentError::Arity {
            field: what.to_string(),
            expected: 4,
            found: items.len(),
        });
    }
    let mut v = [0.0; 4];
    for (slot, item) in v.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| wrong_type(what, "array of 4 numbers"))? as f32;
    }
    Ok(v)
}

fn wrong_type(field: &str, expected: &'static str) -> DocumentError {
    DocumentError::WrongType {
        field: field.to_string(),
        expected,
    }
}

/// Parse JSON text into a document.
pub fn from_json(text: &str) -> Result<Node, DocumentError> {
    Ok(serde_json::from_str(text)?)
}

/// Render a document as indented JSON text.
pub fn to_json(node: &Node) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(node)?)
}

impl From<bool> for Node {
    fn from(b: bool) -> Node {
        Node::Bool(b)
    }
}

macro_rules! integer_nodes {
    ( $( $t:ty ),* ) => {
        $(
            impl From<$t> for Node {
                fn from(i: $t) -> Node {
                    Node::Int(i as i64)
                }
            }
        )*
    }
}

integer_nodes!(i32, u32, i64, u64, usize);

impl From<f32> for Node {
    fn from(f: f32) -> Node {
        Node::from(f64::from(f))
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Node {
        if f.is_nan() {
            Node::from(NAN)
        } else if f.is_infinite() {
            Node::from(if f > 0.0 { INFINITY } else { NEG_INFINITY })
        } else {
            Node::Float(f)
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Node {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Node {
        Node::String(s)
    }
}

impl From<[f32; 4]> for Node {
    fn from(v: [f32; 4]) -> Node {
        Node::array_from(v.iter().cloned())
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Node {
        value.map_or(Node::Null, Into::into)
    }
}

#[test]
fn test_json_shapes() {
    let node = Node::object_from(vec![
        ("handle", Node::from(7_u32)),
        ("target", enums::to_node(gleam::gl::SAMPLES_PASSED)),
        ("color", Node::from([0.0, 0.5, 1.0, 0.25])),
        ("lod", Node::from(1.0_f32)),
        ("absent", Node::from(None::<u32>)),
    ]);
    let text = to_json(&node).unwrap();
    let back = from_json(&text).unwrap();
    assert_eq!(back, node);

    assert_eq!(back.u32_field("handle").unwrap(), 7);
    assert_eq!(back.enum_field("target").unwrap(), gleam::gl::SAMPLES_PASSED);
    assert_eq!(back.vec4_field("color").unwrap(), [0.0, 0.5, 1.0, 0.25]);
    assert_eq!(back.f32_field("lod").unwrap(), 1.0);
    assert!(back.get("absent").is_none());
    assert!(matches!(back.field("absent"), Err(DocumentError::Missing(_))));
}

#[test]
fn test_non_finite_floats() {
    let node = Node::object_from(vec![
        ("v", Node::from([f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.0])),
        ("lod", Node::from(f32::NEG_INFINITY)),
    ]);
    let back = from_json(&to_json(&node).unwrap()).unwrap();
    assert_eq!(back, node);

    let v = back.vec4_field("v").unwrap();
    assert!(v[0].is_nan());
    assert_eq!(v[1], f32::INFINITY);
    assert_eq!(v[2], f32::NEG_INFINITY);
    assert_eq!(v[3].to_bits(), (-0.0_f32).to_bits());
    assert_eq!(back.f32_field("lod").unwrap(), f32::NEG_INFINITY);

    let other = from_json(r#"{ "lod": "Inf" }"#).unwrap();
    assert!(matches!(other.f32_field("lod"), Err(DocumentError::WrongType { .. })));
}

#[test]
fn test_field_errors() {
    let node = from_json(r#"{ "n": -1, "v": [1, 2, 3], "e": "GL_BOGUS", "s": 3 }"#).unwrap();
    assert!(matches!(node.u32_field("n"), Err(DocumentError::WrongType { .. })));
    assert!(matches!(
        node.vec4_field("v"),
        Err(DocumentError::Arity { expected: 4, found: 3, .. })
    ));
    assert!(matches!(node.enum_field("e"), Err(DocumentError::UnknownEnum { .. })));
    assert!(matches!(node.str_field("s"), Err(DocumentError::WrongType { .. })));
    assert!(matches!(node.bool_field("missing"), Err(DocumentError::Missing(_))));
    assert!(Node::from(3).field("x").is_err());
}
