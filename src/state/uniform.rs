//! Default-block uniforms and uniform block bindings of a program.
//!
//! A uniform is recorded by the name GL reports for it (arrays as `name[0]`)
//! with its type, array size and value. Values are read element by element
//! and written back with the `glProgramUniform*` calls, so restoring them
//! doesn't disturb the current program. Types whose values this crate can't
//! move (doubles, for now) are recorded without a value.

use gleam::gl::{self, GLenum, GLfloat, GLint, GLuint};
use log::debug;

use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums;
use crate::error::{DocumentError, GlError};

use super::float_bits;

/// The scalar type a uniform's values are read and written as.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scalar {
    Float,
    Int,
    Uint,
}

/// The shape of one element of a uniform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub scalar: Scalar,
    /// 1 for scalars and vectors.
    pub columns: GLint,
    pub rows: GLint,
}

impl Layout {
    const fn new(scalar: Scalar, columns: GLint, rows: GLint) -> Layout {
        Layout { scalar, columns, rows }
    }

    pub fn components(self) -> usize {
        (self.columns * self.rows) as usize
    }

    pub fn is_matrix(self) -> bool {
        self.columns > 1
    }
}

/// The layout of values of uniform type `ty`, if we can move them.
pub fn layout(ty: GLenum) -> Option<Layout> {
    use Scalar::*;
    Some(match ty {
        gl::FLOAT => Layout::new(Float, 1, 1),
        gl::FLOAT_VEC2 => Layout::new(Float, 1, 2),
        gl::FLOAT_VEC3 => Layout::new(Float, 1, 3),
        gl::FLOAT_VEC4 => Layout::new(Float, 1, 4),
        gl::FLOAT_MAT2 => Layout::new(Float, 2, 2),
        gl::FLOAT_MAT3 => Layout::new(Float, 3, 3),
        gl::FLOAT_MAT4 => Layout::new(Float, 4, 4),
        gl::FLOAT_MAT2x3 => Layout::new(Float, 2, 3),
        gl::FLOAT_MAT2x4 => Layout::new(Float, 2, 4),
        gl::FLOAT_MAT3x2 => Layout::new(Float, 3, 2),
        gl::FLOAT_MAT3x4 => Layout::new(Float, 3, 4),
        gl::FLOAT_MAT4x2 => Layout::new(Float, 4, 2),
        gl::FLOAT_MAT4x3 => Layout::new(Float, 4, 3),
        gl::INT | gl::BOOL => Layout::new(Int, 1, 1),
        gl::INT_VEC2 | gl::BOOL_VEC2 => Layout::new(Int, 1, 2),
        gl::INT_VEC3 | gl::BOOL_VEC3 => Layout::new(Int, 1, 3),
        gl::INT_VEC4 | gl::BOOL_VEC4 => Layout::new(Int, 1, 4),
        gl::UNSIGNED_INT => Layout::new(Uint, 1, 1),
        gl::UNSIGNED_INT_VEC2 => Layout::new(Uint, 1, 2),
        gl::UNSIGNED_INT_VEC3 => Layout::new(Uint, 1, 3),
        gl::UNSIGNED_INT_VEC4 => Layout::new(Uint, 1, 4),
        // Samplers hold the texture unit they read from.
        gl::SAMPLER_2D
        | gl::SAMPLER_3D
        | gl::SAMPLER_CUBE
        | gl::SAMPLER_2D_SHADOW
        | gl::SAMPLER_2D_ARRAY
        | gl::SAMPLER_2D_ARRAY_SHADOW
        | gl::SAMPLER_CUBE_SHADOW
        | gl::INT_SAMPLER_2D
        | gl::INT_SAMPLER_3D
        | gl::INT_SAMPLER_CUBE
        | gl::INT_SAMPLER_2D_ARRAY
        | gl::UNSIGNED_INT_SAMPLER_2D
        | gl::UNSIGNED_INT_SAMPLER_3D
        | gl::UNSIGNED_INT_SAMPLER_CUBE
        | gl::UNSIGNED_INT_SAMPLER_2D_ARRAY => Layout::new(Int, 1, 1),
        _ => return None,
    })
}

/// Every element of a uniform, flattened.
#[derive(Clone, Debug)]
pub enum UniformValue {
    Float(Vec<GLfloat>),
    Int(Vec<GLint>),
    Uint(Vec<GLuint>),
}

impl PartialEq for UniformValue {
    fn eq(&self, other: &UniformValue) -> bool {
        use UniformValue::*;
        match (self, other) {
            (Float(a), Float(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| float_bits(x) == float_bits(y))
            }
            (Int(a), Int(b)) => a == b,
            (Uint(a), Uint(b)) => a == b,
            _ => false,
        }
    }
}

impl UniformValue {
    pub fn len(&self) -> usize {
        match self {
            UniformValue::Float(v) => v.len(),
            UniformValue::Int(v) => v.len(),
            UniformValue::Uint(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_node(&self) -> Node {
        match self {
            UniformValue::Float(v) => Node::array_from(v.iter().cloned()),
            UniformValue::Int(v) => Node::array_from(v.iter().cloned()),
            UniformValue::Uint(v) => Node::array_from(v.iter().cloned()),
        }
    }

    fn from_node(node: &Node, layout: Layout) -> Result<UniformValue, DocumentError> {
        let items = node.as_array().ok_or_else(|| DocumentError::WrongType {
            field: "value".to_string(),
            expected: "array of numbers",
        })?;
        let bad = || DocumentError::WrongType {
            field: "value".to_string(),
            expected: "array of numbers of the uniform's type",
        };
        Ok(match layout.scalar {
            Scalar::Float => UniformValue::Float(
                items
                    .iter()
                    .map(|i| i.as_f64().map(|f| f as GLfloat).ok_or_else(bad))
                    .collect::<Result<_, _>>()?,
            ),
            Scalar::Int => UniformValue::Int(
                items
                    .iter()
                    .map(|i| {
                        i.as_i64()
                            .filter(|&v| v >= i64::from(GLint::min_value()) && v <= i64::from(GLint::max_value()))
                            .map(|v| v as GLint)
                            .ok_or_else(bad)
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Scalar::Uint => UniformValue::Uint(
                items
                    .iter()
                    .map(|i| {
                        i.as_i64()
                            .filter(|&v| v >= 0 && v <= i64::from(GLuint::max_value()))
                            .map(|v| v as GLuint)
                            .ok_or_else(bad)
                    })
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Uniform {
    pub name: String,
    pub type_: GLenum,
    pub size: GLint,
    /// `None` for types whose values we don't move.
    pub value: Option<UniformValue>,
}

impl Uniform {
    pub fn to_node(&self) -> Node {
        Node::object_from(vec![
            ("name", Node::from(self.name.as_str())),
            ("type", enums::to_node(self.type_)),
            ("size", Node::from(self.size)),
            ("value", self.value.as_ref().map_or(Node::Null, UniformValue::to_node)),
        ])
    }

    pub fn from_node(node: &Node) -> Result<Uniform, DocumentError> {
        let type_ = node.enum_field("type")?;
        let size = node.i32_field("size")?;
        if size < 1 {
            return Err(DocumentError::WrongType {
                field: "size".to_string(),
                expected: "positive array size",
            });
        }
        let value = match (node.get("value"), layout(type_)) {
            (Some(value), Some(layout)) => {
                let value = UniformValue::from_node(value, layout)?;
                let expected = size as usize * layout.components();
                if value.len() != expected {
                    return Err(DocumentError::Arity {
                        field: "value".to_string(),
                        expected,
                        found: value.len(),
                    });
                }
                Some(value)
            }
            _ => None,
        };
        Ok(Uniform {
            name: node.str_field("name")?.to_string(),
            type_,
            size,
            value,
        })
    }
}

/// The uniform buffer binding point a named uniform block reads from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockBinding {
    pub name: String,
    pub binding: GLuint,
}

impl BlockBinding {
    pub fn to_node(&self) -> Node {
        Node::object_from(vec![
            ("name", Node::from(self.name.as_str())),
            ("binding", Node::from(self.binding)),
        ])
    }

    pub fn from_node(node: &Node) -> Result<BlockBinding, DocumentError> {
        Ok(BlockBinding {
            name: node.str_field("name")?.to_string(),
            binding: node.u32_field("binding")?,
        })
    }
}

/// The name of element `element` of the uniform GL reports as `name`.
fn element_name(name: &str, element: GLint) -> String {
    let stem = name.strip_suffix("[0]").unwrap_or(name);
    format!("{}[{}]", stem, element)
}

/// Read every element of the uniform `name` in the linked program
/// `program`.
fn read_value(
    gl: &dyn EntryPoints,
    program: GLuint,
    name: &str,
    location: GLint,
    size: GLint,
    layout: Layout,
) -> Result<UniformValue, GlError> {
    let components = layout.components();
    let count = size.max(1) as usize * components;
    let mut floats = vec![0.0; if layout.scalar == Scalar::Float { count } else { 0 }];
    let mut ints = vec![0; if layout.scalar == Scalar::Int { count } else { 0 }];
    let mut uints = vec![0; if layout.scalar == Scalar::Uint { count } else { 0 }];

    for element in 0..size.max(1) {
        let location = if element == 0 {
            location
        } else {
            let location = gl.get_uniform_location(program, &element_name(name, element));
            entry::check(gl, "glGetUniformLocation")?;
            location
        };
        if location < 0 {
            // Elements past the last one the shader uses can be optimized out.
            continue;
        }
        let range = element as usize * components..(element as usize + 1) * components;
        match layout.scalar {
            Scalar::Float => gl.get_uniform_fv(program, location, &mut floats[range]),
            Scalar::Int => gl.get_uniform_iv(program, location, &mut ints[range]),
            Scalar::Uint => gl.get_uniform_uiv(program, location, &mut uints[range]),
        }
        entry::check(gl, "glGetUniform")?;
    }

    Ok(match layout.scalar {
        Scalar::Float => UniformValue::Float(floats),
        Scalar::Int => UniformValue::Int(ints),
        Scalar::Uint => UniformValue::Uint(uints),
    })
}

/// An active uniform of a linked program, as `glGetActiveUniform` reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveUniform {
    pub name: String,
    pub type_: GLenum,
    pub size: GLint,
    pub location: GLint,
}

/// List the active default-block uniforms of the linked `program`.
/// Built-ins and uniforms inside blocks have no location and are left out.
pub fn active_uniforms(gl: &dyn EntryPoints, program: GLuint) -> Result<Vec<ActiveUniform>, GlError> {
    let count = gl.get_program_iv(program, gl::ACTIVE_UNIFORMS);
    entry::check(gl, "glGetProgramiv")?;

    let mut active = vec![];
    for index in 0..count.max(0) as GLuint {
        let (size, type_, name) = gl.get_active_uniform(program, index);
        entry::check(gl, "glGetActiveUniform")?;
        if name.starts_with("gl_") {
            continue;
        }
        let location = gl.get_uniform_location(program, &name);
        entry::check(gl, "glGetUniformLocation")?;
        if location >= 0 {
            active.push(ActiveUniform {
                name,
                type_,
                size: size.max(1),
                location,
            });
        }
    }
    Ok(active)
}

/// Capture the active default-block uniforms of the linked `program`,
/// sorted by name.
pub fn capture_uniforms(gl: &dyn EntryPoints, program: GLuint) -> Result<Vec<Uniform>, GlError> {
    let mut uniforms = vec![];
    for ActiveUniform { name, type_, size, location } in active_uniforms(gl, program)? {
        let value = match layout(type_) {
            Some(layout) => Some(read_value(gl, program, &name, location, size, layout)?),
            None => {
                debug!(
                    "program {}: not recording the value of {} uniform '{}'",
                    program,
                    enums::describe(type_),
                    name
                );
                None
            }
        };
        uniforms.push(Uniform {
            name,
            type_,
            size,
            value,
        });
    }
    uniforms.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(uniforms)
}

/// Capture the binding point of every active uniform block of `program`,
/// sorted by name.
pub fn capture_block_bindings(gl: &dyn EntryPoints, program: GLuint) -> Result<Vec<BlockBinding>, GlError> {
    let count = gl.get_program_iv(program, gl::ACTIVE_UNIFORM_BLOCKS);
    entry::check(gl, "glGetProgramiv")?;

    let mut bindings = vec![];
    for index in 0..count.max(0) as GLuint {
        let name = gl.get_active_uniform_block_name(program, index);
        let binding = gl.get_active_uniform_block_iv(program, index, gl::UNIFORM_BLOCK_BINDING);
        entry::check(gl, "glGetActiveUniformBlockiv")?;
        bindings.push(BlockBinding {
            name,
            binding: binding.max(0) as GLuint,
        });
    }
    bindings.sort();
    Ok(bindings)
}

/// Write the first `elements` elements of `value` to the uniform at
/// `location` of `program`.
pub fn write_value(
    gl: &dyn EntryPoints,
    program: GLuint,
    location: GLint,
    layout: Layout,
    elements: usize,
    value: &UniformValue,
) -> Result<(), GlError> {
    let end = (elements * layout.components()).min(value.len());
    let components = layout.components() as GLint;
    match value {
        UniformValue::Float(v) if layout.is_matrix() => {
            gl.program_uniform_matrix_fv(program, location, layout.columns, layout.rows, &v[..end])
        }
        UniformValue::Float(v) => gl.program_uniform_fv(program, location, components, &v[..end]),
        UniformValue::Int(v) => gl.program_uniform_iv(program, location, components, &v[..end]),
        UniformValue::Uint(v) => gl.program_uniform_uiv(program, location, components, &v[..end]),
    }
    entry::check(gl, "glProgramUniform")
}

#[test]
fn test_layouts() {
    assert_eq!(layout(gl::FLOAT_MAT2x3).map(Layout::components), Some(6));
    assert!(layout(gl::FLOAT_MAT4).map_or(false, Layout::is_matrix));
    assert!(!layout(gl::FLOAT_VEC4).map_or(true, Layout::is_matrix));
    assert_eq!(layout(gl::SAMPLER_2D).map(|l| l.scalar), Some(Scalar::Int));
    assert_eq!(layout(gl::BOOL_VEC3), layout(gl::INT_VEC3));
    assert_eq!(layout(gl::DOUBLE), None);
    assert_eq!(element_name("lights[0]", 2), "lights[2]");
    assert_eq!(element_name("scale", 1), "scale[1]");
}

#[test]
fn test_uniform_documents() {
    use crate::document;

    let node = document::from_json(
        r#"{ "name": "weights[0]", "type": "GL_FLOAT_VEC2", "size": 2, "value": [1, 0.5, "NaN", -2] }"#,
    )
    .unwrap();
    let uniform = Uniform::from_node(&node).unwrap();
    assert_eq!(uniform.size, 2);
    let back = Uniform::from_node(&document::from_json(&document::to_json(&uniform.to_node()).unwrap()).unwrap())
        .unwrap();
    assert_eq!(back, uniform);

    let short = document::from_json(r#"{ "name": "tint", "type": "GL_FLOAT_VEC4", "size": 1, "value": [1, 2] }"#)
        .unwrap();
    assert!(matches!(
        Uniform::from_node(&short),
        Err(DocumentError::Arity { expected: 4, found: 2, .. })
    ));
    let fractional = document::from_json(r#"{ "name": "unit", "type": "GL_SAMPLER_2D", "size": 1, "value": [0.5] }"#)
        .unwrap();
    assert!(Uniform::from_node(&fractional).is_err());
    let double = document::from_json(r#"{ "name": "d", "type": "GL_DOUBLE", "size": 1 }"#).unwrap();
    assert_eq!(Uniform::from_node(&double).unwrap().value, None);
}
