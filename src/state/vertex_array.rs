//! Vertex array objects.
//!
//! A vertex array holds the element array buffer binding and, for each
//! attribute slot, where its data comes from: a buffer, offset and layout.
//! Buffers are referred to by recorded handle, so vertex arrays are restored
//! after buffers.

use std::any::Any;

use gleam::gl::{self, GLenum, GLint, GLsizei, GLuint};

use crate::blob::BlobStore;
use crate::caps::{ContextInfo, Limit};
use crate::document::Node;
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::enums;
use crate::error::{RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, handle_field, same_slots, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("has_been_bound"),
    Field::restorable("element_array_binding"),
    Field::restorable("attribs"),
];

/// One attribute slot's array state.
#[derive(Clone, Debug, PartialEq)]
pub struct AttribArray {
    pub enabled: bool,
    pub size: GLint,
    pub type_: GLenum,
    pub normalized: bool,
    pub integer: bool,
    pub stride: GLsizei,
    pub offset: GLuint,
    pub divisor: GLuint,
    /// Recorded handle in the `buffers` namespace, or 0.
    pub array_binding: GLuint,
}

impl Default for AttribArray {
    fn default() -> AttribArray {
        AttribArray {
            enabled: false,
            size: 4,
            type_: gl::FLOAT,
            normalized: false,
            integer: false,
            stride: 0,
            offset: 0,
            divisor: 0,
            array_binding: 0,
        }
    }
}

impl AttribArray {
    fn capture(gl: &dyn EntryPoints, index: GLuint) -> AttribArray {
        let iv = |pname| gl.get_vertex_attrib_iv(index, pname);
        AttribArray {
            enabled: iv(gl::VERTEX_ATTRIB_ARRAY_ENABLED) != 0,
            size: iv(gl::VERTEX_ATTRIB_ARRAY_SIZE),
            type_: iv(gl::VERTEX_ATTRIB_ARRAY_TYPE) as GLenum,
            normalized: iv(gl::VERTEX_ATTRIB_ARRAY_NORMALIZED) != 0,
            integer: iv(gl::VERTEX_ATTRIB_ARRAY_INTEGER) != 0,
            stride: iv(gl::VERTEX_ATTRIB_ARRAY_STRIDE),
            offset: gl.get_vertex_attrib_pointer_v(index, gl::VERTEX_ATTRIB_ARRAY_POINTER),
            divisor: iv(gl::VERTEX_ATTRIB_ARRAY_DIVISOR) as GLuint,
            array_binding: iv(gl::VERTEX_ATTRIB_ARRAY_BUFFER_BINDING) as GLuint,
        }
    }

    fn to_node(&self) -> Node {
        Node::object_from(vec![
            ("enabled", Node::from(self.enabled)),
            ("size", Node::from(self.size)),
            ("type", enums::to_node(self.type_)),
            ("normalized", Node::from(self.normalized)),
            ("integer", Node::from(self.integer)),
            ("stride", Node::from(self.stride)),
            ("offset", Node::from(self.offset)),
            ("divisor", Node::from(self.divisor)),
            ("array_binding", Node::from(self.array_binding)),
        ])
    }

    fn from_node(node: &Node) -> Result<AttribArray, StateError> {
        Ok(AttribArray {
            enabled: node.bool_field("enabled")?,
            size: node.i32_field("size")?,
            type_: node.enum_field("type")?,
            normalized: node.bool_field("normalized")?,
            integer: node.bool_field("integer")?,
            stride: node.i32_field("stride")?,
            offset: node.u32_field("offset")?,
            divisor: node.u32_field("divisor")?,
            array_binding: node.u32_field("array_binding")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexArrayState {
    handle: GLuint,
    has_been_bound: bool,
    element_array_binding: GLuint,
    attribs: Vec<AttribArray>,
    valid: bool,
}

impl VertexArrayState {
    pub fn element_array_binding(&self) -> GLuint {
        self.element_array_binding
    }

    pub fn attribs(&self) -> &[AttribArray] {
        &self.attribs
    }

    fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
    ) -> Result<VertexArrayState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("vertex array handle 0".to_string()));
        }

        let has_been_bound = gl.is_vertex_array(handle);
        entry::check(gl, "glIsVertexArray")?;
        let mut state = VertexArrayState {
            handle,
            has_been_bound,
            valid: true,
            ..VertexArrayState::default()
        };
        if !has_been_bound {
            return Ok(state);
        }

        let _scope = BindingScope::bind(gl, Binding::VertexArray, handle)?;
        state.element_array_binding = gl.get_integer_v(gl::ELEMENT_ARRAY_BUFFER_BINDING) as GLuint;
        entry::check(gl, "glGetIntegerv")?;
        for index in 0..info.limit(Limit::MaxVertexAttribs) {
            state.attribs.push(AttribArray::capture(gl, index));
            entry::check(gl, "glGetVertexAttribiv")?;
        }
        Ok(state)
    }

    fn from_node(node: &Node) -> Result<VertexArrayState, StateError> {
        check_fields(node, FIELDS)?;
        let attribs = node
            .array_field("attribs")?
            .iter()
            .map(AttribArray::from_node)
            .collect::<Result<_, _>>()?;
        Ok(VertexArrayState {
            handle: handle_field(node)?,
            has_been_bound: node.bool_field("has_been_bound")?,
            element_array_binding: node.u32_field("element_array_binding")?,
            attribs,
            valid: true,
        })
    }
}

impl ObjectState for VertexArrayState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::VertexArray
    }

    fn recorded_handle(&self) -> GLuint {
        self.handle
    }

    fn target(&self) -> GLenum {
        gl::NONE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = VertexArrayState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = VertexArrayState::capture(gl, info, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();

        let element_buffer = txn.remap(Namespace::Buffers, self.element_array_binding)?;
        let buffers = self
            .attribs
            .iter()
            .map(|a| txn.remap(Namespace::Buffers, a.array_binding))
            .collect::<Result<Vec<_>, _>>()?;

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.gen_vertex_arrays(1).first().cloned().unwrap_or(0);
                txn.check("glGenVertexArrays")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenVertexArrays returned no name".to_string()));
                }
                txn.created(Namespace::VertexArrays, self.handle, handle, gl::NONE)?;
                handle
            }
        };

        if !self.has_been_bound {
            txn.commit();
            return Ok(handle);
        }

        txn.bind(Binding::VertexArray, handle)?;
        // The array buffer binding is context state, not vertex array state;
        // hold on to it so it can be put back.
        let array_buffer = Binding::Buffer(gl::ARRAY_BUFFER);
        txn.bind(array_buffer, array_buffer.current(gl))?;

        // This one belongs to the vertex array, so it must not be put back.
        gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, element_buffer);
        txn.check("glBindBuffer")?;

        let available = txn.info().limit(Limit::MaxVertexAttribs) as usize;
        let count = self.attribs.len().min(available);
        for (index, (attrib, &buffer)) in self.attribs.iter().zip(&buffers).take(count).enumerate() {
            let index = index as GLuint;
            if buffer != 0 {
                gl.bind_buffer(gl::ARRAY_BUFFER, buffer);
                txn.check("glBindBuffer")?;
                if attrib.integer {
                    gl.vertex_attrib_i_pointer(index, attrib.size, attrib.type_, attrib.stride, attrib.offset);
                } else {
                    gl.vertex_attrib_pointer(
                        index,
                        attrib.size,
                        attrib.type_,
                        attrib.normalized,
                        attrib.stride,
                        attrib.offset,
                    );
                }
                txn.check("glVertexAttribPointer")?;
            }
            gl.vertex_attrib_divisor(index, attrib.divisor);
            if attrib.enabled {
                gl.enable_vertex_attrib_array(index);
            } else {
                gl.disable_vertex_attrib_array(index);
            }
            txn.check("glEnableVertexAttribArray")?;
        }

        let lost = self.attribs[count..]
            .iter()
            .filter(|a| **a != AttribArray::default())
            .count();
        if lost > 0 {
            txn.downgrade(
                Some(Namespace::VertexArrays),
                self.handle,
                format!(
                    "context has {} vertex attributes; {} configured slots beyond that dropped",
                    available, lost
                ),
            );
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("has_been_bound", Node::from(self.has_been_bound)),
            ("element_array_binding", Node::from(self.element_array_binding)),
            ("attribs", Node::array_from(self.attribs.iter().map(AttribArray::to_node))),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = VertexArrayState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<VertexArrayState>(other) {
            Some(other) if self.valid => {
                self.has_been_bound == other.has_been_bound
                    && self.element_array_binding == other.element_array_binding
                    && same_slots(&self.attribs, &other.attribs, &AttribArray::default())
            }
            _ => false,
        }
    }

    fn references(&self) -> Vec<(Namespace, GLuint)> {
        let mut buffers: Vec<GLuint> = self
            .attribs
            .iter()
            .map(|a| a.array_binding)
            .chain(Some(self.element_array_binding))
            .filter(|&b| b != 0)
            .collect();
        buffers.sort_unstable();
        buffers.dedup();
        buffers.into_iter().map(|b| (Namespace::Buffers, b)).collect()
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::VertexArrays, self.handle)?;
        self.element_array_binding = remapper.remap(Namespace::Buffers, self.element_array_binding)?;
        for attrib in &mut self.attribs {
            attrib.array_binding = remapper.remap(Namespace::Buffers, attrib.array_binding)?;
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn ObjectState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_references() {
    let mut record = VertexArrayState {
        handle: 1,
        has_been_bound: true,
        element_array_binding: 7,
        attribs: vec![AttribArray::default(); 3],
        valid: true,
    };
    record.attribs[0].array_binding = 4;
    record.attribs[2].array_binding = 4;
    assert_eq!(
        record.references(),
        vec![(Namespace::Buffers, 4), (Namespace::Buffers, 7)]
    );
}
