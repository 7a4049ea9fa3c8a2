//! Buffer objects.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};

use crate::blob::{BlobId, BlobStore};
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::enums;
use crate::error::{BlobError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("target"),
    Field::restorable("usage"),
    Field::restorable("size"),
    Field::restorable("data_blob").optional(),
    Field::diagnostic("access"),
];

/// Targets a buffer can have been first bound to. `GL_NONE` means never.
pub const TARGETS: &[GLenum] = &[
    gl::NONE,
    gl::ARRAY_BUFFER,
    gl::ELEMENT_ARRAY_BUFFER,
    gl::UNIFORM_BUFFER,
    gl::COPY_READ_BUFFER,
    gl::COPY_WRITE_BUFFER,
    gl::PIXEL_PACK_BUFFER,
    gl::PIXEL_UNPACK_BUFFER,
    gl::TRANSFORM_FEEDBACK_BUFFER,
];

const BLOB_PREFIX: &str = "buf";

#[derive(Clone, Debug, PartialEq)]
pub struct BufferState {
    handle: GLuint,
    target: GLenum,
    usage: GLenum,
    data: Vec<u8>,
    access: Option<GLenum>,
    valid: bool,
}

impl Default for BufferState {
    fn default() -> BufferState {
        BufferState {
            handle: 0,
            target: gl::NONE,
            usage: gl::STATIC_DRAW,
            data: vec![],
            access: None,
            valid: false,
        }
    }
}

impl BufferState {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn usage(&self) -> GLenum {
        self.usage
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint, target: GLenum) -> Result<BufferState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("buffer handle 0".to_string()));
        }
        if !TARGETS.contains(&target) {
            return Err(StateError::Unreadable(format!(
                "{} is not a buffer target",
                enums::describe(target)
            )));
        }

        let mut state = BufferState {
            handle,
            target,
            valid: true,
            ..BufferState::default()
        };

        // A name that was never bound has no storage to read.
        if target == gl::NONE {
            return Ok(state);
        }

        let _scope = BindingScope::bind(gl, Binding::Buffer(target), handle)?;
        let size = gl.get_buffer_parameter_iv(target, gl::BUFFER_SIZE);
        state.usage = gl.get_buffer_parameter_iv(target, gl::BUFFER_USAGE) as GLenum;
        let mapped = gl.get_buffer_parameter_iv(target, gl::BUFFER_MAPPED) != 0;
        entry::check(gl, "glGetBufferParameteriv")?;

        let access = gl.get_buffer_parameter_iv(target, gl::BUFFER_ACCESS) as GLenum;
        if entry::check(gl, "glGetBufferParameteriv").is_ok() {
            state.access = Some(access);
        }

        if size < 0 {
            return Err(StateError::Unreadable(format!("buffer reports size {}", size)));
        }
        if mapped {
            return Err(StateError::Unreadable("buffer is mapped".to_string()));
        }

        state.data = gl.get_buffer_sub_data(target, 0, size as usize);
        entry::check(gl, "glGetBufferSubData")?;
        if state.data.len() != size as usize {
            return Err(StateError::Unreadable(format!(
                "read {} bytes of a {}-byte buffer",
                state.data.len(),
                size
            )));
        }
        Ok(state)
    }

    fn from_node(node: &Node, blobs: &dyn BlobStore) -> Result<BufferState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let target = node.enum_field("target")?;
        check_recognized("target", target, TARGETS)?;
        let size = node.u32_field("size")? as usize;

        let data = if size > 0 {
            let id = BlobId::new(node.str_field("data_blob")?);
            let data = blobs.get(&id)?;
            if data.len() != size {
                return Err(BlobError::Corrupt(format!(
                    "blob {} holds {} bytes, but the buffer's size is {}",
                    id,
                    data.len(),
                    size
                ))
                .into());
            }
            data
        } else {
            vec![]
        };

        let access = match node.get("access") {
            Some(_) => Some(node.enum_field("access")?),
            None => None,
        };

        Ok(BufferState {
            handle,
            target,
            usage: node.enum_field("usage")?,
            data,
            access,
            valid: true,
        })
    }
}

impl ObjectState for BufferState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Buffer
    }

    fn recorded_handle(&self) -> GLuint {
        self.handle
    }

    fn target(&self) -> GLenum {
        self.target
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = BufferState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = BufferState::capture(gl, handle, target)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.gen_buffers(1).first().cloned().unwrap_or(0);
                txn.check("glGenBuffers")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenBuffers returned no name".to_string()));
                }
                txn.created(Namespace::Buffers, self.handle, handle, self.target)?;
                handle
            }
        };

        if self.target != gl::NONE {
            txn.bind(Binding::Buffer(self.target), handle)?;
            gl.buffer_data(self.target, &self.data, self.usage);
            txn.check("glBufferData")?;
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let data_blob = if self.data.is_empty() {
            None
        } else {
            Some(blobs.put(BLOB_PREFIX, &self.data)?.as_str().to_string())
        };
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("target", enums::to_node(self.target)),
            ("usage", enums::to_node(self.usage)),
            ("size", Node::from(self.data.len())),
            ("data_blob", Node::from(data_blob)),
            ("access", self.access.map_or(Node::Null, enums::to_node)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = BufferState::from_node(node, blobs)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<BufferState>(other) {
            Some(other) if self.valid => {
                self.target == other.target && self.usage == other.usage && self.data == other.data
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Buffers, self.handle)?;
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
fn test_missing_blob_is_corrupt() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let node = document::from_json(
        r#"{ "handle": 4, "target": "GL_ARRAY_BUFFER", "usage": "GL_STATIC_DRAW",
             "size": 16, "data_blob": "buf_0000000000000000_16.blob" }"#,
    )
    .unwrap();
    let mut record = BufferState::default();
    assert!(matches!(
        record.deserialize(&node, &MemoryBlobs::new()),
        Err(StateError::Blob(BlobError::NotFound(_)))
    ));
    assert!(!record.is_valid());

    let mut blobs = MemoryBlobs::new();
    let id = blobs.put("buf", &[1, 2, 3]).unwrap();
    let node = document::from_json(&format!(
        r#"{{ "handle": 4, "target": "GL_ARRAY_BUFFER", "usage": "GL_STATIC_DRAW",
              "size": 16, "data_blob": "{}" }}"#,
        id
    ))
    .unwrap();
    assert!(matches!(
        record.deserialize(&node, &blobs),
        Err(StateError::Blob(BlobError::Corrupt(_)))
    ));
}
