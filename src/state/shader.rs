//! Shader objects.
//!
//! A shader is restored from its source text. If it had been compiled when it
//! was captured, it is compiled again; the driver may well come to a
//! different conclusion this time, which is worth a warning but doesn't stop
//! the restore.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};
use log::warn;

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums::{self, COMPUTE_SHADER, TESS_CONTROL_SHADER, TESS_EVALUATION_SHADER};
use crate::error::{RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("type"),
    Field::restorable("source"),
    Field::restorable("compile_status"),
    Field::diagnostic("info_log"),
    Field::diagnostic("marked_for_deletion"),
];

pub const TYPES: &[GLenum] = &[
    gl::VERTEX_SHADER,
    gl::FRAGMENT_SHADER,
    gl::GEOMETRY_SHADER,
    COMPUTE_SHADER,
    TESS_CONTROL_SHADER,
    TESS_EVALUATION_SHADER,
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderState {
    handle: GLuint,
    shader_type: GLenum,
    source: String,
    compile_status: bool,
    info_log: Option<String>,
    marked_for_deletion: Option<bool>,
    valid: bool,
}

impl ShaderState {
    pub fn shader_type(&self) -> GLenum {
        self.shader_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compile_status(&self) -> bool {
        self.compile_status
    }

    pub fn info_log(&self) -> Option<&str> {
        self.info_log.as_deref()
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint) -> Result<ShaderState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("shader handle 0".to_string()));
        }
        // The shader's type is fixed at creation; the target we were handed
        // doesn't enter into it.
        let shader_type = gl.get_shader_iv(handle, gl::SHADER_TYPE) as GLenum;
        entry::check(gl, "glGetShaderiv")?;
        if !TYPES.contains(&shader_type) {
            return Err(StateError::Unreadable(format!(
                "{} is not a shader type",
                enums::describe(shader_type)
            )));
        }

        let source = gl.get_shader_source(handle);
        let compile_status = gl.get_shader_iv(handle, gl::COMPILE_STATUS) != 0;
        entry::check(gl, "glGetShaderSource")?;

        let info_log = gl.get_shader_info_log(handle);
        let info_log = entry::check(gl, "glGetShaderInfoLog").ok().map(|()| info_log);
        let deleted = gl.get_shader_iv(handle, gl::DELETE_STATUS) != 0;
        let marked_for_deletion = entry::check(gl, "glGetShaderiv").ok().map(|()| deleted);

        Ok(ShaderState {
            handle,
            shader_type,
            source,
            compile_status,
            info_log,
            marked_for_deletion,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<ShaderState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let shader_type = node.enum_field("type")?;
        check_recognized("type", shader_type, TYPES)?;
        let info_log = match node.get("info_log") {
            Some(_) => Some(node.str_field("info_log")?.to_string()),
            None => None,
        };
        let marked_for_deletion = match node.get("marked_for_deletion") {
            Some(_) => Some(node.bool_field("marked_for_deletion")?),
            None => None,
        };
        Ok(ShaderState {
            handle,
            shader_type,
            source: node.str_field("source")?.to_string(),
            compile_status: node.bool_field("compile_status")?,
            info_log,
            marked_for_deletion,
            valid: true,
        })
    }
}

impl ObjectState for ShaderState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Shader
    }

    fn recorded_handle(&self) -> GLuint {
        self.handle
    }

    fn target(&self) -> GLenum {
        self.shader_type
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = ShaderState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = ShaderState::capture(gl, handle)?;
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
                let handle = gl.create_shader(self.shader_type);
                txn.check("glCreateShader")?;
                if handle == 0 {
                    return Err(StateError::Unsupported(format!(
                        "glCreateShader({}) returned no name",
                        enums::describe(self.shader_type)
                    )));
                }
                txn.created(Namespace::Shaders, self.handle, handle, self.shader_type)?;
                handle
            }
        };

        gl.shader_source(handle, &self.source);
        txn.check("glShaderSource")?;

        if self.compile_status {
            gl.compile_shader(handle);
            txn.check("glCompileShader")?;
            if gl.get_shader_iv(handle, gl::COMPILE_STATUS) == 0 {
                warn!(
                    "shader {} compiled when captured but not when restored: {}",
                    self.handle,
                    gl.get_shader_info_log(handle)
                );
                entry::clear_errors(gl);
            }
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
            ("type", enums::to_node(self.shader_type)),
            ("source", Node::from(self.source.as_str())),
            ("compile_status", Node::from(self.compile_status)),
            ("info_log", Node::from(self.info_log.clone())),
            ("marked_for_deletion", Node::from(self.marked_for_deletion)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = ShaderState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<ShaderState>(other) {
            Some(other) if self.valid => {
                self.shader_type == other.shader_type
                    && self.source == other.source
                    && self.compile_status == other.compile_status
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Shaders, self.handle)?;
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
fn test_unrecognized_type() {
    use crate::blob::MemoryBlobs;
    use crate::document;
    use crate::error::DocumentError;

    let node = document::from_json(
        r#"{ "handle": 1, "type": "GL_TEXTURE_2D", "source": "", "compile_status": false }"#,
    )
    .unwrap();
    let mut record = ShaderState::default();
    assert!(matches!(
        record.deserialize(&node, &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::Unrecognized { .. }))
    ));

    let node = document::from_json(
        r#"{ "handle": 1, "type": "GL_COMPUTE_SHADER", "source": "void main() {}",
             "compile_status": true, "info_log": "ok", "extra": [1, 2, 3] }"#,
    )
    .unwrap();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert_eq!(record.shader_type(), COMPUTE_SHADER);
    assert_eq!(record.info_log(), Some("ok"));
}
