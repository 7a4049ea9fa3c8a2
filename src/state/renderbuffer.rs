//! Renderbuffer objects.
//!
//! A renderbuffer's contents aren't captured, only its storage: size, sample
//! count and internal format. The per-channel bit depths the driver picked
//! for that format are recorded for inspection.

use std::any::Any;

use gleam::gl::{self, GLenum, GLint, GLuint};

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::enums;
use crate::error::{RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("target"),
    Field::restorable("width"),
    Field::restorable("height"),
    Field::restorable("samples"),
    Field::restorable("internal_format"),
    Field::diagnostic("red_size"),
    Field::diagnostic("green_size"),
    Field::diagnostic("blue_size"),
    Field::diagnostic("alpha_size"),
    Field::diagnostic("depth_size"),
    Field::diagnostic("stencil_size"),
];

pub const TARGETS: &[GLenum] = &[gl::NONE, gl::RENDERBUFFER];

const CHANNEL_SIZES: &[(GLenum, &str)] = &[
    (gl::RENDERBUFFER_RED_SIZE, "red_size"),
    (gl::RENDERBUFFER_GREEN_SIZE, "green_size"),
    (gl::RENDERBUFFER_BLUE_SIZE, "blue_size"),
    (gl::RENDERBUFFER_ALPHA_SIZE, "alpha_size"),
    (gl::RENDERBUFFER_DEPTH_SIZE, "depth_size"),
    (gl::RENDERBUFFER_STENCIL_SIZE, "stencil_size"),
];

#[derive(Clone, Debug, PartialEq)]
pub struct RenderbufferState {
    handle: GLuint,
    target: GLenum,
    width: GLint,
    height: GLint,
    samples: GLint,
    internal_format: GLenum,
    /// Parallel to `CHANNEL_SIZES`; empty if they couldn't be read.
    channel_sizes: Vec<GLint>,
    valid: bool,
}

impl Default for RenderbufferState {
    fn default() -> RenderbufferState {
        RenderbufferState {
            handle: 0,
            target: gl::NONE,
            width: 0,
            height: 0,
            samples: 0,
            internal_format: gl::RGBA4,
            channel_sizes: vec![],
            valid: false,
        }
    }
}

impl RenderbufferState {
    pub fn size(&self) -> (GLint, GLint) {
        (self.width, self.height)
    }

    pub fn internal_format(&self) -> GLenum {
        self.internal_format
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint, target: GLenum) -> Result<RenderbufferState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("renderbuffer handle 0".to_string()));
        }
        if !TARGETS.contains(&target) {
            return Err(StateError::Unreadable(format!(
                "{} is not a renderbuffer target",
                enums::describe(target)
            )));
        }

        let mut state = RenderbufferState {
            handle,
            target,
            valid: true,
            ..RenderbufferState::default()
        };
        if target == gl::NONE {
            return Ok(state);
        }

        let _scope = BindingScope::bind(gl, Binding::Renderbuffer, handle)?;
        state.width = gl.get_renderbuffer_parameter_iv(target, gl::RENDERBUFFER_WIDTH);
        state.height = gl.get_renderbuffer_parameter_iv(target, gl::RENDERBUFFER_HEIGHT);
        state.samples = gl.get_renderbuffer_parameter_iv(target, gl::RENDERBUFFER_SAMPLES);
        state.internal_format =
            gl.get_renderbuffer_parameter_iv(target, gl::RENDERBUFFER_INTERNAL_FORMAT) as GLenum;
        entry::check(gl, "glGetRenderbufferParameteriv")?;

        let sizes: Vec<GLint> = CHANNEL_SIZES
            .iter()
            .map(|&(pname, _)| gl.get_renderbuffer_parameter_iv(target, pname))
            .collect();
        if entry::check(gl, "glGetRenderbufferParameteriv").is_ok() {
            state.channel_sizes = sizes;
        }
        Ok(state)
    }

    fn from_node(node: &Node) -> Result<RenderbufferState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let target = node.enum_field("target")?;
        check_recognized("target", target, TARGETS)?;

        let mut channel_sizes = vec![];
        if CHANNEL_SIZES.iter().all(|&(_, name)| node.get(name).is_some()) {
            for &(_, name) in CHANNEL_SIZES {
                channel_sizes.push(node.i32_field(name)?);
            }
        }

        Ok(RenderbufferState {
            handle,
            target,
            width: node.i32_field("width")?,
            height: node.i32_field("height")?,
            samples: node.i32_field("samples")?,
            internal_format: node.enum_field("internal_format")?,
            channel_sizes,
            valid: true,
        })
    }
}

impl ObjectState for RenderbufferState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Renderbuffer
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
        *self = RenderbufferState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = RenderbufferState::capture(gl, handle, target)?;
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
                let handle = gl.gen_renderbuffers(1).first().cloned().unwrap_or(0);
                txn.check("glGenRenderbuffers")?;
                if handle == 0 {
                    return Err(StateError::Unsupported(
                        "glGenRenderbuffers returned no name".to_string(),
                    ));
                }
                txn.created(Namespace::RenderBuffers, self.handle, handle, self.target)?;
                handle
            }
        };

        if self.target != gl::NONE {
            // Binding is what turns a generated name into a renderbuffer.
            txn.bind(Binding::Renderbuffer, handle)?;
            if self.width > 0 && self.height > 0 {
                gl.renderbuffer_storage_multisample(
                    gl::RENDERBUFFER,
                    self.samples,
                    self.internal_format,
                    self.width,
                    self.height,
                );
                txn.check("glRenderbufferStorageMultisample")?;
            }
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let mut fields = vec![
            ("handle", Node::from(self.handle)),
            ("target", enums::to_node(self.target)),
            ("width", Node::from(self.width)),
            ("height", Node::from(self.height)),
            ("samples", Node::from(self.samples)),
            ("internal_format", enums::to_node(self.internal_format)),
        ];
        for (&(_, name), &size) in CHANNEL_SIZES.iter().zip(&self.channel_sizes) {
            fields.push((name, Node::from(size)));
        }
        Ok(Node::object_from(fields))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = RenderbufferState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<RenderbufferState>(other) {
            Some(other) if self.valid => {
                self.target == other.target
                    && self.width == other.width
                    && self.height == other.height
                    && self.samples == other.samples
                    && self.internal_format == other.internal_format
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::RenderBuffers, self.handle)?;
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
fn test_channel_sizes_are_not_compared() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let text = r#"{ "handle": 2, "target": "GL_RENDERBUFFER", "width": 64, "height": 32,
                    "samples": 0, "internal_format": "GL_RGBA8",
                    "red_size": 8, "green_size": 8, "blue_size": 8, "alpha_size": 8,
                    "depth_size": 0, "stencil_size": 0 }"#;
    let mut a = RenderbufferState::default();
    a.deserialize(&document::from_json(text).unwrap(), &MemoryBlobs::new())
        .unwrap();
    let mut b = a.clone();
    b.channel_sizes = vec![5, 6, 5, 0, 0, 0];
    assert!(a.compare_restorable_state(&b));
    b.width = 65;
    assert!(!a.compare_restorable_state(&b));

    let mut blobs = MemoryBlobs::new();
    let node = a.serialize(&mut blobs).unwrap();
    assert_eq!(node.i64_field("red_size").unwrap(), 8);
}
