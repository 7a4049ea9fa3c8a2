//! Per-kind state records.
//!
//! Each GL object kind has a record type here that can capture the object's
//! state from a live context (`snapshot`), recreate an equivalent object in
//! another context (`restore`), move itself in and out of a structured
//! document (`serialize`, `deserialize`), and compare itself with another
//! record of the same kind.
//!
//! A record is either empty or holds a complete, valid snapshot; there is no
//! partially filled state. Operations that need a snapshot fail with
//! `StateError::Invalid` on an empty record. A failed `snapshot` or
//! `deserialize` leaves the record empty.
//!
//! Records refer to other objects by their recorded handles. Those references
//! are only translated into live handles, through the `HandleRemapper`, while
//! restoring.
//!
//! Every field a record serializes has a declared `FieldClass`. `Restorable`
//! fields are re-applied by `restore` and are exactly the fields that
//! `compare_restorable_state` looks at. `Diagnostic` fields are captured so
//! people can see them, but can't be pushed back into a new object: a query's
//! last result, a shader's info log.

use std::any::Any;
use std::fmt;

use gleam::gl::{GLenum, GLuint};

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::EntryPoints;
use crate::error::{DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;
use crate::report::PassReport;

mod transaction;

pub mod buffer;
pub mod framebuffer;
pub mod pipeline;
pub mod program;
pub mod query;
pub mod renderbuffer;
pub mod sampler;
pub mod sampling;
pub mod shader;
pub mod sync;
pub mod texture;
pub mod uniform;
pub mod vertex_array;
pub mod vertex_attrib;

pub use transaction::Transaction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// Names the object; not compared.
    Identity,
    /// Re-applied on restore, and compared.
    Restorable,
    /// Captured for inspection only.
    Diagnostic,
}

/// The declared schema of one serialized field.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub class: FieldClass,
    pub required: bool,
}

impl Field {
    pub const fn identity(name: &'static str) -> Field {
        Field { name, class: FieldClass::Identity, required: true }
    }

    pub const fn restorable(name: &'static str) -> Field {
        Field { name, class: FieldClass::Restorable, required: true }
    }

    pub const fn diagnostic(name: &'static str) -> Field {
        Field { name, class: FieldClass::Diagnostic, required: false }
    }

    pub const fn optional(self) -> Field {
        Field { required: false, ..self }
    }
}

/// Look up the class of the field `name` in `fields`.
pub fn class_of(fields: &[Field], name: &str) -> Option<FieldClass> {
    fields.iter().find(|f| f.name == name).map(|f| f.class)
}

/// Fail if `node` lacks any field that `fields` marks as required.
pub fn check_fields(node: &Node, fields: &[Field]) -> Result<(), DocumentError> {
    for field in fields.iter().filter(|f| f.required) {
        node.field(field.name)?;
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    Renderbuffer,
    Sampler,
    Query,
    Shader,
    Program,
    Framebuffer,
    VertexArray,
    Pipeline,
    Sync,
    /// The context's current generic vertex attribute values. Not an object
    /// with a handle.
    CurrentVertexAttribs,
}

impl ObjectKind {
    /// The namespace handles of this kind live in, if it has handles at all.
    pub fn namespace(self) -> Option<Namespace> {
        Some(match self {
            ObjectKind::Buffer => Namespace::Buffers,
            ObjectKind::Texture => Namespace::Textures,
            ObjectKind::Renderbuffer => Namespace::RenderBuffers,
            ObjectKind::Sampler => Namespace::Samplers,
            ObjectKind::Query => Namespace::Queries,
            ObjectKind::Shader => Namespace::Shaders,
            ObjectKind::Program => Namespace::Programs,
            ObjectKind::Framebuffer => Namespace::Framebuffers,
            ObjectKind::VertexArray => Namespace::VertexArrays,
            ObjectKind::Pipeline => Namespace::Pipelines,
            ObjectKind::Sync => Namespace::Syncs,
            ObjectKind::CurrentVertexAttribs => return None,
        })
    }

    pub fn for_namespace(namespace: Namespace) -> ObjectKind {
        match namespace {
            Namespace::Buffers => ObjectKind::Buffer,
            Namespace::Textures => ObjectKind::Texture,
            Namespace::RenderBuffers => ObjectKind::Renderbuffer,
            Namespace::Samplers => ObjectKind::Sampler,
            Namespace::Queries => ObjectKind::Query,
            Namespace::Shaders => ObjectKind::Shader,
            Namespace::Programs => ObjectKind::Program,
            Namespace::Framebuffers => ObjectKind::Framebuffer,
            Namespace::VertexArrays => ObjectKind::VertexArray,
            Namespace::Pipelines => ObjectKind::Pipeline,
            Namespace::Syncs => ObjectKind::Sync,
        }
    }

    /// The serialized fields of this kind's records, with their classes.
    pub fn fields(self) -> &'static [Field] {
        match self {
            ObjectKind::Buffer => buffer::FIELDS,
            ObjectKind::Texture => texture::FIELDS,
            ObjectKind::Renderbuffer => renderbuffer::FIELDS,
            ObjectKind::Sampler => sampler::FIELDS,
            ObjectKind::Query => query::FIELDS,
            ObjectKind::Shader => shader::FIELDS,
            ObjectKind::Program => program::FIELDS,
            ObjectKind::Framebuffer => framebuffer::FIELDS,
            ObjectKind::VertexArray => vertex_array::FIELDS,
            ObjectKind::Pipeline => pipeline::FIELDS,
            ObjectKind::Sync => sync::FIELDS,
            ObjectKind::CurrentVertexAttribs => vertex_attrib::FIELDS,
        }
    }

    /// Make an empty record of this kind.
    pub fn new_record(self) -> Box<dyn ObjectState> {
        match self {
            ObjectKind::Buffer => Box::new(buffer::BufferState::default()),
            ObjectKind::Texture => Box::new(texture::TextureState::default()),
            ObjectKind::Renderbuffer => Box::new(renderbuffer::RenderbufferState::default()),
            ObjectKind::Sampler => Box::new(sampler::SamplerState::default()),
            ObjectKind::Query => Box::new(query::QueryState::default()),
            ObjectKind::Shader => Box::new(shader::ShaderState::default()),
            ObjectKind::Program => Box::new(program::ProgramState::default()),
            ObjectKind::Framebuffer => Box::new(framebuffer::FramebufferState::default()),
            ObjectKind::VertexArray => Box::new(vertex_array::VertexArrayState::default()),
            ObjectKind::Pipeline => Box::new(pipeline::PipelineState::default()),
            ObjectKind::Sync => Box::new(sync::SyncState::default()),
            ObjectKind::CurrentVertexAttribs => {
                Box::new(vertex_attrib::CurrentVertexAttribState::default())
            }
        }
    }
}

/// Everything a record's `restore` needs from the pass driving it.
pub struct RestoreContext<'a> {
    pub gl: &'a dyn EntryPoints,
    /// The context being restored into, which may be less capable than the
    /// one the record was captured from.
    pub info: &'a ContextInfo,
    pub remapper: &'a mut HandleRemapper,
    pub report: &'a mut PassReport,
}

pub trait ObjectState: fmt::Debug {
    fn kind(&self) -> ObjectKind;

    /// The handle the object had when it was captured.
    fn recorded_handle(&self) -> GLuint;

    /// The target the object was bound to, or `GL_NONE`.
    fn target(&self) -> GLenum;

    fn is_valid(&self) -> bool;

    fn clear(&mut self);

    /// Capture the state of the live object `handle`, which was last bound
    /// to `target`.
    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<(), StateError>;

    /// Bring a live object into the recorded state, returning its handle.
    ///
    /// If `live` is `None`, a new object is created and declared in the
    /// remapper under this record's recorded handle. If restoring fails, any
    /// object created along the way is destroyed again.
    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError>;

    fn serialize(&self, blobs: &mut dyn BlobStore) -> Result<Node, StateError>;

    fn deserialize(&mut self, node: &Node, blobs: &dyn BlobStore) -> Result<(), StateError>;

    /// True if both records are valid, of the same kind, and agree on every
    /// restorable field.
    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool;

    /// The objects this record refers to, by recorded handle.
    fn references(&self) -> Vec<(Namespace, GLuint)> {
        vec![]
    }

    /// Replace this record's own handle and every handle it refers to with
    /// the corresponding live handles.
    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError>;

    fn fields(&self) -> &'static [Field] {
        self.kind().fields()
    }

    fn box_clone(&self) -> Box<dyn ObjectState>;

    fn as_any(&self) -> &dyn Any;
}

/// Return `other` as a `T` if it is one and is valid.
fn valid_as<T: ObjectState + 'static>(other: &dyn ObjectState) -> Option<&T> {
    if !other.is_valid() {
        return None;
    }
    other.as_any().downcast_ref::<T>()
}

/// Compare per-slot state captured from contexts that may have different
/// numbers of slots. Slots only one side has must hold `default`.
fn same_slots<T: PartialEq>(a: &[T], b: &[T], default: &T) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long[..short.len()] == *short && long[short.len()..].iter().all(|slot| slot == default)
}

/// The bits of `f`, with every NaN the same NaN, for comparing captured
/// floats exactly.
fn float_bits(f: f32) -> u32 {
    if f.is_nan() {
        f32::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// Read a required nonzero handle from a record document.
fn handle_field(node: &Node) -> Result<GLuint, DocumentError> {
    match node.u32_field("handle")? {
        0 => Err(DocumentError::WrongType {
            field: "handle".to_string(),
            expected: "nonzero handle",
        }),
        handle => Ok(handle),
    }
}

/// Fail if `value` is not one of `recognized`.
fn check_recognized(field: &str, value: GLenum, recognized: &[GLenum]) -> Result<(), DocumentError> {
    if recognized.contains(&value) {
        Ok(())
    } else {
        Err(DocumentError::Unrecognized {
            field: field.to_string(),
            value,
        })
    }
}

#[test]
fn test_field_tables() {
    let kinds = [
        ObjectKind::Buffer,
        ObjectKind::Texture,
        ObjectKind::Renderbuffer,
        ObjectKind::Sampler,
        ObjectKind::Query,
        ObjectKind::Shader,
        ObjectKind::Program,
        ObjectKind::Framebuffer,
        ObjectKind::VertexArray,
        ObjectKind::Pipeline,
        ObjectKind::Sync,
        ObjectKind::CurrentVertexAttribs,
    ];
    for &kind in kinds.iter() {
        let fields = kind.fields();
        assert!(fields.iter().any(|f| f.class == FieldClass::Restorable), "{:?}", kind);
        // Diagnostic fields are never required: a failed read-back leaves
        // them out.
        assert!(fields
            .iter()
            .all(|f| f.class != FieldClass::Diagnostic || !f.required));
        assert_eq!(kind.new_record().kind(), kind);
        assert_eq!(kind.namespace().map(ObjectKind::for_namespace), kind.namespace().map(|_| kind));
    }

    use FieldClass::*;
    assert_eq!(class_of(query::FIELDS, "prev_result"), Some(Diagnostic));
    assert_eq!(class_of(query::FIELDS, "has_been_begun"), Some(Restorable));
    assert_eq!(class_of(query::FIELDS, "target"), Some(Restorable));
    assert_eq!(class_of(query::FIELDS, "handle"), Some(Identity));
    assert_eq!(class_of(shader::FIELDS, "info_log"), Some(Diagnostic));
    assert_eq!(class_of(shader::FIELDS, "source"), Some(Restorable));
    assert_eq!(class_of(program::FIELDS, "info_log"), Some(Diagnostic));
    assert_eq!(class_of(program::FIELDS, "uniforms"), Some(Restorable));
    assert_eq!(class_of(program::FIELDS, "uniform_block_bindings"), Some(Restorable));
    assert_eq!(class_of(pipeline::FIELDS, "stages"), Some(Restorable));
    assert_eq!(class_of(sync::FIELDS, "status"), Some(Diagnostic));
    assert_eq!(class_of(sync::FIELDS, "condition"), Some(Restorable));
    assert_eq!(class_of(renderbuffer::FIELDS, "red_size"), Some(Diagnostic));
    assert_eq!(class_of(renderbuffer::FIELDS, "internal_format"), Some(Restorable));
    assert_eq!(class_of(framebuffer::FIELDS, "status"), Some(Diagnostic));
    assert_eq!(class_of(buffer::FIELDS, "access"), Some(Diagnostic));
    assert_eq!(class_of(buffer::FIELDS, "data_blob"), Some(Restorable));
    assert_eq!(class_of(vertex_attrib::FIELDS, "attribs"), Some(Restorable));
}

#[test]
fn test_same_slots() {
    let three = [[1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0]];
    let default = [0.0, 0.0, 0.0, 1.0];
    assert!(same_slots(&three, &three[..1], &default));
    assert!(same_slots(&three[..1], &three, &default));
    assert!(!same_slots(&three[1..], &three, &default));
    assert!(!same_slots(&three[..2], &three[..0], &[0.0; 4]));
}
