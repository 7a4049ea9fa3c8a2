//! Framebuffer objects.
//!
//! A framebuffer is mostly references: which texture level or renderbuffer
//! sits at each attachment point. Those are recorded by recorded handle and
//! looked up in the remapper at restore time, so framebuffers are restored
//! after textures and renderbuffers.

use std::any::Any;

use gleam::gl::{self, GLenum, GLint, GLuint};
use log::warn;

use crate::blob::BlobStore;
use crate::caps::{ContextInfo, Limit};
use crate::document::{self, Node};
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::enums;
use crate::error::{DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("has_been_bound"),
    Field::restorable("attachments"),
    Field::restorable("draw_buffers"),
    Field::restorable("read_buffer"),
    Field::diagnostic("status"),
];

/// The most color attachment points GL defines.
const MAX_COLOR_POINTS: GLenum = 32;

const OBJECT_TYPES: &[GLenum] = &[gl::TEXTURE, gl::RENDERBUFFER];

#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub point: GLenum,
    /// `GL_TEXTURE` or `GL_RENDERBUFFER`.
    pub object_type: GLenum,
    /// Recorded handle in the namespace `object_type` implies.
    pub handle: GLuint,
    pub level: GLint,
}

impl Attachment {
    fn namespace(&self) -> Namespace {
        if self.object_type == gl::TEXTURE {
            Namespace::Textures
        } else {
            Namespace::RenderBuffers
        }
    }
}

/// If `point` is a color attachment, return its index.
fn color_index(point: GLenum) -> Option<u32> {
    if point >= gl::COLOR_ATTACHMENT0 && point < gl::COLOR_ATTACHMENT0 + MAX_COLOR_POINTS {
        Some(point - gl::COLOR_ATTACHMENT0)
    } else {
        None
    }
}

fn is_attachment_point(point: GLenum) -> bool {
    color_index(point).is_some()
        || point == gl::DEPTH_ATTACHMENT
        || point == gl::STENCIL_ATTACHMENT
        || point == gl::DEPTH_STENCIL_ATTACHMENT
}

#[derive(Clone, Debug, PartialEq)]
pub struct FramebufferState {
    handle: GLuint,
    has_been_bound: bool,
    attachments: Vec<Attachment>,
    /// Trailing `GL_NONE` entries are dropped.
    draw_buffers: Vec<GLenum>,
    read_buffer: GLenum,
    status: Option<GLenum>,
    valid: bool,
}

impl Default for FramebufferState {
    fn default() -> FramebufferState {
        FramebufferState {
            handle: 0,
            has_been_bound: false,
            attachments: vec![],
            draw_buffers: vec![gl::COLOR_ATTACHMENT0],
            read_buffer: gl::COLOR_ATTACHMENT0,
            status: None,
            valid: false,
        }
    }
}

impl FramebufferState {
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn draw_buffers(&self) -> &[GLenum] {
        &self.draw_buffers
    }

    pub fn status(&self) -> Option<GLenum> {
        self.status
    }

    fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
    ) -> Result<FramebufferState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("framebuffer handle 0".to_string()));
        }

        let has_been_bound = gl.is_framebuffer(handle);
        entry::check(gl, "glIsFramebuffer")?;
        let mut state = FramebufferState {
            handle,
            has_been_bound,
            valid: true,
            ..FramebufferState::default()
        };
        if !has_been_bound {
            return Ok(state);
        }

        let _scope = BindingScope::bind(gl, Binding::Framebuffer, handle)?;

        let colors = info.limit(Limit::MaxColorAttachments).max(1).min(MAX_COLOR_POINTS);
        let points = (0..colors)
            .map(|i| gl::COLOR_ATTACHMENT0 + i)
            .chain(vec![gl::DEPTH_ATTACHMENT, gl::STENCIL_ATTACHMENT]);
        for point in points {
            let pname = |p| gl.get_framebuffer_attachment_parameter_iv(gl::FRAMEBUFFER, point, p);
            let object_type = pname(gl::FRAMEBUFFER_ATTACHMENT_OBJECT_TYPE) as GLenum;
            entry::check(gl, "glGetFramebufferAttachmentParameteriv")?;
            if object_type == gl::NONE {
                continue;
            }
            if !OBJECT_TYPES.contains(&object_type) {
                return Err(StateError::Unreadable(format!(
                    "{} has attachment of type {}",
                    enums::describe(point),
                    enums::describe(object_type)
                )));
            }
            let name = pname(gl::FRAMEBUFFER_ATTACHMENT_OBJECT_NAME) as GLuint;
            let level = if object_type == gl::TEXTURE {
                pname(gl::FRAMEBUFFER_ATTACHMENT_TEXTURE_LEVEL)
            } else {
                0
            };
            entry::check(gl, "glGetFramebufferAttachmentParameteriv")?;
            state.attachments.push(Attachment {
                point,
                object_type,
                handle: name,
                level,
            });
        }

        let draw_count = info.limit(Limit::MaxDrawBuffers).max(1);
        state.draw_buffers = (0..draw_count)
            .map(|i| gl.get_integer_v(gl::DRAW_BUFFER0 + i) as GLenum)
            .collect();
        state.read_buffer = gl.get_integer_v(gl::READ_BUFFER) as GLenum;
        entry::check(gl, "glGetIntegerv")?;
        while state.draw_buffers.last() == Some(&gl::NONE) {
            state.draw_buffers.pop();
        }

        let status = gl.check_framebuffer_status(gl::FRAMEBUFFER);
        if entry::check(gl, "glCheckFramebufferStatus").is_ok() {
            state.status = Some(status);
        }
        Ok(state)
    }

    fn from_node(node: &Node) -> Result<FramebufferState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;

        let mut attachments = vec![];
        for attachment in node.array_field("attachments")? {
            let point = attachment.enum_field("point")?;
            if !is_attachment_point(point) {
                return Err(DocumentError::Unrecognized {
                    field: "point".to_string(),
                    value: point,
                }
                .into());
            }
            let object_type = attachment.enum_field("type")?;
            check_recognized("type", object_type, OBJECT_TYPES)?;
            let handle = attachment.u32_field("handle")?;
            if handle == 0 {
                return Err(DocumentError::WrongType {
                    field: "handle".to_string(),
                    expected: "nonzero handle",
                }
                .into());
            }
            attachments.push(Attachment {
                point,
                object_type,
                handle,
                level: attachment.i32_field("level")?,
            });
        }

        let draw_buffers = node
            .array_field("draw_buffers")?
            .iter()
            .map(|b| document::enum_value(b, "draw_buffers"))
            .collect::<Result<Vec<_>, _>>()?;

        let status = match node.get("status") {
            Some(_) => Some(node.enum_field("status")?),
            None => None,
        };

        Ok(FramebufferState {
            handle,
            has_been_bound: node.bool_field("has_been_bound")?,
            attachments,
            draw_buffers,
            read_buffer: node.enum_field("read_buffer")?,
            status,
            valid: true,
        })
    }
}

impl ObjectState for FramebufferState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Framebuffer
    }

    fn recorded_handle(&self) -> GLuint {
        self.handle
    }

    fn target(&self) -> GLenum {
        if self.has_been_bound {
            gl::FRAMEBUFFER
        } else {
            gl::NONE
        }
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = FramebufferState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = FramebufferState::capture(gl, info, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();
        let max_colors = txn.info().limit(Limit::MaxColorAttachments);
        let max_draw = txn.info().limit(Limit::MaxDrawBuffers) as usize;
        let fits = |point: GLenum| match color_index(point) {
            Some(i) => max_colors == 0 || i < max_colors,
            None => true,
        };

        // Look up everything we refer to before creating anything.
        let mut resolved = vec![];
        for attachment in &self.attachments {
            let live = txn.remap(attachment.namespace(), attachment.handle)?;
            let textarget = if attachment.object_type == gl::TEXTURE {
                match txn.target_of(Namespace::Textures, attachment.handle)? {
                    gl::NONE => gl::TEXTURE_2D,
                    target => target,
                }
            } else {
                gl::RENDERBUFFER
            };
            resolved.push((attachment, live, textarget));
        }

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.gen_framebuffers(1).first().cloned().unwrap_or(0);
                txn.check("glGenFramebuffers")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenFramebuffers returned no name".to_string()));
                }
                txn.created(Namespace::Framebuffers, self.handle, handle, self.target())?;
                handle
            }
        };

        if !self.has_been_bound {
            txn.commit();
            return Ok(handle);
        }

        txn.bind(Binding::Framebuffer, handle)?;

        for (attachment, live, textarget) in resolved {
            if !fits(attachment.point) {
                txn.downgrade(
                    Some(Namespace::Framebuffers),
                    self.handle,
                    format!(
                        "{} dropped: context has {} color attachments",
                        enums::describe(attachment.point),
                        max_colors
                    ),
                );
                continue;
            }
            if attachment.object_type == gl::TEXTURE {
                gl.framebuffer_texture_2d(gl::FRAMEBUFFER, attachment.point, textarget, live, attachment.level);
                txn.check("glFramebufferTexture2D")?;
            } else {
                gl.framebuffer_renderbuffer(gl::FRAMEBUFFER, attachment.point, gl::RENDERBUFFER, live);
                txn.check("glFramebufferRenderbuffer")?;
            }
        }

        let mut draw_buffers: Vec<GLenum> = self
            .draw_buffers
            .iter()
            .map(|&b| if fits(b) { b } else { gl::NONE })
            .collect();
        if max_draw > 0 && draw_buffers.len() > max_draw {
            draw_buffers.truncate(max_draw);
        }
        if draw_buffers[..] != self.draw_buffers[..] {
            txn.downgrade(
                Some(Namespace::Framebuffers),
                self.handle,
                format!(
                    "draw buffers {:?} restored as {:?}",
                    self.draw_buffers, draw_buffers
                ),
            );
        }
        if draw_buffers.is_empty() {
            draw_buffers.push(gl::NONE);
        }
        gl.draw_buffers(&draw_buffers);
        txn.check("glDrawBuffers")?;

        let read_buffer = if fits(self.read_buffer) {
            self.read_buffer
        } else {
            txn.downgrade(
                Some(Namespace::Framebuffers),
                self.handle,
                format!("read buffer {} dropped", enums::describe(self.read_buffer)),
            );
            gl::NONE
        };
        gl.read_buffer(read_buffer);
        txn.check("glReadBuffer")?;

        if let Some(status) = self.status {
            let now = gl.check_framebuffer_status(gl::FRAMEBUFFER);
            if now != status {
                warn!(
                    "framebuffer {} was {} when captured, is {} when restored",
                    self.handle,
                    enums::describe(status),
                    enums::describe(now)
                );
            }
            entry::clear_errors(gl);
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let attachments = self.attachments.iter().map(|a| {
            Node::object_from(vec![
                ("point", enums::to_node(a.point)),
                ("type", enums::to_node(a.object_type)),
                ("handle", Node::from(a.handle)),
                ("level", Node::from(a.level)),
            ])
        });
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("has_been_bound", Node::from(self.has_been_bound)),
            ("attachments", Node::array_from(attachments)),
            (
                "draw_buffers",
                Node::array_from(self.draw_buffers.iter().map(|&b| enums::to_node(b))),
            ),
            ("read_buffer", enums::to_node(self.read_buffer)),
            ("status", self.status.map_or(Node::Null, enums::to_node)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = FramebufferState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<FramebufferState>(other) {
            Some(other) if self.valid => {
                self.has_been_bound == other.has_been_bound
                    && self.attachments == other.attachments
                    && self.draw_buffers == other.draw_buffers
                    && self.read_buffer == other.read_buffer
            }
            _ => false,
        }
    }

    fn references(&self) -> Vec<(Namespace, GLuint)> {
        self.attachments
            .iter()
            .map(|a| (a.namespace(), a.handle))
            .collect()
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Framebuffers, self.handle)?;
        for attachment in &mut self.attachments {
            attachment.handle = remapper.remap(attachment.namespace(), attachment.handle)?;
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
fn test_attachment_documents() {
    use crate::blob::MemoryBlobs;

    let node = document::from_json(
        r#"{ "handle": 5, "has_been_bound": true, "status": "GL_FRAMEBUFFER_COMPLETE",
             "attachments": [
                 { "point": "GL_COLOR_ATTACHMENT0", "type": "GL_TEXTURE", "handle": 3, "level": 0 },
                 { "point": "GL_DEPTH_ATTACHMENT", "type": "GL_RENDERBUFFER", "handle": 3, "level": 0 }
             ],
             "draw_buffers": ["GL_COLOR_ATTACHMENT0"], "read_buffer": "GL_COLOR_ATTACHMENT0" }"#,
    )
    .unwrap();
    let mut record = FramebufferState::default();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert_eq!(
        record.references(),
        vec![(Namespace::Textures, 3), (Namespace::RenderBuffers, 3)]
    );
    assert_eq!(record.status(), Some(gl::FRAMEBUFFER_COMPLETE));

    let mut other = record.clone();
    other.status = Some(gl::FRAMEBUFFER_UNSUPPORTED);
    assert!(record.compare_restorable_state(&other));

    let bad = document::from_json(
        r#"{ "handle": 5, "has_been_bound": true,
             "attachments": [{ "point": "GL_TEXTURE_2D", "type": "GL_TEXTURE", "handle": 3, "level": 0 }],
             "draw_buffers": [], "read_buffer": "GL_NONE" }"#,
    )
    .unwrap();
    assert!(matches!(
        record.deserialize(&bad, &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::Unrecognized { .. }))
    ));
}
