//! What a context can do.
//!
//! A `ContextInfo` is captured alongside every snapshot, and supplied again
//! for the context a snapshot is restored into. Snapshot code uses it to bound
//! its iteration (only read as many vertex attribute slots as exist); restore
//! code compares it against what the snapshot needed and reports any shortfall
//! as a downgrade rather than failing.

use std::collections::{BTreeMap, BTreeSet};

use gleam::gl::{self, GLuint};

use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::error::{DocumentError, GlError};

/// A numeric limit that affects how much state there is to capture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Limit {
    MaxVertexAttribs,
    MaxTextureSize,
    MaxDrawBuffers,
    MaxColorAttachments,
}

impl Limit {
    pub const ALL: [Limit; 4] = [
        Limit::MaxVertexAttribs,
        Limit::MaxTextureSize,
        Limit::MaxDrawBuffers,
        Limit::MaxColorAttachments,
    ];

    /// The `glGetIntegerv` parameter that reports this limit.
    pub fn pname(self) -> gl::GLenum {
        match self {
            Limit::MaxVertexAttribs => gl::MAX_VERTEX_ATTRIBS,
            Limit::MaxTextureSize => gl::MAX_TEXTURE_SIZE,
            Limit::MaxDrawBuffers => gl::MAX_DRAW_BUFFERS,
            Limit::MaxColorAttachments => gl::MAX_COLOR_ATTACHMENTS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Limit::MaxVertexAttribs => "max_vertex_attribs",
            Limit::MaxTextureSize => "max_texture_size",
            Limit::MaxDrawBuffers => "max_draw_buffers",
            Limit::MaxColorAttachments => "max_color_attachments",
        }
    }
}

/// Limits and extensions of one context. Never changes once built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextInfo {
    limits: BTreeMap<Limit, u32>,
    extensions: BTreeSet<String>,
}

impl ContextInfo {
    pub fn new() -> ContextInfo {
        ContextInfo::default()
    }

    pub fn with_limit(mut self, limit: Limit, value: u32) -> ContextInfo {
        self.limits.insert(limit, value);
        self
    }

    pub fn with_extension(mut self, name: &str) -> ContextInfo {
        self.extensions.insert(name.to_string());
        self
    }

    /// Ask a live context for its limits and extensions.
    pub fn query(gl: &dyn EntryPoints) -> Result<ContextInfo, GlError> {
        let mut info = ContextInfo::new();
        for &limit in Limit::ALL.iter() {
            let value = gl.get_integer_v(limit.pname());
            entry::check(gl, "glGetIntegerv")?;
            info.limits.insert(limit, value.max(0) as u32);
        }

        let count = gl.get_integer_v(gl::NUM_EXTENSIONS);
        entry::check(gl, "glGetIntegerv")?;
        for i in 0..count.max(0) as GLuint {
            let name = gl.get_string_i(gl::EXTENSIONS, i);
            entry::check(gl, "glGetStringi")?;
            info.extensions.insert(name);
        }
        Ok(info)
    }

    /// The value of `limit`, or zero if it was never established.
    pub fn limit(&self, limit: Limit) -> u32 {
        self.limits.get(&limit).cloned().unwrap_or(0)
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn to_node(&self) -> Node {
        let limits = self
            .limits
            .iter()
            .map(|(limit, &value)| (limit.name().to_string(), Node::from(value)))
            .collect();
        Node::object_from(vec![
            ("limits", Node::Object(limits)),
            ("extensions", Node::array_from(self.extensions.iter().cloned())),
        ])
    }

    /// Unknown limit names are skipped, so newer documents still load.
    pub fn from_node(node: &Node) -> Result<ContextInfo, DocumentError> {
        let mut info = ContextInfo::new();
        let limits = node.field("limits")?;
        for &limit in Limit::ALL.iter() {
            if limits.get(limit.name()).is_some() {
                info.limits.insert(limit, limits.u32_field(limit.name())?);
            }
        }
        for ext in node.array_field("extensions")? {
            let name = ext.as_str().ok_or_else(|| DocumentError::WrongType {
                field: "extensions".to_string(),
                expected: "array of strings",
            })?;
            info.extensions.insert(name.to_string());
        }
        Ok(info)
    }
}

#[test]
fn test_builder_and_document() {
    let info = ContextInfo::new()
        .with_limit(Limit::MaxVertexAttribs, 16)
        .with_extension("GL_ARB_timer_query");
    assert_eq!(info.limit(Limit::MaxVertexAttribs), 16);
    assert_eq!(info.limit(Limit::MaxTextureSize), 0);
    assert!(info.supports_extension("GL_ARB_timer_query"));
    assert!(!info.supports_extension("GL_EXT_texture_filter_anisotropic"));

    let back = ContextInfo::from_node(&info.to_node()).unwrap();
    assert_eq!(back, info);
}
