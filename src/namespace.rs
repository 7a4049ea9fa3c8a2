//! Handle namespaces.
//!
//! GL hands out object names per kind: buffer 3 and texture 3 are unrelated
//! objects. Everything that stores or translates a handle pairs it with the
//! `Namespace` it belongs to.

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    Buffers,
    Textures,
    RenderBuffers,
    Samplers,
    Queries,
    Shaders,
    Programs,
    Framebuffers,
    VertexArrays,
    Pipelines,
    Syncs,
}

impl Namespace {
    pub const ALL: [Namespace; 11] = [
        Namespace::Buffers,
        Namespace::Textures,
        Namespace::RenderBuffers,
        Namespace::Samplers,
        Namespace::Queries,
        Namespace::Shaders,
        Namespace::Programs,
        Namespace::Framebuffers,
        Namespace::VertexArrays,
        Namespace::Pipelines,
        Namespace::Syncs,
    ];

    /// The name used for this namespace's section in snapshot documents.
    pub fn name(self) -> &'static str {
        match self {
            Namespace::Buffers => "buffers",
            Namespace::Textures => "textures",
            Namespace::RenderBuffers => "render_buffers",
            Namespace::Samplers => "samplers",
            Namespace::Queries => "queries",
            Namespace::Shaders => "shaders",
            Namespace::Programs => "programs",
            Namespace::Framebuffers => "framebuffers",
            Namespace::VertexArrays => "vertex_arrays",
            Namespace::Pipelines => "pipelines",
            Namespace::Syncs => "syncs",
        }
    }

    pub fn from_name(name: &str) -> Option<Namespace> {
        Namespace::ALL.iter().cloned().find(|ns| ns.name() == name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

#[test]
fn test_names_round_trip() {
    for &ns in Namespace::ALL.iter() {
        assert_eq!(Namespace::from_name(ns.name()), Some(ns));
    }
    assert_eq!(Namespace::from_name("lists"), None);
}
