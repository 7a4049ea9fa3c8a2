//! Capture and restore the objects of a GL context.
//!
//! A [`ContextSnapshot`] records the state of every object a context holds
//! (buffers, textures, renderbuffers, samplers, queries, shaders, programs,
//! framebuffers and vertex arrays) along with the context's current vertex
//! attributes. A snapshot can be written out as a JSON document, with bulk
//! data like buffer contents and texture images kept in a separate
//! [`BlobStore`](blob::BlobStore), and later restored into a different
//! context, possibly with different capabilities.
//!
//! Restored objects get whatever names the new context hands out. The
//! [`HandleRemapper`] built up during a restore says which live object each
//! recorded handle became, so that references between objects (a
//! framebuffer's attachments, a vertex array's buffers) come out right.
//!
//! All GL access goes through the [`EntryPoints`](entry::EntryPoints) trait,
//! which embedders implement over their driver bindings. [`FakeGl`](fake::FakeGl)
//! implements it in memory, for testing.

pub mod blob;
pub mod caps;
pub mod document;
pub mod entry;
pub mod enums;
pub mod error;
pub mod fake;
pub mod files;
pub mod namespace;
pub mod options;
pub mod remap;
pub mod report;
pub mod snapshot;
pub mod state;
mod write_image;

pub use caps::ContextInfo;
pub use error::PassError;
pub use namespace::Namespace;
pub use options::Options;
pub use remap::HandleRemapper;
pub use report::PassReport;
pub use snapshot::{ContextSnapshot, ObjectInventory};
pub use write_image::write_level;
