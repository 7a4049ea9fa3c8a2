//! Error types.
//!
//! Each layer has its own error enum; `StateError` is what a single record
//! operation returns, and `PassError` is reserved for conditions that stop a
//! whole snapshot or restore pass.

use std::io;

use gleam::gl::{GLenum, GLuint};
use thiserror::Error;

use crate::blob::BlobId;
use crate::enums;
use crate::namespace::Namespace;

/// A driver call reported an error.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{call} raised {}", enums::describe(*.code))]
pub struct GlError {
    pub call: &'static str,
    pub code: GLenum,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RemapError {
    #[error("{namespace} handle {handle} has not been declared")]
    NotDeclared { namespace: Namespace, handle: GLuint },

    #[error("{namespace} handle {handle} is already declared as {existing}, not {live}")]
    Conflict {
        namespace: Namespace,
        handle: GLuint,
        existing: GLuint,
        live: GLuint,
    },

    #[error("{namespace} handle {handle} could not be restored")]
    Unavailable { namespace: Namespace, handle: GLuint },
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("no blob with id {0}")]
    NotFound(BlobId),

    #[error("blob store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt blob data: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("required field '{0}' is missing")]
    Missing(String),

    #[error("field '{field}' should be a {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' should have {expected} elements, not {found}")]
    Arity {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("field '{field}' names an unknown enum '{value}'")]
    UnknownEnum { field: String, value: String },

    #[error("field '{field}' has unrecognized value {}", enums::describe(*.value))]
    Unrecognized { field: String, value: GLenum },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document format version {0} is newer than this library understands")]
    Version(i64),
}

/// Why one record's snapshot, restore, serialize or deserialize failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("record does not hold a valid snapshot")]
    Invalid,

    #[error("identifying state unreadable: {0}")]
    Unreadable(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Gl(#[from] GlError),

    #[error(transparent)]
    Remap(#[from] RemapError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// A failure that stops a whole pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("restore order violated: {0}")]
    DependencyOrder(RemapError),

    #[error("strict mode: {namespace} handle {handle}: {reason}")]
    Strict {
        namespace: String,
        handle: GLuint,
        reason: String,
    },

    /// A record in a valid snapshot couldn't be written out.
    #[error("{namespace} handle {handle}: {source}")]
    Record {
        namespace: String,
        handle: GLuint,
        source: StateError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),
}
