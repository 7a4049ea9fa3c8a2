//! Query objects.
//!
//! What a query has that matters for replay is whether it was ever begun,
//! and on which target: a query that has been through a begin/end pair is a
//! real object with a result, one that was only generated is just a name.
//! Its last result is recorded too, but there is no way to give a new query
//! an arbitrary result, so that is diagnostic only.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};
use log::debug;

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums::{self, ANY_SAMPLES_PASSED_CONSERVATIVE};
use crate::error::{RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("target"),
    Field::restorable("has_been_begun"),
    Field::diagnostic("prev_result"),
];

/// Targets a query can have been begun on. `GL_NONE` means never.
pub const TARGETS: &[GLenum] = &[
    gl::NONE,
    gl::SAMPLES_PASSED,
    gl::ANY_SAMPLES_PASSED,
    ANY_SAMPLES_PASSED_CONSERVATIVE,
    gl::PRIMITIVES_GENERATED,
    gl::TRANSFORM_FEEDBACK_PRIMITIVES_WRITTEN,
    gl::TIME_ELAPSED,
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryState {
    handle: GLuint,
    target: GLenum,
    has_been_begun: bool,
    prev_result: Option<u64>,
    valid: bool,
}

impl QueryState {
    pub fn has_been_begun(&self) -> bool {
        self.has_been_begun
    }

    pub fn prev_result(&self) -> Option<u64> {
        self.prev_result
    }

    /// Replace the last observed result.
    pub fn set_prev_result(&mut self, result: Option<u64>) {
        self.prev_result = result;
    }

    fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<QueryState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("query handle 0".to_string()));
        }
        if !TARGETS.contains(&target) {
            return Err(StateError::Unreadable(format!(
                "query target {} is not a query target",
                enums::describe(target)
            )));
        }

        // Only names that have been through glBeginQuery are query objects.
        let has_been_begun = gl.is_query(handle);
        entry::check(gl, "glIsQuery")?;

        let mut prev_result = None;
        if target != gl::NONE && has_been_begun {
            let result = if info.supports_extension("GL_ARB_timer_query") {
                gl.get_query_object_ui64v(handle, gl::QUERY_RESULT)
            } else {
                u64::from(gl.get_query_object_uiv(handle, gl::QUERY_RESULT))
            };
            match entry::check(gl, "glGetQueryObject") {
                Ok(()) => prev_result = Some(result),
                Err(e) => debug!("query {}: no previous result: {}", handle, e),
            }
        }

        Ok(QueryState {
            handle,
            target,
            has_been_begun,
            prev_result,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<QueryState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let target = node.enum_field("target")?;
        check_recognized("target", target, TARGETS)?;
        let prev_result = match node.get("prev_result") {
            Some(_) => Some(node.i64_field("prev_result")? as u64),
            None => None,
        };
        Ok(QueryState {
            handle,
            target,
            has_been_begun: node.bool_field("has_been_begun")?,
            prev_result,
            valid: true,
        })
    }
}

impl ObjectState for QueryState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Query
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
        *self = QueryState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = QueryState::capture(gl, info, handle, target)?;
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
                let handle = gl.gen_queries(1).first().cloned().unwrap_or(0);
                txn.check("glGenQueries")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenQueries returned no name".to_string()));
                }
                txn.created(Namespace::Queries, self.handle, handle, self.target)?;
                handle
            }
        };

        if self.target != gl::NONE && self.has_been_begun {
            // Only one query per target can be active. Step whatever is
            // active out of the way, and put it back afterwards.
            let active = gl.get_query_iv(self.target, gl::CURRENT_QUERY) as GLuint;
            txn.check("glGetQueryiv")?;
            if active != 0 {
                gl.end_query(self.target);
                txn.check("glEndQuery")?;
                txn.resume_query_on_failure(self.target, active);
            }

            gl.begin_query(self.target, handle);
            txn.check("glBeginQuery")?;
            txn.end_query_on_failure(self.target);
            gl.end_query(self.target);
            txn.check("glEndQuery")?;
            txn.settled();

            if active != 0 {
                gl.begin_query(self.target, active);
                txn.check("glBeginQuery")?;
                txn.settled();
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
            ("target", enums::to_node(self.target)),
            ("has_been_begun", Node::from(self.has_been_begun)),
            ("prev_result", Node::from(self.prev_result)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = QueryState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<QueryState>(other) {
            Some(other) if self.valid => {
                self.target == other.target && self.has_been_begun == other.has_been_begun
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Queries, self.handle)?;
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
fn test_result_is_not_restorable() {
    use crate::blob::MemoryBlobs;
    use crate::document;
    use crate::error::DocumentError;

    let node = document::from_json(
        r#"{ "handle": 4, "target": "GL_SAMPLES_PASSED", "has_been_begun": true, "prev_result": 300 }"#,
    )
    .unwrap();
    let mut record = QueryState::default();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert_eq!(record.prev_result(), Some(300));

    let mut other = record.clone();
    other.set_prev_result(Some(12));
    assert!(record.compare_restorable_state(&other));
    other.set_prev_result(None);
    assert!(record.compare_restorable_state(&other));

    let zero = document::from_json(r#"{ "handle": 0, "target": "GL_SAMPLES_PASSED", "has_been_begun": true }"#)
        .unwrap();
    assert!(matches!(
        record.deserialize(&zero, &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::WrongType { .. }))
    ));
    assert!(!record.is_valid());
}
