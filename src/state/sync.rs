//! Fence sync objects.
//!
//! A fence can't be put into an arbitrary state. Restoring one inserts a new
//! fence into the restored context's command stream, which signals once that
//! context catches up, so the status seen at capture is diagnostic only.
//! Only fences on `GL_SYNC_GPU_COMMANDS_COMPLETE` with no flags exist in GL,
//! and only those are captured.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums;
use crate::error::{DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("condition"),
    Field::restorable("flags"),
    Field::diagnostic("status"),
];

pub const CONDITIONS: &[GLenum] = &[gl::SYNC_GPU_COMMANDS_COMPLETE];

pub const STATUSES: &[GLenum] = &[gl::SIGNALED, gl::UNSIGNALED];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncState {
    handle: GLuint,
    condition: GLenum,
    flags: GLuint,
    status: Option<GLenum>,
    valid: bool,
}

impl SyncState {
    pub fn condition(&self) -> GLenum {
        self.condition
    }

    pub fn status(&self) -> Option<GLenum> {
        self.status
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint) -> Result<SyncState, StateError> {
        if handle == 0 || !gl.is_sync(handle) {
            return Err(StateError::Unreadable(format!("{} is not a sync object", handle)));
        }

        let iv = |pname| gl.get_sync_iv(handle, pname);
        let object_type = iv(gl::OBJECT_TYPE) as GLenum;
        let condition = iv(gl::SYNC_CONDITION) as GLenum;
        let flags = iv(gl::SYNC_FLAGS) as GLuint;
        entry::check(gl, "glGetSynciv")?;
        let status = iv(gl::SYNC_STATUS) as GLenum;
        let status = entry::check(gl, "glGetSynciv").ok().map(|()| status);

        if object_type != gl::SYNC_FENCE {
            return Err(StateError::Unreadable(format!(
                "sync {} has type {}, not a fence",
                handle,
                enums::describe(object_type)
            )));
        }
        if !CONDITIONS.contains(&condition) || flags != 0 {
            return Err(StateError::Unreadable(format!(
                "fence {} has condition {} and flags 0x{:x}",
                handle,
                enums::describe(condition),
                flags
            )));
        }

        Ok(SyncState {
            handle,
            condition,
            flags,
            status,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<SyncState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let condition = node.enum_field("condition")?;
        check_recognized("condition", condition, CONDITIONS)?;
        let flags = node.u32_field("flags")?;
        if flags != 0 {
            return Err(DocumentError::WrongType {
                field: "flags".to_string(),
                expected: "zero",
            }
            .into());
        }
        let status = match node.get("status") {
            Some(status) if !status.is_null() => {
                let status = node.enum_field("status")?;
                check_recognized("status", status, STATUSES)?;
                Some(status)
            }
            _ => None,
        };
        Ok(SyncState {
            handle,
            condition,
            flags,
            status,
            valid: true,
        })
    }
}

impl ObjectState for SyncState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sync
    }

    fn recorded_handle(&self) -> GLuint {
        self.handle
    }

    fn target(&self) -> GLenum {
        gl::NONE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = SyncState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = SyncState::capture(gl, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();

        // An existing fence has nothing left to set.
        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.fence_sync(self.condition, self.flags);
                txn.check("glFenceSync")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glFenceSync returned no sync".to_string()));
                }
                txn.created(Namespace::Syncs, self.handle, handle, gl::NONE)?;
                handle
            }
        };

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("condition", enums::to_node(self.condition)),
            ("flags", Node::from(self.flags)),
            ("status", self.status.map_or(Node::Null, enums::to_node)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = SyncState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<SyncState>(other) {
            Some(other) if self.valid => self.condition == other.condition && self.flags == other.flags,
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Syncs, self.handle)?;
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
fn test_status_is_not_restorable() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let signaled = document::from_json(
        r#"{ "handle": 3, "condition": "GL_SYNC_GPU_COMMANDS_COMPLETE", "flags": 0, "status": "GL_SIGNALED" }"#,
    )
    .unwrap();
    let mut record = SyncState::default();
    record.deserialize(&signaled, &MemoryBlobs::new()).unwrap();
    assert_eq!(record.status(), Some(gl::SIGNALED));

    let mut other = record.clone();
    other.status = Some(gl::UNSIGNALED);
    assert!(record.compare_restorable_state(&other));

    let flagged = document::from_json(r#"{ "handle": 3, "condition": "GL_SYNC_GPU_COMMANDS_COMPLETE", "flags": 1 }"#)
        .unwrap();
    assert!(record.deserialize(&flagged, &MemoryBlobs::new()).is_err());
    assert!(!record.is_valid());
}
