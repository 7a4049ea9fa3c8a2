//! The context's current generic vertex attribute values.
//!
//! These are the values `glVertexAttrib4f` sets, used for any attribute whose
//! array is disabled. They belong to the context rather than to an object, so
//! this record has no handle. There are as many slots as the context's
//! `GL_MAX_VERTEX_ATTRIBS`; restoring into a context with fewer writes what
//! fits and reports the rest as a downgrade.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};

use crate::blob::BlobStore;
use crate::caps::{ContextInfo, Limit};
use crate::document::{self, Node};
use crate::entry::{self, EntryPoints};
use crate::error::{RemapError, StateError};
use crate::remap::HandleRemapper;

use super::{check_fields, float_bits, same_slots, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[Field::restorable("attribs")];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentVertexAttribState {
    attribs: Vec<[f32; 4]>,
    valid: bool,
}

impl CurrentVertexAttribState {
    pub fn attribs(&self) -> &[[f32; 4]] {
        &self.attribs
    }

    fn capture(gl: &dyn EntryPoints, info: &ContextInfo) -> Result<CurrentVertexAttribState, StateError> {
        let count = info.limit(Limit::MaxVertexAttribs);
        let mut attribs = Vec::with_capacity(count as usize);
        for index in 0..count {
            attribs.push(gl.get_vertex_attrib_fv(index, gl::CURRENT_VERTEX_ATTRIB));
            entry::check(gl, "glGetVertexAttribfv")?;
        }
        Ok(CurrentVertexAttribState { attribs, valid: true })
    }

    fn from_node(node: &Node) -> Result<CurrentVertexAttribState, StateError> {
        check_fields(node, FIELDS)?;
        let attribs = node
            .array_field("attribs")?
            .iter()
            .map(|v| document::vec4_value(v, "attribs"))
            .collect::<Result<_, _>>()?;
        Ok(CurrentVertexAttribState { attribs, valid: true })
    }
}

/// Attribute values as bit patterns, so that NaNs equal each other and
/// zeroes keep their sign.
fn slot_bits(attribs: &[[f32; 4]]) -> Vec<[u32; 4]> {
    attribs
        .iter()
        .map(|v| [float_bits(v[0]), float_bits(v[1]), float_bits(v[2]), float_bits(v[3])])
        .collect()
}

impl ObjectState for CurrentVertexAttribState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::CurrentVertexAttribs
    }

    fn recorded_handle(&self) -> GLuint {
        0
    }

    fn target(&self) -> GLenum {
        gl::NONE
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn clear(&mut self) {
        *self = CurrentVertexAttribState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        _handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = CurrentVertexAttribState::capture(gl, info)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, _live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();
        let available = txn.info().limit(Limit::MaxVertexAttribs) as usize;
        let count = self.attribs.len().min(available);

        for (index, v) in self.attribs[..count].iter().enumerate() {
            gl.vertex_attrib_4f(index as GLuint, v[0], v[1], v[2], v[3]);
            txn.check("glVertexAttrib4f")?;
        }

        if count < self.attribs.len() {
            txn.downgrade(
                None,
                0,
                format!(
                    "context has {} vertex attributes, snapshot has {}; restored {}",
                    available,
                    self.attribs.len(),
                    count
                ),
            );
        }

        txn.commit();
        Ok(0)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        Ok(Node::object_from(vec![(
            "attribs",
            Node::array_from(self.attribs.iter().cloned()),
        )]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = CurrentVertexAttribState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<CurrentVertexAttribState>(other) {
            Some(other) if self.valid => same_slots(
                &slot_bits(&self.attribs),
                &slot_bits(&other.attribs),
                &slot_bits(&[[0.0, 0.0, 0.0, 1.0]])[0],
            ),
            _ => false,
        }
    }

    fn remap_handles(&mut self, _remapper: &HandleRemapper) -> Result<(), RemapError> {
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
fn test_wrong_arity_is_corrupt() {
    use crate::blob::MemoryBlobs;
    use crate::error::DocumentError;

    let node = document::from_json(r#"{ "attribs": [[0, 0, 0, 1], [1, 2, 3]] }"#).unwrap();
    let mut record = CurrentVertexAttribState::default();
    let result = record.deserialize(&node, &MemoryBlobs::new());
    assert!(matches!(
        result,
        Err(StateError::Document(DocumentError::Arity { expected: 4, found: 3, .. }))
    ));
    assert!(!record.is_valid());
}

#[test]
fn test_non_finite_values_survive() {
    use crate::blob::MemoryBlobs;

    let record = CurrentVertexAttribState {
        attribs: vec![
            [0.0, 0.0, 0.0, 1.0],
            [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.0],
            [0.5, f32::NAN, 2.0, 1.0],
        ],
        valid: true,
    };
    let mut blobs = MemoryBlobs::new();
    let text = document::to_json(&record.serialize(&mut blobs).unwrap()).unwrap();

    let mut back = CurrentVertexAttribState::default();
    back.deserialize(&document::from_json(&text).unwrap(), &blobs).unwrap();
    assert!(back.attribs()[1][0].is_nan());
    assert_eq!(back.attribs()[1][1], f32::INFINITY);
    assert!(record.compare_restorable_state(&back));
    assert!(back.compare_restorable_state(&record));

    let mut finite = back.clone();
    finite.attribs[1][0] = 0.0;
    assert!(!record.compare_restorable_state(&finite));
    let mut positive = back.clone();
    positive.attribs[1][3] = 0.0;
    assert!(!record.compare_restorable_state(&positive));
}
