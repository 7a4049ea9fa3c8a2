//! Sampler objects.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};
use log::warn;

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::error::{RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::sampling::{SamplerParams, SamplingParams};
use super::{check_fields, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("params"),
    Field::restorable("border_color"),
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplerState {
    handle: GLuint,
    params: SamplingParams,
    border_color: [f32; 4],
    valid: bool,
}

impl SamplerState {
    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    pub fn border_color(&self) -> [f32; 4] {
        self.border_color
    }

    fn capture(gl: &dyn EntryPoints, info: &ContextInfo, handle: GLuint) -> Result<SamplerState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("sampler handle 0".to_string()));
        }
        let params = SamplingParams::capture(gl, info, &SamplerParams { gl, sampler: handle })?;
        let border_color = gl.get_sampler_parameter_fv(handle, gl::TEXTURE_BORDER_COLOR);
        entry::check(gl, "glGetSamplerParameterfv")?;
        Ok(SamplerState {
            handle,
            params,
            border_color,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<SamplerState, StateError> {
        check_fields(node, FIELDS)?;
        Ok(SamplerState {
            handle: handle_field(node)?,
            params: SamplingParams::from_node(node.field("params")?)?,
            border_color: node.vec4_field("border_color")?,
            valid: true,
        })
    }
}

impl ObjectState for SamplerState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Sampler
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
        *self = SamplerState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = SamplerState::capture(gl, info, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();
        let info = txn.info();

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.gen_samplers(1).first().cloned().unwrap_or(0);
                txn.check("glGenSamplers")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenSamplers returned no name".to_string()));
                }
                txn.created(Namespace::Samplers, self.handle, handle, gl::NONE)?;
                handle
            }
        };

        // A sampler with one odd parameter is still far more useful than no
        // sampler at all, so rejected parameters are only warned about.
        let recorded = self.handle;
        let access = SamplerParams { gl, sampler: handle };
        let dropped = self.params.apply(gl, info, &access, &mut |name, e| {
            warn!("sampler {}: {} not restored: {}", recorded, name, e);
            Ok(())
        })?;
        if let Some(message) = dropped {
            txn.downgrade(Some(Namespace::Samplers), self.handle, message);
        }

        gl.sampler_parameter_fv(handle, gl::TEXTURE_BORDER_COLOR, &self.border_color);
        if let Err(e) = txn.check("glSamplerParameterfv") {
            warn!("sampler {}: border_color not restored: {}", recorded, e);
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
            ("params", self.params.to_node()),
            ("border_color", Node::from(self.border_color)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = SamplerState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<SamplerState>(other) {
            Some(other) if self.valid => {
                self.params == other.params && self.border_color == other.border_color
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Samplers, self.handle)?;
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
fn test_border_color_arity() {
    use crate::blob::MemoryBlobs;
    use crate::document;
    use crate::error::DocumentError;

    let params = r#"{ "min_filter": "GL_LINEAR", "mag_filter": "GL_LINEAR",
                      "wrap_s": "GL_REPEAT", "wrap_t": "GL_REPEAT", "wrap_r": "GL_REPEAT",
                      "compare_mode": "GL_NONE", "compare_func": "GL_LEQUAL",
                      "min_lod": -1000.0, "max_lod": 1000.0 }"#;
    let good = format!(r#"{{ "handle": 7, "params": {}, "border_color": [0, 0, 0, 1] }}"#, params);
    let bad = format!(r#"{{ "handle": 7, "params": {}, "border_color": [0, 0, 0, 1, 1] }}"#, params);

    let mut record = SamplerState::default();
    record
        .deserialize(&document::from_json(&good).unwrap(), &MemoryBlobs::new())
        .unwrap();
    assert_eq!(record.border_color(), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(record.params().anisotropy, None);
    assert_eq!(record.params().get(gl::TEXTURE_WRAP_S), Some(gl::REPEAT));

    assert!(matches!(
        record.deserialize(&document::from_json(&bad).unwrap(), &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::Arity { expected: 4, found: 5, .. }))
    ));
    assert!(!record.is_valid());
}
