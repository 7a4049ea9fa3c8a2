//! Program objects.
//!
//! A program refers to its attached shaders by handle, so programs must be
//! restored after shaders. The attribute locations the linker settled on are
//! recorded and bound explicitly before relinking, so that vertex arrays
//! restored against the program still line up. Relinking resets uniforms
//! and uniform block bindings, so those are recorded too and set again once
//! the program has linked.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};
use log::warn;

use crate::blob::BlobStore;
use crate::caps::{ContextInfo, Limit};
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums::{self, PROGRAM_SEPARABLE};
use crate::error::{DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::uniform::{self, BlockBinding, Uniform};
use super::{check_fields, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("attached_shaders"),
    Field::restorable("attrib_bindings"),
    Field::restorable("link_status"),
    Field::restorable("separable").optional(),
    Field::restorable("uniforms").optional(),
    Field::restorable("uniform_block_bindings").optional(),
    Field::diagnostic("info_log"),
    Field::diagnostic("marked_for_deletion"),
];

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttribBinding {
    pub name: String,
    pub location: GLuint,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramState {
    handle: GLuint,
    /// Recorded handles in the `shaders` namespace.
    attached_shaders: Vec<GLuint>,
    /// Sorted by name.
    attrib_bindings: Vec<AttribBinding>,
    link_status: bool,
    separable: bool,
    /// Sorted by name.
    uniforms: Vec<Uniform>,
    /// Sorted by name.
    uniform_block_bindings: Vec<BlockBinding>,
    info_log: Option<String>,
    marked_for_deletion: Option<bool>,
    valid: bool,
}

impl ProgramState {
    pub fn attached_shaders(&self) -> &[GLuint] {
        &self.attached_shaders
    }

    pub fn attrib_bindings(&self) -> &[AttribBinding] {
        &self.attrib_bindings
    }

    pub fn link_status(&self) -> bool {
        self.link_status
    }

    pub fn separable(&self) -> bool {
        self.separable
    }

    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    pub fn uniform_block_bindings(&self) -> &[BlockBinding] {
        &self.uniform_block_bindings
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint) -> Result<ProgramState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("program handle 0".to_string()));
        }

        let link_status = gl.get_program_iv(handle, gl::LINK_STATUS) != 0;
        entry::check(gl, "glGetProgramiv")?;
        let mut attached_shaders = gl.get_attached_shaders(handle);
        entry::check(gl, "glGetAttachedShaders")?;
        attached_shaders.sort_unstable();
        // Contexts without separate shader objects don't know the parameter.
        let separable = gl.get_program_iv(handle, PROGRAM_SEPARABLE) != 0;
        let separable = entry::check(gl, "glGetProgramiv").is_ok() && separable;

        let mut attrib_bindings = vec![];
        let mut uniforms = vec![];
        let mut uniform_block_bindings = vec![];
        if link_status {
            let count = gl.get_program_iv(handle, gl::ACTIVE_ATTRIBUTES);
            entry::check(gl, "glGetProgramiv")?;
            for index in 0..count.max(0) as GLuint {
                let (_size, _type, name) = gl.get_active_attrib(handle, index);
                entry::check(gl, "glGetActiveAttrib")?;
                // Built-in inputs have no location to bind.
                if name.starts_with("gl_") {
                    continue;
                }
                let location = gl.get_attrib_location(handle, &name);
                entry::check(gl, "glGetAttribLocation")?;
                if location >= 0 {
                    attrib_bindings.push(AttribBinding {
                        name,
                        location: location as GLuint,
                    });
                }
            }
            attrib_bindings.sort();
            uniforms = uniform::capture_uniforms(gl, handle)?;
            uniform_block_bindings = uniform::capture_block_bindings(gl, handle)?;
        }

        let info_log = gl.get_program_info_log(handle);
        let info_log = entry::check(gl, "glGetProgramInfoLog").ok().map(|()| info_log);
        let deleted = gl.get_program_iv(handle, gl::DELETE_STATUS) != 0;
        let marked_for_deletion = entry::check(gl, "glGetProgramiv").ok().map(|()| deleted);

        Ok(ProgramState {
            handle,
            attached_shaders,
            attrib_bindings,
            link_status,
            separable,
            uniforms,
            uniform_block_bindings,
            info_log,
            marked_for_deletion,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<ProgramState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;

        let mut attached_shaders = vec![];
        for shader in node.array_field("attached_shaders")? {
            match shader.as_i64() {
                Some(h) if h > 0 && h <= i64::from(GLuint::max_value()) => {
                    attached_shaders.push(h as GLuint)
                }
                _ => {
                    return Err(DocumentError::WrongType {
                        field: "attached_shaders".to_string(),
                        expected: "array of nonzero handles",
                    }
                    .into())
                }
            }
        }
        attached_shaders.sort_unstable();

        let mut attrib_bindings = vec![];
        for binding in node.array_field("attrib_bindings")? {
            attrib_bindings.push(AttribBinding {
                name: binding.str_field("name")?.to_string(),
                location: binding.u32_field("location")?,
            });
        }
        attrib_bindings.sort();

        let separable = match node.get("separable") {
            Some(_) => node.bool_field("separable")?,
            None => false,
        };
        let mut uniforms = vec![];
        if node.get("uniforms").is_some() {
            for item in node.array_field("uniforms")? {
                uniforms.push(Uniform::from_node(item)?);
            }
        }
        uniforms.sort_by(|a, b| a.name.cmp(&b.name));
        let mut uniform_block_bindings = vec![];
        if node.get("uniform_block_bindings").is_some() {
            for item in node.array_field("uniform_block_bindings")? {
                uniform_block_bindings.push(BlockBinding::from_node(item)?);
            }
        }
        uniform_block_bindings.sort();

        let info_log = match node.get("info_log") {
            Some(_) => Some(node.str_field("info_log")?.to_string()),
            None => None,
        };
        let marked_for_deletion = match node.get("marked_for_deletion") {
            Some(_) => Some(node.bool_field("marked_for_deletion")?),
            None => None,
        };

        Ok(ProgramState {
            handle,
            attached_shaders,
            attrib_bindings,
            link_status: node.bool_field("link_status")?,
            separable,
            uniforms,
            uniform_block_bindings,
            info_log,
            marked_for_deletion,
            valid: true,
        })
    }
}

impl ProgramState {
    /// Set the recorded uniform values and block bindings on the freshly
    /// linked `handle`. Uniforms the new program lacks, or has with another
    /// type, are downgrades.
    fn restore_uniforms(&self, txn: &mut Transaction, handle: GLuint) -> Result<(), StateError> {
        let gl = txn.gl();
        let active = uniform::active_uniforms(gl, handle)?;

        for recorded in &self.uniforms {
            let (value, layout) = match (&recorded.value, uniform::layout(recorded.type_)) {
                (Some(value), Some(layout)) => (value, layout),
                _ => continue,
            };
            let live = match active.iter().find(|a| a.name == recorded.name) {
                Some(live) if live.type_ == recorded.type_ => live,
                Some(live) => {
                    txn.downgrade(
                        Some(Namespace::Programs),
                        self.handle,
                        format!(
                            "uniform '{}' was {}, restored program has {}",
                            recorded.name,
                            enums::describe(recorded.type_),
                            enums::describe(live.type_)
                        ),
                    );
                    continue;
                }
                None => {
                    txn.downgrade(
                        Some(Namespace::Programs),
                        self.handle,
                        format!("uniform '{}' is not active in the restored program", recorded.name),
                    );
                    continue;
                }
            };
            if live.size < recorded.size {
                txn.downgrade(
                    Some(Namespace::Programs),
                    self.handle,
                    format!(
                        "uniform '{}' had {} elements, restored program has {}",
                        recorded.name, recorded.size, live.size
                    ),
                );
            }
            let elements = live.size.min(recorded.size) as usize;
            uniform::write_value(gl, handle, live.location, layout, elements, value)?;
        }

        for block in &self.uniform_block_bindings {
            let index = gl.get_uniform_block_index(handle, &block.name);
            txn.check("glGetUniformBlockIndex")?;
            if index == gl::INVALID_INDEX {
                txn.downgrade(
                    Some(Namespace::Programs),
                    self.handle,
                    format!("uniform block '{}' is not active in the restored program", block.name),
                );
                continue;
            }
            gl.uniform_block_binding(handle, index, block.binding);
            txn.check("glUniformBlockBinding")?;
        }
        Ok(())
    }
}

impl ObjectState for ProgramState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Program
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
        *self = ProgramState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = ProgramState::capture(gl, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();

        // Resolve every shader before creating anything, so a missing one
        // leaves nothing to roll back.
        let shaders = self
            .attached_shaders
            .iter()
            .map(|&shader| txn.remap(Namespace::Shaders, shader))
            .collect::<Result<Vec<_>, _>>()?;

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.create_program();
                txn.check("glCreateProgram")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glCreateProgram returned no name".to_string()));
                }
                txn.created(Namespace::Programs, self.handle, handle, gl::NONE)?;
                handle
            }
        };

        for &shader in &shaders {
            gl.attach_shader(handle, shader);
            txn.check("glAttachShader")?;
        }

        let max_attribs = txn.info().limit(Limit::MaxVertexAttribs);
        for binding in &self.attrib_bindings {
            if max_attribs > 0 && binding.location >= max_attribs {
                txn.downgrade(
                    Some(Namespace::Programs),
                    self.handle,
                    format!(
                        "attribute '{}' was at location {}, context has {} vertex attributes",
                        binding.name, binding.location, max_attribs
                    ),
                );
                continue;
            }
            gl.bind_attrib_location(handle, binding.location, &binding.name);
            txn.check("glBindAttribLocation")?;
        }

        if self.separable {
            gl.program_parameter_i(handle, PROGRAM_SEPARABLE, 1);
            txn.check("glProgramParameteri")?;
        }

        if self.link_status {
            gl.link_program(handle);
            txn.check("glLinkProgram")?;
            if gl.get_program_iv(handle, gl::LINK_STATUS) == 0 {
                warn!(
                    "program {} linked when captured but not when restored: {}",
                    self.handle,
                    gl.get_program_info_log(handle)
                );
                entry::clear_errors(gl);
            } else {
                self.restore_uniforms(&mut txn, handle)?;
            }
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let bindings = self.attrib_bindings.iter().map(|b| {
            Node::object_from(vec![
                ("name", Node::from(b.name.as_str())),
                ("location", Node::from(b.location)),
            ])
        });
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("attached_shaders", Node::array_from(self.attached_shaders.iter().cloned())),
            ("attrib_bindings", Node::array_from(bindings)),
            ("link_status", Node::from(self.link_status)),
            ("separable", Node::from(self.separable)),
            ("uniforms", Node::array_from(self.uniforms.iter().map(Uniform::to_node))),
            (
                "uniform_block_bindings",
                Node::array_from(self.uniform_block_bindings.iter().map(BlockBinding::to_node)),
            ),
            ("info_log", Node::from(self.info_log.clone())),
            ("marked_for_deletion", Node::from(self.marked_for_deletion)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = ProgramState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<ProgramState>(other) {
            Some(other) if self.valid => {
                self.attached_shaders == other.attached_shaders
                    && self.attrib_bindings == other.attrib_bindings
                    && self.link_status == other.link_status
                    && self.separable == other.separable
                    && self.uniforms == other.uniforms
                    && self.uniform_block_bindings == other.uniform_block_bindings
            }
            _ => false,
        }
    }

    fn references(&self) -> Vec<(Namespace, GLuint)> {
        self.attached_shaders
            .iter()
            .map(|&shader| (Namespace::Shaders, shader))
            .collect()
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Programs, self.handle)?;
        for shader in &mut self.attached_shaders {
            *shader = remapper.remap(Namespace::Shaders, *shader)?;
        }
        self.attached_shaders.sort_unstable();
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
fn test_remap_attached_shaders() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let node = document::from_json(
        r#"{ "handle": 9, "attached_shaders": [3, 2], "link_status": true,
             "attrib_bindings": [{ "name": "b", "location": 1 }, { "name": "a", "location": 0 }] }"#,
    )
    .unwrap();
    let mut record = ProgramState::default();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert_eq!(record.attrib_bindings()[0].name, "a");
    assert_eq!(
        record.references(),
        vec![(Namespace::Shaders, 2), (Namespace::Shaders, 3)]
    );

    let mut remapper = HandleRemapper::new();
    remapper.declare(Namespace::Programs, 9, 90, gl::NONE).unwrap();
    remapper.declare(Namespace::Shaders, 2, 21, gl::VERTEX_SHADER).unwrap();
    assert_eq!(
        record.clone().remap_handles(&remapper),
        Err(RemapError::NotDeclared { namespace: Namespace::Shaders, handle: 3 })
    );
    remapper.declare(Namespace::Shaders, 3, 20, gl::FRAGMENT_SHADER).unwrap();
    record.remap_handles(&remapper).unwrap();
    assert_eq!(record.recorded_handle(), 90);
    assert_eq!(record.attached_shaders(), &[20, 21]);
}

#[test]
fn test_uniforms_are_set_after_linking() {
    use crate::fake::FakeGl;
    use crate::report::{EventKind, PassReport};
    use uniform::UniformValue;

    let info = ContextInfo::new().with_limit(Limit::MaxVertexAttribs, 4);
    let compiled = |gl: &FakeGl, source: &str| {
        let shader = gl.create_shader(gl::VERTEX_SHADER);
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        shader
    };

    let source = FakeGl::new(&info);
    let vs = compiled(&source, "uniform vec2 offset;\nuniform int count;\nuniform Globals {\nvoid main() {}\n");
    let program = source.create_program();
    source.program_parameter_i(program, PROGRAM_SEPARABLE, 1);
    source.attach_shader(program, vs);
    source.link_program(program);
    source.program_uniform_fv(program, source.get_uniform_location(program, "offset"), 2, &[1.5, -2.0]);
    source.program_uniform_iv(program, source.get_uniform_location(program, "count"), 1, &[4]);
    source.uniform_block_binding(program, 0, 2);
    assert_eq!(source.get_error(), gl::NO_ERROR);

    let mut record = ProgramState::default();
    record.snapshot(&source, &info, program, gl::NONE).unwrap();
    assert!(record.separable());
    assert_eq!(record.uniforms().len(), 2);
    assert_eq!(record.uniforms()[0].value, Some(UniformValue::Int(vec![4])));
    assert_eq!(record.uniforms()[1].value, Some(UniformValue::Float(vec![1.5, -2.0])));
    assert_eq!(
        record.uniform_block_bindings(),
        &[BlockBinding { name: "Globals".to_string(), binding: 2 }]
    );

    // Restore against a shader with the same handle, so the records compare
    // without remapping.
    let restore_with = |vs_source: &str| {
        let target = FakeGl::new(&info);
        let shader = compiled(&target, vs_source);
        assert_eq!(shader, vs);
        let mut remapper = HandleRemapper::new();
        remapper.declare(Namespace::Shaders, vs, shader, gl::VERTEX_SHADER).unwrap();
        let mut report = PassReport::new();
        let mut ctx = RestoreContext {
            gl: &target,
            info: &info,
            remapper: &mut remapper,
            report: &mut report,
        };
        let handle = record.restore(&mut ctx, None).unwrap();
        let mut restored = ProgramState::default();
        restored.snapshot(&target, &info, handle, gl::NONE).unwrap();
        (restored, report)
    };

    let (restored, report) = restore_with("uniform vec2 offset;\nuniform int count;\nuniform Globals {\n");
    assert!(report.is_clean(), "{}", report);
    assert!(record.compare_restorable_state(&restored));

    let (restored, report) = restore_with("uniform vec2 offset;\nuniform Globals {\n");
    let downgrades: Vec<_> = report.of_kind(EventKind::Downgraded).collect();
    assert_eq!(downgrades.len(), 1);
    assert!(downgrades[0].message.contains("'count'"));
    assert_eq!(restored.uniforms()[0].value, Some(UniformValue::Float(vec![1.5, -2.0])));
    assert!(!record.compare_restorable_state(&restored));
}
