//! Program pipeline objects.
//!
//! A pipeline names, for each shader stage, the separable program that runs
//! it, and the active program that plain `glUniform*` calls go to. Programs
//! are referred to by recorded handle, so pipelines are restored after
//! programs. As with vertex arrays, a pipeline name that was never bound is
//! not an object yet and has no stages.

use std::any::Any;

use gleam::gl::{self, GLenum, GLuint};
use log::debug;

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, Binding, EntryPoints};
use crate::enums::{self, ACTIVE_PROGRAM, COMPUTE_SHADER, COMPUTE_SHADER_BIT, FRAGMENT_SHADER_BIT};
use crate::enums::{GEOMETRY_SHADER_BIT, TESS_CONTROL_SHADER, TESS_CONTROL_SHADER_BIT};
use crate::enums::{TESS_EVALUATION_SHADER, TESS_EVALUATION_SHADER_BIT, VERTEX_SHADER_BIT};
use crate::error::{DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("has_been_bound"),
    Field::restorable("stages"),
    Field::restorable("active_program"),
];

/// Each shader stage, with its `glUseProgramStages` bit.
pub const STAGES: &[(GLenum, GLenum)] = &[
    (gl::VERTEX_SHADER, VERTEX_SHADER_BIT),
    (gl::FRAGMENT_SHADER, FRAGMENT_SHADER_BIT),
    (gl::GEOMETRY_SHADER, GEOMETRY_SHADER_BIT),
    (TESS_CONTROL_SHADER, TESS_CONTROL_SHADER_BIT),
    (TESS_EVALUATION_SHADER, TESS_EVALUATION_SHADER_BIT),
    (COMPUTE_SHADER, COMPUTE_SHADER_BIT),
];

/// The program running one shader stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub shader_type: GLenum,
    /// Recorded handle in the `programs` namespace.
    pub program: GLuint,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineState {
    handle: GLuint,
    has_been_bound: bool,
    /// Only stages with a program, in `STAGES` order.
    stages: Vec<Stage>,
    /// Recorded handle in the `programs` namespace, or 0.
    active_program: GLuint,
    valid: bool,
}

fn stage_bit(shader_type: GLenum) -> GLenum {
    STAGES
        .iter()
        .find(|&&(t, _)| t == shader_type)
        .map_or(0, |&(_, bit)| bit)
}

fn stage_order(shader_type: GLenum) -> usize {
    STAGES.iter().position(|&(t, _)| t == shader_type).unwrap_or(STAGES.len())
}

impl PipelineState {
    pub fn has_been_bound(&self) -> bool {
        self.has_been_bound
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn active_program(&self) -> GLuint {
        self.active_program
    }

    fn capture(gl: &dyn EntryPoints, handle: GLuint) -> Result<PipelineState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("pipeline handle 0".to_string()));
        }

        let has_been_bound = gl.is_program_pipeline(handle);
        entry::check(gl, "glIsProgramPipeline")?;

        let mut stages = vec![];
        let mut active_program = 0;
        if has_been_bound {
            for &(shader_type, _) in STAGES {
                let program = gl.get_program_pipeline_iv(handle, shader_type) as GLuint;
                match entry::check(gl, "glGetProgramPipelineiv") {
                    Ok(()) => {}
                    // Vertex and fragment stages always exist; the others
                    // depend on the context.
                    Err(e) if stage_order(shader_type) >= 2 => {
                        debug!("pipeline {}: no {} stage: {}", handle, enums::describe(shader_type), e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
                if program != 0 {
                    stages.push(Stage { shader_type, program });
                }
            }
            active_program = gl.get_program_pipeline_iv(handle, ACTIVE_PROGRAM) as GLuint;
            entry::check(gl, "glGetProgramPipelineiv")?;
        }

        Ok(PipelineState {
            handle,
            has_been_bound,
            stages,
            active_program,
            valid: true,
        })
    }

    fn from_node(node: &Node) -> Result<PipelineState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;

        let types: Vec<GLenum> = STAGES.iter().map(|&(t, _)| t).collect();
        let mut stages = vec![];
        for item in node.array_field("stages")? {
            let shader_type = item.enum_field("stage")?;
            check_recognized("stage", shader_type, &types)?;
            let program = item.u32_field("program")?;
            if program == 0 || stages.iter().any(|s: &Stage| s.shader_type == shader_type) {
                return Err(DocumentError::WrongType {
                    field: "stages".to_string(),
                    expected: "one nonzero program per stage",
                }
                .into());
            }
            stages.push(Stage { shader_type, program });
        }
        stages.sort_by_key(|s| stage_order(s.shader_type));

        Ok(PipelineState {
            handle,
            has_been_bound: node.bool_field("has_been_bound")?,
            stages,
            active_program: node.u32_field("active_program")?,
            valid: true,
        })
    }
}

impl ObjectState for PipelineState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Pipeline
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
        *self = PipelineState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        _info: &ContextInfo,
        handle: GLuint,
        _target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = PipelineState::capture(gl, handle)?;
        Ok(())
    }

    fn restore(&self, ctx: &mut RestoreContext, live: Option<GLuint>) -> Result<GLuint, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }

        let mut txn = Transaction::new(ctx);
        let gl = txn.gl();

        let programs = self
            .stages
            .iter()
            .map(|s| txn.remap(Namespace::Programs, s.program))
            .collect::<Result<Vec<_>, _>>()?;
        let active_program = txn.remap(Namespace::Programs, self.active_program)?;

        let handle = match live {
            Some(handle) if handle != 0 => handle,
            _ => {
                let handle = gl.gen_program_pipelines(1).first().cloned().unwrap_or(0);
                txn.check("glGenProgramPipelines")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenProgramPipelines returned no name".to_string()));
                }
                txn.created(Namespace::Pipelines, self.handle, handle, gl::NONE)?;
                handle
            }
        };

        if !self.has_been_bound {
            txn.commit();
            return Ok(handle);
        }

        txn.bind(Binding::ProgramPipeline, handle)?;
        for (stage, &program) in self.stages.iter().zip(&programs) {
            gl.use_program_stages(handle, stage_bit(stage.shader_type), program);
            txn.check("glUseProgramStages")?;
        }
        if active_program != 0 {
            gl.active_shader_program(handle, active_program);
            txn.check("glActiveShaderProgram")?;
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, _blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let stages = self.stages.iter().map(|s| {
            Node::object_from(vec![
                ("stage", enums::to_node(s.shader_type)),
                ("program", Node::from(s.program)),
            ])
        });
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("has_been_bound", Node::from(self.has_been_bound)),
            ("stages", Node::array_from(stages)),
            ("active_program", Node::from(self.active_program)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, _blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = PipelineState::from_node(node)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<PipelineState>(other) {
            Some(other) if self.valid => {
                self.has_been_bound == other.has_been_bound
                    && self.stages == other.stages
                    && self.active_program == other.active_program
            }
            _ => false,
        }
    }

    fn references(&self) -> Vec<(Namespace, GLuint)> {
        let mut programs: Vec<GLuint> = self
            .stages
            .iter()
            .map(|s| s.program)
            .chain(Some(self.active_program))
            .filter(|&p| p != 0)
            .collect();
        programs.sort_unstable();
        programs.dedup();
        programs.into_iter().map(|p| (Namespace::Programs, p)).collect()
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Pipelines, self.handle)?;
        for stage in &mut self.stages {
            stage.program = remapper.remap(Namespace::Programs, stage.program)?;
        }
        self.active_program = remapper.remap(Namespace::Programs, self.active_program)?;
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
fn test_stages_document() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let node = document::from_json(
        r#"{ "handle": 2, "has_been_bound": true, "active_program": 5,
             "stages": [{ "stage": "GL_FRAGMENT_SHADER", "program": 6 },
                        { "stage": "GL_VERTEX_SHADER", "program": 5 }] }"#,
    )
    .unwrap();
    let mut record = PipelineState::default();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert_eq!(record.stages()[0], Stage { shader_type: gl::VERTEX_SHADER, program: 5 });
    assert_eq!(
        record.references(),
        vec![(Namespace::Programs, 5), (Namespace::Programs, 6)]
    );

    let mut remapper = HandleRemapper::new();
    remapper.declare(Namespace::Pipelines, 2, 20, gl::NONE).unwrap();
    remapper.declare(Namespace::Programs, 5, 50, gl::NONE).unwrap();
    remapper.declare(Namespace::Programs, 6, 60, gl::NONE).unwrap();
    record.remap_handles(&remapper).unwrap();
    assert_eq!(record.recorded_handle(), 20);
    assert_eq!(record.active_program(), 50);
    assert_eq!(record.stages()[1].program, 60);

    let twice = document::from_json(
        r#"{ "handle": 2, "has_been_bound": true, "active_program": 0,
             "stages": [{ "stage": "GL_VERTEX_SHADER", "program": 5 },
                        { "stage": "GL_VERTEX_SHADER", "program": 6 }] }"#,
    )
    .unwrap();
    assert!(record.deserialize(&twice, &MemoryBlobs::new()).is_err());
    assert!(!record.is_valid());

    let not_a_stage = document::from_json(
        r#"{ "handle": 2, "has_been_bound": true, "active_program": 0,
             "stages": [{ "stage": "GL_TEXTURE_2D", "program": 5 }] }"#,
    )
    .unwrap();
    assert!(matches!(
        record.deserialize(&not_a_stage, &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::Unrecognized { .. }))
    ));
}
