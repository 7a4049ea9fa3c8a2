//! The GL entry points that snapshot and restore code calls.
//!
//! State records never talk to a driver directly: they are handed a
//! `&dyn EntryPoints`, which might be a real context, a recorder wrapping one,
//! or the in-memory [`FakeGl`](crate::fake::FakeGl). The method names and
//! argument types follow `gleam::gl::Gl`, narrowed to the calls this crate
//! needs, with read-backs returning their results by value.
//!
//! GL reports errors out of band, so every call that can fail is followed by a
//! [`check`] that reads the error flag.
//!
//! Sync objects are pointers in GL, not names. Here they are named by
//! integer ids, which the embedder assigns when it tracks `glFenceSync` the
//! way it tracks the other namespaces.

use gleam::gl::{self, GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};
use log::warn;

use crate::enums::{self, PROGRAM_PIPELINE_BINDING};
use crate::error::GlError;
use crate::namespace::Namespace;

pub trait EntryPoints {
    fn get_error(&self) -> GLenum;
    fn get_integer_v(&self, pname: GLenum) -> GLint;
    fn get_string_i(&self, name: GLenum, index: GLuint) -> String;

    fn gen_queries(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_queries(&self, queries: &[GLuint]);
    fn is_query(&self, id: GLuint) -> bool;
    fn begin_query(&self, target: GLenum, id: GLuint);
    fn end_query(&self, target: GLenum);
    fn get_query_iv(&self, target: GLenum, pname: GLenum) -> GLint;
    fn get_query_object_uiv(&self, id: GLuint, pname: GLenum) -> u32;
    fn get_query_object_ui64v(&self, id: GLuint, pname: GLenum) -> u64;

    fn get_vertex_attrib_fv(&self, index: GLuint, pname: GLenum) -> [GLfloat; 4];
    fn get_vertex_attrib_iv(&self, index: GLuint, pname: GLenum) -> GLint;
    fn get_vertex_attrib_pointer_v(&self, index: GLuint, pname: GLenum) -> GLuint;
    fn vertex_attrib_4f(&self, index: GLuint, x: GLfloat, y: GLfloat, z: GLfloat, w: GLfloat);
    fn enable_vertex_attrib_array(&self, index: GLuint);
    fn disable_vertex_attrib_array(&self, index: GLuint);
    fn vertex_attrib_pointer(
        &self,
        index: GLuint,
        size: GLint,
        type_: GLenum,
        normalized: bool,
        stride: GLsizei,
        offset: GLuint,
    );
    fn vertex_attrib_i_pointer(
        &self,
        index: GLuint,
        size: GLint,
        type_: GLenum,
        stride: GLsizei,
        offset: GLuint,
    );
    fn vertex_attrib_divisor(&self, index: GLuint, divisor: GLuint);

    fn gen_buffers(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_buffers(&self, buffers: &[GLuint]);
    fn bind_buffer(&self, target: GLenum, buffer: GLuint);
    fn get_buffer_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint;
    fn get_buffer_sub_data(&self, target: GLenum, offset: usize, size: usize) -> Vec<u8>;
    fn buffer_data(&self, target: GLenum, data: &[u8], usage: GLenum);

    fn gen_textures(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_textures(&self, textures: &[GLuint]);
    fn bind_texture(&self, target: GLenum, texture: GLuint);
    fn get_tex_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint;
    fn get_tex_parameter_fv(&self, target: GLenum, pname: GLenum) -> GLfloat;
    fn tex_parameter_i(&self, target: GLenum, pname: GLenum, param: GLint);
    fn tex_parameter_f(&self, target: GLenum, pname: GLenum, param: GLfloat);
    fn get_tex_level_parameter_iv(&self, target: GLenum, level: GLint, pname: GLenum) -> GLint;
    fn get_tex_image(&self, target: GLenum, level: GLint, format: GLenum, ty: GLenum) -> Vec<u8>;
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: GLenum,
        level: GLint,
        internal_format: GLint,
        width: GLsizei,
        height: GLsizei,
        border: GLint,
        format: GLenum,
        ty: GLenum,
        data: Option<&[u8]>,
    );

    fn gen_renderbuffers(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_renderbuffers(&self, renderbuffers: &[GLuint]);
    fn bind_renderbuffer(&self, target: GLenum, renderbuffer: GLuint);
    fn get_renderbuffer_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint;
    fn renderbuffer_storage_multisample(
        &self,
        target: GLenum,
        samples: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    );

    fn gen_samplers(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_samplers(&self, samplers: &[GLuint]);
    fn get_sampler_parameter_iv(&self, sampler: GLuint, pname: GLenum) -> GLint;
    fn get_sampler_parameter_fv(&self, sampler: GLuint, pname: GLenum) -> [GLfloat; 4];
    fn sampler_parameter_i(&self, sampler: GLuint, pname: GLenum, param: GLint);
    fn sampler_parameter_fv(&self, sampler: GLuint, pname: GLenum, params: &[GLfloat]);

    fn create_shader(&self, shader_type: GLenum) -> GLuint;
    fn delete_shader(&self, shader: GLuint);
    fn get_shader_iv(&self, shader: GLuint, pname: GLenum) -> GLint;
    fn get_shader_source(&self, shader: GLuint) -> String;
    fn get_shader_info_log(&self, shader: GLuint) -> String;
    fn shader_source(&self, shader: GLuint, source: &str);
    fn compile_shader(&self, shader: GLuint);

    fn create_program(&self) -> GLuint;
    fn delete_program(&self, program: GLuint);
    fn get_program_iv(&self, program: GLuint, pname: GLenum) -> GLint;
    fn get_attached_shaders(&self, program: GLuint) -> Vec<GLuint>;
    fn get_program_info_log(&self, program: GLuint) -> String;
    /// Return the size, type and name of an active attribute.
    fn get_active_attrib(&self, program: GLuint, index: GLuint) -> (GLint, GLenum, String);
    fn get_attrib_location(&self, program: GLuint, name: &str) -> GLint;
    fn attach_shader(&self, program: GLuint, shader: GLuint);
    fn bind_attrib_location(&self, program: GLuint, index: GLuint, name: &str);
    fn program_parameter_i(&self, program: GLuint, pname: GLenum, value: GLint);
    fn link_program(&self, program: GLuint);

    /// Return the size, type and name of an active uniform.
    fn get_active_uniform(&self, program: GLuint, index: GLuint) -> (GLint, GLenum, String);
    fn get_uniform_location(&self, program: GLuint, name: &str) -> GLint;
    fn get_uniform_fv(&self, program: GLuint, location: GLint, result: &mut [GLfloat]);
    fn get_uniform_iv(&self, program: GLuint, location: GLint, result: &mut [GLint]);
    fn get_uniform_uiv(&self, program: GLuint, location: GLint, result: &mut [GLuint]);
    /// Set consecutive elements starting at `location`, `components` values
    /// each. The element count is `values.len() / components`.
    fn program_uniform_fv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLfloat]);
    fn program_uniform_iv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLint]);
    fn program_uniform_uiv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLuint]);
    /// Like `program_uniform_fv`, for untransposed `columns` by `rows`
    /// matrices.
    fn program_uniform_matrix_fv(
        &self,
        program: GLuint,
        location: GLint,
        columns: GLint,
        rows: GLint,
        values: &[GLfloat],
    );
    fn get_uniform_block_index(&self, program: GLuint, name: &str) -> GLuint;
    fn get_active_uniform_block_name(&self, program: GLuint, index: GLuint) -> String;
    fn get_active_uniform_block_iv(&self, program: GLuint, index: GLuint, pname: GLenum) -> GLint;
    fn uniform_block_binding(&self, program: GLuint, index: GLuint, binding: GLuint);

    fn gen_program_pipelines(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_program_pipelines(&self, pipelines: &[GLuint]);
    fn bind_program_pipeline(&self, pipeline: GLuint);
    fn is_program_pipeline(&self, pipeline: GLuint) -> bool;
    fn get_program_pipeline_iv(&self, pipeline: GLuint, pname: GLenum) -> GLint;
    fn use_program_stages(&self, pipeline: GLuint, stages: GLbitfield, program: GLuint);
    fn active_shader_program(&self, pipeline: GLuint, program: GLuint);

    fn fence_sync(&self, condition: GLenum, flags: GLbitfield) -> GLuint;
    fn delete_sync(&self, sync: GLuint);
    fn is_sync(&self, sync: GLuint) -> bool;
    fn get_sync_iv(&self, sync: GLuint, pname: GLenum) -> GLint;

    fn gen_framebuffers(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_framebuffers(&self, framebuffers: &[GLuint]);
    fn bind_framebuffer(&self, target: GLenum, framebuffer: GLuint);
    fn is_framebuffer(&self, framebuffer: GLuint) -> bool;
    fn get_framebuffer_attachment_parameter_iv(
        &self,
        target: GLenum,
        attachment: GLenum,
        pname: GLenum,
    ) -> GLint;
    fn framebuffer_texture_2d(
        &self,
        target: GLenum,
        attachment: GLenum,
        textarget: GLenum,
        texture: GLuint,
        level: GLint,
    );
    fn framebuffer_renderbuffer(
        &self,
        target: GLenum,
        attachment: GLenum,
        renderbuffertarget: GLenum,
        renderbuffer: GLuint,
    );
    fn check_framebuffer_status(&self, target: GLenum) -> GLenum;
    fn draw_buffers(&self, bufs: &[GLenum]);
    fn read_buffer(&self, mode: GLenum);

    fn gen_vertex_arrays(&self, n: GLsizei) -> Vec<GLuint>;
    fn delete_vertex_arrays(&self, vertex_arrays: &[GLuint]);
    fn bind_vertex_array(&self, vao: GLuint);
    fn is_vertex_array(&self, vao: GLuint) -> bool;
}

/// Read the error flag, turning anything but `GL_NO_ERROR` into a `GlError`
/// attributed to `call`.
pub fn check(gl: &dyn EntryPoints, call: &'static str) -> Result<(), GlError> {
    match gl.get_error() {
        gl::NO_ERROR => Ok(()),
        code => Err(GlError { call, code }),
    }
}

/// Drain any error flags left set by earlier calls, so they aren't blamed on
/// the next `check`. Returns the first one found.
pub fn clear_errors(gl: &dyn EntryPoints) -> Option<GLenum> {
    let mut first = None;
    // A context has a bounded number of error flags; don't spin on a broken one.
    for _ in 0..16 {
        match gl.get_error() {
            gl::NO_ERROR => break,
            code => {
                first.get_or_insert(code);
            }
        }
    }
    first
}

/// Delete the live object `handle` in `namespace`.
pub fn destroy(gl: &dyn EntryPoints, namespace: Namespace, handle: GLuint) {
    match namespace {
        Namespace::Buffers => gl.delete_buffers(&[handle]),
        Namespace::Textures => gl.delete_textures(&[handle]),
        Namespace::RenderBuffers => gl.delete_renderbuffers(&[handle]),
        Namespace::Samplers => gl.delete_samplers(&[handle]),
        Namespace::Queries => gl.delete_queries(&[handle]),
        Namespace::Shaders => gl.delete_shader(handle),
        Namespace::Programs => gl.delete_program(handle),
        Namespace::Framebuffers => gl.delete_framebuffers(&[handle]),
        Namespace::VertexArrays => gl.delete_vertex_arrays(&[handle]),
        Namespace::Pipelines => gl.delete_program_pipelines(&[handle]),
        Namespace::Syncs => gl.delete_sync(handle),
    }
}

/// A context binding point that snapshot and restore code temporarily
/// changes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Binding {
    Buffer(GLenum),
    Texture2D,
    Renderbuffer,
    Framebuffer,
    VertexArray,
    ProgramPipeline,
}

impl Binding {
    fn binding_pname(self) -> GLenum {
        match self {
            Binding::Buffer(target) => match target {
                gl::ARRAY_BUFFER => gl::ARRAY_BUFFER_BINDING,
                gl::ELEMENT_ARRAY_BUFFER => gl::ELEMENT_ARRAY_BUFFER_BINDING,
                gl::UNIFORM_BUFFER => gl::UNIFORM_BUFFER_BINDING,
                gl::COPY_READ_BUFFER => gl::COPY_READ_BUFFER_BINDING,
                gl::COPY_WRITE_BUFFER => gl::COPY_WRITE_BUFFER_BINDING,
                gl::PIXEL_PACK_BUFFER => gl::PIXEL_PACK_BUFFER_BINDING,
                gl::PIXEL_UNPACK_BUFFER => gl::PIXEL_UNPACK_BUFFER_BINDING,
                gl::TRANSFORM_FEEDBACK_BUFFER => gl::TRANSFORM_FEEDBACK_BUFFER_BINDING,
                _ => gl::NONE,
            },
            Binding::Texture2D => gl::TEXTURE_BINDING_2D,
            Binding::Renderbuffer => gl::RENDERBUFFER_BINDING,
            Binding::Framebuffer => gl::FRAMEBUFFER_BINDING,
            Binding::VertexArray => gl::VERTEX_ARRAY_BINDING,
            Binding::ProgramPipeline => PROGRAM_PIPELINE_BINDING,
        }
    }

    /// The name of the object currently bound here.
    pub fn current(self, gl: &dyn EntryPoints) -> GLuint {
        match self.binding_pname() {
            gl::NONE => 0,
            pname => gl.get_integer_v(pname) as GLuint,
        }
    }

    pub fn bind(self, gl: &dyn EntryPoints, name: GLuint) {
        match self {
            Binding::Buffer(target) => gl.bind_buffer(target, name),
            Binding::Texture2D => gl.bind_texture(gl::TEXTURE_2D, name),
            Binding::Renderbuffer => gl.bind_renderbuffer(gl::RENDERBUFFER, name),
            Binding::Framebuffer => gl.bind_framebuffer(gl::FRAMEBUFFER, name),
            Binding::VertexArray => gl.bind_vertex_array(name),
            Binding::ProgramPipeline => gl.bind_program_pipeline(name),
        }
    }
}

/// Binds an object for the lifetime of the scope, then puts back whatever was
/// bound before.
pub struct BindingScope<'g> {
    gl: &'g dyn EntryPoints,
    binding: Binding,
    previous: GLuint,
}

impl<'g> BindingScope<'g> {
    pub fn bind(
        gl: &'g dyn EntryPoints,
        binding: Binding,
        name: GLuint,
    ) -> Result<BindingScope<'g>, GlError> {
        let previous = binding.current(gl);
        let scope = BindingScope { gl, binding, previous };
        if previous != name {
            binding.bind(gl, name);
            check(gl, "bind")?;
        }
        Ok(scope)
    }
}

impl Drop for BindingScope<'_> {
    fn drop(&mut self) {
        if self.binding.current(self.gl) == self.previous {
            return;
        }
        self.binding.bind(self.gl, self.previous);
        if let Some(code) = clear_errors(self.gl) {
            warn!(
                "could not restore {:?} binding to {}: {}",
                self.binding,
                self.previous,
                enums::describe(code)
            );
        }
    }
}
