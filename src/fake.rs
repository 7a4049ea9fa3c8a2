//! An in-memory GL context.
//!
//! `FakeGl` implements [`EntryPoints`] without a driver, keeping just enough
//! state for every object kind this crate captures to be created, configured,
//! read back and deleted. It checks arguments the way a driver would for the
//! cases snapshot and restore code can get wrong (binding unknown names,
//! exceeding limits, beginning a query twice) and records errors with GL's
//! sticky-flag semantics.
//!
//! Shaders are not compiled, but linking does read the sources for `in`
//! attributes and `uniform` declarations, one per line, so programs have
//! active attributes, uniforms and uniform blocks to capture. Fences are
//! always signaled, since nothing runs.
//!
//! For testing rollback, `fail_after` arranges for a state-changing call to
//! fail: it sets `GL_OUT_OF_MEMORY` and has no effect. Reads and deletes never
//! fail this way.

use std::cell::RefCell;
use std::collections::BTreeMap;

use gleam::gl::{self, GLbitfield, GLenum, GLfloat, GLint, GLsizei, GLuint};

use crate::caps::{ContextInfo, Limit};
use crate::enums::{ACTIVE_PROGRAM, COMPUTE_SHADER, PROGRAM_PIPELINE_BINDING, PROGRAM_SEPARABLE};
use crate::enums::{TESS_CONTROL_SHADER, TESS_EVALUATION_SHADER, TEXTURE_MAX_ANISOTROPY_EXT};
use crate::entry::EntryPoints;
use crate::namespace::Namespace;
use crate::snapshot::ObjectInventory;
use crate::state::pipeline::STAGES;
use crate::state::sampling::ANISOTROPY_EXTENSION;
use crate::state::uniform::{layout, Layout, Scalar};
use crate::state::vertex_array::AttribArray;

const TEXTURE_PARAMS: &[(GLenum, GLfloat)] = &[
    (gl::TEXTURE_MIN_FILTER, gl::NEAREST_MIPMAP_LINEAR as GLfloat),
    (gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLfloat),
    (gl::TEXTURE_WRAP_S, gl::REPEAT as GLfloat),
    (gl::TEXTURE_WRAP_T, gl::REPEAT as GLfloat),
    (gl::TEXTURE_WRAP_R, gl::REPEAT as GLfloat),
    (gl::TEXTURE_COMPARE_MODE, gl::NONE as GLfloat),
    (gl::TEXTURE_COMPARE_FUNC, gl::LEQUAL as GLfloat),
    (gl::TEXTURE_MIN_LOD, -1000.0),
    (gl::TEXTURE_MAX_LOD, 1000.0),
    (gl::TEXTURE_BASE_LEVEL, 0.0),
    (gl::TEXTURE_MAX_LEVEL, 1000.0),
    (TEXTURE_MAX_ANISOTROPY_EXT, 1.0),
];

const SHADER_TYPES: &[GLenum] = &[
    gl::VERTEX_SHADER,
    gl::FRAGMENT_SHADER,
    gl::GEOMETRY_SHADER,
    COMPUTE_SHADER,
    TESS_CONTROL_SHADER,
    TESS_EVALUATION_SHADER,
];

const GLSL_TYPES: &[(&str, GLenum)] = &[
    ("float", gl::FLOAT),
    ("vec2", gl::FLOAT_VEC2),
    ("vec3", gl::FLOAT_VEC3),
    ("vec4", gl::FLOAT_VEC4),
    ("mat2", gl::FLOAT_MAT2),
    ("mat3", gl::FLOAT_MAT3),
    ("mat4", gl::FLOAT_MAT4),
    ("mat2x3", gl::FLOAT_MAT2x3),
    ("mat3x2", gl::FLOAT_MAT3x2),
    ("mat4x3", gl::FLOAT_MAT4x3),
    ("int", gl::INT),
    ("ivec2", gl::INT_VEC2),
    ("ivec4", gl::INT_VEC4),
    ("uint", gl::UNSIGNED_INT),
    ("uvec3", gl::UNSIGNED_INT_VEC3),
    ("bool", gl::BOOL),
    ("bvec2", gl::BOOL_VEC2),
    ("double", gl::DOUBLE),
    ("sampler2D", gl::SAMPLER_2D),
    ("sampler2DShadow", gl::SAMPLER_2D_SHADOW),
    ("isampler2D", gl::INT_SAMPLER_2D),
    ("usampler2D", gl::UNSIGNED_INT_SAMPLER_2D),
];

#[derive(Debug, Default)]
struct Query {
    target: GLenum,
    begun: bool,
    result: Option<u64>,
}

#[derive(Debug, Default)]
struct Buffer {
    target: GLenum,
    data: Vec<u8>,
    usage: GLenum,
    mapped: bool,
}

#[derive(Debug)]
struct Level {
    width: GLsizei,
    height: GLsizei,
    internal_format: GLint,
    pixels: Vec<u8>,
}

#[derive(Debug, Default)]
struct Texture {
    target: GLenum,
    params: BTreeMap<GLenum, GLfloat>,
    levels: BTreeMap<GLint, Level>,
}

#[derive(Debug, Default)]
struct Renderbuffer {
    bound: bool,
    width: GLsizei,
    height: GLsizei,
    samples: GLsizei,
    internal_format: GLenum,
}

#[derive(Debug, Default)]
struct Sampler {
    params: BTreeMap<GLenum, GLfloat>,
    border_color: [GLfloat; 4],
}

#[derive(Debug, Default)]
struct Shader {
    shader_type: GLenum,
    source: String,
    compiled: bool,
    info_log: String,
    deleted: bool,
}

/// An active uniform. Each array element takes one location.
#[derive(Debug)]
struct Uniform {
    /// As GL reports it: arrays end in `[0]`.
    name: String,
    type_: GLenum,
    size: GLint,
    location: GLint,
    /// Every element's components, floats as their bits.
    words: Vec<u32>,
}

impl Uniform {
    fn covers(&self, location: GLint) -> bool {
        location >= self.location && location < self.location + self.size
    }
}

#[derive(Debug, Default)]
struct Program {
    attached: Vec<GLuint>,
    bindings: BTreeMap<String, GLuint>,
    separable: bool,
    linked: bool,
    /// Active attributes and their locations, in declaration order.
    attribs: Vec<(String, GLuint)>,
    uniforms: Vec<Uniform>,
    /// Uniform block names and their binding points.
    blocks: Vec<(String, GLuint)>,
    info_log: String,
}

impl Program {
    fn uniform_location(&self, name: &str) -> GLint {
        for u in &self.uniforms {
            let stem = u.name.strip_suffix("[0]");
            if u.name == name || stem == Some(name) {
                return u.location;
            }
            let element = stem
                .and_then(|stem| name.strip_prefix(stem))
                .and_then(|rest| rest.strip_prefix('['))
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|index| index.parse::<GLint>().ok());
            match element {
                Some(element) if element >= 0 && element < u.size => return u.location + element,
                _ => {}
            }
        }
        -1
    }
}

#[derive(Debug, Default)]
struct Pipeline {
    bound: bool,
    /// Shader type to program.
    stages: BTreeMap<GLenum, GLuint>,
    active: GLuint,
}

#[derive(Debug)]
struct Framebuffer {
    bound: bool,
    /// Attachment point to (object type, name, level).
    attachments: BTreeMap<GLenum, (GLenum, GLuint, GLint)>,
    draw_buffers: Vec<GLenum>,
    read_buffer: GLenum,
}

#[derive(Debug, Default)]
struct VertexArray {
    bound: bool,
    element_array: GLuint,
    attribs: Vec<AttribArray>,
}

#[derive(Debug, Default)]
struct State {
    limits: BTreeMap<Limit, u32>,
    extensions: Vec<String>,

    next_name: GLuint,
    error: Option<GLenum>,
    calls: usize,
    fail_at: Option<usize>,
    ticks: u64,

    queries: BTreeMap<GLuint, Query>,
    active_queries: BTreeMap<GLenum, GLuint>,
    current_attribs: Vec<[GLfloat; 4]>,

    buffers: BTreeMap<GLuint, Buffer>,
    buffer_bindings: BTreeMap<GLenum, GLuint>,
    textures: BTreeMap<GLuint, Texture>,
    texture_binding: GLuint,
    renderbuffers: BTreeMap<GLuint, Renderbuffer>,
    renderbuffer_binding: GLuint,
    samplers: BTreeMap<GLuint, Sampler>,
    shaders: BTreeMap<GLuint, Shader>,
    programs: BTreeMap<GLuint, Program>,
    framebuffers: BTreeMap<GLuint, Framebuffer>,
    framebuffer_binding: GLuint,
    /// Includes the default vertex array, 0.
    vertex_arrays: BTreeMap<GLuint, VertexArray>,
    vertex_array_binding: GLuint,
    pipelines: BTreeMap<GLuint, Pipeline>,
    pipeline_binding: GLuint,
    /// Fence conditions.
    syncs: BTreeMap<GLuint, GLenum>,
}

impl State {
    fn raise(&mut self, code: GLenum) {
        self.error.get_or_insert(code);
    }

    /// Count a state-changing call. Returns false if it should fail.
    fn step(&mut self) -> bool {
        self.calls += 1;
        if self.fail_at == Some(self.calls) {
            self.raise(gl::OUT_OF_MEMORY);
            return false;
        }
        true
    }

    fn limit(&self, limit: Limit) -> u32 {
        self.limits.get(&limit).cloned().unwrap_or(0)
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    fn gen(&mut self, n: GLsizei) -> Vec<GLuint> {
        let names: Vec<GLuint> = (0..n.max(0) as GLuint).map(|i| self.next_name + i).collect();
        self.next_name += names.len() as GLuint;
        names
    }

    fn attrib_count(&self) -> usize {
        self.limit(Limit::MaxVertexAttribs) as usize
    }

    fn new_vertex_array(&self) -> VertexArray {
        VertexArray {
            bound: false,
            element_array: 0,
            attribs: vec![AttribArray::default(); self.attrib_count()],
        }
    }

    fn current_vertex_array(&mut self) -> &mut VertexArray {
        let binding = self.vertex_array_binding;
        let fresh = self.new_vertex_array();
        self.vertex_arrays.entry(binding).or_insert(fresh)
    }

    fn bound_buffer(&mut self, target: GLenum) -> Option<&mut Buffer> {
        let name = if target == gl::ELEMENT_ARRAY_BUFFER {
            self.current_vertex_array().element_array
        } else {
            self.buffer_bindings.get(&target).cloned().unwrap_or(0)
        };
        if name == 0 {
            self.raise(gl::INVALID_OPERATION);
            return None;
        }
        self.buffers.get_mut(&name)
    }

    fn bound_texture(&mut self, target: GLenum) -> Option<&mut Texture> {
        if target != gl::TEXTURE_2D {
            self.raise(gl::INVALID_ENUM);
            return None;
        }
        let name = self.texture_binding;
        if name == 0 {
            self.raise(gl::INVALID_OPERATION);
            return None;
        }
        self.textures.get_mut(&name)
    }

    fn bound_renderbuffer(&mut self, target: GLenum) -> Option<&mut Renderbuffer> {
        if target != gl::RENDERBUFFER || self.renderbuffer_binding == 0 {
            self.raise(gl::INVALID_OPERATION);
            return None;
        }
        let name = self.renderbuffer_binding;
        self.renderbuffers.get_mut(&name)
    }

    fn bound_framebuffer(&mut self, target: GLenum) -> Option<&mut Framebuffer> {
        if target != gl::FRAMEBUFFER || self.framebuffer_binding == 0 {
            self.raise(gl::INVALID_OPERATION);
            return None;
        }
        let name = self.framebuffer_binding;
        self.framebuffers.get_mut(&name)
    }

    fn valid_param(&self, pname: GLenum) -> bool {
        TEXTURE_PARAMS.iter().any(|&(p, _)| p == pname)
            && (pname != TEXTURE_MAX_ANISOTROPY_EXT || self.has_extension(ANISOTROPY_EXTENSION))
    }

    fn color_point_ok(&self, point: GLenum) -> bool {
        let colors = self.limit(Limit::MaxColorAttachments).max(1);
        point >= gl::COLOR_ATTACHMENT0 && point < gl::COLOR_ATTACHMENT0 + colors
    }

    fn attachment_point_ok(&self, point: GLenum) -> bool {
        self.color_point_ok(point)
            || point == gl::DEPTH_ATTACHMENT
            || point == gl::STENCIL_ATTACHMENT
            || point == gl::DEPTH_STENCIL_ATTACHMENT
    }

    /// The components of the uniform element at `location` in the linked
    /// `program`, if it holds `scalar` values.
    fn read_uniform(&self, program: GLuint, location: GLint, scalar: Scalar) -> Option<Vec<u32>> {
        let u = self
            .programs
            .get(&program)
            .filter(|p| p.linked)?
            .uniforms
            .iter()
            .find(|u| u.covers(location))?;
        let n = layout(u.type_).filter(|l| l.scalar == scalar)?.components();
        let start = (location - u.location) as usize * n;
        u.words.get(start..start + n).map(<[u32]>::to_vec)
    }

    /// Set consecutive elements starting at `location`, each shaped like
    /// `shape`. Elements past the end of the array are dropped.
    fn write_uniform(&mut self, program: GLuint, location: GLint, shape: Layout, words: &[u32]) {
        if !self.step() || location == -1 {
            return;
        }
        let n = shape.components();
        let written = self
            .programs
            .get_mut(&program)
            .filter(|p| p.linked)
            .and_then(|p| p.uniforms.iter_mut().find(|u| u.covers(location)))
            .and_then(|u| {
                if layout(u.type_) != Some(shape) || n == 0 || words.len() % n != 0 {
                    return None;
                }
                let start = (location - u.location) as usize * n;
                let end = (start + words.len()).min(u.words.len());
                u.words[start..end].copy_from_slice(&words[..end - start]);
                Some(())
            });
        if written.is_none() {
            self.raise(gl::INVALID_OPERATION);
        }
    }

    fn link(&mut self, program: GLuint) {
        let max_attribs = self.limit(Limit::MaxVertexAttribs);
        let prog = match self.programs.get(&program) {
            Some(prog) => prog,
            None => return,
        };
        let shaders: Vec<&Shader> = prog.attached.iter().filter_map(|s| self.shaders.get(s)).collect();

        let mut info_log = String::new();
        if shaders.is_empty() {
            info_log.push_str("no shaders attached\n");
        }
        for shader in shaders.iter().filter(|s| !s.compiled) {
            info_log.push_str(&format!("{} shader not compiled\n", shader.shader_type));
        }

        let mut names = vec![];
        for shader in shaders.iter().filter(|s| s.shader_type == gl::VERTEX_SHADER) {
            names.extend(vertex_inputs(&shader.source));
        }

        // A uniform declared in several stages is one uniform.
        let mut uniforms: Vec<Uniform> = vec![];
        let mut blocks: Vec<(String, GLuint)> = vec![];
        let mut next_location = 0;
        for shader in &shaders {
            let (declared, block_names) = uniform_declarations(&shader.source);
            for (type_, name, size) in declared {
                let name = if size > 1 { format!("{}[0]", name) } else { name };
                if uniforms.iter().any(|u| u.name == name) {
                    continue;
                }
                let components = layout(type_).map_or(0, Layout::components);
                uniforms.push(Uniform {
                    name,
                    type_,
                    size,
                    location: next_location,
                    words: vec![0; size as usize * components],
                });
                next_location += size;
            }
            for name in block_names {
                if !blocks.iter().any(|(b, _)| *b == name) {
                    blocks.push((name, 0));
                }
            }
        }

        // Explicit bindings first, then the lowest free locations.
        let mut attribs: Vec<(String, GLuint)> = vec![];
        let mut taken: Vec<GLuint> = names.iter().filter_map(|n| prog.bindings.get(n).cloned()).collect();
        for name in names {
            let location = match prog.bindings.get(&name) {
                Some(&location) => location,
                None => {
                    let free = (0..).find(|l| !taken.contains(l)).unwrap_or(0);
                    taken.push(free);
                    free
                }
            };
            if location >= max_attribs {
                info_log.push_str(&format!("too many attributes for '{}'\n", name));
            }
            attribs.push((name, location));
        }

        let linked = info_log.is_empty();
        if let Some(prog) = self.programs.get_mut(&program) {
            prog.linked = linked;
            prog.attribs = if linked { attribs } else { vec![] };
            prog.uniforms = if linked { uniforms } else { vec![] };
            prog.blocks = if linked { blocks } else { vec![] };
            prog.info_log = info_log;
        }
    }
}

/// `line` without any leading `layout(...)` qualifier, or `None` if the
/// qualifier isn't closed on this line.
fn strip_layout(line: &str) -> Option<&str> {
    let line = line.trim();
    if !line.starts_with("layout") {
        return Some(line);
    }
    line.find(')').map(|end| line[end + 1..].trim_start())
}

/// The names of the inputs a vertex shader declares, in order.
fn vertex_inputs(source: &str) -> Vec<String> {
    let mut names = vec![];
    for line in source.lines().filter_map(strip_layout) {
        if !(line.starts_with("in ") || line.starts_with("attribute ")) {
            continue;
        }
        if let Some(name) = line
            .trim_end_matches(';')
            .split_whitespace()
            .last()
        {
            names.push(name.to_string());
        }
    }
    names
}

/// The `(type, name, array size)` of each default-block uniform `source`
/// declares, and the names of its uniform blocks, in order.
fn uniform_declarations(source: &str) -> (Vec<(GLenum, String, GLint)>, Vec<String>) {
    let mut uniforms = vec![];
    let mut blocks = vec![];
    for line in source.lines().filter_map(strip_layout) {
        let rest = match line.strip_prefix("uniform ") {
            Some(rest) => rest,
            None => continue,
        };
        let words: Vec<&str> = rest
            .trim_end_matches(';')
            .split_whitespace()
            .filter(|w| !["lowp", "mediump", "highp"].contains(w))
            .collect();
        match *words.as_slice() {
            [block, "{"] => blocks.push(block.to_string()),
            [ty, declarator] => {
                let type_ = match GLSL_TYPES.iter().find(|&&(t, _)| t == ty) {
                    Some(&(_, type_)) => type_,
                    None => continue,
                };
                let (name, size) = match declarator.find('[') {
                    Some(open) => {
                        let size = declarator[open + 1..].trim_end_matches(']').parse::<GLint>().unwrap_or(1);
                        (&declarator[..open], size)
                    }
                    None => (declarator, 1),
                };
                uniforms.push((type_, name.to_string(), size.max(1)));
            }
            _ => {}
        }
    }
    (uniforms, blocks)
}

pub struct FakeGl {
    state: RefCell<State>,
}

impl FakeGl {
    /// Make a context with the limits and extensions `info` describes.
    pub fn new(info: &ContextInfo) -> FakeGl {
        let mut state = State {
            next_name: 1,
            ..State::default()
        };
        for &limit in Limit::ALL.iter() {
            state.limits.insert(limit, info.limit(limit));
        }
        state.extensions = info.extensions().map(str::to_string).collect();
        state.current_attribs = vec![[0.0, 0.0, 0.0, 1.0]; state.attrib_count()];
        let default_vao = state.new_vertex_array();
        state.vertex_arrays.insert(0, default_vao);
        FakeGl {
            state: RefCell::new(state),
        }
    }

    /// Hand out object names starting at `first`, so that two contexts don't
    /// number their objects alike.
    pub fn with_first_name(self, first: GLuint) -> FakeGl {
        self.state.borrow_mut().next_name = first.max(1);
        self
    }

    pub fn context_info(&self) -> ContextInfo {
        let state = self.state.borrow();
        let mut info = ContextInfo::new();
        for (&limit, &value) in &state.limits {
            info = info.with_limit(limit, value);
        }
        for extension in &state.extensions {
            info = info.with_extension(extension);
        }
        info
    }

    /// Make the `n`th state-changing call from now fail. `None` cancels.
    pub fn fail_after(&self, n: Option<usize>) {
        let mut state = self.state.borrow_mut();
        state.fail_at = n.map(|n| state.calls + n);
    }

    /// The number of state-changing calls made so far.
    pub fn calls(&self) -> usize {
        self.state.borrow().calls
    }

    /// Map `buffer`, as if the application were in the middle of writing it.
    pub fn map_buffer(&self, buffer: GLuint, mapped: bool) {
        if let Some(b) = self.state.borrow_mut().buffers.get_mut(&buffer) {
            b.mapped = mapped;
        }
    }

    pub fn query_result(&self, query: GLuint) -> Option<u64> {
        self.state.borrow().queries.get(&query).and_then(|q| q.result)
    }

    /// The query currently active on `target`, or 0.
    pub fn active_query(&self, target: GLenum) -> GLuint {
        self.state.borrow().active_queries.get(&target).cloned().unwrap_or(0)
    }

    /// Every object in `namespace`, whether or not it has been bound yet.
    pub fn live_objects(&self, namespace: Namespace) -> Vec<GLuint> {
        let state = self.state.borrow();
        match namespace {
            Namespace::Buffers => state.buffers.keys().cloned().collect(),
            Namespace::Textures => state.textures.keys().cloned().collect(),
            Namespace::RenderBuffers => state.renderbuffers.keys().cloned().collect(),
            Namespace::Samplers => state.samplers.keys().cloned().collect(),
            Namespace::Queries => state.queries.keys().cloned().collect(),
            Namespace::Shaders => state.shaders.keys().cloned().collect(),
            Namespace::Programs => state.programs.keys().cloned().collect(),
            Namespace::Framebuffers => state.framebuffers.keys().cloned().collect(),
            Namespace::VertexArrays => state.vertex_arrays.keys().cloned().filter(|&n| n != 0).collect(),
            Namespace::Pipelines => state.pipelines.keys().cloned().collect(),
            Namespace::Syncs => state.syncs.keys().cloned().collect(),
        }
    }

    pub fn live_object_count(&self) -> usize {
        Namespace::ALL.iter().map(|&ns| self.live_objects(ns).len()).sum()
    }

    /// List every live object with the target it was first bound to, the way
    /// a layer tracking the application's calls would.
    pub fn inventory(&self) -> ObjectInventory {
        let state = self.state.borrow();
        let mut inventory = ObjectInventory::new();
        for (&name, b) in &state.buffers {
            inventory.track(Namespace::Buffers, name, b.target);
        }
        for (&name, t) in &state.textures {
            inventory.track(Namespace::Textures, name, t.target);
        }
        for (&name, r) in &state.renderbuffers {
            let target = if r.bound { gl::RENDERBUFFER } else { gl::NONE };
            inventory.track(Namespace::RenderBuffers, name, target);
        }
        for &name in state.samplers.keys() {
            inventory.track(Namespace::Samplers, name, gl::NONE);
        }
        for (&name, q) in &state.queries {
            inventory.track(Namespace::Queries, name, q.target);
        }
        for (&name, s) in &state.shaders {
            inventory.track(Namespace::Shaders, name, s.shader_type);
        }
        for &name in state.programs.keys() {
            inventory.track(Namespace::Programs, name, gl::NONE);
        }
        for (&name, f) in &state.framebuffers {
            let target = if f.bound { gl::FRAMEBUFFER } else { gl::NONE };
            inventory.track(Namespace::Framebuffers, name, target);
        }
        for &name in state.vertex_arrays.keys().filter(|&&n| n != 0) {
            inventory.track(Namespace::VertexArrays, name, gl::NONE);
        }
        for &name in state.pipelines.keys() {
            inventory.track(Namespace::Pipelines, name, gl::NONE);
        }
        for &name in state.syncs.keys() {
            inventory.track(Namespace::Syncs, name, gl::NONE);
        }
        inventory
    }
}

impl EntryPoints for FakeGl {
    fn get_error(&self) -> GLenum {
        self.state.borrow_mut().error.take().unwrap_or(gl::NO_ERROR)
    }

    fn get_integer_v(&self, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        for &limit in Limit::ALL.iter() {
            if limit.pname() == pname {
                return s.limit(limit) as GLint;
            }
        }
        let fb = s.framebuffer_binding;
        let value = match pname {
            gl::NUM_EXTENSIONS => s.extensions.len() as GLuint,
            gl::ELEMENT_ARRAY_BUFFER_BINDING => s.current_vertex_array().element_array,
            gl::TEXTURE_BINDING_2D => s.texture_binding,
            gl::RENDERBUFFER_BINDING => s.renderbuffer_binding,
            gl::FRAMEBUFFER_BINDING => fb,
            gl::VERTEX_ARRAY_BINDING => s.vertex_array_binding,
            PROGRAM_PIPELINE_BINDING => s.pipeline_binding,
            gl::READ_BUFFER => match s.framebuffers.get(&fb) {
                Some(f) => f.read_buffer,
                None => gl::BACK,
            },
            _ if pname >= gl::DRAW_BUFFER0 && pname < gl::DRAW_BUFFER0 + 16 => {
                let i = (pname - gl::DRAW_BUFFER0) as usize;
                match s.framebuffers.get(&fb) {
                    Some(f) => f.draw_buffers.get(i).cloned().unwrap_or(gl::NONE),
                    None if i == 0 => gl::BACK,
                    None => gl::NONE,
                }
            }
            _ => {
                let binding = [
                    (gl::ARRAY_BUFFER_BINDING, gl::ARRAY_BUFFER),
                    (gl::UNIFORM_BUFFER_BINDING, gl::UNIFORM_BUFFER),
                    (gl::COPY_READ_BUFFER_BINDING, gl::COPY_READ_BUFFER),
                    (gl::COPY_WRITE_BUFFER_BINDING, gl::COPY_WRITE_BUFFER),
                    (gl::PIXEL_PACK_BUFFER_BINDING, gl::PIXEL_PACK_BUFFER),
                    (gl::PIXEL_UNPACK_BUFFER_BINDING, gl::PIXEL_UNPACK_BUFFER),
                    (gl::TRANSFORM_FEEDBACK_BUFFER_BINDING, gl::TRANSFORM_FEEDBACK_BUFFER),
                ]
                .iter()
                .find(|&&(p, _)| p == pname)
                .map(|&(_, target)| target);
                match binding {
                    Some(target) => s.buffer_bindings.get(&target).cloned().unwrap_or(0),
                    None => {
                        s.raise(gl::INVALID_ENUM);
                        0
                    }
                }
            }
        };
        value as GLint
    }

    fn get_string_i(&self, name: GLenum, index: GLuint) -> String {
        let mut s = self.state.borrow_mut();
        let extension = s.extensions.get(index as usize).cloned();
        match extension {
            Some(e) if name == gl::EXTENSIONS => e,
            _ => {
                s.raise(gl::INVALID_VALUE);
                String::new()
            }
        }
    }

    fn gen_queries(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            s.queries.insert(name, Query::default());
        }
        names
    }

    fn delete_queries(&self, queries: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for query in queries {
            if let Some(q) = s.queries.remove(query) {
                if s.active_queries.get(&q.target) == Some(query) {
                    s.active_queries.remove(&q.target);
                }
            }
        }
    }

    fn is_query(&self, id: GLuint) -> bool {
        self.state.borrow().queries.get(&id).map_or(false, |q| q.begun)
    }

    fn begin_query(&self, target: GLenum, id: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if s.active_queries.contains_key(&target) {
            return s.raise(gl::INVALID_OPERATION);
        }
        let active = s.active_queries.values().any(|&q| q == id);
        match s.queries.get_mut(&id) {
            Some(q) if !active && (q.target == gl::NONE || q.target == target) => {
                q.target = target;
                q.begun = true;
                q.result = None;
            }
            _ => return s.raise(gl::INVALID_OPERATION),
        }
        s.active_queries.insert(target, id);
    }

    fn end_query(&self, target: GLenum) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.active_queries.remove(&target) {
            Some(id) => {
                s.ticks += 1;
                let result = s.ticks * 100;
                if let Some(q) = s.queries.get_mut(&id) {
                    q.result = Some(result);
                }
            }
            None => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn get_query_iv(&self, target: GLenum, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        if pname != gl::CURRENT_QUERY {
            s.raise(gl::INVALID_ENUM);
            return 0;
        }
        s.active_queries.get(&target).cloned().unwrap_or(0) as GLint
    }

    fn get_query_object_uiv(&self, id: GLuint, pname: GLenum) -> u32 {
        self.get_query_object_ui64v(id, pname) as u32
    }

    fn get_query_object_ui64v(&self, id: GLuint, pname: GLenum) -> u64 {
        let mut s = self.state.borrow_mut();
        let result = s.queries.get(&id).and_then(|q| q.result);
        match result {
            Some(result) if pname == gl::QUERY_RESULT => result,
            _ => {
                s.raise(gl::INVALID_OPERATION);
                0
            }
        }
    }

    fn get_vertex_attrib_fv(&self, index: GLuint, pname: GLenum) -> [GLfloat; 4] {
        let mut s = self.state.borrow_mut();
        let current = s.current_attribs.get(index as usize).cloned();
        match current {
            Some(v) if pname == gl::CURRENT_VERTEX_ATTRIB => v,
            _ => {
                s.raise(gl::INVALID_VALUE);
                [0.0; 4]
            }
        }
    }

    fn get_vertex_attrib_iv(&self, index: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let attrib = s.current_vertex_array().attribs.get(index as usize).cloned();
        let attrib = match attrib {
            Some(a) => a,
            None => {
                s.raise(gl::INVALID_VALUE);
                return 0;
            }
        };
        match pname {
            gl::VERTEX_ATTRIB_ARRAY_ENABLED => attrib.enabled as GLint,
            gl::VERTEX_ATTRIB_ARRAY_SIZE => attrib.size,
            gl::VERTEX_ATTRIB_ARRAY_TYPE => attrib.type_ as GLint,
            gl::VERTEX_ATTRIB_ARRAY_NORMALIZED => attrib.normalized as GLint,
            gl::VERTEX_ATTRIB_ARRAY_INTEGER => attrib.integer as GLint,
            gl::VERTEX_ATTRIB_ARRAY_STRIDE => attrib.stride,
            gl::VERTEX_ATTRIB_ARRAY_DIVISOR => attrib.divisor as GLint,
            gl::VERTEX_ATTRIB_ARRAY_BUFFER_BINDING => attrib.array_binding as GLint,
            _ => {
                s.raise(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_vertex_attrib_pointer_v(&self, index: GLuint, pname: GLenum) -> GLuint {
        let mut s = self.state.borrow_mut();
        let offset = s.current_vertex_array().attribs.get(index as usize).map(|a| a.offset);
        match offset {
            Some(offset) if pname == gl::VERTEX_ATTRIB_ARRAY_POINTER => offset,
            _ => {
                s.raise(gl::INVALID_VALUE);
                0
            }
        }
    }

    fn vertex_attrib_4f(&self, index: GLuint, x: GLfloat, y: GLfloat, z: GLfloat, w: GLfloat) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.current_attribs.get_mut(index as usize) {
            Some(v) => *v = [x, y, z, w],
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn enable_vertex_attrib_array(&self, index: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.current_vertex_array().attribs.get_mut(index as usize) {
            Some(a) => a.enabled = true,
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn disable_vertex_attrib_array(&self, index: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.current_vertex_array().attribs.get_mut(index as usize) {
            Some(a) => a.enabled = false,
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn vertex_attrib_pointer(
        &self,
        index: GLuint,
        size: GLint,
        type_: GLenum,
        normalized: bool,
        stride: GLsizei,
        offset: GLuint,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let buffer = s.buffer_bindings.get(&gl::ARRAY_BUFFER).cloned().unwrap_or(0);
        if buffer == 0 && s.vertex_array_binding != 0 {
            return s.raise(gl::INVALID_OPERATION);
        }
        match s.current_vertex_array().attribs.get_mut(index as usize) {
            Some(a) => {
                *a = AttribArray {
                    enabled: a.enabled,
                    size,
                    type_,
                    normalized,
                    integer: false,
                    stride,
                    offset,
                    divisor: a.divisor,
                    array_binding: buffer,
                }
            }
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn vertex_attrib_i_pointer(
        &self,
        index: GLuint,
        size: GLint,
        type_: GLenum,
        stride: GLsizei,
        offset: GLuint,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let buffer = s.buffer_bindings.get(&gl::ARRAY_BUFFER).cloned().unwrap_or(0);
        if buffer == 0 && s.vertex_array_binding != 0 {
            return s.raise(gl::INVALID_OPERATION);
        }
        match s.current_vertex_array().attribs.get_mut(index as usize) {
            Some(a) => {
                *a = AttribArray {
                    enabled: a.enabled,
                    size,
                    type_,
                    normalized: false,
                    integer: true,
                    stride,
                    offset,
                    divisor: a.divisor,
                    array_binding: buffer,
                }
            }
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn vertex_attrib_divisor(&self, index: GLuint, divisor: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.current_vertex_array().attribs.get_mut(index as usize) {
            Some(a) => a.divisor = divisor,
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn gen_buffers(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            s.buffers.insert(
                name,
                Buffer {
                    target: gl::NONE,
                    usage: gl::STATIC_DRAW,
                    ..Buffer::default()
                },
            );
        }
        names
    }

    fn delete_buffers(&self, buffers: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for buffer in buffers {
            if s.buffers.remove(buffer).is_none() {
                continue;
            }
            for bound in s.buffer_bindings.values_mut().filter(|b| *b == buffer) {
                *bound = 0;
            }
            for vao in s.vertex_arrays.values_mut() {
                if vao.element_array == *buffer {
                    vao.element_array = 0;
                }
                for a in vao.attribs.iter_mut().filter(|a| a.array_binding == *buffer) {
                    a.array_binding = 0;
                }
            }
        }
    }

    fn bind_buffer(&self, target: GLenum, buffer: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if buffer != 0 {
            match s.buffers.get_mut(&buffer) {
                Some(b) if b.target == gl::NONE => b.target = target,
                Some(_) => {}
                None => return s.raise(gl::INVALID_OPERATION),
            }
        }
        if target == gl::ELEMENT_ARRAY_BUFFER {
            s.current_vertex_array().element_array = buffer;
        } else {
            s.buffer_bindings.insert(target, buffer);
        }
    }

    fn get_buffer_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let (size, usage, mapped) = match s.bound_buffer(target) {
            Some(b) => (b.data.len() as GLint, b.usage as GLint, b.mapped as GLint),
            None => return 0,
        };
        match pname {
            gl::BUFFER_SIZE => size,
            gl::BUFFER_USAGE => usage,
            gl::BUFFER_MAPPED => mapped,
            gl::BUFFER_ACCESS => gl::READ_WRITE as GLint,
            _ => {
                s.raise(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_buffer_sub_data(&self, target: GLenum, offset: usize, size: usize) -> Vec<u8> {
        let mut s = self.state.borrow_mut();
        let data = match s.bound_buffer(target) {
            Some(b) if !b.mapped => b.data.get(offset..offset + size).map(<[u8]>::to_vec),
            _ => None,
        };
        match data {
            Some(data) => data,
            None => {
                s.raise(gl::INVALID_OPERATION);
                vec![]
            }
        }
    }

    fn buffer_data(&self, target: GLenum, data: &[u8], usage: GLenum) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if let Some(b) = s.bound_buffer(target) {
            b.data = data.to_vec();
            b.usage = usage;
        }
    }

    fn gen_textures(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            let params = TEXTURE_PARAMS.iter().cloned().collect();
            s.textures.insert(
                name,
                Texture {
                    target: gl::NONE,
                    params,
                    levels: BTreeMap::new(),
                },
            );
        }
        names
    }

    fn delete_textures(&self, textures: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for texture in textures {
            if s.textures.remove(texture).is_some() && s.texture_binding == *texture {
                s.texture_binding = 0;
            }
        }
    }

    fn bind_texture(&self, target: GLenum, texture: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if target != gl::TEXTURE_2D {
            return s.raise(gl::INVALID_ENUM);
        }
        if texture != 0 {
            match s.textures.get_mut(&texture) {
                Some(t) if t.target == gl::NONE => t.target = target,
                Some(t) if t.target == target => {}
                _ => return s.raise(gl::INVALID_OPERATION),
            }
        }
        s.texture_binding = texture;
    }

    fn get_tex_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint {
        self.get_tex_parameter_fv(target, pname) as GLint
    }

    fn get_tex_parameter_fv(&self, target: GLenum, pname: GLenum) -> GLfloat {
        let mut s = self.state.borrow_mut();
        if !s.valid_param(pname) {
            s.raise(gl::INVALID_ENUM);
            return 0.0;
        }
        s.bound_texture(target)
            .and_then(|t| t.params.get(&pname).cloned())
            .unwrap_or(0.0)
    }

    fn tex_parameter_i(&self, target: GLenum, pname: GLenum, param: GLint) {
        self.tex_parameter_f(target, pname, param as GLfloat)
    }

    fn tex_parameter_f(&self, target: GLenum, pname: GLenum, param: GLfloat) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if !s.valid_param(pname) {
            return s.raise(gl::INVALID_ENUM);
        }
        if let Some(t) = s.bound_texture(target) {
            t.params.insert(pname, param);
        }
    }

    fn get_tex_level_parameter_iv(&self, target: GLenum, level: GLint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let level = match s.bound_texture(target) {
            Some(t) => t.levels.get(&level).map(|l| (l.width, l.height, l.internal_format)),
            None => return 0,
        };
        let (width, height, internal_format) = level.unwrap_or((0, 0, gl::RGBA as GLint));
        match pname {
            gl::TEXTURE_WIDTH => width,
            gl::TEXTURE_HEIGHT => height,
            gl::TEXTURE_INTERNAL_FORMAT => internal_format,
            _ => {
                s.raise(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn get_tex_image(&self, target: GLenum, level: GLint, format: GLenum, ty: GLenum) -> Vec<u8> {
        let mut s = self.state.borrow_mut();
        if format != gl::RGBA || ty != gl::UNSIGNED_BYTE {
            s.raise(gl::INVALID_ENUM);
            return vec![];
        }
        s.bound_texture(target)
            .and_then(|t| t.levels.get(&level))
            .map(|l| l.pixels.clone())
            .unwrap_or_default()
    }

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
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let max = s.limit(Limit::MaxTextureSize) as GLsizei;
        if level < 0 || width < 0 || height < 0 || border != 0 || (max > 0 && (width > max || height > max)) {
            return s.raise(gl::INVALID_VALUE);
        }
        if format != gl::RGBA || ty != gl::UNSIGNED_BYTE {
            return s.raise(gl::INVALID_ENUM);
        }
        let len = width as usize * height as usize * 4;
        let pixels = match data {
            Some(data) if data.len() == len => data.to_vec(),
            Some(_) => return s.raise(gl::INVALID_OPERATION),
            None => vec![0; len],
        };
        if let Some(t) = s.bound_texture(target) {
            t.levels.insert(
                level,
                Level {
                    width,
                    height,
                    internal_format,
                    pixels,
                },
            );
        }
    }

    fn gen_renderbuffers(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            s.renderbuffers.insert(
                name,
                Renderbuffer {
                    internal_format: gl::RGBA4,
                    ..Renderbuffer::default()
                },
            );
        }
        names
    }

    fn delete_renderbuffers(&self, renderbuffers: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for rb in renderbuffers {
            if s.renderbuffers.remove(rb).is_some() && s.renderbuffer_binding == *rb {
                s.renderbuffer_binding = 0;
            }
        }
    }

    fn bind_renderbuffer(&self, target: GLenum, renderbuffer: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if target != gl::RENDERBUFFER {
            return s.raise(gl::INVALID_ENUM);
        }
        if renderbuffer != 0 {
            match s.renderbuffers.get_mut(&renderbuffer) {
                Some(r) => r.bound = true,
                None => return s.raise(gl::INVALID_OPERATION),
            }
        }
        s.renderbuffer_binding = renderbuffer;
    }

    fn get_renderbuffer_parameter_iv(&self, target: GLenum, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let (width, height, samples, format) = match s.bound_renderbuffer(target) {
            Some(r) => (r.width, r.height, r.samples, r.internal_format),
            None => return 0,
        };
        let (rgba, depth, stencil) = match format {
            gl::RGBA8 => (8, 0, 0),
            gl::DEPTH24_STENCIL8 => (0, 24, 8),
            gl::DEPTH_COMPONENT16 => (0, 16, 0),
            gl::DEPTH_COMPONENT24 => (0, 24, 0),
            _ => (4, 0, 0),
        };
        match pname {
            gl::RENDERBUFFER_WIDTH => width,
            gl::RENDERBUFFER_HEIGHT => height,
            gl::RENDERBUFFER_SAMPLES => samples,
            gl::RENDERBUFFER_INTERNAL_FORMAT => format as GLint,
            gl::RENDERBUFFER_RED_SIZE
            | gl::RENDERBUFFER_GREEN_SIZE
            | gl::RENDERBUFFER_BLUE_SIZE
            | gl::RENDERBUFFER_ALPHA_SIZE => rgba,
            gl::RENDERBUFFER_DEPTH_SIZE => depth,
            gl::RENDERBUFFER_STENCIL_SIZE => stencil,
            _ => {
                s.raise(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn renderbuffer_storage_multisample(
        &self,
        target: GLenum,
        samples: GLsizei,
        internal_format: GLenum,
        width: GLsizei,
        height: GLsizei,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let max = s.limit(Limit::MaxTextureSize) as GLsizei;
        if samples < 0 || width < 0 || height < 0 || (max > 0 && (width > max || height > max)) {
            return s.raise(gl::INVALID_VALUE);
        }
        if let Some(r) = s.bound_renderbuffer(target) {
            r.width = width;
            r.height = height;
            r.samples = samples;
            r.internal_format = internal_format;
        }
    }

    fn gen_samplers(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            let params = TEXTURE_PARAMS
                .iter()
                .filter(|&&(p, _)| p != gl::TEXTURE_BASE_LEVEL && p != gl::TEXTURE_MAX_LEVEL)
                .cloned()
                .collect();
            s.samplers.insert(
                name,
                Sampler {
                    params,
                    border_color: [0.0; 4],
                },
            );
        }
        names
    }

    fn delete_samplers(&self, samplers: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for sampler in samplers {
            s.samplers.remove(sampler);
        }
    }

    fn get_sampler_parameter_iv(&self, sampler: GLuint, pname: GLenum) -> GLint {
        self.get_sampler_parameter_fv(sampler, pname)[0] as GLint
    }

    fn get_sampler_parameter_fv(&self, sampler: GLuint, pname: GLenum) -> [GLfloat; 4] {
        let mut s = self.state.borrow_mut();
        let valid = s.valid_param(pname);
        let value = match s.samplers.get(&sampler) {
            Some(sm) if pname == gl::TEXTURE_BORDER_COLOR => Some(sm.border_color),
            Some(sm) if valid => sm.params.get(&pname).map(|&v| [v, 0.0, 0.0, 0.0]),
            _ => None,
        };
        match value {
            Some(value) => value,
            None => {
                s.raise(gl::INVALID_ENUM);
                [0.0; 4]
            }
        }
    }

    fn sampler_parameter_i(&self, sampler: GLuint, pname: GLenum, param: GLint) {
        self.sampler_parameter_fv(sampler, pname, &[param as GLfloat])
    }

    fn sampler_parameter_fv(&self, sampler: GLuint, pname: GLenum, params: &[GLfloat]) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let valid = s.valid_param(pname);
        match s.samplers.get_mut(&sampler) {
            Some(sm) if pname == gl::TEXTURE_BORDER_COLOR && params.len() == 4 => {
                sm.border_color.copy_from_slice(params);
            }
            Some(sm) if valid && sm.params.contains_key(&pname) && !params.is_empty() => {
                sm.params.insert(pname, params[0]);
            }
            Some(_) => s.raise(gl::INVALID_ENUM),
            None => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn create_shader(&self, shader_type: GLenum) -> GLuint {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return 0;
        }
        if !SHADER_TYPES.contains(&shader_type) {
            s.raise(gl::INVALID_ENUM);
            return 0;
        }
        let name = s.gen(1)[0];
        s.shaders.insert(
            name,
            Shader {
                shader_type,
                ..Shader::default()
            },
        );
        name
    }

    fn delete_shader(&self, shader: GLuint) {
        let mut s = self.state.borrow_mut();
        let attached = s.programs.values().any(|p| p.attached.contains(&shader));
        if attached {
            if let Some(sh) = s.shaders.get_mut(&shader) {
                sh.deleted = true;
            }
        } else {
            s.shaders.remove(&shader);
        }
    }

    fn get_shader_iv(&self, shader: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let value = s.shaders.get(&shader).and_then(|sh| match pname {
            gl::SHADER_TYPE => Some(sh.shader_type as GLint),
            gl::COMPILE_STATUS => Some(sh.compiled as GLint),
            gl::DELETE_STATUS => Some(sh.deleted as GLint),
            gl::SHADER_SOURCE_LENGTH => Some(sh.source.len() as GLint),
            gl::INFO_LOG_LENGTH => Some(sh.info_log.len() as GLint),
            _ => None,
        });
        value.unwrap_or_else(|| {
            s.raise(gl::INVALID_VALUE);
            0
        })
    }

    fn get_shader_source(&self, shader: GLuint) -> String {
        let mut s = self.state.borrow_mut();
        match s.shaders.get(&shader) {
            Some(sh) => sh.source.clone(),
            None => {
                s.raise(gl::INVALID_VALUE);
                String::new()
            }
        }
    }

    fn get_shader_info_log(&self, shader: GLuint) -> String {
        let mut s = self.state.borrow_mut();
        match s.shaders.get(&shader) {
            Some(sh) => sh.info_log.clone(),
            None => {
                s.raise(gl::INVALID_VALUE);
                String::new()
            }
        }
    }

    fn shader_source(&self, shader: GLuint, source: &str) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.shaders.get_mut(&shader) {
            Some(sh) => sh.source = source.to_string(),
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn compile_shader(&self, shader: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.shaders.get_mut(&shader) {
            Some(sh) => {
                // Good enough to give tests a way to write a shader that
                // doesn't compile.
                sh.compiled = !sh.source.contains("#error");
                sh.info_log = if sh.compiled {
                    String::new()
                } else {
                    "0:1: #error directive\n".to_string()
                };
            }
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn create_program(&self) -> GLuint {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return 0;
        }
        let name = s.gen(1)[0];
        s.programs.insert(name, Program::default());
        name
    }

    fn delete_program(&self, program: GLuint) {
        let mut s = self.state.borrow_mut();
        if let Some(prog) = s.programs.remove(&program) {
            // Shaders that were only waiting on this program go now.
            for shader in prog.attached {
                let still_attached = s.programs.values().any(|p| p.attached.contains(&shader));
                let deleted = s.shaders.get(&shader).map_or(false, |sh| sh.deleted);
                if deleted && !still_attached {
                    s.shaders.remove(&shader);
                }
            }
        }
    }

    fn get_program_iv(&self, program: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let value = s.programs.get(&program).and_then(|p| match pname {
            gl::LINK_STATUS => Some(p.linked as GLint),
            gl::ACTIVE_ATTRIBUTES => Some(p.attribs.len() as GLint),
            gl::ACTIVE_UNIFORMS => Some(p.uniforms.len() as GLint),
            gl::ACTIVE_UNIFORM_BLOCKS => Some(p.blocks.len() as GLint),
            PROGRAM_SEPARABLE => Some(p.separable as GLint),
            gl::ATTACHED_SHADERS => Some(p.attached.len() as GLint),
            gl::DELETE_STATUS => Some(0),
            gl::INFO_LOG_LENGTH => Some(p.info_log.len() as GLint),
            _ => None,
        });
        value.unwrap_or_else(|| {
            s.raise(gl::INVALID_VALUE);
            0
        })
    }

    fn get_attached_shaders(&self, program: GLuint) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) => p.attached.clone(),
            None => {
                s.raise(gl::INVALID_VALUE);
                vec![]
            }
        }
    }

    fn get_program_info_log(&self, program: GLuint) -> String {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) => p.info_log.clone(),
            None => {
                s.raise(gl::INVALID_VALUE);
                String::new()
            }
        }
    }

    fn get_active_attrib(&self, program: GLuint, index: GLuint) -> (GLint, GLenum, String) {
        let mut s = self.state.borrow_mut();
        let attrib = s
            .programs
            .get(&program)
            .and_then(|p| p.attribs.get(index as usize))
            .map(|(name, _)| name.clone());
        match attrib {
            Some(name) => (1, gl::FLOAT_VEC4, name),
            None => {
                s.raise(gl::INVALID_VALUE);
                (0, gl::NONE, String::new())
            }
        }
    }

    fn get_attrib_location(&self, program: GLuint, name: &str) -> GLint {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) if p.linked => p
                .attribs
                .iter()
                .find(|(n, _)| n == name)
                .map_or(-1, |&(_, location)| location as GLint),
            _ => {
                s.raise(gl::INVALID_OPERATION);
                -1
            }
        }
    }

    fn attach_shader(&self, program: GLuint, shader: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if !s.shaders.contains_key(&shader) {
            return s.raise(gl::INVALID_VALUE);
        }
        match s.programs.get_mut(&program) {
            Some(p) if !p.attached.contains(&shader) => p.attached.push(shader),
            Some(_) => s.raise(gl::INVALID_OPERATION),
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn bind_attrib_location(&self, program: GLuint, index: GLuint, name: &str) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if index >= s.limit(Limit::MaxVertexAttribs) {
            return s.raise(gl::INVALID_VALUE);
        }
        if name.starts_with("gl_") {
            return s.raise(gl::INVALID_OPERATION);
        }
        match s.programs.get_mut(&program) {
            Some(p) => {
                p.bindings.insert(name.to_string(), index);
            }
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn link_program(&self, program: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if !s.programs.contains_key(&program) {
            return s.raise(gl::INVALID_VALUE);
        }
        s.link(program);
    }

    fn program_parameter_i(&self, program: GLuint, pname: GLenum, value: GLint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if pname != PROGRAM_SEPARABLE {
            return s.raise(gl::INVALID_ENUM);
        }
        match s.programs.get_mut(&program) {
            Some(p) => p.separable = value != 0,
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn get_active_uniform(&self, program: GLuint, index: GLuint) -> (GLint, GLenum, String) {
        let mut s = self.state.borrow_mut();
        let uniform = s
            .programs
            .get(&program)
            .and_then(|p| p.uniforms.get(index as usize))
            .map(|u| (u.size, u.type_, u.name.clone()));
        uniform.unwrap_or_else(|| {
            s.raise(gl::INVALID_VALUE);
            (0, gl::NONE, String::new())
        })
    }

    fn get_uniform_location(&self, program: GLuint, name: &str) -> GLint {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) if p.linked => p.uniform_location(name),
            _ => {
                s.raise(gl::INVALID_OPERATION);
                -1
            }
        }
    }

    fn get_uniform_fv(&self, program: GLuint, location: GLint, result: &mut [GLfloat]) {
        let mut s = self.state.borrow_mut();
        match s.read_uniform(program, location, Scalar::Float) {
            Some(words) => {
                for (r, w) in result.iter_mut().zip(words) {
                    *r = GLfloat::from_bits(w);
                }
            }
            None => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn get_uniform_iv(&self, program: GLuint, location: GLint, result: &mut [GLint]) {
        let mut s = self.state.borrow_mut();
        match s.read_uniform(program, location, Scalar::Int) {
            Some(words) => {
                for (r, w) in result.iter_mut().zip(words) {
                    *r = w as GLint;
                }
            }
            None => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn get_uniform_uiv(&self, program: GLuint, location: GLint, result: &mut [GLuint]) {
        let mut s = self.state.borrow_mut();
        match s.read_uniform(program, location, Scalar::Uint) {
            Some(words) => {
                for (r, w) in result.iter_mut().zip(words) {
                    *r = w;
                }
            }
            None => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn program_uniform_fv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLfloat]) {
        let words: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        let shape = Layout { scalar: Scalar::Float, columns: 1, rows: components };
        self.state.borrow_mut().write_uniform(program, location, shape, &words)
    }

    fn program_uniform_iv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLint]) {
        let words: Vec<u32> = values.iter().map(|&v| v as u32).collect();
        let shape = Layout { scalar: Scalar::Int, columns: 1, rows: components };
        self.state.borrow_mut().write_uniform(program, location, shape, &words)
    }

    fn program_uniform_uiv(&self, program: GLuint, location: GLint, components: GLint, values: &[GLuint]) {
        let shape = Layout { scalar: Scalar::Uint, columns: 1, rows: components };
        self.state.borrow_mut().write_uniform(program, location, shape, values)
    }

    fn program_uniform_matrix_fv(
        &self,
        program: GLuint,
        location: GLint,
        columns: GLint,
        rows: GLint,
        values: &[GLfloat],
    ) {
        let words: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        let shape = Layout { scalar: Scalar::Float, columns, rows };
        self.state.borrow_mut().write_uniform(program, location, shape, &words)
    }

    fn get_uniform_block_index(&self, program: GLuint, name: &str) -> GLuint {
        let mut s = self.state.borrow_mut();
        match s.programs.get(&program) {
            Some(p) => p
                .blocks
                .iter()
                .position(|(b, _)| b == name)
                .map_or(gl::INVALID_INDEX, |i| i as GLuint),
            None => {
                s.raise(gl::INVALID_VALUE);
                gl::INVALID_INDEX
            }
        }
    }

    fn get_active_uniform_block_name(&self, program: GLuint, index: GLuint) -> String {
        let mut s = self.state.borrow_mut();
        let name = s
            .programs
            .get(&program)
            .and_then(|p| p.blocks.get(index as usize))
            .map(|(name, _)| name.clone());
        name.unwrap_or_else(|| {
            s.raise(gl::INVALID_VALUE);
            String::new()
        })
    }

    fn get_active_uniform_block_iv(&self, program: GLuint, index: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let binding = s
            .programs
            .get(&program)
            .and_then(|p| p.blocks.get(index as usize))
            .map(|&(_, binding)| binding);
        match binding {
            Some(binding) if pname == gl::UNIFORM_BLOCK_BINDING => binding as GLint,
            Some(_) => {
                s.raise(gl::INVALID_ENUM);
                0
            }
            None => {
                s.raise(gl::INVALID_VALUE);
                0
            }
        }
    }

    fn uniform_block_binding(&self, program: GLuint, index: GLuint, binding: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.programs.get_mut(&program).and_then(|p| p.blocks.get_mut(index as usize)) {
            Some(block) => block.1 = binding,
            None => s.raise(gl::INVALID_VALUE),
        }
    }

    fn gen_program_pipelines(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            s.pipelines.insert(name, Pipeline::default());
        }
        names
    }

    fn delete_program_pipelines(&self, pipelines: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for pipeline in pipelines {
            if s.pipelines.remove(pipeline).is_some() && s.pipeline_binding == *pipeline {
                s.pipeline_binding = 0;
            }
        }
    }

    fn bind_program_pipeline(&self, pipeline: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if pipeline != 0 {
            match s.pipelines.get_mut(&pipeline) {
                Some(p) => p.bound = true,
                None => return s.raise(gl::INVALID_OPERATION),
            }
        }
        s.pipeline_binding = pipeline;
    }

    fn is_program_pipeline(&self, pipeline: GLuint) -> bool {
        self.state.borrow().pipelines.get(&pipeline).map_or(false, |p| p.bound)
    }

    fn get_program_pipeline_iv(&self, pipeline: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let value = match s.pipelines.get(&pipeline) {
            Some(p) if pname == ACTIVE_PROGRAM => Some(p.active),
            Some(p) if SHADER_TYPES.contains(&pname) => Some(p.stages.get(&pname).cloned().unwrap_or(0)),
            Some(_) => None,
            None => {
                s.raise(gl::INVALID_OPERATION);
                return 0;
            }
        };
        value.map_or_else(
            || {
                s.raise(gl::INVALID_ENUM);
                0
            },
            |v| v as GLint,
        )
    }

    fn use_program_stages(&self, pipeline: GLuint, stages: GLbitfield, program: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let usable = program == 0 || s.programs.get(&program).map_or(false, |p| p.linked && p.separable);
        if !usable || !s.pipelines.contains_key(&pipeline) {
            return s.raise(gl::INVALID_OPERATION);
        }
        if let Some(p) = s.pipelines.get_mut(&pipeline) {
            for &(shader_type, bit) in STAGES.iter().filter(|&&(_, bit)| stages & bit != 0) {
                if program == 0 {
                    p.stages.remove(&shader_type);
                } else {
                    p.stages.insert(shader_type, program);
                }
            }
        }
    }

    fn active_shader_program(&self, pipeline: GLuint, program: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let linked = program == 0 || s.programs.get(&program).map_or(false, |p| p.linked);
        match s.pipelines.get_mut(&pipeline) {
            Some(p) if linked => p.active = program,
            _ => s.raise(gl::INVALID_OPERATION),
        }
    }

    fn fence_sync(&self, condition: GLenum, flags: GLbitfield) -> GLuint {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return 0;
        }
        if condition != gl::SYNC_GPU_COMMANDS_COMPLETE {
            s.raise(gl::INVALID_ENUM);
            return 0;
        }
        if flags != 0 {
            s.raise(gl::INVALID_VALUE);
            return 0;
        }
        let name = s.gen(1)[0];
        s.syncs.insert(name, condition);
        name
    }

    fn delete_sync(&self, sync: GLuint) {
        self.state.borrow_mut().syncs.remove(&sync);
    }

    fn is_sync(&self, sync: GLuint) -> bool {
        self.state.borrow().syncs.contains_key(&sync)
    }

    fn get_sync_iv(&self, sync: GLuint, pname: GLenum) -> GLint {
        let mut s = self.state.borrow_mut();
        let condition = match s.syncs.get(&sync) {
            Some(&condition) => condition,
            None => {
                s.raise(gl::INVALID_VALUE);
                return 0;
            }
        };
        let value = match pname {
            gl::OBJECT_TYPE => gl::SYNC_FENCE,
            gl::SYNC_CONDITION => condition,
            gl::SYNC_FLAGS => 0,
            gl::SYNC_STATUS => gl::SIGNALED,
            _ => {
                s.raise(gl::INVALID_ENUM);
                return 0;
            }
        };
        value as GLint
    }

    fn gen_framebuffers(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            s.framebuffers.insert(
                name,
                Framebuffer {
                    bound: false,
                    attachments: BTreeMap::new(),
                    draw_buffers: vec![gl::COLOR_ATTACHMENT0],
                    read_buffer: gl::COLOR_ATTACHMENT0,
                },
            );
        }
        names
    }

    fn delete_framebuffers(&self, framebuffers: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for fb in framebuffers {
            if s.framebuffers.remove(fb).is_some() && s.framebuffer_binding == *fb {
                s.framebuffer_binding = 0;
            }
        }
    }

    fn bind_framebuffer(&self, target: GLenum, framebuffer: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if target != gl::FRAMEBUFFER {
            return s.raise(gl::INVALID_ENUM);
        }
        if framebuffer != 0 {
            match s.framebuffers.get_mut(&framebuffer) {
                Some(f) => f.bound = true,
                None => return s.raise(gl::INVALID_OPERATION),
            }
        }
        s.framebuffer_binding = framebuffer;
    }

    fn is_framebuffer(&self, framebuffer: GLuint) -> bool {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .map_or(false, |f| f.bound)
    }

    fn get_framebuffer_attachment_parameter_iv(
        &self,
        target: GLenum,
        attachment: GLenum,
        pname: GLenum,
    ) -> GLint {
        let mut s = self.state.borrow_mut();
        if !s.attachment_point_ok(attachment) {
            s.raise(gl::INVALID_ENUM);
            return 0;
        }
        let attached = match s.bound_framebuffer(target) {
            Some(f) => f.attachments.get(&attachment).cloned(),
            None => return 0,
        };
        match (pname, attached) {
            (gl::FRAMEBUFFER_ATTACHMENT_OBJECT_TYPE, None) => gl::NONE as GLint,
            (gl::FRAMEBUFFER_ATTACHMENT_OBJECT_TYPE, Some((ty, _, _))) => ty as GLint,
            (gl::FRAMEBUFFER_ATTACHMENT_OBJECT_NAME, Some((_, name, _))) => name as GLint,
            (gl::FRAMEBUFFER_ATTACHMENT_TEXTURE_LEVEL, Some((gl::TEXTURE, _, level))) => level,
            _ => {
                s.raise(gl::INVALID_ENUM);
                0
            }
        }
    }

    fn framebuffer_texture_2d(
        &self,
        target: GLenum,
        attachment: GLenum,
        textarget: GLenum,
        texture: GLuint,
        level: GLint,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if !s.attachment_point_ok(attachment) || textarget != gl::TEXTURE_2D {
            return s.raise(gl::INVALID_ENUM);
        }
        let ok = texture == 0 || s.textures.get(&texture).map_or(false, |t| t.target == textarget);
        if !ok || level < 0 {
            return s.raise(gl::INVALID_OPERATION);
        }
        if let Some(f) = s.bound_framebuffer(target) {
            if texture == 0 {
                f.attachments.remove(&attachment);
            } else {
                f.attachments.insert(attachment, (gl::TEXTURE, texture, level));
            }
        }
    }

    fn framebuffer_renderbuffer(
        &self,
        target: GLenum,
        attachment: GLenum,
        renderbuffertarget: GLenum,
        renderbuffer: GLuint,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        if !s.attachment_point_ok(attachment) || renderbuffertarget != gl::RENDERBUFFER {
            return s.raise(gl::INVALID_ENUM);
        }
        let ok = renderbuffer == 0 || s.renderbuffers.get(&renderbuffer).map_or(false, |r| r.bound);
        if !ok {
            return s.raise(gl::INVALID_OPERATION);
        }
        if let Some(f) = s.bound_framebuffer(target) {
            if renderbuffer == 0 {
                f.attachments.remove(&attachment);
            } else {
                f.attachments.insert(attachment, (gl::RENDERBUFFER, renderbuffer, 0));
            }
        }
    }

    fn check_framebuffer_status(&self, target: GLenum) -> GLenum {
        let mut s = self.state.borrow_mut();
        if target != gl::FRAMEBUFFER {
            s.raise(gl::INVALID_ENUM);
            return 0;
        }
        let fb = s.framebuffer_binding;
        match s.framebuffers.get(&fb) {
            None => gl::FRAMEBUFFER_COMPLETE,
            Some(f) if f.attachments.is_empty() => gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT,
            Some(_) => gl::FRAMEBUFFER_COMPLETE,
        }
    }

    fn draw_buffers(&self, bufs: &[GLenum]) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let max = s.limit(Limit::MaxDrawBuffers).max(1) as usize;
        if bufs.len() > max {
            return s.raise(gl::INVALID_VALUE);
        }
        let fb = s.framebuffer_binding;
        let ok = bufs.iter().all(|&b| {
            b == gl::NONE || if fb == 0 { b == gl::BACK } else { s.color_point_ok(b) }
        });
        if !ok {
            return s.raise(gl::INVALID_ENUM);
        }
        if let Some(f) = s.framebuffers.get_mut(&fb) {
            f.draw_buffers = bufs.to_vec();
        }
    }

    fn read_buffer(&self, mode: GLenum) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        let fb = s.framebuffer_binding;
        let ok = mode == gl::NONE || if fb == 0 { mode == gl::BACK } else { s.color_point_ok(mode) };
        if !ok {
            return s.raise(gl::INVALID_ENUM);
        }
        if let Some(f) = s.framebuffers.get_mut(&fb) {
            f.read_buffer = mode;
        }
    }

    fn gen_vertex_arrays(&self, n: GLsizei) -> Vec<GLuint> {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return vec![];
        }
        let names = s.gen(n);
        for &name in &names {
            let vao = s.new_vertex_array();
            s.vertex_arrays.insert(name, vao);
        }
        names
    }

    fn delete_vertex_arrays(&self, vertex_arrays: &[GLuint]) {
        let mut s = self.state.borrow_mut();
        for &vao in vertex_arrays.iter().filter(|&&v| v != 0) {
            if s.vertex_arrays.remove(&vao).is_some() && s.vertex_array_binding == vao {
                s.vertex_array_binding = 0;
            }
        }
    }

    fn bind_vertex_array(&self, vao: GLuint) {
        let mut s = self.state.borrow_mut();
        if !s.step() {
            return;
        }
        match s.vertex_arrays.get_mut(&vao) {
            Some(v) => v.bound = true,
            None => return s.raise(gl::INVALID_OPERATION),
        }
        s.vertex_array_binding = vao;
    }

    fn is_vertex_array(&self, vao: GLuint) -> bool {
        vao != 0 && self.state.borrow().vertex_arrays.get(&vao).map_or(false, |v| v.bound)
    }
}

#[cfg(test)]
fn test_info() -> ContextInfo {
    ContextInfo::new()
        .with_limit(Limit::MaxVertexAttribs, 4)
        .with_limit(Limit::MaxTextureSize, 64)
        .with_limit(Limit::MaxDrawBuffers, 2)
        .with_limit(Limit::MaxColorAttachments, 2)
}

#[test]
fn test_sticky_errors_and_injection() {
    let gl = FakeGl::new(&test_info());
    gl.bind_buffer(gl::ARRAY_BUFFER, 99);
    gl.bind_texture(gl::TEXTURE_2D, 98);
    // The first error sticks until read.
    assert_eq!(gl.get_error(), gl::INVALID_OPERATION);
    assert_eq!(gl.get_error(), gl::NO_ERROR);

    gl.fail_after(Some(2));
    let buffers = gl.gen_buffers(1);
    assert_eq!(buffers.len(), 1);
    let textures = gl.gen_textures(1);
    assert!(textures.is_empty());
    assert_eq!(gl.get_error(), gl::OUT_OF_MEMORY);
    assert_eq!(gl.live_object_count(), 1);

    // Deletes are never failed.
    gl.fail_after(Some(1));
    gl.delete_buffers(&buffers);
    assert_eq!(gl.get_error(), gl::NO_ERROR);
    assert_eq!(gl.live_object_count(), 0);
}

#[test]
fn test_link_assigns_locations() {
    let gl = FakeGl::new(&test_info());
    let vs = gl.create_shader(gl::VERTEX_SHADER);
    gl.shader_source(vs, "in vec4 pos;\nlayout(location = 1) in vec2 uv;\nvoid main() {}\n");
    gl.compile_shader(vs);
    let program = gl.create_program();
    gl.attach_shader(program, vs);
    gl.bind_attrib_location(program, 2, "pos");
    gl.link_program(program);
    assert_eq!(gl.get_error(), gl::NO_ERROR);
    assert_eq!(gl.get_program_iv(program, gl::LINK_STATUS), 1);
    assert_eq!(gl.get_attrib_location(program, "pos"), 2);
    assert_eq!(gl.get_attrib_location(program, "uv"), 0);
    assert_eq!(gl.get_attrib_location(program, "normal"), -1);
}

#[test]
fn test_link_declares_uniforms() {
    let gl = FakeGl::new(&test_info());
    let fs = gl.create_shader(gl::FRAGMENT_SHADER);
    gl.shader_source(
        fs,
        "uniform highp vec4 tint;\nuniform float weights[3];\nlayout(std140) uniform Lights {\n  vec4 color;\n};\nvoid main() {}\n",
    );
    gl.compile_shader(fs);
    let program = gl.create_program();
    gl.attach_shader(program, fs);
    gl.link_program(program);
    assert_eq!(gl.get_program_iv(program, gl::ACTIVE_UNIFORMS), 2);
    assert_eq!(gl.get_program_iv(program, gl::ACTIVE_UNIFORM_BLOCKS), 1);
    assert_eq!(gl.get_active_uniform(program, 1), (3, gl::FLOAT, "weights[0]".to_string()));
    assert_eq!(gl.get_uniform_location(program, "weights[2]"), 3);
    assert_eq!(gl.get_uniform_location(program, "weights[3]"), -1);
    assert_eq!(gl.get_uniform_block_index(program, "Lights"), 0);

    // Two elements from the second on; the third is past the end.
    gl.program_uniform_fv(program, 2, 1, &[0.5, 0.25, 9.0]);
    let mut value = [0.0];
    gl.get_uniform_fv(program, 3, &mut value);
    assert_eq!(value, [0.25]);
    gl.program_uniform_iv(program, 0, 4, &[1, 2, 3, 4]);
    assert_eq!(gl.get_error(), gl::INVALID_OPERATION);

    // Relinking resets values.
    gl.link_program(program);
    gl.get_uniform_fv(program, 3, &mut value);
    assert_eq!(value, [0.0]);
    assert_eq!(gl.get_error(), gl::NO_ERROR);
}
