//! Sampling parameters, shared by textures and sampler objects.
//!
//! Textures and samplers carry the same filtering, wrapping and comparison
//! parameters, read and written through different entry points. `ParamAccess`
//! hides which, so the capture, restore and document code is written once.

use gleam::gl::{self, GLenum, GLfloat, GLint, GLuint};

use crate::caps::ContextInfo;
use crate::document::Node;
use crate::entry::{self, EntryPoints};
use crate::enums::{self, TEXTURE_MAX_ANISOTROPY_EXT};
use crate::error::{DocumentError, GlError};

pub const ANISOTROPY_EXTENSION: &str = "GL_EXT_texture_filter_anisotropic";

/// Enum-valued parameters, with their document names.
const ENUM_PARAMS: &[(GLenum, &str)] = &[
    (gl::TEXTURE_MIN_FILTER, "min_filter"),
    (gl::TEXTURE_MAG_FILTER, "mag_filter"),
    (gl::TEXTURE_WRAP_S, "wrap_s"),
    (gl::TEXTURE_WRAP_T, "wrap_t"),
    (gl::TEXTURE_WRAP_R, "wrap_r"),
    (gl::TEXTURE_COMPARE_MODE, "compare_mode"),
    (gl::TEXTURE_COMPARE_FUNC, "compare_func"),
];

/// Float-valued parameters, with their document names.
const FLOAT_PARAMS: &[(GLenum, &str)] = &[
    (gl::TEXTURE_MIN_LOD, "min_lod"),
    (gl::TEXTURE_MAX_LOD, "max_lod"),
];

/// Reads and writes parameters on one texture target or sampler object.
pub trait ParamAccess {
    fn get_i(&self, pname: GLenum) -> GLint;
    fn get_f(&self, pname: GLenum) -> GLfloat;
    fn set_i(&self, pname: GLenum, value: GLint);
    fn set_f(&self, pname: GLenum, value: GLfloat);
}

/// Parameters of the texture bound to `target`.
pub struct TexParams<'g> {
    pub gl: &'g dyn EntryPoints,
    pub target: GLenum,
}

impl ParamAccess for TexParams<'_> {
    fn get_i(&self, pname: GLenum) -> GLint {
        self.gl.get_tex_parameter_iv(self.target, pname)
    }
    fn get_f(&self, pname: GLenum) -> GLfloat {
        self.gl.get_tex_parameter_fv(self.target, pname)
    }
    fn set_i(&self, pname: GLenum, value: GLint) {
        self.gl.tex_parameter_i(self.target, pname, value)
    }
    fn set_f(&self, pname: GLenum, value: GLfloat) {
        self.gl.tex_parameter_f(self.target, pname, value)
    }
}

/// Parameters of a sampler object.
pub struct SamplerParams<'g> {
    pub gl: &'g dyn EntryPoints,
    pub sampler: GLuint,
}

impl ParamAccess for SamplerParams<'_> {
    fn get_i(&self, pname: GLenum) -> GLint {
        self.gl.get_sampler_parameter_iv(self.sampler, pname)
    }
    fn get_f(&self, pname: GLenum) -> GLfloat {
        self.gl.get_sampler_parameter_fv(self.sampler, pname)[0]
    }
    fn set_i(&self, pname: GLenum, value: GLint) {
        self.gl.sampler_parameter_i(self.sampler, pname, value)
    }
    fn set_f(&self, pname: GLenum, value: GLfloat) {
        self.gl.sampler_parameter_fv(self.sampler, pname, &[value])
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplingParams {
    enums: Vec<GLenum>,
    floats: Vec<GLfloat>,
    /// Present only if the capturing context had the anisotropy extension.
    pub anisotropy: Option<GLfloat>,
}

impl SamplingParams {
    pub fn get(&self, pname: GLenum) -> Option<GLenum> {
        ENUM_PARAMS
            .iter()
            .position(|&(p, _)| p == pname)
            .and_then(|i| self.enums.get(i).cloned())
    }

    pub fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        access: &dyn ParamAccess,
    ) -> Result<SamplingParams, GlError> {
        let mut params = SamplingParams::default();
        for &(pname, _) in ENUM_PARAMS {
            params.enums.push(access.get_i(pname) as GLenum);
        }
        for &(pname, _) in FLOAT_PARAMS {
            params.floats.push(access.get_f(pname));
        }
        entry::check(gl, "glGetTexParameter")?;

        if info.supports_extension(ANISOTROPY_EXTENSION) {
            params.anisotropy = Some(access.get_f(TEXTURE_MAX_ANISOTROPY_EXT));
            entry::check(gl, "glGetTexParameterfv")?;
        }
        Ok(params)
    }

    /// Apply every parameter, calling `on_error` for each one the context
    /// rejects. Returns a message if anisotropy couldn't be applied because
    /// the context lacks the extension.
    pub fn apply(
        &self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        access: &dyn ParamAccess,
        on_error: &mut dyn FnMut(&'static str, GlError) -> Result<(), GlError>,
    ) -> Result<Option<String>, GlError> {
        for (&(pname, name), &value) in ENUM_PARAMS.iter().zip(&self.enums) {
            access.set_i(pname, value as GLint);
            if let Err(e) = entry::check(gl, "glTexParameteri") {
                on_error(name, e)?;
            }
        }
        for (&(pname, name), &value) in FLOAT_PARAMS.iter().zip(&self.floats) {
            access.set_f(pname, value);
            if let Err(e) = entry::check(gl, "glTexParameterf") {
                on_error(name, e)?;
            }
        }

        match self.anisotropy {
            Some(value) if info.supports_extension(ANISOTROPY_EXTENSION) => {
                access.set_f(TEXTURE_MAX_ANISOTROPY_EXT, value);
                if let Err(e) = entry::check(gl, "glTexParameterf") {
                    on_error("max_anisotropy", e)?;
                }
                Ok(None)
            }
            Some(value) => Ok(Some(format!(
                "anisotropy {} dropped: context lacks {}",
                value, ANISOTROPY_EXTENSION
            ))),
            None => Ok(None),
        }
    }

    /// Render as a document object with one child per parameter.
    pub fn to_node(&self) -> Node {
        let mut fields = vec![];
        for (&(_, name), &value) in ENUM_PARAMS.iter().zip(&self.enums) {
            fields.push((name, enums::to_node(value)));
        }
        for (&(_, name), &value) in FLOAT_PARAMS.iter().zip(&self.floats) {
            fields.push((name, Node::from(value)));
        }
        fields.push(("max_anisotropy", Node::from(self.anisotropy)));
        Node::object_from(fields)
    }

    pub fn from_node(node: &Node) -> Result<SamplingParams, DocumentError> {
        let mut params = SamplingParams::default();
        for &(_, name) in ENUM_PARAMS {
            params.enums.push(node.enum_field(name)?);
        }
        for &(_, name) in FLOAT_PARAMS {
            params.floats.push(node.f32_field(name)?);
        }
        if node.get("max_anisotropy").is_some() {
            params.anisotropy = Some(node.f32_field("max_anisotropy")?);
        }
        Ok(params)
    }
}
