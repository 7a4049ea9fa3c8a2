//! Names for the GL enumerants that appear in snapshot documents.
//!
//! Enum-valued fields are written by name, so that a snapshot document can be
//! read by a person and doesn't depend on the numeric values of any particular
//! header. Values that aren't in the table are written as plain numbers, and
//! both forms are accepted when reading.

use gleam::gl::{self, GLenum};

use crate::document::Node;

/// `GL_ANY_SAMPLES_PASSED_CONSERVATIVE`, from GL 4.3 / ES 3.0.
pub const ANY_SAMPLES_PASSED_CONSERVATIVE: GLenum = 0x8D6A;

/// `GL_TEXTURE_MAX_ANISOTROPY_EXT`, from `GL_EXT_texture_filter_anisotropic`.
pub const TEXTURE_MAX_ANISOTROPY_EXT: GLenum = 0x84FE;

/// Shader stages newer than the GL 3.3 / ES 3.0 headers.
pub const COMPUTE_SHADER: GLenum = 0x91B9;
pub const TESS_CONTROL_SHADER: GLenum = 0x8E88;
pub const TESS_EVALUATION_SHADER: GLenum = 0x8E87;

/// Separable programs and program pipelines, from GL 4.1 /
/// `GL_ARB_separate_shader_objects`.
pub const PROGRAM_SEPARABLE: GLenum = 0x8258;
pub const ACTIVE_PROGRAM: GLenum = 0x8259;
pub const PROGRAM_PIPELINE_BINDING: GLenum = 0x825A;
pub const VERTEX_SHADER_BIT: GLenum = 0x0001;
pub const FRAGMENT_SHADER_BIT: GLenum = 0x0002;
pub const GEOMETRY_SHADER_BIT: GLenum = 0x0004;
pub const TESS_CONTROL_SHADER_BIT: GLenum = 0x0008;
pub const TESS_EVALUATION_SHADER_BIT: GLenum = 0x0010;
pub const COMPUTE_SHADER_BIT: GLenum = 0x0020;

macro_rules! gl_enum_names {
    ( $( $name:ident ),* $(,)? ) => {
        static NAMES: &[(GLenum, &str)] = &[
            $( (gl::$name, concat!("GL_", stringify!($name))), )*
            (ANY_SAMPLES_PASSED_CONSERVATIVE, "GL_ANY_SAMPLES_PASSED_CONSERVATIVE"),
            (TEXTURE_MAX_ANISOTROPY_EXT, "GL_TEXTURE_MAX_ANISOTROPY_EXT"),
            (COMPUTE_SHADER, "GL_COMPUTE_SHADER"),
            (TESS_CONTROL_SHADER, "GL_TESS_CONTROL_SHADER"),
            (TESS_EVALUATION_SHADER, "GL_TESS_EVALUATION_SHADER"),
        ];
    }
}

gl_enum_names! {
    NONE,

    // query targets
    SAMPLES_PASSED, ANY_SAMPLES_PASSED, PRIMITIVES_GENERATED,
    TRANSFORM_FEEDBACK_PRIMITIVES_WRITTEN, TIME_ELAPSED,

    // buffer targets and usages
    ARRAY_BUFFER, ELEMENT_ARRAY_BUFFER, UNIFORM_BUFFER, COPY_READ_BUFFER,
    COPY_WRITE_BUFFER, PIXEL_PACK_BUFFER, PIXEL_UNPACK_BUFFER, TEXTURE_BUFFER,
    TRANSFORM_FEEDBACK_BUFFER,
    STREAM_DRAW, STREAM_READ, STREAM_COPY, STATIC_DRAW, STATIC_READ,
    STATIC_COPY, DYNAMIC_DRAW, DYNAMIC_READ, DYNAMIC_COPY,
    READ_ONLY, WRITE_ONLY, READ_WRITE,

    // textures and sampling
    TEXTURE_2D, RENDERBUFFER, NEAREST, LINEAR, NEAREST_MIPMAP_NEAREST,
    LINEAR_MIPMAP_NEAREST, NEAREST_MIPMAP_LINEAR, LINEAR_MIPMAP_LINEAR, REPEAT,
    CLAMP_TO_EDGE, MIRRORED_REPEAT, CLAMP_TO_BORDER, COMPARE_REF_TO_TEXTURE,
    NEVER, LESS, EQUAL, LEQUAL, GREATER, NOTEQUAL, GEQUAL, ALWAYS,

    // formats and types
    RGBA, RGB, RED, RG, DEPTH_COMPONENT, DEPTH_STENCIL, RGBA8, RGB8, R8, RG8,
    SRGB8_ALPHA8, RGBA16F, RGBA32F, DEPTH_COMPONENT16, DEPTH_COMPONENT24,
    DEPTH_COMPONENT32F, DEPTH24_STENCIL8, STENCIL_INDEX8,
    BYTE, UNSIGNED_BYTE, SHORT, UNSIGNED_SHORT, INT, UNSIGNED_INT, FLOAT,
    HALF_FLOAT,

    // shaders
    VERTEX_SHADER, FRAGMENT_SHADER, GEOMETRY_SHADER,

    // uniform types
    BOOL, BOOL_VEC2, BOOL_VEC3, BOOL_VEC4, INT_VEC2, INT_VEC3, INT_VEC4,
    UNSIGNED_INT_VEC2, UNSIGNED_INT_VEC3, UNSIGNED_INT_VEC4,
    FLOAT_VEC2, FLOAT_VEC3, FLOAT_VEC4, FLOAT_MAT2, FLOAT_MAT3, FLOAT_MAT4,
    FLOAT_MAT2x3, FLOAT_MAT2x4, FLOAT_MAT3x2, FLOAT_MAT3x4, FLOAT_MAT4x2,
    FLOAT_MAT4x3, DOUBLE,
    SAMPLER_2D, SAMPLER_3D, SAMPLER_CUBE, SAMPLER_2D_SHADOW, SAMPLER_2D_ARRAY,
    SAMPLER_2D_ARRAY_SHADOW, SAMPLER_CUBE_SHADOW, INT_SAMPLER_2D,
    INT_SAMPLER_3D, INT_SAMPLER_CUBE, INT_SAMPLER_2D_ARRAY,
    UNSIGNED_INT_SAMPLER_2D, UNSIGNED_INT_SAMPLER_3D,
    UNSIGNED_INT_SAMPLER_CUBE, UNSIGNED_INT_SAMPLER_2D_ARRAY,

    // syncs
    SYNC_FENCE, SYNC_GPU_COMMANDS_COMPLETE, SIGNALED, UNSIGNALED,

    // framebuffers
    TEXTURE, COLOR_ATTACHMENT0, COLOR_ATTACHMENT1, COLOR_ATTACHMENT2,
    COLOR_ATTACHMENT3, COLOR_ATTACHMENT4, COLOR_ATTACHMENT5, COLOR_ATTACHMENT6,
    COLOR_ATTACHMENT7, DEPTH_ATTACHMENT, STENCIL_ATTACHMENT,
    DEPTH_STENCIL_ATTACHMENT, BACK, FRONT, FRAMEBUFFER_COMPLETE,
    FRAMEBUFFER_UNDEFINED, FRAMEBUFFER_INCOMPLETE_ATTACHMENT,
    FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT, FRAMEBUFFER_UNSUPPORTED,
    FRAMEBUFFER_INCOMPLETE_MULTISAMPLE,
}

/// Return the `GL_`-prefixed name of `value`, if we know it.
pub fn name(value: GLenum) -> Option<&'static str> {
    NAMES.iter().find(|&&(v, _)| v == value).map(|&(_, n)| n)
}

/// Return the value of the enumerant named `name`.
///
/// The `GL_` prefix is optional.
pub fn value(name: &str) -> Option<GLenum> {
    let name = name.strip_prefix("GL_").unwrap_or(name);
    NAMES
        .iter()
        .find(|&&(_, n)| &n[3..] == name)
        .map(|&(v, _)| v)
}

/// Build a document node for `value`: its name if known, else its number.
pub fn to_node(value: GLenum) -> Node {
    match name(value) {
        Some(n) => Node::from(n),
        None => Node::from(value),
    }
}

/// Render `value` for messages.
pub fn describe(value: GLenum) -> String {
    match name(value) {
        Some(n) => n.to_string(),
        None => format!("0x{:x}", value),
    }
}

#[test]
fn test_names() {
    assert_eq!(name(gl::SAMPLES_PASSED), Some("GL_SAMPLES_PASSED"));
    assert_eq!(value("GL_SAMPLES_PASSED"), Some(gl::SAMPLES_PASSED));
    assert_eq!(value("TIME_ELAPSED"), Some(gl::TIME_ELAPSED));
    assert_eq!(value("GL_NOT_A_THING"), None);
    assert_eq!(to_node(0xdead_beef), Node::from(0xdead_beef_u32));
    assert_eq!(describe(0x1234_5678), "0x12345678");
    assert_eq!(value("GL_FLOAT_MAT2x3"), Some(gl::FLOAT_MAT2x3));
    assert_eq!(
        name(TEXTURE_MAX_ANISOTROPY_EXT),
        Some("GL_TEXTURE_MAX_ANISOTROPY_EXT")
    );
}
