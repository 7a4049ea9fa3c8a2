//! Texture objects.
//!
//! Only `GL_TEXTURE_2D` textures are captured. Each mip level's image is read
//! back as RGBA8 and stored as a blob; restore uploads the levels in the same
//! format with the recorded internal format, then sets the sampling
//! parameters.

use std::any::Any;

use gleam::gl::{self, GLenum, GLint, GLuint};

use crate::blob::{BlobId, BlobStore};
use crate::caps::{ContextInfo, Limit};
use crate::document::Node;
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::enums;
use crate::error::{BlobError, DocumentError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::remap::HandleRemapper;

use super::sampling::{SamplingParams, TexParams};
use super::{check_fields, check_recognized, handle_field, valid_as};
use super::{Field, ObjectKind, ObjectState, RestoreContext, Transaction};

pub static FIELDS: &[Field] = &[
    Field::identity("handle"),
    Field::restorable("target"),
    Field::restorable("base_level").optional(),
    Field::restorable("max_level").optional(),
    Field::restorable("params").optional(),
    Field::restorable("levels"),
];

pub const TARGETS: &[GLenum] = &[gl::NONE, gl::TEXTURE_2D];

/// The most mip levels we will read from one texture.
pub const MAX_LEVELS: GLint = 16;

const BLOB_PREFIX: &str = "tex";

/// One mip level's image, as RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    pub level: GLint,
    pub width: GLint,
    pub height: GLint,
    pub internal_format: GLenum,
    pub pixels: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureState {
    handle: GLuint,
    target: GLenum,
    base_level: GLint,
    max_level: GLint,
    params: Option<SamplingParams>,
    levels: Vec<Level>,
    valid: bool,
}

impl Default for TextureState {
    fn default() -> TextureState {
        TextureState {
            handle: 0,
            target: gl::NONE,
            base_level: 0,
            max_level: 1000,
            params: None,
            levels: vec![],
            valid: false,
        }
    }
}

impl TextureState {
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn params(&self) -> Option<&SamplingParams> {
        self.params.as_ref()
    }

    fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<TextureState, StateError> {
        if handle == 0 {
            return Err(StateError::Unreadable("texture handle 0".to_string()));
        }
        if !TARGETS.contains(&target) {
            return Err(StateError::Unreadable(format!(
                "{} is not a supported texture target",
                enums::describe(target)
            )));
        }

        let mut state = TextureState {
            handle,
            target,
            valid: true,
            ..TextureState::default()
        };
        if target == gl::NONE {
            return Ok(state);
        }

        let _scope = BindingScope::bind(gl, Binding::Texture2D, handle)?;
        state.base_level = gl.get_tex_parameter_iv(target, gl::TEXTURE_BASE_LEVEL);
        state.max_level = gl.get_tex_parameter_iv(target, gl::TEXTURE_MAX_LEVEL);
        entry::check(gl, "glGetTexParameteriv")?;
        state.params = Some(SamplingParams::capture(gl, info, &TexParams { gl, target })?);

        let last = state.max_level.min(state.base_level.saturating_add(MAX_LEVELS - 1));
        for level in state.base_level..=last {
            let width = gl.get_tex_level_parameter_iv(target, level, gl::TEXTURE_WIDTH);
            let height = gl.get_tex_level_parameter_iv(target, level, gl::TEXTURE_HEIGHT);
            let internal_format =
                gl.get_tex_level_parameter_iv(target, level, gl::TEXTURE_INTERNAL_FORMAT) as GLenum;
            entry::check(gl, "glGetTexLevelParameteriv")?;
            if width <= 0 || height <= 0 {
                break;
            }

            let pixels = gl.get_tex_image(target, level, gl::RGBA, gl::UNSIGNED_BYTE);
            entry::check(gl, "glGetTexImage")?;
            let expected = width as usize * height as usize * 4;
            if pixels.len() != expected {
                return Err(StateError::Unreadable(format!(
                    "level {} image is {} bytes, expected {}",
                    level,
                    pixels.len(),
                    expected
                )));
            }

            state.levels.push(Level {
                level,
                width,
                height,
                internal_format,
                pixels,
            });
        }
        Ok(state)
    }

    fn from_node(node: &Node, blobs: &dyn BlobStore) -> Result<TextureState, StateError> {
        check_fields(node, FIELDS)?;
        let handle = handle_field(node)?;
        let target = node.enum_field("target")?;
        check_recognized("target", target, TARGETS)?;

        let mut state = TextureState {
            handle,
            target,
            valid: true,
            ..TextureState::default()
        };
        if node.get("base_level").is_some() {
            state.base_level = node.i32_field("base_level")?;
        }
        if node.get("max_level").is_some() {
            state.max_level = node.i32_field("max_level")?;
        }
        if let Some(params) = node.get("params") {
            state.params = Some(SamplingParams::from_node(params)?);
        }

        for level in node.array_field("levels")? {
            let width = level.i32_field("width")?;
            let height = level.i32_field("height")?;
            if width <= 0 || height <= 0 {
                return Err(DocumentError::WrongType {
                    field: "levels".to_string(),
                    expected: "level with positive width and height",
                }
                .into());
            }
            let id = BlobId::new(level.str_field("pixels_blob")?);
            let pixels = blobs.get(&id)?;
            if pixels.len() != width as usize * height as usize * 4 {
                return Err(BlobError::Corrupt(format!(
                    "blob {} holds {} bytes, not a {}x{} RGBA8 image",
                    id,
                    pixels.len(),
                    width,
                    height
                ))
                .into());
            }
            state.levels.push(Level {
                level: level.i32_field("level")?,
                width,
                height,
                internal_format: level.enum_field("internal_format")?,
                pixels,
            });
        }
        Ok(state)
    }
}

impl ObjectState for TextureState {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Texture
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
        *self = TextureState::default();
    }

    fn snapshot(
        &mut self,
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        handle: GLuint,
        target: GLenum,
    ) -> Result<(), StateError> {
        self.clear();
        *self = TextureState::capture(gl, info, handle, target)?;
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
                let handle = gl.gen_textures(1).first().cloned().unwrap_or(0);
                txn.check("glGenTextures")?;
                if handle == 0 {
                    return Err(StateError::Unsupported("glGenTextures returned no name".to_string()));
                }
                txn.created(Namespace::Textures, self.handle, handle, self.target)?;
                handle
            }
        };

        if self.target == gl::NONE {
            txn.commit();
            return Ok(handle);
        }

        txn.bind(Binding::Texture2D, handle)?;

        let max_size = info.limit(Limit::MaxTextureSize) as GLint;
        for level in &self.levels {
            if max_size > 0 && (level.width > max_size || level.height > max_size) {
                txn.downgrade(
                    Some(Namespace::Textures),
                    self.handle,
                    format!(
                        "level {} is {}x{}, context maximum is {}",
                        level.level, level.width, level.height, max_size
                    ),
                );
                continue;
            }
            gl.tex_image_2d(
                self.target,
                level.level,
                level.internal_format as GLint,
                level.width,
                level.height,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                Some(&level.pixels),
            );
            txn.check("glTexImage2D")?;
        }

        gl.tex_parameter_i(self.target, gl::TEXTURE_BASE_LEVEL, self.base_level);
        gl.tex_parameter_i(self.target, gl::TEXTURE_MAX_LEVEL, self.max_level);
        txn.check("glTexParameteri")?;

        if let Some(params) = &self.params {
            let access = TexParams { gl, target: self.target };
            let dropped = params.apply(gl, info, &access, &mut |_, e| Err(e))?;
            if let Some(message) = dropped {
                txn.downgrade(Some(Namespace::Textures), self.handle, message);
            }
        }

        txn.commit();
        Ok(handle)
    }

    fn serialize(&self, blobs: &mut dyn BlobStore) -> Result<Node, StateError> {
        if !self.valid {
            return Err(StateError::Invalid);
        }
        let mut levels = vec![];
        for level in &self.levels {
            let id = blobs.put(BLOB_PREFIX, &level.pixels)?;
            levels.push(Node::object_from(vec![
                ("level", Node::from(level.level)),
                ("width", Node::from(level.width)),
                ("height", Node::from(level.height)),
                ("internal_format", enums::to_node(level.internal_format)),
                ("pixels_blob", Node::from(id.as_str())),
            ]));
        }
        Ok(Node::object_from(vec![
            ("handle", Node::from(self.handle)),
            ("target", enums::to_node(self.target)),
            ("base_level", Node::from(self.base_level)),
            ("max_level", Node::from(self.max_level)),
            ("params", self.params.as_ref().map_or(Node::Null, SamplingParams::to_node)),
            ("levels", Node::Array(levels)),
        ]))
    }

    fn deserialize(&mut self, node: &Node, blobs: &dyn BlobStore) -> Result<(), StateError> {
        self.clear();
        *self = TextureState::from_node(node, blobs)?;
        Ok(())
    }

    fn compare_restorable_state(&self, other: &dyn ObjectState) -> bool {
        match valid_as::<TextureState>(other) {
            Some(other) if self.valid => {
                self.target == other.target
                    && self.base_level == other.base_level
                    && self.max_level == other.max_level
                    && self.params == other.params
                    && self.levels == other.levels
            }
            _ => false,
        }
    }

    fn remap_handles(&mut self, remapper: &HandleRemapper) -> Result<(), RemapError> {
        self.handle = remapper.remap(Namespace::Textures, self.handle)?;
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
fn test_never_bound_texture() {
    use crate::blob::MemoryBlobs;
    use crate::document;

    let node = document::from_json(r#"{ "handle": 3, "target": "GL_NONE", "levels": [] }"#).unwrap();
    let mut record = TextureState::default();
    record.deserialize(&node, &MemoryBlobs::new()).unwrap();
    assert!(record.is_valid());
    assert!(record.params().is_none());
    assert!(record.levels().is_empty());

    let node = document::from_json(
        r#"{ "handle": 3, "target": "GL_TEXTURE_2D",
             "levels": [{ "level": 0, "width": 0, "height": 4,
                          "internal_format": "GL_RGBA8", "pixels_blob": "x" }] }"#,
    )
    .unwrap();
    assert!(matches!(
        record.deserialize(&node, &MemoryBlobs::new()),
        Err(StateError::Document(DocumentError::WrongType { .. }))
    ));
}

#[test]
fn test_base_level_at_the_top_of_the_range() {
    use crate::fake::FakeGl;

    let info = ContextInfo::new().with_limit(Limit::MaxTextureSize, 64);
    let gl = FakeGl::new(&info);
    let texture = gl.gen_textures(1)[0];
    gl.bind_texture(gl::TEXTURE_2D, texture);
    let pixels = [0xff; 16];
    gl.tex_image_2d(gl::TEXTURE_2D, 0, gl::RGBA8 as GLint, 2, 2, 0, gl::RGBA, gl::UNSIGNED_BYTE, Some(&pixels));
    gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_BASE_LEVEL, GLint::max_value());
    gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAX_LEVEL, GLint::max_value());
    gl.bind_texture(gl::TEXTURE_2D, 0);

    let mut record = TextureState::default();
    record
        .snapshot(&gl, &gl.context_info(), texture, gl::TEXTURE_2D)
        .unwrap();
    assert!(record.is_valid());
    assert!(record.levels().is_empty());
}
