use std::fs::File;
use std::path::Path;

use image::png::PNGEncoder;
use image::{ColorType, ImageError};

use crate::state::texture::Level;

/// Write one captured texture level as a PNG file. Levels are always read
/// back as RGBA8.
pub fn write_level<P: AsRef<Path>>(path: P, level: &Level) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let encoder = PNGEncoder::new(file);
    encoder.encode(&level.pixels, level.width as u32, level.height as u32, ColorType::Rgba8)
}

#[test]
fn test_write_level() {
    let level = Level {
        level: 0,
        width: 2,
        height: 1,
        internal_format: gleam::gl::RGBA8,
        pixels: vec![255, 0, 0, 255, 0, 255, 0, 255],
    };
    let path = std::env::temp_dir().join(format!("gl-snapshot-level-{}.png", std::process::id()));
    write_level(&path, &level).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
    std::fs::remove_file(&path).unwrap();
}
