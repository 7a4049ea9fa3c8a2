//! Saving snapshots to disk.
//!
//! A snapshot directory holds the document as `snapshot.json` and the blobs it
//! refers to as loose files under `blobs/`. A snapshot can also be bundled
//! into a single archive file, with the document stored as one more blob.

use std::{fs, io};
use std::path::Path;

use crate::blob::{self, BlobId, BlobStore, DirBlobs, MemoryBlobs};
use crate::error::{BlobError, PassError};
use crate::report::PassReport;
use crate::snapshot::ContextSnapshot;

pub const DOCUMENT: &str = "snapshot.json";
pub const BLOB_DIR: &str = "blobs";

/// Write `snapshot` into the directory `dir`, creating it if need be.
pub fn save<P: AsRef<Path>>(dir: P, snapshot: &ContextSnapshot) -> Result<(), PassError> {
    let dir = dir.as_ref();
    match fs::create_dir(dir) {
        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => {
            return Err(e.into());
        }
        _ => (),
    }

    let mut blobs = DirBlobs::create(dir.join(BLOB_DIR))?;
    let text = snapshot.to_json(&mut blobs)?;
    fs::write(dir.join(DOCUMENT), text)?;
    Ok(())
}

/// Read back a snapshot written by `save`.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<(ContextSnapshot, PassReport), PassError> {
    let dir = dir.as_ref();
    let blobs = DirBlobs::open(dir.join(BLOB_DIR))?;
    let text = fs::read_to_string(dir.join(DOCUMENT))?;
    ContextSnapshot::from_json(&text, &blobs)
}

/// Write `snapshot` and everything it refers to into the single file `path`.
pub fn save_archive<P: AsRef<Path>>(path: P, snapshot: &ContextSnapshot) -> Result<(), PassError> {
    let mut blobs = MemoryBlobs::new();
    let text = snapshot.to_json(&mut blobs)?;
    blobs.put_with_id(&BlobId::new(DOCUMENT), text.as_bytes())?;
    let mut out = io::BufWriter::new(fs::File::create(path)?);
    blob::write_archive(&blobs, &mut out)?;
    Ok(())
}

pub fn load_archive<P: AsRef<Path>>(path: P) -> Result<(ContextSnapshot, PassReport), PassError> {
    read_archive_snapshot(&fs::read(path)?)
}

/// Read a snapshot from the contents of a file written by `save_archive`.
pub fn read_archive_snapshot(bytes: &[u8]) -> Result<(ContextSnapshot, PassReport), PassError> {
    let blobs = blob::read_archive(bytes)?;
    let text = String::from_utf8(blobs.get(&BlobId::new(DOCUMENT))?)
        .map_err(|_| BlobError::Corrupt("snapshot document is not UTF-8".to_string()))?;
    ContextSnapshot::from_json(&text, &blobs)
}

#[test]
fn test_save_and_load() {
    use crate::caps::{ContextInfo, Limit};
    use crate::entry::EntryPoints;
    use crate::fake::FakeGl;
    use crate::namespace::Namespace;
    use crate::options::Options;
    use gleam::gl;

    let info = ContextInfo::new().with_limit(Limit::MaxVertexAttribs, 2);
    let gl = FakeGl::new(&info);
    let buffer = gl.gen_buffers(1)[0];
    gl.bind_buffer(gl::ARRAY_BUFFER, buffer);
    gl.buffer_data(gl::ARRAY_BUFFER, b"zyxwvuts", gl::DYNAMIC_DRAW);
    let (snapshot, report) = ContextSnapshot::capture(&gl, &info, &gl.inventory(), &Options::default()).unwrap();
    assert!(report.is_clean());

    let dir = std::env::temp_dir().join(format!("gl-snapshot-files-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    save(&dir, &snapshot).unwrap();
    let (loaded, report) = load(&dir).unwrap();
    assert!(report.is_clean());
    assert!(snapshot.compare_restorable_state(&loaded).is_clean());
    assert!(loaded.get(Namespace::Buffers, buffer).is_some());

    let archive = dir.join("bundle.glsnap");
    save_archive(&archive, &snapshot).unwrap();
    let (unpacked, _) = load_archive(&archive).unwrap();
    assert!(snapshot.compare_restorable_state(&unpacked).is_clean());
    fs::remove_dir_all(&dir).unwrap();

    assert!(read_archive_snapshot(b"GLSB").is_err());
}
