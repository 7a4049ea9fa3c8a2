//! Out-of-band storage for large binary payloads.
//!
//! Buffer contents and texture images don't belong in a structured document.
//! Records put them in a `BlobStore` and write the returned `BlobId` into the
//! document instead.
//!
//! Ids are derived from the content: `{prefix}_{hash}_{length}.blob`, where
//! the prefix says roughly what the data is (`buf`, `tex`) and the hash is a
//! 64-bit hash of the bytes. Putting the same bytes twice under the same prefix
//! yields the same id and stores them once.
//!
//! There are two stores: `MemoryBlobs`, and `DirBlobs`, which keeps one file
//! per blob in a directory. `write_archive` and `read_archive` bundle a whole
//! store into a single byte stream.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BlobError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlobId(String);

impl BlobId {
    pub fn new<S: Into<String>>(id: S) -> BlobId {
        BlobId(id.into())
    }

    /// Compute the content-addressed id for `data`.
    pub fn for_content(prefix: &str, data: &[u8]) -> BlobId {
        let mut hasher = DefaultHasher::new();
        hasher.write(data);
        BlobId(format!("{}_{:016X}_{}.blob", prefix, hasher.finish(), data.len()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `name.blob` becomes `name_{n}.blob`.
    fn numbered(&self, n: u32) -> BlobId {
        let stem = self.0.strip_suffix(".blob").unwrap_or(&self.0);
        BlobId(format!("{}_{}.blob", stem, n))
    }

    /// Ids become file names in a `DirBlobs`, so they must not be able to
    /// name anything outside the directory.
    fn is_plain(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

pub trait BlobStore {
    /// Store `data`, returning its content-addressed id. If different bytes
    /// already hold that id, a numbered variant of it is used instead.
    fn put(&mut self, prefix: &str, data: &[u8]) -> Result<BlobId, BlobError> {
        let id = BlobId::for_content(prefix, data);
        let mut candidate = id.clone();
        let mut n = 0;
        loop {
            if !self.contains(&candidate) {
                self.put_with_id(&candidate, data)?;
                return Ok(candidate);
            }
            if self.get(&candidate)? == data {
                return Ok(candidate);
            }
            n += 1;
            candidate = id.numbered(n);
        }
    }

    /// Store `data` under an id chosen by the caller, replacing any blob
    /// already stored under it.
    fn put_with_id(&mut self, id: &BlobId, data: &[u8]) -> Result<(), BlobError>;

    fn get(&self, id: &BlobId) -> Result<Vec<u8>, BlobError>;

    fn contains(&self, id: &BlobId) -> bool;

    /// All ids in the store, in sorted order.
    fn ids(&self) -> Result<Vec<BlobId>, BlobError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryBlobs {
    blobs: BTreeMap<BlobId, Vec<u8>>,
}

impl MemoryBlobs {
    pub fn new() -> MemoryBlobs {
        MemoryBlobs::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobs {
    fn put_with_id(&mut self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        self.blobs.insert(id.clone(), data.to_vec());
        Ok(())
    }

    fn get(&self, id: &BlobId) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .get(id)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(id.clone()))
    }

    fn contains(&self, id: &BlobId) -> bool {
        self.blobs.contains_key(id)
    }

    fn ids(&self) -> Result<Vec<BlobId>, BlobError> {
        Ok(self.blobs.keys().cloned().collect())
    }
}

/// A blob store that keeps each blob as a loose file in a directory.
pub struct DirBlobs {
    dir: PathBuf,
}

impl DirBlobs {
    /// Use `dir` as a blob store, creating it if necessary.
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<DirBlobs> {
        let dir = dir.as_ref();

        match fs::create_dir_all(dir) {
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => {
                return Err(e);
            }
            _ => (),
        }

        Ok(DirBlobs { dir: dir.to_owned() })
    }

    /// Use an existing directory as a blob store.
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<DirBlobs> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("blob directory {} does not exist", dir.display()),
            ));
        }
        Ok(DirBlobs { dir: dir.to_owned() })
    }

    fn path(&self, id: &BlobId) -> Result<PathBuf, BlobError> {
        if !id.is_plain() {
            return Err(BlobError::Corrupt(format!("unusable blob id '{}'", id)));
        }
        Ok(self.dir.join(id.as_str()))
    }
}

impl BlobStore for DirBlobs {
    fn put_with_id(&mut self, id: &BlobId, data: &[u8]) -> Result<(), BlobError> {
        let mut file = io::BufWriter::new(fs::File::create(self.path(id)?)?);
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn get(&self, id: &BlobId) -> Result<Vec<u8>, BlobError> {
        match fs::read(self.path(id)?) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &BlobId) -> bool {
        self.path(id).map(|p| p.is_file()).unwrap_or(false)
    }

    fn ids(&self) -> Result<Vec<BlobId>, BlobError> {
        let mut ids = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(BlobId::new(name));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Magic number at the start of a blob archive: "GLSB", little-endian.
pub const ARCHIVE_MAGIC: u32 = 0x4253_4c47;
pub const ARCHIVE_VERSION: u32 = 1;

/// Write every blob in `store` to `out` as a single archive.
///
/// The archive is the magic number and version as little-endian `u32`s,
/// followed by the number of entries, and then for each entry the length of
/// its id, the id, the length of its data, and the data. All counts and
/// lengths are unsigned LEB128.
pub fn write_archive<W: Write>(store: &dyn BlobStore, out: &mut W) -> Result<(), BlobError> {
    let ids = store.ids()?;
    out.write_all(&ARCHIVE_MAGIC.to_le_bytes())?;
    out.write_all(&ARCHIVE_VERSION.to_le_bytes())?;
    leb128::write::unsigned(out, ids.len() as u64)?;
    for id in ids {
        let data = store.get(&id)?;
        leb128::write::unsigned(out, id.as_str().len() as u64)?;
        out.write_all(id.as_str().as_bytes())?;
        leb128::write::unsigned(out, data.len() as u64)?;
        out.write_all(&data)?;
    }
    out.flush()?;
    Ok(())
}

/// Read an archive produced by `write_archive` into memory.
pub fn read_archive(mut buf: &[u8]) -> Result<MemoryBlobs, BlobError> {
    let magic = read_u32(&mut buf)?;
    if magic != ARCHIVE_MAGIC {
        return Err(BlobError::Corrupt(format!("bad archive magic 0x{:08x}", magic)));
    }
    let version = read_u32(&mut buf)?;
    if version != ARCHIVE_VERSION {
        return Err(BlobError::Corrupt(format!("unsupported archive version {}", version)));
    }

    let mut store = MemoryBlobs::new();
    let count = read_length(&mut buf)?;
    for _ in 0..count {
        let id_len = read_length(&mut buf)?;
        let id = String::from_utf8(take(&mut buf, id_len)?.to_vec())
            .map_err(|_| BlobError::Corrupt("blob id is not UTF-8".to_string()))?;
        let data_len = read_length(&mut buf)?;
        let data = take(&mut buf, data_len)?;
        store.put_with_id(&BlobId::new(id), data)?;
    }
    Ok(store)
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, BlobError> {
    let mut bytes = [0; 4];
    buf.read_exact(&mut bytes)
        .map_err(|_| BlobError::Corrupt("truncated archive header".to_string()))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read a LEB128 length, refusing any that exceeds what's left of `buf`.
fn read_length(buf: &mut &[u8]) -> Result<usize, BlobError> {
    let n = leb128::read::unsigned(buf)
        .map_err(|e| BlobError::Corrupt(format!("bad length in archive: {}", e)))?;
    if n > buf.len() as u64 {
        return Err(BlobError::Corrupt(format!(
            "length {} runs past the end of the archive",
            n
        )));
    }
    Ok(n as usize)
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], BlobError> {
    if len > buf.len() {
        return Err(BlobError::Corrupt("truncated archive entry".to_string()));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

#[test]
fn test_content_addressing() {
    let mut store = MemoryBlobs::new();
    let a = store.put("buf", b"abc").unwrap();
    let b = store.put("buf", b"abc").unwrap();
    let c = store.put("tex", b"abc").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(store.len(), 2);
    assert!(a.as_str().starts_with("buf_"));
    assert!(a.as_str().ends_with("_3.blob"));
    assert_eq!(store.get(&a).unwrap(), b"abc");
    assert!(matches!(
        store.get(&BlobId::new("nope")),
        Err(BlobError::NotFound(_))
    ));
}

#[test]
fn test_colliding_ids() {
    let mut store = MemoryBlobs::new();
    let natural = BlobId::for_content("buf", b"abc");
    store.put_with_id(&natural, b"not abc").unwrap();

    let id = store.put("buf", b"abc").unwrap();
    assert_ne!(id, natural);
    assert!(id.as_str().ends_with("_3_1.blob"));
    assert_eq!(store.get(&id).unwrap(), b"abc");
    assert_eq!(store.get(&natural).unwrap(), b"not abc");

    assert_eq!(store.put("buf", b"abc").unwrap(), id);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_archive() {
    let mut store = MemoryBlobs::new();
    let empty = store.put("buf", &[]).unwrap();
    let big = store.put("tex", &vec![7; 300]).unwrap();

    let mut bytes = vec![];
    write_archive(&store, &mut bytes).unwrap();
    let back = read_archive(&bytes).unwrap();
    assert_eq!(back.ids().unwrap(), store.ids().unwrap());
    assert_eq!(back.get(&empty).unwrap(), Vec::<u8>::new());
    assert_eq!(back.get(&big).unwrap(), vec![7; 300]);

    // Every truncation is reported, not panicked on.
    for len in 0..bytes.len() {
        assert!(read_archive(&bytes[..len]).is_err(), "length {}", len);
    }
    assert!(read_archive(b"GLRR\x01\x00\x00\x00\x00").is_err());
}

#[test]
fn test_dir_blobs() {
    let dir = std::env::temp_dir().join(format!("gl-snapshot-blobs-{}", std::process::id()));
    let mut store = DirBlobs::create(&dir).unwrap();
    let id = store.put("buf", b"hello").unwrap();
    assert!(store.contains(&id));
    assert_eq!(store.get(&id).unwrap(), b"hello");
    assert_eq!(store.ids().unwrap(), vec![id]);
    assert!(store.get(&BlobId::new("../escape")).is_err());
    assert!(matches!(
        store.get(&BlobId::new("missing.blob")),
        Err(BlobError::NotFound(_))
    ));
    fs::remove_dir_all(&dir).unwrap();
}
