//! Translating recorded handles to live ones.
//!
//! When a snapshot is restored, every object gets whatever name the new
//! context hands out, which generally isn't the name it had when it was
//! captured. Each record declares its new name here as soon as it creates its
//! live object; records that refer to other objects (a framebuffer's
//! attachments, a vertex array's buffers) look the live names up here.
//!
//! The remapper only records names. It owns nothing, except in the sense that
//! `delete_and_destroy` will delete the live object on request.

use std::collections::{HashMap, HashSet};

use gleam::gl::{GLenum, GLuint};
use log::debug;

use crate::entry::{self, EntryPoints};
use crate::error::RemapError;
use crate::namespace::Namespace;

#[derive(Copy, Clone, Debug, PartialEq)]
struct Declared {
    live: GLuint,
    target: GLenum,
}

/// Mappings from recorded handles to live handles, for one restore session.
#[derive(Debug, Default)]
pub struct HandleRemapper {
    declared: HashMap<(Namespace, GLuint), Declared>,
    unavailable: HashSet<(Namespace, GLuint)>,
}

impl HandleRemapper {
    pub fn new() -> HandleRemapper {
        HandleRemapper::default()
    }

    /// Record that the object captured as `recorded` now lives as `live`.
    ///
    /// Declaring the same pair twice is harmless; declaring a different live
    /// handle for a recorded handle that is already declared is an error.
    pub fn declare(
        &mut self,
        namespace: Namespace,
        recorded: GLuint,
        live: GLuint,
        target: GLenum,
    ) -> Result<(), RemapError> {
        let key = (namespace, recorded);
        if let Some(existing) = self.declared.get(&key) {
            if existing.live != live {
                return Err(RemapError::Conflict {
                    namespace,
                    handle: recorded,
                    existing: existing.live,
                    live,
                });
            }
        }
        debug!("declare {} {} -> {}", namespace, recorded, live);
        self.unavailable.remove(&key);
        self.declared.insert(key, Declared { live, target });
        Ok(())
    }

    /// Return the live handle for `recorded`.
    ///
    /// Handle zero always maps to itself: it is GL's "no object" name.
    pub fn remap(&self, namespace: Namespace, recorded: GLuint) -> Result<GLuint, RemapError> {
        if recorded == 0 {
            return Ok(0);
        }
        self.lookup(namespace, recorded).map(|d| d.live)
    }

    /// Return the target `recorded` was declared with.
    pub fn target_of(&self, namespace: Namespace, recorded: GLuint) -> Result<GLenum, RemapError> {
        self.lookup(namespace, recorded).map(|d| d.target)
    }

    fn lookup(&self, namespace: Namespace, handle: GLuint) -> Result<Declared, RemapError> {
        let key = (namespace, handle);
        if let Some(&declared) = self.declared.get(&key) {
            return Ok(declared);
        }
        if self.unavailable.contains(&key) {
            Err(RemapError::Unavailable { namespace, handle })
        } else {
            Err(RemapError::NotDeclared { namespace, handle })
        }
    }

    pub fn is_declared(&self, namespace: Namespace, recorded: GLuint) -> bool {
        self.declared.contains_key(&(namespace, recorded))
    }

    /// Note that `recorded` was part of the snapshot but failed to restore, so
    /// that references to it are reported as such rather than as ordering
    /// mistakes.
    pub fn mark_unavailable(&mut self, namespace: Namespace, recorded: GLuint) {
        if !self.is_declared(namespace, recorded) {
            self.unavailable.insert((namespace, recorded));
        }
    }

    /// Drop the mapping for `recorded` without touching the live object.
    pub fn forget(&mut self, namespace: Namespace, recorded: GLuint) -> Option<GLuint> {
        self.declared.remove(&(namespace, recorded)).map(|d| d.live)
    }

    /// Drop the mapping for `recorded` and delete the live object it named.
    pub fn delete_and_destroy(
        &mut self,
        gl: &dyn EntryPoints,
        namespace: Namespace,
        recorded: GLuint,
    ) -> Result<GLuint, RemapError> {
        let live = self
            .forget(namespace, recorded)
            .ok_or(RemapError::NotDeclared { namespace, handle: recorded })?;
        debug!("destroy {} {} (live {})", namespace, recorded, live);
        entry::destroy(gl, namespace, live);
        Ok(live)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Iterate over `(namespace, recorded, live, target)` for every mapping.
    pub fn iter(&self) -> impl Iterator<Item = (Namespace, GLuint, GLuint, GLenum)> + '_ {
        self.declared
            .iter()
            .map(|(&(ns, recorded), d)| (ns, recorded, d.live, d.target))
    }
}

#[test]
fn test_declare_and_remap() {
    use gleam::gl;

    let mut remapper = HandleRemapper::new();
    assert_eq!(remapper.remap(Namespace::Textures, 0), Ok(0));
    assert_eq!(
        remapper.remap(Namespace::Textures, 3),
        Err(RemapError::NotDeclared { namespace: Namespace::Textures, handle: 3 })
    );

    remapper.declare(Namespace::Textures, 3, 40, gl::TEXTURE_2D).unwrap();
    remapper.declare(Namespace::Textures, 3, 40, gl::TEXTURE_2D).unwrap();
    assert_eq!(remapper.remap(Namespace::Textures, 3), Ok(40));
    assert_eq!(remapper.target_of(Namespace::Textures, 3), Ok(gl::TEXTURE_2D));

    // Same number, different namespace: unrelated.
    assert!(remapper.remap(Namespace::Buffers, 3).is_err());

    assert!(matches!(
        remapper.declare(Namespace::Textures, 3, 41, gl::TEXTURE_2D),
        Err(RemapError::Conflict { existing: 40, live: 41, .. })
    ));

    remapper.mark_unavailable(Namespace::Buffers, 9);
    assert_eq!(
        remapper.remap(Namespace::Buffers, 9),
        Err(RemapError::Unavailable { namespace: Namespace::Buffers, handle: 9 })
    );

    assert_eq!(remapper.forget(Namespace::Textures, 3), Some(40));
    assert!(remapper.is_empty());
}
