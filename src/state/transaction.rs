//! All-or-nothing restores.
//!
//! Restoring an object usually takes a series of calls: create it, declare it,
//! bind it, upload data, set parameters. If any of them fails, the objects
//! created so far must not be left behind. A `Transaction` keeps a list of
//! the actions needed to undo what has been done, and runs them when it is
//! dropped without having been committed. Bindings changed through the
//! transaction are put back either way.

use gleam::gl::{GLenum, GLuint};
use log::{debug, warn};

use crate::caps::ContextInfo;
use crate::entry::{self, Binding, BindingScope, EntryPoints};
use crate::error::{GlError, RemapError};
use crate::namespace::Namespace;
use crate::report::EventKind;

use super::RestoreContext;

#[derive(Debug)]
enum Undo {
    /// Delete an object this transaction created.
    Destroy { namespace: Namespace, recorded: GLuint },
    /// Begin a query that this transaction ended.
    ResumeQuery { target: GLenum, query: GLuint },
    /// End a query that this transaction began.
    EndQuery { target: GLenum },
}

pub struct Transaction<'t, 'a> {
    ctx: &'t mut RestoreContext<'a>,
    undo: Vec<Undo>,
    scopes: Vec<BindingScope<'a>>,
    downgrades: Vec<(Option<Namespace>, GLuint, String)>,
    committed: bool,
}

impl<'t, 'a> Transaction<'t, 'a> {
    pub fn new(ctx: &'t mut RestoreContext<'a>) -> Transaction<'t, 'a> {
        Transaction {
            ctx,
            undo: vec![],
            scopes: vec![],
            downgrades: vec![],
            committed: false,
        }
    }

    pub fn gl(&self) -> &'a dyn EntryPoints {
        self.ctx.gl
    }

    pub fn info(&self) -> &'a ContextInfo {
        self.ctx.info
    }

    pub fn check(&self, call: &'static str) -> Result<(), GlError> {
        entry::check(self.ctx.gl, call)
    }

    pub fn remap(&self, namespace: Namespace, recorded: GLuint) -> Result<GLuint, RemapError> {
        self.ctx.remapper.remap(namespace, recorded)
    }

    pub fn target_of(&self, namespace: Namespace, recorded: GLuint) -> Result<GLenum, RemapError> {
        self.ctx.remapper.target_of(namespace, recorded)
    }

    /// Declare the freshly created object `live` as the restored `recorded`,
    /// and arrange for it to be destroyed if the transaction fails.
    pub fn created(
        &mut self,
        namespace: Namespace,
        recorded: GLuint,
        live: GLuint,
        target: GLenum,
    ) -> Result<(), RemapError> {
        if let Err(e) = self.ctx.remapper.declare(namespace, recorded, live, target) {
            entry::destroy(self.ctx.gl, namespace, live);
            return Err(e);
        }
        self.undo.push(Undo::Destroy { namespace, recorded });
        Ok(())
    }

    /// Arrange for `query` to be begun on `target` again if the transaction
    /// fails.
    pub fn resume_query_on_failure(&mut self, target: GLenum, query: GLuint) {
        self.undo.push(Undo::ResumeQuery { target, query });
    }

    /// Arrange for the query this transaction just began on `target` to be
    /// ended if the transaction fails.
    pub fn end_query_on_failure(&mut self, target: GLenum) {
        self.undo.push(Undo::EndQuery { target });
    }

    /// Withdraw the most recently added undo action, because the caller has
    /// done it already.
    pub fn settled(&mut self) {
        self.undo.pop();
    }

    /// Bind `name` at `binding` until the transaction ends.
    pub fn bind(&mut self, binding: Binding, name: GLuint) -> Result<(), GlError> {
        let scope = BindingScope::bind(self.ctx.gl, binding, name)?;
        self.scopes.push(scope);
        Ok(())
    }

    /// Note that some of the record's state didn't fit in the live context.
    /// Reported only if the transaction commits.
    pub fn downgrade<S: Into<String>>(&mut self, namespace: Option<Namespace>, handle: GLuint, message: S) {
        self.downgrades.push((namespace, handle, message.into()));
    }

    pub fn commit(mut self) {
        self.committed = true;
        for (namespace, handle, message) in self.downgrades.drain(..) {
            warn!("capability downgrade: {}", message);
            self.ctx
                .report
                .push(EventKind::Downgraded, namespace, handle, message);
        }
    }

    fn roll_back(&mut self) {
        let gl = self.ctx.gl;
        while let Some(action) = self.undo.pop() {
            debug!("rolling back: {:?}", action);
            match action {
                Undo::Destroy { namespace, recorded } => {
                    let _ = self.ctx.remapper.delete_and_destroy(gl, namespace, recorded);
                }
                Undo::ResumeQuery { target, query } => gl.begin_query(target, query),
                Undo::EndQuery { target } => gl.end_query(target),
            }
        }
        if let Some(code) = entry::clear_errors(gl) {
            warn!("error while rolling back a restore: 0x{:x}", code);
        }
    }
}

impl Drop for Transaction<'_, '_> {
    fn drop(&mut self) {
        // Put bindings back in the reverse of the order they were made.
        while let Some(scope) = self.scopes.pop() {
            drop(scope);
        }
        if !self.committed {
            self.roll_back();
        }
    }
}
