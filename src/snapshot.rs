//! Whole-context snapshots.
//!
//! A `ContextSnapshot` holds one record per captured object, grouped by
//! namespace in the order they were captured, plus the context's current
//! vertex attribute values and the `ContextInfo` of the context it came from.
//!
//! Passes over a snapshot degrade rather than give up: an object that can't
//! be captured, restored or loaded is left out and reported in the returned
//! `PassReport`, and the pass carries on with the rest. The exceptions are a
//! restore order that lets a record look up an object that hasn't been
//! restored yet, which is always a bug and stops the pass, and strict mode.

use std::collections::{BTreeMap, HashSet};

use gleam::gl::{self, GLenum, GLuint};
use log::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::caps::ContextInfo;
use crate::document::{self, Node};
use crate::entry::{self, EntryPoints};
use crate::error::{DocumentError, PassError, RemapError, StateError};
use crate::namespace::Namespace;
use crate::options::Options;
use crate::remap::HandleRemapper;
use crate::report::{EventKind, PassReport};
use crate::state::vertex_attrib::CurrentVertexAttribState;
use crate::state::{ObjectKind, ObjectState, RestoreContext};

/// The newest document layout this library reads and the one it writes.
pub const FORMAT_VERSION: i64 = 1;

/// The order namespaces are captured in.
pub const CAPTURE_ORDER: [Namespace; 11] = [
    Namespace::Textures,
    Namespace::Buffers,
    Namespace::Samplers,
    Namespace::Queries,
    Namespace::RenderBuffers,
    Namespace::Framebuffers,
    Namespace::VertexArrays,
    Namespace::Shaders,
    Namespace::Programs,
    Namespace::Pipelines,
    Namespace::Syncs,
];

/// The order namespaces are restored in: every namespace comes after the ones
/// its records refer to.
pub const RESTORE_ORDER: [Namespace; 11] = [
    Namespace::Buffers,
    Namespace::Textures,
    Namespace::RenderBuffers,
    Namespace::Samplers,
    Namespace::Queries,
    Namespace::Shaders,
    Namespace::Programs,
    Namespace::Pipelines,
    Namespace::Framebuffers,
    Namespace::VertexArrays,
    Namespace::Syncs,
];

/// A live object, as seen by whatever tracks the application's GL calls.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub namespace: Namespace,
    pub handle: GLuint,
    /// The target the object was last bound to, or `GL_NONE`.
    pub target: GLenum,
}

/// The list of live objects a snapshot should capture.
#[derive(Clone, Debug, Default)]
pub struct ObjectInventory {
    objects: Vec<TrackedObject>,
}

impl ObjectInventory {
    pub fn new() -> ObjectInventory {
        ObjectInventory::default()
    }

    pub fn track(&mut self, namespace: Namespace, handle: GLuint, target: GLenum) {
        self.objects.push(TrackedObject {
            namespace,
            handle,
            target,
        });
    }

    pub fn in_namespace(&self, namespace: Namespace) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter().filter(move |o| o.namespace == namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ContextSnapshot {
    info: ContextInfo,
    objects: BTreeMap<Namespace, Vec<Box<dyn ObjectState>>>,
    current_vertex_attribs: Option<CurrentVertexAttribState>,
}

impl Clone for ContextSnapshot {
    fn clone(&self) -> ContextSnapshot {
        ContextSnapshot {
            info: self.info.clone(),
            objects: self
                .objects
                .iter()
                .map(|(&ns, records)| (ns, records.iter().map(|r| r.box_clone()).collect()))
                .collect(),
            current_vertex_attribs: self.current_vertex_attribs.clone(),
        }
    }
}

fn strict_error(namespace: Option<Namespace>, handle: GLuint, reason: &StateError) -> PassError {
    PassError::Strict {
        namespace: namespace.map_or("context state".to_string(), |ns| ns.to_string()),
        handle,
        reason: reason.to_string(),
    }
}

impl ContextSnapshot {
    pub fn new(info: ContextInfo) -> ContextSnapshot {
        ContextSnapshot {
            info,
            ..ContextSnapshot::default()
        }
    }

    /// Capture every object in `inventory`, and the current vertex attributes.
    pub fn capture(
        gl: &dyn EntryPoints,
        info: &ContextInfo,
        inventory: &ObjectInventory,
        options: &Options,
    ) -> Result<(ContextSnapshot, PassReport), PassError> {
        info!("capturing {} objects", inventory.len());
        let mut snapshot = ContextSnapshot::new(info.clone());
        let mut report = PassReport::new();

        for &ns in CAPTURE_ORDER.iter() {
            for object in inventory.in_namespace(ns) {
                if snapshot.get(ns, object.handle).is_some() {
                    continue;
                }
                let mut record = ObjectKind::for_namespace(ns).new_record();
                match record.snapshot(gl, info, object.handle, object.target) {
                    Ok(()) => {
                        debug!("captured {} {}", ns, object.handle);
                        snapshot.insert(ns, record);
                        report.succeeded += 1;
                    }
                    Err(e) => {
                        error!("excluding {} {} from snapshot: {}", ns, object.handle, e);
                        entry::clear_errors(gl);
                        if options.strict {
                            return Err(strict_error(Some(ns), object.handle, &e));
                        }
                        report.push(EventKind::Excluded, Some(ns), object.handle, e.to_string());
                    }
                }
            }
        }

        let mut attribs = CurrentVertexAttribState::default();
        match attribs.snapshot(gl, info, 0, gl::NONE) {
            Ok(()) => {
                snapshot.current_vertex_attribs = Some(attribs);
                report.succeeded += 1;
            }
            Err(e) => {
                error!("excluding current vertex attributes from snapshot: {}", e);
                entry::clear_errors(gl);
                if options.strict {
                    return Err(strict_error(None, 0, &e));
                }
                report.push(EventKind::Excluded, None, 0, e.to_string());
            }
        }

        info!("captured {} objects, {} excluded", snapshot.len(), report.of_kind(EventKind::Excluded).count());
        Ok((snapshot, report))
    }

    /// Restore every record into the context `gl`, whose capabilities are
    /// `live_info`. Mappings already declared in `remapper` are restored into
    /// the existing live object rather than a new one.
    pub fn restore(
        &self,
        gl: &dyn EntryPoints,
        live_info: &ContextInfo,
        remapper: &mut HandleRemapper,
        options: &Options,
    ) -> Result<PassReport, PassError> {
        self.restore_in_order(gl, live_info, remapper, options, &RESTORE_ORDER)
    }

    /// Like `restore`, but visiting namespaces in `order`. Namespaces not
    /// listed are not restored.
    pub fn restore_in_order(
        &self,
        gl: &dyn EntryPoints,
        live_info: &ContextInfo,
        remapper: &mut HandleRemapper,
        options: &Options,
        order: &[Namespace],
    ) -> Result<PassReport, PassError> {
        info!("restoring {} objects", self.len());
        let mut report = PassReport::new();
        self.mark_dangling_references(remapper);

        for &ns in order {
            for record in self.records(ns) {
                let recorded = record.recorded_handle();
                let live = if remapper.is_declared(ns, recorded) {
                    remapper.remap(ns, recorded).ok()
                } else {
                    None
                };
                let result = record.restore(
                    &mut RestoreContext {
                        gl,
                        info: live_info,
                        remapper: &mut *remapper,
                        report: &mut report,
                    },
                    live,
                );
                match result {
                    Ok(handle) => {
                        debug!("restored {} {} as {}", ns, recorded, handle);
                        report.succeeded += 1;
                    }
                    Err(StateError::Remap(e @ RemapError::NotDeclared { .. })) => {
                        error!("{} {} restored before what it refers to: {}", ns, recorded, e);
                        return Err(PassError::DependencyOrder(e));
                    }
                    Err(e) => {
                        error!("failed to restore {} {}: {}", ns, recorded, e);
                        entry::clear_errors(gl);
                        remapper.mark_unavailable(ns, recorded);
                        if options.strict {
                            return Err(strict_error(Some(ns), recorded, &e));
                        }
                        report.push(EventKind::Failed, Some(ns), recorded, e.to_string());
                    }
                }
            }
        }

        if let Some(attribs) = &self.current_vertex_attribs {
            let result = attribs.restore(
                &mut RestoreContext {
                    gl,
                    info: live_info,
                    remapper: &mut *remapper,
                    report: &mut report,
                },
                None,
            );
            match result {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    error!("failed to restore current vertex attributes: {}", e);
                    entry::clear_errors(gl);
                    if options.strict {
                        return Err(strict_error(None, 0, &e));
                    }
                    report.push(EventKind::Failed, None, 0, e.to_string());
                }
            }
        }

        if options.verify_restore {
            report.merge(self.verify(gl, live_info, remapper));
        }
        info!(
            "restored {} objects, {} failed",
            report.succeeded,
            report.of_kind(EventKind::Failed).count()
        );
        Ok(report)
    }

    /// References to objects that aren't in this snapshot (because they were
    /// excluded when it was captured) can never be satisfied. Mark them
    /// unavailable, so that the records holding them fail on their own
    /// instead of looking like an ordering mistake.
    fn mark_dangling_references(&self, remapper: &mut HandleRemapper) {
        for (_, record) in self.iter() {
            for (ns, handle) in record.references() {
                if handle != 0 && self.get(ns, handle).is_none() && !remapper.is_declared(ns, handle) {
                    warn!(
                        "{} {} refers to {} {}, which is not in the snapshot",
                        record.kind().namespace().map_or("context", Namespace::name),
                        record.recorded_handle(),
                        ns,
                        handle
                    );
                    remapper.mark_unavailable(ns, handle);
                }
            }
        }
    }

    /// Capture every restored object again and compare it with its record,
    /// translated to live handles. Differences are reported as mismatches.
    pub fn verify(
        &self,
        gl: &dyn EntryPoints,
        live_info: &ContextInfo,
        remapper: &HandleRemapper,
    ) -> PassReport {
        let mut report = PassReport::new();
        for (ns, record) in self.iter() {
            let recorded = record.recorded_handle();
            if !remapper.is_declared(ns, recorded) {
                continue;
            }
            let mut expected = record.box_clone();
            if let Err(e) = expected.remap_handles(remapper) {
                report.push(EventKind::Mismatch, Some(ns), recorded, e.to_string());
                continue;
            }
            let (live, target) = match (remapper.remap(ns, recorded), remapper.target_of(ns, recorded)) {
                (Ok(live), Ok(target)) => (live, target),
                _ => continue,
            };
            let mut actual = record.kind().new_record();
            if let Err(e) = actual.snapshot(gl, live_info, live, target) {
                entry::clear_errors(gl);
                report.push(
                    EventKind::Mismatch,
                    Some(ns),
                    recorded,
                    format!("could not capture restored object: {}", e),
                );
                continue;
            }
            if expected.compare_restorable_state(&*actual) {
                report.succeeded += 1;
            } else {
                warn!("{} {} doesn't match its record after restore", ns, recorded);
                report.push(
                    EventKind::Mismatch,
                    Some(ns),
                    recorded,
                    "restored object differs from its record",
                );
            }
        }

        if let Some(expected) = &self.current_vertex_attribs {
            let mut actual = CurrentVertexAttribState::default();
            match actual.snapshot(gl, live_info, 0, gl::NONE) {
                Ok(()) if expected.compare_restorable_state(&actual) => report.succeeded += 1,
                Ok(()) => report.push(
                    EventKind::Mismatch,
                    None,
                    0,
                    "current vertex attributes differ from the snapshot",
                ),
                Err(e) => {
                    entry::clear_errors(gl);
                    report.push(EventKind::Mismatch, None, 0, e.to_string());
                }
            }
        }
        report
    }

    /// Compare the restorable state of every record with its counterpart in
    /// `other`, matching records by namespace and recorded handle.
    pub fn compare_restorable_state(&self, other: &ContextSnapshot) -> PassReport {
        let mut report = PassReport::new();
        for (ns, record) in self.iter() {
            let handle = record.recorded_handle();
            match other.get(ns, handle) {
                None => report.push(EventKind::Mismatch, Some(ns), handle, "missing from the other snapshot"),
                Some(theirs) if !record.compare_restorable_state(theirs) => {
                    report.push(EventKind::Mismatch, Some(ns), handle, "restorable state differs")
                }
                Some(_) => report.succeeded += 1,
            }
        }
        for (ns, record) in other.iter() {
            if self.get(ns, record.recorded_handle()).is_none() {
                report.push(
                    EventKind::Mismatch,
                    Some(ns),
                    record.recorded_handle(),
                    "missing from this snapshot",
                );
            }
        }
        match (&self.current_vertex_attribs, &other.current_vertex_attribs) {
            (None, None) => {}
            (Some(ours), Some(theirs)) if ours.compare_restorable_state(theirs) => report.succeeded += 1,
            _ => report.push(EventKind::Mismatch, None, 0, "current vertex attributes differ"),
        }
        report
    }

    pub fn to_document(&self, blobs: &mut dyn BlobStore) -> Result<Node, PassError> {
        let mut objects = BTreeMap::new();
        for (&ns, records) in &self.objects {
            let mut nodes = Vec::with_capacity(records.len());
            for record in records {
                let node = record.serialize(blobs).map_err(|source| PassError::Record {
                    namespace: ns.to_string(),
                    handle: record.recorded_handle(),
                    source,
                })?;
                nodes.push(node);
            }
            objects.insert(ns.name().to_string(), Node::Array(nodes));
        }

        let attribs = match &self.current_vertex_attribs {
            Some(attribs) => attribs.serialize(blobs).map_err(|source| PassError::Record {
                namespace: "context state".to_string(),
                handle: 0,
                source,
            })?,
            None => Node::Null,
        };

        Ok(Node::object_from(vec![
            ("format_version", Node::from(FORMAT_VERSION)),
            ("context_info", self.info.to_node()),
            ("current_vertex_attribs", attribs),
            ("objects", Node::Object(objects)),
        ]))
    }

    /// Rebuild a snapshot from a document. Records that can't be read are
    /// left out and reported as excluded.
    pub fn from_document(
        node: &Node,
        blobs: &dyn BlobStore,
    ) -> Result<(ContextSnapshot, PassReport), PassError> {
        let version = node.i64_field("format_version")?;
        if version > FORMAT_VERSION {
            return Err(DocumentError::Version(version).into());
        }
        let info = ContextInfo::from_node(node.field("context_info")?)?;
        let mut snapshot = ContextSnapshot::new(info);
        let mut report = PassReport::new();

        let objects = node.field("objects")?.as_object().ok_or_else(|| DocumentError::WrongType {
            field: "objects".to_string(),
            expected: "object",
        })?;
        for (name, list) in objects {
            let ns = match Namespace::from_name(name) {
                Some(ns) => ns,
                None => {
                    warn!("ignoring unknown namespace '{}'", name);
                    continue;
                }
            };
            let list = list.as_array().ok_or_else(|| DocumentError::WrongType {
                field: name.clone(),
                expected: "array of objects",
            })?;

            let mut seen = HashSet::new();
            for item in list {
                let mut record = ObjectKind::for_namespace(ns).new_record();
                match record.deserialize(item, blobs) {
                    Ok(()) if seen.insert(record.recorded_handle()) => {
                        snapshot.insert(ns, record);
                        report.succeeded += 1;
                    }
                    Ok(()) => {
                        let handle = record.recorded_handle();
                        error!("excluding duplicate {} {}", ns, handle);
                        report.push(EventKind::Excluded, Some(ns), handle, "duplicate handle");
                    }
                    Err(e) => {
                        let handle = item
                            .get("handle")
                            .and_then(Node::as_i64)
                            .unwrap_or(0) as GLuint;
                        error!("excluding corrupt {} {}: {}", ns, handle, e);
                        report.push(EventKind::Excluded, Some(ns), handle, e.to_string());
                    }
                }
            }
        }

        if let Some(item) = node.get("current_vertex_attribs") {
            let mut attribs = CurrentVertexAttribState::default();
            match attribs.deserialize(item, blobs) {
                Ok(()) => {
                    snapshot.current_vertex_attribs = Some(attribs);
                    report.succeeded += 1;
                }
                Err(e) => {
                    error!("excluding corrupt current vertex attributes: {}", e);
                    report.push(EventKind::Excluded, None, 0, e.to_string());
                }
            }
        }

        Ok((snapshot, report))
    }

    pub fn to_json(&self, blobs: &mut dyn BlobStore) -> Result<String, PassError> {
        Ok(document::to_json(&self.to_document(blobs)?)?)
    }

    pub fn from_json(text: &str, blobs: &dyn BlobStore) -> Result<(ContextSnapshot, PassReport), PassError> {
        ContextSnapshot::from_document(&document::from_json(text)?, blobs)
    }

    fn insert(&mut self, ns: Namespace, record: Box<dyn ObjectState>) {
        self.objects.entry(ns).or_insert_with(Vec::new).push(record);
    }

    /// The capabilities of the context this snapshot was captured from.
    pub fn info(&self) -> &ContextInfo {
        &self.info
    }

    pub fn get(&self, ns: Namespace, handle: GLuint) -> Option<&dyn ObjectState> {
        self.objects
            .get(&ns)?
            .iter()
            .find(|r| r.recorded_handle() == handle)
            .map(|r| &**r)
    }

    /// The records in `ns`, in capture order.
    pub fn records(&self, ns: Namespace) -> impl Iterator<Item = &dyn ObjectState> {
        self.objects
            .get(&ns)
            .into_iter()
            .flat_map(|records| records.iter().map(|r| &**r))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Namespace, &dyn ObjectState)> {
        self.objects
            .iter()
            .flat_map(|(&ns, records)| records.iter().map(move |r| (ns, &**r)))
    }

    /// The number of object records, not counting the current vertex
    /// attributes.
    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_vertex_attribs(&self) -> Option<&CurrentVertexAttribState> {
        self.current_vertex_attribs.as_ref()
    }
}

#[test]
fn test_restore_order_covers_references() {
    // Every namespace a kind can refer to must be restored before it.
    let refers_to = [
        (Namespace::Programs, Namespace::Shaders),
        (Namespace::Pipelines, Namespace::Programs),
        (Namespace::Framebuffers, Namespace::Textures),
        (Namespace::Framebuffers, Namespace::RenderBuffers),
        (Namespace::VertexArrays, Namespace::Buffers),
    ];
    let position = |ns| RESTORE_ORDER.iter().position(|&o| o == ns).unwrap();
    for &(from, to) in refers_to.iter() {
        assert!(position(to) < position(from), "{} before {}", to, from);
    }
    for &ns in Namespace::ALL.iter() {
        assert!(CAPTURE_ORDER.contains(&ns));
        assert!(RESTORE_ORDER.contains(&ns));
    }
}

#[test]
fn test_document_sections() {
    use crate::blob::MemoryBlobs;

    let text = r#"{
        "format_version": 1,
        "context_info": { "limits": { "max_vertex_attribs": 2 }, "extensions": [] },
        "current_vertex_attribs": { "attribs": [[0, 0, 0, 1], [1, 2, 3, 4]] },
        "objects": {
            "queries": [
                { "handle": 4, "target": "GL_SAMPLES_PASSED", "has_been_begun": true, "prev_result": 12 },
                { "handle": 4, "target": "GL_TIME_ELAPSED", "has_been_begun": false },
                { "handle": 5, "target": "GL_TEXTURE_2D", "has_been_begun": false },
                { "handle": 6, "target": "GL_NONE", "has_been_begun": false }
            ],
            "display_lists": [{ "handle": 1 }]
        }
    }"#;
    let blobs = MemoryBlobs::new();
    let (snapshot, report) = ContextSnapshot::from_json(text, &blobs).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get(Namespace::Queries, 4).map(|r| r.target()), Some(gl::SAMPLES_PASSED));
    assert!(snapshot.get(Namespace::Queries, 5).is_none());
    assert!(report.has(EventKind::Excluded, Some(Namespace::Queries), 4));
    assert!(report.has(EventKind::Excluded, Some(Namespace::Queries), 5));
    assert_eq!(snapshot.current_vertex_attribs().map(|a| a.attribs().len()), Some(2));

    let too_new = text.replace("\"format_version\": 1", "\"format_version\": 2");
    assert!(matches!(
        ContextSnapshot::from_json(&too_new, &blobs),
        Err(PassError::Document(DocumentError::Version(2)))
    ));
}
