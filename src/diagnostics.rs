//! Provenance logging for UIDs and induced properties.
//!
//! A [`DebugContext`] is handed by reference to the hash engine and the
//! property store. Events are built lazily: when the relevant toggle is off
//! or no sink is installed, the event closure never runs, so a disabled
//! context costs one branch per call site and never changes a signature.
//!
//! # Examples
//! ```
//! use buildsig::diagnostics::{DebugContext, DebugNodeId, MemorySink};
//! use buildsig::uid::{NodeHashes, Profile};
//!
//! let sink = MemorySink::default();
//! let ctx = DebugContext::new(sink.clone());
//! let mut hashes = NodeHashes::new(Profile::StructureContent, DebugNodeId::new("a.o", None), &ctx);
//! hashes.add_command(b"cc a.c");
//! assert!(!sink.events().is_empty());
//! ```

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use digest::Digest;
use md5::Md5;
use serde::Serialize;

use crate::props::PropertyType;
use crate::uid::HashSignature;

/// Stable identity of a graph node in provenance logs: a hash of its name
/// and optional owning-module prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DebugNodeId(HashSignature);

impl DebugNodeId {
    /// Identity of node `name`, optionally scoped to `module`.
    #[must_use]
    pub fn new(name: &str, module: Option<&str>) -> Self {
        let mut hasher = Md5::new();
        if let Some(prefix) = module {
            hasher.update(prefix.as_bytes());
            hasher.update(b"$");
        }
        hasher.update(name.as_bytes());
        Self(HashSignature::from_bytes(hasher.finalize().into()))
    }

    /// Identity used by accumulators that belong to no node.
    pub const DETACHED: Self = Self(HashSignature::EMPTY);
}

impl fmt::Display for DebugNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one hash accumulator: its node and a process-wide sequence
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ValueId {
    /// Owning node.
    pub node: DebugNodeId,
    /// Creation order within the [`DebugContext`].
    pub seq: u64,
}

/// How a property value reached a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionType {
    /// Inherited wholesale from another node's table.
    Copied,
    /// Taken from a specific child node.
    FromNode,
    /// Produced by the node itself.
    Created,
}

/// One provenance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    /// An accumulator absorbed data.
    UidUpdate {
        /// Updated accumulator.
        value: ValueId,
        /// Node whose data caused the update.
        source: DebugNodeId,
        /// Accumulator name within the node's profile.
        accumulator: &'static str,
        /// What was folded in.
        reason: String,
        /// Signature after the update.
        signature: HashSignature,
    },
    /// An accumulator absorbed a dependency's signature.
    UidDependency {
        /// Dependent node.
        node: DebugNodeId,
        /// Dependency node.
        dependency: DebugNodeId,
        /// Edge over which the dependency was folded.
        reason: String,
        /// Accumulator name within the node's profile.
        accumulator: &'static str,
        /// Folded signature.
        signature: HashSignature,
    },
    /// A value was added to an induced property.
    PropertyAdd {
        /// Receiving node.
        node: DebugNodeId,
        /// Property key.
        property: PropertyType,
        /// Added value.
        value: u32,
        /// Whether the value was absent before.
        is_new: bool,
        /// Origin of the value.
        addition: AdditionType,
    },
    /// A property, or the whole table when `property` is absent, was
    /// cleared.
    PropertyClear {
        /// Affected node.
        node: DebugNodeId,
        /// Cleared property.
        property: Option<PropertyType>,
    },
}

/// Destination of provenance events.
pub trait DebugSink {
    /// Record `event`, numbered `seq` within its context.
    fn record(&self, seq: u64, event: &DebugEvent);
}

/// Process-scoped switchboard for provenance logging.
pub struct DebugContext {
    seq: AtomicU64,
    sink: Option<Box<dyn DebugSink + Send + Sync>>,
    uids: bool,
    properties: bool,
}

/// A context that records nothing.
pub static DISABLED: DebugContext = DebugContext::disabled();

impl DebugContext {
    /// A context without a sink.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            seq: AtomicU64::new(0),
            sink: None,
            uids: false,
            properties: false,
        }
    }

    /// A context recording both UID and property events into `sink`.
    #[must_use]
    pub fn new(sink: impl DebugSink + Send + Sync + 'static) -> Self {
        Self {
            seq: AtomicU64::new(0),
            sink: Some(Box::new(sink)),
            uids: true,
            properties: true,
        }
    }

    /// Restrict recording to the selected event families.
    #[must_use]
    pub fn with_toggles(mut self, uids: bool, properties: bool) -> Self {
        self.uids = uids;
        self.properties = properties;
        self
    }

    /// Next sequence number; also used to name hash accumulators.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether UID events reach a sink.
    #[must_use]
    pub const fn uids_enabled(&self) -> bool {
        self.uids && self.sink.is_some()
    }

    /// Whether property events reach a sink.
    #[must_use]
    pub const fn properties_enabled(&self) -> bool {
        self.properties && self.sink.is_some()
    }

    /// Record the UID event built by `event` when UID logging is on.
    pub fn uid_event(&self, event: impl FnOnce() -> DebugEvent) {
        if self.uids {
            self.emit(event);
        }
    }

    /// Record the property event built by `event` when property logging is
    /// on.
    pub fn property_event(&self, event: impl FnOnce() -> DebugEvent) {
        if self.properties {
            self.emit(event);
        }
    }

    fn emit(&self, event: impl FnOnce() -> DebugEvent) {
        if let Some(sink) = &self.sink {
            sink.record(self.next_seq(), &event());
        }
    }
}

impl Default for DebugContext {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for DebugContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugContext")
            .field("seq", &self.seq)
            .field("sink", &self.sink.is_some())
            .field("uids", &self.uids)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Keeps events in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<(u64, DebugEvent)>>>,
}

impl MemorySink {
    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<(u64, DebugEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DebugSink for MemorySink {
    fn record(&self, seq: u64, event: &DebugEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((seq, event.clone()));
    }
}

/// Forwards events to `tracing` at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn record(&self, seq: u64, event: &DebugEvent) {
        tracing::trace!(target: "buildsig::provenance", seq, ?event);
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    seq: u64,
    #[serde(flatten)]
    event: &'a DebugEvent,
}

/// Appends one JSON object per event to a writer.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesSink<W> {
    /// Write events to `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write> DebugSink for JsonLinesSink<W> {
    fn record(&self, seq: u64, event: &DebugEvent) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *out, &JsonRecord { seq, event })
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out));
        if let Err(err) = written {
            tracing::warn!(%err, "provenance event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;

    fn update(seq: u64) -> DebugEvent {
        DebugEvent::UidUpdate {
            value: ValueId {
                node: DebugNodeId::new("n", None),
                seq,
            },
            source: DebugNodeId::new("n", None),
            accumulator: "structure",
            reason: "test".into(),
            signature: HashSignature::EMPTY,
        }
    }

    #[test]
    fn node_identity_depends_on_module_prefix() {
        let bare = DebugNodeId::new("a.o", None);
        assert_eq!(bare, DebugNodeId::new("a.o", None));
        assert_ne!(bare, DebugNodeId::new("a.o", Some("lib")));
    }

    #[test]
    fn disabled_context_never_builds_events() {
        let mut built = false;
        DISABLED.uid_event(|| {
            built = true;
            update(0)
        });
        assert!(!built);
        assert!(!DISABLED.uids_enabled());
    }

    #[test]
    fn toggles_select_event_families() {
        let sink = MemorySink::default();
        let ctx = DebugContext::new(sink.clone()).with_toggles(false, true);
        ctx.uid_event(|| update(1));
        ctx.property_event(|| DebugEvent::PropertyClear {
            node: DebugNodeId::DETACHED,
            property: None,
        });
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events.first(),
            Some((_, DebugEvent::PropertyClear { .. }))
        ));
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.record(3, &update(0));
        sink.record(4, &update(1));
        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines.first().and_then(|v| v.get("event")),
            Some(&serde_json::json!("uid_update"))
        );
        assert_eq!(
            lines.get(1).and_then(|v| v.get("seq")),
            Some(&serde_json::json!(4))
        );
    }
}
