//! Streaming hash accumulators.

use std::fmt;

use digest::Digest;
use md5::Md5;

use super::HashSignature;
use crate::diagnostics::{DebugContext, DebugNodeId, ValueId};

/// An MD5 accumulator that can be read at any time without being consumed.
#[derive(Clone)]
pub struct HashValue {
    hasher: Md5,
    updated: bool,
    id: ValueId,
}

impl HashValue {
    /// A fresh accumulator owned by `node`, numbered by `ctx`.
    #[must_use]
    pub fn new(node: DebugNodeId, ctx: &DebugContext) -> Self {
        Self {
            hasher: Md5::new(),
            updated: false,
            id: ValueId {
                node,
                seq: ctx.next_seq(),
            },
        }
    }

    /// A fresh accumulator that belongs to no node.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            hasher: Md5::new(),
            updated: false,
            id: ValueId {
                node: DebugNodeId::DETACHED,
                seq: 0,
            },
        }
    }

    /// Absorb raw bytes.
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) {
        self.hasher.update(bytes);
        self.updated = true;
    }

    /// Absorb one piece of a sequence, prefixed with its length so that
    /// adjacent pieces cannot trade bytes.
    pub fn update_piece(&mut self, bytes: &[u8]) {
        let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        self.update(len.to_le_bytes());
        self.update(bytes);
    }

    /// Absorb a finalised signature as its raw bytes.
    pub fn update_signature(&mut self, signature: &HashSignature) {
        self.update(signature.as_bytes());
    }

    /// Signature of everything absorbed so far; [`HashSignature::EMPTY`]
    /// before the first update.
    #[must_use]
    pub fn signature(&self) -> HashSignature {
        if !self.updated {
            return HashSignature::EMPTY;
        }
        HashSignature::from_bytes(self.hasher.clone().finalize().into())
    }

    /// Whether nothing was absorbed yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.updated
    }

    /// Debug identity.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashValue")
            .field("id", &self.id)
            .field("signature", &self.signature())
            .finish()
    }
}

/// Hash `parts` in order into one signature.
#[must_use]
pub fn combine(parts: &[HashSignature]) -> HashSignature {
    let mut value = HashValue::detached();
    for part in parts {
        value.update_signature(part);
    }
    value.signature()
}
