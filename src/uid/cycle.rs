//! One identity for a group of mutually dependent nodes.
//!
//! Members of a dependency cycle cannot finish before each other, so the
//! group is hashed as a whole. Contributions are ordered by signature, which
//! makes the result independent of the member the cycle was entered from.

use tracing::debug;

use super::{HashSignature, HashValue, NodeSignatures, Profile};

#[derive(Debug, Clone)]
struct Contribution {
    signature: HashSignature,
    name: String,
    internal: bool,
}

/// Collects member signatures of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleHasher {
    entries: Vec<Contribution>,
}

impl CycleHasher {
    /// An empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the signature contributed by `name`; `internal` marks an edge
    /// that stays inside the cycle.
    pub fn add(&mut self, signature: HashSignature, name: &str, internal: bool) {
        self.entries.push(Contribution {
            signature,
            name: name.to_owned(),
            internal,
        });
    }

    /// Number of contributions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was contributed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contributing names in signature order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut sorted: Vec<&Contribution> = self.entries.iter().collect();
        sorted.sort_by_key(|entry| (entry.signature, entry.internal));
        sorted.into_iter().map(|entry| entry.name.as_str())
    }

    /// The aggregated signature; empty when nothing was contributed.
    #[must_use]
    pub fn finish(&self) -> HashSignature {
        let mut sorted: Vec<(HashSignature, bool)> = self
            .entries
            .iter()
            .map(|entry| (entry.signature, entry.internal))
            .collect();
        sorted.sort_unstable();
        let mut value = HashValue::detached();
        for (signature, internal) in sorted {
            value.update_signature(&signature);
            value.update([u8::from(internal)]);
        }
        value.signature()
    }
}

/// A cycle member as seen by [`CycleUids::aggregate`].
#[derive(Debug, Clone, Copy)]
pub struct CycleMember<'a> {
    /// Main output name of the member.
    pub name: &'a str,
    /// Signatures computed for the member in isolation.
    pub signatures: NodeSignatures,
    /// Whether the member owns a build command.
    pub has_command: bool,
}

/// Signatures shared by every member of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleUids {
    shared: NodeSignatures,
}

impl CycleUids {
    /// Aggregate `members`. Members computed under a profile other than the
    /// first member's are skipped; `None` when `members` is empty.
    #[must_use]
    pub fn aggregate(members: &[CycleMember<'_>]) -> Option<Self> {
        let profile: Profile = members.first()?.signatures.profile();
        let mut hashers: [CycleHasher; 4] = Default::default();
        for member in members {
            if member.signatures.profile() != profile {
                tracing::warn!(member = member.name, "cycle member from another profile skipped");
                continue;
            }
            for (hasher, signature) in hashers.iter_mut().zip(member.signatures.parts()) {
                hasher.add(signature, member.name, true);
            }
        }
        let parts = hashers.map(|hasher| hasher.finish());
        debug!(members = members.len(), %profile, "aggregated cycle signatures");
        Some(Self {
            shared: NodeSignatures::from_parts(profile, parts),
        })
    }

    /// Signatures common to all members.
    #[must_use]
    pub const fn shared(&self) -> NodeSignatures {
        self.shared
    }

    /// Signatures of member `name`. A member owning a build command gets its
    /// primary signature mixed with its name, so distinct outputs of one
    /// cycle keep distinct identities.
    #[must_use]
    pub fn member(&self, name: &str, has_command: bool) -> NodeSignatures {
        if !has_command {
            return self.shared;
        }
        let mut parts = self.shared.parts();
        let [primary, ..] = &mut parts;
        let mut value = HashValue::detached();
        value.update_signature(primary);
        value.update(name.as_bytes());
        *primary = value.signature();
        NodeSignatures::from_parts(self.shared.profile(), parts)
    }

    /// Signatures of every member, in input order.
    #[must_use]
    pub fn members(&self, members: &[CycleMember<'_>]) -> Vec<NodeSignatures> {
        members
            .iter()
            .map(|member| self.member(member.name, member.has_command))
            .collect()
    }
}
