//! Per-node accumulator sets and their dependency folding rules.
//!
//! Two profiles share the same primitives. [`Profile::ContextIncludes`]
//! keeps a `context` and an `includes` accumulator plus `self_*` twins that
//! never absorb dependencies. [`Profile::StructureContent`] splits the
//! command shape (`structure`) from literal data (`content`), each with an
//! `include_*` variant carrying what includes contribute.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{HashSignature, HashValue, combine};
use crate::diagnostics::{DebugContext, DebugEvent, DebugNodeId};
use crate::expr::Expression;

/// Accumulation scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// `context` and `includes`, with dependency-free `self_*` variants.
    ContextIncludes,
    /// `structure` and `content`, with `include_*` variants.
    #[default]
    StructureContent,
}

impl Profile {
    /// Accumulator names in [`NodeSignatures::parts`] order.
    #[must_use]
    pub const fn part_names(self) -> [&'static str; 4] {
        match self {
            Self::ContextIncludes => ["context", "includes", "self_context", "self_includes"],
            Self::StructureContent => {
                ["structure", "include_structure", "content", "include_content"]
            }
        }
    }
}

impl EdgeKind {
    /// Lower-case name used in provenance reasons.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Input => "input",
            Self::Include => "include",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContextIncludes => "context-includes",
            Self::StructureContent => "structure-content",
        })
    }
}

/// Relationship between a node and a dependency being folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The dependency is part of the node's build command.
    Command,
    /// The dependency is an input the node is built from.
    Input,
    /// The dependency is reached through an include.
    Include,
}

/// Finalised signatures of a [`Profile::ContextIncludes`] node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextSignatures {
    /// Own command plus dependency contexts.
    pub context: HashSignature,
    /// Include contributions.
    pub includes: HashSignature,
    /// Own command only.
    pub self_context: HashSignature,
    /// Own include data only.
    pub self_includes: HashSignature,
}

/// Finalised signatures of a [`Profile::StructureContent`] node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitSignatures {
    /// Shape of the command.
    pub structure: HashSignature,
    /// Shape contributed through includes.
    pub include_structure: HashSignature,
    /// Literal data.
    pub content: HashSignature,
    /// Literal data contributed through includes.
    pub include_content: HashSignature,
}

/// Finalised signatures of one node under either profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "kebab-case")]
pub enum NodeSignatures {
    /// [`Profile::ContextIncludes`] signatures.
    ContextIncludes(ContextSignatures),
    /// [`Profile::StructureContent`] signatures.
    StructureContent(SplitSignatures),
}

impl NodeSignatures {
    /// Profile the signatures were computed under.
    #[must_use]
    pub const fn profile(&self) -> Profile {
        match self {
            Self::ContextIncludes(_) => Profile::ContextIncludes,
            Self::StructureContent(_) => Profile::StructureContent,
        }
    }

    /// The four signatures, primary one first.
    #[must_use]
    pub const fn parts(&self) -> [HashSignature; 4] {
        match self {
            Self::ContextIncludes(s) => [s.context, s.includes, s.self_context, s.self_includes],
            Self::StructureContent(s) => {
                [s.structure, s.include_structure, s.content, s.include_content]
            }
        }
    }

    /// Rebuild signatures of `profile` from [`NodeSignatures::parts`] order.
    #[must_use]
    pub const fn from_parts(profile: Profile, parts: [HashSignature; 4]) -> Self {
        let [a, b, c, d] = parts;
        match profile {
            Profile::ContextIncludes => Self::ContextIncludes(ContextSignatures {
                context: a,
                includes: b,
                self_context: c,
                self_includes: d,
            }),
            Profile::StructureContent => Self::StructureContent(SplitSignatures {
                structure: a,
                include_structure: b,
                content: c,
                include_content: d,
            }),
        }
    }

    /// Identity of the node including everything it depends on.
    #[must_use]
    pub fn full_uid(&self) -> HashSignature {
        combine(&self.parts())
    }

    /// Identity of the node's own definition.
    #[must_use]
    pub fn self_uid(&self) -> HashSignature {
        match self {
            Self::ContextIncludes(s) => combine(&[s.self_context, s.self_includes]),
            Self::StructureContent(s) => combine(&[s.structure, s.content]),
        }
    }
}

/// A dependency whose position in the edge list carries no meaning.
#[derive(Debug, Clone, Copy)]
pub struct Dependency<'a> {
    /// Node name; the sort key.
    pub name: &'a str,
    /// Edge relationship.
    pub kind: EdgeKind,
    /// The dependency's finished signatures.
    pub signatures: &'a NodeSignatures,
}

#[derive(Debug, Clone)]
struct ContextHashes {
    context: HashValue,
    includes: HashValue,
    self_context: HashValue,
    self_includes: HashValue,
}

#[derive(Debug, Clone)]
struct SplitHashes {
    structure: HashValue,
    include_structure: HashValue,
    content: HashValue,
    include_content: HashValue,
}

#[derive(Debug, Clone)]
enum Accumulators {
    Context(ContextHashes),
    Split(SplitHashes),
}

/// The accumulators of one node while its signature is being computed.
#[derive(Debug, Clone)]
pub struct NodeHashes<'d> {
    node: DebugNodeId,
    ctx: &'d DebugContext,
    accumulators: Accumulators,
}

impl<'d> NodeHashes<'d> {
    /// Empty accumulators of `profile` for `node`.
    #[must_use]
    pub fn new(profile: Profile, node: DebugNodeId, ctx: &'d DebugContext) -> Self {
        let fresh = || HashValue::new(node, ctx);
        let accumulators = match profile {
            Profile::ContextIncludes => Accumulators::Context(ContextHashes {
                context: fresh(),
                includes: fresh(),
                self_context: fresh(),
                self_includes: fresh(),
            }),
            Profile::StructureContent => Accumulators::Split(SplitHashes {
                structure: fresh(),
                include_structure: fresh(),
                content: fresh(),
                include_content: fresh(),
            }),
        };
        Self {
            node,
            ctx,
            accumulators,
        }
    }

    /// Profile of the accumulators.
    #[must_use]
    pub const fn profile(&self) -> Profile {
        match self.accumulators {
            Accumulators::Context(_) => Profile::ContextIncludes,
            Accumulators::Split(_) => Profile::StructureContent,
        }
    }

    /// Fold the node's own command text or shape.
    pub fn add_command(&mut self, bytes: &[u8]) {
        self.add_command_with_reason(bytes, "command");
    }

    /// Fold a compiled command through its stable byte form.
    pub fn add_command_expr(&mut self, expr: &Expression) {
        let mut bytes = Vec::with_capacity(expr.len() * 4);
        expr.stream_repr(|chunk| bytes.extend_from_slice(chunk));
        self.add_command_with_reason(&bytes, "command expression");
    }

    /// Fold the configuration salt into the command shape.
    pub fn salt(&mut self, salt: &str) {
        if !salt.is_empty() {
            self.add_command_with_reason(salt.as_bytes(), "salt");
        }
    }

    fn add_command_with_reason(&mut self, bytes: &[u8], reason: &'static str) {
        let ctx = self.ctx;
        match &mut self.accumulators {
            Accumulators::Context(h) => {
                record(ctx, &mut h.context, "context", bytes, reason);
                record(ctx, &mut h.self_context, "self_context", bytes, reason);
            }
            Accumulators::Split(h) => {
                record(ctx, &mut h.structure, "structure", bytes, reason);
            }
        }
    }

    /// Fold literal data such as file contents or constant values.
    pub fn add_content(&mut self, bytes: &[u8]) {
        let ctx = self.ctx;
        match &mut self.accumulators {
            Accumulators::Context(h) => {
                record(ctx, &mut h.context, "context", bytes, "content");
                record(ctx, &mut h.self_context, "self_context", bytes, "content");
            }
            Accumulators::Split(h) => {
                record(ctx, &mut h.content, "content", bytes, "content");
                record(ctx, &mut h.include_content, "include_content", bytes, "content");
            }
        }
    }

    /// Fold data that only matters to nodes including this one.
    pub fn add_include_data(&mut self, bytes: &[u8]) {
        let ctx = self.ctx;
        match &mut self.accumulators {
            Accumulators::Context(h) => {
                record(ctx, &mut h.includes, "includes", bytes, "include data");
                record(ctx, &mut h.self_includes, "self_includes", bytes, "include data");
            }
            Accumulators::Split(h) => {
                record(ctx, &mut h.include_structure, "include_structure", bytes, "include data");
            }
        }
    }

    /// Fold the signatures of a finished dependency reached over `kind`.
    ///
    /// Signatures computed under another profile are ignored with a
    /// warning.
    pub fn pass_dependency(
        &mut self,
        kind: EdgeKind,
        dependency: DebugNodeId,
        child: &NodeSignatures,
    ) {
        let (node, ctx, profile) = (self.node, self.ctx, self.profile());
        let mut fold = |acc: &mut HashValue, name: &'static str, sig: HashSignature| {
            acc.update_signature(&sig);
            ctx.uid_event(|| DebugEvent::UidDependency {
                node,
                dependency,
                reason: format!("{} dependency", kind.as_str()),
                accumulator: name,
                signature: acc.signature(),
            });
        };
        match (&mut self.accumulators, child) {
            (Accumulators::Context(h), NodeSignatures::ContextIncludes(c)) => match kind {
                EdgeKind::Command | EdgeKind::Input => fold(&mut h.context, "context", c.context),
                EdgeKind::Include => {
                    fold(&mut h.includes, "includes", c.context);
                    fold(&mut h.includes, "includes", c.includes);
                }
            },
            (Accumulators::Split(h), NodeSignatures::StructureContent(c)) => match kind {
                EdgeKind::Command => fold(&mut h.structure, "structure", c.structure),
                EdgeKind::Input => {
                    fold(&mut h.structure, "structure", c.include_structure);
                    fold(&mut h.content, "content", c.content);
                    fold(&mut h.content, "content", c.include_content);
                }
                EdgeKind::Include => {
                    fold(&mut h.include_structure, "include_structure", c.include_structure);
                    fold(&mut h.include_content, "include_content", c.include_content);
                }
            },
            _ => tracing::warn!(
                expected = %profile,
                found = %child.profile(),
                "dependency signatures from another profile ignored"
            ),
        }
    }

    /// Fold dependencies whose discovery order is not meaningful, after
    /// sorting them by name, then edge kind, then signatures.
    pub fn pass_unordered_dependencies(&mut self, dependencies: &[Dependency<'_>]) {
        let ordered = dependencies.iter().sorted_by(|a, b| {
            a.name
                .cmp(b.name)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.signatures.parts().cmp(&b.signatures.parts()))
        });
        for dep in ordered {
            self.pass_dependency(dep.kind, DebugNodeId::new(dep.name, None), dep.signatures);
        }
    }

    /// Current signatures; the accumulators stay usable.
    #[must_use]
    pub fn finish(&self) -> NodeSignatures {
        match &self.accumulators {
            Accumulators::Context(h) => NodeSignatures::ContextIncludes(ContextSignatures {
                context: h.context.signature(),
                includes: h.includes.signature(),
                self_context: h.self_context.signature(),
                self_includes: h.self_includes.signature(),
            }),
            Accumulators::Split(h) => NodeSignatures::StructureContent(SplitSignatures {
                structure: h.structure.signature(),
                include_structure: h.include_structure.signature(),
                content: h.content.signature(),
                include_content: h.include_content.signature(),
            }),
        }
    }
}

fn record(
    ctx: &DebugContext,
    acc: &mut HashValue,
    accumulator: &'static str,
    bytes: &[u8],
    reason: &'static str,
) {
    acc.update_piece(bytes);
    ctx.uid_event(|| DebugEvent::UidUpdate {
        value: acc.id(),
        source: acc.id().node,
        accumulator,
        reason: reason.to_owned(),
        signature: acc.signature(),
    });
}
