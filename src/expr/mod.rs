//! Flat, back-reference encoded expression IR.
//!
//! An [`Expression`] is a sequence of 32-bit [`Node`]s in prefix order: a
//! function node is followed by the encodings of its `arity` arguments.
//! Any node may carry the *referenced* flag, in which case its value is also
//! pushed onto a side stack of stores once it is complete; a later
//! [`NodeKind::Backref`] with distance `k` reuses the value stored `k` entries
//! back. Stores are pushed in completion order, so a referenced function is
//! stored after all of its arguments.
//!
//! ```
//! use buildsig::expr::{ExpressionBuilder, evaluate_with};
//! use buildsig::ids::{ConstId, FuncId};
//!
//! let mut builder = ExpressionBuilder::new();
//! builder.call(FuncId::new(0, 2).expect("fits"));
//! builder.constant(ConstId::new(0, 20).expect("fits"));
//! builder.constant(ConstId::new(0, 22).expect("fits"));
//! let expr = builder.finish().expect("complete");
//!
//! let sum = evaluate_with(
//!     &expr,
//!     |c| u64::from(c.index()),
//!     |_| 0,
//!     |_, args| args.iter().sum(),
//! );
//! assert_eq!(sum, 42);
//! ```

mod builder;
mod evaluate;
mod print;
mod reduce;

pub use builder::{BuildError, ExpressionBuilder, Ref};
pub use evaluate::{Evaluator, evaluate, evaluate_from, evaluate_with, visit_fn_args};
pub use print::{Highlight, NameResolver, print, print_highlighted};
pub use reduce::{Reducer, reduce_if};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ConstId, FuncId, PAYLOAD_BITS, PAYLOAD_MASK, VarId};

const TYPE_BITS: u32 = 2;
const TYPE_MASK: u32 = (1 << TYPE_BITS) - 1;
const REFERENCED_BIT: u32 = 1 << TYPE_BITS;
const PAYLOAD_SHIFT: u32 = TYPE_BITS + 1;

const TAG_CONSTANT: u32 = 0;
const TAG_VARIABLE: u32 = 1;
const TAG_FUNCTION: u32 = 2;
const TAG_BACKREF: u32 = 3;

const _: () = assert!(PAYLOAD_SHIFT + PAYLOAD_BITS == u32::BITS);

/// Decoded view of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A constant from a caller-owned value table.
    Constant(ConstId),
    /// A variable resolved at evaluation time.
    Variable(VarId),
    /// A function applied to the following `arity` arguments.
    Function(FuncId),
    /// Reuse of the value stored this many entries back.
    Backref(u32),
}

/// A single 32-bit tagged IR node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(u32);

impl Node {
    const fn pack(tag: u32, payload: u32) -> Self {
        Self(tag | (payload & PAYLOAD_MASK) << PAYLOAD_SHIFT)
    }

    /// A constant node.
    #[must_use]
    pub const fn constant(id: ConstId) -> Self {
        Self::pack(TAG_CONSTANT, id.repr())
    }

    /// A variable node.
    #[must_use]
    pub const fn variable(id: VarId) -> Self {
        Self::pack(TAG_VARIABLE, id.get())
    }

    /// A function head.
    #[must_use]
    pub const fn function(id: FuncId) -> Self {
        Self::pack(TAG_FUNCTION, id.repr())
    }

    /// A back-reference `distance` stores back; `distance` is at least one.
    ///
    /// # Panics
    ///
    /// Panics when `distance` is zero or does not fit the payload.
    #[must_use]
    pub const fn backref(distance: u32) -> Self {
        assert!(
            distance != 0 && distance <= PAYLOAD_MASK,
            "back-reference distance out of range"
        );
        Self::pack(TAG_BACKREF, distance)
    }

    /// Rebuild a node from its raw word.
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    /// The raw word.
    #[must_use]
    pub const fn word(self) -> u32 {
        self.0
    }

    const fn payload(self) -> u32 {
        self.0 >> PAYLOAD_SHIFT
    }

    /// Decode the node.
    #[must_use]
    pub const fn kind(self) -> NodeKind {
        match self.0 & TYPE_MASK {
            TAG_CONSTANT => NodeKind::Constant(ConstId::from_repr(self.payload())),
            TAG_VARIABLE => NodeKind::Variable(VarId::from_repr(self.payload())),
            TAG_FUNCTION => NodeKind::Function(FuncId::from_repr(self.payload())),
            _ => NodeKind::Backref(self.payload()),
        }
    }

    /// Number of arguments following this node; zero for non-functions.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self.kind() {
            NodeKind::Function(func) => func.arity(),
            _ => 0,
        }
    }

    /// Whether the node's value is pushed onto the stores stack.
    #[must_use]
    pub const fn is_referenced(self) -> bool {
        self.0 & REFERENCED_BIT != 0
    }

    /// The same node with the referenced flag set.
    #[must_use]
    pub const fn referenced(self) -> Self {
        Self(self.0 | REFERENCED_BIT)
    }

    /// Replace the node's content with a constant, keeping the referenced flag.
    #[must_use]
    pub const fn assign_constant(self, id: ConstId) -> Self {
        let node = Self::constant(id);
        if self.is_referenced() {
            node.referenced()
        } else {
            node
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.is_referenced() { "&" } else { "" };
        match self.kind() {
            NodeKind::Constant(id) => write!(f, "{mark}C{}:{}", id.storage(), id.index()),
            NodeKind::Variable(id) => write!(f, "{mark}V{}", id.get()),
            NodeKind::Function(id) => write!(f, "{mark}F{}/{}", id.index(), id.arity()),
            NodeKind::Backref(distance) => write!(f, "{mark}B{distance}"),
        }
    }
}

/// Errors found when validating a flat node sequence read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// The sequence has no nodes.
    #[error("expression has no nodes")]
    Empty,
    /// A back-reference points before the first store.
    #[error("back-reference at node {position} reaches {distance} stores back but only {available} exist")]
    DanglingBackref {
        /// Node index of the back-reference.
        position: usize,
        /// Encoded distance.
        distance: u32,
        /// Stores pushed before the node.
        available: usize,
    },
    /// The sequence ends while a function still expects arguments.
    #[error("expression ends with {missing} missing function argument(s)")]
    Truncated {
        /// Number of arguments still outstanding.
        missing: usize,
    },
    /// Nodes follow a complete top-level expression.
    #[error("trailing nodes after position {position}")]
    Trailing {
        /// Index of the first surplus node.
        position: usize,
    },
}

/// An immutable flat expression.
///
/// Serialises as its raw words; deserialising goes through
/// [`Expression::from_words`] and rejects malformed sequences.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<u32>", try_from = "Vec<u32>")]
pub struct Expression {
    nodes: Vec<Node>,
}

impl Expression {
    /// An empty expression.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub(crate) const fn from_nodes_unchecked(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Validate and adopt a flat node sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError`] when the sequence is not a single complete
    /// expression or a back-reference reaches past the first store.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, ExpressionError> {
        let expr = Self { nodes };
        expr.validate()?;
        Ok(expr)
    }

    /// Validate and adopt raw words, as persisted by a cache layer.
    ///
    /// # Errors
    ///
    /// See [`Expression::from_nodes`].
    pub fn from_words(words: &[u32]) -> Result<Self, ExpressionError> {
        Self::from_nodes(words.iter().copied().map(Node::from_word).collect())
    }

    /// Raw words for persistence.
    #[must_use]
    pub fn to_words(&self) -> Vec<u32> {
        self.nodes.iter().map(|node| node.word()).collect()
    }

    /// The node sequence.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the expression has no nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the structural invariants of the encoding.
    ///
    /// # Errors
    ///
    /// See [`Expression::from_nodes`].
    pub fn validate(&self) -> Result<(), ExpressionError> {
        if self.nodes.is_empty() {
            return Err(ExpressionError::Empty);
        }
        // Open calls as (head is referenced, arguments still expected).
        let mut open: Vec<(bool, usize)> = Vec::new();
        let mut stores = 0usize;
        let mut complete = false;
        for (position, node) in self.nodes.iter().enumerate() {
            if complete {
                return Err(ExpressionError::Trailing { position });
            }
            if let NodeKind::Backref(distance) = node.kind()
                && usize::try_from(distance).map_or(true, |d| d == 0 || d > stores)
            {
                return Err(ExpressionError::DanglingBackref {
                    position,
                    distance,
                    available: stores,
                });
            }
            if node.arity() > 0 {
                open.push((node.is_referenced(), node.arity()));
                continue;
            }
            if node.is_referenced() {
                stores += 1;
            }
            complete = true;
            while let Some((referenced, remaining)) = open.last_mut() {
                *remaining -= 1;
                if *remaining > 0 {
                    complete = false;
                    break;
                }
                if *referenced {
                    stores += 1;
                }
                open.pop();
            }
        }
        if complete {
            Ok(())
        } else {
            Err(ExpressionError::Truncated {
                missing: open.iter().map(|(_, remaining)| remaining).sum(),
            })
        }
    }

    /// Stream a stable byte representation, suitable for hashing.
    pub fn stream_repr(&self, mut sink: impl FnMut(&[u8])) {
        for node in &self.nodes {
            sink(&node.word().to_le_bytes());
        }
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub(crate) fn set(&mut self, position: usize, node: Node) {
        if let Some(slot) = self.nodes.get_mut(position) {
            *slot = node;
        }
    }

    pub(crate) fn get(&self, position: usize) -> Option<Node> {
        self.nodes.get(position).copied()
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.nodes).finish()
    }
}

#[cold]
#[track_caller]
pub(crate) fn corrupted(what: &str) -> ! {
    panic!("corrupted expression: {what}")
}

impl From<Expression> for Vec<u32> {
    fn from(expr: Expression) -> Self {
        expr.to_words()
    }
}

impl TryFrom<Vec<u32>> for Expression {
    type Error = ExpressionError;

    fn try_from(words: Vec<u32>) -> Result<Self, Self::Error> {
        Self::from_words(&words)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use rstest::rstest;

    fn konst(index: u32) -> ConstId {
        ConstId::new(0, index).expect("fits")
    }

    fn func(index: u32, arity: usize) -> FuncId {
        FuncId::new(index, arity).expect("fits")
    }

    #[test]
    fn node_round_trips_every_kind() {
        let var = VarId::new(VarId::MAX).expect("fits");
        assert_eq!(Node::constant(konst(5)).kind(), NodeKind::Constant(konst(5)));
        assert_eq!(Node::variable(var).kind(), NodeKind::Variable(var));
        assert_eq!(Node::function(func(9, 3)).kind(), NodeKind::Function(func(9, 3)));
        assert_eq!(Node::backref(4).kind(), NodeKind::Backref(4));
    }

    #[test]
    fn referenced_flag_is_independent_of_payload() {
        let node = Node::function(func(1, 2)).referenced();
        assert!(node.is_referenced());
        assert_eq!(node.arity(), 2);
        let folded = node.assign_constant(konst(3));
        assert!(folded.is_referenced());
        assert_eq!(folded.kind(), NodeKind::Constant(konst(3)));
    }

    #[rstest]
    #[case(vec![Node::constant(konst(1))])]
    #[case(vec![Node::function(func(0, 0))])]
    #[case(vec![
        Node::function(func(0, 2)),
        Node::constant(konst(1)).referenced(),
        Node::backref(1),
    ])]
    #[case(vec![
        Node::function(func(0, 2)),
        Node::function(func(1, 1)).referenced(),
        Node::constant(konst(1)),
        Node::backref(1),
    ])]
    fn validate_accepts_well_formed(#[case] nodes: Vec<Node>) {
        assert!(Expression::from_nodes(nodes).is_ok());
    }

    #[test]
    fn validate_rejects_dangling_backref() {
        let nodes = vec![
            Node::function(func(0, 2)),
            Node::constant(konst(1)),
            Node::backref(1),
        ];
        assert!(matches!(
            Expression::from_nodes(nodes),
            Err(ExpressionError::DanglingBackref { position: 2, .. })
        ));
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![
        Node::function(func(0, 2)),
        Node::constant(konst(1)).referenced(),
        Node::from_word(TAG_BACKREF),
    ])]
    fn validate_rejects_sequences_evaluate_cannot_run(#[case] nodes: Vec<Node>) {
        assert!(Expression::from_nodes(nodes).is_err());
    }

    #[test]
    fn deserialising_validates_words() {
        let good = Expression::from_nodes(vec![
            Node::function(func(0, 2)),
            Node::constant(konst(1)).referenced(),
            Node::backref(1),
        ])
        .expect("valid");
        let json = serde_json::to_string(&good).expect("serialise");
        let back: Expression = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, good);

        let dangling = [
            Node::function(func(0, 2)).word(),
            Node::constant(konst(1)).word(),
            Node::backref(1).word(),
        ];
        let text = serde_json::to_string(&dangling).expect("serialise words");
        assert!(serde_json::from_str::<Expression>(&text).is_err());
        assert!(serde_json::from_str::<Expression>("[]").is_err());
    }

    #[test]
    fn validate_rejects_backref_into_open_function() {
        // The referenced function is not complete when the back-reference runs.
        let nodes = vec![
            Node::function(func(0, 1)).referenced(),
            Node::backref(1),
        ];
        assert!(matches!(
            Expression::from_nodes(nodes),
            Err(ExpressionError::DanglingBackref { .. })
        ));
    }

    #[test]
    fn validate_rejects_truncated_and_trailing() {
        let truncated = vec![Node::function(func(0, 2)), Node::constant(konst(1))];
        assert_eq!(
            Expression::from_nodes(truncated),
            Err(ExpressionError::Truncated { missing: 1 })
        );
        let trailing = vec![Node::constant(konst(1)), Node::constant(konst(2))];
        assert_eq!(
            Expression::from_nodes(trailing),
            Err(ExpressionError::Trailing { position: 1 })
        );
    }

    #[test]
    fn words_round_trip() {
        let nodes = vec![
            Node::function(func(2, 1)),
            Node::variable(VarId::new(3).expect("fits")),
        ];
        let expr = Expression::from_nodes(nodes).expect("valid");
        let words = expr.to_words();
        assert_eq!(Expression::from_words(&words).expect("valid"), expr);
    }
}
