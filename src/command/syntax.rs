//! Syntax tree of the command language.
//!
//! A [`Script`] holds commands, a [`Command`] holds shell words
//! ([`Argument`]s) and every word is a run of adjacent [`Term`]s. The tree
//! serialises to JSON for inspection.

use serde::Serialize;

use crate::ids::{ConstId, VarId};

/// A parsed command line: commands separated by `&&`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Script {
    /// Commands in source order.
    pub commands: Vec<Command>,
}

/// One command: its shell words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Command {
    /// Words in source order.
    pub args: Vec<Argument>,
}

/// One shell word: adjacent pieces that concatenate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Argument {
    /// Pieces in source order.
    pub terms: Vec<Term>,
}

impl Argument {
    /// A word made of a single term.
    #[must_use]
    pub fn single(term: Term) -> Self {
        Self { terms: vec![term] }
    }
}

/// A piece of a shell word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    /// An interned literal.
    Const {
        /// Constant id from the value table.
        id: ConstId,
    },
    /// A variable reference such as `$SRC`.
    Var {
        /// Variable id from the value table.
        id: VarId,
    },
    /// A `${...}` substitution.
    Transformation(Transformation),
    /// A macro call with its arguments bound to formal parameters.
    Call(Call),
    /// A bare word inside a call; either a keyword or a literal.
    IdOrString {
        /// The word as written.
        word: String,
    },
    /// A macro call whose arguments are not bound yet.
    Unexpanded(Unexpanded),
}

impl Term {
    /// Whether the term is a parser placeholder that compilation rejects.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::IdOrString { .. } | Self::Unexpanded(_))
    }
}

/// A modifier chain applied to a body, innermost last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transformation {
    /// Modifiers in source order; the first one is applied last.
    pub modifiers: Vec<Modifier>,
    /// Substituted pieces.
    pub body: Vec<Term>,
}

/// One modifier with its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Modifier {
    /// Modifier key.
    pub name: String,
    /// Values; each value is a run of constant and variable pieces.
    pub values: Vec<Vec<Term>>,
}

/// A bound macro call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    /// Macro name.
    pub name: String,
    /// One entry per formal parameter, in declaration order.
    pub params: Vec<BoundParam>,
}

/// The words given to one formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundParam {
    /// Parameter name.
    pub name: String,
    /// Words bound to the parameter; possibly none.
    pub args: Vec<Argument>,
}

/// A macro call as written, before binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unexpanded {
    /// Macro name.
    pub name: String,
    /// Argument groups in source order.
    pub args: Vec<Argument>,
}
