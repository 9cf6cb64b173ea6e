//! Error types for the command compiler.
//!
//! This submodule isolates derive-macro-affected code to scope lint
//! suppressions narrowly.

// The unused_assignments lint fires on miette/thiserror derive expansions in
// some Rust versions only, so `#[expect]` cannot be used here.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::expr::BuildError;
use crate::ids::IdError;

/// Number of characters of the command kept in [`CommandSyntaxError::snippet`].
pub const SNIPPET_CHARS: usize = 160;

/// Why a command failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxErrorReason {
    /// A quoted string runs to the end of the command.
    #[error("unterminated {quote} quote")]
    UnterminatedQuote {
        /// The opening quote character.
        quote: char,
    },
    /// A backslash ends the command.
    #[error("incomplete escape sequence")]
    IncompleteEscape,
    /// A character that cannot start or continue the current construct.
    #[error("unexpected character `{found}`")]
    UnexpectedChar {
        /// Offending character.
        found: char,
    },
    /// A `${` has no matching `}`.
    #[error("unterminated substitution")]
    UnterminatedSubstitution,
    /// A macro call has no closing parenthesis.
    #[error("unterminated macro call")]
    UnterminatedCall,
    /// A `$` or `${}` without a variable name.
    #[error("empty variable name")]
    EmptyVariableName,
    /// `$NAME(...)` names no declared macro.
    #[error("unknown macro `{name}`")]
    UnknownMacro {
        /// Macro name.
        name: String,
    },
    /// A substitution uses an undeclared modifier.
    #[error("unknown modifier `{name}`")]
    UnknownModifier {
        /// Modifier key.
        name: String,
    },
    /// A modifier receives the wrong number of values.
    #[error("bad modifier argument count for `{name}` (expected {expected}, given {given})")]
    ModifierArity {
        /// Modifier key.
        name: String,
        /// Declared value count.
        expected: usize,
        /// Values supplied.
        given: usize,
    },
    /// A macro call has more positional groups than positional parameters
    /// and no variadic parameter.
    #[error("too many positional arguments for `{name}` (at most {max})")]
    TooManyPositional {
        /// Macro name.
        name: String,
        /// Number of positional parameters.
        max: usize,
    },
    /// A value or variable table is full.
    #[error(transparent)]
    IdOverflow(#[from] IdError),
}

/// A command that cannot be parsed.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid command: {reason}")]
#[diagnostic(code(buildsig::command::syntax))]
pub struct CommandSyntaxError {
    #[source_code]
    src: NamedSource<String>,
    #[label("{reason}")]
    span: SourceSpan,
    snippet: String,
    reason: SyntaxErrorReason,
}

impl CommandSyntaxError {
    pub(crate) fn new(source: &str, start: usize, len: usize, reason: SyntaxErrorReason) -> Self {
        let start = start.min(source.len());
        let len = len.min(source.len() - start);
        Self {
            src: NamedSource::new("command", source.to_owned()),
            span: SourceSpan::new(start.into(), len),
            snippet: source.chars().take(SNIPPET_CHARS).collect(),
            reason,
        }
    }

    /// Why parsing failed.
    #[must_use]
    pub const fn reason(&self) -> &SyntaxErrorReason {
        &self.reason
    }

    /// The beginning of the offending command.
    #[must_use]
    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    /// Byte range of the offending characters.
    #[must_use]
    pub const fn span(&self) -> SourceSpan {
        self.span
    }
}

/// A syntax tree that cannot be lowered.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CompileError {
    /// A parser placeholder reached the lowering.
    #[error("unresolved {what} in syntax tree")]
    #[diagnostic(code(buildsig::command::placeholder))]
    UnresolvedPlaceholder {
        /// Placeholder kind.
        what: &'static str,
    },
    /// The tree calls an undeclared macro.
    #[error("unknown macro `{name}`")]
    #[diagnostic(code(buildsig::command::unknown_macro))]
    UnknownMacro {
        /// Macro name.
        name: String,
    },
    /// The tree uses an undeclared modifier.
    #[error("unknown modifier `{name}`")]
    #[diagnostic(code(buildsig::command::unknown_modifier))]
    UnknownModifier {
        /// Modifier key.
        name: String,
    },
    /// A modifier or macro call has the wrong number of arguments.
    #[error("`{name}` expects {expected} argument(s), given {given}")]
    #[diagnostic(code(buildsig::command::arity))]
    Arity {
        /// Function name.
        name: String,
        /// Declared argument count.
        expected: usize,
        /// Arguments supplied.
        given: usize,
    },
    /// The produced expression is malformed.
    #[error(transparent)]
    #[diagnostic(code(buildsig::command::build))]
    Build(#[from] BuildError),
}

/// Any failure of [`compile_command`](super::compile_command).
#[derive(Debug, Error, Diagnostic)]
pub enum CommandError {
    /// Parsing failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] CommandSyntaxError),
    /// Lowering failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),
}
