//! Error types for the runner module.
//!
//! This submodule isolates derive-macro-affected code to scope lint
//! suppressions narrowly.

// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised during command execution.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The provenance log cannot be opened for appending.
    #[error("cannot open provenance log {path}")]
    #[diagnostic(
        code(buildsig::runner::provenance),
        help("check that the parent directory exists and is writable")
    )]
    Provenance {
        /// The path that was attempted.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}
