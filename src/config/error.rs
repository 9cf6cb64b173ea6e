//! Error types for configuration loading.
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

use crate::command::SchemaError;

/// Errors raised while loading an [`EngineConfig`](super::EngineConfig).
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// The configuration file cannot be read.
    #[error("cannot read configuration file {path}")]
    #[diagnostic(code(buildsig::config::io))]
    Io {
        /// File that was attempted.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML for this schema.
    #[error("invalid configuration")]
    #[diagnostic(
        code(buildsig::config::parse),
        help("see the [macros] and [modifiers] tables in the documentation")
    )]
    Parse(#[source] toml::de::Error),
    /// The declared macros or modifiers are inconsistent.
    #[error("invalid command schema in configuration")]
    #[diagnostic(code(buildsig::config::schema))]
    Schema {
        /// Macro or modifier being declared.
        name: String,
        /// Underlying failure.
        #[source]
        source: SchemaError,
    },
}
