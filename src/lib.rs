//! Build-command signatures for incremental build graphs.
//!
//! The crate turns build-command text into a compact prefix-encoded
//! [`expr::Expression`], evaluates and partially reduces such expressions,
//! computes per-node content signatures ([`uid`]) that change only when a
//! node or something it depends on changes, and propagates induced
//! properties ([`props`]) between graph nodes with copy-on-write tables.
//!
//! The `buildsig` binary wraps [`runner::run`] to inspect commands from
//! the shell.

pub mod cli;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod expr;
pub mod ids;
pub mod props;
pub mod runner;
pub mod uid;
