//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect build commands: their syntax trees, compiled expressions and
/// node UIDs.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML) declaring macros, modifiers and the
    /// UID profile.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Print the syntax tree of a command as JSON.
    Parse {
        /// Command text.
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Print the compiled expression of a command.
    Compile {
        /// Command text.
        #[arg(value_name = "TEXT")]
        text: String,

        /// Also print the flat node words in hexadecimal.
        #[arg(long)]
        words: bool,
    },

    /// Print the UIDs of one node per command.
    Uid {
        /// Append the provenance log as JSON lines to this file.
        #[arg(long, value_name = "FILE")]
        provenance: Option<PathBuf>,

        /// Command texts, one node each.
        #[arg(value_name = "TEXT", required = true)]
        commands: Vec<String>,
    },
}
