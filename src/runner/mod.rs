//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! handles command execution.

mod error;

pub use error::RunnerError;

use crate::cli::{Cli, Commands};
use crate::command::{CommandError, CommandNames, CommandSchema, MacroValues, compile, parse};
use crate::config::EngineConfig;
use crate::diagnostics::{DebugContext, DebugNodeId, JsonLinesSink, TracingSink};
use crate::expr::print;
use crate::uid::NodeHashes;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use tracing::debug;

/// Execute the parsed [`Cli`] command, writing results to stdout.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, a command does
/// not parse or compile, or output cannot be written.
pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let schema = config.schema()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Commands::Parse { text } => handle_parse(&mut out, &schema, text),
        Commands::Compile { text, words } => handle_compile(&mut out, &schema, text, *words),
        Commands::Uid {
            provenance,
            commands,
        } => {
            let ctx = provenance_context(&config, provenance.as_deref())?;
            handle_uid(&mut out, &config, &schema, &ctx, commands)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    Ok(EngineConfig::from_path(path)?)
}

/// The provenance context for `uid`: a JSON-lines file when requested,
/// otherwise the tracing sink when the configuration enables any toggle.
fn provenance_context(config: &EngineConfig, path: Option<&Path>) -> Result<DebugContext> {
    let Some(path) = path else {
        return Ok(config.debug_context(TracingSink));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RunnerError::Provenance {
            path: path.to_path_buf(),
            source,
        })?;
    let sink = JsonLinesSink::new(LineWriter::new(file));
    let toggles = config.debug;
    // An explicit log with no toggles set records everything.
    let (uids, properties) = if toggles.any() {
        (toggles.uids, toggles.properties)
    } else {
        (true, true)
    };
    debug!(path = %path.display(), uids, properties, "writing provenance log");
    Ok(DebugContext::new(sink).with_toggles(uids, properties))
}

fn handle_parse(out: &mut impl Write, schema: &CommandSchema, text: &str) -> Result<()> {
    let mut values = MacroValues::new();
    let script = parse(text, schema, &mut values).map_err(CommandError::from)?;
    serde_json::to_writer_pretty(&mut *out, &script).context("serialise syntax tree")?;
    writeln!(out).context("write syntax tree")?;
    Ok(())
}

fn handle_compile(
    out: &mut impl Write,
    schema: &CommandSchema,
    text: &str,
    words: bool,
) -> Result<()> {
    let mut values = MacroValues::new();
    let script = parse(text, schema, &mut values).map_err(CommandError::from)?;
    let expr = compile(&script, schema).map_err(CommandError::from)?;
    let mut rendered = String::new();
    print(
        &mut rendered,
        &expr,
        &CommandNames {
            schema,
            values: &values,
        },
    )
    .context("render expression")?;
    writeln!(out, "{rendered}").context("write expression")?;
    if words {
        let hex: Vec<String> = expr
            .to_words()
            .into_iter()
            .map(|word| format!("{word:08x}"))
            .collect();
        writeln!(out, "{}", hex.join(" ")).context("write expression words")?;
    }
    Ok(())
}

fn handle_uid(
    out: &mut impl Write,
    config: &EngineConfig,
    schema: &CommandSchema,
    ctx: &DebugContext,
    commands: &[String],
) -> Result<()> {
    let names = config.profile.part_names();
    for text in commands {
        let mut values = MacroValues::new();
        let script = parse(text, schema, &mut values)
            .map_err(CommandError::from)
            .with_context(|| format!("command `{text}`"))?;
        let expr = compile(&script, schema)
            .map_err(CommandError::from)
            .with_context(|| format!("command `{text}`"))?;

        let mut hashes = NodeHashes::new(config.profile, DebugNodeId::new(text, None), ctx);
        hashes.salt(&config.uids_salt);
        hashes.add_command_expr(&expr);
        for name in values.var_names() {
            hashes.add_command(name.as_bytes());
        }
        for (_, literal) in values.strings() {
            hashes.add_content(literal.as_bytes());
        }
        let signatures = hashes.finish();

        writeln!(out, "{text}").context("write uid report")?;
        for (name, part) in names.iter().zip(signatures.parts()) {
            writeln!(out, "  {name:<18} {part}").context("write uid report")?;
        }
        writeln!(out, "  {:<18} {}", "full", signatures.full_uid()).context("write uid report")?;
        writeln!(out, "  {:<18} {}", "self", signatures.self_uid()).context("write uid report")?;
    }
    Ok(())
}
