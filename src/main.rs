//! Application entry point.
//!
//! Parses command-line arguments and delegates execution to [`runner::run`].

use buildsig::cli::Cli;
use buildsig::command::CommandError;
use buildsig::config::ConfigError;
use buildsig::runner::{self, RunnerError};
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let max_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    fmt().with_writer(io::stderr).with_max_level(max_level).init();
    match runner::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "runner failed");
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Render diagnostics through miette and anything else as a plain chain.
fn report(err: &anyhow::Error) {
    let rendered = if let Some(diag) = err.downcast_ref::<CommandError>() {
        render(diag)
    } else if let Some(diag) = err.downcast_ref::<ConfigError>() {
        render(diag)
    } else if let Some(diag) = err.downcast_ref::<RunnerError>() {
        render(diag)
    } else {
        format!("Error: {err:#}")
    };
    let mut stderr = io::stderr().lock();
    if writeln!(stderr, "{rendered}").is_err() {
        tracing::error!(error = %err, "runner failed");
    }
}

fn render(diag: &dyn miette::Diagnostic) -> String {
    let mut out = String::new();
    let handler =
        miette::GraphicalReportHandler::new_themed(miette::GraphicalTheme::unicode_nocolor());
    if handler.render_report(&mut out, diag).is_err() {
        out = diag.to_string();
    }
    out
}
