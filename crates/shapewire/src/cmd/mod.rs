use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::Value;
use shapewire_schema::{builtin, References};

use crate::exit::{io_error, schema_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod check;
#[cfg(unix)]
pub mod echo;
#[cfg(unix)]
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a JSON document against a schema.
    Check(CheckArgs),
    /// Send one request over a channel and print the response.
    Send(SendArgs),
    /// Start an echo server.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Check(args) => check::run(args, format),
        #[cfg(unix)]
        Command::Send(args) => send::run(args, format),
        #[cfg(unix)]
        Command::Echo(args) => echo::run(args),
        #[cfg(not(unix))]
        Command::Send(_) | Command::Echo(_) => Err(CliError::new(
            USAGE,
            "unix domain sockets are not available on this platform",
        )),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema file (an object of field specs).
    #[arg(long, value_name = "FILE")]
    pub schema: PathBuf,
    /// Directory of `<Name>.schema.json` reference schemas.
    #[arg(long, value_name = "DIR")]
    pub refs: Option<PathBuf>,
    /// JSON document.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the document from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Reject fields the schema does not declare.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Routes file (`{name: {request, response}}`).
    #[arg(long, value_name = "FILE")]
    pub routes: PathBuf,
    /// Route to send on.
    #[arg(long)]
    pub route: String,
    /// JSON request message.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the request message from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Directory of `<Name>.schema.json` reference schemas.
    #[arg(long, value_name = "DIR")]
    pub refs: Option<PathBuf>,
    /// How long to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Session id stamped on every response. Default: generated per run.
    #[arg(long)]
    pub session: Option<String>,
    /// Routes file; when given, requests are checked against their route.
    #[arg(long, value_name = "FILE")]
    pub routes: Option<PathBuf>,
    /// Directory of `<Name>.schema.json` reference schemas.
    #[arg(long, value_name = "DIR", requires = "routes")]
    pub refs: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse the `--json` text or read `--file`.
fn resolve_document(json: Option<&str>, file: Option<&Path>) -> CliResult<Value> {
    if let Some(json) = json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    let Some(path) = file else {
        return Err(CliError::new(USAGE, "one of --json or --file is required"));
    };
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("{} is not valid JSON: {err}", path.display()),
        )
    })
}

/// Built-in references plus any `--refs` directory.
fn load_references(dir: Option<&Path>) -> CliResult<References> {
    let mut references = builtin::element_references();
    if let Some(dir) = dir {
        let loaded = References::from_directory(dir)
            .map_err(|err| schema_error("reference schemas failed to load", err))?;
        references.extend(&loaded);
    }
    Ok(references)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
