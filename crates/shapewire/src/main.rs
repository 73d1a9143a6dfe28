mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "shapewire", version, about = "Schema checks and routed requests over sockets")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "shapewire",
            "send",
            "/tmp/test.sock",
            "--routes",
            "routes.json",
            "--route",
            "greet",
            "--json",
            "{\"name\":\"ada\"}",
            "--timeout",
            "500ms",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.route, "greet");
                assert_eq!(args.timeout, "500ms");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_document_args() {
        let err = Cli::try_parse_from([
            "shapewire",
            "check",
            "--schema",
            "schema.json",
            "--json",
            "{}",
            "--file",
            "doc.json",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn check_requires_a_document() {
        let err = Cli::try_parse_from(["shapewire", "check", "--schema", "schema.json"])
            .expect_err("missing document should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "shapewire",
            "version",
            "--format",
            "pretty",
            "--log-level",
            "error",
        ])
        .expect("global flags should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert!(matches!(cli.command, Command::Version(_)));
    }

    #[test]
    fn echo_refs_require_routes() {
        let err = Cli::try_parse_from(["shapewire", "echo", "/tmp/e.sock", "--refs", "schemas"])
            .expect_err("--refs without --routes should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
