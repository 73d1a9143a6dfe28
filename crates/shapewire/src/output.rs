use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use shapewire_channel::RequestError;
use shapewire_schema::Verdict;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

pub fn print_verdict(verdict: &Verdict, format: OutputFormat) {
    let violation = verdict.violation();
    let out = CheckOutput {
        valid: verdict.is_valid(),
        path: violation.map(|v| v.path.as_str()),
        reason: violation.map(|v| v.reason.as_str()),
    };
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["RESULT", "PATH", "REASON"]);
            table.add_row(vec![
                if out.valid { "valid" } else { "invalid" }.to_string(),
                out.path.unwrap_or("-").to_string(),
                out.reason.unwrap_or("-").to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match violation {
            None => println!("valid"),
            Some(violation) => println!("invalid at {violation}"),
        },
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    route: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a RequestError>,
}

pub fn print_response(
    route: &str,
    session: Option<&str>,
    outcome: &Result<Value, RequestError>,
    format: OutputFormat,
) {
    let out = ResponseOutput {
        route,
        ok: outcome.is_ok(),
        session,
        message: outcome.as_ref().ok(),
        error: outcome.as_ref().err(),
    };
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ROUTE", "SESSION", "RESULT", "BODY"]);
            let (result, body) = match outcome {
                Ok(message) => ("ok".to_string(), to_json(message)),
                Err(err) => (err.code.clone(), err.message.clone()),
            };
            table.add_row(vec![
                route.to_string(),
                session.unwrap_or("-").to_string(),
                result,
                body,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match outcome {
            Ok(message) => println!(
                "{route} ok session={}\n{}",
                session.unwrap_or("-"),
                serde_json::to_string_pretty(message).unwrap_or_else(|_| "{}".to_string())
            ),
            Err(err) => println!("{route} failed: {err}"),
        },
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
