use std::fs;

use shapewire_schema::{Schema, Validator, ValidatorConfig};
use tracing::debug;

use crate::cmd::{load_references, resolve_document, CheckArgs};
use crate::exit::{io_error, schema_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_verdict, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let schema_text = fs::read_to_string(&args.schema)
        .map_err(|err| io_error(&format!("failed reading {}", args.schema.display()), err))?;
    let schema = Schema::from_json_str(&schema_text)
        .map_err(|err| schema_error("schema load failed", err))?;
    let references = load_references(args.refs.as_deref())?;
    let document = resolve_document(args.json.as_deref(), args.file.as_deref())?;

    let validator = Validator::with_config(ValidatorConfig {
        strict_mode: args.strict,
        ..ValidatorConfig::default()
    });
    let verdict = validator
        .check(&document, &schema, &references)
        .map_err(|err| schema_error("check failed", err))?;
    debug!(valid = verdict.is_valid(), fields = schema.len(), "document checked");

    print_verdict(&verdict, format);
    Ok(if verdict.is_valid() {
        SUCCESS
    } else {
        DATA_INVALID
    })
}
