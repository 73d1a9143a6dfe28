use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use shapewire_channel::{connect, ChannelConfig, ReconnectPolicy, RequestError, Routes};
use tracing::{debug, warn};

use crate::cmd::{load_references, parse_duration, resolve_document, SendArgs};
use crate::exit::{channel_error, request_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_response, OutputFormat};

type Slot = Arc<Mutex<Option<Result<Value, RequestError>>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Result<Value, RequestError>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reconnect quickly: a one-shot client waits on a peer that may still be starting.
fn client_config(timeout: Duration) -> ChannelConfig {
    ChannelConfig {
        reconnect: ReconnectPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(1),
            ..ReconnectPolicy::default()
        },
        request_timeout: Some(timeout),
        ..ChannelConfig::default()
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let routes = Routes::from_file(&args.routes)
        .map_err(|err| channel_error("routes load failed", err))?;
    if !routes.contains(&args.route) {
        return Err(CliError::new(
            USAGE,
            format!(
                "route {} is not defined in {} (known: {})",
                args.route,
                args.routes.display(),
                routes.names().join(", ")
            ),
        ));
    }
    let references = load_references(args.refs.as_deref())?;
    let message = resolve_document(args.json.as_deref(), args.file.as_deref())?;

    let mut channel = connect(&args.path, &routes, &references, client_config(timeout))
        .map_err(|err| channel_error("channel setup failed", err))?;

    let slot: Slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    let outcome = channel
        .send(&args.route, message, move |result| *lock(&sink) = Some(result))
        .map_err(|err| channel_error("send failed", err))?;
    debug!(route = %args.route, ?outcome, "request submitted");

    let driven = channel.run_until(Instant::now() + timeout, |_| lock(&slot).is_some());
    let session = channel.session_id().map(str::to_string);
    let state = channel.state();
    let result = lock(&slot).take();

    let Some(result) = result else {
        channel.close();
        driven.map_err(|err| channel_error("channel failed", err))?;
        return Err(CliError::new(
            TIMEOUT,
            format!("no response within {timeout:?} (channel {state})"),
        ));
    };
    if let Err(err) = &driven {
        debug!(error = %err, "channel reported an error after the response");
    }
    channel.close();

    print_response(&args.route, session.as_deref(), &result, format);
    match result {
        Ok(_) => Ok(SUCCESS),
        Err(err) => {
            warn!(code = %err.code, "request failed");
            Ok(request_error(&err).code)
        }
    }
}
