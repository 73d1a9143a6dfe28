use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use shapewire_channel::{
    parse_request, RequestError, RequestFrame, ResponseFrame, Routes, BACKEND_ERROR,
};
use shapewire_schema::{References, Validator, Verdict};
use shapewire_transport::{FrameConfig, FrameError, FramedStream, UdsListener};
use tracing::{debug, info, warn};

use crate::cmd::{load_references, EchoArgs};
use crate::exit::{channel_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

const ACCEPT_IDLE: Duration = Duration::from_millis(50);
const READ_SLICE: Duration = Duration::from_millis(200);

/// Request checking enabled by `--routes`.
struct RequestCheck {
    routes: Routes,
    references: References,
    validator: Validator,
}

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let check = match &args.routes {
        Some(path) => Some(RequestCheck {
            routes: Routes::from_file(path)
                .map_err(|err| channel_error("routes load failed", err))?,
            references: load_references(args.refs.as_deref())?,
            validator: Validator::new(),
        }),
        None => None,
    };
    let session = args.session.clone().unwrap_or_else(generate_session_id);

    let listener = UdsListener::bind(&args.path)
        .map_err(|err| transport_error("bind failed", err))?
        .with_frame_config(FrameConfig {
            read_timeout: Some(READ_SLICE),
            ..FrameConfig::default()
        });
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("listener setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;
    info!(path = %args.path.display(), %session, "echo server listening");

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(mut conn) => {
                debug!("client connected");
                serve(&mut conn, &running, &session, check.as_ref());
                debug!("client disconnected");
            }
            Err(err) if err.is_would_block() => std::thread::sleep(ACCEPT_IDLE),
            Err(err) => return Err(transport_error("accept failed", err)),
        }
    }

    info!("echo server stopped");
    Ok(SUCCESS)
}

fn serve<S>(
    conn: &mut FramedStream<S>,
    running: &AtomicBool,
    session: &str,
    check: Option<&RequestCheck>,
) where
    S: std::io::Read + std::io::Write,
{
    while running.load(Ordering::SeqCst) {
        let text = match conn.try_read_text() {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(FrameError::ConnectionClosed) => return,
            Err(err) => {
                warn!(error = %err, "dropping client after read failure");
                return;
            }
        };

        let request = match parse_request(&text) {
            Ok(request) => request,
            Err(fault) => {
                warn!(%fault, "ignoring malformed request frame");
                continue;
            }
        };

        let reply = match respond(request, session, check).to_text() {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "failed encoding response");
                continue;
            }
        };
        if let Err(err) = conn.write_text(&reply) {
            warn!(error = %err, "dropping client after write failure");
            return;
        }
    }
}

/// Echo the request message back, or answer with an error when a configured
/// route rejects it.
fn respond(request: RequestFrame, session: &str, check: Option<&RequestCheck>) -> ResponseFrame {
    let RequestFrame {
        routename,
        order,
        message,
        ..
    } = request;

    let Some(check) = check else {
        return ResponseFrame::message(order, session, message);
    };
    let Some(route) = check.routes.get(&routename) else {
        return ResponseFrame::error(
            order,
            session,
            RequestError::invalid_request(format!("unknown route: {routename}")),
        );
    };
    match check
        .validator
        .check(&message, route.request(), &check.references)
    {
        Ok(Verdict::Valid) => ResponseFrame::message(order, session, message),
        Ok(Verdict::Invalid(violation)) => ResponseFrame::error(
            order,
            session,
            RequestError::invalid_request(violation.to_string()),
        ),
        Err(err) => ResponseFrame::error(
            order,
            session,
            RequestError::new(BACKEND_ERROR, err.to_string()),
        ),
    }
}

fn generate_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("echo-{}-{nanos:x}", std::process::id())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
