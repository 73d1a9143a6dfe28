#![cfg(unix)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use shapewire_channel::{
    connect, parse_request, ChannelConfig, ReconnectPolicy, RequestError, ResponseFrame, Routes,
    LOST_CONNECTION,
};
use shapewire_schema::References;
use shapewire_transport::{FrameError, UdsListener};

type Slot = Arc<Mutex<Option<Result<Value, RequestError>>>>;

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "swrt-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn routes() -> Routes {
    Routes::from_json_value(&json!({
        "echo": {
            "request": { "text": "string", "node": { "type": "$NODE", "optional": true } },
            "response": { "text": "string", "node": { "type": "$NODE", "optional": true } }
        }
    }))
    .expect("routes should parse")
}

fn references() -> References {
    let mut references = References::new();
    references
        .add_schema_value(
            "$NODE",
            &json!({ "name": "string", "children": { "type": ["$NODE"], "optional": true } }),
        )
        .expect("reference should parse");
    references
}

fn fast_reconnect() -> ChannelConfig {
    ChannelConfig {
        reconnect: ReconnectPolicy {
            base: Duration::from_millis(20),
            cap: Duration::from_millis(100),
            ..ReconnectPolicy::default()
        },
        request_timeout: Some(Duration::from_secs(5)),
        ..ChannelConfig::default()
    }
}

fn slot() -> (Slot, impl FnOnce(Result<Value, RequestError>) + Send + 'static) {
    let slot: Slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    (slot, move |outcome| *sink.lock().unwrap() = Some(outcome))
}

fn filled(slot: &Slot) -> bool {
    slot.lock().unwrap().is_some()
}

#[test]
fn request_round_trip_over_unix_socket() {
    let dir = temp_dir("echo");
    let sock_path = dir.join("echo.sock");
    let listener = UdsListener::bind(&sock_path).expect("listener should bind");

    let server = thread::spawn(move || {
        let mut conn = listener.accept().expect("listener should accept");
        loop {
            let text = match conn.read_text() {
                Ok(text) => text,
                Err(FrameError::ConnectionClosed) => break,
                Err(err) => panic!("server read failed: {err}"),
            };
            let request = parse_request(&text).expect("request frame should parse");
            assert_eq!(request.routename, "echo");
            let reply = ResponseFrame::message(request.order, "sess-1", request.message);
            conn.write_text(&reply.to_text().unwrap())
                .expect("reply should be written");
        }
    });

    let mut channel = connect(&sock_path, &routes(), &references(), fast_reconnect())
        .expect("channel should build");

    let (first, callback) = slot();
    let tree = json!({
        "text": "hello",
        "node": { "name": "root", "children": [{ "name": "leaf", "children": [] }] }
    });
    channel.send("echo", tree.clone(), callback).expect("send should succeed");

    let done = channel
        .run_until(Instant::now() + Duration::from_secs(5), |_| filled(&first))
        .expect("driver should not fail");
    assert!(done);
    assert_eq!(first.lock().unwrap().take().unwrap().unwrap(), tree);
    assert_eq!(channel.session_id(), Some("sess-1"));

    channel.close();
    drop(channel);
    server.join().expect("server thread should complete");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn lost_connection_fails_in_flight_then_reconnects() {
    let dir = temp_dir("reconnect");
    let sock_path = dir.join("flaky.sock");
    let listener = UdsListener::bind(&sock_path).expect("listener should bind");

    let server = thread::spawn(move || {
        // First connection: swallow one request and hang up.
        {
            let mut conn = listener.accept().expect("first accept");
            conn.read_text().expect("first request");
        }
        // Second connection: answer everything.
        let mut conn = listener.accept().expect("second accept");
        while let Ok(text) = conn.read_text() {
            let request = parse_request(&text).expect("request frame should parse");
            let reply = ResponseFrame::message(request.order, "sess-2", request.message);
            if conn.write_text(&reply.to_text().unwrap()).is_err() {
                break;
            }
        }
    });

    let mut channel = connect(&sock_path, &routes(), &references(), fast_reconnect())
        .expect("channel should build");

    let (first, callback) = slot();
    channel
        .send("echo", json!({ "text": "dropped" }), callback)
        .expect("send should succeed");
    let done = channel
        .run_until(Instant::now() + Duration::from_secs(5), |_| filled(&first))
        .expect("driver should not fail");
    assert!(done);
    let failure = first.lock().unwrap().take().unwrap().unwrap_err();
    assert!(failure.is(LOST_CONNECTION), "{failure}");

    let (second, callback) = slot();
    channel
        .send("echo", json!({ "text": "again" }), callback)
        .expect("send should succeed");
    let done = channel
        .run_until(Instant::now() + Duration::from_secs(5), |_| filled(&second))
        .expect("driver should not fail");
    assert!(done);
    assert_eq!(
        second.lock().unwrap().take().unwrap().unwrap(),
        json!({ "text": "again" })
    );
    assert!(channel.next_order() >= 2);

    channel.close();
    drop(channel);
    server.join().expect("server thread should complete");
    let _ = std::fs::remove_dir_all(&dir);
}
