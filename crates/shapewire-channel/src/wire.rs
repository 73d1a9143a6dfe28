//! Frames exchanged with the backend, one JSON text per transport message.
//!
//! Client to server: `{routename, order, message, sessionid?}`.
//! Server to client: `{order, sessionid, message | error}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolFault, RequestError, BACKEND_ERROR};

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub routename: String,
    pub order: u64,
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessionid: Option<String>,
}

impl RequestFrame {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Parse an inbound request frame (server side).
pub fn parse_request(text: &str) -> Result<RequestFrame, ProtocolFault> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ProtocolFault::NotJson(err.to_string()))?;
    let object = value.as_object().ok_or(ProtocolFault::NotAnObject)?;
    let routename = object
        .get("routename")
        .and_then(Value::as_str)
        .ok_or(ProtocolFault::MissingRoute)?
        .to_string();
    let order = object
        .get("order")
        .and_then(Value::as_u64)
        .ok_or(ProtocolFault::MissingOrder)?;
    let message = match object.get("message") {
        Some(message @ Value::Object(_)) => message.clone(),
        _ => return Err(ProtocolFault::BodyNotObject("message")),
    };
    let sessionid = object
        .get("sessionid")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(RequestFrame {
        routename,
        order,
        message,
        sessionid,
    })
}

/// Outbound response frame (server side).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFrame {
    pub order: u64,
    pub sessionid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
}

impl ResponseFrame {
    pub fn message(order: u64, sessionid: impl Into<String>, message: Value) -> Self {
        Self {
            order,
            sessionid: sessionid.into(),
            message: Some(message),
            error: None,
        }
    }

    pub fn error(order: u64, sessionid: impl Into<String>, error: RequestError) -> Self {
        Self {
            order,
            sessionid: sessionid.into(),
            message: None,
            error: Some(error),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Payload of a validated inbound response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Message(Value),
    Error(RequestError),
}

/// Inbound response that passed structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub order: u64,
    pub session_id: String,
    pub body: ResponseBody,
}

/// Parse and structurally check an inbound response frame.
///
/// `order` must be a non-negative integer, `sessionid` a string, and exactly
/// one of `message`/`error` an object. A null member counts as absent.
pub fn parse_response(text: &str) -> Result<Response, ProtocolFault> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ProtocolFault::NotJson(err.to_string()))?;
    let object = value.as_object().ok_or(ProtocolFault::NotAnObject)?;

    let order = object
        .get("order")
        .and_then(Value::as_u64)
        .ok_or(ProtocolFault::MissingOrder)?;

    let message = present(object, "message");
    let error = present(object, "error");
    let body = match (message, error) {
        (Some(message @ Value::Object(_)), None) => ResponseBody::Message(message.clone()),
        (None, Some(Value::Object(error))) => ResponseBody::Error(backend_error(error)),
        (Some(_), None) => return Err(ProtocolFault::BodyNotObject("message")),
        (None, Some(_)) => return Err(ProtocolFault::BodyNotObject("error")),
        _ => return Err(ProtocolFault::AmbiguousBody),
    };

    let session_id = object
        .get("sessionid")
        .and_then(Value::as_str)
        .ok_or(ProtocolFault::MissingSession)?
        .to_string();

    Ok(Response {
        order,
        session_id,
        body,
    })
}

fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

fn backend_error(error: &Map<String, Value>) -> RequestError {
    match (
        error.get("code").and_then(Value::as_str),
        error.get("message").and_then(Value::as_str),
    ) {
        (Some(code), Some(message)) => RequestError::new(code, message),
        (Some(code), None) => RequestError::new(code, ""),
        _ => RequestError::new(BACKEND_ERROR, ""),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_frame_uses_lowercase_keys_and_omits_missing_session() {
        let frame = RequestFrame {
            routename: "ping".into(),
            order: 3,
            message: json!({ "n": 1 }),
            sessionid: None,
        };
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({ "routename": "ping", "order": 3, "message": { "n": 1 } }));

        let with_session = RequestFrame {
            sessionid: Some("s1".into()),
            ..frame
        };
        let value: Value = serde_json::from_str(&with_session.to_text().unwrap()).unwrap();
        assert_eq!(value["sessionid"], "s1");
    }

    #[test]
    fn parses_message_and_error_responses() {
        let ok = parse_response(r#"{"order":1,"sessionid":"s","message":{"a":1}}"#).unwrap();
        assert_eq!(ok.order, 1);
        assert_eq!(ok.session_id, "s");
        assert_eq!(ok.body, ResponseBody::Message(json!({ "a": 1 })));

        let err = parse_response(
            r#"{"order":2,"sessionid":"s","error":{"code":"notFound","message":"no such user"}}"#,
        )
        .unwrap();
        assert_eq!(
            err.body,
            ResponseBody::Error(RequestError::new("notFound", "no such user"))
        );
    }

    #[test]
    fn malformed_backend_error_becomes_backend_error_code() {
        let err = parse_response(r#"{"order":2,"sessionid":"s","error":{"reason":42}}"#).unwrap();
        assert_eq!(err.body, ResponseBody::Error(RequestError::new(BACKEND_ERROR, "")));
    }

    #[test]
    fn structural_faults() {
        assert!(matches!(parse_response("nope"), Err(ProtocolFault::NotJson(_))));
        assert_eq!(parse_response("[1]"), Err(ProtocolFault::NotAnObject));
        assert_eq!(
            parse_response(r#"{"order":"1","sessionid":"s","message":{}}"#),
            Err(ProtocolFault::MissingOrder)
        );
        assert_eq!(
            parse_response(r#"{"order":-1,"sessionid":"s","message":{}}"#),
            Err(ProtocolFault::MissingOrder)
        );
        assert_eq!(
            parse_response(r#"{"order":1,"message":{}}"#),
            Err(ProtocolFault::MissingSession)
        );
        assert_eq!(
            parse_response(r#"{"order":1,"sessionid":"s"}"#),
            Err(ProtocolFault::AmbiguousBody)
        );
        assert_eq!(
            parse_response(r#"{"order":1,"sessionid":"s","message":{},"error":{}}"#),
            Err(ProtocolFault::AmbiguousBody)
        );
        assert_eq!(
            parse_response(r#"{"order":1,"sessionid":"s","message":[1]}"#),
            Err(ProtocolFault::BodyNotObject("message"))
        );
    }

    #[test]
    fn request_parsing_and_response_serialization() {
        let request =
            parse_request(r#"{"routename":"echo","order":0,"message":{"x":true}}"#).unwrap();
        assert_eq!(request.routename, "echo");
        assert_eq!(request.sessionid, None);
        assert_eq!(
            parse_request(r#"{"order":0,"message":{}}"#),
            Err(ProtocolFault::MissingRoute)
        );

        let reply = ResponseFrame::message(request.order, "s1", request.message.clone());
        let value: Value = serde_json::from_str(&reply.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({ "order": 0, "sessionid": "s1", "message": { "x": true } }));

        let failure = ResponseFrame::error(4, "s1", RequestError::new("busy", "try later"));
        let value: Value = serde_json::from_str(&failure.to_text().unwrap()).unwrap();
        assert_eq!(value["error"], json!({ "code": "busy", "message": "try later" }));
        assert!(value.get("message").is_none());
    }
}
