//! Server-sent event parsing for the Firebase streaming REST protocol.

use serde::Deserialize;
use serde_json::Value;

/// One event from a Firebase stream.
#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    /// Replace the data at `path`.
    Put(PathData),
    /// Replace each named child of `path`.
    Patch(PathData),
    /// Connection liveness signal.
    KeepAlive,
    /// The server ended the stream, usually because security rules deny access.
    Cancel(String),
    /// The stream's auth token expired or was revoked.
    AuthRevoked,
}

/// Payload of `put` and `patch` events.
#[derive(Debug, PartialEq, Deserialize)]
pub struct PathData {
    pub path: String,
    pub data: Value,
}

/// Extract a complete SSE event from the buffer.
///
/// Returns `Some(event)` if a complete event was found (and removes it from
/// the buffer), or `None` if no complete event is available yet. Carriage
/// returns are stripped on the way in, so `\n\n` is the only separator.
pub fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<String> {
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..idx + 2).take(idx).collect();
    Some(String::from_utf8_lossy(&event).into_owned())
}

/// Parse an SSE event string into a [`StreamEvent`].
///
/// Returns `None` for blank or unrecognized events.
pub fn parse_sse_event(event: &str) -> Option<Result<StreamEvent, serde_json::Error>> {
    if event.trim().is_empty() {
        return None;
    }

    let mut name = None;
    let mut data_lines = Vec::new();

    for line in event.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    let data = data_lines.join("\n");

    match name? {
        "put" => Some(serde_json::from_str(&data).map(StreamEvent::Put)),
        "patch" => Some(serde_json::from_str(&data).map(StreamEvent::Patch)),
        "keep-alive" => Some(Ok(StreamEvent::KeepAlive)),
        "cancel" => Some(Ok(StreamEvent::Cancel(cancel_reason(&data)))),
        "auth_revoked" => Some(Ok(StreamEvent::AuthRevoked)),
        other => {
            tracing::debug!(event = other, "ignoring unknown stream event");
            None
        }
    }
}

fn cancel_reason(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(reason)) => reason,
        Ok(Value::Null) => "stream cancelled by server".to_string(),
        _ if data.trim().is_empty() => "stream cancelled by server".to_string(),
        _ => data.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extract_sse_event() {
        let mut buffer = b"event: put\ndata: {}\n\nevent: keep-alive\ndata: null\n\n".to_vec();

        let event1 = extract_sse_event(&mut buffer).unwrap();
        assert!(event1.contains("put"));

        let event2 = extract_sse_event(&mut buffer).unwrap();
        assert!(event2.contains("keep-alive"));

        assert!(extract_sse_event(&mut buffer).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_extract_sse_event_incomplete() {
        let mut buffer = b"event: put\ndata: {\"path\"".to_vec();
        assert!(extract_sse_event(&mut buffer).is_none());
        assert_eq!(buffer, b"event: put\ndata: {\"path\"".to_vec());
    }

    #[test]
    fn test_parse_put() {
        let event = "event: put\ndata: {\"path\":\"/\",\"data\":{\"1\":{\"quantity\":2}}}";
        let parsed = parse_sse_event(event).unwrap().unwrap();
        assert_eq!(
            parsed,
            StreamEvent::Put(PathData {
                path: "/".to_string(),
                data: json!({"1": {"quantity": 2}}),
            })
        );
    }

    #[test]
    fn test_parse_patch_without_space() {
        let event = "event:patch\ndata:{\"path\":\"/1\",\"data\":{\"quantity\":3}}";
        let parsed = parse_sse_event(event).unwrap().unwrap();
        assert!(matches!(parsed, StreamEvent::Patch(ref p) if p.path == "/1"));
    }

    #[test]
    fn test_parse_keep_alive_and_auth_revoked() {
        assert_eq!(
            parse_sse_event("event: keep-alive\ndata: null").unwrap().unwrap(),
            StreamEvent::KeepAlive
        );
        assert_eq!(
            parse_sse_event("event: auth_revoked\ndata: credential is no longer valid")
                .unwrap()
                .unwrap(),
            StreamEvent::AuthRevoked
        );
    }

    #[test]
    fn test_parse_cancel_reason() {
        let parsed = parse_sse_event("event: cancel\ndata: \"Permission denied\"")
            .unwrap()
            .unwrap();
        assert_eq!(parsed, StreamEvent::Cancel("Permission denied".to_string()));

        let parsed = parse_sse_event("event: cancel\ndata: null").unwrap().unwrap();
        assert_eq!(
            parsed,
            StreamEvent::Cancel("stream cancelled by server".to_string())
        );
    }

    #[test]
    fn test_parse_bad_put_payload_is_error() {
        let parsed = parse_sse_event("event: put\ndata: {not json").unwrap();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert!(parse_sse_event("").is_none());
        assert!(parse_sse_event("event: rules_debug\ndata: {}").is_none());
    }
}
