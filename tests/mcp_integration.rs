//! Integration tests for MCP message handling.
//!
//! These tests verify JSON-RPC 2.0 message classification and framing through
//! the public API, using payloads shaped like real server output.

use mcp_probe::mcp::framer::FrameBuffer;
use mcp_probe::mcp::protocol::{ErrorObject, Message, Outcome, RequestId};
use mcp_probe::mcp::types::{CallToolResult, InitializeResult, ListToolsResult};
use serde_json::json;

// =============================================================================
// Message Classification Tests
// =============================================================================

#[test]
fn test_parse_initialize_response() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "rosa-mcp", "version": "0.3.1"}
        }
    }"#;

    let Message::Response(resp) = Message::parse(json).unwrap() else {
        panic!("Expected Response");
    };
    assert_eq!(resp.id, RequestId::Number(1));

    let Outcome::Result(result) = resp.outcome else {
        panic!("Expected result outcome");
    };
    let info: InitializeResult = serde_json::from_value(result).unwrap();
    assert_eq!(info.server_info.unwrap().name, "rosa-mcp");
    assert_eq!(info.protocol_version.as_deref(), Some("2024-11-05"));
}

#[test]
fn test_parse_error_response() {
    let json = r#"{"jsonrpc":"2.0","id":"abc","error":{"code":-32601,"message":"Method not found","data":{"method":"nope"}}}"#;

    let Message::Response(resp) = Message::parse(json).unwrap() else {
        panic!("Expected Response");
    };
    assert_eq!(resp.id, RequestId::String("abc".to_string()));
    match resp.outcome {
        Outcome::Error(ErrorObject { code, message, data }) => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found");
            assert_eq!(data, Some(json!({"method": "nope"})));
        }
        Outcome::Result(_) => panic!("Expected error outcome"),
    }
}

#[test]
fn test_null_result_is_still_a_response() {
    let msg = Message::parse(r#"{"jsonrpc":"2.0","id":4,"result":null}"#).unwrap();
    assert!(matches!(
        msg,
        Message::Response(ref resp) if resp.outcome == Outcome::Result(serde_json::Value::Null)
    ));
}

#[test]
fn test_parse_server_notification() {
    let msg = Message::parse(
        r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#,
    )
    .unwrap();

    assert!(matches!(msg, Message::Notification(_)));
    assert_eq!(msg.method(), Some("notifications/message"));
    assert!(msg.id().is_none());
}

#[test]
fn test_parse_server_request() {
    let msg = Message::parse(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#).unwrap();
    assert!(matches!(msg, Message::Request(_)));
    assert_eq!(msg.id(), Some(&RequestId::String("srv-1".to_string())));
}

#[test]
fn test_rejects_malformed_messages() {
    let invalid = [
        "not json",
        r#"{"jsonrpc":"1.0","id":1,"result":{}}"#,
        r#"{"id":1,"result":{}}"#,
        r#"{"jsonrpc":"2.0","id":1}"#,
        r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#,
        r#"{"jsonrpc":"2.0","result":{}}"#,
        r#"[1, 2, 3]"#,
    ];

    for line in invalid {
        assert!(Message::parse(line).is_err(), "accepted: {line}");
    }
}

// =============================================================================
// Serialisation Tests
// =============================================================================

#[test]
fn test_request_serialisation_is_single_line() {
    let msg = Message::request(
        1,
        "tools/call",
        json!({"name": "rosa_whoami", "arguments": {"note": "multi\nline"}}),
    );
    let text = serde_json::to_string(&msg).unwrap();

    assert!(!text.contains('\n'));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["id"], 1);
    assert_eq!(value["method"], "tools/call");
    assert_eq!(value["params"]["arguments"]["note"], "multi\nline");
}

#[test]
fn test_notification_has_no_id() {
    let msg = Message::notification("notifications/initialized", None);
    let value = serde_json::to_value(&msg).unwrap();

    assert_eq!(value["method"], "notifications/initialized");
    assert!(value.get("id").is_none());
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_server_output_with_noise_and_split_records() {
    let mut buffer = FrameBuffer::new();
    buffer.extend(b"go: downloading github.com/openshift/rosa v1.2.3\n");
    buffer.extend(br#"{"jsonrpc":"2.0","id":2,"res"#);
    assert!(buffer.next_message().is_none());

    buffer.extend(
        br#"ult":{"tools":[{"name":"rosa_whoami","description":"Show the current user"}]}}"#,
    );
    buffer.extend(b"\r\n\n");

    let Some(Message::Response(resp)) = buffer.next_message() else {
        panic!("Expected Response");
    };
    assert_eq!(resp.id, RequestId::Number(2));
    let Outcome::Result(result) = resp.outcome else {
        panic!("Expected result outcome");
    };
    let tools: ListToolsResult = serde_json::from_value(result).unwrap();
    assert_eq!(tools.tools[0].name, "rosa_whoami");
    assert!(buffer.next_message().is_none());
}

#[test]
fn test_tool_error_payload() {
    let result: CallToolResult = serde_json::from_value(json!({
        "content": [
            {"type": "text", "text": "not logged in"},
            {"type": "text", "text": "run `rosa login`"}
        ],
        "isError": true
    }))
    .unwrap();

    assert!(result.is_error);
    assert!(result.text().contains("not logged in"));
    assert!(result.text().contains("run `rosa login`"));
}
