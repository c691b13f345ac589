// crates/mindscape-gateway-core/src/result/tests.rs
// ============================================================================
// Module: Tool Result Tests
// Description: Unit tests for backend response normalization.
// Purpose: Pin status inference, error parsing, and output extraction.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Covers the response shapes the backend is known to produce.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use serde_json::Map;
use serde_json::json;

use super::BACKEND_ERROR;
use super::ToolStatus;
use super::UNKNOWN_STATUS;
use super::format_call_result;
use super::format_result;
use super::parse_backend_error;

/// Fixed formatting time used across tests.
const NOW: &str = "2026-01-01T00:00:00Z";

/// Tool name used across tests.
const TOOL: &str = "mindscape_tool_wordpress_list_posts";

#[test]
fn missing_status_without_error_is_completed() {
    let result = format_result(&json!({"outputs": {"count": 3}}), TOOL, NOW);
    assert_eq!(result.status, ToolStatus::Completed);
    assert_eq!(result.outputs["count"], 3);
    assert!(result.error.is_none());
    assert!(result.logs.is_empty());
}

#[test]
fn missing_status_with_error_is_failed() {
    let result = format_result(&json!({"error": "page not found"}), TOOL, NOW);
    assert_eq!(result.status, ToolStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.code, BACKEND_ERROR);
    assert_eq!(error.message, "page not found");
}

#[test]
fn success_false_is_failed() {
    let result = format_result(&json!({"success": false}), TOOL, NOW);
    assert_eq!(result.status, ToolStatus::Failed);
}

#[test]
fn execution_id_without_status_is_pending() {
    let result = format_result(&json!({"execution_id": "exec-42"}), TOOL, NOW);
    assert_eq!(result.status, ToolStatus::Pending);
    assert_eq!(result.outputs["execution_id"], "exec-42");
}

#[test]
fn status_aliases_normalize() {
    for (label, expected) in [
        ("success", ToolStatus::Completed),
        ("ERROR", ToolStatus::Failed),
        ("running", ToolStatus::Pending),
        ("timed_out", ToolStatus::Timeout),
    ] {
        let result = format_result(&json!({"status": label}), TOOL, NOW);
        assert_eq!(result.status, expected, "label {label}");
    }
}

#[test]
fn unrecognized_status_is_failed_with_label() {
    for label in ["cancelled", "rejected"] {
        let result = format_result(&json!({"status": label, "result": {"id": 7}}), TOOL, NOW);
        assert_eq!(result.status, ToolStatus::Failed, "label {label}");
        let error = result.error.unwrap();
        assert_eq!(error.code, UNKNOWN_STATUS);
        assert_eq!(error.details.unwrap()["status"], label);
        assert_eq!(result.outputs["id"], 7);
    }
}

#[test]
fn unrecognized_status_keeps_backend_error() {
    let result = format_result(
        &json!({"status": "aborted", "error": {"code": "QUOTA", "message": "over quota"}}),
        TOOL,
        NOW,
    );
    assert_eq!(result.status, ToolStatus::Failed);
    assert_eq!(result.error.unwrap().code, "QUOTA");
}

#[test]
fn structured_error_keeps_code_and_details() {
    let error = parse_backend_error(&json!({
        "code": 404,
        "detail": "missing",
        "details": {"page_id": 9}
    }))
    .unwrap();
    assert_eq!(error.code, "404");
    assert_eq!(error.message, "missing");
    assert_eq!(error.details, Some(json!({"page_id": 9})));
}

#[test]
fn null_and_false_errors_are_absent() {
    assert!(parse_backend_error(&json!(null)).is_none());
    assert!(parse_backend_error(&json!(false)).is_none());
    assert!(parse_backend_error(&json!("  ")).is_none());
}

#[test]
fn outputs_fall_back_to_result_then_output() {
    let from_result = format_result(&json!({"result": {"id": 1}}), TOOL, NOW);
    assert_eq!(from_result.outputs["id"], 1);
    let from_output = format_result(&json!({"output": "hello"}), TOOL, NOW);
    assert_eq!(from_output.outputs["value"], "hello");
}

#[test]
fn non_object_response_is_wrapped() {
    let result = format_result(&json!([1, 2, 3]), TOOL, NOW);
    assert_eq!(result.status, ToolStatus::Completed);
    assert_eq!(result.outputs["value"], json!([1, 2, 3]));
}

#[test]
fn string_logs_become_info_entries() {
    let result = format_result(
        &json!({"logs": ["started", {"level": "warn", "message": "slow", "timestamp": "t0"}]}),
        TOOL,
        NOW,
    );
    assert_eq!(result.logs.len(), 2);
    assert_eq!(result.logs[0].level, "info");
    assert_eq!(result.logs[0].timestamp, NOW);
    assert_eq!(result.logs[1].level, "warn");
    assert_eq!(result.logs[1].timestamp, "t0");
}

#[test]
fn call_inputs_fill_missing_inputs() {
    let mut inputs = Map::new();
    inputs.insert("page_id".to_string(), json!(7));
    let result = format_call_result(&json!({"status": "ok"}), TOOL, &inputs, NOW);
    assert_eq!(result.inputs, inputs);
    let echoed = format_call_result(&json!({"inputs": {"page_id": 8}}), TOOL, &inputs, NOW);
    assert_eq!(echoed.inputs["page_id"], 8);
}

#[test]
fn metadata_uses_formatting_time() {
    let result = format_result(&json!({"timestamp": "1999-01-01T00:00:00Z"}), TOOL, NOW);
    assert_eq!(result.metadata.timestamp, NOW);
    assert_eq!(result.metadata.tool, TOOL);
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["_metadata"]["timestamp"], NOW);
}
