// crates/mindscape-gateway-core/src/result.rs
// ============================================================================
// Module: Tool Results
// Description: Uniform result envelope and backend response normalization.
// Purpose: Return one result shape for every call regardless of backend origin.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Backend responses differ in how they report status, errors, outputs and
//! logs. [`format_result`] and [`format_call_result`] normalize any response
//! into a [`ToolResult`]. Error payloads are parsed once at the boundary by
//! [`parse_backend_error`], which accepts a plain string or a structured
//! object.
//!
//! ## Invariants
//! - `inputs` and `outputs` are always objects (possibly empty).
//! - `_metadata.timestamp` is the formatting time supplied by the caller,
//!   never a backend-provided time.
//! - Formatting is pure and idempotent on `status`, `outputs` and `error`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// The MCP tool name could not be decoded.
pub const INVALID_TOOL_NAME: &str = "INVALID_TOOL_NAME";
/// The call arguments are not an object.
pub const INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
/// `workspace_id` is missing or blank.
pub const MISSING_WORKSPACE_ID: &str = "MISSING_WORKSPACE_ID";
/// `inputs` is missing.
pub const MISSING_INPUTS: &str = "MISSING_INPUTS";
/// `inputs` is present but not an object.
pub const INVALID_INPUTS: &str = "INVALID_INPUTS";
/// The identity is internal and cannot be called externally.
pub const TOOL_NOT_EXPOSED: &str = "TOOL_NOT_EXPOSED";
/// The backend failed or returned an error.
pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
/// The backend did not answer in time.
pub const BACKEND_TIMEOUT: &str = "BACKEND_TIMEOUT";
/// The backend reported a status label the gateway does not recognize.
pub const UNKNOWN_STATUS: &str = "UNKNOWN_STATUS";

/// Message used when a backend error object carries no text.
const UNSPECIFIED_BACKEND_ERROR: &str = "backend reported an error";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome status of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Accepted and still running.
    Pending,
    /// Blocked until a confirmation token is supplied.
    ConfirmationRequired,
    /// Did not finish in time.
    Timeout,
}

impl ToolStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::ConfirmationRequired => "confirmation_required",
            Self::Timeout => "timeout",
        }
    }

    /// Parses a backend status label, accepting common aliases.
    #[must_use]
    pub fn from_backend(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "succeeded" | "ok" | "done" => {
                Some(Self::Completed)
            }
            "failed" | "error" | "failure" | "errored" => Some(Self::Failed),
            "pending" | "running" | "queued" | "in_progress" | "accepted" => Some(Self::Pending),
            "confirmation_required" => Some(Self::ConfirmationRequired),
            "timeout" | "timed_out" => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Returns true for statuses reported to MCP clients as errors.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorDetail {
    /// Creates an error without details.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// One log line reported with a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity label.
    pub level: String,
    /// Log text.
    pub message: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Gateway-stamped result metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// MCP tool name the result belongs to.
    pub tool: String,
    /// RFC 3339 formatting time.
    pub timestamp: String,
}

/// Uniform call result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Outcome status.
    pub status: ToolStatus,
    /// Inputs the call ran with.
    pub inputs: Map<String, Value>,
    /// Outputs produced by the call.
    pub outputs: Map<String, Value>,
    /// Error detail for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Log lines in backend order.
    pub logs: Vec<LogEntry>,
    /// Gateway metadata.
    #[serde(rename = "_metadata")]
    pub metadata: ResultMetadata,
}

impl ToolResult {
    /// Builds a locally produced failure.
    #[must_use]
    pub fn failure(tool: &str, error: ErrorDetail, inputs: Map<String, Value>, timestamp: &str) -> Self {
        Self::local(ToolStatus::Failed, tool, Some(error), inputs, timestamp)
    }

    /// Builds a locally produced timeout.
    #[must_use]
    pub fn timeout(tool: &str, error: ErrorDetail, inputs: Map<String, Value>, timestamp: &str) -> Self {
        Self::local(ToolStatus::Timeout, tool, Some(error), inputs, timestamp)
    }

    /// Builds a result without backend involvement.
    fn local(
        status: ToolStatus,
        tool: &str,
        error: Option<ErrorDetail>,
        inputs: Map<String, Value>,
        timestamp: &str,
    ) -> Self {
        Self {
            status,
            inputs,
            outputs: Map::new(),
            error,
            logs: Vec::new(),
            metadata: ResultMetadata {
                tool: tool.to_string(),
                timestamp: timestamp.to_string(),
            },
        }
    }
}

// ============================================================================
// SECTION: Error Parsing
// ============================================================================

/// Parses a backend error payload of any supported shape.
///
/// Strings become messages under [`BACKEND_ERROR`]. Objects contribute
/// `code` (string or number), `message` (or `detail`, or `error`) and
/// `details`. `null` and `false` mean "no error".
#[must_use]
pub fn parse_backend_error(raw: &Value) -> Option<ErrorDetail> {
    match raw {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(ErrorDetail::new(BACKEND_ERROR, text.clone())),
        Value::Object(map) => {
            let code = match map.get("code") {
                Some(Value::String(code)) if !code.trim().is_empty() => code.clone(),
                Some(Value::Number(code)) => code.to_string(),
                _ => BACKEND_ERROR.to_string(),
            };
            let message = ["message", "detail", "error"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .filter(|text| !text.trim().is_empty())
                .unwrap_or(UNSPECIFIED_BACKEND_ERROR)
                .to_string();
            let details = map.get("details").filter(|details| !details.is_null()).cloned();
            Some(ErrorDetail {
                code,
                message,
                details,
            })
        }
        Value::Bool(true) => Some(ErrorDetail::new(BACKEND_ERROR, UNSPECIFIED_BACKEND_ERROR)),
        other => Some(ErrorDetail::new(BACKEND_ERROR, other.to_string())),
    }
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Normalizes a raw backend response.
#[must_use]
pub fn format_result(raw: &Value, tool: &str, timestamp: &str) -> ToolResult {
    format_call_result(raw, tool, &Map::new(), timestamp)
}

/// Normalizes a raw backend response for a call made with `call_inputs`.
///
/// `call_inputs` is used when the response does not echo its inputs.
#[must_use]
pub fn format_call_result(
    raw: &Value,
    tool: &str,
    call_inputs: &Map<String, Value>,
    timestamp: &str,
) -> ToolResult {
    let metadata = ResultMetadata {
        tool: tool.to_string(),
        timestamp: timestamp.to_string(),
    };
    let Value::Object(fields) = raw else {
        let mut outputs = Map::new();
        if !raw.is_null() {
            outputs.insert("value".to_string(), raw.clone());
        }
        return ToolResult {
            status: ToolStatus::Completed,
            inputs: call_inputs.clone(),
            outputs,
            error: None,
            logs: Vec::new(),
            metadata,
        };
    };

    let mut error = fields.get("error").and_then(parse_backend_error);
    let execution_id = fields.get("execution_id").filter(|id| id.is_string() || id.is_number());

    let label = fields.get("status").and_then(Value::as_str).filter(|label| !label.trim().is_empty());
    let status = match label.map(|label| (label, ToolStatus::from_backend(label))) {
        Some((_, Some(status))) => status,
        // Unrecognized labels are never reported as success.
        Some((label, None)) => {
            if error.is_none() {
                let mut detail = ErrorDetail::new(
                    UNKNOWN_STATUS,
                    format!("backend reported unrecognized status `{label}`"),
                );
                detail.details = Some(json!({ "status": label }));
                error = Some(detail);
            }
            ToolStatus::Failed
        }
        None if error.is_some() || fields.get("success") == Some(&Value::Bool(false)) => {
            ToolStatus::Failed
        }
        None if execution_id.is_some() => ToolStatus::Pending,
        None => ToolStatus::Completed,
    };

    let mut outputs = extract_outputs(fields);
    if let Some(execution_id) = execution_id {
        outputs.entry("execution_id").or_insert_with(|| execution_id.clone());
    }

    let inputs = match fields.get("inputs") {
        Some(Value::Object(inputs)) => inputs.clone(),
        _ => call_inputs.clone(),
    };

    let logs = match fields.get("logs") {
        Some(Value::Array(entries)) => {
            entries.iter().map(|entry| parse_log_entry(entry, timestamp)).collect()
        }
        _ => Vec::new(),
    };

    ToolResult {
        status,
        inputs,
        outputs,
        error,
        logs,
        metadata,
    }
}

/// Picks outputs from `outputs`, then `result`, then `output`.
fn extract_outputs(fields: &Map<String, Value>) -> Map<String, Value> {
    let value = ["outputs", "result", "output"]
        .iter()
        .find_map(|key| fields.get(*key).filter(|value| !value.is_null()));
    match value {
        Some(Value::Object(outputs)) => outputs.clone(),
        Some(other) => {
            let mut outputs = Map::new();
            outputs.insert("value".to_string(), other.clone());
            outputs
        }
        None => Map::new(),
    }
}

/// Parses one backend log entry.
fn parse_log_entry(entry: &Value, timestamp: &str) -> LogEntry {
    match entry {
        Value::String(message) => LogEntry {
            level: "info".to_string(),
            message: message.clone(),
            timestamp: timestamp.to_string(),
        },
        Value::Object(map) => {
            let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
            LogEntry {
                level: text("level").unwrap_or_else(|| "info".to_string()),
                message: text("message")
                    .or_else(|| text("msg"))
                    .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
                timestamp: text("timestamp").unwrap_or_else(|| timestamp.to_string()),
            }
        }
        other => LogEntry {
            level: "info".to_string(),
            message: other.to_string(),
            timestamp: timestamp.to_string(),
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
