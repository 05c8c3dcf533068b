//! Canonical documentation text for one OpenAPI operation.
//!
//! The text is what gets embedded, so it must be byte-identical for an
//! unchanged operation: sections appear in a fixed order, absent fields are
//! left out entirely, and schemas are serialized compactly with sorted keys.
//!
//! ```text
//! ENDPOINT_PATH: POST /send-single-email
//! SUMMARY: Send a single email
//! LAMBDA_FUNCTION:
//!   Name: sendSingleEmail
//!   Path: /send-single-email
//!   Method: POST
//!   Summary: Send a single email
//! REQUEST_SCHEMA: {"properties":{...},"type":"object"}
//! RESPONSES:
//! 200 -> {"type":"object"}
//! ```

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::openapi::Operation;

/// Build the doc text for `method path` owned by `package_name`.
pub fn build_doc_text(package_name: &str, path: &str, method: &str, op: &Operation) -> String {
    let method = method.to_ascii_uppercase();
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("ENDPOINT_PATH: {} {}", method, path));
    if let Some(summary) = present(&op.summary) {
        lines.push(format!("SUMMARY: {}", summary));
    }
    if let Some(description) = present(&op.description) {
        lines.push(format!("DESCRIPTION: {}", description));
    }

    lines.push("LAMBDA_FUNCTION:".to_string());
    let name = match present(&op.operation_id) {
        Some(id) => id.to_string(),
        None => fallback_function_name(package_name, &method, path),
    };
    lines.push(format!("  Name: {}", name));
    lines.push(format!("  Path: {}", path));
    lines.push(format!("  Method: {}", method));
    if let Some(description) = present(&op.description) {
        lines.push(format!("  Description: {}", description));
    }
    if let Some(summary) = present(&op.summary) {
        lines.push(format!("  Summary: {}", summary));
    }
    if let Some(instructions) = present(&op.instructions) {
        lines.push(format!("  Instructions: {}", instructions));
    }

    if let Some(schema) = op.request_schema() {
        lines.push(format!("REQUEST_SCHEMA: {}", canonical_json(schema)));
    }

    let responses: Vec<String> = op
        .response_schemas()
        .map(|(status, schema)| format!("{} -> {}", status, canonical_json(schema)))
        .collect();
    if !responses.is_empty() {
        lines.push("RESPONSES:".to_string());
        lines.extend(responses);
    }

    lines.join("\n")
}

/// Function name used when an operation declares no `operationId`.
///
/// `("aws-ses", "POST", "/send-single-email")` → `aws-ses_post_send-single-email`.
pub fn fallback_function_name(package_name: &str, method: &str, path: &str) -> String {
    format!(
        "{}_{}_{}",
        package_name,
        method.to_ascii_lowercase(),
        path.trim_matches('/').replace('/', "_")
    )
}

/// SHA-256 hex digest of a doc text.
pub fn doc_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compact JSON with object keys sorted at every level, independent of
/// whether `serde_json` was built with `preserve_order`.
fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::with_capacity(map.len());
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
