//! The subset of an OpenAPI document consumed by ingestion.
//!
//! Paths and status codes are held in `BTreeMap`s so that iteration order,
//! and therefore generated doc text, is stable across runs. Path items are
//! kept as raw JSON: non-method keys such as `parameters` are skipped and
//! each operation is decoded on its own, so one malformed operation does not
//! make the whole document unreadable.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// HTTP methods recognised inside a path item, in iteration order.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const JSON_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaType {
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseObject {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

/// A single OpenAPI operation (`paths[path][method]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
    /// Vendor extension carrying usage instructions for LLM callers.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseObject>,
}

impl Operation {
    /// JSON schema of the `application/json` request body, if declared.
    pub fn request_schema(&self) -> Option<&Value> {
        self.request_body
            .as_ref()
            .and_then(|body| body.content.get(JSON_MEDIA_TYPE))
            .and_then(|media| media.schema.as_ref())
    }

    /// `(status, schema)` for every response with an `application/json` schema.
    pub fn response_schemas(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.responses.iter().filter_map(|(status, response)| {
            response
                .content
                .get(JSON_MEDIA_TYPE)
                .and_then(|media| media.schema.as_ref())
                .map(|schema| (status.as_str(), schema))
        })
    }
}

/// An operation as found in the document, before decoding.
#[derive(Debug, Clone)]
pub struct RawOperation<'a> {
    pub path: &'a str,
    /// Uppercase HTTP verb.
    pub method: String,
    pub value: &'a Value,
}

impl RawOperation<'_> {
    pub fn decode(&self) -> Result<Operation> {
        Operation::deserialize(self.value).with_context(|| {
            format!("invalid operation object at {} {}", self.method, self.path)
        })
    }
}

/// An OpenAPI document as published by a deployment.
#[derive(Debug, Clone)]
pub struct OpenApiDoc {
    pub info: Info,
    pub paths: BTreeMap<String, serde_json::Map<String, Value>>,
    /// The full document, kept verbatim for record metadata.
    pub raw: Value,
}

#[derive(Deserialize)]
struct DocShape {
    #[serde(default)]
    info: Info,
    #[serde(default)]
    paths: BTreeMap<String, serde_json::Map<String, Value>>,
}

impl OpenApiDoc {
    pub fn from_value(raw: Value) -> Result<Self> {
        let shape = DocShape::deserialize(&raw).context("invalid OpenAPI document")?;
        Ok(Self {
            info: shape.info,
            paths: shape.paths,
            raw,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text).context("OpenAPI document is not valid JSON")?;
        Self::from_value(raw)
    }

    /// Every `(path, method)` operation, paths sorted, methods in [`HTTP_METHODS`] order.
    pub fn operations(&self) -> Vec<RawOperation<'_>> {
        let mut ops = Vec::new();
        for (path, item) in &self.paths {
            for method in HTTP_METHODS {
                if let Some(value) = item.get(method) {
                    ops.push(RawOperation {
                        path,
                        method: method.to_ascii_uppercase(),
                        value,
                    });
                }
            }
        }
        ops
    }
}
