//! Ingestion pipeline: OpenAPI document → endpoint records.
//!
//! For one deployment, the pipeline upserts the deployment record and then,
//! for every operation in the document, builds doc text, embeds it, and
//! inserts or refreshes the endpoint keyed by `(base_url, path, method)`.
//!
//! Only the deployment upsert is fatal: it is the first catalog round trip,
//! so a broken connection surfaces there. Every per-operation failure
//! (malformed operation, embedding error, catalog write error) is collected
//! into the [`IngestReport`] and the loop moves on. Each operation's write
//! is independent; there is no multi-operation transaction.

use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::doc_text::{build_doc_text, doc_hash};
use crate::embedding::Embedder;
use crate::models::{
    deployment_name, DeploymentRecord, EndpointKey, EndpointRecord, EndpointUpdate, Stage,
};
use crate::openapi::{OpenApiDoc, RawOperation};
use crate::store::Catalog;

/// Function-type tag recorded when the deploying pipeline gives none.
pub const DEFAULT_FUNCTION_TYPE: &str = "MIXED";

/// Classification facts supplied by the deploying pipeline.
#[derive(Debug, Clone)]
pub struct DeploymentContext {
    pub package_name: String,
    pub base_url: String,
    pub stage: Stage,
    pub function_type: String,
    /// `Some` for project-scoped deployments; public deployments pass `None`.
    pub bot_project_id: Option<String>,
}

impl DeploymentContext {
    pub fn public(package_name: &str, base_url: &str, stage: Stage) -> Self {
        Self {
            package_name: package_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            stage,
            function_type: DEFAULT_FUNCTION_TYPE.to_string(),
            bot_project_id: None,
        }
    }

    pub fn deployment_name(&self) -> String {
        deployment_name(&self.package_name, self.stage)
    }
}

/// Where a single operation's ingestion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidOperation,
    Embedding,
    Store,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::InvalidOperation => "invalid-operation",
            FailureKind::Embedding => "embedding",
            FailureKind::Store => "store",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    pub path: String,
    pub method: String,
    pub kind: FailureKind,
    pub error: String,
}

/// What happened to one successfully ingested operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Written {
    Inserted,
    Updated,
}

/// Aggregate result of ingesting one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub deployment_name: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<OperationFailure>,
}

impl IngestReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: &str, method: &str, outcome: Result<Written, (FailureKind, String)>) {
        self.attempted += 1;
        match outcome {
            Ok(written) => {
                self.succeeded += 1;
                match written {
                    Written::Inserted => self.inserted += 1,
                    Written::Updated => self.updated += 1,
                }
            }
            Err((kind, error)) => self.failures.push(OperationFailure {
                path: path.to_string(),
                method: method.to_string(),
                kind,
                error,
            }),
        }
    }
}

/// Ingest every operation of `doc` into `catalog` for the given deployment.
///
/// Returns `Err` only when the deployment record cannot be written.
pub async fn ingest_document(
    catalog: &dyn Catalog,
    embedder: &dyn Embedder,
    ctx: &DeploymentContext,
    doc: &OpenApiDoc,
) -> Result<IngestReport> {
    let now = now_millis();
    let deployment = DeploymentRecord {
        name: ctx.deployment_name(),
        package_name: ctx.package_name.clone(),
        base_url: ctx.base_url.clone(),
        stage: ctx.stage,
        function_type: ctx.function_type.clone(),
        title: doc.info.title.clone(),
        version: doc.info.version.clone(),
        description: doc.info.description.clone(),
        doc: doc.raw.clone(),
        updated_at: now,
    };
    catalog
        .upsert_deployment(&deployment)
        .await
        .with_context(|| format!("failed to upsert deployment '{}'", deployment.name))?;
    info!(
        deployment = %deployment.name,
        base_url = %ctx.base_url,
        stage = %ctx.stage,
        "deployment recorded"
    );

    let mut report = IngestReport {
        deployment_name: deployment.name,
        ..Default::default()
    };

    for raw in doc.operations() {
        let outcome = ingest_operation(catalog, embedder, ctx, doc, &raw).await;
        match &outcome {
            Ok(written) => debug!(path = raw.path, method = %raw.method, ?written, "endpoint stored"),
            Err((kind, error)) => warn!(
                path = raw.path,
                method = %raw.method,
                %kind,
                error = %error,
                "endpoint ingestion failed"
            ),
        }
        report.record(raw.path, &raw.method, outcome);
    }

    info!(
        deployment = %report.deployment_name,
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed(),
        "ingestion finished"
    );
    Ok(report)
}

async fn ingest_operation(
    catalog: &dyn Catalog,
    embedder: &dyn Embedder,
    ctx: &DeploymentContext,
    doc: &OpenApiDoc,
    raw: &RawOperation<'_>,
) -> Result<Written, (FailureKind, String)> {
    let op = raw
        .decode()
        .map_err(|e| (FailureKind::InvalidOperation, format!("{:#}", e)))?;
    let doc_text = build_doc_text(&ctx.package_name, raw.path, &raw.method, &op);

    let embedding = embedder
        .embed(&doc_text)
        .await
        .map_err(|e| (FailureKind::Embedding, format!("{:#}", e)))?;
    if embedding.is_empty() || embedding.len() != embedder.dims() {
        return Err((
            FailureKind::Embedding,
            format!(
                "embedder {} returned {} dimensions, expected {}",
                embedder.model_name(),
                embedding.len(),
                embedder.dims()
            ),
        ));
    }

    let metadata = json!({
        "function_type": ctx.function_type,
        "operation": raw.value,
        "openapi": doc.raw,
    });
    let hash = doc_hash(&doc_text);
    let key = EndpointKey::new(&ctx.base_url, raw.path, &raw.method);
    let store_err = |e: anyhow::Error| (FailureKind::Store, format!("{:#}", e));

    match catalog.find_endpoint(&key).await.map_err(store_err)? {
        Some(existing) => {
            if existing.doc_hash != hash {
                debug!(path = raw.path, method = %raw.method, "doc text changed");
            }
            // updated_at must advance on every refresh, even within one clock tick.
            let updated_at = now_millis().max(existing.updated_at + 1);
            let update = EndpointUpdate {
                doc_text,
                doc_hash: hash,
                embedding,
                metadata,
                updated_at,
            };
            catalog
                .update_endpoint(&existing.id, &update)
                .await
                .map_err(store_err)?;
            Ok(Written::Updated)
        }
        None => {
            let record = EndpointRecord {
                id: Uuid::new_v4().to_string(),
                base_url: key.base_url,
                endpoint_path: key.endpoint_path,
                http_method: key.http_method,
                bot_project_id: ctx.bot_project_id.clone(),
                is_public: ctx.bot_project_id.is_none(),
                stage: ctx.stage,
                doc_text,
                doc_hash: hash,
                embedding,
                metadata,
                updated_at: now_millis(),
            };
            catalog.insert_endpoint(&record).await.map_err(store_err)?;
            Ok(Written::Inserted)
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
