//! Catalog storage abstraction.
//!
//! The [`Catalog`] trait is the minimum contract the ingestion pipeline and
//! query dispatch need from a persisted endpoint catalog. Backends are
//! injected as `&dyn Catalog`; [`memory::InMemoryCatalog`] is a
//! dependency-free implementation for tests, and the app crate provides a
//! SQLite-backed one.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must enforce uniqueness of `(base_url, endpoint_path, http_method)`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{
    DeploymentRecord, EndpointKey, EndpointRecord, EndpointSummary, EndpointUpdate, ListFilter,
    RankedEndpoint, Stage,
};

/// Persisted catalog of embedded API endpoints.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_deployment`](Catalog::upsert_deployment) | Insert or overwrite a deployment by name |
/// | [`find_endpoint`](Catalog::find_endpoint) | Exact lookup by unique key |
/// | [`insert_endpoint`](Catalog::insert_endpoint) | Insert a new endpoint record |
/// | [`update_endpoint`](Catalog::update_endpoint) | Refresh an endpoint in place |
/// | [`list_endpoints`](Catalog::list_endpoints) | Filtered listing, newest first |
/// | [`search_by_project`](Catalog::search_by_project) | Project-scoped similarity ranking |
/// | [`search_global`](Catalog::search_global) | Global/public similarity ranking |
/// | [`remove_deployment`](Catalog::remove_deployment) | Delete a deployment and its endpoints |
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert or overwrite the deployment keyed by `deployment.name`.
    async fn upsert_deployment(&self, deployment: &DeploymentRecord) -> Result<()>;

    /// Look up an endpoint by its unique key.
    async fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<EndpointRecord>>;

    /// Insert a new endpoint record.
    async fn insert_endpoint(&self, record: &EndpointRecord) -> Result<()>;

    /// Refresh doc text, embedding, metadata, and `updated_at` of endpoint `id`.
    async fn update_endpoint(&self, id: &str, update: &EndpointUpdate) -> Result<()>;

    /// Up to `limit` endpoints matching `filter`, ordered by `updated_at` descending.
    async fn list_endpoints(&self, filter: &ListFilter, limit: i64) -> Result<Vec<EndpointSummary>>;

    /// Top-`k` endpoints of `project_id` by similarity to `query_vec`.
    async fn search_by_project(
        &self,
        query_vec: &[f32],
        project_id: &str,
        k: i64,
        stage: Option<Stage>,
    ) -> Result<Vec<RankedEndpoint>>;

    /// Top-`k` endpoints by similarity to `query_vec`, optionally public only.
    async fn search_global(
        &self,
        query_vec: &[f32],
        k: i64,
        stage: Option<Stage>,
        public_only: bool,
    ) -> Result<Vec<RankedEndpoint>>;

    /// Delete deployment `name` and every endpoint under its base URL and stage.
    ///
    /// Returns the number of endpoint records removed, or `None` when no
    /// deployment with that name exists.
    async fn remove_deployment(&self, name: &str) -> Result<Option<u64>>;
}

/// Rank candidate endpoints by cosine similarity to `query_vec`.
///
/// Ordering is similarity descending, then `updated_at` descending, then
/// path and method ascending, truncated to `k`. Shared by catalog backends
/// that score in process.
pub fn rank_by_similarity(
    query_vec: &[f32],
    candidates: Vec<(EndpointSummary, Vec<f32>)>,
    k: i64,
) -> Vec<RankedEndpoint> {
    let mut ranked: Vec<RankedEndpoint> = candidates
        .into_iter()
        .map(|(endpoint, vector)| RankedEndpoint {
            similarity: cosine_similarity(query_vec, &vector) as f64,
            endpoint,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.endpoint.updated_at.cmp(&a.endpoint.updated_at))
            .then(a.endpoint.endpoint_path.cmp(&b.endpoint.endpoint_path))
            .then(a.endpoint.http_method.cmp(&b.endpoint.http_method))
    });
    ranked.truncate(k.max(0) as usize);
    ranked
}
