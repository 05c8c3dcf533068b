//! In-memory [`Catalog`] implementation for tests and embedding in other tools.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Guards are taken and released
//! inside each method; none is held across an `.await`. Similarity search
//! is brute-force cosine over every stored vector.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    DeploymentRecord, EndpointKey, EndpointRecord, EndpointSummary, EndpointUpdate, ListFilter,
    RankedEndpoint, Stage,
};

use super::{rank_by_similarity, Catalog};

/// In-memory catalog.
pub struct InMemoryCatalog {
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
    endpoints: RwLock<HashMap<EndpointKey, EndpointRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            deployments: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of every stored endpoint, for assertions.
    pub fn endpoints(&self) -> Vec<EndpointRecord> {
        let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<EndpointRecord> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.key().to_string().cmp(&b.key().to_string()));
        all
    }

    pub fn deployment(&self, name: &str) -> Option<DeploymentRecord> {
        let guard = self.deployments.read().unwrap_or_else(|e| e.into_inner());
        guard.get(name).cloned()
    }

    fn candidates<F>(&self, keep: F) -> Vec<(EndpointSummary, Vec<f32>)>
    where
        F: Fn(&EndpointRecord) -> bool,
    {
        let guard = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        guard
            .values()
            .filter(|r| keep(r))
            .map(|r| (r.summary(), r.embedding.clone()))
            .collect()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn upsert_deployment(&self, deployment: &DeploymentRecord) -> Result<()> {
        let mut guard = self
            .deployments
            .write()
            .map_err(|_| anyhow!("deployment map poisoned"))?;
        guard.insert(deployment.name.clone(), deployment.clone());
        Ok(())
    }

    async fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<EndpointRecord>> {
        let guard = self
            .endpoints
            .read()
            .map_err(|_| anyhow!("endpoint map poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    async fn insert_endpoint(&self, record: &EndpointRecord) -> Result<()> {
        let mut guard = self
            .endpoints
            .write()
            .map_err(|_| anyhow!("endpoint map poisoned"))?;
        let key = record.key();
        if guard.contains_key(&key) {
            bail!("endpoint already exists: {}", key);
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn update_endpoint(&self, id: &str, update: &EndpointUpdate) -> Result<()> {
        let mut guard = self
            .endpoints
            .write()
            .map_err(|_| anyhow!("endpoint map poisoned"))?;
        let record = guard
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("no endpoint with id {}", id))?;
        record.doc_text = update.doc_text.clone();
        record.doc_hash = update.doc_hash.clone();
        record.embedding = update.embedding.clone();
        record.metadata = update.metadata.clone();
        record.updated_at = update.updated_at;
        Ok(())
    }

    async fn list_endpoints(&self, filter: &ListFilter, limit: i64) -> Result<Vec<EndpointSummary>> {
        let mut rows: Vec<EndpointSummary> = self
            .candidates(|r| filter.matches(&r.summary()))
            .into_iter()
            .map(|(summary, _)| summary)
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(a.endpoint_path.cmp(&b.endpoint_path))
        });
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn search_by_project(
        &self,
        query_vec: &[f32],
        project_id: &str,
        k: i64,
        stage: Option<Stage>,
    ) -> Result<Vec<RankedEndpoint>> {
        let filter = ListFilter {
            project_id: Some(project_id.to_string()),
            is_public: None,
            stage,
        };
        let candidates = self.candidates(|r| filter.matches(&r.summary()));
        Ok(rank_by_similarity(query_vec, candidates, k))
    }

    async fn search_global(
        &self,
        query_vec: &[f32],
        k: i64,
        stage: Option<Stage>,
        public_only: bool,
    ) -> Result<Vec<RankedEndpoint>> {
        let filter = ListFilter {
            project_id: None,
            is_public: public_only.then_some(true),
            stage,
        };
        let candidates = self.candidates(|r| filter.matches(&r.summary()));
        Ok(rank_by_similarity(query_vec, candidates, k))
    }

    async fn remove_deployment(&self, name: &str) -> Result<Option<u64>> {
        let removed = {
            let mut guard = self
                .deployments
                .write()
                .map_err(|_| anyhow!("deployment map poisoned"))?;
            guard.remove(name)
        };
        let Some(deployment) = removed else {
            return Ok(None);
        };
        let mut guard = self
            .endpoints
            .write()
            .map_err(|_| anyhow!("endpoint map poisoned"))?;
        let before = guard.len();
        guard.retain(|key, record| {
            key.base_url != deployment.base_url || record.stage != deployment.stage
        });
        Ok(Some((before - guard.len()) as u64))
    }
}
