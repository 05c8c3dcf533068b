//! SQLite-backed [`Catalog`] implementation.
//!
//! Endpoint embeddings are stored as little-endian f32 BLOBs and ranked in
//! process with cosine similarity, the same brute-force scan the in-memory
//! catalog uses. Filters are pushed down into SQL so only candidate rows are
//! decoded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use api_catalog_core::embedding::{blob_to_vec, vec_to_blob};
use api_catalog_core::models::{
    DeploymentRecord, EndpointKey, EndpointRecord, EndpointSummary, EndpointUpdate, ListFilter,
    RankedEndpoint, Stage,
};
use api_catalog_core::store::{rank_by_similarity, Catalog};

const SUMMARY_COLUMNS: &str =
    "bot_project_id, base_url, endpoint_path, http_method, stage, is_public, updated_at";

/// Shared predicate; each filter binds twice (`? IS NULL OR col = ?`).
const FILTER_CLAUSE: &str = r#"
    (? IS NULL OR bot_project_id = ?)
    AND (? IS NULL OR is_public = ?)
    AND (? IS NULL OR stage = ?)
"#;

/// SQLite implementation of the [`Catalog`] trait.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn candidates(&self, filter: &ListFilter) -> Result<Vec<(EndpointSummary, Vec<f32>)>> {
        let sql = format!(
            "SELECT {}, embedding FROM api_endpoints WHERE {}",
            SUMMARY_COLUMNS, FILTER_CLAUSE
        );
        let stage = filter.stage.map(|s| s.as_str());
        let rows = sqlx::query(&sql)
            .bind(filter.project_id.as_deref())
            .bind(filter.project_id.as_deref())
            .bind(filter.is_public)
            .bind(filter.is_public)
            .bind(stage)
            .bind(stage)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(EndpointSummary, Vec<f32>)> {
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok((summary_from_row(row)?, blob_to_vec(&blob)))
            })
            .collect()
    }
}

fn parse_stage(row: &SqliteRow) -> Result<Stage> {
    let raw: String = row.try_get("stage")?;
    raw.parse::<Stage>()
        .with_context(|| format!("corrupt stage column: {}", raw))
}

fn summary_from_row(row: &SqliteRow) -> Result<EndpointSummary> {
    Ok(EndpointSummary {
        bot_project_id: row.try_get("bot_project_id")?,
        base_url: row.try_get("base_url")?,
        endpoint_path: row.try_get("endpoint_path")?,
        http_method: row.try_get("http_method")?,
        stage: parse_stage(row)?,
        is_public: row.try_get("is_public")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn upsert_deployment(&self, deployment: &DeploymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deployments (name, package_name, base_url, stage, function_type,
                                     title, version, description, doc_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                package_name = excluded.package_name,
                base_url = excluded.base_url,
                stage = excluded.stage,
                function_type = excluded.function_type,
                title = excluded.title,
                version = excluded.version,
                description = excluded.description,
                doc_json = excluded.doc_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&deployment.name)
        .bind(&deployment.package_name)
        .bind(&deployment.base_url)
        .bind(deployment.stage.as_str())
        .bind(&deployment.function_type)
        .bind(&deployment.title)
        .bind(&deployment.version)
        .bind(&deployment.description)
        .bind(deployment.doc.to_string())
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<EndpointRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, base_url, endpoint_path, http_method, bot_project_id, is_public, stage,
                   doc_text, doc_hash, embedding, metadata_json, updated_at
            FROM api_endpoints
            WHERE base_url = ? AND endpoint_path = ? AND http_method = ?
            "#,
        )
        .bind(&key.base_url)
        .bind(&key.endpoint_path)
        .bind(&key.http_method)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let blob: Vec<u8> = row.try_get("embedding")?;
        let metadata_json: String = row.try_get("metadata_json")?;
        let metadata: serde_json::Value = serde_json::from_str(&metadata_json)
            .with_context(|| format!("corrupt metadata_json column for {}", key))?;

        Ok(Some(EndpointRecord {
            id: row.try_get("id")?,
            base_url: row.try_get("base_url")?,
            endpoint_path: row.try_get("endpoint_path")?,
            http_method: row.try_get("http_method")?,
            bot_project_id: row.try_get("bot_project_id")?,
            is_public: row.try_get("is_public")?,
            stage: parse_stage(&row)?,
            doc_text: row.try_get("doc_text")?,
            doc_hash: row.try_get("doc_hash")?,
            embedding: blob_to_vec(&blob),
            metadata,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn insert_endpoint(&self, record: &EndpointRecord) -> Result<()> {
        // A racing writer that inserted the same key first is refreshed, not duplicated.
        sqlx::query(
            r#"
            INSERT INTO api_endpoints (id, base_url, endpoint_path, http_method, bot_project_id,
                                       is_public, stage, doc_text, doc_hash, dims, embedding,
                                       metadata_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(base_url, endpoint_path, http_method) DO UPDATE SET
                doc_text = excluded.doc_text,
                doc_hash = excluded.doc_hash,
                dims = excluded.dims,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json,
                updated_at = MAX(excluded.updated_at, api_endpoints.updated_at + 1)
            "#,
        )
        .bind(&record.id)
        .bind(&record.base_url)
        .bind(&record.endpoint_path)
        .bind(&record.http_method)
        .bind(&record.bot_project_id)
        .bind(record.is_public)
        .bind(record.stage.as_str())
        .bind(&record.doc_text)
        .bind(&record.doc_hash)
        .bind(record.embedding.len() as i64)
        .bind(vec_to_blob(&record.embedding))
        .bind(record.metadata.to_string())
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_endpoint(&self, id: &str, update: &EndpointUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE api_endpoints
            SET doc_text = ?, doc_hash = ?, dims = ?, embedding = ?, metadata_json = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.doc_text)
        .bind(&update.doc_hash)
        .bind(update.embedding.len() as i64)
        .bind(vec_to_blob(&update.embedding))
        .bind(update.metadata.to_string())
        .bind(update.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("no endpoint with id {}", id);
        }
        Ok(())
    }

    async fn list_endpoints(&self, filter: &ListFilter, limit: i64) -> Result<Vec<EndpointSummary>> {
        let sql = format!(
            "SELECT {} FROM api_endpoints WHERE {} ORDER BY updated_at DESC, endpoint_path ASC LIMIT ?",
            SUMMARY_COLUMNS, FILTER_CLAUSE
        );
        let stage = filter.stage.map(|s| s.as_str());
        let rows = sqlx::query(&sql)
            .bind(filter.project_id.as_deref())
            .bind(filter.project_id.as_deref())
            .bind(filter.is_public)
            .bind(filter.is_public)
            .bind(stage)
            .bind(stage)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(summary_from_row).collect()
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
        let candidates = self.candidates(&filter).await?;
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
        let candidates = self.candidates(&filter).await?;
        Ok(rank_by_similarity(query_vec, candidates, k))
    }

    async fn remove_deployment(&self, name: &str) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deployment: Option<(String, String)> =
            sqlx::query_as("SELECT base_url, stage FROM deployments WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((base_url, stage)) = deployment else {
            return Ok(None);
        };

        let removed = sqlx::query("DELETE FROM api_endpoints WHERE base_url = ? AND stage = ?")
            .bind(&base_url)
            .bind(&stage)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM deployments WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn catalog() -> SqliteCatalog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqliteCatalog::new(pool)
    }

    fn record(path: &str, project: Option<&str>, stage: Stage, vector: Vec<f32>) -> EndpointRecord {
        EndpointRecord {
            id: format!("id-{}", path),
            base_url: "https://api.example.com/staging".into(),
            endpoint_path: path.into(),
            http_method: "POST".into(),
            bot_project_id: project.map(str::to_string),
            is_public: project.is_none(),
            stage,
            doc_text: format!("ENDPOINT_PATH: POST {}", path),
            doc_hash: "h".into(),
            embedding: vector,
            metadata: json!({ "function_type": "MIXED" }),
            updated_at: 100,
        }
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let catalog = catalog().await;
        let r = record("/send-single-email", None, Stage::Staging, vec![0.5, -1.0]);
        catalog.insert_endpoint(&r).await.unwrap();

        let found = catalog.find_endpoint(&r.key()).await.unwrap().unwrap();
        assert_eq!(found, r);

        catalog
            .update_endpoint(
                &r.id,
                &EndpointUpdate {
                    doc_text: "new".into(),
                    doc_hash: "h2".into(),
                    embedding: vec![1.0, 1.0],
                    metadata: json!({}),
                    updated_at: 101,
                },
            )
            .await
            .unwrap();
        let found = catalog.find_endpoint(&r.key()).await.unwrap().unwrap();
        assert_eq!(found.id, r.id);
        assert_eq!(found.doc_text, "new");
        assert_eq!(found.embedding, vec![1.0, 1.0]);
        assert_eq!(found.updated_at, 101);

        assert!(catalog
            .update_endpoint("missing", &EndpointUpdate {
                doc_text: String::new(),
                doc_hash: String::new(),
                embedding: vec![],
                metadata: json!({}),
                updated_at: 0,
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_one_row() {
        let catalog = catalog().await;
        let r = record("/a", None, Stage::Prod, vec![1.0]);
        catalog.insert_endpoint(&r).await.unwrap();
        let mut again = r.clone();
        again.id = "other-id".into();
        catalog.insert_endpoint(&again).await.unwrap();

        let rows = catalog.list_endpoints(&ListFilter::default(), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].updated_at > r.updated_at);
        let found = catalog.find_endpoint(&r.key()).await.unwrap().unwrap();
        assert_eq!(found.id, r.id);
    }

    #[tokio::test]
    async fn test_filters_and_ranking() {
        let catalog = catalog().await;
        catalog
            .insert_endpoint(&record("/public", None, Stage::Prod, vec![1.0, 0.0]))
            .await
            .unwrap();
        catalog
            .insert_endpoint(&record("/bot-a", Some("a"), Stage::Prod, vec![0.6, 0.8]))
            .await
            .unwrap();
        catalog
            .insert_endpoint(&record("/bot-b", Some("b"), Stage::Dev, vec![0.0, 1.0]))
            .await
            .unwrap();

        let public = catalog
            .list_endpoints(&ListFilter { is_public: Some(true), ..Default::default() }, 10)
            .await
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].endpoint_path, "/public");

        let dev = catalog
            .list_endpoints(&ListFilter { stage: Some(Stage::Dev), ..Default::default() }, 10)
            .await
            .unwrap();
        assert_eq!(dev.len(), 1);
        assert_eq!(dev[0].bot_project_id.as_deref(), Some("b"));

        let all = catalog.search_global(&[1.0, 0.0], 10, None, false).await.unwrap();
        let paths: Vec<&str> = all.iter().map(|r| r.endpoint.endpoint_path.as_str()).collect();
        assert_eq!(paths, vec!["/public", "/bot-a", "/bot-b"]);
        assert!((all[0].similarity - 1.0).abs() < 1e-6);

        let project = catalog
            .search_by_project(&[1.0, 0.0], "a", 10, Some(Stage::Prod))
            .await
            .unwrap();
        assert_eq!(project.len(), 1);
        let none = catalog
            .search_by_project(&[1.0, 0.0], "a", 10, Some(Stage::Dev))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_remove_deployment() {
        let catalog = catalog().await;
        let deployment = DeploymentRecord {
            name: "aws-ses-staging".into(),
            package_name: "aws-ses".into(),
            base_url: "https://api.example.com/staging".into(),
            stage: Stage::Staging,
            function_type: "MIXED".into(),
            title: Some("AWS SES".into()),
            version: None,
            description: None,
            doc: json!({ "paths": {} }),
            updated_at: 1,
        };
        catalog.upsert_deployment(&deployment).await.unwrap();
        catalog.upsert_deployment(&deployment).await.unwrap();
        catalog
            .insert_endpoint(&record("/a", None, Stage::Staging, vec![1.0]))
            .await
            .unwrap();
        catalog
            .insert_endpoint(&record("/b", None, Stage::Staging, vec![1.0]))
            .await
            .unwrap();

        assert_eq!(catalog.remove_deployment("aws-ses-staging").await.unwrap(), Some(2));
        assert_eq!(catalog.remove_deployment("aws-ses-staging").await.unwrap(), None);
        assert!(catalog
            .list_endpoints(&ListFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_deployment_keeps_other_stage_on_shared_base_url() {
        let catalog = catalog().await;
        for stage in [Stage::Staging, Stage::Dev] {
            catalog
                .upsert_deployment(&DeploymentRecord {
                    name: format!("aws-ses-{}", stage.slug()),
                    package_name: "aws-ses".into(),
                    base_url: "https://api.example.com/staging".into(),
                    stage,
                    function_type: "MIXED".into(),
                    title: None,
                    version: None,
                    description: None,
                    doc: json!({}),
                    updated_at: 1,
                })
                .await
                .unwrap();
        }
        catalog
            .insert_endpoint(&record("/a", None, Stage::Staging, vec![1.0]))
            .await
            .unwrap();
        let mut dev = record("/b", None, Stage::Dev, vec![1.0]);
        dev.id = "id-dev".into();
        catalog.insert_endpoint(&dev).await.unwrap();

        assert_eq!(catalog.remove_deployment("aws-ses-staging").await.unwrap(), Some(1));
        let left = catalog.list_endpoints(&ListFilter::default(), 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].stage, Stage::Dev);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let catalog = catalog().await;
        let r = record("/a", None, Stage::Prod, vec![1.0]);
        catalog.insert_endpoint(&r).await.unwrap();
        sqlx::query("UPDATE api_endpoints SET metadata_json = '{not json'")
            .execute(&catalog.pool)
            .await
            .unwrap();

        let err = catalog.find_endpoint(&r.key()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("corrupt metadata_json"));
    }
}
