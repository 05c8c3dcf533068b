//! Query and search dispatch.
//!
//! A [`QueryRequest`] names a [`Scope`], a [`StageFilter`], an optional
//! free-text query, and a result limit. Without query text the request is a
//! metadata listing; with query text the query is embedded and handed to the
//! catalog's project-scoped or global ranking.
//!
//! The positional argument form `<action> [projectId] [stage] [query]` is
//! parsed by [`QueryRequest::from_args`]. A token after the scope that does
//! not start with a quote character is taken as the stage; otherwise it is
//! the query. An explicit stage (the `--stage` flag) turns every remaining
//! positional into query text.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::embedding::Embedder;
use crate::models::{
    EndpointSummary, ListFilter, RankedEndpoint, Scope, StageFilter, UnknownStage,
};
use crate::store::Catalog;

/// Result limit used when none is configured.
pub const DEFAULT_LIMIT: i64 = 10;

/// Invalid query arguments. These never reach the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryArgsError {
    #[error("missing action (expected one of: project, public, all)")]
    MissingAction,
    #[error("missing project ID")]
    MissingProjectId,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error(transparent)]
    UnknownStage(#[from] UnknownStage),
    #[error("limit must be >= 1, got {0}")]
    InvalidLimit(i64),
}

/// A resolved listing or search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub scope: Scope,
    pub stage: StageFilter,
    pub query: Option<String>,
    pub limit: i64,
}

impl QueryRequest {
    /// Parse `<action> ...` positionals, with an optional explicit stage.
    pub fn from_args(
        args: &[String],
        explicit_stage: Option<&str>,
        limit: i64,
    ) -> Result<Self, QueryArgsError> {
        if limit < 1 {
            return Err(QueryArgsError::InvalidLimit(limit));
        }
        let (action, rest) = args.split_first().ok_or(QueryArgsError::MissingAction)?;

        let (scope, rest) = match action.to_ascii_lowercase().as_str() {
            "project" => {
                let (id, rest) = rest
                    .split_first()
                    .filter(|(id, _)| !id.trim().is_empty())
                    .ok_or(QueryArgsError::MissingProjectId)?;
                (Scope::Project(id.clone()), rest)
            }
            "public" => (Scope::Public, rest),
            "all" => (Scope::All, rest),
            _ => return Err(QueryArgsError::UnknownAction(action.clone())),
        };

        let (stage, query_tokens) = match explicit_stage {
            Some(token) => (StageFilter::parse(token)?, rest),
            None => match rest.split_first() {
                Some((first, tail)) if !starts_with_quote(first) => {
                    (StageFilter::parse(first)?, tail)
                }
                _ => (StageFilter::Unspecified, rest),
            },
        };

        let joined = query_tokens.join(" ");
        let query = strip_quotes(&joined);
        Ok(Self {
            scope,
            stage,
            query: (!query.is_empty()).then(|| query.to_string()),
            limit,
        })
    }
}

/// Resolve a scope given as separate fields (HTTP requests, config).
pub fn resolve_scope(action: &str, project_id: Option<&str>) -> Result<Scope, QueryArgsError> {
    match action.trim().to_ascii_lowercase().as_str() {
        "project" => project_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Scope::Project(id.to_string()))
            .ok_or(QueryArgsError::MissingProjectId),
        "public" => Ok(Scope::Public),
        "all" => Ok(Scope::All),
        "" => Err(QueryArgsError::MissingAction),
        other => Err(QueryArgsError::UnknownAction(other.to_string())),
    }
}

fn starts_with_quote(token: &str) -> bool {
    token.starts_with('"') || token.starts_with('\'')
}

/// Trim whitespace and one pair of matching surrounding quotes.
pub fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].trim();
        }
    }
    text
}

/// Output of [`dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "results", rename_all = "snake_case")]
pub enum QueryOutcome {
    Listing(Vec<EndpointSummary>),
    Ranked(Vec<RankedEndpoint>),
}

impl QueryOutcome {
    pub fn len(&self) -> usize {
        match self {
            QueryOutcome::Listing(rows) => rows.len(),
            QueryOutcome::Ranked(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a listing or a semantic search against `catalog`.
///
/// Store and embedding failures propagate; no partial results are built.
pub async fn dispatch(
    catalog: &dyn Catalog,
    embedder: &dyn Embedder,
    req: &QueryRequest,
) -> Result<QueryOutcome> {
    let stage = req.stage.stage();

    let Some(ref query) = req.query else {
        let filter = ListFilter::for_scope(&req.scope, req.stage);
        let rows = catalog
            .list_endpoints(&filter, req.limit)
            .await
            .context("failed to list endpoints")?;
        debug!(count = rows.len(), "listing complete");
        return Ok(QueryOutcome::Listing(rows));
    };

    let query_vec = embedder
        .embed(query)
        .await
        .context("failed to embed query")?;
    debug!(dims = query_vec.len(), model = embedder.model_name(), "query embedded");

    let ranked = match &req.scope {
        Scope::Project(project_id) => {
            catalog
                .search_by_project(&query_vec, project_id, req.limit, stage)
                .await
        }
        Scope::Public => catalog.search_global(&query_vec, req.limit, stage, true).await,
        Scope::All => catalog.search_global(&query_vec, req.limit, stage, false).await,
    }
    .context("similarity search failed")?;

    Ok(QueryOutcome::Ranked(ranked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DeploymentRecord, EndpointKey, EndpointRecord, EndpointUpdate, Stage,
    };
    use crate::store::memory::InMemoryCatalog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn parse(tokens: &[&str]) -> Result<QueryRequest, QueryArgsError> {
        QueryRequest::from_args(&args(tokens), None, DEFAULT_LIMIT)
    }

    #[test]
    fn test_parse_listing_forms() {
        let req = parse(&["project", "my-chatbot"]).unwrap();
        assert_eq!(req.scope, Scope::Project("my-chatbot".into()));
        assert_eq!(req.stage, StageFilter::Unspecified);
        assert_eq!(req.query, None);

        let req = parse(&["project", "my-chatbot", "*"]).unwrap();
        assert_eq!(req.stage, StageFilter::All);
        assert_eq!(req.query, None);

        let req = parse(&["PUBLIC"]).unwrap();
        assert_eq!(req.scope, Scope::Public);
    }

    #[test]
    fn test_parse_quote_sniffing() {
        let req = parse(&["all", "\"send message\""]).unwrap();
        assert_eq!(req.scope, Scope::All);
        assert_eq!(req.stage, StageFilter::Unspecified);
        assert_eq!(req.query.as_deref(), Some("send message"));

        let req = parse(&["project", "bot", "PROD", "'send message'"]).unwrap();
        assert_eq!(req.stage, StageFilter::Only(Stage::Prod));
        assert_eq!(req.query.as_deref(), Some("send message"));
    }

    #[test]
    fn test_parse_explicit_stage_joins_query() {
        let req = QueryRequest::from_args(&args(&["public", "send", "email"]), Some("staging"), 3)
            .unwrap();
        assert_eq!(req.stage, StageFilter::Only(Stage::Staging));
        assert_eq!(req.query.as_deref(), Some("send email"));
        assert_eq!(req.limit, 3);

        let req = QueryRequest::from_args(&args(&["all", "send message"]), Some("*"), 10).unwrap();
        assert_eq!(req.stage, StageFilter::All);
        assert_eq!(req.query.as_deref(), Some("send message"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(&[]), Err(QueryArgsError::MissingAction));
        assert_eq!(parse(&["project"]), Err(QueryArgsError::MissingProjectId));
        assert_eq!(
            parse(&["everything"]),
            Err(QueryArgsError::UnknownAction("everything".into()))
        );
        assert!(matches!(
            parse(&["all", "send message"]),
            Err(QueryArgsError::UnknownStage(_))
        ));
        assert_eq!(
            QueryRequest::from_args(&args(&["all"]), None, 0),
            Err(QueryArgsError::InvalidLimit(0))
        );
        assert_eq!(
            QueryRequest::from_args(&args(&["all", "*"]), None, -3),
            Err(QueryArgsError::InvalidLimit(-3))
        );
    }

    #[test]
    fn test_resolve_scope() {
        assert_eq!(
            resolve_scope("Project", Some(" bot ")),
            Ok(Scope::Project("bot".into()))
        );
        assert_eq!(resolve_scope("project", Some("")), Err(QueryArgsError::MissingProjectId));
        assert_eq!(resolve_scope("public", Some("ignored")), Ok(Scope::Public));
        assert_eq!(resolve_scope("", None), Err(QueryArgsError::MissingAction));
        assert!(matches!(resolve_scope("mine", None), Err(QueryArgsError::UnknownAction(_))));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"a b\""), "a b");
        assert_eq!(strip_quotes(" 'x' "), "x");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes("\"\""), "");
    }

    /// Records every call made through the embedder and catalog seams.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        inner: InMemoryCatalog,
    }

    impl Recorder {
        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Embedder for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.log(format!("embed({})", text));
            Ok(vec![1.0, 0.0])
        }
    }

    #[async_trait]
    impl Catalog for Recorder {
        async fn upsert_deployment(&self, d: &DeploymentRecord) -> Result<()> {
            self.inner.upsert_deployment(d).await
        }
        async fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<EndpointRecord>> {
            self.inner.find_endpoint(key).await
        }
        async fn insert_endpoint(&self, record: &EndpointRecord) -> Result<()> {
            self.inner.insert_endpoint(record).await
        }
        async fn update_endpoint(&self, id: &str, update: &EndpointUpdate) -> Result<()> {
            self.inner.update_endpoint(id, update).await
        }
        async fn list_endpoints(&self, filter: &ListFilter, limit: i64) -> Result<Vec<EndpointSummary>> {
            self.log(format!("list({:?}, {})", filter, limit));
            self.inner.list_endpoints(filter, limit).await
        }
        async fn search_by_project(
            &self,
            q: &[f32],
            project_id: &str,
            k: i64,
            stage: Option<Stage>,
        ) -> Result<Vec<RankedEndpoint>> {
            self.log(format!("search_by_project({}, {}, {:?})", project_id, k, stage));
            self.inner.search_by_project(q, project_id, k, stage).await
        }
        async fn search_global(
            &self,
            q: &[f32],
            k: i64,
            stage: Option<Stage>,
            public_only: bool,
        ) -> Result<Vec<RankedEndpoint>> {
            self.log(format!("search_global({}, {:?}, public_only={})", k, stage, public_only));
            self.inner.search_global(q, k, stage, public_only).await
        }
        async fn remove_deployment(&self, name: &str) -> Result<Option<u64>> {
            self.inner.remove_deployment(name).await
        }
    }

    async fn seed(catalog: &InMemoryCatalog) {
        let rows = [
            ("/send-message", None, Stage::Prod, vec![0.9, 0.1]),
            ("/send-email", None, Stage::Staging, vec![1.0, 0.0]),
            ("/list-boards", Some("bot-a"), Stage::Prod, vec![0.0, 1.0]),
            ("/private-send", Some("bot-b"), Stage::Dev, vec![0.7, 0.7]),
        ];
        for (i, (path, project, stage, vector)) in rows.into_iter().enumerate() {
            catalog
                .insert_endpoint(&EndpointRecord {
                    id: format!("id-{}", i),
                    base_url: "https://api.example.com".into(),
                    endpoint_path: path.into(),
                    http_method: "POST".into(),
                    bot_project_id: project.map(str::to_string),
                    is_public: project.is_none(),
                    stage,
                    doc_text: String::new(),
                    doc_hash: String::new(),
                    embedding: vector,
                    metadata: json!({}),
                    updated_at: i as i64,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_example_global_search_call_sequence() {
        let recorder = Recorder::default();
        seed(&recorder.inner).await;

        let req = parse(&["all", "\"send message\""]).unwrap();
        let outcome = dispatch(&recorder, &recorder, &req).await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                "embed(send message)".to_string(),
                "search_global(10, None, public_only=false)".to_string(),
            ]
        );
        let QueryOutcome::Ranked(rows) = outcome else {
            panic!("expected ranked results");
        };
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].endpoint.endpoint_path, "/send-email");
        assert!(rows.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_public_never_returns_private() {
        let recorder = Recorder::default();
        seed(&recorder.inner).await;

        for tokens in [vec!["public"], vec!["public", "'send'"]] {
            let req = parse(&tokens).unwrap();
            let outcome = dispatch(&recorder, &recorder, &req).await.unwrap();
            let public: Vec<bool> = match outcome {
                QueryOutcome::Listing(rows) => rows.iter().map(|r| r.is_public).collect(),
                QueryOutcome::Ranked(rows) => rows.iter().map(|r| r.endpoint.is_public).collect(),
            };
            assert_eq!(public.len(), 2);
            assert!(public.into_iter().all(|p| p));
        }
    }

    #[tokio::test]
    async fn test_project_scope_only_returns_project() {
        let recorder = Recorder::default();
        seed(&recorder.inner).await;

        let req = parse(&["project", "bot-a", "*", "'boards'"]).unwrap();
        let outcome = dispatch(&recorder, &recorder, &req).await.unwrap();
        let QueryOutcome::Ranked(rows) = outcome else {
            panic!("expected ranked results");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].endpoint.bot_project_id.as_deref(), Some("bot-a"));
        assert!(recorder
            .calls()
            .contains(&"search_by_project(bot-a, 10, None)".to_string()));
    }

    #[tokio::test]
    async fn test_stage_filter_semantics() {
        let recorder = Recorder::default();
        seed(&recorder.inner).await;

        let unfiltered = dispatch(&recorder, &recorder, &parse(&["all"]).unwrap())
            .await
            .unwrap();
        let star = dispatch(&recorder, &recorder, &parse(&["all", "*"]).unwrap())
            .await
            .unwrap();
        assert_eq!(unfiltered, star);
        assert_eq!(unfiltered.len(), 4);

        let prod = dispatch(&recorder, &recorder, &parse(&["all", "prod"]).unwrap())
            .await
            .unwrap();
        let QueryOutcome::Listing(rows) = prod else {
            panic!("expected listing");
        };
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.stage == Stage::Prod));
        // newest first
        assert_eq!(rows[0].endpoint_path, "/list-boards");
    }

    #[tokio::test]
    async fn test_listing_does_not_embed() {
        let recorder = Recorder::default();
        let req = QueryRequest::from_args(&args(&["public"]), None, 5).unwrap();
        let outcome = dispatch(&recorder, &recorder, &req).await.unwrap();
        assert!(outcome.is_empty());
        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("list("));
        assert!(calls[0].ends_with(", 5)"));
    }
}
