//! Core data models for the API catalog.
//!
//! These types describe the deployments and endpoint records that flow
//! through the ingestion pipeline, and the filters and ranked results used
//! by query dispatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment classifier.
///
/// Stored and displayed uppercase; parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Prod,
    Staging,
    Dev,
    Preview,
}

impl Stage {
    /// Uppercase form used in the catalog (`"PROD"`, `"STAGING"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prod => "PROD",
            Stage::Staging => "STAGING",
            Stage::Dev => "DEV",
            Stage::Preview => "PREVIEW",
        }
    }

    /// Lowercase form used in deploy URLs and deployment names.
    pub fn slug(&self) -> &'static str {
        match self {
            Stage::Prod => "prod",
            Stage::Staging => "staging",
            Stage::Dev => "dev",
            Stage::Preview => "preview",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`Stage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected one of PROD, STAGING, DEV, PREVIEW)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROD" => Ok(Stage::Prod),
            "STAGING" => Ok(Stage::Staging),
            "DEV" => Ok(Stage::Dev),
            "PREVIEW" => Ok(Stage::Preview),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}

/// Stage restriction requested by a caller.
///
/// `Unspecified` and `All` both apply no stage predicate; they are kept
/// apart so that output can tell "no stage given" from an explicit `"*"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageFilter {
    #[default]
    Unspecified,
    All,
    Only(Stage),
}

impl StageFilter {
    /// Parse a stage token: `"*"` means every stage, anything else must be a [`Stage`].
    pub fn parse(token: &str) -> Result<Self, UnknownStage> {
        if token.trim() == "*" {
            Ok(StageFilter::All)
        } else {
            token.parse().map(StageFilter::Only)
        }
    }

    /// The stage predicate to hand to the catalog, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageFilter::Only(stage) => Some(*stage),
            StageFilter::Unspecified | StageFilter::All => None,
        }
    }

    /// Human-readable suffix for report headers.
    pub fn describe(&self) -> String {
        match self {
            StageFilter::Unspecified => String::new(),
            StageFilter::All => " (all stages)".to_string(),
            StageFilter::Only(stage) => format!(" with stage \"{}\"", stage),
        }
    }
}

/// Which endpoints a listing or search may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Endpoints owned by one bot project.
    Project(String),
    /// Only `is_public = true` endpoints.
    Public,
    /// No project or visibility restriction.
    All,
}

/// Unique key of an endpoint record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub base_url: String,
    pub endpoint_path: String,
    pub http_method: String,
}

impl EndpointKey {
    pub fn new(base_url: &str, endpoint_path: &str, http_method: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            endpoint_path: endpoint_path.to_string(),
            http_method: http_method.to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.http_method, self.base_url, self.endpoint_path)
    }
}

/// One catalog row describing a deployed HTTP operation and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointRecord {
    pub id: String,
    pub base_url: String,
    pub endpoint_path: String,
    pub http_method: String,
    pub bot_project_id: Option<String>,
    pub is_public: bool,
    pub stage: Stage,
    pub doc_text: String,
    pub doc_hash: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    /// Unix timestamp, milliseconds.
    pub updated_at: i64,
}

impl EndpointRecord {
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.base_url, &self.endpoint_path, &self.http_method)
    }

    pub fn summary(&self) -> EndpointSummary {
        EndpointSummary {
            bot_project_id: self.bot_project_id.clone(),
            base_url: self.base_url.clone(),
            endpoint_path: self.endpoint_path.clone(),
            http_method: self.http_method.clone(),
            stage: self.stage,
            is_public: self.is_public,
            updated_at: self.updated_at,
        }
    }
}

/// Fields refreshed when an existing endpoint is re-ingested.
#[derive(Debug, Clone)]
pub struct EndpointUpdate {
    pub doc_text: String,
    pub doc_hash: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    pub updated_at: i64,
}

/// Deployment-level record, one per deployed package and stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub package_name: String,
    pub base_url: String,
    pub stage: Stage,
    pub function_type: String,
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub doc: serde_json::Value,
    pub updated_at: i64,
}

/// Deterministic deployment name for a package deployed to a stage.
pub fn deployment_name(package_name: &str, stage: Stage) -> String {
    format!("{}-{}", package_name, stage.slug())
}

/// Metadata-only projection of an endpoint (no doc text, no embedding).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    pub bot_project_id: Option<String>,
    pub base_url: String,
    pub endpoint_path: String,
    pub http_method: String,
    pub stage: Stage,
    pub is_public: bool,
    pub updated_at: i64,
}

/// An endpoint returned by a similarity search, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEndpoint {
    #[serde(flatten)]
    pub endpoint: EndpointSummary,
    pub similarity: f64,
}

/// Predicates for a metadata listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub project_id: Option<String>,
    pub is_public: Option<bool>,
    pub stage: Option<Stage>,
}

impl ListFilter {
    /// Build the listing filter for a scope and stage restriction.
    pub fn for_scope(scope: &Scope, stage: StageFilter) -> Self {
        let (project_id, is_public) = match scope {
            Scope::Project(id) => (Some(id.clone()), None),
            Scope::Public => (None, Some(true)),
            Scope::All => (None, None),
        };
        Self {
            project_id,
            is_public,
            stage: stage.stage(),
        }
    }

    /// Whether an endpoint satisfies every predicate.
    pub fn matches(&self, endpoint: &EndpointSummary) -> bool {
        if let Some(ref project) = self.project_id {
            if endpoint.bot_project_id.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(public) = self.is_public {
            if endpoint.is_public != public {
                return false;
            }
        }
        if let Some(stage) = self.stage {
            if endpoint.stage != stage {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_case_insensitive() {
        assert_eq!("prod".parse::<Stage>().unwrap(), Stage::Prod);
        assert_eq!("Staging".parse::<Stage>().unwrap(), Stage::Staging);
        assert_eq!(" DEV ".parse::<Stage>().unwrap(), Stage::Dev);
        assert!("qa".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_filter_star_and_unspecified_have_no_predicate() {
        assert_eq!(StageFilter::parse("*").unwrap(), StageFilter::All);
        assert_eq!(StageFilter::All.stage(), None);
        assert_eq!(StageFilter::Unspecified.stage(), None);
        assert_eq!(
            StageFilter::parse("PROD").unwrap().stage(),
            Some(Stage::Prod)
        );
    }

    #[test]
    fn test_stage_filter_describe() {
        assert_eq!(StageFilter::Unspecified.describe(), "");
        assert_eq!(StageFilter::All.describe(), " (all stages)");
        assert_eq!(
            StageFilter::Only(Stage::Prod).describe(),
            " with stage \"PROD\""
        );
    }

    #[test]
    fn test_deployment_name() {
        assert_eq!(deployment_name("aws-ses", Stage::Staging), "aws-ses-staging");
    }

    #[test]
    fn test_list_filter_for_scope() {
        let f = ListFilter::for_scope(&Scope::Project("bot-1".into()), StageFilter::All);
        assert_eq!(f.project_id.as_deref(), Some("bot-1"));
        assert_eq!(f.is_public, None);
        assert_eq!(f.stage, None);

        let f = ListFilter::for_scope(&Scope::Public, StageFilter::Only(Stage::Dev));
        assert_eq!(f.is_public, Some(true));
        assert_eq!(f.stage, Some(Stage::Dev));

        assert_eq!(
            ListFilter::for_scope(&Scope::All, StageFilter::Unspecified),
            ListFilter::default()
        );
    }

    #[test]
    fn test_list_filter_matches() {
        let endpoint = EndpointSummary {
            bot_project_id: Some("bot-1".into()),
            base_url: "https://x".into(),
            endpoint_path: "/a".into(),
            http_method: "GET".into(),
            stage: Stage::Prod,
            is_public: false,
            updated_at: 0,
        };
        assert!(ListFilter::default().matches(&endpoint));
        assert!(ListFilter::for_scope(&Scope::Project("bot-1".into()), StageFilter::All)
            .matches(&endpoint));
        assert!(!ListFilter::for_scope(&Scope::Project("bot-2".into()), StageFilter::All)
            .matches(&endpoint));
        assert!(!ListFilter::for_scope(&Scope::Public, StageFilter::All).matches(&endpoint));
        assert!(!ListFilter::for_scope(&Scope::All, StageFilter::Only(Stage::Dev))
            .matches(&endpoint));
    }
}
