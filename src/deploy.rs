//! Base URL resolution for deployed packages.
//!
//! A deployment's base URL comes from one of three places: an explicit
//! `--base-url`, the captured output of the serverless deploy (which lists
//! every route, including the constant `GET .../docs.json`), or a template
//! such as `https://api.example.com/{stage}/{package}` for bulk ingestion.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use api_catalog_core::models::Stage;

/// The constant docs route printed by every deploy.
static DOCS_ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"GET - (https://\S+?)/docs\.json").unwrap());

/// Extract the base URL from serverless deploy output.
///
/// Keeps the scheme, host, and the first path segment (the API Gateway
/// stage), so `GET - https://abc.execute-api.us-east-1.amazonaws.com/staging/docs.json`
/// yields `https://abc.execute-api.us-east-1.amazonaws.com/staging`.
pub fn extract_base_url(output: &str) -> Option<String> {
    let url = DOCS_ROUTE.captures(output)?.get(1)?.as_str();
    let rest = url.strip_prefix("https://")?;
    let mut parts = rest.splitn(3, '/');
    let host = parts.next().filter(|h| !h.is_empty())?;
    Some(match parts.next().filter(|s| !s.is_empty()) {
        Some(stage_segment) => format!("https://{}/{}", host, stage_segment),
        None => format!("https://{}", host),
    })
}

/// Read a saved deploy log and extract its base URL.
pub fn base_url_from_file(path: &Path) -> Result<String> {
    let output = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deploy output: {}", path.display()))?;
    match extract_base_url(&output) {
        Some(url) => Ok(url),
        None => bail!(
            "No 'GET - https://.../docs.json' route found in deploy output: {}",
            path.display()
        ),
    }
}

/// Fill `{package}` and `{stage}` (lowercase) in a base URL template.
pub fn render_base_url(template: &str, package: &str, stage: Stage) -> Result<String> {
    if !template.starts_with("http://") && !template.starts_with("https://") {
        bail!("base URL template must start with http:// or https://: {}", template);
    }
    Ok(template
        .replace("{package}", package)
        .replace("{stage}", stage.slug())
        .trim_end_matches('/')
        .to_string())
}
