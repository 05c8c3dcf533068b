//! Ingestion commands.
//!
//! Wires the core ingestion pipeline to the SQLite catalog and the
//! configured embedder: `apicat ingest` for one OpenAPI document,
//! `apicat ingest-all` for every package under a directory, and
//! `apicat remove` to drop a deployment.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use api_catalog_core::embedding::Embedder;
use api_catalog_core::ingest::{ingest_document, DeploymentContext, IngestReport};
use api_catalog_core::models::{deployment_name, Stage};
use api_catalog_core::openapi::OpenApiDoc;
use api_catalog_core::store::Catalog;

use crate::config::Config;
use crate::db;
use crate::deploy;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteCatalog;

/// Where `apicat ingest` takes the deployment's base URL from.
#[derive(Debug, Clone)]
pub enum BaseUrlSource {
    Explicit(String),
    DeployOutput(PathBuf),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub openapi: PathBuf,
    pub package: String,
    pub base_url: BaseUrlSource,
    pub stage: Option<Stage>,
    pub project: Option<String>,
}

pub fn load_openapi(path: &Path) -> Result<OpenApiDoc> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OpenAPI document: {}", path.display()))?;
    OpenApiDoc::from_json_str(&text).with_context(|| format!("in {}", path.display()))
}

fn embedder_for_ingest(config: &Config) -> Result<Box<dyn Embedder>> {
    if !config.embedding.is_enabled() {
        bail!("Ingestion requires an embedding provider; set [embedding].provider in the config");
    }
    create_embedder(&config.embedding)
}

/// Ingest one OpenAPI document. Returns the report; the caller decides the exit code.
pub async fn run_ingest(config: &Config, opts: &IngestOptions) -> Result<IngestReport> {
    let doc = load_openapi(&opts.openapi)?;
    let base_url = match &opts.base_url {
        BaseUrlSource::Explicit(url) => url.clone(),
        BaseUrlSource::DeployOutput(path) => deploy::base_url_from_file(path)?,
    };
    let embedder = embedder_for_ingest(config)?;

    let pool = db::connect(config).await?;
    let catalog = SqliteCatalog::new(pool.clone());

    let ctx = DeploymentContext {
        package_name: opts.package.clone(),
        base_url: base_url.trim_end_matches('/').to_string(),
        stage: opts.stage.unwrap_or(config.ingest.default_stage),
        function_type: config.ingest.function_type.clone(),
        bot_project_id: opts.project.clone(),
    };

    let report = ingest_document(&catalog, embedder.as_ref(), &ctx, &doc).await?;
    print_report(&ctx, &report);

    pool.close().await;
    Ok(report)
}

/// Outcome of one package in `apicat ingest-all`.
#[derive(Debug)]
pub enum PackageOutcome {
    Ingested(IngestReport),
    Failed { package: String, error: String },
}

impl PackageOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, PackageOutcome::Ingested(report) if report.is_complete())
    }
}

/// Ingest every package found under `packages_dir`, one after another.
///
/// A package whose document cannot be read, or whose deployment cannot be
/// recorded, is reported and skipped; the remaining packages still run.
pub async fn run_ingest_all(
    config: &Config,
    packages_dir: &Path,
    base_url_template: &str,
    stage: Option<Stage>,
) -> Result<Vec<PackageOutcome>> {
    let packages = discover_packages(packages_dir, &config.ingest.include_globs)?;
    if packages.is_empty() {
        println!("No OpenAPI documents found under {}", packages_dir.display());
        return Ok(Vec::new());
    }

    let stage = stage.unwrap_or(config.ingest.default_stage);
    let embedder = embedder_for_ingest(config)?;
    let pool = db::connect(config).await?;
    let catalog = SqliteCatalog::new(pool.clone());

    let mut outcomes = Vec::with_capacity(packages.len());
    for (package, path) in &packages {
        let outcome =
            ingest_package(&catalog, embedder.as_ref(), config, package, path, base_url_template, stage)
                .await;
        match outcome {
            Ok(report) => outcomes.push(PackageOutcome::Ingested(report)),
            Err(e) => {
                warn!(package = %package, error = %format!("{:#}", e), "package ingestion failed");
                println!("ingest {}", package);
                println!("  error: {:#}", e);
                outcomes.push(PackageOutcome::Failed {
                    package: package.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    let complete = outcomes.iter().filter(|o| o.is_complete()).count();
    println!();
    println!("packages: {} ({} complete, {} with failures)", outcomes.len(), complete, outcomes.len() - complete);

    pool.close().await;
    Ok(outcomes)
}

async fn ingest_package(
    catalog: &dyn Catalog,
    embedder: &dyn Embedder,
    config: &Config,
    package: &str,
    path: &Path,
    base_url_template: &str,
    stage: Stage,
) -> Result<IngestReport> {
    let doc = load_openapi(path)?;
    let ctx = DeploymentContext {
        package_name: package.to_string(),
        base_url: deploy::render_base_url(base_url_template, package, stage)?,
        stage,
        function_type: config.ingest.function_type.clone(),
        bot_project_id: None,
    };
    info!(package, path = %path.display(), "ingesting package");
    let report = ingest_document(catalog, embedder, &ctx, &doc).await?;
    print_report(&ctx, &report);
    Ok(report)
}

/// Find OpenAPI documents under `root`; the package name is the first path component.
pub fn discover_packages(root: &Path, include_globs: &[String]) -> Result<Vec<(String, PathBuf)>> {
    if !root.is_dir() {
        bail!("Packages directory does not exist: {}", root.display());
    }
    let include_set = build_globset(include_globs)?;
    let excludes = build_globset(&["**/node_modules/**".to_string(), "**/.git/**".to_string()])?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if excludes.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let package = match rel_str.split('/').next() {
            Some(first) if first != rel_str => first.to_string(),
            _ => continue,
        };
        found.push((package, path.to_path_buf()));
    }

    found.sort();
    Ok(found)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn print_report(ctx: &DeploymentContext, report: &IngestReport) {
    println!("ingest {}", report.deployment_name);
    println!("  base url: {}", ctx.base_url);
    println!("  stage: {}", ctx.stage);
    if let Some(ref project) = ctx.bot_project_id {
        println!("  project: {}", project);
    }
    println!("  attempted: {}", report.attempted);
    println!(
        "  succeeded: {} (inserted {}, updated {})",
        report.succeeded, report.inserted, report.updated
    );
    println!("  failed: {}", report.failed());
    for failure in &report.failures {
        println!(
            "    {} {} [{}] {}",
            failure.method, failure.path, failure.kind, failure.error
        );
    }
    println!("{}", if report.is_complete() { "ok" } else { "partial" });
}

/// Delete the deployment of `package` at `stage` and all of its endpoints.
pub async fn run_remove(config: &Config, package: &str, stage: Option<Stage>) -> Result<()> {
    let stage = stage.unwrap_or(config.ingest.default_stage);
    let name = deployment_name(package, stage);

    let pool = db::connect(config).await?;
    let catalog = SqliteCatalog::new(pool.clone());
    let removed = catalog.remove_deployment(&name).await?;
    pool.close().await;

    match removed {
        Some(count) => {
            println!("removed {} ({} endpoints)", name, count);
            Ok(())
        }
        None => bail!("No deployment named '{}'", name),
    }
}
