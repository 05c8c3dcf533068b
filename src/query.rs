//! `apicat query`: listing and semantic search over the catalog.
//!
//! Parsing and dispatch live in `api_catalog_core::query`; this module
//! opens the catalog, builds the embedder, and renders the outcome as a
//! text table or JSON.

use anyhow::Result;

use api_catalog_core::models::{EndpointSummary, Scope};
use api_catalog_core::query::{dispatch, QueryOutcome, QueryRequest};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteCatalog;

pub async fn run_query(
    config: &Config,
    args: &[String],
    stage: Option<&str>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(config.query.default_limit);
    let req = QueryRequest::from_args(args, stage, limit)?;

    let embedder = create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let catalog = SqliteCatalog::new(pool.clone());

    let outcome = dispatch(&catalog, embedder.as_ref(), &req).await;
    pool.close().await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", header(&req));
    if outcome.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print!("{}", render_table(&outcome));
    Ok(())
}

/// One-line description of what was asked for.
pub fn header(req: &QueryRequest) -> String {
    let stage = req.stage.describe();
    match &req.query {
        None => match &req.scope {
            Scope::Project(id) => format!("APIs in project \"{}\"{}:", id, stage),
            Scope::Public => format!("Public APIs{}:", stage),
            Scope::All => format!("All APIs{}:", stage),
        },
        Some(query) => {
            let kind = match req.scope {
                Scope::Project(_) => "project",
                Scope::Public => "public",
                Scope::All => "global",
            };
            format!("Top {} {} results for \"{}\"{}:", req.limit, kind, query, stage)
        }
    }
}

fn row_cells(endpoint: &EndpointSummary) -> Vec<String> {
    vec![
        endpoint.bot_project_id.clone().unwrap_or_else(|| "-".to_string()),
        endpoint.base_url.clone(),
        endpoint.endpoint_path.clone(),
        endpoint.http_method.clone(),
        endpoint.stage.to_string(),
        endpoint.is_public.to_string(),
    ]
}

/// Render results as a fixed-width table, one row per endpoint.
pub fn render_table(outcome: &QueryOutcome) -> String {
    let mut columns = vec![
        "bot_project_id",
        "base_url",
        "endpoint_path",
        "http_method",
        "stage",
        "is_public",
    ];
    let rows: Vec<Vec<String>> = match outcome {
        QueryOutcome::Listing(rows) => rows.iter().map(row_cells).collect(),
        QueryOutcome::Ranked(rows) => {
            columns.push("similarity");
            rows.iter()
                .map(|r| {
                    let mut cells = row_cells(&r.endpoint);
                    cells.push(format!("{:.4}", r.similarity));
                    cells
                })
                .collect()
        }
    };

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |cells: &[&str]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };
    out.push_str(&line(&columns));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
    }
    out
}
