//! # API Catalog CLI (`apicat`)
//!
//! ## Usage
//!
//! ```bash
//! apicat --config ./config/apicat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `apicat init` | Create the SQLite database and run schema migrations |
//! | `apicat ingest <openapi.json>` | Embed and upsert every operation of one deployment |
//! | `apicat ingest-all <packages_dir>` | Ingest every package's OpenAPI document |
//! | `apicat remove <package>` | Delete a deployment and its endpoints |
//! | `apicat query <action> ...` | List or semantically search the catalog |
//! | `apicat serve` | Start the HTTP server |
//!
//! ## Exit codes
//!
//! `0` on success (including zero query results), `1` on errors and invalid
//! query arguments, `2` when ingestion finished with per-operation failures.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use api_catalog::ingest::{BaseUrlSource, IngestOptions};
use api_catalog::{config, ingest, logging, migrate, query, server};
use api_catalog_core::models::Stage;
use api_catalog_core::query::QueryArgsError;

const QUERY_USAGE: &str = "\
Usage:
  apicat query project <projectId> [stage] [\"query\"]
  apicat query public [stage] [\"query\"]
  apicat query all [stage] [\"query\"]

Examples:
  apicat query project my-chatbot
  apicat query project my-chatbot '*'
  apicat query project my-chatbot PROD \"'send message'\"
  apicat query all --stage '*' send message
  apicat query public --stage STAGING --limit 5 send email";

/// API Catalog CLI: embedding-indexed catalog and semantic search for
/// deployed OpenAPI endpoints.
#[derive(Parser)]
#[command(
    name = "apicat",
    about = "Embedding-indexed catalog and semantic search for deployed OpenAPI endpoints",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/apicat.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest one OpenAPI document for a deployed package.
    ///
    /// Every operation is embedded and inserted, or refreshed in place when
    /// its (base_url, path, method) is already catalogued. Exits with 2 when
    /// any operation failed.
    Ingest {
        /// Path to the OpenAPI JSON document.
        openapi: PathBuf,

        /// Package name (deployment name is `<package>-<stage>`).
        #[arg(long)]
        package: String,

        /// Deployed base URL, e.g. `https://abc.execute-api.us-east-1.amazonaws.com/staging`.
        #[arg(long, conflicts_with = "deploy_output", required_unless_present = "deploy_output")]
        base_url: Option<String>,

        /// Saved serverless deploy output to take the base URL from.
        #[arg(long)]
        deploy_output: Option<PathBuf>,

        /// Stage (PROD, STAGING, DEV, PREVIEW). Defaults to `[ingest].default_stage`.
        #[arg(long, value_parser = parse_stage)]
        stage: Option<Stage>,

        /// Bot project that owns these endpoints. Omit for public endpoints.
        #[arg(long)]
        project: Option<String>,
    },

    /// Ingest every package under a directory (`*/sls/openapi.json` by default).
    IngestAll {
        packages_dir: PathBuf,

        /// Base URL template with `{package}` and `{stage}` placeholders.
        #[arg(long)]
        base_url_template: String,

        #[arg(long, value_parser = parse_stage)]
        stage: Option<Stage>,
    },

    /// Remove a deployment and all of its endpoints from the catalog.
    Remove {
        package: String,

        #[arg(long, value_parser = parse_stage)]
        stage: Option<Stage>,
    },

    /// List or search the catalog.
    ///
    /// `<action>` is `project <projectId>`, `public`, or `all`, followed by an
    /// optional stage (`*` for all stages) and an optional quoted query.
    /// With `--stage`, every remaining argument is query text.
    Query {
        /// Action and its positional arguments.
        args: Vec<String>,

        /// Stage filter; `*` means all stages.
        #[arg(long)]
        stage: Option<String>,

        /// Maximum number of results. Defaults to `[query].default_limit`.
        #[arg(long)]
        limit: Option<i64>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e: api_catalog_core::models::UnknownStage| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(args_err) = e.downcast_ref::<QueryArgsError>() {
                eprintln!("Error: {}", args_err);
                eprintln!();
                eprintln!("{}", QUERY_USAGE);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            openapi,
            package,
            base_url,
            deploy_output,
            stage,
            project,
        } => {
            let base_url = match (base_url, deploy_output) {
                (Some(url), _) => BaseUrlSource::Explicit(url),
                (None, Some(path)) => BaseUrlSource::DeployOutput(path),
                (None, None) => anyhow::bail!("one of --base-url or --deploy-output is required"),
            };
            let opts = IngestOptions {
                openapi,
                package,
                base_url,
                stage,
                project,
            };
            let report = ingest::run_ingest(&cfg, &opts).await?;
            if !report.is_complete() {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::IngestAll {
            packages_dir,
            base_url_template,
            stage,
        } => {
            let outcomes =
                ingest::run_ingest_all(&cfg, &packages_dir, &base_url_template, stage).await?;
            if !outcomes.iter().all(|o| o.is_complete()) {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Remove { package, stage } => {
            ingest::run_remove(&cfg, &package, stage).await?;
        }
        Commands::Query {
            args,
            stage,
            limit,
            json,
        } => {
            query::run_query(&cfg, &args, stage.as_deref(), limit, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
