//! # API Catalog
//!
//! An embedding-indexed catalog of deployed HTTP API endpoints.
//!
//! Every operation in a package's OpenAPI document is turned into a
//! canonical documentation text, embedded, and upserted into a SQLite
//! catalog keyed by `(base_url, endpoint_path, http_method)`. The catalog
//! can then be listed or searched semantically, scoped to one bot project,
//! to public endpoints, or to everything, and optionally to one stage.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ openapi.json │──▶│ DocText + Embed  │──▶│  SQLite   │
//! │ deploy log   │   │ (core pipeline)  │   │ catalog   │
//! └──────────────┘   └──────────────────┘   └────┬─────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                     ┌──────────┐         ┌──────────┐
//!                     │   CLI    │         │   HTTP   │
//!                     │ (apicat) │         │  server  │
//!                     └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! apicat init
//! apicat ingest packages/aws-ses/sls/openapi.json --package aws-ses \
//!     --deploy-output deploy.log --stage STAGING
//! apicat query all
//! apicat query all --stage '*' send message
//! apicat serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite catalog backend |
//! | [`embedding`] | Embedding providers |
//! | [`deploy`] | Base URL extraction from deploy output |
//! | [`ingest`] | `ingest`, `ingest-all`, `remove` commands |
//! | [`query`] | `query` command and table rendering |
//! | [`server`] | HTTP server |
//! | [`logging`] | tracing subscriber setup |

pub mod config;
pub mod db;
pub mod deploy;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_store;
