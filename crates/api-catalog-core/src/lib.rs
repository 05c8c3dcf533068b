//! # API Catalog Core
//!
//! Storage-agnostic logic for the API catalog: data models, OpenAPI
//! decoding, doc-text construction, the ingestion pipeline, and query
//! dispatch.
//!
//! The catalog and the embedding model are reached only through the
//! [`store::Catalog`] and [`embedding::Embedder`] traits, so every
//! pipeline in this crate runs against [`store::memory::InMemoryCatalog`]
//! and a stub embedder in tests. This crate has no sqlx, HTTP client, or
//! filesystem I/O.

pub mod doc_text;
pub mod embedding;
pub mod ingest;
pub mod models;
pub mod openapi;
pub mod query;
pub mod store;
