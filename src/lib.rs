//! # pdf-rag
//!
//! Question answering over PDF documents with retrieval-augmented generation.
//!
//! PDFs are split into overlapping text chunks, embedded, and stored in a
//! single-file SQLite vector store. A question is embedded, the nearest
//! chunks are placed into a fixed prompt, and a hosted chat model writes the
//! answer. Answers are tracked as [`models::QueryRecord`]s so that a web tier
//! can hand slow model calls to an asynchronous worker and let clients poll.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   PDFs   │──▶│ Split+Embed  │──▶│ Vector store │──▶ S3 snapshot
//! └──────────┘   └──────────────┘   └──────┬───────┘         │
//!                                          │                 ▼
//!   POST /submit_query ──▶ dispatch ───────┴──inline    Lambda worker
//!                             │                              │
//!                             └──────▶ records ◀─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag ingest
//! rag query "How much does a landing cost?"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`pdf`] | Per-page PDF text extraction |
//! | [`chunk`] | Recursive character splitting and chunk ids |
//! | [`ingest`] | Incremental ingestion pipeline |
//! | [`vector_store`] | SQLite vector store with cosine search |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat model providers |
//! | [`query`] | Retrieval-augmented answering |
//! | [`records`] | Query record persistence (SQLite, DynamoDB) |
//! | [`object_store`] | Vector store snapshots in S3 |
//! | [`dispatch`] | Query submission, inline or via the worker |
//! | [`worker`] | Asynchronous worker invocation and handling |
//! | [`server`] | HTTP API |
//! | [`lambda`] | AWS Lambda entry points for the API and the worker |
//! | [`aws`] | SigV4 signing and AWS requests |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aws;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod lambda;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod object_store;
pub mod pdf;
pub mod query;
pub mod records;
pub mod server;
pub mod vector_store;
pub mod worker;
