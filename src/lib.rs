//! # Docshelf
//!
//! A semantic search core for a document archive.
//!
//! Docshelf turns stored documents (PDFs and plain text) into overlapping
//! token-window chunks with embedding vectors, persists them in SQLite, and
//! answers free-text queries with ranked, per-document-grouped results
//! carrying snippets and short-lived signed download URLs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────┐   ┌──────────┐
//! │ Blob     │──▶│ Ingestion Pipeline │──▶│  SQLite   │
//! │ store    │   │ extract+chunk+embed│   │  chunks   │
//! └──────────┘   └────────────────────┘   └────┬─────┘
//!                                              │
//!                          ┌───────────────────┤
//!                          ▼                   ▼
//!                     ┌──────────┐       ┌──────────┐
//!                     │   CLI    │       │   HTTP   │
//!                     │ (shelf)  │       │  server  │
//!                     └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`blob`] | Blob download and signed URLs |
//! | [`extract`] | Mime-dispatched text extraction |
//! | [`tokenize`] | Tokenizer abstraction |
//! | [`chunk`] | Overlapping token-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Chunk and document persistence + vector search |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Retrieval pipeline |
//! | [`snippet`] | Query-centered snippet extraction |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod snippet;
pub mod store;
pub mod tokenize;
