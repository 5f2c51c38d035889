//! # ragchat
//!
//! A retrieval-augmented chat assistant over a fixed set of documents.
//!
//! Pre-extracted text is chunked and embedded once into a persistent vector
//! index. Each question is embedded, matched against the index, combined
//! with recent conversation turns and a configurable persona, and sent to a
//! hosted language model. Successful exchanges are appended to a JSON
//! history file that survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │   Corpus    │──▶│   Chunker   │──▶│ Vector Index  │
//! │ (.txt dir)  │   │  + Embed    │   │ (SQLite file) │
//! └─────────────┘   └─────────────┘   └──────┬────────┘
//!                                            │ top-k
//!                 ┌──────────────┐    ┌──────▼──────┐    ┌────────────┐
//!   question ────▶│  RagService  │◀──▶│  Retriever  │    │  History   │
//!                 │   answer()   │◀──────────────────────▶│  (JSON)    │
//!                 └──────┬───────┘                        └────────────┘
//!                        │ prompt
//!                        ▼
//!                 ┌──────────────┐
//!                 │  Generator   │
//!                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`corpus`] | Plain-text corpus loader |
//! | [`chunk`] | Boundary-aware overlapping chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persistent vector index |
//! | [`ingest`] | Index build/reuse pipeline |
//! | [`retriever`] | Query embedding and top-k lookup |
//! | [`history`] | Persisted conversation history |
//! | [`prompt`] | Prompt assembly |
//! | [`generation`] | Generation provider abstraction |
//! | [`service`] | The `answer` orchestrator |
//! | [`server`] | HTTP chat server |
//! | [`stats`] | Operator status views |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod history;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod service;
pub mod stats;
