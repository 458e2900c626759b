//! # Lorekeeper
//!
//! Retrieval-augmented question answering over a folder of game guides.
//!
//! Guides are split into overlapping chunks, embedded, and stored in a flat
//! vector index. A question is embedded the same way, the closest chunks are
//! pasted into a fixed prompt, and a hosted language model writes the answer.
//!
//! ## Architecture
//!
//! ```text
//!  indexing (offline)                         query (per request)
//! ┌────────┐  ┌─────────┐  ┌──────────┐      ┌───────────┐  ┌──────────┐
//! │ Loader │─▶│ Chunker │─▶│ Embedder │─┐    │ Retriever │─▶│  Prompt  │
//! │  PDFs  │  └─────────┘  └──────────┘ │    │ embed+top-k│  │ assemble │
//! └────────┘                            ▼    └─────▲─────┘  └────┬─────┘
//!                                 ┌─────────────┐  │             ▼
//!                                 │ VectorIndex │──┘       ┌───────────┐
//!                                 │ (index.json)│          │ Generator │
//!                                 └─────────────┘          └───────────┘
//! ```
//!
//! The query side is wired together by [`qa::QaEngine`] and exposed through
//! the CLI (`lore ask`, `lore chat`) and the HTTP API ([`server`]).
//!
//! ## Quick Start
//!
//! ```bash
//! lore index                               # build ./data/index.json
//! HF_TOKEN=hf_... lore ask "Where is the crossbow?" --sources
//! HF_TOKEN=hf_... lore serve               # POST /ask on 127.0.0.1:5000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Directory walk and per-page text extraction |
//! | [`chunk`] | Fixed-size overlapping chunking |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Flat vector index with atomic persistence |
//! | [`retrieve`] | Question → top-k chunks |
//! | [`prompt`] | Prompt templates and assembly |
//! | [`generation`] | Text generation providers |
//! | [`qa`] | Request orchestration |
//! | [`ingest`] | Index build pipeline |
//! | [`server`] | HTTP query API |
//! | [`chat`] | Interactive question loop |
//! | [`stats`] | Index statistics |
//! | [`logging`] | `tracing` subscriber setup |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod qa;
pub mod retrieve;
pub mod server;
pub mod stats;
