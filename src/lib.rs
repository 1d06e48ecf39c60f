//! # AutoQuery
//!
//! A retrieval-augmented question-answering backend for a small document
//! collection.
//!
//! Users upload PDF, DOCX or TXT files. AutoQuery extracts their text,
//! splits it into overlapping chunks, embeds the chunks when an embedding
//! provider is configured, and stores the documents in a JSON metadata file.
//! Questions are answered by retrieving the most relevant passages and
//! handing them, with the question, to a chat-completion model.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ ┌──────────┐   ┌─────────┐   ┌──────────────┐
//!            │ Extract  │──▶│  Chunk  │──▶│ Vector index │  (optional)
//!            └──────────┘   └─────────┘   └──────┬───────┘
//!                 │                              │
//!                 ▼                              ▼
//!          ┌──────────────┐              ┌──────────────┐
//!          │ JSON metadata│◀─── lexical ─│  Retriever   │◀── query
//!          │    store     │   fallback   └──────┬───────┘
//!          └──────────────┘                     ▼
//!                                          ┌──────────┐
//!                                          │   Chat   │──▶ LLM
//!                                          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! autoquery upload ./manuals
//! autoquery search "oil filter"
//! autoquery ask "How often should the oil filter be replaced?"
//! autoquery serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Document and provider error types |
//! | [`extract`] | PDF / DOCX / TXT text extraction |
//! | [`chunk`] | Boundary-aware chunking with overlap |
//! | [`store`] | Metadata store trait and JSON-file backend |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index and backend selection |
//! | [`search`] | Semantic retrieval with lexical fallback |
//! | [`service`] | Upload / delete / list orchestration |
//! | [`llm`] | Chat-completion provider |
//! | [`chat`] | Retrieval-augmented answers |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing setup |

pub mod chat;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod search;
pub mod server;
pub mod service;
pub mod store;
