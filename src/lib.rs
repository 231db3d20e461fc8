//! # Policy QA
//!
//! Conversational question answering over insurance policy documents.
//!
//! Uploaded PDFs and text files are split into overlapping chunks, embedded,
//! and stored in a local SQLite index. Questions are answered by a chat model
//! over passages picked with query-adaptive Maximal Marginal Relevance, and
//! every answer lists the documents and pages it drew on. A short window of
//! previous turns lets follow-up questions refer back to earlier answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │ Documents │──▶│ Extract  │──▶│  Chunker  │──▶│ Embed+Index  │
//! │ PDF / txt │   │ per page │   │ recursive │   │ SQLite (BLOB)│
//! └───────────┘   └──────────┘   └───────────┘   └──────┬───────┘
//!                                                       │
//!      ┌──────────┐   ┌─────────────┐   ┌───────────┐   │
//!      │  Answer  │◀──│  Generator  │◀──│ Retriever │◀──┘
//!      │ +sources │   │ chat model  │   │    MMR    │
//!      └──────────┘   └─────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! pqa ingest ./policies/             # index every pdf/txt/md under a directory
//! pqa ask "What is my deductible?"
//! pqa chat                           # interactive, with follow-up memory
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error kinds |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF and text extraction |
//! | [`chunk`] | Recursive character splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`retrieve`] | Adaptive MMR retrieval |
//! | [`prompt`] | Condense and answer prompts |
//! | [`generation`] | Chat-completion provider |
//! | [`memory`] | Sliding-window conversation memory |
//! | [`session`] | Ingest / ask / reset orchestration |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
mod http;
pub mod index;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod session;

pub use error::{QaError, Result};
pub use session::Session;
