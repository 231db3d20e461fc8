//! Core data models used throughout Policy QA.
//!
//! These types represent the documents, chunks, attributions, and
//! conversation messages that flow through the ingestion and query pipeline.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QaError, Result};

/// Declared format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Infer the format from a file name's extension (case-insensitive).
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "txt" | "text" | "md" => Ok(DocumentFormat::Text),
            "" => Err(QaError::UnsupportedFormat(format!(
                "'{}' has no file extension",
                name
            ))),
            other => Err(QaError::UnsupportedFormat(format!(".{} ({})", other, name))),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::Text => f.write_str("text"),
        }
    }
}

/// Raw uploaded content. Only `name` outlives chunking, as chunk metadata.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, format: DocumentFormat) -> Self {
        Self {
            name: name.into(),
            bytes,
            format,
        }
    }

    /// Build a document whose format is inferred from its file name.
    pub fn from_upload(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let format = DocumentFormat::from_filename(&name)?;
        Ok(Self::new(name, bytes, format))
    }
}

/// Text of one page (or of a whole unpaged document) prior to chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number; `None` for unpaged formats.
    pub page: Option<u32>,
    pub text: String,
}

/// A contiguous slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn attribution(&self) -> SourceAttribution {
        SourceAttribution {
            source: self.source.clone(),
            page: self.page,
        }
    }
}

/// Where an answer's supporting passage came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceAttribution {
    pub source: String,
    pub page: Option<u32>,
}

impl fmt::Display for SourceAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "{} (Page {})", self.source, page),
            None => f.write_str(&self.source),
        }
    }
}

/// Render attributions the way the chat surfaces show them: `a.pdf (Page 2); b.txt`.
pub fn format_sources(sources: &[SourceAttribution]) -> String {
    sources
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged message, as sent to the generation service and as
/// returned by conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completed question/answer round.
#[derive(Debug, Clone)]
pub struct Turn {
    pub query: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

/// Result of a successful `ask`.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// The question actually sent to the retriever.
    pub standalone_question: String,
    pub sources: Vec<SourceAttribution>,
}
