//! Core data models for the knowledge engine.
//!
//! These types represent the documents, search results, and augmented
//! prompts that flow through the parse → store → search → augment pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
    Html,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
            DocumentType::Html => "html",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "docx" => Ok(DocumentType::Docx),
            "txt" => Ok(DocumentType::Txt),
            "html" => Ok(DocumentType::Html),
            other => Err(crate::error::EngineError::UnsupportedFormat(
                other.to_string(),
            )),
        }
    }
}

/// One uploaded knowledge artifact, as persisted by the store.
///
/// Raw upload bytes are consumed by the parser and never held here;
/// `text` is the normalized extraction result (empty when extraction
/// legitimately produced nothing, e.g. an image-only PDF).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Owning tenant. Documents are never visible across tenants.
    pub owner: String,
    pub name: String,
    pub doc_type: DocumentType,
    pub text: String,
    /// Flat scalar metadata: author, title, page_count/paragraph_count,
    /// created, modified, size_bytes.
    pub metadata: BTreeMap<String, String>,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional candidate filters applied by the store before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub doc_type: Option<DocumentType>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tags.is_empty() && self.doc_type.is_none()
    }

    /// Stable textual form used for cache-key fingerprinting.
    pub fn canonical(&self) -> String {
        let tags: Vec<&str> = self.tags.iter().map(|t| t.as_str()).collect();
        format!(
            "category={};tags={};type={}",
            self.category.as_deref().unwrap_or(""),
            tags.join(","),
            self.doc_type.map(|t| t.as_str()).unwrap_or("")
        )
    }
}

/// Match tier that produced a result's score. Higher tier wins; a
/// document is scored by the single highest tier it satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankTier {
    CategoryMatch = 1,
    FilenameMatch = 2,
    ContentMatch = 3,
}

impl RankTier {
    pub fn score(&self) -> u8 {
        *self as u8
    }

    /// Debuggable reason string exposed on the search boundary.
    pub fn reason(&self) -> &'static str {
        match self {
            RankTier::ContentMatch => "content_match",
            RankTier::FilenameMatch => "filename_match",
            RankTier::CategoryMatch => "category_match",
        }
    }
}

/// A ranked search hit. Ephemeral: constructed per query, cloned out of
/// the cache, discarded after response assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub name: String,
    pub tier: RankTier,
    pub score: u8,
    pub updated_at: DateTime<Utc>,
    pub snippets: Vec<String>,
}

/// Outcome of a search call. `degraded` distinguishes "store failed"
/// from "nothing matched"; both carry an empty result list on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub degraded: bool,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            results: Vec::new(),
            degraded: true,
        }
    }
}

/// A document actually cited in an enhanced prompt's context block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub name: String,
}

/// A user message augmented with knowledge base context.
///
/// Invariant: `sources` lists exactly the documents whose snippets were
/// concatenated into `context_block`.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedPrompt {
    pub original_message: String,
    pub context_block: String,
    pub sources: Vec<SourceRef>,
    pub token_estimate: usize,
}

impl EnhancedPrompt {
    /// A prompt with no knowledge base context at all.
    pub fn plain(message: &str) -> Self {
        Self {
            original_message: message.to_string(),
            context_block: String::new(),
            sources: Vec::new(),
            token_estimate: 0,
        }
    }

    /// Whether any knowledge made it into the prompt.
    pub fn has_context(&self) -> bool {
        !self.context_block.is_empty()
    }

    /// Render the final prompt text handed to the AI provider. With no
    /// context this is the original message, unmodified.
    pub fn render(&self) -> String {
        if self.context_block.is_empty() {
            return self.original_message.clone();
        }
        format!(
            "Use the following knowledge base excerpts to answer. \
             Cite only information found in them when relevant.\n\n\
             {}\n\nUser message: {}",
            self.context_block, self.original_message
        )
    }
}

/// Token usage reported by an AI provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A generated completion from an AI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
}

/// Sentiment analysis result (consumed by a neighboring feature; part of
/// the provider interface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    pub sentiment: String,
    pub rating: u8,
    pub confidence: f32,
}
