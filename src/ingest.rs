//! Upload boundary: decoding, validation, parsing, and storage.
//!
//! An upload carries either inline UTF-8 text or base64-encoded bytes.
//! The pipeline is strict up front and tolerant afterwards:
//!
//! - size and format checks happen before any parse work
//! - a parse failure rejects the upload
//! - empty extracted text (image-only PDF, blank file) is accepted and
//!   stored with a warning so the document still exists for metadata
//!   queries, it just never matches content searches

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ParserConfig;
use crate::error::EngineError;
use crate::models::{Document, DocumentType};
use crate::parse::{self, ParseWarning};
use crate::store::KnowledgeStore;

/// An incoming upload, as deserialized from the HTTP boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    /// Original filename, e.g. "policy.txt". Used for type inference
    /// when `doc_type` is absent, and for filename-tier ranking.
    pub name: String,
    /// Explicit format override; inferred from the name's extension
    /// when omitted. Also accepted as `declared_type`.
    #[serde(default, alias = "declared_type")]
    pub doc_type: Option<String>,
    /// Inline UTF-8 content. Mutually exclusive with `content_base64`.
    #[serde(default)]
    pub content: Option<String>,
    /// Base64-encoded raw bytes (binary formats).
    #[serde(default)]
    pub content_base64: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Partial metadata update for an existing document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataPatch {
    #[serde(default)]
    pub name: Option<String>,
    /// `Some(None)` clears the category; absent leaves it untouched.
    #[serde(default, with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
}

// Distinguishes "field absent" from "field explicitly null" for PATCH
// semantics.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

/// What an accepted upload produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub document: Document,
    /// Set when extraction succeeded but yielded no text.
    pub warning: Option<String>,
    /// Set when part of the document failed to decode and was skipped.
    pub partial: bool,
}

pub struct Ingestor {
    store: Arc<dyn KnowledgeStore>,
    parser: ParserConfig,
}

impl Ingestor {
    pub fn new(store: Arc<dyn KnowledgeStore>, parser: ParserConfig) -> Self {
        Self { store, parser }
    }

    /// Validate, parse, and store an upload for `tenant`.
    pub async fn ingest(
        &self,
        tenant: &str,
        upload: DocumentUpload,
    ) -> Result<IngestReceipt, EngineError> {
        let name = upload.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "document name is required".to_string(),
            ));
        }

        let doc_type = resolve_doc_type(name, upload.doc_type.as_deref())?;
        let bytes = decode_content(&upload)?;

        // The size gate runs before any parser sees the payload.
        if bytes.len() > self.parser.max_upload_bytes {
            return Err(EngineError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.parser.max_upload_bytes,
            });
        }

        let outcome = parse::parse(&bytes, doc_type)?;

        let warning = match outcome.warning {
            Some(ParseWarning::EmptyContent) => {
                warn!(tenant, name, "upload parsed to empty text");
                Some("document contains no extractable text".to_string())
            }
            None => None,
        };

        let now = chrono::Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            owner: tenant.to_string(),
            name: name.to_string(),
            doc_type,
            text: outcome.text,
            metadata: outcome.metadata,
            category: upload.category.filter(|c| !c.trim().is_empty()),
            tags: upload.tags,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_document(document.clone())
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;

        info!(
            tenant,
            id = %document.id,
            name = %document.name,
            doc_type = %document.doc_type,
            chars = document.text.len(),
            "document ingested"
        );

        Ok(IngestReceipt {
            document,
            warning,
            partial: outcome.partial,
        })
    }

    /// Apply a metadata patch to an existing document, bumping
    /// `updated_at`. Content and extraction metadata are immutable.
    pub async fn update_metadata(
        &self,
        tenant: &str,
        id: &str,
        patch: MetadataPatch,
    ) -> Result<Document, EngineError> {
        let mut document = self
            .store
            .get_document(tenant, id)
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(EngineError::InvalidRequest(
                    "document name cannot be empty".to_string(),
                ));
            }
            document.name = name;
        }
        if let Some(category) = patch.category {
            document.category = category.filter(|c| !c.trim().is_empty());
        }
        if let Some(tags) = patch.tags {
            document.tags = tags;
        }
        document.updated_at = chrono::Utc::now();

        self.store
            .update_document(document.clone())
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;

        Ok(document)
    }
}

/// Resolve the document type from an explicit override or the filename
/// extension.
fn resolve_doc_type(name: &str, explicit: Option<&str>) -> Result<DocumentType, EngineError> {
    if let Some(explicit) = explicit {
        return DocumentType::from_str(explicit);
    }
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .ok_or_else(|| EngineError::UnsupportedFormat(name.to_string()))?;
    DocumentType::from_str(ext)
}

fn decode_content(upload: &DocumentUpload) -> Result<Vec<u8>, EngineError> {
    match (&upload.content, &upload.content_base64) {
        (Some(_), Some(_)) => Err(EngineError::InvalidRequest(
            "provide either content or content_base64, not both".to_string(),
        )),
        (Some(text), None) => Ok(text.as_bytes().to_vec()),
        (None, Some(b64)) => base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| EngineError::InvalidRequest(format!("invalid base64 content: {}", e))),
        (None, None) => Err(EngineError::InvalidRequest(
            "content or content_base64 is required".to_string(),
        )),
    }
}
