//! Persistence boundary for the engine.
//!
//! The [`KnowledgeStore`] trait is the only place the engine touches
//! storage; it is injected into the search engine and upload boundary as
//! an `Arc<dyn KnowledgeStore>`, so the engine is testable against the
//! in-memory implementation and deployable against whatever backend the
//! surrounding platform owns.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, SearchFilters};

/// Abstract document storage scoped by tenant.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](KnowledgeStore::insert_document) | Persist a newly parsed document |
/// | [`update_document`](KnowledgeStore::update_document) | Replace a document after metadata edits |
/// | [`get_document`](KnowledgeStore::get_document) | Fetch one document by id, tenant-scoped |
/// | [`delete_document`](KnowledgeStore::delete_document) | Remove a document; returns whether it existed |
/// | [`find_candidates`](KnowledgeStore::find_candidates) | Unordered candidate set for ranking |
///
/// Errors from any method mean the store is unreachable or misbehaving;
/// the search path maps them to a degraded (never fatal) outcome.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a fully parsed document. Documents become visible to
    /// search only through this call, so a candidate can never be
    /// observed partially parsed.
    async fn insert_document(&self, doc: Document) -> Result<()>;

    /// Replace an existing document (metadata edits). The caller bumps
    /// `updated_at` before handing the document over.
    async fn update_document(&self, doc: Document) -> Result<()>;

    /// Fetch a document by id within the tenant's scope.
    async fn get_document(&self, tenant: &str, id: &str) -> Result<Option<Document>>;

    /// Delete a document. `Ok(false)` when nothing matched.
    async fn delete_document(&self, tenant: &str, id: &str) -> Result<bool>;

    /// Return the tenant's documents matching the optional filters, in
    /// no particular order. Pre-filtering only; ranking happens in the
    /// engine.
    async fn find_candidates(&self, tenant: &str, filters: &SearchFilters)
        -> Result<Vec<Document>>;
}
