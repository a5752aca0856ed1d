//! Tiered search and ranking over knowledge store candidates.
//!
//! Scoring is lexical and tier-based by deliberate choice (no TF-IDF or
//! BM25): a document is scored by the single highest tier it satisfies
//! (content match, then filename, then category), and ties within a tier
//! break on recency (`updated_at` descending). The exact tie-break is a
//! contract, not an implementation detail.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{SearchConfig, SnippetConfig};
use crate::models::{Document, RankTier, SearchFilters, SearchOutcome, SearchResult};
use crate::snippet::extract_snippets;
use crate::store::KnowledgeStore;

/// How many ranked results a cached outcome holds. Cache keys do not
/// include the caller's limit, so every computation fetches to this
/// ceiling and callers truncate afterwards.
pub const FETCH_CEILING: usize = 50;

pub struct SearchEngine {
    store: Arc<dyn KnowledgeStore>,
    search: SearchConfig,
    snippets: SnippetConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn KnowledgeStore>, search: SearchConfig, snippets: SnippetConfig) -> Self {
        Self {
            store,
            search,
            snippets,
        }
    }

    /// Rank the tenant's matching documents for `query`.
    ///
    /// Store failures and timeouts degrade to an empty, flagged outcome;
    /// they are never raised, so the enclosing request can proceed
    /// without knowledge. Snippet extraction is the expensive step and
    /// runs only when `include_snippets` is set.
    pub async fn search(
        &self,
        tenant: &str,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        include_snippets: bool,
    ) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::empty();
        }

        let timeout = Duration::from_secs(self.search.store_timeout_secs);
        let candidates =
            match tokio::time::timeout(timeout, self.store.find_candidates(tenant, filters)).await
            {
                Ok(Ok(docs)) => docs,
                Ok(Err(e)) => {
                    warn!(tenant, query, error = %e, "knowledge store unavailable, degrading search");
                    return SearchOutcome::degraded();
                }
                Err(_) => {
                    warn!(tenant, query, timeout_secs = timeout.as_secs(), "knowledge store timed out, degrading search");
                    return SearchOutcome::degraded();
                }
            };

        let candidate_count = candidates.len();
        let mut scored: Vec<(RankTier, Document)> = candidates
            .into_iter()
            .filter_map(|doc| score_document(&doc, query).map(|tier| (tier, doc)))
            .collect();

        // tier desc, updated_at desc, id asc: deterministic for a fixed
        // candidate set and timestamps.
        scored.sort_by(|a, b| match b.0.cmp(&a.0) {
            Ordering::Equal => match b.1.updated_at.cmp(&a.1.updated_at) {
                Ordering::Equal => a.1.id.cmp(&b.1.id),
                other => other,
            },
            other => other,
        });
        scored.truncate(limit.max(1));

        debug!(
            tenant,
            query,
            candidates = candidate_count,
            results = scored.len(),
            "search ranked"
        );

        let results = scored
            .into_iter()
            .map(|(tier, doc)| {
                let snippets = if include_snippets {
                    self.snippets_for(&doc, query, tier)
                } else {
                    Vec::new()
                };
                SearchResult {
                    document_id: doc.id,
                    name: doc.name,
                    tier,
                    score: tier.score(),
                    updated_at: doc.updated_at,
                    snippets,
                }
            })
            .collect();

        SearchOutcome {
            results,
            degraded: false,
        }
    }

    pub fn default_limit(&self) -> usize {
        self.search.default_limit
    }

    fn snippets_for(&self, doc: &Document, query: &str, tier: RankTier) -> Vec<String> {
        match tier {
            RankTier::ContentMatch => extract_snippets(
                &doc.text,
                query,
                self.snippets.max_snippets,
                self.snippets.snippet_length,
            ),
            // Name/category matches have no content position to excerpt;
            // fall back to the document's opening text.
            _ => leading_excerpt(&doc.text, self.snippets.snippet_length),
        }
    }
}

/// First-match-wins tier scoring; `None` excludes the document.
fn score_document(doc: &Document, query: &str) -> Option<RankTier> {
    let query = query.to_lowercase();
    if doc.text.to_lowercase().contains(&query) {
        return Some(RankTier::ContentMatch);
    }
    if doc.name.to_lowercase().contains(&query) {
        return Some(RankTier::FilenameMatch);
    }
    if let Some(ref category) = doc.category {
        if category.to_lowercase().contains(&query) {
            return Some(RankTier::CategoryMatch);
        }
    }
    None
}

fn leading_excerpt(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let excerpt: String = trimmed.chars().take(max_chars).collect();
    vec![excerpt]
}
