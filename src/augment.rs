//! Prompt augmentation: knowledge base retrieval plus AI generation.
//!
//! The [`PromptAugmenter`] is the completion path's orchestrator. For a
//! user message it:
//!
//! 1. Runs a tenant-scoped search through the result cache.
//! 2. Builds a context block from the top-ranked results, capped by a
//!    result count and a soft token budget.
//! 3. Renders the augmented prompt and hands it to the primary AI
//!    provider, falling back once if a fallback is configured.
//!
//! Retrieval failure never blocks generation: a degraded or empty search
//! yields a prompt with no context block and an empty source list.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::config::{AugmentConfig, ProviderConfig};
use crate::error::EngineError;
use crate::models::{Completion, EnhancedPrompt, SearchFilters, SearchResult, SourceRef};
use crate::provider::{AiProvider, CompletionRequest};
use crate::search::SearchEngine;

pub struct PromptAugmenter {
    engine: Arc<SearchEngine>,
    cache: Arc<ResultCache>,
    augment: AugmentConfig,
    provider: ProviderConfig,
    primary: Box<dyn AiProvider>,
    fallback: Option<Box<dyn AiProvider>>,
}

impl PromptAugmenter {
    pub fn new(
        engine: Arc<SearchEngine>,
        cache: Arc<ResultCache>,
        augment: AugmentConfig,
        provider: ProviderConfig,
        primary: Box<dyn AiProvider>,
        fallback: Option<Box<dyn AiProvider>>,
    ) -> Self {
        Self {
            engine,
            cache,
            augment,
            provider,
            primary,
            fallback,
        }
    }

    /// Retrieve context for `message` and assemble an [`EnhancedPrompt`].
    ///
    /// The context block holds at most `max_results` documents (config
    /// default when `None`), trimmed further to the token budget by
    /// dropping whole results from the bottom of the ranking.
    pub async fn enhance(
        &self,
        tenant: &str,
        message: &str,
        max_results: Option<usize>,
    ) -> EnhancedPrompt {
        let max_results = max_results.unwrap_or(self.augment.max_results).max(1);
        let filters = SearchFilters::default();
        let key = CacheKey::new(tenant, message, &filters);

        let outcome = self
            .cache
            .get_or_compute(key, || {
                self.engine
                    .search(tenant, message, &filters, crate::search::FETCH_CEILING, true)
            })
            .await;

        if outcome.degraded {
            warn!(tenant, "retrieval degraded, completing without context");
        }

        self.assemble(message, &outcome.results, max_results)
    }

    fn assemble(
        &self,
        message: &str,
        results: &[SearchResult],
        max_results: usize,
    ) -> EnhancedPrompt {
        let budget_chars = self.augment.token_budget * self.augment.chars_per_token;

        let mut sections: Vec<String> = Vec::new();
        let mut sources: Vec<SourceRef> = Vec::new();
        let mut used_chars = 0usize;

        for result in results.iter().take(max_results) {
            let section = render_section(result);
            if section.is_empty() {
                continue;
            }
            // Whole-result granularity: a result that does not fit is
            // dropped along with everything ranked below it.
            let cost = section.len() + if sections.is_empty() { 0 } else { 2 };
            if used_chars + cost > budget_chars {
                break;
            }
            used_chars += cost;
            sections.push(section);
            sources.push(SourceRef {
                id: result.document_id.clone(),
                name: result.name.clone(),
            });
        }

        let context_block = sections.join("\n\n");
        let token_estimate = context_block.len() / self.augment.chars_per_token.max(1);

        debug!(
            sources = sources.len(),
            token_estimate, "assembled context block"
        );

        EnhancedPrompt {
            original_message: message.to_string(),
            context_block,
            sources,
            token_estimate,
        }
    }

    /// Enhance `message` and generate a completion for it.
    ///
    /// With `use_knowledge_base` off, retrieval is skipped entirely and
    /// the message goes to the provider as-is. The primary provider is
    /// tried first; on failure the configured fallback gets exactly one
    /// attempt before the whole operation is reported unavailable.
    pub async fn complete(
        &self,
        tenant: &str,
        message: &str,
        max_results: Option<usize>,
        use_knowledge_base: bool,
    ) -> Result<(Completion, EnhancedPrompt), EngineError> {
        let prompt = if use_knowledge_base {
            self.enhance(tenant, message, max_results).await
        } else {
            EnhancedPrompt::plain(message)
        };
        let request = CompletionRequest::from_config(prompt.render(), &self.provider);

        match self.primary.complete(&request).await {
            Ok(completion) => Ok((completion, prompt)),
            Err(primary_err) => {
                warn!(
                    provider = self.primary.name(),
                    error = %primary_err,
                    "primary provider failed"
                );
                let Some(fallback) = &self.fallback else {
                    return Err(EngineError::GenerationUnavailable(primary_err.to_string()));
                };
                match fallback.complete(&request).await {
                    Ok(completion) => Ok((completion, prompt)),
                    Err(fallback_err) => {
                        warn!(
                            provider = fallback.name(),
                            error = %fallback_err,
                            "fallback provider failed"
                        );
                        Err(EngineError::GenerationUnavailable(format!(
                            "primary: {}; fallback: {}",
                            primary_err, fallback_err
                        )))
                    }
                }
            }
        }
    }
}

/// Render one search result as a labeled context section.
fn render_section(result: &SearchResult) -> String {
    if result.snippets.is_empty() {
        return String::new();
    }
    format!(
        "[{} ({})]\n{}",
        result.name,
        result.document_id,
        result.snippets.join("\n")
    )
}
