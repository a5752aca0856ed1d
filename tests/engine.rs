//! End-to-end tests for the library API: ingest, search, cache, and
//! augmented completion wired together the way the server wires them.

use anyhow::Result;
use async_trait::async_trait;
use knowledge_engine::augment::PromptAugmenter;
use knowledge_engine::cache::{CacheKey, ResultCache};
use knowledge_engine::config::{AugmentConfig, ProviderConfig, SearchConfig, SnippetConfig};
use knowledge_engine::error::EngineError;
use knowledge_engine::ingest::{DocumentUpload, Ingestor, MetadataPatch};
use knowledge_engine::models::{
    Completion, Document, DocumentType, SearchFilters, SearchOutcome, Sentiment, Usage,
};
use knowledge_engine::provider::{AiProvider, CompletionRequest};
use knowledge_engine::search::{SearchEngine, FETCH_CEILING};
use knowledge_engine::store::memory::InMemoryStore;
use knowledge_engine::store::KnowledgeStore;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ─── Test doubles ───────────────────────────────────────────────────

/// Store wrapper that counts candidate scans, for cache assertions.
struct CountingStore {
    inner: InMemoryStore,
    scans: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            scans: AtomicUsize::new(0),
        }
    }

    fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeStore for CountingStore {
    async fn insert_document(&self, doc: Document) -> Result<()> {
        self.inner.insert_document(doc).await
    }

    async fn update_document(&self, doc: Document) -> Result<()> {
        self.inner.update_document(doc).await
    }

    async fn get_document(&self, tenant: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get_document(tenant, id).await
    }

    async fn delete_document(&self, tenant: &str, id: &str) -> Result<bool> {
        self.inner.delete_document(tenant, id).await
    }

    async fn find_candidates(&self, tenant: &str, filters: &SearchFilters) -> Result<Vec<Document>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.find_candidates(tenant, filters).await
    }
}

/// Store whose candidate scans always fail, for degradation tests.
struct BrokenStore;

#[async_trait]
impl KnowledgeStore for BrokenStore {
    async fn insert_document(&self, _doc: Document) -> Result<()> {
        Ok(())
    }

    async fn update_document(&self, _doc: Document) -> Result<()> {
        anyhow::bail!("store offline")
    }

    async fn get_document(&self, _tenant: &str, _id: &str) -> Result<Option<Document>> {
        anyhow::bail!("store offline")
    }

    async fn delete_document(&self, _tenant: &str, _id: &str) -> Result<bool> {
        anyhow::bail!("store offline")
    }

    async fn find_candidates(
        &self,
        _tenant: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<Document>> {
        anyhow::bail!("store offline")
    }
}

/// Store whose candidate scans hang far past any timeout.
struct SlowStore;

#[async_trait]
impl KnowledgeStore for SlowStore {
    async fn insert_document(&self, _doc: Document) -> Result<()> {
        Ok(())
    }

    async fn update_document(&self, _doc: Document) -> Result<()> {
        Ok(())
    }

    async fn get_document(&self, _tenant: &str, _id: &str) -> Result<Option<Document>> {
        Ok(None)
    }

    async fn delete_document(&self, _tenant: &str, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn find_candidates(
        &self,
        _tenant: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<Document>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Provider that echoes whether the prompt carried context.
struct EchoProvider {
    label: &'static str,
    fail: bool,
}

#[async_trait]
impl AiProvider for EchoProvider {
    fn name(&self) -> &str {
        self.label
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        if self.fail {
            anyhow::bail!("{} is down", self.label)
        }
        Ok(Completion {
            content: format!("{} saw: {}", self.label, request.prompt),
            usage: Usage::default(),
        })
    }

    async fn analyze_sentiment(&self, _text: &str) -> Result<Sentiment> {
        Ok(Sentiment {
            sentiment: "neutral".to_string(),
            rating: 3,
            confidence: 1.0,
        })
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

/// Minimal valid PDF: body objects first, then an xref with correct byte
/// offsets so lopdf can read the structure and the Info dictionary.
fn minimal_pdf(author: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 40 >> stream\nBT /F1 12 Tf 100 700 Td (body text) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let o6 = out.len();
    out.extend_from_slice(format!("6 0 obj << /Author ({}) >> endobj\n", author).as_bytes());
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 7\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5, o6] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 7 /Root 1 0 R /Info 6 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal DOCX: a ZIP holding word/document.xml with one paragraph.
fn minimal_docx(phrase: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

// ─── Harness ────────────────────────────────────────────────────────

struct Harness {
    store: Arc<CountingStore>,
    ingestor: Ingestor,
    engine: Arc<SearchEngine>,
    cache: Arc<ResultCache>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(CountingStore::new());
        let ingestor = Ingestor::new(store.clone(), Default::default());
        let engine = Arc::new(SearchEngine::new(
            store.clone(),
            SearchConfig::default(),
            SnippetConfig::default(),
        ));
        let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
        Self {
            store,
            ingestor,
            engine,
            cache,
        }
    }

    async fn upload_txt(&self, tenant: &str, name: &str, content: &str) -> Document {
        let upload = DocumentUpload {
            name: name.to_string(),
            doc_type: None,
            content: Some(content.to_string()),
            content_base64: None,
            category: None,
            tags: BTreeSet::new(),
        };
        self.ingestor.ingest(tenant, upload).await.unwrap().document
    }

    async fn search(&self, tenant: &str, query: &str) -> SearchOutcome {
        let filters = SearchFilters::default();
        let key = CacheKey::new(tenant, query, &filters);
        self.cache
            .get_or_compute(key, || {
                self.engine
                    .search(tenant, query, &filters, FETCH_CEILING, true)
            })
            .await
    }

    fn augmenter(&self, primary: EchoProvider, fallback: Option<EchoProvider>) -> PromptAugmenter {
        PromptAugmenter::new(
            self.engine.clone(),
            self.cache.clone(),
            AugmentConfig::default(),
            ProviderConfig::default(),
            Box::new(primary),
            fallback.map(|f| Box::new(f) as Box<dyn AiProvider>),
        )
    }
}

// ─── Ingest and search ──────────────────────────────────────────────

#[tokio::test]
async fn txt_upload_is_searchable_by_content() {
    let h = Harness::new();
    h.upload_txt(
        "acme",
        "policy.txt",
        "Our refund policy: refunds are issued within 30 days of purchase.",
    )
    .await;
    h.upload_txt("acme", "roadmap.txt", "Q3 roadmap and milestones.")
        .await;

    let outcome = h.search("acme", "refund").await;
    assert!(!outcome.degraded);
    assert_eq!(outcome.results.len(), 1);

    let hit = &outcome.results[0];
    assert_eq!(hit.name, "policy.txt");
    assert_eq!(hit.tier.reason(), "content_match");
    assert!(hit.snippets.iter().any(|s| s.contains("refund")));
}

#[tokio::test]
async fn filename_match_ranks_below_content_match() {
    let h = Harness::new();
    h.upload_txt("acme", "notes.txt", "The invoice process is simple.")
        .await;
    h.upload_txt("acme", "invoice-guide.txt", "How to bill clients.")
        .await;

    let outcome = h.search("acme", "invoice").await;
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].tier.reason(), "content_match");
    assert_eq!(outcome.results[0].name, "notes.txt");
    assert_eq!(outcome.results[1].tier.reason(), "filename_match");
}

#[tokio::test]
async fn category_match_is_lowest_tier() {
    let h = Harness::new();
    let doc = h.upload_txt("acme", "misc.txt", "Nothing relevant here.").await;
    let patch = MetadataPatch {
        name: None,
        category: Some(Some("billing".to_string())),
        tags: None,
    };
    h.ingestor
        .update_metadata("acme", &doc.id, patch)
        .await
        .unwrap();

    let outcome = h.search("acme", "billing").await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].tier.reason(), "category_match");
    assert_eq!(outcome.results[0].score, 1);
}

#[tokio::test]
async fn tenants_never_see_each_other() {
    let h = Harness::new();
    h.upload_txt("acme", "secrets.txt", "acme internal pricing").await;

    let outcome = h.search("globex", "pricing").await;
    assert!(outcome.results.is_empty());
    assert!(!outcome.degraded);
}

#[tokio::test]
async fn pdf_upload_keeps_info_metadata() {
    use base64::Engine as _;
    let h = Harness::new();
    let upload = DocumentUpload {
        name: "report.pdf".to_string(),
        doc_type: None,
        content: None,
        content_base64: Some(
            base64::engine::general_purpose::STANDARD.encode(minimal_pdf("Grace Hopper")),
        ),
        category: None,
        tags: BTreeSet::new(),
    };
    let receipt = h.ingestor.ingest("acme", upload).await.unwrap();
    let doc = receipt.document;
    assert_eq!(doc.doc_type, DocumentType::Pdf);
    assert_eq!(doc.metadata.get("author").map(String::as_str), Some("Grace Hopper"));
    assert_eq!(doc.metadata.get("page_count").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn docx_upload_is_searchable() {
    use base64::Engine as _;
    let h = Harness::new();
    let upload = DocumentUpload {
        name: "onboarding.docx".to_string(),
        doc_type: None,
        content: None,
        content_base64: Some(
            base64::engine::general_purpose::STANDARD
                .encode(minimal_docx("welcome aboard new hires")),
        ),
        category: None,
        tags: BTreeSet::new(),
    };
    let receipt = h.ingestor.ingest("acme", upload).await.unwrap();
    assert_eq!(receipt.document.text, "welcome aboard new hires");

    let outcome = h.search("acme", "new hires").await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].name, "onboarding.docx");
}

#[tokio::test]
async fn delete_removes_from_search() {
    let h = Harness::new();
    let doc = h.upload_txt("acme", "old.txt", "deprecated workflow notes").await;

    assert!(h.store.delete_document("acme", &doc.id).await.unwrap());
    // A fresh cache key, so the scan actually reruns.
    let outcome = h.search("acme", "deprecated workflow").await;
    assert!(outcome.results.is_empty());
}

// ─── Cache behavior ─────────────────────────────────────────────────

#[tokio::test]
async fn repeated_search_hits_cache_and_is_identical() {
    let h = Harness::new();
    h.upload_txt("acme", "a.txt", "alpha beta gamma").await;
    h.upload_txt("acme", "b.txt", "beta delta").await;

    let first = h.search("acme", "beta").await;
    let scans_after_first = h.store.scan_count();
    let second = h.search("acme", "beta").await;

    assert_eq!(h.store.scan_count(), scans_after_first);
    assert_eq!(first, second);
}

#[tokio::test]
async fn query_normalization_shares_cache_entries() {
    let h = Harness::new();
    h.upload_txt("acme", "a.txt", "alpha beta gamma").await;

    h.search("acme", "Beta").await;
    let scans = h.store.scan_count();
    h.search("acme", "  beta  ").await;
    assert_eq!(h.store.scan_count(), scans);
}

#[tokio::test]
async fn different_filters_do_not_share_entries() {
    let h = Harness::new();
    h.upload_txt("acme", "a.txt", "alpha beta").await;

    h.search("acme", "beta").await;
    let scans = h.store.scan_count();

    let filters = SearchFilters {
        doc_type: Some(DocumentType::Pdf),
        ..Default::default()
    };
    let key = CacheKey::new("acme", "beta", &filters);
    let outcome = h
        .cache
        .get_or_compute(key, || {
            h.engine.search("acme", "beta", &filters, FETCH_CEILING, true)
        })
        .await;

    assert!(outcome.results.is_empty());
    assert_eq!(h.store.scan_count(), scans + 1);
}

// ─── Degradation ────────────────────────────────────────────────────

#[tokio::test]
async fn broken_store_degrades_instead_of_failing() {
    let engine = Arc::new(SearchEngine::new(
        Arc::new(BrokenStore),
        SearchConfig::default(),
        SnippetConfig::default(),
    ));
    let outcome = engine
        .search("acme", "anything", &SearchFilters::default(), 10, true)
        .await;
    assert!(outcome.degraded);
    assert!(outcome.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_store_times_out_into_degraded_outcome() {
    let config = SearchConfig {
        store_timeout_secs: 1,
        ..SearchConfig::default()
    };
    let engine = Arc::new(SearchEngine::new(
        Arc::new(SlowStore),
        config,
        SnippetConfig::default(),
    ));
    let outcome = engine
        .search("acme", "anything", &SearchFilters::default(), 10, true)
        .await;
    assert!(outcome.degraded);
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn completion_proceeds_without_knowledge_when_store_is_broken() {
    let engine = Arc::new(SearchEngine::new(
        Arc::new(BrokenStore),
        SearchConfig::default(),
        SnippetConfig::default(),
    ));
    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    let augmenter = PromptAugmenter::new(
        engine,
        cache.clone(),
        AugmentConfig::default(),
        ProviderConfig::default(),
        Box::new(EchoProvider {
            label: "primary",
            fail: false,
        }),
        None,
    );

    let (completion, prompt) = augmenter.complete("acme", "help me", None, true).await.unwrap();
    assert_eq!(prompt.context_block, "");
    assert!(prompt.sources.is_empty());
    // The raw message goes through untouched.
    assert_eq!(completion.content, "primary saw: help me");
    // Degraded outcomes must not be cached.
    assert_eq!(cache.len(), 0);
}

// ─── Augmented completion ───────────────────────────────────────────

#[tokio::test]
async fn completion_carries_knowledge_context() {
    let h = Harness::new();
    h.upload_txt(
        "acme",
        "policy.txt",
        "Refunds are issued within 30 days of purchase.",
    )
    .await;

    let augmenter = h.augmenter(
        EchoProvider {
            label: "primary",
            fail: false,
        },
        None,
    );
    let (completion, prompt) = augmenter
        .complete("acme", "what is our refund window?", None, true)
        .await
        .unwrap();

    assert!(prompt.has_context());
    assert_eq!(prompt.sources.len(), 1);
    assert_eq!(prompt.sources[0].name, "policy.txt");
    assert!(completion.content.contains("Refunds are issued within 30 days"));
    assert!(completion.content.contains("what is our refund window?"));
}

#[tokio::test]
async fn fallback_provider_answers_when_primary_is_down() {
    let h = Harness::new();
    let augmenter = h.augmenter(
        EchoProvider {
            label: "primary",
            fail: true,
        },
        Some(EchoProvider {
            label: "fallback",
            fail: false,
        }),
    );
    let (completion, _) = augmenter.complete("acme", "hello", None, true).await.unwrap();
    assert!(completion.content.starts_with("fallback saw:"));
}

#[tokio::test]
async fn no_provider_available_is_a_clean_error() {
    let h = Harness::new();
    let augmenter = h.augmenter(
        EchoProvider {
            label: "primary",
            fail: true,
        },
        Some(EchoProvider {
            label: "fallback",
            fail: true,
        }),
    );
    let err = augmenter.complete("acme", "hello", None, true).await.unwrap_err();
    assert!(matches!(err, EngineError::GenerationUnavailable(_)));
}
