//! In-memory [`KnowledgeStore`] for tests and single-process deployments.
//!
//! A `HashMap` behind `std::sync::RwLock`; filter matching is category
//! equality, tag-subset containment, and file-type equality.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, SearchFilters};

use super::KnowledgeStore;

/// Thread-safe in-memory document store.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_filters(doc: &Document, filters: &SearchFilters) -> bool {
    if let Some(ref category) = filters.category {
        match doc.category {
            Some(ref c) if c.eq_ignore_ascii_case(category) => {}
            _ => return false,
        }
    }
    if !filters.tags.is_empty() && !filters.tags.iter().all(|t| doc.tags.contains(t)) {
        return false;
    }
    if let Some(doc_type) = filters.doc_type {
        if doc.doc_type != doc_type {
            return false;
        }
    }
    true
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn insert_document(&self, doc: Document) -> Result<()> {
        self.docs.write().unwrap().insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn update_document(&self, doc: Document) -> Result<()> {
        self.docs.write().unwrap().insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn get_document(&self, tenant: &str, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(id).filter(|d| d.owner == tenant).cloned())
    }

    async fn delete_document(&self, tenant: &str, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        match docs.get(id) {
            Some(d) if d.owner == tenant => {
                docs.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_candidates(
        &self,
        tenant: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .values()
            .filter(|d| d.owner == tenant && matches_filters(d, filters))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use chrono::Utc;

    fn doc(id: &str, owner: &str, category: Option<&str>, tags: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            owner: owner.to_string(),
            name: format!("{}.txt", id),
            doc_type: DocumentType::Txt,
            text: "body".to_string(),
            metadata: Default::default(),
            category: category.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let store = InMemoryStore::new();
        store.insert_document(doc("a", "t1", None, &[])).await.unwrap();
        store.insert_document(doc("b", "t2", None, &[])).await.unwrap();

        let t1 = store
            .find_candidates("t1", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].id, "a");

        assert!(store.get_document("t1", "b").await.unwrap().is_none());
        assert!(!store.delete_document("t1", "b").await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn category_and_tag_filters() {
        let store = InMemoryStore::new();
        store
            .insert_document(doc("a", "t", Some("policies"), &["refund", "legal"]))
            .await
            .unwrap();
        store
            .insert_document(doc("b", "t", Some("guides"), &["refund"]))
            .await
            .unwrap();

        let by_category = SearchFilters {
            category: Some("Policies".to_string()),
            ..Default::default()
        };
        let hits = store.find_candidates("t", &by_category).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let mut by_tags = SearchFilters::default();
        by_tags.tags.insert("refund".to_string());
        by_tags.tags.insert("legal".to_string());
        let hits = store.find_candidates("t", &by_tags).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn delete_then_get() {
        let store = InMemoryStore::new();
        store.insert_document(doc("a", "t", None, &[])).await.unwrap();
        assert!(store.delete_document("t", "a").await.unwrap());
        assert!(store.get_document("t", "a").await.unwrap().is_none());
    }
}
