//! In-memory `DocumentStore` used by tests and local development.
//!
//! Implements the same contract as the Firestore gateway, including
//! transform atomicity (the collection lock is held across the closure)
//! and cursor pagination ordered by `created_at` descending.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{DocumentStore, Filter, ListQuery, Page, TransformFn};

type Collection = BTreeMap<String, Value>;

/// Mutex-guarded document map per collection.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every document of a collection (test helper).
    pub async fn dump(&self, collection: &str) -> Vec<(String, Value)> {
        let data = self.data.lock().await;
        data.get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

fn matches_filters(doc: &Value, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|f| doc.get(&f.field).is_some_and(|v| *v == f.value))
}

fn created_at_of(doc: &Value) -> String {
    doc.get("created_at")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .get(collection)
            .and_then(|c| c.get(doc_id))
            .cloned())
    }

    async fn set(&self, collection: &str, doc_id: &str, doc: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.entry(collection.to_string())
            .or_default()
            .insert(doc_id.to_string(), doc);
        Ok(())
    }

    async fn transform(
        &self,
        collection: &str,
        doc_id: &str,
        mut f: TransformFn,
    ) -> Result<Value, StoreError> {
        let mut data = self.data.lock().await;
        let entry = data.entry(collection.to_string()).or_default();
        let current = entry.get(doc_id).cloned();
        let updated = f(current)?;
        entry.insert(doc_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn list(&self, collection: &str, query: ListQuery) -> Result<Page, StoreError> {
        let data = self.data.lock().await;
        let mut docs: Vec<(String, Value)> = data
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, doc)| matches_filters(doc, &query.filters))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if query.order_by_created_at {
            docs.sort_by(|a, b| {
                created_at_of(&b.1)
                    .cmp(&created_at_of(&a.1))
                    .then_with(|| b.0.cmp(&a.0))
            });
        }

        if let Some(cursor) = &query.cursor {
            if let Some(pos) = docs.iter().position(|(id, _)| id == cursor) {
                docs = docs.split_off(pos + 1);
            }
        }

        let limit = if query.limit == 0 { docs.len() } else { query.limit };
        let has_more = docs.len() > limit;
        docs.truncate(limit);
        let next_cursor = if has_more {
            docs.last().map(|(id, _)| id.clone())
        } else {
            None
        };

        Ok(Page { docs, next_cursor })
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .get(collection)
            .map(|c| c.values().filter(|doc| matches_filters(doc, filters)).count())
            .unwrap_or(0))
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if let Some(c) = data.get_mut(collection) {
            c.remove(doc_id);
        }
        Ok(())
    }
}
