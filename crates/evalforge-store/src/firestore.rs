//! Firestore REST implementation of [`DocumentStore`].
//!
//! Documents live under
//! `projects/{project}/databases/{database}/documents/{collection}/{doc_id}`.
//! Transforms use optimistic concurrency: read the document with its
//! `updateTime`, apply the closure, then commit with an `updateTime`
//! precondition and retry on conflict.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use evalforge_config::FirestoreConfig;

use crate::error::StoreError;
use crate::store::{DocumentStore, Filter, ListQuery, Page, TransformFn};
use crate::value::{from_firestore_fields, to_firestore_fields, to_firestore_value};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const TRANSFORM_RETRIES: usize = 3;

/// Firestore-backed document store.
pub struct FirestoreStore {
    base_url: String,
    project_id: String,
    database_id: String,
    /// Bearer token for the REST API, typically minted from the runtime's
    /// service account. Refresh is the deployment's concern.
    access_token: String,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl FirestoreStore {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if no project id is configured.
    pub fn from_config(config: &FirestoreConfig, access_token: String) -> Result<Self, StoreError> {
        let project_id = config.project_id.clone().ok_or_else(|| {
            StoreError::Transport("GOOGLE_CLOUD_PROJECT is required for Firestore".to_string())
        })?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id,
            database_id: config.database_id.clone(),
            access_token,
            client: std::sync::OnceLock::new(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    fn doc_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.documents_root(),
            collection,
            doc_id
        )
    }

    fn doc_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, doc_id)
    }

    async fn fetch_raw(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<(Value, Option<String>)>, StoreError> {
        let response = self
            .client()
            .get(self.doc_url(collection, doc_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let update_time = body
            .get("updateTime")
            .and_then(Value::as_str)
            .map(str::to_string);
        let doc = from_firestore_fields(body.get("fields").unwrap_or(&Value::Null));
        Ok(Some((doc, update_time)))
    }

    async fn commit_write(&self, write: Value) -> Result<reqwest::Response, StoreError> {
        let url = format!(
            "{}/projects/{}/databases/{}/documents:commit",
            self.base_url, self.project_id, self.database_id
        );
        self.client()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({"writes": [write]}))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn run_query(&self, structured_query: Value) -> Result<Vec<(String, Value)>, StoreError> {
        let url = format!(
            "{}/{}:runQuery",
            self.base_url,
            self.documents_root()
        );
        let response = self
            .client()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({"structuredQuery": structured_query}))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let mut docs = Vec::new();
        for row in rows {
            let Some(document) = row.get("document") else {
                continue;
            };
            let id = document
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| name.rsplit('/').next())
                .unwrap_or_default()
                .to_string();
            let doc = from_firestore_fields(document.get("fields").unwrap_or(&Value::Null));
            docs.push((id, doc));
        }
        Ok(docs)
    }

    fn build_where(filters: &[Filter]) -> Option<Value> {
        if filters.is_empty() {
            return None;
        }
        let field_filters: Vec<Value> = filters
            .iter()
            .map(|f| {
                json!({
                    "fieldFilter": {
                        "field": {"fieldPath": f.field},
                        "op": "EQUAL",
                        "value": to_firestore_value(&f.value),
                    }
                })
            })
            .collect();
        if field_filters.len() == 1 {
            Some(field_filters.into_iter().next().expect("one filter"))
        } else {
            Some(json!({
                "compositeFilter": {"op": "AND", "filters": field_filters}
            }))
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Transport(format!("HTTP {status}: {body}")))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.fetch_raw(collection, doc_id).await?.map(|(doc, _)| doc))
    }

    async fn set(&self, collection: &str, doc_id: &str, doc: Value) -> Result<(), StoreError> {
        let write = json!({
            "update": {
                "name": self.doc_name(collection, doc_id),
                "fields": to_firestore_fields(&doc),
            }
        });
        let response = self.commit_write(write).await?;
        check_status(response).await?;
        Ok(())
    }

    async fn transform(
        &self,
        collection: &str,
        doc_id: &str,
        mut f: TransformFn,
    ) -> Result<Value, StoreError> {
        for attempt in 0..TRANSFORM_RETRIES {
            let current = self.fetch_raw(collection, doc_id).await?;
            let (doc, update_time) = match current {
                Some((doc, time)) => (Some(doc), time),
                None => (None, None),
            };

            // Re-applied on commit conflict: the closure sees the freshly
            // read document each attempt.
            let updated = f(doc)?;

            let precondition = match &update_time {
                Some(time) => json!({"updateTime": time}),
                None => json!({"exists": false}),
            };
            let write = json!({
                "update": {
                    "name": self.doc_name(collection, doc_id),
                    "fields": to_firestore_fields(&updated),
                },
                "currentDocument": precondition,
            });
            let response = self.commit_write(write).await?;
            let status = response.status().as_u16();
            if status == 409 || status == 412 {
                debug!(collection, doc_id, attempt, "transform commit conflict");
                continue;
            }
            check_status(response).await?;
            return Ok(updated);
        }
        Err(StoreError::Conflict {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
        })
    }

    async fn list(&self, collection: &str, query: ListQuery) -> Result<Page, StoreError> {
        let mut structured = json!({
            "from": [{"collectionId": collection}],
        });
        if let Some(where_clause) = Self::build_where(&query.filters) {
            structured["where"] = where_clause;
        }
        if query.order_by_created_at {
            structured["orderBy"] = json!([
                {"field": {"fieldPath": "created_at"}, "direction": "DESCENDING"},
                {"field": {"fieldPath": "__name__"}, "direction": "DESCENDING"}
            ]);
        }
        if let Some(cursor) = &query.cursor {
            // Cursor is the previous page's last document id; anchor the
            // query after that document's order-by values.
            if let Some((doc, _)) = self.fetch_raw(collection, cursor).await? {
                let created_at = doc.get("created_at").cloned().unwrap_or(Value::Null);
                structured["startAt"] = json!({
                    "values": [
                        to_firestore_value(&created_at),
                        {"referenceValue": self.doc_name(collection, cursor)}
                    ],
                    "before": false,
                });
            }
        }
        if query.limit > 0 {
            // limit + 1 so callers can detect a further page.
            structured["limit"] = json!(query.limit + 1);
        }

        let mut docs = self.run_query(structured).await?;
        let has_more = query.limit > 0 && docs.len() > query.limit;
        if has_more {
            docs.truncate(query.limit);
        }
        let next_cursor = if has_more {
            docs.last().map(|(id, _)| id.clone())
        } else {
            None
        };
        Ok(Page { docs, next_cursor })
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let url = format!(
            "{}/{}:runAggregationQuery",
            self.base_url,
            self.documents_root()
        );
        let mut structured = json!({"from": [{"collectionId": collection}]});
        if let Some(where_clause) = Self::build_where(filters) {
            structured["where"] = where_clause;
        }
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": structured,
                "aggregations": [{"count": {}, "alias": "total"}],
            }
        });
        let response = self
            .client()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if response.status().is_success() {
            let rows: Vec<Value> = response
                .json()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            let count = rows
                .first()
                .and_then(|r| r.pointer("/result/aggregateFields/total/integerValue"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(count) = count {
                return Ok(count);
            }
        }

        // Aggregation unavailable; stream-count instead.
        debug!(collection, "aggregation count unavailable, falling back to stream count");
        let docs = self
            .list(
                collection,
                ListQuery {
                    filters: filters.to_vec(),
                    limit: 0,
                    cursor: None,
                    order_by_created_at: false,
                },
            )
            .await?;
        Ok(docs.docs.len())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), StoreError> {
        let response = self
            .client()
            .delete(self.doc_url(collection, doc_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        FirestoreStore {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: "proj".to_string(),
            database_id: "(default)".to_string(),
            access_token: "token".to_string(),
            client: std::sync::OnceLock::new(),
        }
    }

    #[test]
    fn document_paths_are_well_formed() {
        let s = store();
        assert_eq!(
            s.doc_name("evalforge_suggestions", "sugg_1"),
            "projects/proj/databases/(default)/documents/evalforge_suggestions/sugg_1"
        );
        assert!(s
            .doc_url("evalforge_raw_traces", "t1")
            .ends_with("documents/evalforge_raw_traces/t1"));
    }

    #[test]
    fn from_config_requires_project() {
        let config = FirestoreConfig {
            collection_prefix: "evalforge_".to_string(),
            project_id: None,
            database_id: "(default)".to_string(),
        };
        assert!(FirestoreStore::from_config(&config, "t".into()).is_err());
    }

    #[test]
    fn where_clause_single_filter_is_flat() {
        let clause = FirestoreStore::build_where(&[Filter::eq("status", "pending")]).unwrap();
        assert_eq!(clause["fieldFilter"]["op"], "EQUAL");
        assert_eq!(
            clause["fieldFilter"]["value"]["stringValue"],
            "pending"
        );
    }

    #[test]
    fn where_clause_multiple_filters_compose_with_and() {
        let clause = FirestoreStore::build_where(&[
            Filter::eq("status", "pending"),
            Filter::eq("type", "eval"),
        ])
        .unwrap();
        assert_eq!(clause["compositeFilter"]["op"], "AND");
        assert_eq!(
            clause["compositeFilter"]["filters"].as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn empty_filters_build_no_where() {
        assert!(FirestoreStore::build_where(&[]).is_none());
    }
}
