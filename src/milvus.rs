//! Search index adapter for Milvus, over the REST v2 API.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | collection exists | `POST /v2/vectordb/collections/has` |
//! | create collection | `POST /v2/vectordb/collections/create` |
//! | lookup by source id, count | `POST /v2/vectordb/entities/query` |
//! | insert | `POST /v2/vectordb/entities/insert` |
//! | upsert by key | `POST /v2/vectordb/entities/upsert` |
//!
//! Every response carries a `code`; anything but `0` is an error even when
//! the HTTP status is 200.
//!
//! # Collection layout
//!
//! ```text
//! pk          INT64, primary, auto id
//! text        VARCHAR, analyzer enabled   ──BM25──▶ sparse  SPARSE_FLOAT_VECTOR
//! vector      FLOAT_VECTOR(dense_dims)    (only when embeddings are enabled)
//! source_id   INT64
//! title … related_json, flags, counters   nullable scalars
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use article_sync_core::models::{IndexDocument, IndexMetadata};
use article_sync_core::store::SearchIndex;
use article_sync_core::{StoreKind, SyncError};
use serde_json::{json, Value};

use crate::config::IndexConfig;
use crate::embedding::Embedder;

/// Entities fetched per lookup; more than one means duplicates.
const LOOKUP_LIMIT: usize = 16;

const TEXT_MAX_LEN: usize = 65_535;

/// Scalar metadata fields: name, Milvus type, VARCHAR max length.
const METADATA_FIELDS: &[(&str, &str, usize)] = &[
    ("title", "VarChar", 2048),
    ("header", "VarChar", 8192),
    ("author", "VarChar", 512),
    ("category_name", "VarChar", 512),
    ("link", "VarChar", 2048),
    ("created_at", "VarChar", 64),
    ("updated_at", "VarChar", 64),
    ("published_time", "VarChar", 64),
    ("related_json", "VarChar", 65_535),
    ("is_comment", "Int32", 0),
    ("is_active", "Int32", 0),
    ("is_hot", "Int32", 0),
    ("is_important", "Int32", 0),
    ("is_top", "Int32", 0),
    ("has_video", "Int32", 0),
    ("comment_count", "Int64", 0),
    ("like_count", "Int64", 0),
    ("dislike_count", "Int64", 0),
    ("hit_count", "Int64", 0),
];

pub struct MilvusIndex {
    client: reqwest::Client,
    base: String,
    collection: String,
    token: Option<String>,
    dense_dims: usize,
    embedder: Option<Embedder>,
}

impl MilvusIndex {
    pub fn new(config: &IndexConfig, embedder: Option<Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: config.uri.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            token: config.token.clone(),
            dense_dims: config.dense_dims,
            embedder,
        })
    }

    async fn call(&self, path: &str, body: Value) -> Result<Value, SyncError> {
        let mut req = self
            .client
            .post(format!("{}/v2/vectordb/{}", self.base, path))
            .json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::connectivity(
                StoreKind::Index,
                format!("HTTP {}: {}", status, text),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::store(
                StoreKind::Index,
                format!("HTTP {}: {}", status, text),
            ));
        }

        let json: Value = response.json().await.map_err(transport_error)?;
        check_code(json)
    }

    /// Creates the collection if it does not exist. Returns `true` when it
    /// was created.
    pub async fn ensure_collection(&self) -> Result<bool, SyncError> {
        let has = self
            .call("collections/has", json!({ "collectionName": self.collection }))
            .await?;
        if has.pointer("/data/has").and_then(Value::as_bool) == Some(true) {
            return Ok(false);
        }

        let dense = self.embedder.as_ref().map(|_| self.dense_dims);
        self.call("collections/create", create_collection_body(&self.collection, dense))
            .await?;
        tracing::info!(collection = %self.collection, dense_dims = ?dense, "index collection created");
        Ok(true)
    }

    async fn entity_rows(&self, docs: &[IndexDocument], with_pk: bool) -> Result<Vec<Value>, SyncError> {
        let vectors = match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
                let vectors = embedder
                    .embed(&texts)
                    .await
                    .map_err(|e| SyncError::store(StoreKind::Index, format!("embedding failed: {:#}", e)))?;
                Some(vectors)
            }
            None => None,
        };

        docs.iter()
            .enumerate()
            .map(|(i, doc)| {
                let vector = vectors.as_ref().map(|v| v[i].as_slice());
                entity_row(doc, vector, with_pk)
            })
            .collect()
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        SyncError::connectivity(StoreKind::Index, e.to_string())
    } else {
        SyncError::store(StoreKind::Index, e.to_string())
    }
}

/// Unwraps the REST envelope, failing on a non-zero `code`.
fn check_code(json: Value) -> Result<Value, SyncError> {
    let code = json.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(SyncError::store(
            StoreKind::Index,
            format!("code {}: {}", code, message),
        ));
    }
    Ok(json)
}

fn create_collection_body(collection: &str, dense_dims: Option<usize>) -> Value {
    let mut fields = vec![
        json!({ "fieldName": "pk", "dataType": "Int64", "isPrimary": true }),
        json!({
            "fieldName": "text",
            "dataType": "VarChar",
            "elementTypeParams": { "max_length": TEXT_MAX_LEN, "enable_analyzer": true }
        }),
        json!({ "fieldName": "sparse", "dataType": "SparseFloatVector" }),
        json!({ "fieldName": "source_id", "dataType": "Int64" }),
    ];
    if let Some(dim) = dense_dims {
        fields.push(json!({
            "fieldName": "vector",
            "dataType": "FloatVector",
            "elementTypeParams": { "dim": dim }
        }));
    }
    for (name, data_type, max_length) in METADATA_FIELDS {
        let mut field = json!({ "fieldName": name, "dataType": data_type, "nullable": true });
        if *max_length > 0 {
            field["elementTypeParams"] = json!({ "max_length": max_length });
        }
        fields.push(field);
    }

    let mut index_params = vec![json!({
        "fieldName": "sparse",
        "indexName": "sparse",
        "indexType": "SPARSE_INVERTED_INDEX",
        "metricType": "BM25",
        "params": { "inverted_index_algo": "DAAT_MAXSCORE" }
    })];
    if dense_dims.is_some() {
        index_params.push(json!({
            "fieldName": "vector",
            "indexName": "vector",
            "indexType": "FLAT",
            "metricType": "COSINE"
        }));
    }

    json!({
        "collectionName": collection,
        "schema": {
            "autoId": true,
            "enableDynamicField": false,
            "fields": fields,
            "functions": [{
                "name": "text_bm25",
                "type": "BM25",
                "inputFieldNames": ["text"],
                "outputFieldNames": ["sparse"],
                "params": {}
            }]
        },
        "indexParams": index_params
    })
}

fn entity_row(doc: &IndexDocument, vector: Option<&[f32]>, with_pk: bool) -> Result<Value, SyncError> {
    let mut row = serde_json::to_value(&doc.metadata).map_err(|e| {
        SyncError::per_record(doc.metadata.source_id, format!("metadata: {}", e))
    })?;
    row["text"] = Value::String(doc.text.clone());
    if let Some(v) = vector {
        row["vector"] = json!(v);
    }
    if with_pk {
        let pk = doc.pk.ok_or_else(|| {
            SyncError::per_record(doc.metadata.source_id, "upsert without an index key")
        })?;
        row["pk"] = json!(pk);
    }
    Ok(row)
}

fn output_fields() -> Vec<&'static str> {
    let mut fields = vec!["pk", "text", "source_id"];
    fields.extend(METADATA_FIELDS.iter().map(|(name, _, _)| *name));
    fields
}

/// Milvus may return INT64 values as numbers or as strings.
fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn parse_documents(json: &Value) -> Result<Vec<IndexDocument>, SyncError> {
    let rows = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::store(StoreKind::Index, "query response has no data array"))?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        let pk = row.get("pk").and_then(as_i64);
        let text = row
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut fields = row.clone();
        if let Some(source_id) = row.get("source_id").and_then(as_i64) {
            fields["source_id"] = json!(source_id);
        }
        let metadata: IndexMetadata = serde_json::from_value(fields).map_err(|e| {
            SyncError::store(StoreKind::Index, format!("undecodable entity: {}", e))
        })?;
        docs.push(IndexDocument { pk, text, metadata });
    }
    docs.sort_by_key(|d| d.pk);
    Ok(docs)
}

fn parse_count(json: &Value) -> Result<i64, SyncError> {
    json.pointer("/data/0/count(*)")
        .and_then(as_i64)
        .ok_or_else(|| SyncError::store(StoreKind::Index, "count response has no count(*)"))
}

#[async_trait]
impl SearchIndex for MilvusIndex {
    async fn lookup_by_source_id(&self, source_id: i64) -> Result<Option<IndexDocument>, SyncError> {
        let json = self
            .call(
                "entities/query",
                json!({
                    "collectionName": self.collection,
                    "filter": format!("source_id == {}", source_id),
                    "outputFields": output_fields(),
                    "limit": LOOKUP_LIMIT
                }),
            )
            .await?;
        let docs = parse_documents(&json)?;
        if docs.len() > 1 {
            let keys: Vec<Option<i64>> = docs.iter().map(|d| d.pk).collect();
            tracing::warn!(source_id, ?keys, "duplicate index entries; using the lowest key");
        }
        Ok(docs.into_iter().next())
    }

    async fn insert(&self, docs: &[IndexDocument]) -> Result<Vec<i64>, SyncError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.entity_rows(docs, false).await?;
        let json = self
            .call(
                "entities/insert",
                json!({ "collectionName": self.collection, "data": data }),
            )
            .await?;
        Ok(json
            .pointer("/data/insertIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(as_i64).collect())
            .unwrap_or_default())
    }

    async fn upsert(&self, doc: &IndexDocument) -> Result<(), SyncError> {
        let data = self.entity_rows(std::slice::from_ref(doc), true).await?;
        self.call(
            "entities/upsert",
            json!({ "collectionName": self.collection, "data": data }),
        )
        .await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64, SyncError> {
        let json = self
            .call(
                "entities/query",
                json!({
                    "collectionName": self.collection,
                    "filter": "",
                    "outputFields": ["count(*)"]
                }),
            )
            .await?;
        parse_count(&json)
    }
}
