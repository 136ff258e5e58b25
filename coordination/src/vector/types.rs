//! Vector store types (spec §3, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::VectorId;

/// A single stored embedding with its source content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: VectorId,
    pub collection: String,
    pub embedding: Vec<f32>,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "accessCount", default)]
    pub access_count: u64,
    #[serde(default)]
    pub consolidated: bool,
}

impl VectorEntry {
    pub fn new(collection: impl Into<String>, embedding: Vec<f32>, content: impl Into<String>) -> Self {
        Self {
            id: VectorId::new(),
            collection: collection.into(),
            embedding,
            content: content.into(),
            metadata: Value::Null,
            created_at: Utc::now(),
            access_count: 0,
            consolidated: false,
        }
    }
}

/// A predicate over `VectorEntry::metadata`, evaluated after the
/// collection filter. Kept as a closure-free enum so filters can be
/// constructed from deserialized request bodies.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub equals: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &Value) -> bool {
        self.equals.iter().all(|(key, expected)| {
            metadata.get(key).map(|v| v == expected).unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorSearchOptions {
    pub collection: Option<String>,
    pub limit: usize,
    pub min_score: Option<f32>,
    pub filter: Option<MetadataFilter>,
}

impl VectorSearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub entry: VectorEntry,
    pub similarity: f32,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct VectorCleanupOptions {
    pub max_age_ms: Option<i64>,
    pub min_access_count: Option<u64>,
    pub collection: Option<String>,
}
