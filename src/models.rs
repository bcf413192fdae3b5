//! Core data types: the canonical incident record and the JSON-serializable
//! envelopes returned by every public engine operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical incident record produced by the ingestion pipeline.
///
/// Immutable once stored; re-ingestion replaces the whole entry by upsert
/// rather than mutating it in place.
#[derive(Debug, Clone)]
pub struct Incident {
    /// Unique within the collection. Source-provided, or synthesized as
    /// `"{kind}_{index}"` when the source has no id column.
    pub id: String,
    pub title: String,
    pub description: String,
    pub project: String,
    /// Provenance: filename or URL.
    pub source: String,
    /// Additional source columns not claimed by a canonical field,
    /// each value truncated to a bounded length.
    pub extra: BTreeMap<String, String>,
}

impl Incident {
    /// The text actually embedded: title, description, and project joined.
    pub fn document_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.project)
    }

    /// Metadata written alongside the embedding: the record minus `id`.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert("title".to_string(), self.title.clone());
        meta.insert("description".to_string(), self.description.clone());
        meta.insert("Proyecto".to_string(), self.project.clone());
        meta.insert("source".to_string(), self.source.clone());
        for (k, v) in &self.extra {
            meta.entry(k.clone()).or_insert_with(|| v.clone());
        }
        meta
    }
}

/// Truncate on a character boundary; byte-index slicing would panic on
/// multi-byte text, which incident descriptions routinely contain.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Uniform error body used by every failing operation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Outcome of an ingestion run.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum IngestReport {
    Loaded {
        success: bool,
        incidents_loaded: usize,
        source: String,
        source_type: String,
    },
    Failed(ErrorBody),
}

/// One curated similarity hit.
#[derive(Debug, Serialize)]
pub struct SimilarIncident {
    pub id: String,
    pub similarity_score: f64,
    /// Document text truncated for preview.
    pub text: String,
    pub full_text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Response of `search`, including the degraded shape: on failure
/// `similar_incidents` is empty and `error` is set, never a panic.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub similar_incidents: Vec<SimilarIncident>,
    pub total_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// One incident as exposed inside a galaxy sun (truncated for payload size).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalaxyIncident {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// One project group in the 3-D layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct Sun {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// True incident count, even when `incidents` is truncated.
    pub size: usize,
    pub incident_count: usize,
    pub incidents: Vec<GalaxyIncident>,
    pub has_more: bool,
}

/// The persisted layout structure; also the response of `galaxy`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GalaxyData {
    pub success: bool,
    #[serde(default)]
    pub suns: Vec<Sun>,
    #[serde(default)]
    pub total_projects: usize,
    #[serde(default)]
    pub total_incidents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Response of `stats`.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub total_incidents: usize,
    pub collection_name: String,
    pub has_data: bool,
    pub store_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `clear`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ClearReport {
    Cleared { success: bool, message: String },
    Failed(ErrorBody),
}
