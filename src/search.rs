//! Similarity search with threshold curation.
//!
//! Embeds the query, retrieves nearest neighbors from the store, and keeps
//! only results strictly above the similarity threshold. Surviving results
//! are reassembled into display records: canonical fields are resolved from
//! metadata with the same alias-priority strategy as ingestion, and every
//! unclaimed metadata key is passed through unchanged so no information is
//! silently dropped.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::Config;
use crate::embedding;
use crate::error::EngineError;
use crate::fields;
use crate::models::{truncate_chars, SimilarIncident};
use crate::store::{QueryHit, VectorStore};

/// Results at or below this similarity are noise, never returned.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

pub const DEFAULT_TOP_K: usize = 5;

const PREVIEW_CHARS: usize = 300;
const DESCRIPTION_FALLBACK_CHARS: usize = 200;
const UNSPECIFIED_PROJECT: &str = "No especificado";

/// Find incidents similar to `query`. Results preserve the store's
/// similarity-descending order; no re-ranking happens after filtering.
pub async fn search_similar(
    config: &Config,
    store: &VectorStore,
    query: &str,
    top_k: usize,
    filters: Option<&BTreeMap<String, String>>,
) -> Result<Vec<SimilarIncident>, EngineError> {
    let query_embedding = embedding::embed_query(&config.embedding, query).await?;
    let hits = store.query(&query_embedding, top_k, filters).await?;

    let results = curate_hits(hits);
    info!(
        query = %truncate_chars(query, 50),
        found = results.len(),
        "similarity search complete"
    );

    Ok(results)
}

/// Convert distances to similarity scores and drop everything at or below
/// the threshold.
fn curate_hits(hits: Vec<QueryHit>) -> Vec<SimilarIncident> {
    hits.into_iter()
        .filter_map(|hit| {
            let similarity = 1.0 - hit.distance;
            if similarity <= SIMILARITY_THRESHOLD {
                return None;
            }
            Some(SimilarIncident {
                similarity_score: similarity,
                text: truncate_chars(&hit.document, PREVIEW_CHARS),
                full_text: hit.document.clone(),
                metadata: display_metadata(&hit),
                id: hit.id,
            })
        })
        .collect()
}

/// Rebuild a full-fidelity display record from stored metadata: canonical
/// fields first-alias-wins with language-appropriate defaults, then every
/// unclaimed key verbatim.
fn display_metadata(hit: &QueryHit) -> BTreeMap<String, String> {
    let meta = &hit.metadata;
    let mut display = BTreeMap::new();

    display.insert(
        "ID".to_string(),
        fields::resolve_or(meta, fields::ID_ALIASES, &hit.id).to_string(),
    );
    display.insert(
        "Proyecto".to_string(),
        fields::resolve_or(meta, fields::PROJECT_ALIASES, UNSPECIFIED_PROJECT).to_string(),
    );
    display.insert(
        "Fecha".to_string(),
        fields::resolve_or(meta, fields::DATE_ALIASES, fields::DEFAULT_DATE).to_string(),
    );
    display.insert(
        "Descripción".to_string(),
        fields::resolve(meta, fields::DESCRIPTION_ALIASES)
            .map(str::to_string)
            .unwrap_or_else(|| truncate_chars(&hit.document, DESCRIPTION_FALLBACK_CHARS)),
    );
    display.insert(
        "Solución".to_string(),
        fields::resolve_or(meta, fields::RESOLUTION_ALIASES, fields::DEFAULT_RESOLUTION)
            .to_string(),
    );
    display.insert(
        "Estado".to_string(),
        fields::resolve_or(meta, fields::STATUS_ALIASES, "").to_string(),
    );
    display.insert(
        "Prioridad".to_string(),
        fields::resolve_or(meta, fields::PRIORITY_ALIASES, "").to_string(),
    );

    for (key, value) in meta {
        if !fields::is_claimed(key) {
            display.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    display
}
