//! Ingestion pipeline: raw sources → canonical incidents → embedded entries.
//!
//! Loads incidents from a delimited-table or structured-document file (or a
//! scraped web page), normalizes heterogeneous field names through the alias
//! tables in [`crate::fields`], and writes them through the embedding
//! provider into the vector store in fixed-size batches. A strict `add` that
//! fails (most commonly on duplicate ids when a source is re-ingested) is
//! retried once as an `upsert`, making re-ingestion idempotent.

use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding;
use crate::error::EngineError;
use crate::fields;
use crate::models::{truncate_chars, Incident};
use crate::scrape;
use crate::store::{EntryRecord, VectorStore};

/// Structured-document items are normalized in chunks of this size.
const PARSE_BATCH_SIZE: usize = 100;

/// Embed-and-write batch sizes; remote providers pay one request per text,
/// so their batches are kept small.
const WRITE_BATCH_REMOTE: usize = 10;
const WRITE_BATCH_LOCAL: usize = 50;

/// Extra field values are capped to bound storage growth.
const EXTRA_VALUE_CAP: usize = 500;

/// Container keys checked, in order, for the record list of a structured
/// document whose root is an object.
const CONTAINER_KEYS: &[&str] = &["incidencias", "data", "items", "incidents", "records"];

/// Load incidents from `source` and write them to the store.
/// Returns the number of incidents loaded; zero parsed incidents is an
/// error, not an empty success.
pub async fn load_incidents(
    config: &Config,
    store: &VectorStore,
    source: &str,
    source_type: &str,
) -> Result<usize, EngineError> {
    let incidents = match source_type {
        "url" => scrape::scrape_incidents(source, config.ingest.fetch_timeout_secs).await?,
        "file" => load_from_file(config, store, source)?,
        other => {
            return Err(EngineError::UnsupportedFormat(format!(
                "source type '{}', expected file or url",
                other
            )))
        }
    };

    if incidents.is_empty() {
        return Err(EngineError::NoData(source.to_string()));
    }

    write_incidents(config, store, &incidents).await?;
    info!(source, loaded = incidents.len(), "ingestion complete");

    Ok(incidents.len())
}

// ============ File loading ============

fn load_from_file(
    config: &Config,
    store: &VectorStore,
    filename: &str,
) -> Result<Vec<Incident>, EngineError> {
    let path = resolve_path(config, store, filename)
        .ok_or_else(|| EngineError::SourceNotFound(filename.to_string()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "csv" => parse_csv(&path, filename),
        "json" => parse_json(&path, filename),
        other => Err(EngineError::UnsupportedFormat(format!(
            "extension '.{}' of {}",
            other, filename
        ))),
    }
}

/// A relative source name is looked up in the configured data directory,
/// then next to the store, then as a literal path.
fn resolve_path(config: &Config, store: &VectorStore, filename: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(ref data_dir) = config.ingest.data_dir {
        candidates.push(data_dir.join(filename));
    }
    candidates.push(store.dir().join(filename));
    candidates.push(PathBuf::from(filename));

    candidates.into_iter().find(|p| p.exists())
}

fn parse_csv(path: &Path, source_name: &str) -> Result<Vec<Incident>, EngineError> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;
    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let mut incidents = Vec::new();

    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV row {}", idx + 1))?;
        let record: BTreeMap<String, String> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        incidents.push(normalize_record(record, idx, "csv", source_name));
    }

    Ok(incidents)
}

fn parse_json(path: &Path, source_name: &str) -> Result<Vec<Incident>, EngineError> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON: {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .map_err(|e| EngineError::UnsupportedFormat(format!("invalid JSON: {}", e)))?;

    let items = find_record_list(&document).ok_or_else(|| {
        EngineError::UnsupportedFormat(format!("no list of records in {}", source_name))
    })?;

    let mut incidents = Vec::with_capacity(items.len());

    for batch in items.chunks(PARSE_BATCH_SIZE) {
        let offset = incidents.len();
        for (idx, item) in batch.iter().enumerate() {
            let Some(object) = item.as_object() else {
                continue;
            };
            let record: BTreeMap<String, String> = object
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect();
            incidents.push(normalize_record(record, offset + idx, "json", source_name));
        }
        debug!(parsed = incidents.len(), "parsing structured document");
    }

    Ok(incidents)
}

/// Locate the list of records inside a structured document: a root-level
/// list is used directly; otherwise likely container keys are checked in
/// priority order, falling back to the first list-valued field found.
fn find_record_list(document: &Value) -> Option<&Vec<Value>> {
    match document {
        Value::Array(items) => Some(items),
        Value::Object(map) => CONTAINER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array)),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map one raw source row/item to a canonical incident via alias priority
/// resolution; unclaimed columns are preserved verbatim, value-capped.
fn normalize_record(
    record: BTreeMap<String, String>,
    index: usize,
    kind: &str,
    source: &str,
) -> Incident {
    let id = fields::resolve(&record, fields::ID_ALIASES)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_{}", kind, index));
    let title = fields::resolve_or(&record, fields::TITLE_ALIASES, fields::DEFAULT_TITLE);
    let description = fields::resolve_or(&record, fields::DESCRIPTION_ALIASES, "");
    let project = fields::resolve_or(&record, fields::PROJECT_ALIASES, fields::DEFAULT_PROJECT);

    let incident = Incident {
        id,
        title: title.to_string(),
        description: description.to_string(),
        project: project.to_string(),
        source: source.to_string(),
        extra: BTreeMap::new(),
    };

    // Everything the canonical fields did not literally consume rides along.
    let extra: BTreeMap<String, String> = record
        .into_iter()
        .filter(|(k, _)| {
            !matches!(
                k.as_str(),
                "id" | "title" | "description" | "source" | "Proyecto"
            )
        })
        .map(|(k, v)| (k, truncate_chars(&v, EXTRA_VALUE_CAP)))
        .collect();

    Incident { extra, ..incident }
}

// ============ Write path ============

/// Embed and write incidents in fixed-size batches. Any store error on the
/// strict `add` is answered by retrying the identical batch as an `upsert`;
/// a second failure surfaces as a store error.
async fn write_incidents(
    config: &Config,
    store: &VectorStore,
    incidents: &[Incident],
) -> Result<(), EngineError> {
    let batch_size = if config.embedding.is_remote() {
        WRITE_BATCH_REMOTE
    } else {
        WRITE_BATCH_LOCAL
    };

    let mut written = 0usize;

    for batch in incidents.chunks(batch_size) {
        let documents: Vec<String> = batch.iter().map(Incident::document_text).collect();
        let embeddings = embedding::embed_texts(&config.embedding, &documents).await?;

        let entries: Vec<EntryRecord> = batch
            .iter()
            .zip(documents.iter())
            .zip(embeddings.into_iter())
            .map(|((incident, document), embedding)| EntryRecord {
                id: incident.id.clone(),
                document: document.clone(),
                embedding,
                metadata: incident.metadata(),
            })
            .collect();

        if let Err(e) = store.add(&entries).await {
            warn!(error = %e, "strict add failed, retrying batch as upsert");
            store.upsert(&entries).await?;
        }

        written += batch.len();
        debug!(written, total = incidents.len(), "wrote incident batch");
    }

    Ok(())
}
