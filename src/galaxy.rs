//! Deterministic 3-D layout of incidents grouped by project ("galaxy" view),
//! with a side cache invalidated by store cardinality.
//!
//! Each project becomes a "sun" positioned from a content hash of its name:
//! angle and radius fall out of modulo arithmetic on the hash value, giving
//! a reproducible layout without storing coordinates. The computed structure
//! is persisted next to the store and trusted only while its recorded
//! `total_incidents` matches the live collection count — exact for add-only
//! workloads, blind to same-count replacement edits.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::fields;
use crate::models::{truncate_chars, GalaxyData, GalaxyIncident, Sun};
use crate::store::{StoredRecord, VectorStore};

const CACHE_FILE: &str = "galaxy_cache.json";

/// Per sun, at most this many incidents are exposed to the visualization;
/// `size` and `incident_count` still report the true count.
const MAX_INCIDENTS_PER_SUN: usize = 500;

const SUN_TEXT_CAP: usize = 150;
const SUN_META_VALUE_CAP: usize = 50;

/// Return the galaxy layout, from cache when valid, else regenerated and
/// re-cached. Cache writes are best-effort; a failure is logged and does
/// not fail the call.
pub async fn get_layout(store: &VectorStore, use_cache: bool) -> Result<GalaxyData, EngineError> {
    let cache_path = store.dir().join(CACHE_FILE);
    let live_count = store.count().await?;

    if use_cache {
        if let Some(cached) = load_cached(&cache_path) {
            if cached.total_incidents == live_count {
                info!(total_incidents = live_count, "galaxy cache valid");
                return Ok(cached);
            }
            debug!(
                cached = cached.total_incidents,
                live = live_count,
                "galaxy cache stale, regenerating"
            );
        }
    }

    let records = store.get_all().await?;
    if records.is_empty() {
        return Err(EngineError::NoData(
            "the collection is empty; load incidents first".to_string(),
        ));
    }

    let galaxy = build_galaxy(records);

    if let Err(e) = write_cache(&cache_path, &galaxy) {
        warn!(error = %e, "failed to write galaxy cache");
    }

    info!(
        projects = galaxy.total_projects,
        incidents = galaxy.total_incidents,
        "galaxy regenerated"
    );
    Ok(galaxy)
}

/// Read and parse the cache file; any absence or parse failure just means
/// "no cache".
fn load_cached(path: &Path) -> Option<GalaxyData> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<GalaxyData>(&content) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(error = %e, "unreadable galaxy cache, ignoring");
            None
        }
    }
}

/// Whole-file replace via temp + rename; a concurrent regeneration can at
/// worst produce a duplicate write, never a torn file.
fn write_cache(path: &Path, galaxy: &GalaxyData) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string(galaxy)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Group records by resolved project and lay each group out as a sun.
fn build_galaxy(records: Vec<StoredRecord>) -> GalaxyData {
    let total_incidents = records.len();

    let mut projects: BTreeMap<String, Vec<GalaxyIncident>> = BTreeMap::new();
    for record in records {
        let project = fields::resolve_or(
            &record.metadata,
            fields::PROJECT_ALIASES,
            fields::DEFAULT_PROJECT,
        )
        .to_string();

        projects
            .entry(project)
            .or_default()
            .push(GalaxyIncident {
                id: record.id,
                text: truncate_chars(&record.document, SUN_TEXT_CAP),
                metadata: record
                    .metadata
                    .into_iter()
                    .map(|(k, v)| (k, truncate_chars(&v, SUN_META_VALUE_CAP)))
                    .collect(),
            });
    }

    let suns: Vec<Sun> = projects
        .into_iter()
        .map(|(name, mut incidents)| {
            let count = incidents.len();
            let has_more = count > MAX_INCIDENTS_PER_SUN;
            incidents.truncate(MAX_INCIDENTS_PER_SUN);

            let (x, y, z) = sun_position(&name);
            Sun {
                name,
                x,
                y,
                z,
                size: count,
                incident_count: count,
                incidents,
                has_more,
            }
        })
        .collect();

    GalaxyData {
        success: true,
        total_projects: suns.len(),
        total_incidents,
        suns,
        error: None,
        traceback: None,
    }
}

/// Deterministic pseudo-random position for a project, derived from a
/// content hash of its name reduced into angle/radius/height ranges.
fn sun_position(name: &str) -> (f64, f64, f64) {
    let digest = Sha256::digest(name.as_bytes());
    let mut low = [0u8; 16];
    low.copy_from_slice(&digest[..16]);
    let hash = u128::from_be_bytes(low);

    let angle = (hash % 360) as f64 * std::f64::consts::PI / 180.0;
    let radius = 30.0 + (hash % 50) as f64;
    let y = (hash % 20) as f64 - 10.0;

    (angle.cos() * radius, y, angle.sin() * radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, project: Option<&str>) -> StoredRecord {
        let mut metadata = BTreeMap::new();
        if let Some(p) = project {
            metadata.insert("Proyecto".to_string(), p.to_string());
        }
        StoredRecord {
            id: id.to_string(),
            document: format!("texto de {}", id),
            metadata,
        }
    }

    #[test]
    fn test_position_deterministic() {
        assert_eq!(sun_position("Atlas"), sun_position("Atlas"));
        assert_ne!(sun_position("Atlas"), sun_position("Borealis"));
    }

    #[test]
    fn test_position_ranges() {
        for name in ["Atlas", "Borealis", "Sin proyecto", "Web Scraping", "ñ"] {
            let (x, y, z) = sun_position(name);
            let radius = (x * x + z * z).sqrt();
            assert!((30.0..80.0).contains(&radius), "radius {} for {}", radius, name);
            assert!((-10.0..10.0).contains(&y), "y {} for {}", y, name);
        }
    }

    #[test]
    fn test_groups_by_project_with_default() {
        let galaxy = build_galaxy(vec![
            record("1", Some("Atlas")),
            record("2", None),
            record("3", Some("Atlas")),
        ]);
        assert_eq!(galaxy.total_incidents, 3);
        assert_eq!(galaxy.total_projects, 2);

        let atlas = galaxy.suns.iter().find(|s| s.name == "Atlas").unwrap();
        assert_eq!(atlas.incident_count, 2);
        let unassigned = galaxy
            .suns
            .iter()
            .find(|s| s.name == fields::DEFAULT_PROJECT)
            .unwrap();
        assert_eq!(unassigned.incident_count, 1);
    }

    #[test]
    fn test_sun_caps_exposed_incidents() {
        let records: Vec<StoredRecord> = (0..(MAX_INCIDENTS_PER_SUN + 1))
            .map(|i| record(&format!("i{}", i), Some("Atlas")))
            .collect();
        let galaxy = build_galaxy(records);
        let sun = &galaxy.suns[0];
        assert_eq!(sun.incidents.len(), MAX_INCIDENTS_PER_SUN);
        assert_eq!(sun.incident_count, MAX_INCIDENTS_PER_SUN + 1);
        assert_eq!(sun.size, MAX_INCIDENTS_PER_SUN + 1);
        assert!(sun.has_more);
    }

    #[test]
    fn test_sun_truncates_payload_fields() {
        let mut r = record("1", Some("Atlas"));
        r.document = "d".repeat(400);
        r.metadata
            .insert("Comentario".to_string(), "c".repeat(200));
        let galaxy = build_galaxy(vec![r]);
        let incident = &galaxy.suns[0].incidents[0];
        assert_eq!(incident.text.len(), SUN_TEXT_CAP);
        assert_eq!(incident.metadata.get("Comentario").unwrap().len(), SUN_META_VALUE_CAP);
    }

    #[test]
    fn test_load_cached_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CACHE_FILE);
        assert!(load_cached(&path).is_none());
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_cached(&path).is_none());
    }

    mod with_store {
        use super::*;
        use crate::config::StoreConfig;
        use crate::store::EntryRecord;
        use tempfile::TempDir;

        async fn store_with(tmp: &TempDir, n: usize) -> VectorStore {
            let config = StoreConfig {
                path: tmp.path().to_path_buf(),
                collection: "incidents".to_string(),
            };
            let store = VectorStore::open_or_create(&config).await.unwrap();
            let batch: Vec<EntryRecord> = (0..n)
                .map(|i| {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("Proyecto".to_string(), "Atlas".to_string());
                    EntryRecord {
                        id: format!("e{}", i),
                        document: format!("doc {}", i),
                        embedding: vec![0.0; 4],
                        metadata,
                    }
                })
                .collect();
            store.upsert(&batch).await.unwrap();
            store
        }

        #[tokio::test]
        async fn test_cache_roundtrip_and_invalidation() {
            let tmp = TempDir::new().unwrap();
            let store = store_with(&tmp, 2).await;

            let first = get_layout(&store, true).await.unwrap();
            assert_eq!(first.total_incidents, 2);
            assert!(tmp.path().join(CACHE_FILE).exists());

            // Valid cache is served as-is.
            let cached = get_layout(&store, true).await.unwrap();
            assert_eq!(cached.total_incidents, 2);

            // Cardinality change forces regeneration, never a stale answer.
            let mut metadata = BTreeMap::new();
            metadata.insert("Proyecto".to_string(), "Borealis".to_string());
            store
                .upsert(&[EntryRecord {
                    id: "extra".to_string(),
                    document: "doc extra".to_string(),
                    embedding: vec![0.0; 4],
                    metadata,
                }])
                .await
                .unwrap();

            let regenerated = get_layout(&store, true).await.unwrap();
            assert_eq!(regenerated.total_incidents, 3);
            assert_eq!(regenerated.total_projects, 2);
        }

        #[tokio::test]
        async fn test_stale_cache_file_ignored() {
            let tmp = TempDir::new().unwrap();
            let store = store_with(&tmp, 2).await;

            std::fs::write(
                tmp.path().join(CACHE_FILE),
                r#"{"success":true,"suns":[],"total_projects":0,"total_incidents":99}"#,
            )
            .unwrap();

            let galaxy = get_layout(&store, true).await.unwrap();
            assert_eq!(galaxy.total_incidents, 2);
        }

        #[tokio::test]
        async fn test_use_cache_false_bypasses_cache() {
            let tmp = TempDir::new().unwrap();
            let store = store_with(&tmp, 2).await;

            // A forged cache with the right cardinality would be served...
            let forged = r#"{"success":true,"suns":[],"total_projects":7,"total_incidents":2}"#;
            std::fs::write(tmp.path().join(CACHE_FILE), forged).unwrap();
            let served = get_layout(&store, true).await.unwrap();
            assert_eq!(served.total_projects, 7);

            // ...but use_cache=false always recomputes.
            let fresh = get_layout(&store, false).await.unwrap();
            assert_eq!(fresh.total_projects, 1);
        }

        #[tokio::test]
        async fn test_empty_collection_is_no_data() {
            let tmp = TempDir::new().unwrap();
            let store = store_with(&tmp, 0).await;
            let result = get_layout(&store, true).await;
            assert!(matches!(result, Err(EngineError::NoData(_))));
        }
    }
}
