//! Public operation boundary.
//!
//! [`Engine`] wires the store and embedding provider together and exposes
//! the four operations consumed by front ends — ingest, search, stats,
//! galaxy — plus clear. Every operation returns a JSON-serializable
//! envelope; internal failures become structured error payloads, never a
//! crash of the hosting process.

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::Config;
use crate::embedding;
use crate::error::EngineError;
use crate::galaxy;
use crate::ingest;
use crate::models::{
    ClearReport, ErrorBody, GalaxyData, IngestReport, SearchResponse, StatsReport,
};
use crate::search;
use crate::store::VectorStore;

pub struct Engine {
    config: Config,
    store: VectorStore,
}

impl Engine {
    /// Open (or create) the collection and validate the embedding provider.
    pub async fn open(config: Config) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        info!(
            collection = %config.store.collection,
            model = provider.model_name(),
            dims = provider.dims(),
            "engine ready"
        );

        let store = VectorStore::open_or_create(&config.store).await?;
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Load incidents from a file or URL into the collection.
    pub async fn ingest(&self, source: &str, source_type: &str) -> IngestReport {
        match ingest::load_incidents(&self.config, &self.store, source, source_type).await {
            Ok(loaded) => IngestReport::Loaded {
                success: true,
                incidents_loaded: loaded,
                source: source.to_string(),
                source_type: source_type.to_string(),
            },
            Err(e) => IngestReport::Failed(ErrorBody {
                error: e.to_string(),
                traceback: Some(e.traceback()),
            }),
        }
    }

    /// Find incidents similar to `query`.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&BTreeMap<String, String>>,
    ) -> SearchResponse {
        match search::search_similar(&self.config, &self.store, query, top_k, filters).await {
            Ok(similar_incidents) => SearchResponse {
                query: query.to_string(),
                total_found: similar_incidents.len(),
                similar_incidents,
                error: None,
                traceback: None,
            },
            Err(e) => SearchResponse {
                query: query.to_string(),
                similar_incidents: Vec::new(),
                total_found: 0,
                error: Some(e.to_string()),
                traceback: Some(e.traceback()),
            },
        }
    }

    /// Collection statistics.
    pub async fn stats(&self) -> StatsReport {
        match self.store.count().await {
            Ok(count) => StatsReport {
                total_incidents: count,
                collection_name: self.store.collection_name().to_string(),
                has_data: count > 0,
                store_ready: count > 0 && self.store.db_path().exists(),
                error: None,
            },
            Err(e) => StatsReport {
                total_incidents: 0,
                collection_name: self.store.collection_name().to_string(),
                has_data: false,
                store_ready: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// The 3-D layout, cached while the collection cardinality is unchanged.
    pub async fn galaxy(&self, use_cache: bool) -> GalaxyData {
        match galaxy::get_layout(&self.store, use_cache).await {
            Ok(data) => data,
            Err(e) => GalaxyData {
                success: false,
                suns: Vec::new(),
                total_projects: 0,
                total_incidents: 0,
                error: Some(e.to_string()),
                traceback: Some(e.traceback()),
            },
        }
    }

    /// Delete the collection's contents and recreate it empty.
    pub async fn clear(&self) -> ClearReport {
        match self.store.clear().await {
            Ok(()) => ClearReport::Cleared {
                success: true,
                message: "collection cleared".to_string(),
            },
            Err(e) => ClearReport::Failed(ErrorBody {
                error: EngineError::Other(e).to_string(),
                traceback: None,
            }),
        }
    }
}
