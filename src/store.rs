//! Vector store adapter.
//!
//! Owns a named collection inside a persistent SQLite database. Embeddings
//! are stored as little-endian f32 BLOBs and nearest-neighbor queries rank
//! by cosine similarity computed in Rust, with distance reported as
//! `1 − cosine`. Duplicate ids fail under [`VectorStore::add`] and are
//! replaced under [`VectorStore::upsert`]; callers are expected to recover
//! from an add conflict by retrying the same batch as an upsert.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::StoreConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

/// Hard cap on neighbors returned by a query, regardless of requested `k`.
pub const MAX_QUERY_RESULTS: usize = 50;

const DB_FILE: &str = "incidents.sqlite";

/// One entry as written to the collection.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

/// One nearest neighbor returned by [`VectorStore::query`].
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    /// `1 − cosine similarity` against the query embedding.
    pub distance: f64,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
}

/// One entry from a bulk dump, without its embedding.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
}

pub struct VectorStore {
    pool: SqlitePool,
    collection: String,
    root: PathBuf,
}

impl VectorStore {
    /// Open the store directory, creating the database, schema, and the
    /// named collection if absent. Idempotent; never errors on an existing
    /// collection.
    pub async fn open_or_create(config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path)
            .with_context(|| format!("Failed to create store dir: {}", config.path.display()))?;

        let db_path = config.path.join(DB_FILE);
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("INSERT INTO collections (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(&config.collection)
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            collection: config.collection.clone(),
            root: config.path.clone(),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Directory holding the database; side files (the galaxy cache) live
    /// alongside it.
    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    /// Strict batch insert. Fails on any duplicate id and rolls the whole
    /// batch back, so the caller can retry it unchanged as an upsert.
    pub async fn add(&self, batch: &[EntryRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in batch {
            sqlx::query(
                r#"
                INSERT INTO entries (collection, id, document, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.id)
            .bind(&entry.document)
            .bind(vec_to_blob(&entry.embedding))
            .bind(serde_json::to_string(&entry.metadata)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace-on-conflict batch write; re-ingesting the same source is
    /// idempotent through this path.
    pub async fn upsert(&self, batch: &[EntryRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in batch {
            sqlx::query(
                r#"
                INSERT INTO entries (collection, id, document, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.id)
            .bind(&entry.document)
            .bind(vec_to_blob(&entry.embedding))
            .bind(serde_json::to_string(&entry.metadata)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Nearest neighbors to `query_embedding`, ranked by similarity
    /// descending, capped at `min(k, MAX_QUERY_RESULTS)`. An optional
    /// metadata filter keeps only entries matching every key=value equality.
    pub async fn query(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<QueryHit>> {
        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata_json FROM entries WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<QueryHit> = Vec::with_capacity(rows.len());

        for row in &rows {
            let metadata = decode_metadata(row.get("metadata_json"))?;

            if let Some(wanted) = filter {
                let matches = wanted
                    .iter()
                    .all(|(key, value)| metadata.get(key) == Some(value));
                if !matches {
                    continue;
                }
            }

            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(query_embedding, &blob_to_vec(&blob)) as f64;

            hits.push(QueryHit {
                id: row.get("id"),
                distance: 1.0 - similarity,
                document: row.get("document"),
                metadata,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k.min(MAX_QUERY_RESULTS));

        Ok(hits)
    }

    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Bulk dump of ids, documents, and metadata for layout computation.
    /// Embeddings are deliberately excluded to bound payload size.
    pub async fn get_all(&self) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json FROM entries WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredRecord {
                    id: row.get("id"),
                    document: row.get("document"),
                    metadata: decode_metadata(row.get("metadata_json"))?,
                })
            })
            .collect()
    }

    /// Delete the collection's entries and recreate it empty. The only way
    /// the collection is ever destroyed.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO collections (name) VALUES (?)")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_metadata(json: String) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(&json).context("Corrupt metadata_json in entries table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> VectorStore {
        let config = StoreConfig {
            path: tmp.path().to_path_buf(),
            collection: "incidents".to_string(),
        };
        VectorStore::open_or_create(&config).await.unwrap()
    }

    fn entry(id: &str, embedding: Vec<f32>) -> EntryRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("Proyecto".to_string(), "Atlas".to_string());
        EntryRecord {
            id: id.to_string(),
            document: format!("doc {}", id),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.close().await;
        let store = open_store(&tmp).await;
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_upsert_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let batch = vec![entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])];
        store.add(&batch).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        // Strict add fails on the same ids and leaves the count unchanged.
        assert!(store.add(&batch).await.is_err());
        assert_eq!(store.count().await.unwrap(), 2);

        // Upsert of the identical batch succeeds without duplicating.
        store.upsert(&batch).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_rolls_back_whole_batch_on_conflict() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();

        // "z" is new but shares a batch with the conflicting "a".
        let batch = vec![entry("z", vec![0.5, 0.5]), entry("a", vec![1.0, 0.0])];
        assert!(store.add(&batch).await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .add(&[
                entry("exact", vec![1.0, 0.0]),
                entry("near", vec![0.9, 0.1]),
                entry("orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "exact");
        assert!(hits[0].distance < 1e-6);
        assert_eq!(hits[1].id, "near");
        assert_eq!(hits[2].id, "orthogonal");
        assert!((hits[2].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_cap_at_fifty() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let batch: Vec<EntryRecord> = (0..60)
            .map(|i| entry(&format!("e{}", i), vec![1.0, i as f32 / 60.0]))
            .collect();
        store.add(&batch).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 1000, None).await.unwrap();
        assert_eq!(hits.len(), MAX_QUERY_RESULTS);

        let hits = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_query_metadata_filter() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let mut other = entry("other", vec![1.0, 0.0]);
        other
            .metadata
            .insert("Proyecto".to_string(), "Borealis".to_string());
        store
            .add(&[entry("atlas", vec![1.0, 0.0]), other])
            .await
            .unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("Proyecto".to_string(), "Atlas".to_string());
        let hits = store.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "atlas");
    }

    #[tokio::test]
    async fn test_clear_empties_collection() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        // Collection is usable again after clearing.
        store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_all_excludes_embeddings_preserves_metadata() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.add(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        let records = store.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document, "doc a");
        assert_eq!(
            records[0].metadata.get("Proyecto").map(String::as_str),
            Some("Atlas")
        );
    }
}
