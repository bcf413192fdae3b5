//! # Incident Harness
//!
//! A semantic retrieval store for short free-text incident records.
//!
//! Incident Harness ingests incident descriptions from heterogeneous
//! sources (CSV and JSON files, scraped web pages), embeds them, persists
//! them in a vector collection, and answers "find records similar to this
//! text" queries with score-ranked, metadata-enriched results. It also
//! derives a deterministic 3-D layout of incidents grouped by project,
//! cached beside the store and invalidated by collection cardinality.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────┐
//! │  Sources     │──▶│  Ingest   │──▶│   SQLite   │
//! │ CSV/JSON/Web │   │ Normalize │   │ collection │
//! └──────────────┘   │  + Embed  │   └─────┬──────┘
//!                    └───────────┘         │
//!                          ┌───────────────┼────────────┐
//!                          ▼               ▼            ▼
//!                    ┌──────────┐    ┌──────────┐  ┌─────────┐
//!                    │  Search  │    │  Galaxy  │  │  Stats  │
//!                    │ (1−dist) │    │  (cache) │  │         │
//!                    └──────────┘    └──────────┘  └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! inci init                              # create the collection
//! inci ingest incidencias.csv            # load a file
//! inci ingest https://intranet/avisos --kind url
//! inci search "fallo de impresora" --top-k 5
//! inci galaxy                            # cached 3-D layout
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Incident record and response envelopes |
//! | [`fields`] | Canonical-field alias resolution |
//! | [`error`] | Error taxonomy |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store adapter |
//! | [`scrape`] | Web-page incident extraction |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Similarity search |
//! | [`galaxy`] | 3-D layout cache |
//! | [`engine`] | Public operation boundary |

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod fields;
pub mod galaxy;
pub mod ingest;
pub mod models;
pub mod scrape;
pub mod search;
pub mod store;
