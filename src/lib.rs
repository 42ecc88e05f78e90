//! # article-sync
//!
//! Keeps a PostgreSQL mirror and a Milvus search index in step with a
//! MariaDB store of published articles.
//!
//! The sync engine itself (record models, render transform, extraction,
//! mirroring, indexing, reconciliation) lives in `article-sync-core`; this
//! crate provides the store adapters, configuration, scheduling and the
//! `artsync` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  every minute   ┌────────────┐  new set   ┌──────────┐
//! │  MariaDB  │────────────────▶│ PostgreSQL │───────────▶│  Milvus  │
//! │  (source) │  extract+upsert │  (mirror)  │  index new │  (index) │
//! └───────────┘                 └─────┬──────┘            └────▲─────┘
//!                                     │   every 2 days          │
//!                                     └──── diff ──▶ patch ─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! artsync init                  # create mirror table and index collection
//! artsync sync                  # one extract → mirror → index cycle
//! artsync reconcile --dry-run   # list drifted records
//! artsync run                   # scheduler loop until Ctrl-C
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Mirror pool and driver error mapping |
//! | [`source_mysql`] | MariaDB source adapter |
//! | [`mirror_pg`] | PostgreSQL mirror adapter |
//! | [`milvus`] | Milvus index adapter |
//! | [`embedding`] | Dense embedding providers |
//! | [`migrate`] | `init`: schema and collection bootstrap |
//! | [`context`] | Store handles shared by jobs |
//! | [`scheduler`] | Cooperative job loop |
//! | [`jobs`] | Sync and reconcile jobs, one-shot commands |
//! | [`status`] | Mirror and index counts |
//! | [`inspect`] | One record across both stores |

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod inspect;
pub mod jobs;
pub mod logging;
pub mod migrate;
pub mod milvus;
pub mod mirror_pg;
pub mod scheduler;
pub mod source_mysql;
pub mod status;
