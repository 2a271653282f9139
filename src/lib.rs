//! # Site Search Index
//!
//! Incrementally builds a Fuse.js-compatible search index over the pages of
//! a content graph and serves it, together with the indexed documents, to
//! clients that run the fuzzy search themselves.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Node source │──▶│  Ingestion  │──▶│   Registry    │
//! │  JSON files │   │ type+filter │   │ pages+digest  │
//! └─────────────┘   └─────────────┘   └──────┬────────┘
//!                                           │
//!                   ┌──────────────────────┤
//!                   ▼                      ▼
//!            ┌────────────┐        ┌──────────────┐
//!            │ Projection │──────▶│ Index + cache │
//!            │ namespaces │        │  (Fuse.js)   │
//!            └────────────┘        └──────┬───────┘
//!                                         ▼
//!                                 CLI / HTTP / snapshot
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ssi build --config ./ssi.toml          # ingest, build, write snapshot
//! ssi inspect --config ./ssi.toml        # print the artifact JSON
//! ssi serve --config ./ssi.toml          # serve GET /search-index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Source nodes and projected documents |
//! | [`registry`] | The search-index registry aggregate |
//! | [`store`] | Content graph traits and in-memory store |
//! | [`ingest`] | Eligibility filter and registry appends |
//! | [`resolver`] | Field resolvers and namespaces |
//! | [`partition`] | Namespace partitioning |
//! | [`fuse`] | Fuse.js-compatible index construction |
//! | [`cache`] | Built-index cache backends |
//! | [`index`] | Index build service with single-flight caching |
//! | [`serve`] | Output-only scalar, query layer, snapshot |
//! | [`server`] | HTTP server |
//! | [`connector_fs`] | Filesystem node loader |
//! | [`pipeline`] | End-to-end build wiring |

pub mod cache;
pub mod config;
pub mod connector_fs;
pub mod fuse;
pub mod index;
pub mod ingest;
pub mod models;
pub mod partition;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod serve;
pub mod server;
pub mod store;
