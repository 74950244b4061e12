//! # Legal Mirror
//!
//! A bounded-batch crawler that discovers, fetches, classifies and archives
//! legal publications from a fixed set of sources: official gazettes, legal
//! databases and RSS/Atom feeds.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌───────────┐
//!  │ Sources  │──▶│ Frontier  │──▶│   Crawler    │──▶│ Documents │
//!  │ (config) │   │ (SQLite)  │◀──│ fetch/class. │   │ (SQLite)  │
//!  └──────────┘   └───────────┘   └──────┬───────┘   └───────────┘
//!                   links found ─────────┘  │ pdf bytes
//!                                           ▼
//!                                    ┌─────────────┐
//!                                    │ Blob store  │
//!                                    │  (fs / S3)  │
//!                                    └─────────────┘
//! ```
//!
//! Each run dequeues at most `crawler.max_per_run` frontier items and
//! processes them one after another. Every write is an idempotent upsert
//! keyed by URL or checksum, so overlapping runs are safe.
//!
//! ## Quick Start
//!
//! ```bash
//! lexm init               # create database, register sources
//! lexm crawl              # run one batch
//! lexm stats              # crawl health per source
//! lexm serve              # POST /crawl trigger for a scheduler
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`canonical`] | URL canonicalization |
//! | [`filter`] | Per-source allow-list |
//! | [`classify`] | Content classification |
//! | [`links`] | HTML and feed link extraction |
//! | [`extract`] | Titles and body text |
//! | [`fetch`] | HTTP fetching with per-host TLS exceptions |
//! | [`blob`] | Content-addressed blob storage |
//! | [`store`] | Sources, frontier and documents |
//! | [`crawler`] | Crawl orchestration |
//! | [`server`] | HTTP trigger |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod canonical;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod get;
pub mod links;
pub mod migrate;
pub mod models;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
