//! Hybrid memory retrieval and gated awareness state for Ada, served over MCP.
//!
//! Documents live in a hosted key-value cache as loosely shaped JSON. Search
//! runs in two tiers: hashed-term sparse overlap first, then a discounted
//! substring match over the rendered document for records that were never
//! indexed. Mutations to the shared grammar pass through an uncertainty
//! tracker and an admission arbiter before they are written back.
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | **Sparse Indexer** | [`memory::sparse`] | Text to bounded bag of hashed terms |
//! | **Hybrid Search** | [`memory::search`] | Namespace scan, sparse pass, substring fallback |
//! | **Kalman-Lite** | [`awareness::kalman`] | Per-domain uncertainty and weighted merges |
//! | **Arbiter** | [`awareness::arbiter`] | Staleness, self-reference and quarantine gates |
//! | **Promotion** | [`awareness::promotion`] | Cross-session corroboration of patterns |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Typed errors for store, tracker, dispatcher and analyzer seams
//! - [`store`]: Key-value store trait, REST client and in-process store
//! - [`memory`]: Documents, sparse indexing, search, persistence and backfill
//! - [`awareness`]: Tracker, arbiter, promotion and the shared context object
//! - [`dispatch`]: Delayed fire-and-forget queue publishing
//! - [`analysis`]: The text-analysis collaborator interface

pub mod analysis;
pub mod awareness;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod store;
