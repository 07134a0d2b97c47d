//! Persistence, audit, and anomaly detection for a file-storage service.
//!
//! The store keeps every collection in two places: a remote document database
//! and a durable local JSON mirror. The [`store::Coordinator`] decides which
//! backend serves each operation and degrades to local-only when the remote
//! is unreachable. On first read, legacy record shapes are migrated in place
//! with a pre-migration backup. On top of the store sit the audit query
//! engine and the anomaly detector.

pub mod codec;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod store;

pub use errors::{CatalogError, CatalogResult, StoreError, StoreResult};
