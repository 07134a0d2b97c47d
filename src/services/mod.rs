//! Services layered on top of the coordinator: audit queries, anomaly
//! scoring, and the typed record operations the request layer calls.

pub mod anomaly;
pub mod audit;
pub mod catalog;
pub mod forest;

pub use anomaly::{AnomalyConfig, AnomalyDetector, AnomalyVerdict};
pub use audit::{AuditLogEngine, LogFilter, LogPage, PageRequest, SortField, SortOrder, SortSpec};
pub use catalog::CatalogService;
