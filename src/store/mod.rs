//! Persistence backends and the coordinator that fronts them.

pub mod coordinator;
pub mod local;
pub mod migrate;
pub mod remote;

pub use coordinator::{CollectionStatus, Coordinator, Health};
pub use local::LocalStore;
pub use migrate::{MigrationOutcome, MigrationReport};
pub use remote::{MongoRemote, RemoteBackend};
