//! Remote store adapter backed by a MongoDB document database.
//!
//! Every logical record is one document `{_id: <key>, record: <value>}` in
//! the collection of the same name. The wrapper matters: legacy values can be
//! bare arrays, which are not valid top-level documents, and keeping the
//! payload opaque here leaves the codec as the only component that interprets
//! record shapes.
//!
//! Every driver call runs under a bounded timeout. Timeouts and transport
//! errors map to `RemoteUnavailable` (the coordinator falls back to the local
//! store); malformed documents map to `RemoteRecord` and are surfaced, since
//! the local mirror cannot be assumed fresher than bad remote data.

use crate::errors::{StoreError, StoreResult};
use crate::models::{Collection, RawRecords};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// The two store operations plus a health probe, as a seam so the coordinator
/// can run against a test double.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn read_all(&self, collection: Collection) -> StoreResult<RawRecords>;
    async fn write_all(&self, collection: Collection, records: &RawRecords) -> StoreResult<()>;
    async fn ping(&self) -> StoreResult<()>;
}

pub struct MongoRemote {
    db: Database,
    op_timeout: Duration,
}

impl MongoRemote {
    /// Connect to the remote database. The timeout bounds the initial server
    /// selection as well as every later operation.
    pub async fn connect(uri: &str, db_name: &str, op_timeout: Duration) -> StoreResult<Self> {
        let connect = async {
            let mut options = ClientOptions::parse(uri).await?;
            options.server_selection_timeout = Some(op_timeout);
            options.connect_timeout = Some(op_timeout);
            options.app_name = Some("securecloud-store".to_string());
            Client::with_options(options)
        };
        let client = bounded("connect", op_timeout, connect).await?;
        let remote = Self {
            db: client.database(db_name),
            op_timeout,
        };
        remote.ping().await?;
        debug!(db = db_name, "connected to remote store");
        Ok(remote)
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(collection.name())
    }
}

#[async_trait]
impl RemoteBackend for MongoRemote {
    async fn read_all(&self, collection: Collection) -> StoreResult<RawRecords> {
        let coll = self.collection(collection);
        let fetch = async move {
            let cursor = coll.find(doc! {}).await?;
            cursor.try_collect::<Vec<Document>>().await
        };
        let documents = bounded("read_all", self.op_timeout, fetch).await?;

        let mut records = RawRecords::new();
        for document in documents {
            let (key, value) = unwrap_document(collection, document)?;
            records.insert(key, value);
        }
        debug!(collection = %collection, count = records.len(), "remote read");
        Ok(records)
    }

    async fn write_all(&self, collection: Collection, records: &RawRecords) -> StoreResult<()> {
        let mut documents = Vec::with_capacity(records.len());
        for (key, value) in records {
            documents.push(wrap_record(collection, key, value)?);
        }

        let coll = self.collection(collection);
        let replace = async move {
            // Whole-collection replace mirrors the local store's whole-file
            // replace; the coordinator's lock serializes concurrent writers.
            coll.delete_many(doc! {}).await?;
            if !documents.is_empty() {
                coll.insert_many(documents).await?;
            }
            Ok(())
        };
        bounded("write_all", self.op_timeout, replace).await?;
        debug!(collection = %collection, count = records.len(), "remote write");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let db = self.db.clone();
        bounded("ping", self.op_timeout, async move {
            db.run_command(doc! {"ping": 1}).await
        })
        .await?;
        Ok(())
    }
}

/// Run a driver future under the operation timeout, mapping both elapsed
/// timeouts and driver errors to `RemoteUnavailable`.
async fn bounded<T, F>(op: &str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, mongodb::error::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(StoreError::RemoteUnavailable(format!("{op}: {err}"))),
        Err(_) => Err(StoreError::RemoteUnavailable(format!(
            "{op} timed out after {limit:?}"
        ))),
    }
}

fn wrap_record(collection: Collection, key: &str, value: &serde_json::Value) -> StoreResult<Document> {
    let payload = mongodb::bson::to_bson(value).map_err(|err| StoreError::RemoteRecord {
        collection: collection.name(),
        reason: format!("record `{key}` is not BSON-representable: {err}"),
    })?;
    Ok(doc! {"_id": key, "record": payload})
}

fn unwrap_document(
    collection: Collection,
    mut document: Document,
) -> StoreResult<(String, serde_json::Value)> {
    let key = match document.remove("_id") {
        Some(Bson::String(key)) => key,
        other => {
            return Err(StoreError::RemoteRecord {
                collection: collection.name(),
                reason: format!("document has non-string _id: {other:?}"),
            });
        }
    };
    let Some(payload) = document.remove("record") else {
        return Err(StoreError::RemoteRecord {
            collection: collection.name(),
            reason: format!("document `{key}` is missing the record field"),
        });
    };
    Ok((key, payload.into_relaxed_extjson()))
}
