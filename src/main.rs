use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use securecloud_store::config::{AppConfig, GlobalArgs};
use securecloud_store::models::{ActionKind, Collection};
use securecloud_store::services::{
    AnomalyConfig, AnomalyDetector, AuditLogEngine, LogFilter, PageRequest, SortField, SortOrder,
    SortSpec,
};
use securecloud_store::store::{Coordinator, LocalStore, MongoRemote, RemoteBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "Store maintenance and inspection tool")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show per-collection health, dirty flags, and migration state
    Status,

    /// Force the legacy-shape migration for one collection (or all)
    Migrate {
        /// Collection name; omit to migrate every collection
        collection: Option<String>,
    },

    /// Push the local snapshot of a collection to the remote store
    Resync { collection: String },

    /// Query the audit logs
    Logs {
        /// Restrict to one actor
        #[arg(long)]
        user: Option<String>,

        /// Exact action kind (upload, download, delete, share, ...)
        #[arg(long)]
        action: Option<String>,

        /// Inclusive start date, YYYY-MM-DD
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Inclusive end date, YYYY-MM-DD
        #[arg(long)]
        end: Option<NaiveDate>,

        /// File-type tag, with or without the leading dot
        #[arg(long)]
        file_type: Option<String>,

        /// Case-insensitive substring of the file name
        #[arg(long)]
        file_name: Option<String>,

        /// Share receiver (exact, case-insensitive)
        #[arg(long)]
        receiver: Option<String>,

        /// Sort field: timestamp, action, or file
        #[arg(long, default_value = "timestamp")]
        sort: String,

        /// Sort ascending instead of newest-first
        #[arg(long)]
        ascending: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Score an actor's recent activity and optionally raise alerts
    Scan {
        user: String,

        /// Persist an alert for every tripped reason (deduplicated)
        #[arg(long)]
        alert: bool,
    },

    /// Remove expired trash records and one-time codes
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::resolve(&cli.global)?;
    tracing::debug!("resolved config: {:?}", cfg);

    let store = Arc::new(build_coordinator(&cfg).await?);

    match cli.command {
        Command::Status => {
            for status in store.status().await {
                // Counts come from the local mirror so `status` stays cheap
                // and side-effect free.
                let count = store.local().read_all(status.collection).await?.len();
                println!(
                    "{:<14} health={:?} dirty={} migrated={} records={count}",
                    status.collection.name(),
                    status.health,
                    status.dirty,
                    status.migrated
                );
            }
        }
        Command::Migrate { collection } => {
            let targets: Vec<Collection> = match collection {
                Some(name) => vec![parse_collection(&name)?],
                None => Collection::ALL.to_vec(),
            };
            for collection in targets {
                let report = store.migrate_now(collection).await?;
                match report.backup {
                    Some(backup) => println!(
                        "{}: migrated {} records (backup: {})",
                        collection.name(),
                        report.migrated,
                        backup.display()
                    ),
                    None => println!("{}: already canonical", collection.name()),
                }
            }
        }
        Command::Resync { collection } => {
            let collection = parse_collection(&collection)?;
            let pushed = store.resync(collection).await?;
            println!("{}: pushed {pushed} records to remote", collection.name());
        }
        Command::Logs {
            user,
            action,
            start,
            end,
            file_type,
            file_name,
            receiver,
            sort,
            ascending,
            limit,
            offset,
        } => {
            let action = match action {
                Some(name) => Some(
                    ActionKind::parse(&name)
                        .with_context(|| format!("unknown action `{name}`"))?,
                ),
                None => None,
            };
            let filter = LogFilter {
                action,
                start,
                end,
                file_type,
                file_name,
                receiver,
            };
            let sort = SortSpec {
                field: parse_sort_field(&sort)?,
                order: if ascending {
                    SortOrder::Ascending
                } else {
                    SortOrder::Descending
                },
            };
            let engine = AuditLogEngine::new(store.clone());
            let page = engine
                .query(user.as_deref(), &filter, sort, PageRequest { limit, offset })
                .await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Scan { user, alert } => {
            let detector = AnomalyDetector::new(store.clone(), AnomalyConfig::default());
            if alert {
                let (verdict, raised) = detector.check_and_alert(&user).await?;
                print_verdict(&user, &verdict);
                for alert in raised {
                    println!("alert raised: [{}] {}", alert.kind, alert.message);
                }
            } else {
                let verdict = detector.score(&user).await?;
                print_verdict(&user, &verdict);
            }
        }
        Command::Sweep => {
            let catalog = securecloud_store::services::CatalogService::new(store.clone());
            let files = catalog.sweep_trash().await?;
            let codes = catalog.sweep_otps().await?;
            println!("removed {files} expired trash records, {codes} expired codes");
        }
    }

    Ok(())
}

async fn build_coordinator(cfg: &AppConfig) -> Result<Coordinator> {
    let local = LocalStore::new(&cfg.data_dir);
    let remote: Option<Arc<dyn RemoteBackend>> = match &cfg.mongo_uri {
        Some(uri) => {
            let remote = MongoRemote::connect(
                uri,
                &cfg.mongo_db,
                Duration::from_secs(cfg.remote_timeout_secs),
            )
            .await
            .context("connecting to remote store")?;
            Some(Arc::new(remote))
        }
        None => {
            tracing::info!("no remote store configured, running local-only");
            None
        }
    };
    Ok(Coordinator::new(local, remote))
}

fn parse_collection(name: &str) -> Result<Collection> {
    match Collection::from_name(name) {
        Some(collection) => Ok(collection),
        None => bail!(
            "unknown collection `{name}` (expected one of: {})",
            Collection::ALL.map(Collection::name).join(", ")
        ),
    }
}

fn parse_sort_field(name: &str) -> Result<SortField> {
    match name {
        "timestamp" | "time" => Ok(SortField::Timestamp),
        "action" => Ok(SortField::Action),
        "file" | "file_name" => Ok(SortField::FileName),
        other => bail!("unknown sort field `{other}` (expected timestamp, action, or file)"),
    }
}

fn print_verdict(
    user: &str,
    verdict: &securecloud_store::services::AnomalyVerdict,
) {
    match verdict.model_score {
        Some(score) => println!("{user}: anomalous={} model_score={score:.3}", verdict.is_anomalous),
        None => println!(
            "{user}: anomalous={} (model abstained, not enough history)",
            verdict.is_anomalous
        ),
    }
    for reason in &verdict.reasons {
        println!("  [{}] {}", reason.kind, reason.message);
    }
}
