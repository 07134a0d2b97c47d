//! Migration engine: upgrades a whole collection to the canonical shape.
//!
//! The scan itself is pure; the coordinator owns the surrounding protocol
//! (back up the original mapping first, persist the canonical mapping, record
//! the outcome) and runs it once per collection per process lifetime.

use crate::codec;
use crate::models::{Collection, RawRecords};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Result of scanning one collection.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// The fully canonical mapping. Identical to the input when nothing was
    /// legacy.
    pub records: RawRecords,

    /// How many input entries needed rewriting. Zero means the input was
    /// already canonical and nothing must be persisted or backed up.
    pub migrated: usize,
}

/// What the coordinator records after a migrating first read, for
/// observability (logged, and returned by the CLI `migrate` command).
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub collection: Collection,
    pub migrated: usize,
    pub backup: Option<PathBuf>,
}

/// Scan every entry of `raw`; canonical entries pass through unchanged,
/// legacy entries are expanded via the codec. Idempotent: running the scan on
/// its own output yields `migrated == 0`.
///
/// A single legacy entry may expand into several canonical ones (folder
/// lists). Expanded entries never overwrite an existing canonical entry with
/// the same key — the canonical record wins, which keeps a mixed mapping
/// lossless in both directions.
pub fn migrate_collection(
    collection: Collection,
    raw: &RawRecords,
    now: DateTime<Utc>,
) -> MigrationOutcome {
    let mut records = RawRecords::new();
    let mut migrated = 0;

    // Canonical entries first so they take precedence over expansions.
    for (key, value) in raw {
        if codec::classify(collection, key, value) == codec::Shape::Canonical {
            records.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in raw {
        if codec::classify(collection, key, value) == codec::Shape::Legacy {
            migrated += 1;
            for (new_key, new_value) in codec::expand(collection, key, value, now) {
                records.entry(new_key).or_insert(new_value);
            }
        }
    }

    MigrationOutcome { records, migrated }
}
