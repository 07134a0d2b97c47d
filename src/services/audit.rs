//! Audit log engine: filtered, sorted, paginated queries over the merged
//! activity and access logs.
//!
//! Queries are snapshot-at-call-time: one read through the coordinator
//! produces the dataset that both the count and the page slice come from, so
//! a page is internally consistent even if writes land mid-query. Errors from
//! the coordinator propagate unchanged.

use crate::errors::StoreResult;
use crate::models::{ActionKind, Collection, LogEntry};
use crate::store::Coordinator;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Hard cap on page size, regardless of what the caller asks for.
pub const MAX_PAGE_LIMIT: usize = 500;

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Optional, AND-combined filters.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Exact action kind.
    pub action: Option<ActionKind>,

    /// Inclusive date range, day granularity, applied to the entry timestamp.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,

    /// Exact match on the file-type tag (a leading dot is tolerated).
    pub file_type: Option<String>,

    /// Case-insensitive substring match on the file name.
    pub file_name: Option<String>,

    /// Exact (case-insensitive) match against the receiver list; only share
    /// entries carry receivers, so this filters everything else out.
    pub receiver: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Action,
    FileName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortSpec {
    /// Newest first.
    fn default() -> Self {
        SortSpec {
            field: SortField::Timestamp,
            order: SortOrder::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub items: Vec<LogEntry>,
    pub total_matched: usize,
    pub has_more: bool,
}

pub struct AuditLogEngine {
    store: Arc<Coordinator>,
}

impl AuditLogEngine {
    pub fn new(store: Arc<Coordinator>) -> Self {
        Self { store }
    }

    /// Query the merged activity and access logs, optionally scoped to one
    /// actor. `total_matched` counts the full filtered set; at most
    /// `page.limit` entries land in `items`.
    pub async fn query(
        &self,
        user: Option<&str>,
        filter: &LogFilter,
        sort: SortSpec,
        page: PageRequest,
    ) -> StoreResult<LogPage> {
        // Log keys carry a millisecond prefix, so the merged mapping is in
        // insertion order; file actions land in both logs under one key, and
        // merging by key collapses the duplicate.
        let mut merged = std::collections::BTreeMap::new();
        for collection in [Collection::ActivityLog, Collection::AccessLog] {
            let records = self.store.read(collection).await?;
            for (key, value) in records {
                match serde_json::from_value::<LogEntry>(value) {
                    Ok(entry) => {
                        merged.insert(key, entry);
                    }
                    Err(err) => {
                        debug!(collection = %collection, %key, error = %err, "skipping unreadable log entry");
                    }
                }
            }
        }
        let mut entries: Vec<LogEntry> = merged.into_values().collect();

        if let Some(user) = user {
            entries.retain(|e| e.user == user);
        }
        apply_filters(&mut entries, filter);

        let total_matched = entries.len();
        sort_entries(&mut entries, sort);

        let items: Vec<LogEntry> = entries
            .into_iter()
            .skip(page.offset)
            .take(page.limit.clamp(1, MAX_PAGE_LIMIT))
            .collect();
        let has_more = page.offset + items.len() < total_matched;

        Ok(LogPage {
            items,
            total_matched,
            has_more,
        })
    }
}

fn apply_filters(entries: &mut Vec<LogEntry>, filter: &LogFilter) {
    if let Some(action) = filter.action {
        entries.retain(|e| e.action == action);
    }

    if filter.start.is_some() || filter.end.is_some() {
        entries.retain(|e| {
            let day = e.timestamp.date_naive();
            if let Some(start) = filter.start {
                if day < start {
                    return false;
                }
            }
            if let Some(end) = filter.end {
                if day > end {
                    return false;
                }
            }
            true
        });
    }

    if let Some(file_type) = &filter.file_type {
        let wanted = file_type.trim_start_matches('.').to_ascii_lowercase();
        entries.retain(|e| e.file_type.as_deref() == Some(wanted.as_str()));
    }

    if let Some(fragment) = &filter.file_name {
        let fragment = fragment.to_lowercase();
        entries.retain(|e| {
            e.file
                .as_deref()
                .is_some_and(|f| f.to_lowercase().contains(&fragment))
        });
    }

    if let Some(receiver) = &filter.receiver {
        entries.retain(|e| {
            e.receivers
                .iter()
                .any(|r| r.eq_ignore_ascii_case(receiver))
        });
    }
}

/// Stable sort; equal keys keep their insertion order.
fn sort_entries(entries: &mut [LogEntry], sort: SortSpec) {
    entries.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortField::Action => a.action.as_str().cmp(b.action.as_str()),
            SortField::FileName => a.file.cmp(&b.file),
        };
        match sort.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(action: ActionKind, day: u32, file: Option<&str>) -> LogEntry {
        let ts = Utc.with_ymd_and_hms(2026, 8, day, 12, 0, 0).unwrap();
        let mut e = LogEntry::new("u@x.io", action, ts);
        if let Some(file) = file {
            e = e.with_file(file);
        }
        e
    }

    #[test]
    fn filters_compose_with_and_semantics() {
        let mut entries = vec![
            entry(ActionKind::Upload, 1, Some("a.pdf")),
            entry(ActionKind::Upload, 2, Some("b.pdf")),
            entry(ActionKind::Download, 1, Some("a.pdf")),
        ];
        let filter = LogFilter {
            action: Some(ActionKind::Upload),
            start: Some(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()),
            end: Some(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()),
            ..LogFilter::default()
        };
        apply_filters(&mut entries, &filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn file_type_filter_tolerates_leading_dot() {
        let mut entries = vec![
            entry(ActionKind::Upload, 1, Some("a.PDF")),
            entry(ActionKind::Upload, 1, Some("b.txt")),
        ];
        let filter = LogFilter {
            file_type: Some(".pdf".into()),
            ..LogFilter::default()
        };
        apply_filters(&mut entries, &filter);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn default_sort_is_newest_first_and_stable() {
        let mut entries = vec![
            entry(ActionKind::Upload, 1, Some("first.txt")),
            entry(ActionKind::Upload, 2, Some("newest.txt")),
            entry(ActionKind::Upload, 1, Some("second.txt")),
        ];
        sort_entries(&mut entries, SortSpec::default());
        assert_eq!(entries[0].file.as_deref(), Some("newest.txt"));
        // Same timestamp: insertion order preserved.
        assert_eq!(entries[1].file.as_deref(), Some("first.txt"));
        assert_eq!(entries[2].file.as_deref(), Some("second.txt"));
    }
}
