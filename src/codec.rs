//! Record codec: detects legacy record shapes and expands them into the
//! canonical field mapping.
//!
//! Everything here is pure — no I/O, no clock reads (the caller passes `now`
//! for synthesized timestamps). The ambiguous legacy shapes never escape this
//! module; the rest of the crate only ever sees canonical mappings.
//!
//! Known legacy shapes, inherited from earlier releases of the application:
//! - `folders`: a bare JSON array of folder names under an owner-email key,
//!   e.g. `{"alice@x.io": ["docs", "pics"]}`.
//! - `files`: metadata objects missing the `folder` field.
//! - `activity_log` / `access_log`: entries with the old `time` field instead
//!   of `timestamp`, or a nested `meta` object carrying `file_type` /
//!   `receiver_emails`, or no `file_type` tag at all.
//! - `otp`: objects with the old `otp` field instead of `code`.
//! - `sent_alerts`: bare booleans or strings under an ad hoc key.

use crate::models::{Collection, log_entry::extension_tag};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

/// Seconds a migrated one-time code is considered to have been valid for.
/// Matches the application default so a pending legacy code neither expires
/// instantly nor lingers.
const LEGACY_OTP_EXPIRY_SECS: u32 = 180;

/// Default cooldown attached to migrated alert markers.
const LEGACY_ALERT_COOLDOWN_HOURS: u32 = 24;

/// Whether a raw value already matches the canonical shape for `collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Canonical,
    Legacy,
}

/// Classify a single raw record without changing it.
pub fn classify(collection: Collection, _key: &str, value: &Value) -> Shape {
    match collection {
        Collection::Folders => match value {
            Value::Array(_) => Shape::Legacy,
            _ => Shape::Canonical,
        },
        Collection::Files => match value.as_object() {
            Some(fields) if !fields.contains_key("folder") => Shape::Legacy,
            _ => Shape::Canonical,
        },
        Collection::ActivityLog | Collection::AccessLog => match value.as_object() {
            Some(fields) => {
                let renamed_time = fields.contains_key("time") && !fields.contains_key("timestamp");
                let nested_meta = fields.contains_key("meta");
                let untagged_file = fields.get("file").is_some_and(Value::is_string)
                    && !fields.contains_key("file_type");
                if renamed_time || nested_meta || untagged_file {
                    Shape::Legacy
                } else {
                    Shape::Canonical
                }
            }
            None => Shape::Legacy,
        },
        Collection::Otp => match value.as_object() {
            Some(fields) if !fields.contains_key("code") => Shape::Legacy,
            _ => Shape::Canonical,
        },
        Collection::SentAlerts => match value {
            Value::Object(_) => Shape::Canonical,
            _ => Shape::Legacy,
        },
        // No known legacy shape; whatever is stored passes through.
        Collection::Users | Collection::Shares => Shape::Canonical,
    }
}

/// Expand one raw entry into canonical `(key, record)` pairs.
///
/// Canonical entries come back unchanged as a single pair. Legacy entries are
/// rewritten with deterministic defaults; a legacy folder list expands into
/// one pair per listed name. No information is discarded: unknown fields are
/// carried over verbatim.
pub fn expand(
    collection: Collection,
    key: &str,
    value: &Value,
    now: DateTime<Utc>,
) -> Vec<(String, Value)> {
    if classify(collection, key, value) == Shape::Canonical {
        return vec![(key.to_string(), value.clone())];
    }

    match collection {
        Collection::Folders => expand_folder_list(key, value, now),
        Collection::Files => vec![(key.to_string(), canonicalize_file(value))],
        Collection::ActivityLog | Collection::AccessLog => {
            vec![(key.to_string(), canonicalize_log_entry(value))]
        }
        Collection::Otp => vec![(key.to_string(), canonicalize_otp(key, value))],
        Collection::SentAlerts => vec![(key.to_string(), canonicalize_alert(key, value, now))],
        Collection::Users | Collection::Shares => vec![(key.to_string(), value.clone())],
    }
}

/// `{"owner": ["docs", "pics"]}` becomes one full folder record per name,
/// keyed `owner:/name`, parented at the root, with `now` as the synthesized
/// creation time.
fn expand_folder_list(owner: &str, value: &Value, now: DateTime<Utc>) -> Vec<(String, Value)> {
    let Some(names) = value.as_array() else {
        // Neither object nor list: keep the entry rather than drop it.
        return vec![(owner.to_string(), value.clone())];
    };

    names
        .iter()
        .filter_map(Value::as_str)
        .map(|name| {
            let path = format!("/{}", name.trim_start_matches('/'));
            let id = format!("{owner}:{path}");
            let record = json!({
                "id": id,
                "name": name.trim_start_matches('/'),
                "path": path,
                "parent": "/",
                "owner": owner,
                "created_at": timestamp(now),
            });
            (id, record)
        })
        .collect()
}

/// Add the `folder` field file metadata gained later; everything else stays.
fn canonicalize_file(value: &Value) -> Value {
    let mut out = value.clone();
    if let Some(fields) = out.as_object_mut() {
        fields.insert("folder".to_string(), json!("/"));
    }
    out
}

/// Rename `time` to `timestamp`, hoist the known `meta` fields, and derive a
/// `file_type` tag from the file name.
fn canonicalize_log_entry(value: &Value) -> Value {
    let mut out = value.clone();
    let Some(fields) = out.as_object_mut() else {
        return out;
    };

    if !fields.contains_key("timestamp") {
        if let Some(time) = fields.remove("time") {
            fields.insert("timestamp".to_string(), time);
        }
    }

    if let Some(meta_value) = fields.remove("meta") {
        if let Some(mut meta) = match meta_value {
            Value::Object(meta) => Some(meta),
            other => {
                // Non-object meta is unexpected; keep it rather than drop it.
                fields.insert("meta_extra".to_string(), other);
                None
            }
        } {
            if let Some(file_type) = meta.remove("file_type") {
                fields
                    .entry("file_type".to_string())
                    .or_insert(file_type);
            }
            if let Some(receivers) = meta.remove("receiver_emails") {
                fields
                    .entry("receivers".to_string())
                    .or_insert(receivers);
            }
            if let Some(origin) = meta.remove("origin") {
                fields.entry("origin".to_string()).or_insert(origin);
            }
            // Anything we do not recognize survives under a different key so
            // the entry still classifies as canonical afterwards.
            if !meta.is_empty() {
                fields.insert("meta_extra".to_string(), Value::Object(meta));
            }
        }
    }

    if fields.get("file").is_some_and(Value::is_string) && !fields.contains_key("file_type") {
        let tag = fields
            .get("file")
            .and_then(Value::as_str)
            .and_then(extension_tag)
            .unwrap_or_else(|| "unknown".to_string());
        fields.insert("file_type".to_string(), json!(tag));
    }

    out
}

/// `{"otp": "123456", "created_at": ...}` becomes a full code record for the
/// subject the entry is keyed by.
fn canonicalize_otp(subject: &str, value: &Value) -> Value {
    let mut out = value.clone();
    let Some(fields) = out.as_object_mut() else {
        return out;
    };

    if let Some(code) = fields.remove("otp") {
        fields.insert("code".to_string(), code);
    }
    // A record with no code at all can never verify; an empty code keeps the
    // entry canonical without inventing a usable value.
    fields
        .entry("code".to_string())
        .or_insert_with(|| json!(""));
    fields
        .entry("subject".to_string())
        .or_insert_with(|| json!(subject));
    fields
        .entry("expiry_secs".to_string())
        .or_insert_with(|| json!(LEGACY_OTP_EXPIRY_SECS));
    fields
        .entry("single_use".to_string())
        .or_insert_with(|| json!(true));

    out
}

/// Old alert markers were `key: true` or `key: "message"`. The key was the
/// user email, sometimes with an ad hoc suffix; everything after the email is
/// treated as the alert kind.
fn canonicalize_alert(key: &str, value: &Value, now: DateTime<Utc>) -> Value {
    let (user, kind) = match key.split_once(':') {
        Some((user, kind)) => (user, kind),
        None => (key, "legacy"),
    };
    let message = match value {
        Value::String(message) => message.clone(),
        other => other.to_string(),
    };
    json!({
        "user": user,
        "kind": kind,
        "message": message,
        "created_at": timestamp(now),
        "cooldown_hours": LEGACY_ALERT_COOLDOWN_HOURS,
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FolderRecord, LogEntry, OtpRecord};

    fn now() -> DateTime<Utc> {
        "2026-08-01T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn folder_list_expands_to_full_records() {
        let legacy = json!(["docs", "pics"]);
        let expanded = expand(Collection::Folders, "alice@x.io", &legacy, now());
        assert_eq!(expanded.len(), 2);

        let (key, value) = &expanded[0];
        assert_eq!(key, "alice@x.io:/docs");
        let record: FolderRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(record.name, "docs");
        assert_eq!(record.path, "/docs");
        assert_eq!(record.parent, "/");
        assert_eq!(record.owner, "alice@x.io");
        assert_eq!(record.created_at, now());
    }

    #[test]
    fn canonical_folder_passes_through_untouched() {
        let canonical = json!({
            "id": "alice@x.io:/docs2",
            "name": "docs2",
            "path": "/docs2",
            "parent": "/",
            "owner": "alice@x.io",
            "created_at": "2026-07-01T00:00:00Z",
        });
        assert_eq!(
            classify(Collection::Folders, "alice@x.io:/docs2", &canonical),
            Shape::Canonical
        );
        let expanded = expand(Collection::Folders, "alice@x.io:/docs2", &canonical, now());
        assert_eq!(expanded, vec![("alice@x.io:/docs2".to_string(), canonical)]);
    }

    #[test]
    fn file_without_folder_gains_root() {
        let legacy = json!({
            "owner": "u@x.io",
            "original_name": "a.txt",
            "stored_as": "u_at_x.io_a.txt",
            "uploaded_at": "2026-07-01T00:00:00Z",
            "size": 12,
        });
        assert_eq!(classify(Collection::Files, "k", &legacy), Shape::Legacy);
        let expanded = expand(Collection::Files, "k", &legacy, now());
        assert_eq!(expanded[0].1["folder"], json!("/"));
        assert_eq!(expanded[0].1["size"], json!(12));
    }

    #[test]
    fn log_entry_time_and_meta_are_normalized() {
        let legacy = json!({
            "user": "u@x.io",
            "action": "share",
            "file": "report.pdf",
            "time": "2026-07-02T08:00:00Z",
            "meta": {"receiver_emails": ["r@x.io"], "file_type": "pdf"},
        });
        let expanded = expand(Collection::AccessLog, "e1", &legacy, now());
        let entry: LogEntry = serde_json::from_value(expanded[0].1.clone()).unwrap();
        assert_eq!(entry.timestamp, "2026-07-02T08:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(entry.file_type.as_deref(), Some("pdf"));
        assert_eq!(entry.receivers, vec!["r@x.io".to_string()]);
    }

    #[test]
    fn log_entry_derives_missing_file_type() {
        let legacy = json!({
            "user": "u@x.io",
            "action": "upload",
            "file": "photo.JPG",
            "timestamp": "2026-07-02T08:00:00Z",
        });
        let expanded = expand(Collection::ActivityLog, "e1", &legacy, now());
        assert_eq!(expanded[0].1["file_type"], json!("jpg"));
    }

    #[test]
    fn legacy_otp_becomes_full_record() {
        let legacy = json!({"otp": "482913", "created_at": "2026-08-01T09:59:00Z"});
        let expanded = expand(Collection::Otp, "u@x.io", &legacy, now());
        let record: OtpRecord = serde_json::from_value(expanded[0].1.clone()).unwrap();
        assert_eq!(record.code, "482913");
        assert_eq!(record.subject, "u@x.io");
        assert!(record.single_use);
        assert!(!record.is_expired(record.created_at));
    }

    #[test]
    fn legacy_alert_marker_expands() {
        let expanded = expand(Collection::SentAlerts, "u@x.io", &json!(true), now());
        assert_eq!(expanded[0].1["user"], json!("u@x.io"));
        assert_eq!(expanded[0].1["kind"], json!("legacy"));
    }
}
