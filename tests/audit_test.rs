use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use securecloud_store::models::ActionKind;
use securecloud_store::models::LogEntry;
use securecloud_store::services::{
    AuditLogEngine, CatalogService, LogFilter, PageRequest, SortField, SortOrder, SortSpec,
};
use securecloud_store::store::{Coordinator, LocalStore};
use std::collections::BTreeSet;
use std::sync::Arc;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
}

async fn seeded_engine() -> (AuditLogEngine, Arc<Coordinator>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Coordinator::new(LocalStore::new(dir.path()), None));
    let catalog = CatalogService::new(store.clone());

    let entries = vec![
        LogEntry::new("alice@x.io", ActionKind::Upload, at(1, 9)).with_file("report.pdf"),
        LogEntry::new("alice@x.io", ActionKind::Download, at(1, 10)).with_file("report.pdf"),
        LogEntry::new("alice@x.io", ActionKind::Share, at(2, 11))
            .with_file("photo.jpg")
            .with_receivers(vec!["bob@x.io".into()]),
        LogEntry::new("bob@x.io", ActionKind::Upload, at(2, 12)).with_file("notes.TXT"),
        LogEntry::new("alice@x.io", ActionKind::Login, at(3, 8)),
    ];
    for entry in entries {
        catalog.record_activity(entry).await.unwrap();
    }

    (AuditLogEngine::new(store.clone()), store, dir)
}

#[tokio::test]
async fn file_actions_are_not_double_counted_across_logs() {
    let (engine, _store, _dir) = seeded_engine().await;
    let page = engine
        .query(None, &LogFilter::default(), SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    // Four file actions land in both logs; the merge reports each once.
    assert_eq!(page.total_matched, 5);
}

#[tokio::test]
async fn filters_restrict_by_user_action_and_date() {
    let (engine, _store, _dir) = seeded_engine().await;

    let filter = LogFilter {
        action: Some(ActionKind::Upload),
        ..LogFilter::default()
    };
    let page = engine
        .query(Some("alice@x.io"), &filter, SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_matched, 1);
    assert_eq!(page.items[0].file.as_deref(), Some("report.pdf"));

    let filter = LogFilter {
        start: Some(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()),
        end: Some(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap()),
        ..LogFilter::default()
    };
    let page = engine
        .query(None, &filter, SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_matched, 2);
}

#[tokio::test]
async fn receiver_and_file_type_filters_match_share_entries() {
    let (engine, _store, _dir) = seeded_engine().await;

    let filter = LogFilter {
        receiver: Some("BOB@x.io".into()),
        ..LogFilter::default()
    };
    let page = engine
        .query(None, &filter, SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_matched, 1);
    assert_eq!(page.items[0].action, ActionKind::Share);

    let filter = LogFilter {
        file_type: Some(".txt".into()),
        ..LogFilter::default()
    };
    let page = engine
        .query(None, &filter, SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_matched, 1);
    assert_eq!(page.items[0].user, "bob@x.io");
}

#[tokio::test]
async fn default_sort_is_newest_first() {
    let (engine, _store, _dir) = seeded_engine().await;
    let page = engine
        .query(None, &LogFilter::default(), SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    let times: Vec<_> = page.items.iter().map(|e| e.timestamp).collect();
    let mut sorted = times.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(times, sorted);
}

#[tokio::test]
async fn pagination_walks_the_result_set_exactly_once() {
    let (engine, _store, _dir) = seeded_engine().await;
    let sort = SortSpec {
        field: SortField::Timestamp,
        order: SortOrder::Ascending,
    };

    let mut seen = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = engine
            .query(None, &LogFilter::default(), sort, PageRequest { limit: 2, offset })
            .await
            .unwrap();
        assert!(page.items.len() <= 2);
        for entry in &page.items {
            // (timestamp, action) is unique in the fixture.
            assert!(seen.insert((entry.timestamp, entry.action.as_str())));
        }
        offset += page.items.len();
        if !page.has_more {
            break;
        }
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn offset_past_the_end_yields_an_empty_page() {
    let (engine, _store, _dir) = seeded_engine().await;
    let page = engine
        .query(
            None,
            &LogFilter::default(),
            SortSpec::default(),
            PageRequest { limit: 10, offset: 50 },
        )
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_matched, 5);
    assert!(!page.has_more);
}
