//! Anomaly detector: windows recent activity per actor, scores it against
//! the actor's own history with an isolation forest, and raises deduplicated
//! alerts.
//!
//! A verdict always carries human-readable reasons: simple rule thresholds
//! fire independently of the model, so even a cold-started actor (too little
//! history for the forest) gets explainable alerts. The model path only adds
//! a `model_outlier` reason on top.

use crate::errors::{StoreError, StoreResult};
use crate::models::{ActionKind, AlertRecord, Collection, LogEntry};
use crate::services::forest::{self, IsolationForest};
use crate::store::Coordinator;
use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Feature order inside a window vector.
const FEATURE_ACTIONS: [ActionKind; 5] = [
    ActionKind::Upload,
    ActionKind::Download,
    ActionKind::Delete,
    ActionKind::Share,
    ActionKind::FailedLogin,
];

/// Upper bound on how many trailing windows feed the model. Keeps scoring
/// bounded for actors with years of history.
const MAX_HISTORY_WINDOWS: usize = 90;

#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Trailing window length, also the history window length.
    pub window_hours: u32,

    /// Expected fraction of historical windows that are true outliers; sets
    /// the model's decision threshold.
    pub contamination: f64,

    /// Minimum number of historical windows before the model participates.
    /// Below this the model abstains and only rules decide.
    pub min_history: usize,

    pub trees: usize,
    pub sample_size: usize,

    /// RNG seed for the forest, fixed so verdicts are reproducible.
    pub seed: u64,

    /// Suppression window for repeated alerts of one kind per actor.
    pub cooldown_hours: u32,

    // Rule thresholds, counted within the trailing window.
    pub failed_login_threshold: u64,
    pub download_threshold: u64,
    pub delete_threshold: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            window_hours: 24,
            contamination: 0.10,
            min_history: 8,
            trees: 100,
            sample_size: 64,
            seed: 0x5ec_c10d,
            cooldown_hours: 24,
            failed_login_threshold: 5,
            download_threshold: 10,
            delete_threshold: 3,
        }
    }
}

/// One named cause attached to a verdict.
#[derive(Debug, Clone, Serialize)]
pub struct Reason {
    /// Stable kind used for alert deduplication (`failed_logins`,
    /// `downloads`, `deletes`, `model_outlier`).
    pub kind: String,

    /// Human-readable cause.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyVerdict {
    pub is_anomalous: bool,
    pub reasons: Vec<Reason>,

    /// Model score in `(0, 1)`; `None` when the model abstained (cold start).
    pub model_score: Option<f64>,
}

pub struct AnomalyDetector {
    store: Arc<Coordinator>,
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(store: Arc<Coordinator>, config: AnomalyConfig) -> Self {
        Self { store, config }
    }

    /// Score the actor's trailing window against their history, as of now.
    pub async fn score(&self, actor: &str) -> StoreResult<AnomalyVerdict> {
        self.score_at(actor, Utc::now()).await
    }

    /// Score with an explicit reference time.
    pub async fn score_at(&self, actor: &str, now: DateTime<Utc>) -> StoreResult<AnomalyVerdict> {
        let entries = self.actor_entries(actor).await?;
        let window = Duration::hours(i64::from(self.config.window_hours));

        let current = feature_vector(&entries, now - window, now);
        let mut reasons = rule_reasons(&current, &self.config);

        let history = history_vectors(&entries, now, window);
        let model_score = if history.len() >= self.config.min_history {
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            IsolationForest::fit(
                &history,
                self.config.trees,
                self.config.sample_size,
                &mut rng,
            )
            .map(|model| {
                let training_scores = history.iter().map(|v| model.score(v)).collect();
                let threshold =
                    forest::decision_threshold(training_scores, self.config.contamination);
                let score = model.score(&current);
                if score > threshold {
                    reasons.push(Reason {
                        kind: "model_outlier".to_string(),
                        message: format!(
                            "activity pattern is an outlier against {} historical windows \
                             (score {score:.3}, threshold {threshold:.3})",
                            history.len()
                        ),
                    });
                }
                score
            })
        } else {
            debug!(
                actor,
                windows = history.len(),
                min = self.config.min_history,
                "cold start, model abstains"
            );
            None
        };

        Ok(AnomalyVerdict {
            is_anomalous: !reasons.is_empty(),
            reasons,
            model_score,
        })
    }

    /// Persist an alert unless one of the same kind for the same actor is
    /// still inside its cooldown window. Returns the created record, or
    /// `None` when suppressed.
    pub async fn raise_alert(
        &self,
        actor: &str,
        kind: &str,
        message: &str,
    ) -> StoreResult<Option<AlertRecord>> {
        self.raise_alert_at(actor, kind, message, Utc::now()).await
    }

    pub async fn raise_alert_at(
        &self,
        actor: &str,
        kind: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AlertRecord>> {
        let alert = AlertRecord {
            user: actor.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
            created_at: now,
            cooldown_hours: self.config.cooldown_hours,
        };
        let key = AlertRecord::key_for(actor, kind);
        let value = serde_json::to_value(&alert).map_err(|err| StoreError::Persistence {
            collection: Collection::SentAlerts.name(),
            reason: format!("could not serialize alert: {err}"),
        })?;

        let created = self
            .store
            .update(Collection::SentAlerts, move |records| {
                let suppressed = records
                    .get(&key)
                    .and_then(|raw| serde_json::from_value::<AlertRecord>(raw.clone()).ok())
                    .is_some_and(|existing| existing.in_cooldown(now));
                if suppressed {
                    return None;
                }
                records.insert(key, value);
                Some(alert)
            })
            .await?;

        match &created {
            Some(alert) => info!(actor, kind = %alert.kind, "alert raised"),
            None => debug!(actor, kind, "alert suppressed by cooldown"),
        }
        Ok(created)
    }

    /// Score the actor and raise one alert per tripped reason, deduplicated
    /// against the cooldown window.
    pub async fn check_and_alert(
        &self,
        actor: &str,
    ) -> StoreResult<(AnomalyVerdict, Vec<AlertRecord>)> {
        let now = Utc::now();
        let verdict = self.score_at(actor, now).await?;
        let mut raised = Vec::new();
        for reason in &verdict.reasons {
            if let Some(alert) = self
                .raise_alert_at(actor, &reason.kind, &reason.message, now)
                .await?
            {
                raised.push(alert);
            }
        }
        Ok((verdict, raised))
    }

    async fn actor_entries(&self, actor: &str) -> StoreResult<Vec<LogEntry>> {
        let records = self.store.read(Collection::ActivityLog).await?;
        let mut entries: Vec<LogEntry> = records
            .into_values()
            .filter_map(|value| serde_json::from_value::<LogEntry>(value).ok())
            .filter(|entry| entry.user == actor)
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }
}

/// Action counts within `(start, end]`, in `FEATURE_ACTIONS` order.
fn feature_vector(entries: &[LogEntry], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<f64> {
    let mut counts = vec![0f64; FEATURE_ACTIONS.len()];
    for entry in entries {
        if entry.timestamp <= start || entry.timestamp > end {
            continue;
        }
        if let Some(idx) = FEATURE_ACTIONS.iter().position(|&a| a == entry.action) {
            counts[idx] += 1.0;
        }
    }
    counts
}

/// One vector per consecutive historical window preceding the current one,
/// newest first, back to the actor's earliest activity (bounded).
fn history_vectors(
    entries: &[LogEntry],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<Vec<f64>> {
    let Some(earliest) = entries.first().map(|e| e.timestamp) else {
        return Vec::new();
    };

    let mut vectors = Vec::new();
    let mut end = now - window;
    while end > earliest && vectors.len() < MAX_HISTORY_WINDOWS {
        let start = end - window;
        vectors.push(feature_vector(entries, start, end));
        end = start;
    }
    vectors
}

fn rule_reasons(current: &[f64], config: &AnomalyConfig) -> Vec<Reason> {
    let count = |action: ActionKind| -> u64 {
        FEATURE_ACTIONS
            .iter()
            .position(|&a| a == action)
            .map(|idx| current[idx] as u64)
            .unwrap_or(0)
    };

    let mut reasons = Vec::new();
    let failed = count(ActionKind::FailedLogin);
    if failed >= config.failed_login_threshold {
        reasons.push(Reason {
            kind: "failed_logins".to_string(),
            message: format!(
                "{failed} failed login attempts in the last {}h (threshold {})",
                config.window_hours, config.failed_login_threshold
            ),
        });
    }
    let downloads = count(ActionKind::Download);
    if downloads >= config.download_threshold {
        reasons.push(Reason {
            kind: "downloads".to_string(),
            message: format!(
                "{downloads} downloads in the last {}h (threshold {})",
                config.window_hours, config.download_threshold
            ),
        });
    }
    let deletes = count(ActionKind::Delete);
    if deletes >= config.delete_threshold {
        reasons.push(Reason {
            kind: "deletes".to_string(),
            message: format!(
                "{deletes} deletions in the last {}h (threshold {})",
                config.window_hours, config.delete_threshold
            ),
        });
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    fn entry(action: ActionKind, ts: DateTime<Utc>) -> LogEntry {
        LogEntry::new("u@x.io", action, ts)
    }

    #[test]
    fn feature_vector_counts_only_inside_the_window() {
        let entries = vec![
            entry(ActionKind::Upload, at(10, 6)),
            entry(ActionKind::Upload, at(11, 6)),
            entry(ActionKind::Download, at(11, 7)),
        ];
        let v = feature_vector(&entries, at(11, 0), at(12, 0));
        assert_eq!(v, vec![1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn history_windows_stop_at_earliest_activity() {
        let entries = vec![
            entry(ActionKind::Upload, at(10, 12)),
            entry(ActionKind::Upload, at(12, 12)),
        ];
        let windows = history_vectors(&entries, at(13, 0), Duration::hours(24));
        // Current window is (12th 00:00, 13th 00:00]; history reaches back to
        // the 10th 12:00 entry: (11th, 12th] and (10th, 11th].
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn rules_fire_at_their_thresholds() {
        let config = AnomalyConfig::default();
        let mut current = vec![0.0; FEATURE_ACTIONS.len()];
        current[4] = 5.0; // failed logins
        current[1] = 10.0; // downloads
        let reasons = rule_reasons(&current, &config);
        let kinds: Vec<&str> = reasons.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["failed_logins", "downloads"]);
    }
}
