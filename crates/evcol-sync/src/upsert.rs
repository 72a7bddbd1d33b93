//! Dedup and conflict-aware upsert of adapter candidates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use evcol_core::{title_prefix, ApprovalStatus, EventCandidate, EventRecord, RegionClassifier};
use evcol_storage::{EventStore, StoreError};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created(EventRecord),
    Updated(EventRecord),
    SkippedNearDuplicate { existing_source_url: String },
    SkippedFrozen,
    Rejected { reasons: Vec<String> },
}

impl UpsertOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
            UpsertOutcome::SkippedNearDuplicate { .. } => "skipped_near_duplicate",
            UpsertOutcome::SkippedFrozen => "skipped_frozen",
            UpsertOutcome::Rejected { .. } => "rejected",
        }
    }

    /// The stored record, for outcomes that wrote one.
    pub fn record(&self) -> Option<&EventRecord> {
        match self {
            UpsertOutcome::Created(record) | UpsertOutcome::Updated(record) => Some(record),
            _ => None,
        }
    }
}

/// Builds the row to write for `candidate`. Moderation status and the
/// enrichment-only `website_url` carry over from `existing`; a stored
/// description survives unless it is missing or shorter than
/// `min_description_len`.
pub fn merge_candidate(
    candidate: &EventCandidate,
    existing: Option<&EventRecord>,
    classifier: &RegionClassifier,
    min_description_len: usize,
    now: DateTime<Utc>,
) -> EventRecord {
    let region = candidate
        .region
        .unwrap_or_else(|| classifier.classify(&candidate.location));

    let description = match existing {
        Some(stored) if stored.description_len() >= min_description_len => {
            stored.description.clone()
        }
        Some(stored) => candidate
            .description
            .clone()
            .or_else(|| stored.description.clone()),
        None => candidate.description.clone(),
    };

    EventRecord {
        title: candidate.title.trim().to_string(),
        category: candidate.category,
        location: candidate.location.clone(),
        region: Some(region),
        start_date: candidate.start_date,
        end_date: candidate.end_date_or_start(),
        image_url: candidate.image_url.clone(),
        source_url: candidate.source_url.clone(),
        website_url: existing.and_then(|r| r.website_url.clone()),
        description,
        organizer: candidate.organizer.clone(),
        price: candidate.price.clone(),
        is_free: candidate.resolved_is_free(),
        approval_status: Some(
            existing
                .and_then(|r| r.approval_status)
                .unwrap_or(ApprovalStatus::Pending),
        ),
        crawled_at: Some(now),
    }
}

pub struct UpsertEngine {
    store: Arc<dyn EventStore>,
    classifier: Arc<RegionClassifier>,
    min_description_len: usize,
    write_gate: Arc<Mutex<()>>,
}

impl UpsertEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        classifier: Arc<RegionClassifier>,
        min_description_len: usize,
    ) -> Self {
        Self {
            store,
            classifier,
            min_description_len,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Gate shared with other writers of the same rows (the detail enricher).
    pub fn write_gate(&self) -> Arc<Mutex<()>> {
        self.write_gate.clone()
    }

    pub async fn upsert(&self, candidate: &EventCandidate) -> Result<UpsertOutcome, StoreError> {
        self.upsert_at(candidate, Utc::now()).await
    }

    /// Lookups and the write happen under one gate so two overlapping calls
    /// for the same listing cannot both find it absent.
    pub async fn upsert_at(
        &self,
        candidate: &EventCandidate,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let _gate = self.write_gate.lock().await;

        let existing = match self.store.find_by_source_url(&candidate.source_url).await? {
            Some(record) => Some(record),
            None => {
                let prefix = title_prefix(&candidate.title);
                if let Some(twin) = self
                    .store
                    .find_near_duplicate(candidate.start_date, &prefix)
                    .await?
                {
                    debug!(
                        title = %candidate.title,
                        existing = %twin.source_url,
                        "near duplicate skipped"
                    );
                    return Ok(UpsertOutcome::SkippedNearDuplicate {
                        existing_source_url: twin.source_url,
                    });
                }
                None
            }
        };

        if existing.as_ref().is_some_and(EventRecord::is_frozen) {
            debug!(source_url = %candidate.source_url, "approved record left untouched");
            return Ok(UpsertOutcome::SkippedFrozen);
        }

        let record = merge_candidate(
            candidate,
            existing.as_ref(),
            &self.classifier,
            self.min_description_len,
            now,
        );
        match self.store.save(&record).await {
            Ok(Some(saved)) if existing.is_some() => Ok(UpsertOutcome::Updated(saved)),
            Ok(Some(saved)) => Ok(UpsertOutcome::Created(saved)),
            Ok(None) => Ok(UpsertOutcome::SkippedFrozen),
            Err(StoreError::Validation(reasons)) => {
                warn!(
                    title = %candidate.title,
                    reasons = ?reasons,
                    "record rejected by validation"
                );
                Ok(UpsertOutcome::Rejected { reasons })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use evcol_core::{Category, Region};
    use evcol_storage::InMemoryEventStore;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, hour, 0, 0).single().unwrap()
    }

    fn candidate(title: &str, source_url: &str) -> EventCandidate {
        let mut c = EventCandidate::new(
            "festival-portal",
            Category::Festival,
            title,
            source_url,
            NaiveDate::from_ymd_opt(2025, 10, 25).unwrap(),
        );
        c.location = "부산 광안리".to_string();
        c
    }

    fn engine() -> (Arc<InMemoryEventStore>, UpsertEngine) {
        let store = Arc::new(InMemoryEventStore::new());
        let engine = UpsertEngine::new(store.clone(), Arc::new(RegionClassifier::default()), 50);
        (store, engine)
    }

    #[test]
    fn merge_fills_defaults_for_new_records() {
        let mut c = candidate("Busan Firework Show", "u3");
        c.price = Some("무료".to_string());
        let record = merge_candidate(&c, None, &RegionClassifier::default(), 50, at(3));
        assert_eq!(record.region, Some(Region::Busan));
        assert_eq!(record.end_date, c.start_date);
        assert!(record.is_free);
        assert_eq!(record.approval_status, Some(ApprovalStatus::Pending));
        assert_eq!(record.crawled_at, Some(at(3)));
    }

    #[test]
    fn merge_keeps_decided_status_enrichment_and_long_descriptions() {
        let classifier = RegionClassifier::default();
        let long = "광안리 해변을 수놓는 불꽃 쇼와 함께 다양한 거리 공연, 먹거리 장터, 야간 드론 쇼가 이어지는 부산 대표 가을 축제입니다.";
        let stored = EventRecord {
            website_url: Some("https://fireworks.example.kr".to_string()),
            description: Some(long.to_string()),
            approval_status: Some(ApprovalStatus::Rejected),
            ..merge_candidate(&candidate("Busan Firework Show", "u3"), None, &classifier, 50, at(1))
        };

        let mut again = candidate("Busan Firework Show", "u3");
        again.description = Some("짧은 요약".to_string());
        let merged = merge_candidate(&again, Some(&stored), &classifier, 50, at(2));
        assert_eq!(merged.approval_status, Some(ApprovalStatus::Rejected));
        assert_eq!(merged.website_url.as_deref(), Some("https://fireworks.example.kr"));
        assert_eq!(merged.description.as_deref(), Some(long));

        let short_stored = EventRecord {
            description: Some("요약".to_string()),
            ..stored
        };
        let merged = merge_candidate(&again, Some(&short_stored), &classifier, 50, at(2));
        assert_eq!(merged.description.as_deref(), Some("짧은 요약"));
    }

    #[tokio::test]
    async fn creates_then_updates_by_source_url() {
        let (store, engine) = engine();
        let first = engine
            .upsert_at(&candidate("Busan Firework Show", "u3"), at(1))
            .await
            .unwrap();
        assert_eq!(first.label(), "created");

        let second = engine
            .upsert_at(&candidate("Busan Firework Show", "u3"), at(2))
            .await
            .unwrap();
        assert_eq!(second.label(), "updated");
        assert_eq!(second.record().unwrap().crawled_at, Some(at(2)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn near_duplicates_are_not_written() {
        let (store, engine) = engine();
        engine
            .upsert_at(&candidate("Busan Firework Show", "u3"), at(1))
            .await
            .unwrap();
        let outcome = engine
            .upsert_at(&candidate("Busan Fireworks Gala", "u2"), at(2))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::SkippedNearDuplicate {
                existing_source_url: "u3".to_string()
            }
        );
        assert!(store.find_by_source_url("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn a_different_start_date_is_not_a_duplicate() {
        let (store, engine) = engine();
        engine
            .upsert_at(&candidate("Busan Firework Show", "u3"), at(1))
            .await
            .unwrap();
        let mut next_week = candidate("Busan Firework Show", "u4");
        next_week.start_date = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        let outcome = engine.upsert_at(&next_week, at(2)).await.unwrap();
        assert_eq!(outcome.label(), "created");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn validation_failures_become_rejections() {
        let (store, engine) = engine();
        let outcome = engine.upsert_at(&candidate("   ", "u5"), at(1)).await.unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Rejected {
                reasons: vec!["title can't be blank".to_string()]
            }
        );
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overlapping_upserts_store_one_row() {
        let (store, engine) = engine();
        let engine = Arc::new(engine);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .upsert(&candidate("Busan Firework Show", "u3"))
                    .await
                    .unwrap()
                    .label()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == "created" {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
