//! Storage collaborator contract and the in-process implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use evcol_core::{validate_record, EventRecord, Region};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("no record stored for {0}")]
    NotFound(String),
    #[error("corrupt row for {source_url}: {message}")]
    Corrupt { source_url: String, message: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Key-value-with-predicates view of the shared event table.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<EventRecord>, StoreError>;

    /// Any record starting on `start_date` whose title begins with `title_prefix`.
    async fn find_near_duplicate(
        &self,
        start_date: NaiveDate,
        title_prefix: &str,
    ) -> Result<Option<EventRecord>, StoreError>;

    /// Create-or-update keyed by `source_url`. Returns `Ok(None)` when the
    /// stored row is approved and therefore left untouched.
    async fn save(&self, record: &EventRecord) -> Result<Option<EventRecord>, StoreError>;

    /// Unapproved records whose region is null or blank.
    async fn records_missing_region(&self) -> Result<Vec<EventRecord>, StoreError>;

    /// Sets the region of an unapproved record whose region is still blank,
    /// or still the generic default when `region` is specific. Returns
    /// whether a row changed.
    async fn update_region(&self, source_url: &str, region: Region) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Region overwrite rule shared by the backfill job and both stores.
pub fn should_overwrite_region(current: Option<Region>, computed: Region) -> bool {
    match current {
        None => true,
        Some(Region::Nationwide) => !computed.is_default(),
        Some(_) => false,
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: RwLock<BTreeMap<String, EventRecord>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row without validation or the moderation guard, the way
    /// other collaborators (admin tools, moderators) touch the table.
    pub async fn insert_raw(&self, record: EventRecord) {
        self.records
            .write()
            .await
            .insert(record.source_url.clone(), record);
    }

    pub async fn all(&self) -> Vec<EventRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_by_source_url(
        &self,
        source_url: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.records.read().await.get(source_url).cloned())
    }

    async fn find_near_duplicate(
        &self,
        start_date: NaiveDate,
        title_prefix: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        if title_prefix.is_empty() {
            return Ok(None);
        }
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.start_date == start_date && r.title.starts_with(title_prefix))
            .cloned())
    }

    async fn save(&self, record: &EventRecord) -> Result<Option<EventRecord>, StoreError> {
        validate_record(record).map_err(StoreError::Validation)?;
        let mut records = self.records.write().await;
        if records
            .get(&record.source_url)
            .is_some_and(EventRecord::is_frozen)
        {
            return Ok(None);
        }
        records.insert(record.source_url.clone(), record.clone());
        Ok(Some(record.clone()))
    }

    async fn records_missing_region(&self) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.region.is_none() && !r.is_frozen())
            .cloned()
            .collect())
    }

    async fn update_region(&self, source_url: &str, region: Region) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(source_url)
            .ok_or_else(|| StoreError::NotFound(source_url.to_string()))?;
        if record.is_frozen() || !should_overwrite_region(record.region, region) {
            return Ok(false);
        }
        record.region = Some(region);
        Ok(true)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }
}
