//! Postgres-backed event store (sqlx).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use evcol_core::{validate_record, ApprovalStatus, Category, EventRecord, Region};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::event_store::{EventStore, StoreError};

const EVENT_COLUMNS: &str = "title, category, location, region, start_date, end_date, image_url, \
     source_url, website_url, description, organizer, price, is_free, approval_status, crawled_at";

#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn corrupt(source_url: &str, message: impl ToString) -> StoreError {
    StoreError::Corrupt {
        source_url: source_url.to_string(),
        message: message.to_string(),
    }
}

fn row_to_record(row: &PgRow) -> Result<EventRecord, StoreError> {
    let source_url: String = row.try_get("source_url")?;
    let category: String = row.try_get("category")?;
    let category = category
        .parse::<Category>()
        .map_err(|e| corrupt(&source_url, e))?;
    let region: Option<String> = row.try_get("region")?;
    let region = match region.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(code) => Some(code.parse::<Region>().map_err(|e| corrupt(&source_url, e))?),
    };
    let approval_status: Option<String> = row.try_get("approval_status")?;
    let approval_status = match approval_status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(code) => Some(
            code.parse::<ApprovalStatus>()
                .map_err(|e| corrupt(&source_url, e))?,
        ),
    };

    Ok(EventRecord {
        title: row.try_get("title")?,
        category,
        location: row.try_get("location")?,
        region,
        start_date: row.try_get::<NaiveDate, _>("start_date")?,
        end_date: row.try_get::<NaiveDate, _>("end_date")?,
        image_url: row.try_get("image_url")?,
        source_url,
        website_url: row.try_get("website_url")?,
        description: row.try_get("description")?,
        organizer: row.try_get("organizer")?,
        price: row.try_get("price")?,
        is_free: row.try_get("is_free")?,
        approval_status,
        crawled_at: row.try_get::<Option<DateTime<Utc>>, _>("crawled_at")?,
    })
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find_by_source_url(
        &self,
        source_url: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE source_url = $1");
        let row = sqlx::query(&sql)
            .bind(source_url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_near_duplicate(
        &self,
        start_date: NaiveDate,
        title_prefix: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        if title_prefix.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE start_date = $1 AND left(title, char_length($2::text)) = $2::text \
             ORDER BY id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(start_date)
            .bind(title_prefix)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn save(&self, record: &EventRecord) -> Result<Option<EventRecord>, StoreError> {
        validate_record(record).map_err(StoreError::Validation)?;
        let sql = format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (source_url) DO UPDATE SET \
               title = EXCLUDED.title, category = EXCLUDED.category, \
               location = EXCLUDED.location, region = EXCLUDED.region, \
               start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date, \
               image_url = EXCLUDED.image_url, website_url = EXCLUDED.website_url, \
               description = EXCLUDED.description, organizer = EXCLUDED.organizer, \
               price = EXCLUDED.price, is_free = EXCLUDED.is_free, \
               approval_status = EXCLUDED.approval_status, crawled_at = EXCLUDED.crawled_at, \
               updated_at = now() \
             WHERE events.approval_status IS DISTINCT FROM 'approved' \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&record.title)
            .bind(record.category.as_str())
            .bind(&record.location)
            .bind(record.region.map(|r| r.as_str()))
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.image_url)
            .bind(&record.source_url)
            .bind(&record.website_url)
            .bind(&record.description)
            .bind(&record.organizer)
            .bind(&record.price)
            .bind(record.is_free)
            .bind(record.approval_status.map(|s| s.as_str()))
            .bind(record.crawled_at)
            .fetch_optional(&self.pool)
            .await?;
        if row.is_none() {
            debug!(source_url = %record.source_url, "write skipped by moderation guard");
        }
        row.as_ref().map(row_to_record).transpose()
    }

    async fn records_missing_region(&self) -> Result<Vec<EventRecord>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE (region IS NULL OR btrim(region) = '') \
               AND approval_status IS DISTINCT FROM 'approved' \
             ORDER BY id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn update_region(&self, source_url: &str, region: Region) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET region = $2, updated_at = now() \
             WHERE source_url = $1 \
               AND approval_status IS DISTINCT FROM 'approved' \
               AND (region IS NULL OR btrim(region) = '' \
                    OR (region = 'nationwide' AND $2::text <> 'nationwide'))",
        )
        .bind(source_url)
        .bind(region.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
