use std::sync::Arc;

use anyhow::{Context, Result};
use evcol_adapters::{DetailFields, SourceAdapter};
use evcol_core::EventRecord;
use evcol_storage::{EventStore, PageFetcher};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

/// Fields a detail page added to a stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailUpdate {
    pub website_url: Option<String>,
    pub description: Option<String>,
}

impl DetailUpdate {
    pub fn is_empty(&self) -> bool {
        self.website_url.is_none() && self.description.is_none()
    }
}

/// A record is worth a detail fetch while it has no site link or only a
/// thin description.
pub fn needs_enrichment(record: &EventRecord, min_description_len: usize) -> bool {
    record.website_url.is_none() || record.description_len() < min_description_len
}

/// Merges scraped detail fields into `record`. The description is only
/// replaced when the stored one is missing or below the threshold.
pub fn apply_detail_update(
    record: &mut EventRecord,
    fields: DetailFields,
    min_description_len: usize,
) -> DetailUpdate {
    let mut update = DetailUpdate::default();

    if let Some(url) = fields.website_url {
        if record.website_url.as_deref() != Some(url.as_str()) {
            record.website_url = Some(url.clone());
            update.website_url = Some(url);
        }
    }

    if let Some(text) = fields.description {
        if record.description_len() < min_description_len
            && text.chars().count() > record.description_len()
        {
            record.description = Some(text.clone());
            update.description = Some(text);
        }
    }

    update
}

pub struct DetailEnricher {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn EventStore>,
    write_gate: Arc<Mutex<()>>,
    min_description_len: usize,
}

impl DetailEnricher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn EventStore>,
        write_gate: Arc<Mutex<()>>,
        min_description_len: usize,
    ) -> Self {
        Self {
            fetcher,
            store,
            write_gate,
            min_description_len,
        }
    }

    pub fn min_description_len(&self) -> usize {
        self.min_description_len
    }

    /// One fetch of the record's own page. The merge is applied to the row as
    /// stored at write time, under the upsert gate, not to `record`.
    /// `Ok(None)` means nothing new was found or the row is gone or frozen.
    pub async fn enrich(
        &self,
        adapter: &dyn SourceAdapter,
        record: &EventRecord,
    ) -> Result<Option<DetailUpdate>> {
        let request = adapter.detail_request(&record.source_url);
        let span = info_span!("enrich", source_id = adapter.source_id(), url = %record.source_url);
        let response = self
            .fetcher
            .fetch(adapter.source_id(), &request)
            .instrument(span)
            .await
            .with_context(|| format!("fetching detail page {}", record.source_url))?;

        let fields = adapter
            .parse_detail(&response.text(), self.min_description_len)
            .with_context(|| format!("parsing detail page {}", record.source_url))?;

        let _gate = self.write_gate.lock().await;
        let Some(mut enriched) = self
            .store
            .find_by_source_url(&record.source_url)
            .await
            .with_context(|| format!("reloading {}", record.source_url))?
        else {
            return Ok(None);
        };
        if enriched.is_frozen() {
            debug!(title = %record.title, "approved before enrichment; left untouched");
            return Ok(None);
        }
        let update = apply_detail_update(&mut enriched, fields, self.min_description_len);
        if update.is_empty() {
            debug!(title = %record.title, "detail page added nothing");
            return Ok(None);
        }

        let saved = self
            .store
            .save(&enriched)
            .await
            .with_context(|| format!("saving enrichment for {}", record.source_url))?;
        Ok(saved.map(|_| update))
    }
}
