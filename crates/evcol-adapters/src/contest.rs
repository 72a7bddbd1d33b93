//! Contest board whose list endpoint answers with a delimited payload that
//! wraps the listing table between metadata segments.

use std::sync::Arc;

use async_trait::async_trait;
use evcol_core::{Category, EventCandidate, RegionClassifier};
use evcol_storage::{FetchRequest, PageFetcher};
use scraper::Html;
use tracing::debug;

use crate::dates::{apply_date_range, parse_date_range};
use crate::{
    absolute_url, assign_region, first_attr, first_text, listing_url_for_page,
    required_listing_url, selector, AdapterContext, AdapterError, ListingPage, ParsedListing,
    SourceAdapter, SourceConfig, SourceKind,
};

pub const DEFAULT_PAYLOAD_DELIMITER: &str = "|||";
pub const DEFAULT_HTML_SEGMENT: usize = 1;

const ROW: &str = "tr.contest-row";
const SUBJECT: &str = "td.subject a";
const HOST: &str = "td.host";
const PERIOD: &str = "td.period";
const PRIZE: &str = "td.prize";
const AREA: &str = "td.area";

#[derive(Debug, Clone)]
pub struct ContestBoardAdapter {
    source_id: String,
    category: Category,
    listing_url: String,
    referer: Option<String>,
    delimiter: String,
    html_segment: usize,
    classifier: Arc<RegionClassifier>,
}

impl ContestBoardAdapter {
    pub fn from_config(
        config: &SourceConfig,
        classifier: Arc<RegionClassifier>,
    ) -> Result<Self, AdapterError> {
        let delimiter = config
            .payload_delimiter
            .clone()
            .unwrap_or_else(|| DEFAULT_PAYLOAD_DELIMITER.to_string());
        if delimiter.is_empty() {
            return Err(AdapterError::Config(format!(
                "source {} has an empty payload_delimiter",
                config.source_id
            )));
        }
        Ok(Self {
            source_id: config.source_id.clone(),
            category: config.category,
            listing_url: required_listing_url(config)?,
            referer: config.referer.clone(),
            delimiter,
            html_segment: config.html_segment.unwrap_or(DEFAULT_HTML_SEGMENT),
            classifier,
        })
    }

    /// Returns the markup segment of a hybrid payload.
    pub fn html_segment<'a>(&self, payload: &'a str) -> Result<&'a str, AdapterError> {
        payload
            .split(self.delimiter.as_str())
            .nth(self.html_segment)
            .ok_or_else(|| {
                AdapterError::Parse(format!(
                    "payload has no segment {} after splitting on `{}`",
                    self.html_segment, self.delimiter
                ))
            })
    }

    pub fn parse_payload(
        &self,
        payload: &str,
        base_url: &str,
        ctx: &AdapterContext,
    ) -> Result<ParsedListing, AdapterError> {
        let document = Html::parse_document(self.html_segment(payload)?);
        let row_sel = selector(ROW)?;
        let subject_sel = selector(SUBJECT)?;
        let host_sel = selector(HOST)?;
        let period_sel = selector(PERIOD)?;
        let prize_sel = selector(PRIZE)?;
        let area_sel = selector(AREA)?;

        let mut parsed = ParsedListing::default();
        for row in document.select(&row_sel) {
            parsed.listings_seen += 1;

            let (Some(title), Some(source_url)) = (
                first_text(&row, &subject_sel),
                absolute_url(base_url, first_attr(&row, &subject_sel, "href")),
            ) else {
                debug!(source_id = %self.source_id, "contest row missing subject link");
                continue;
            };

            let raw_period = first_text(&row, &period_sel).unwrap_or_default();
            let mut candidate =
                EventCandidate::new(&self.source_id, self.category, title, source_url, ctx.today);
            apply_date_range(
                &mut candidate,
                &raw_period,
                parse_date_range(&raw_period, ctx.today),
            );
            candidate.organizer = first_text(&row, &host_sel);
            candidate.description = first_text(&row, &prize_sel);
            candidate.location = first_text(&row, &area_sel).unwrap_or_default();
            assign_region(&mut candidate, None, &self.classifier);
            parsed.candidates.push(candidate);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl SourceAdapter for ContestBoardAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ContestHybrid
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch_page(
        &self,
        fetcher: &dyn PageFetcher,
        ctx: &AdapterContext,
        page: u32,
    ) -> Result<ListingPage, AdapterError> {
        let request = FetchRequest::get(listing_url_for_page(&self.listing_url, page))
            .with_referer(self.referer.clone());
        let response = fetcher.fetch(&self.source_id, &request).await?;
        let parsed = self.parse_payload(&response.text(), &response.final_url, ctx)?;
        Ok(ListingPage::from_response(page, parsed, response))
    }
}
