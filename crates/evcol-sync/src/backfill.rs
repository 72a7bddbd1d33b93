use std::sync::Arc;

use evcol_core::RegionClassifier;
use evcol_storage::{should_overwrite_region, EventStore};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub examined: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Maintenance pass that classifies stored records left without a region.
pub struct RegionBackfill {
    store: Arc<dyn EventStore>,
    classifier: Arc<RegionClassifier>,
}

impl RegionBackfill {
    pub fn new(store: Arc<dyn EventStore>, classifier: Arc<RegionClassifier>) -> Self {
        Self { store, classifier }
    }

    pub async fn run(&self) -> BackfillReport {
        let mut report = BackfillReport::default();
        let records = match self.store.records_missing_region().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "listing records without region failed");
                report.errors.push(err.to_string());
                return report;
            }
        };

        for record in records {
            report.examined += 1;
            let computed = self.classifier.classify(&record.location);
            if !should_overwrite_region(record.region, computed) {
                continue;
            }
            match self.store.update_region(&record.source_url, computed).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(title = %record.title, error = %err, "region backfill write failed");
                    report.errors.push(format!("{}: {err}", record.source_url));
                }
            }
        }

        info!(
            examined = report.examined,
            updated = report.updated,
            "region backfill finished"
        );
        report
    }
}
