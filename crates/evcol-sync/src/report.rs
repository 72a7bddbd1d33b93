//! Per-run report files: JSON summary, Markdown brief, Parquet ledger.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use evcol_core::{Category, Region};
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::RunSummary;

/// What happened to one candidate during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub source_id: String,
    pub page: u32,
    pub source_url: String,
    pub title: String,
    pub category: Category,
    pub region: Option<Region>,
    pub outcome: String,
    pub warnings: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RunReporter {
    root: PathBuf,
}

impl RunReporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes `<root>/<run_id>/` and returns that directory.
    pub async fn write(&self, summary: &RunSummary, ledger: &[LedgerEntry]) -> Result<PathBuf> {
        let run_dir = self.root.join(summary.run_id.to_string());
        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("creating {}", run_dir.display()))?;

        let summary_json =
            serde_json::to_vec_pretty(summary).context("serializing run summary")?;
        fs::write(run_dir.join("summary.json"), summary_json)
            .await
            .context("writing summary.json")?;

        fs::write(run_dir.join("brief.md"), render_brief(summary))
            .await
            .context("writing brief.md")?;

        let ledger_path = run_dir.join("ledger.parquet");
        write_ledger_parquet(&ledger_path, ledger)?;
        let manifest = ParquetManifest {
            schema_version: 1,
            files: vec![manifest_entry("ledger", &run_dir, &ledger_path)?],
        };
        let manifest_path = run_dir.join("manifest.json");
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
        fs::write(&manifest_path, bytes)
            .await
            .with_context(|| format!("writing {}", manifest_path.display()))?;

        Ok(run_dir)
    }
}

pub fn render_brief(summary: &RunSummary) -> String {
    let mut lines = vec![
        "# Event Collector Run".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- Sources: {}", summary.sources_run),
        format!("- Pages fetched: {}", summary.pages_fetched),
        format!("- Candidates seen: {}", summary.candidates_seen),
        format!(
            "- Created / updated: {} / {}",
            summary.created, summary.updated
        ),
        format!(
            "- Skipped (near duplicate / frozen): {} / {}",
            summary.skipped_duplicates, summary.skipped_frozen
        ),
        format!("- Rejected: {}", summary.rejected),
        format!("- Enriched: {}", summary.enriched),
        format!("- Regions backfilled: {}", summary.backfilled),
        format!("- Warnings: {}", summary.warnings),
        String::new(),
        "## Category Counts".to_string(),
    ];
    if summary.counts_by_category.is_empty() {
        lines.push("- none".to_string());
    }
    for (category, count) in &summary.counts_by_category {
        lines.push(format!("- {category}: {count}"));
    }

    lines.push(String::new());
    lines.push(format!("## Errors ({})", summary.errors.len()));
    for error in &summary.errors {
        let page = error.page.map(|p| format!(" page {p}")).unwrap_or_default();
        let source = error.source_id.as_deref().unwrap_or("-");
        lines.push(format!(
            "- [{}] {source}{page}: {}",
            error.stage.as_str(),
            error.message
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

fn write_ledger_parquet(path: &Path, ledger: &[LedgerEntry]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source_id", DataType::Utf8, false),
        ArrowField::new("page", DataType::UInt32, false),
        ArrowField::new("source_url", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("category", DataType::Utf8, false),
        ArrowField::new("region", DataType::Utf8, true),
        ArrowField::new("outcome", DataType::Utf8, false),
        ArrowField::new("warnings", DataType::UInt64, false),
    ]));

    let source_ids = StringArray::from(
        ledger
            .iter()
            .map(|e| Some(e.source_id.as_str()))
            .collect::<Vec<_>>(),
    );
    let pages = UInt32Array::from(ledger.iter().map(|e| e.page).collect::<Vec<_>>());
    let source_urls = StringArray::from(
        ledger
            .iter()
            .map(|e| Some(e.source_url.as_str()))
            .collect::<Vec<_>>(),
    );
    let titles = StringArray::from(
        ledger
            .iter()
            .map(|e| Some(e.title.as_str()))
            .collect::<Vec<_>>(),
    );
    let categories = StringArray::from(
        ledger
            .iter()
            .map(|e| Some(e.category.as_str()))
            .collect::<Vec<_>>(),
    );
    let regions = StringArray::from(
        ledger
            .iter()
            .map(|e| e.region.map(|r| r.as_str()))
            .collect::<Vec<_>>(),
    );
    let outcomes = StringArray::from(
        ledger
            .iter()
            .map(|e| Some(e.outcome.as_str()))
            .collect::<Vec<_>>(),
    );
    let warnings = UInt64Array::from(ledger.iter().map(|e| e.warnings).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(source_ids),
            Arc::new(pages),
            Arc::new(source_urls),
            Arc::new(titles),
            Arc::new(categories),
            Arc::new(regions),
            Arc::new(outcomes),
            Arc::new(warnings),
        ],
    )
    .context("building ledger record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, run_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    let rel = path
        .strip_prefix(run_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
