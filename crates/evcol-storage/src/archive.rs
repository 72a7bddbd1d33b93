//! Raw listing pages kept on disk, one file per distinct body.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Where a listing page came from; decides the directory it lands in.
#[derive(Debug, Clone, Copy)]
pub struct PageOrigin<'a> {
    pub fetched_at: DateTime<Utc>,
    pub source_id: &'a str,
    pub page: u32,
}

impl PageOrigin<'_> {
    /// `<run stamp>/<source id>/page-<n>-<digest>.<ext>`
    fn file_path(&self, digest: &str, extension: &str) -> PathBuf {
        let ext = match extension.trim().trim_start_matches('.') {
            "" => "bin",
            ext => ext,
        };
        let mut path = PathBuf::from(self.fetched_at.format("%Y%m%d_%H%M%S").to_string());
        path.push(self.source_id);
        path.push(format!("page-{}-{digest}.{ext}", self.page));
        path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedPage {
    pub digest: String,
    /// Relative to the archive root.
    pub path: PathBuf,
    pub bytes: usize,
    /// False when an identical body was already on disk.
    pub newly_written: bool,
}

#[derive(Debug, Clone)]
pub struct PageArchive {
    root: PathBuf,
}

impl PageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locate(&self, page: &ArchivedPage) -> PathBuf {
        self.root.join(&page.path)
    }

    pub fn digest(body: &[u8]) -> String {
        hex::encode(Sha256::digest(body))
    }

    /// Archived files are never rewritten: a second identical body for the
    /// same origin resolves to the file already there.
    pub async fn archive(
        &self,
        origin: PageOrigin<'_>,
        extension: &str,
        body: &[u8],
    ) -> anyhow::Result<ArchivedPage> {
        let digest = Self::digest(body);
        let path = origin.file_path(&digest, extension);
        let target = self.root.join(&path);
        let newly_written = publish_once(&target, body)
            .await
            .with_context(|| format!("archiving page to {}", target.display()))?;
        Ok(ArchivedPage {
            digest,
            path,
            bytes: body.len(),
            newly_written,
        })
    }
}

/// Stages the body beside `target`, then hard-links it into place. Linking
/// refuses an existing target, so concurrent writers cannot clobber a page
/// and readers never see a partial one.
async fn publish_once(target: &Path, body: &[u8]) -> io::Result<bool> {
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "archive path has no parent"))?;
    fs::create_dir_all(dir).await?;
    if fs::try_exists(target).await? {
        return Ok(false);
    }

    let staging = dir.join(format!(".{}.part", Uuid::new_v4()));
    let published = match stage(&staging, body).await {
        Ok(()) => match fs::hard_link(&staging, target).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    };
    let _ = fs::remove_file(&staging).await;
    published
}

async fn stage(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(body).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn origin(page: u32) -> PageOrigin<'static> {
        PageOrigin {
            fetched_at: DateTime::parse_from_rfc3339("2025-10-01T03:00:00Z")
                .expect("ts")
                .with_timezone(&Utc),
            source_id: "festival-portal",
            page,
        }
    }

    #[test]
    fn digests_are_sha256_hex() {
        assert_eq!(
            PageArchive::digest(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_pages_resolve_to_one_archived_file() {
        let dir = tempdir().expect("tempdir");
        let archive = PageArchive::new(dir.path());

        let first = archive
            .archive(origin(1), "html", b"<ul>same</ul>")
            .await
            .expect("first write");
        let second = archive
            .archive(origin(1), "html", b"<ul>same</ul>")
            .await
            .expect("second write");

        assert!(first.newly_written);
        assert!(!second.newly_written);
        assert_eq!(first.path, second.path);
        assert!(archive.locate(&first).exists());
        assert!(first.path.starts_with("20251001_030000/festival-portal"));

        let leftovers = std::fs::read_dir(archive.locate(&first).parent().expect("dir"))
            .expect("listing")
            .count();
        assert_eq!(leftovers, 1, "staging files are cleaned up");
    }

    #[tokio::test]
    async fn changed_bodies_get_their_own_file() {
        let dir = tempdir().expect("tempdir");
        let archive = PageArchive::new(dir.path());

        let before = archive
            .archive(origin(2), ".json", b"[1]")
            .await
            .expect("before");
        let after = archive.archive(origin(2), "", b"[2]").await.expect("after");

        assert!(before.newly_written && after.newly_written);
        assert_ne!(before.path, after.path);
        assert!(before.path.to_string_lossy().ends_with(".json"));
        assert!(after.path.to_string_lossy().ends_with(".bin"));
        assert_eq!(
            std::fs::read(archive.locate(&after)).expect("read back"),
            b"[2]"
        );
    }
}
