//! Packaging the whole store into a single zip archive.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::CollectorError;
use crate::sample::{epoch_millis, Sample};
use crate::store::SampleStore;

/// Folder every sample file is placed under inside the archive.
pub const ARCHIVE_FOLDER: &str = "dataset/";

/// `gesture_dataset_<exportEpochMs>.zip`
pub fn archive_file_name(exported_at: u64) -> String {
    format!("gesture_dataset_{exported_at}.zip")
}

/// A finished archive on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedArchive {
    pub path: PathBuf,
    pub file_name: String,
    pub sample_count: usize,
    pub exported_at: u64,
}

/// Reads every stored sample and writes one archive containing one JSON file per sample.
#[derive(Debug, Clone)]
pub struct ArchiveExporter {
    store: SampleStore,
    out_dir: PathBuf,
}

impl ArchiveExporter {
    pub fn new(store: SampleStore, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Builds and writes the archive.
    ///
    /// `progress` receives the completed fraction after each entry. The archive is either
    /// fully written under its final name or not written at all. Samples appended while
    /// the export runs may or may not be included.
    #[instrument(skip(self, progress), fields(out_dir = %self.out_dir.display()))]
    pub async fn export<F>(&self, progress: F) -> Result<ExportedArchive, CollectorError>
    where
        F: FnMut(f32) + Send + 'static,
    {
        let samples = self.store.all()?;
        if samples.is_empty() {
            warn!("export requested on an empty store");
            return Err(CollectorError::EmptyDataset);
        }

        let sample_count = samples.len();
        let exported_at = epoch_millis();
        let file_name = archive_file_name(exported_at);

        let bytes = tokio::task::spawn_blocking(move || build_archive(&samples, progress))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        tokio::fs::create_dir_all(&self.out_dir).await?;
        let path = self.out_dir.join(&file_name);
        let partial = self.out_dir.join(format!(".{file_name}.partial"));
        if let Err(err) = write_then_rename(&partial, &path, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }

        info!(file = %file_name, samples = sample_count, bytes = bytes.len(), "dataset exported");
        Ok(ExportedArchive {
            path,
            file_name,
            sample_count,
            exported_at,
        })
    }
}

async fn write_then_rename(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, bytes).await?;
    tokio::fs::rename(partial, path).await
}

/// Serializes `samples` into an in-memory zip, one `dataset/<filename>` entry each.
pub fn build_archive<F>(samples: &[Sample], mut progress: F) -> Result<Vec<u8>, CollectorError>
where
    F: FnMut(f32),
{
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let total = samples.len();

    for (i, sample) in samples.iter().enumerate() {
        zip.start_file(format!("{ARCHIVE_FOLDER}{}", sample.filename), options)?;
        zip.write_all(&serde_json::to_vec(sample)?)?;
        progress((i + 1) as f32 / total as f32);
    }

    Ok(zip.finish()?.into_inner())
}
