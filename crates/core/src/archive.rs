//! Payload archive inspection.
//!
//! Jobs carry their images as a single zip archive. Ingestion counts the
//! images it contains; workers re-open the downloaded copy before sending it to
//! the inference backend so a corrupt upload fails fast instead of costing a
//! GPU slot.

use std::io::Cursor;

use crate::error::CoreError;

/// File extensions counted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp"];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What an archive contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub images: usize,
    pub size_bytes: u64,
}

impl ArchiveSummary {
    /// Archive size in MiB rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
    }
}

fn is_image(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Open `bytes` as a zip archive and count its entries and images.
pub fn inspect_archive(bytes: &[u8]) -> Result<ArchiveSummary, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::InvalidArchive("archive is empty".to_string()));
    }

    let archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CoreError::InvalidArchive(e.to_string()))?;

    let images = archive.file_names().filter(|name| is_image(name)).count();

    Ok(ArchiveSummary {
        entries: archive.len(),
        images,
        size_bytes: bytes.len() as u64,
    })
}
