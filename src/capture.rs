use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::VisResult;
use crate::render::draw::Surface;

/// One captured frame. Never modified after creation.
#[derive(Debug)]
pub struct CaptureRecord {
    png: Vec<u8>,
    created_at: SystemTime,
}

impl CaptureRecord {
    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn file_name(&self) -> String {
        let millis = self
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("audio-visualization-{}.png", millis)
    }
}

/// Captures in the order they were taken, optionally mirrored to a directory.
#[derive(Debug, Default)]
pub struct CaptureGallery {
    records: Vec<CaptureRecord>,
    dir: Option<PathBuf>,
}

impl CaptureGallery {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            records: Vec::new(),
            dir,
        }
    }

    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    /// Encode the surface's current frame and append it. A blank surface
    /// still yields a valid image.
    pub fn capture(&mut self, surface: &impl Surface) -> VisResult<&CaptureRecord> {
        let record = CaptureRecord {
            png: surface.export_frame()?,
            created_at: SystemTime::now(),
        };

        if let Some(dir) = self.dir.as_deref() {
            match save(dir, &record, self.records.len()) {
                Ok(path) => log::info!("Saved capture to {}", path.display()),
                Err(e) => log::error!("Failed to save capture: {}", e),
            }
        }

        self.records.push(record);
        log::info!("Captured frame #{}", self.records.len());
        Ok(&self.records[self.records.len() - 1])
    }
}

fn save(dir: &Path, record: &CaptureRecord, index: usize) -> VisResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut path = dir.join(record.file_name());
    if path.exists() {
        let stem = record.file_name().trim_end_matches(".png").to_string();
        path = dir.join(format!("{}-{}.png", stem, index));
    }
    std::fs::write(&path, record.png())?;
    Ok(path)
}
