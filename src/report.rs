use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::AnnotatedImage;

static UNSAFE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("total_images is {declared} but {actual} images are listed")]
pub struct InconsistentReport {
    pub declared: usize,
    pub actual: usize,
}

/// Result of one analysis run. `total_images` always equals `images.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReportFields")]
pub struct Report {
    url: String,
    analysis_timestamp: DateTime<Utc>,
    total_images: usize,
    images: Vec<AnnotatedImage>,
}

#[derive(Deserialize)]
struct ReportFields {
    url: String,
    analysis_timestamp: DateTime<Utc>,
    total_images: usize,
    images: Vec<AnnotatedImage>,
}

impl TryFrom<ReportFields> for Report {
    type Error = InconsistentReport;

    fn try_from(fields: ReportFields) -> Result<Self, Self::Error> {
        if fields.total_images != fields.images.len() {
            return Err(InconsistentReport {
                declared: fields.total_images,
                actual: fields.images.len(),
            });
        }
        Ok(Report::new(fields.url, fields.analysis_timestamp, fields.images))
    }
}

impl Report {
    pub fn new(url: String, analysis_timestamp: DateTime<Utc>, images: Vec<AnnotatedImage>) -> Self {
        Self {
            url,
            analysis_timestamp,
            total_images: images.len(),
            images,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn analysis_timestamp(&self) -> DateTime<Utc> {
        self.analysis_timestamp
    }

    pub fn total_images(&self) -> usize {
        self.total_images
    }

    pub fn images(&self) -> &[AnnotatedImage] {
        &self.images
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// `image_analysis_{safe_url}_{YYYYMMDD_HHMMSS}.json`
    pub fn file_name(&self) -> String {
        format!(
            "image_analysis_{}_{}.json",
            safe_url(&self.url),
            self.analysis_timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the report into `dir`, creating it if needed. Returns the file path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), images = self.total_images, "report written");
        Ok(path)
    }
}

fn safe_url(url: &str) -> String {
    let trimmed = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    UNSAFE_FILENAME_RE
        .replace_all(&trimmed.replace('/', "_"), "_")
        .into_owned()
}
