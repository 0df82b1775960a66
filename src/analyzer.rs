use chrono::Utc;

use crate::classify::AltTextDrafter;
use crate::config::Config;
use crate::models::AnnotatedImage;
use crate::report::Report;
use crate::{extract, fetch, Error};

/// Fetch → extract → classify each image → report.
pub struct Analyzer {
    config: Config,
    http: reqwest::Client,
    drafter: AltTextDrafter,
}

impl Analyzer {
    pub fn new(config: Config) -> Result<Self, Error> {
        let http = fetch::build_client(&config)?;
        let drafter = AltTextDrafter::new(&config)?;
        Ok(Self {
            config,
            http,
            drafter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyze one page. Only fetch and parse failures abort the run; a failed
    /// classification is recorded on the image it belongs to.
    pub async fn analyze(&self, url: &str) -> Result<Report, Error> {
        let target = fetch::validate_url(url)?;
        tracing::info!(url = %target, "fetching page");
        let page = fetch::fetch_page(&self.http, &target).await?;

        let records = extract::extract_page(&page, &self.config.context)?;
        tracing::info!(count = records.len(), "extracted images");

        let total = records.len();
        let mut images = Vec::with_capacity(total);
        for (idx, record) in records.into_iter().enumerate() {
            tracing::debug!(image = idx + 1, total, src = %record.src, "drafting alt text");
            let outcome = self.drafter.draft(&record).await;
            if let Err(e) = &outcome {
                tracing::warn!(src = %record.src, error = %e, "classification failed");
            }
            images.push(AnnotatedImage::from_outcome(record, outcome));
        }

        Ok(Report::new(url.to_string(), Utc::now(), images))
    }
}
