//! Draft WCAG 2.1 alt text for the images on a web page.
//!
//! The page is fetched, every `<img>` is extracted together with the text
//! around it, and each image is sent to the Anthropic Messages API, which
//! classifies it as decorative, functional or informative and proposes alt
//! text. Results are collected into a [`Report`] that serializes to JSON.

pub mod analyzer;
pub mod classify;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod report;

pub use analyzer::Analyzer;
pub use classify::{AltTextDrafter, ClassificationError};
pub use config::{Config, ConfigError};
pub use extract::{ContextWindow, ParseError};
pub use fetch::FetchError;
pub use models::{AnnotatedImage, ClassificationResult, ImageRecord, ImageRole, Role};
pub use report::{Report, ReportError};

/// Errors that abort an analysis run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to fetch page: {0}")]
    Fetch(#[from] FetchError),
    #[error("failed to parse page: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to set up the alt-text client: {0}")]
    Classifier(#[from] ClassificationError),
}
