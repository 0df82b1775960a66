use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use wcag_alt_text::config::{DEFAULT_MAX_RETRIES, DEFAULT_MODEL};
use wcag_alt_text::extract::{DEFAULT_CONTEXT_CHARS, DEFAULT_CONTEXT_NODES};
use wcag_alt_text::{Analyzer, Config, Report};

#[derive(Debug, Parser)]
#[command(
    name = "wcag-alt-text",
    version,
    about = "Draft WCAG 2.1 alt text for every image on a web page"
)]
struct Cli {
    /// Page to analyze (http or https).
    url: String,

    /// Directory the JSON report is written to.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, env = "ALT_TEXT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Characters of surrounding text gathered on each side of an image.
    #[arg(long, default_value_t = DEFAULT_CONTEXT_CHARS)]
    context_chars: usize,

    /// Text nodes examined on each side of an image.
    #[arg(long, default_value_t = DEFAULT_CONTEXT_NODES)]
    context_nodes: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Don't print the per-image summary.
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("loading configuration")?;
    config.model = cli.model;
    config.max_retries = cli.max_retries;
    config.context.max_chars = cli.context_chars;
    config.context.max_nodes = cli.context_nodes;
    tracing::debug!(?config, "configuration loaded");

    let analyzer = Analyzer::new(config)?;
    let report = analyzer
        .analyze(&cli.url)
        .await
        .with_context(|| format!("analyzing {}", cli.url))?;

    let path = report
        .write_to_dir(&cli.output_dir)
        .with_context(|| format!("writing report to {}", cli.output_dir.display()))?;

    if !cli.quiet {
        print_summary(&report, &path);
    }
    Ok(())
}

fn print_summary(report: &Report, path: &Path) {
    println!("Found {} images on {}", report.total_images(), report.url());
    println!("Results saved to: {}", path.display());

    for (i, img) in report.images().iter().enumerate() {
        println!();
        println!("Image #{}:", i + 1);
        println!("Source: {}", img.src);
        println!("Current alt text: {}", img.existing_alt.as_deref().unwrap_or("(missing)"));
        match (&img.suggested_alt, &img.error) {
            (Some(alt), _) => println!("Suggested alt text: {:?}", alt),
            (None, Some(err)) => println!("Suggested alt text: unavailable ({})", err),
            (None, None) => println!("Suggested alt text: unavailable"),
        }
        if let Some(title) = &img.title {
            println!("Title: {}", title);
        }
        if let Some(caption) = &img.caption {
            println!("Caption: {}", caption);
        }
        println!("Role: {}", img.role);
        println!("{}", "-".repeat(50));
    }
}
