//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::context::AppContext;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{IngestEvent, IngestReport, IngestRequest};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory to load documents from
    #[arg(required = true)]
    pub directory: PathBuf,

    /// Glob relative to the directory, e.g. '**/*.pdf' or '**/*.md'
    #[arg(long, short = 'p')]
    pub pattern: Option<String>,

    /// Target collection (defaults to vector_store.collection)
    #[arg(long, short = 'c')]
    pub collection: Option<String>,

    /// Keep existing records instead of recreating the collection
    #[arg(long)]
    pub append: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);

    let request = IngestRequest {
        directory: args.directory,
        pattern: args
            .pattern
            .unwrap_or_else(|| config.indexing.file_pattern.clone()),
        collection: args
            .collection
            .unwrap_or_else(|| config.vector_store.collection.clone()),
        append: args.append,
    };

    if verbose {
        eprintln!("Ingest: {}", request.directory.display());
        eprintln!("  Pattern: {}", request.pattern);
        eprintln!("  Collection: {}", request.collection);
        eprintln!("  Vector store: {}", config.vector_store.url);
    }

    let context = AppContext::new(config)?;
    let report = run_ingest(&context, &request).await?;

    print!("{}", formatter.format_ingest_report(&report));
    Ok(())
}

/// Run one ingestion with a progress bar on stderr.
pub async fn run_ingest(context: &AppContext, request: &IngestRequest) -> Result<IngestReport> {
    let pipeline = context.ingest_pipeline()?;

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}", request.directory.display()));
    pb.enable_steady_tick(Duration::from_millis(120));
    let bar_style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg} ({eta})",
        )
        .context("invalid progress template")?
        .progress_chars("#>-");

    let result = pipeline
        .ingest(request, |event| match event {
            IngestEvent::Loaded { documents, chunks } => {
                pb.set_message(format!("{documents} documents, {chunks} chunks"));
            }
            IngestEvent::WaitingForStore {
                attempt,
                max_attempts,
            } => {
                pb.println(format!(
                    "Waiting for vector store ({attempt}/{max_attempts})..."
                ));
            }
            IngestEvent::BatchEmbedded { embedded, total } => {
                if pb.length().is_none() {
                    pb.set_style(bar_style.clone());
                    pb.set_length(total as u64);
                    pb.set_message("embedded");
                }
                pb.set_position(embedded as u64);
            }
            IngestEvent::BatchWritten { written, .. } => {
                if pb.message() != "written" {
                    pb.set_message("written");
                    pb.set_position(0);
                }
                pb.set_position(written as u64);
            }
        })
        .await;

    pb.finish_and_clear();
    result.with_context(|| {
        format!(
            "failed to ingest {} into '{}'",
            request.directory.display(),
            request.collection
        )
    })
}
