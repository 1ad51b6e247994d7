use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{clear_collection, open_store};

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Collection to reset (defaults to vector_store.collection)
    #[arg(long, short = 'c')]
    pub collection: Option<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub async fn handle_clear(args: ClearArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let collection = args
        .collection
        .unwrap_or_else(|| config.vector_store.collection.clone());

    if verbose {
        eprintln!(
            "Clearing '{}' on {}",
            collection, config.vector_store.url
        );
    }

    if !args.yes {
        println!(
            "This will delete ALL records in '{}'. Continue? [y/N]",
            collection
        );
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            print!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let store = open_store(&config.vector_store)?;
    clear_collection(
        store.as_ref(),
        &collection,
        config.embedding.dimension as usize,
    )
    .await
    .with_context(|| format!("failed to clear '{}'", collection))?;

    print!(
        "{}",
        formatter.format_message(&format!("Collection '{}' has been cleared.", collection))
    );

    Ok(())
}
