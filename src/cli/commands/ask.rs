use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;

use crate::cli::context::AppContext;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, TargetConfig};

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question to answer; several words need no quoting
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Collection to search on the default server (repeatable)
    #[arg(long, short = 'c')]
    pub collection: Vec<String>,

    /// Wait for the complete answer instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

/// Apply per-invocation retrieval overrides to a loaded config.
pub(crate) fn apply_overrides(config: &mut Config, collections: &[String], no_stream: bool) {
    if !collections.is_empty() {
        config.retrieval.targets = collections
            .iter()
            .map(|collection| TargetConfig {
                collection: collection.clone(),
                url: None,
            })
            .collect();
    }
    if no_stream {
        config.generation.stream = false;
    }
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let question = args.question.join(" ");
    let mut config = Config::load()?.config;
    apply_overrides(&mut config, &args.collection, args.no_stream);
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Question: \"{}\"", question.trim());
        for target in config.retrieval.resolved_targets(&config.vector_store) {
            eprintln!("  Target: {} @ {}", target.collection, target.url);
        }
        eprintln!("  Model: {}", config.generation.model);
    }

    let context = AppContext::new(config)?;
    let pipeline = context.rag_pipeline()?;

    // Plain text streams to the terminal; structured formats print once at the end
    let stream_to_stdout = format == OutputFormat::Text;
    let mut stdout = std::io::stdout();
    let answer = pipeline
        .answer(&question, |fragment| {
            if stream_to_stdout {
                print!("{fragment}");
                let _ = stdout.flush();
            }
        })
        .await
        .context("failed to answer question")?;

    if stream_to_stdout {
        println!("\n");
        print!("{}", formatter.format_sources(&answer.sources));
    } else {
        print!("{}", formatter.format_answer(&answer));
    }

    if verbose {
        eprintln!();
        eprintln!("Timing:");
        eprintln!("  Embedding: {}ms", answer.timings.embed_ms);
        eprintln!("  Search: {}ms", answer.timings.search_ms);
        eprintln!("  Generation: {}ms", answer.timings.generate_ms);
    }

    Ok(())
}
