//! CLI module for ragchat.

pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Chat with your documents: answers grounded in a local vector store.
#[derive(Debug, Parser)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat(commands::ChatArgs),

    /// Answer a single question and exit
    Ask(commands::AskArgs),

    /// Load a directory of documents into a collection
    Ingest(commands::IngestArgs),

    /// Delete every record in a collection
    Clear(commands::ClearArgs),

    /// Check infrastructure status (Qdrant, Ollama)
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_collections() {
        let cli = Cli::try_parse_from([
            "ragchat",
            "ask",
            "-c",
            "datenbank_eins",
            "-c",
            "datenbank_zwei",
            "Wer",
            "ist",
            "zuständig?",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask(args) => {
                assert_eq!(args.question.join(" "), "Wer ist zuständig?");
                assert_eq!(args.collection.len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ragchat", "status", "-f", "json", "-v"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.verbose);
    }

    #[test]
    fn test_ingest_requires_directory() {
        assert!(Cli::try_parse_from(["ragchat", "ingest"]).is_err());
        let cli = Cli::try_parse_from(["ragchat", "ingest", "./docs", "--append"]).unwrap();
        assert!(matches!(cli.command, Commands::Ingest(ref a) if a.append));
    }
}
