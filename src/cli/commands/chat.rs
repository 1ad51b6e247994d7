//! Interactive chat session.
//!
//! Each input line is either a question or a slash command. Answers stream
//! to the terminal as they are generated; Ctrl-C abandons the answer in
//! flight, and Ctrl-C at the prompt ends the session.

use anyhow::Result;
use clap::Args;
use console::style;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ask::apply_overrides;
use super::ingest::run_ingest;
use crate::cli::context::AppContext;
use crate::cli::output::{Formatter, get_formatter};
use crate::error::{ErrorKind, QueryError, classify};
use crate::models::{Config, Conversation, OutputFormat};
use crate::services::{IngestRequest, RagPipeline, clear_collection};

const HELP: &str = "\
Type a question to get an answer grounded in the ingested documents.

Commands:
  /sources                              Sources of the last answer
  /history                              Messages of this session
  /ingest <dir> [pattern] [collection]  Load documents into a collection
  /clear [collection]                   Delete every record in a collection
  /help                                 Show this help
  /quit                                 End the session

Ctrl-C abandons an answer, ingestion or clear while it is running.";

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Collection to search on the default server (repeatable)
    #[arg(long, short = 'c')]
    pub collection: Vec<String>,

    /// Wait for complete answers instead of streaming them
    #[arg(long)]
    pub no_stream: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Empty,
    Question(String),
    Sources,
    History,
    Ingest {
        directory: PathBuf,
        pattern: Option<String>,
        collection: Option<String>,
    },
    Clear {
        collection: Option<String>,
    },
    Help,
    Quit,
    Usage(&'static str),
    Unknown(String),
}

fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Question(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<String> = parts.map(str::to_string).collect();

    match (name, args.as_slice()) {
        ("sources", []) => ChatInput::Sources,
        ("history", []) => ChatInput::History,
        ("help", _) => ChatInput::Help,
        ("quit" | "exit", []) => ChatInput::Quit,
        ("ingest", [directory, rest @ ..]) if rest.len() <= 2 => ChatInput::Ingest {
            directory: PathBuf::from(directory),
            pattern: rest.first().cloned(),
            collection: rest.get(1).cloned(),
        },
        ("ingest", _) => ChatInput::Usage("/ingest <dir> [pattern] [collection]"),
        ("clear", []) => ChatInput::Clear { collection: None },
        ("clear", [collection]) => ChatInput::Clear {
            collection: Some(collection.clone()),
        },
        ("clear", _) => ChatInput::Usage("/clear [collection]"),
        ("sources" | "history" | "quit" | "exit", _) => {
            ChatInput::Usage("command takes no arguments")
        }
        _ => ChatInput::Unknown(name.to_string()),
    }
}

fn error_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::ServiceUnavailable => {
            Some("Check that Qdrant and Ollama are running (ragchat status).")
        }
        ErrorKind::EmptyInput => Some("Nothing to work with; check the directory and pattern."),
        ErrorKind::DimensionMismatch => {
            Some("The collection was built with another embedding model; ingest it again.")
        }
        ErrorKind::MalformedResponse => {
            Some("The generation endpoint sent something unexpected; try again.")
        }
        ErrorKind::Other => None,
    }
}

/// Run `task` unless `interrupt` completes first, dropping the task then.
async fn until_interrupted<T, I>(task: impl Future<Output = T>, interrupt: I) -> Option<T>
where
    I: Future,
{
    tokio::select! {
        value = task => Some(value),
        _ = interrupt => None,
    }
}

struct ChatSession {
    context: AppContext,
    pipeline: RagPipeline,
    conversation: Conversation,
    formatter: Box<dyn Formatter>,
    format: OutputFormat,
}

impl ChatSession {
    fn report_error(&self, kind: ErrorKind, message: &str) {
        eprint!("{}", self.formatter.format_error(message));
        if let Some(hint) = error_hint(kind) {
            eprintln!("{}", style(hint).dim());
        }
    }

    async fn answer(&mut self, question: &str) {
        let stream_to_stdout = self.format == OutputFormat::Text;
        let mut stdout = std::io::stdout();
        if stream_to_stdout {
            print!("{} ", style("assistant>").green().bold());
            let _ = stdout.flush();
        }

        let answering = self.pipeline.answer(question, |fragment| {
            if stream_to_stdout {
                print!("{fragment}");
                let _ = stdout.flush();
            }
        });
        let result = until_interrupted(answering, tokio::signal::ctrl_c())
            .await
            .unwrap_or(Err(QueryError::Abandoned));

        match result {
            Ok(answer) => {
                if stream_to_stdout {
                    println!("\n");
                } else {
                    print!("{}", self.formatter.format_answer(&answer));
                }
                self.conversation.record(answer);
            }
            Err(QueryError::Abandoned) => {
                println!();
                eprint!("{}", self.formatter.format_message("Answer abandoned."));
            }
            Err(err) => {
                if stream_to_stdout {
                    println!();
                }
                self.report_error(err.kind(), &err.to_string());
            }
        }
    }

    async fn ingest(
        &self,
        directory: PathBuf,
        pattern: Option<String>,
        collection: Option<String>,
    ) {
        let config = &self.context.config;
        let request = IngestRequest {
            directory,
            pattern: pattern.unwrap_or_else(|| config.indexing.file_pattern.clone()),
            collection: collection.unwrap_or_else(|| config.vector_store.collection.clone()),
            append: false,
        };

        let ingesting = run_ingest(&self.context, &request);
        let result = until_interrupted(ingesting, tokio::signal::ctrl_c()).await;

        match result {
            Some(Ok(report)) => print!("{}", self.formatter.format_ingest_report(&report)),
            Some(Err(err)) => self.report_anyhow(&err),
            None => eprint!("{}", self.formatter.format_message("Ingestion interrupted.")),
        }
    }

    async fn clear(&self, collection: Option<String>) {
        let collection =
            collection.unwrap_or_else(|| self.context.config.vector_store.collection.clone());
        let store = match self.context.default_store() {
            Ok(store) => store,
            Err(err) => return self.report_anyhow(&err),
        };
        let clearing = clear_collection(
            store.as_ref(),
            &collection,
            self.context.embedder.dimension(),
        );
        let result = until_interrupted(clearing, tokio::signal::ctrl_c()).await;

        match result {
            Some(Ok(())) => print!(
                "{}",
                self.formatter
                    .format_message(&format!("Collection '{}' has been cleared.", collection))
            ),
            Some(Err(err)) => self.report_anyhow(&err.into()),
            None => eprint!("{}", self.formatter.format_message("Clear interrupted.")),
        }
    }

    fn report_anyhow(&self, err: &anyhow::Error) {
        self.report_error(classify(err), &format!("{err:#}"));
    }
}

pub async fn handle_chat(args: ChatArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?.config;
    apply_overrides(&mut config, &args.collection, args.no_stream);

    let context = AppContext::new(config)?;
    let pipeline = context.rag_pipeline()?;

    if verbose {
        for target in pipeline.targets() {
            eprintln!("Target: {} @ {}", target.collection, target.store.url());
        }
        eprintln!("Model: {}", pipeline.generator().model());
    }

    let mut session = ChatSession {
        context,
        pipeline,
        conversation: Conversation::new(),
        formatter: get_formatter(format),
        format,
    };

    println!(
        "{} Type a question, or /help for commands.",
        style("ragchat").bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style("you>").cyan().bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        // EOF
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Question(question) => session.answer(&question).await,
            ChatInput::Sources => match session.conversation.last_answer() {
                Some(answer) => print!("{}", session.formatter.format_sources(&answer.sources)),
                None => print!("{}", session.formatter.format_message("No answer yet.")),
            },
            ChatInput::History => print!(
                "{}",
                session
                    .formatter
                    .format_history(session.conversation.messages())
            ),
            ChatInput::Ingest {
                directory,
                pattern,
                collection,
            } => session.ingest(directory, pattern, collection).await,
            ChatInput::Clear { collection } => session.clear(collection).await,
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Quit => break,
            ChatInput::Usage(usage) => {
                eprint!("{}", session.formatter.format_error(&format!("usage: {usage}")))
            }
            ChatInput::Unknown(name) => eprint!(
                "{}",
                session
                    .formatter
                    .format_error(&format!("unknown command '/{name}', try /help"))
            ),
        }
    }

    Ok(())
}
