use serde::Serialize;
use std::fmt::Write as FmtWrite;

use crate::models::{Answer, Message, OutputFormat, Role, SearchHit};
use crate::services::IngestReport;
use crate::utils::preview;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_answer(&self, answer: &Answer) -> String;
    fn format_sources(&self, sources: &[SearchHit]) -> String;
    fn format_ingest_report(&self, report: &IngestReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_history(&self, messages: &[Message]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub generation: GenerationStatus,
    pub stores: Vec<StoreStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationStatus {
    pub url: String,
    pub model: String,
    pub reachable: bool,
    pub model_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub driver: String,
    pub url: String,
    pub connected: bool,
    pub collections: Vec<CollectionStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub exists: bool,
    pub points: u64,
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        let mut output = String::new();
        writeln!(output, "{}", answer.text.trim_end()).unwrap();
        writeln!(output).unwrap();
        output.push_str(&self.format_sources(&answer.sources));
        output
    }

    fn format_sources(&self, sources: &[SearchHit]) -> String {
        if sources.is_empty() {
            return "No sources.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Sources").unwrap();
        writeln!(output, "-------").unwrap();
        for (i, hit) in sources.iter().enumerate() {
            writeln!(
                output,
                "{}. {} [{} | score {:.3}]",
                i + 1,
                hit.source(),
                hit.collection,
                hit.score
            )
            .unwrap();
            for line in preview(&hit.text, PREVIEW_CHARS).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
        }
        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        writeln!(output, "Collection:       {}", report.collection).unwrap();
        writeln!(output, "Directory:        {}", report.directory).unwrap();
        writeln!(output, "Pattern:          {}", report.pattern).unwrap();
        writeln!(output, "Files matched:    {}", report.files_matched).unwrap();
        writeln!(output, "Documents loaded: {}", report.documents_loaded).unwrap();
        writeln!(output, "Files skipped:    {}", report.files_skipped).unwrap();
        writeln!(output, "Chunks written:   {}", report.chunks_written).unwrap();
        writeln!(output, "Duration:         {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        writeln!(
            output,
            "Embedding:     {} ({}, {} dims)",
            status.embedding_model, status.embedding_provider, status.embedding_dimension
        )
        .unwrap();

        let generation = &status.generation;
        let state = match (generation.reachable, generation.model_available) {
            (true, true) => "[READY]",
            (true, false) => "[MODEL MISSING]",
            (false, _) => "[UNREACHABLE]",
        };
        writeln!(output, "Generation:    {} {}", generation.model, state).unwrap();
        writeln!(output, "  URL:         {}", generation.url).unwrap();

        for store in &status.stores {
            let state = if store.connected {
                "[CONNECTED]"
            } else {
                "[DISCONNECTED]"
            };
            writeln!(output).unwrap();
            writeln!(output, "Vector Store:  {} ({})", store.driver, state).unwrap();
            writeln!(output, "  URL:         {}", store.url).unwrap();
            if store.connected {
                for collection in &store.collections {
                    if collection.exists {
                        writeln!(
                            output,
                            "  Collection:  {} ({} points)",
                            collection.name, collection.points
                        )
                        .unwrap();
                    } else {
                        writeln!(output, "  Collection:  {} (missing)", collection.name).unwrap();
                    }
                }
            }
        }

        output
    }

    fn format_history(&self, messages: &[Message]) -> String {
        if messages.is_empty() {
            return "No messages yet.\n".to_string();
        }

        let mut output = String::new();
        for message in messages {
            writeln!(output, "{}: {}", role_label(message.role), message.content.trim_end())
                .unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut output = rendered
            .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        self.render(answer)
    }

    fn format_sources(&self, sources: &[SearchHit]) -> String {
        self.render(&serde_json::json!({"sources": sources}))
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        self.render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_history(&self, messages: &[Message]) -> String {
        self.render(&serde_json::json!({"messages": messages}))
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        let mut output = String::new();
        writeln!(output, "## Answer\n").unwrap();
        writeln!(output, "**Question:** {}\n", answer.question).unwrap();
        writeln!(output, "{}\n", answer.text.trim_end()).unwrap();
        output.push_str(&self.format_sources(&answer.sources));
        output
    }

    fn format_sources(&self, sources: &[SearchHit]) -> String {
        if sources.is_empty() {
            return "### Sources\n\n*No sources.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "### Sources\n").unwrap();
        for (i, hit) in sources.iter().enumerate() {
            writeln!(
                output,
                "{}. `{}` ({}, score {:.3})",
                i + 1,
                hit.source(),
                hit.collection,
                hit.score
            )
            .unwrap();
            for line in preview(&hit.text, PREVIEW_CHARS).lines() {
                writeln!(output, "   > {}", line).unwrap();
            }
        }
        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Ingestion Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Collection | `{}` |", report.collection).unwrap();
        writeln!(output, "| Directory | `{}` |", report.directory).unwrap();
        writeln!(output, "| Pattern | `{}` |", report.pattern).unwrap();
        writeln!(output, "| Files matched | {} |", report.files_matched).unwrap();
        writeln!(output, "| Documents loaded | {} |", report.documents_loaded).unwrap();
        writeln!(output, "| Files skipped | {} |", report.files_skipped).unwrap();
        writeln!(output, "| Chunks written | {} |", report.chunks_written).unwrap();
        writeln!(output, "| Duration | {}ms |", report.duration_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        writeln!(output, "### Embedding\n").unwrap();
        writeln!(output, "- **Provider:** {}", status.embedding_provider).unwrap();
        writeln!(output, "- **Model:** {}", status.embedding_model).unwrap();
        writeln!(output, "- **Dimension:** {}\n", status.embedding_dimension).unwrap();

        let generation = &status.generation;
        let icon = if generation.reachable && generation.model_available {
            "✅"
        } else {
            "❌"
        };
        writeln!(output, "### Generation {}\n", icon).unwrap();
        writeln!(output, "- **URL:** `{}`", generation.url).unwrap();
        writeln!(output, "- **Model:** {}", generation.model).unwrap();
        writeln!(output, "- **Model available:** {}\n", generation.model_available).unwrap();

        for store in &status.stores {
            let icon = if store.connected { "✅" } else { "❌" };
            writeln!(output, "### Vector Store ({}) {}\n", store.driver, icon).unwrap();
            writeln!(output, "- **URL:** `{}`", store.url).unwrap();
            for collection in &store.collections {
                if collection.exists {
                    writeln!(
                        output,
                        "- **Collection:** `{}` ({} points)",
                        collection.name, collection.points
                    )
                    .unwrap();
                } else {
                    writeln!(output, "- **Collection:** `{}` (missing)", collection.name).unwrap();
                }
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_history(&self, messages: &[Message]) -> String {
        if messages.is_empty() {
            return "*No messages yet.*\n".to_string();
        }

        let mut output = String::new();
        for message in messages {
            writeln!(output, "**{}:** {}\n", role_label(message.role), message.content.trim_end())
                .unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerTimings, SOURCE_KEY};
    use std::collections::BTreeMap;

    fn answer() -> Answer {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), "/app/data/db1/urlaub.txt".to_string());
        Answer {
            question: "Wie beantrage ich Urlaub?".to_string(),
            text: "Über das Personalportal.".to_string(),
            sources: vec![SearchHit {
                id: "1".to_string(),
                text: "Urlaubsanträge werden im Personalportal gestellt.".to_string(),
                metadata,
                score: 0.8123,
                collection: "datenbank_eins".to_string(),
            }],
            model: "llama3.1".to_string(),
            timings: AnswerTimings::default(),
        }
    }

    #[test]
    fn test_text_answer_lists_sources() {
        let output = TextFormatter.format_answer(&answer());
        assert!(output.starts_with("Über das Personalportal.\n"));
        assert!(output.contains("1. /app/data/db1/urlaub.txt [datenbank_eins | score 0.812]"));
    }

    #[test]
    fn test_json_answer_round_trips_fields() {
        let output = JsonFormatter::new(false).format_answer(&answer());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["model"], "llama3.1");
        assert_eq!(value["sources"][0]["metadata"]["source"], "/app/data/db1/urlaub.txt");
    }

    #[test]
    fn test_markdown_empty_sources() {
        assert!(MarkdownFormatter.format_sources(&[]).contains("No sources"));
    }

    #[test]
    fn test_history_labels() {
        let messages = vec![
            Message {
                role: Role::User,
                content: "Hallo".to_string(),
            },
            Message {
                role: Role::Assistant,
                content: "Guten Tag".to_string(),
            },
        ];
        assert_eq!(
            TextFormatter.format_history(&messages),
            "You: Hallo\nAssistant: Guten Tag\n"
        );
    }
}
