//! Retrieval hits and answers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::SOURCE_KEY;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// One record returned by a nearest-neighbour search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    /// Raw score as returned by the store; see [`Metric`] for its direction.
    pub score: f32,
    pub collection: String,
}

impl SearchHit {
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map_or("unknown", String::as_str)
    }
}

/// Vector comparison used by a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity, reported in `[-1, 1]`; higher is closer.
    #[default]
    Cosine,
    /// Dot product; higher is closer.
    Dot,
    /// Euclidean distance; lower is closer.
    Euclid,
}

impl Metric {
    /// Whether larger scores mean better matches under this metric.
    pub fn higher_is_better(self) -> bool {
        match self {
            Metric::Cosine | Metric::Dot => true,
            Metric::Euclid => false,
        }
    }

    /// Ordering that puts the better of two scores first.
    pub fn compare(self, a: f32, b: f32) -> std::cmp::Ordering {
        let ord = a.total_cmp(&b);
        if self.higher_is_better() {
            ord.reverse()
        } else {
            ord
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Dot => write!(f, "dot"),
            Metric::Euclid => write!(f, "euclid"),
        }
    }
}

/// Time spent in each step of answering a question.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnswerTimings {
    pub embed_ms: u64,
    pub search_ms: u64,
    pub generate_ms: u64,
}

/// A generated answer plus the chunks it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<SearchHit>,
    pub model: String,
    pub timings: AnswerTimings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_metric_direction() {
        assert_eq!(Metric::Cosine.compare(0.9, 0.2), Ordering::Less);
        assert_eq!(Metric::Dot.compare(0.2, 0.9), Ordering::Greater);
        assert_eq!(Metric::Euclid.compare(0.2, 0.9), Ordering::Less);
        assert_eq!(Metric::Cosine.compare(0.5, 0.5), Ordering::Equal);
    }

    #[test]
    fn test_hit_source_fallback() {
        let hit = SearchHit {
            id: "1".to_string(),
            text: "t".to_string(),
            metadata: BTreeMap::new(),
            score: 0.5,
            collection: "docs".to_string(),
        };
        assert_eq!(hit.source(), "unknown");
    }
}
