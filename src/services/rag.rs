//! Retrieval-augmented answering.
//!
//! A question is embedded once, searched against every target collection
//! concurrently, the hits are merged into a single best-first list and the
//! grounding prompt built from them is sent to the generation provider.

use futures::StreamExt;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::QueryError;
use crate::models::{Answer, AnswerTimings, Metric, RetrievalConfig, SearchHit};
use crate::services::{EmbeddingProvider, GenerationProvider, VectorStore};

pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

const DEFAULT_TEMPLATE: &str = "\
Use only the following context to answer the question at the end. \
If the context does not contain the answer, say that you don't know; \
do not make up an answer.

{context}

Question: {question}
Helpful answer:";

/// A collection to search and the store that holds it.
#[derive(Clone)]
pub struct RetrievalTarget {
    pub store: Arc<dyn VectorStore>,
    pub collection: String,
}

impl std::fmt::Debug for RetrievalTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalTarget")
            .field("url", &self.store.url())
            .field("collection", &self.collection)
            .finish()
    }
}

pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    targets: Vec<RetrievalTarget>,
    top_k: u64,
    merge_limit: usize,
    prompt_template: String,
}

/// Hits for a question, before generation.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub hits: Vec<SearchHit>,
    pub embed_ms: u64,
    pub search_ms: u64,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        targets: Vec<RetrievalTarget>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            targets,
            top_k: u64::from(config.top_k.max(1)),
            merge_limit: config.merge_limit.max(1) as usize,
            prompt_template: config
                .prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn targets(&self) -> &[RetrievalTarget] {
        &self.targets
    }

    pub fn generator(&self) -> &dyn GenerationProvider {
        self.generator.as_ref()
    }

    /// Embed the question and collect the best hits across all targets.
    pub async fn retrieve(&self, question: &str) -> Result<Retrieval, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        if self.targets.is_empty() {
            return Err(QueryError::NoTargets);
        }

        let start = Instant::now();
        let vector = self.embedder.embed(question).await?;
        let embed_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let searches = self.targets.iter().map(|target| {
            target
                .store
                .search(&target.collection, &vector, self.top_k)
        });
        let hits = if self.targets.len() == 1 {
            try_join_all(searches).await?.into_iter().flatten().collect()
        } else {
            let metric = self.merge_metric().await?;
            let results = try_join_all(searches).await?;
            merge_hits(results, self.merge_limit, metric)
        };
        let search_ms = start.elapsed().as_millis() as u64;

        debug!(hits = hits.len(), embed_ms, search_ms, "retrieved context");

        Ok(Retrieval {
            hits,
            embed_ms,
            search_ms,
        })
    }

    /// The metric the targets report for their collections.
    ///
    /// Targets whose collection does not exist are ignored; when none is
    /// known, cosine is assumed. Mixing similarity and distance collections
    /// is rejected since their scores cannot be ranked together.
    async fn merge_metric(&self) -> Result<Metric, QueryError> {
        let infos = try_join_all(
            self.targets
                .iter()
                .map(|target| target.store.collection_info(&target.collection)),
        )
        .await?;

        let mut reported = self
            .targets
            .iter()
            .zip(infos)
            .filter_map(|(target, info)| info.map(|info| (target, info.metric)));
        let Some((first, metric)) = reported.next() else {
            return Ok(Metric::Cosine);
        };
        if let Some((second, other)) =
            reported.find(|(_, other)| other.higher_is_better() != metric.higher_is_better())
        {
            return Err(QueryError::MixedMetrics {
                first: first.collection.clone(),
                first_metric: metric,
                second: second.collection.clone(),
                second_metric: other,
            });
        }

        debug!(%metric, "merging by collection metric");
        Ok(metric)
    }

    /// Answer a question, passing each generated fragment to `on_fragment`
    /// as it arrives.
    pub async fn answer(
        &self,
        question: &str,
        mut on_fragment: impl FnMut(&str),
    ) -> Result<Answer, QueryError> {
        let retrieval = self.retrieve(question).await?;
        let prompt = build_prompt(&self.prompt_template, &retrieval.hits, question.trim());

        let start = Instant::now();
        let text = if self.generator.supports_streaming() {
            let mut stream = self.generator.generate_stream(&prompt).await?;
            let mut text = String::new();
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                on_fragment(&fragment);
                text.push_str(&fragment);
            }
            text
        } else {
            let text = self.generator.generate(&prompt).await?;
            on_fragment(&text);
            text
        };
        let generate_ms = start.elapsed().as_millis() as u64;

        info!(
            model = self.generator.model(),
            sources = retrieval.hits.len(),
            generate_ms,
            "answered question"
        );

        Ok(Answer {
            question: question.trim().to_string(),
            text,
            sources: retrieval.hits,
            model: self.generator.model().to_string(),
            timings: AnswerTimings {
                embed_ms: retrieval.embed_ms,
                search_ms: retrieval.search_ms,
                generate_ms,
            },
        })
    }
}

/// Merge per-collection results and keep the best `limit` under `metric`.
///
/// Equal scores keep the order in which the results were supplied.
pub fn merge_hits(results: Vec<Vec<SearchHit>>, limit: usize, metric: Metric) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = results.into_iter().flatten().collect();
    hits.sort_by(|a, b| metric.compare(a.score, b.score));
    hits.truncate(limit);
    hits
}

/// Fill the template with the hit texts and the question.
///
/// Placeholders are substituted in one pass over the template, so braces in
/// retrieved text or in the question are never expanded.
pub fn build_prompt(template: &str, hits: &[SearchHit], question: &str) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);
    let values = [("{context}", context.as_str()), ("{question}", question)];

    let mut prompt = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some((pos, placeholder, value)) = next_placeholder(rest, &values) {
        prompt.push_str(&rest[..pos]);
        prompt.push_str(value);
        rest = &rest[pos + placeholder.len()..];
    }
    prompt.push_str(rest);
    prompt
}

/// Earliest placeholder in `text` with its position and replacement.
fn next_placeholder<'v>(
    text: &str,
    values: &[(&'static str, &'v str)],
) -> Option<(usize, &'static str, &'v str)> {
    values
        .iter()
        .filter_map(|&(placeholder, value)| {
            text.find(placeholder).map(|pos| (pos, placeholder, value))
        })
        .min_by_key(|&(pos, ..)| pos)
}
