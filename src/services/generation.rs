//! Answer generation through an Ollama server's `/api/generate` endpoint.
//!
//! Streaming responses arrive as newline-delimited JSON objects, each carrying
//! a `response` fragment; the last one has `done: true`.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::GenerationConfig;

/// Turns a prompt into text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate the complete response in one piece.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Generate the response as a stream of fragments in arrival order.
    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, GenerationError>>, GenerationError>;

    fn supports_streaming(&self) -> bool;

    fn model(&self) -> &str;

    /// Base URL, for status output.
    fn url(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Client for an Ollama generation model.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
    stream: bool,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                seed: config.seed,
            },
            stream: config.stream,
        })
    }

    /// Check that the server answers and report whether the model is pulled.
    pub async fn health_check(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::ServerError(format!(
                "status {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        Ok(tags.models.iter().any(|m| {
            m.name == self.model || m.name.strip_suffix(":latest") == Some(self.model.as_str())
        }))
    }

    async fn post(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: self.options,
        };

        debug!(model = %self.model, stream, prompt_chars = prompt.len(), "requesting generation");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(GenerationError::ServerError(format!(
                "status {}: {}",
                status, message
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = self.post(prompt, false).await?.text().await?;

        let chunk: GenerateChunk = serde_json::from_str(&body)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        if let Some(error) = chunk.error {
            return Err(GenerationError::ServerError(error));
        }
        Ok(chunk.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, GenerationError>>, GenerationError> {
        let response = self.post(prompt, true).await?;
        Ok(decode_stream(Box::pin(response.bytes_stream())))
    }

    fn supports_streaming(&self) -> bool {
        self.stream
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> &str {
        &self.base_url
    }
}

/// Splits a byte stream into NDJSON lines and decodes each one.
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, GenerationError>> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = self.decode_line(&line) {
                let failed = item.is_err();
                items.push(item);
                if failed {
                    break;
                }
            }
            if self.done {
                break;
            }
        }

        items
    }

    fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let rest = std::mem::take(&mut self.buffer);
        let mut items: Vec<_> = self.decode_line(&rest).into_iter().collect();

        if !self.done && !items.iter().any(Result::is_err) {
            items.push(Err(GenerationError::MalformedResponse(
                "stream ended before completion".to_string(),
            )));
        }
        items
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Result<String, GenerationError>> {
        let line = line.trim_ascii();
        if line.is_empty() || self.done {
            return None;
        }

        // from_slice rejects invalid UTF-8 instead of substituting it
        let chunk: GenerateChunk = match serde_json::from_slice(line) {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(GenerationError::MalformedResponse(e.to_string()))),
        };

        if let Some(error) = chunk.error {
            return Some(Err(GenerationError::ServerError(error)));
        }

        self.done = chunk.done;
        if chunk.response.is_empty() {
            None
        } else {
            Some(Ok(chunk.response))
        }
    }
}

struct DecodeState<S> {
    bytes: S,
    decoder: LineDecoder,
    pending: VecDeque<Result<String, GenerationError>>,
    finished: bool,
}

fn decode_stream<S, B>(bytes: S) -> BoxStream<'static, Result<String, GenerationError>>
where
    S: futures::Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.push(chunk.as_ref()));
                    if state.decoder.done {
                        state.finished = true;
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(e.into()));
                }
                None => {
                    state.finished = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> GenerationConfig {
        GenerationConfig {
            url: url.to_string(),
            model: "llama3.1".to_string(),
            ..Default::default()
        }
    }

    fn ndjson(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(
                &serde_json::json!({"model": "llama3.1", "response": fragment, "done": false})
                    .to_string(),
            );
            body.push('\n');
        }
        body.push_str(
            &serde_json::json!({"model": "llama3.1", "response": "", "done": true}).to_string(),
        );
        body.push('\n');
        body
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = LineDecoder::default();
        let first = decoder.push(br#"{"response":"Hal"#);
        assert!(first.is_empty());

        let items = decoder.push(b"lo\",\"done\":false}\n{\"response\":\" Welt\",\"done\":false}\n");
        let items: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["Hallo", " Welt"]);

        assert!(decoder.push(b"{\"response\":\"\",\"done\":true}").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = LineDecoder::default();
        let items = decoder.push(b"{\"response\":\"ok\",\"done\":false}\nnot json\n");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(GenerationError::MalformedResponse(_))));
    }

    #[test]
    fn test_decoder_rejects_invalid_utf8() {
        let mut decoder = LineDecoder::default();
        let items = decoder.push(b"{\"response\":\"ab\xff\xfecd\",\"done\":false}\n");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_decoder_joins_split_multibyte_char() {
        let mut decoder = LineDecoder::default();
        let line = "{\"response\":\"Grüße\",\"done\":true}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&line[..split]).is_empty());
        let items = decoder.push(&line[split..]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "Grüße");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_truncated_stream() {
        let mut decoder = LineDecoder::default();
        decoder.push(b"{\"response\":\"partial\",\"done\":false}\n");
        let items = decoder.finish();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_streamed_equals_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                ndjson(&["Urlaub ", "wird ", "im Portal ", "beantragt."]),
                "application/x-ndjson",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.1",
                "response": "Urlaub wird im Portal beantragt.",
                "done": true
            })))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(&config(&server.uri())).unwrap();

        let fragments: Vec<String> = generator
            .generate_stream("prompt")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let complete = generator.generate("prompt").await.unwrap();

        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments.concat(), complete);
    }

    #[tokio::test]
    async fn test_request_carries_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.1",
                "options": {"temperature": 0.0, "seed": 7}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "ok",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(&GenerationConfig {
            seed: Some(7),
            ..config(&server.uri())
        })
        .unwrap();
        assert_eq!(generator.generate("prompt").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(&config(&server.uri())).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_model_missing_reports_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model \"llama3.1\" not found, try pulling it first"
            })))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(&config(&server.uri())).unwrap();
        let err = generator.generate_stream("prompt").await.err().unwrap();
        assert!(matches!(err, GenerationError::ServerError(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn test_health_check_finds_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3.1:latest"}, {"name": "nomic-embed-text:latest"}]
            })))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(&config(&server.uri())).unwrap();
        assert!(generator.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let generator = OllamaGenerator::new(&config("http://127.0.0.1:9")).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }
}
