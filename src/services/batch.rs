use crate::error::{EmbeddingError, IngestError};
use crate::models::{CollectionRecord, DocumentChunk};
use crate::services::EmbeddingProvider;

/// Embed a batch of chunks into records ready for insertion.
pub async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    chunks: &[DocumentChunk],
) -> Result<Vec<CollectionRecord>, IngestError> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            embeddings.len()
        ))
        .into());
    }

    Ok(chunks
        .iter()
        .cloned()
        .zip(embeddings)
        .map(|(chunk, vector)| chunk.into_record(vector))
        .collect())
}
