use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the originating file path.
pub const SOURCE_KEY: &str = "source";

/// A loaded source document: one file's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Originating file path.
    pub source: String,
    pub checksum: String,
    pub metadata: DocumentMetadata,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: Option<String>,
    pub extension: Option<String>,
    pub size_bytes: u64,
}

/// A contiguous span of a document's text, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub source: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Character offsets into the document (not bytes).
    pub start_offset: u64,
    pub end_offset: u64,
}

/// What a vector store keeps per point: text, vector and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn generate_id(source: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(source.as_bytes());
        hex::encode(&hash[..16])
    }

    pub fn new(
        content: String,
        source: String,
        checksum: String,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            id: Self::generate_id(&source),
            content,
            source,
            checksum,
            metadata,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl DocumentChunk {
    pub fn generate_id(document_id: &str, chunk_index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn from_document(
        document: &Document,
        content: String,
        chunk_index: u32,
        total_chunks: u32,
        start_offset: u64,
        end_offset: u64,
    ) -> Self {
        Self {
            id: Self::generate_id(&document.id, chunk_index),
            document_id: document.id.clone(),
            content,
            source: document.source.clone(),
            chunk_index,
            total_chunks,
            start_offset,
            end_offset,
        }
    }

    /// Pair the chunk with its embedding as a storable record.
    pub fn into_record(self, vector: Vec<f32>) -> CollectionRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), self.source);
        metadata.insert("document_id".to_string(), self.document_id);
        metadata.insert("chunk_index".to_string(), self.chunk_index.to_string());
        metadata.insert("start_offset".to_string(), self.start_offset.to_string());
        CollectionRecord {
            id: self.id,
            text: self.content,
            vector,
            metadata,
        }
    }
}

impl CollectionRecord {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(
            "content".to_string(),
            "/app/data/db1/handbuch.pdf".to_string(),
            "checksum".to_string(),
            DocumentMetadata::default(),
        )
    }

    #[test]
    fn test_document_generate_id() {
        let id = Document::generate_id("/path/to/file.txt");
        assert_eq!(id.len(), 32);
        assert_eq!(id, Document::generate_id("/path/to/file.txt"));
        assert_ne!(id, Document::generate_id("/path/to/other.txt"));
    }

    #[test]
    fn test_chunk_generate_id() {
        let id = DocumentChunk::generate_id("abc123", 5);
        assert_eq!(id.len(), 36);
        assert_eq!(id, DocumentChunk::generate_id("abc123", 5));
        assert_ne!(id, DocumentChunk::generate_id("abc123", 6));
    }

    #[test]
    fn test_into_record_keeps_source() {
        let document = doc();
        let chunk = DocumentChunk::from_document(&document, "content".to_string(), 0, 1, 0, 7);
        let id = chunk.id.clone();
        let record = chunk.into_record(vec![0.1, 0.2]);

        assert_eq!(record.id, id);
        assert_eq!(record.text, "content");
        assert_eq!(record.source(), Some("/app/data/db1/handbuch.pdf"));
        assert_eq!(record.metadata["chunk_index"], "0");
        assert_eq!(record.metadata["document_id"], document.id);
    }
}
