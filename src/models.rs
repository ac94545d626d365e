//! Core data models shared by ingestion, retrieval and the HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One extracted PDF page, before chunking.
#[derive(Debug, Clone)]
pub struct PageDocument {
    /// Path of the PDF as it was loaded.
    pub source: String,
    /// Zero-based page number.
    pub page: u32,
    pub text: String,
}

/// A window of page text with its stable `source:page:index` identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: u32,
    pub text: String,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// The answer produced for one question.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub query_text: String,
    pub response_text: String,
    /// Ids of the chunks placed in the prompt context.
    pub sources: Vec<String>,
}

/// A submitted question and, once available, its answer.
///
/// This is the JSON body of the HTTP API and the worker invocation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    #[serde(default)]
    pub create_time: i64,
    pub query_text: String,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
}

impl QueryRecord {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4().to_string(),
            create_time: chrono::Utc::now().timestamp(),
            query_text: query_text.into(),
            answer_text: None,
            sources: Vec::new(),
            is_complete: false,
        }
    }

    /// Fill in the answer and mark the record complete.
    pub fn complete(&mut self, response: QueryResponse) {
        self.answer_text = Some(response.response_text);
        self.sources = response.sources;
        self.is_complete = true;
    }
}
