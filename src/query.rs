//! Retrieval-augmented answering of a single question.
//!
//! Embed the question, fetch the nearest chunks, format them into a fixed
//! prompt, and ask the chat model. The retrieved chunk ids are returned as
//! the answer's sources.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{QueryResponse, ScoredChunk};
use crate::vector_store::VectorStore;

/// Separator placed between retrieved chunks in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Fill the answer template with the retrieved context and the question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "\nAnswer the question based only on the following context:\n\n{context}\n\n---\n\nAnswer the question based on the above context: {question}\n"
    )
}

/// Join the text of the retrieved chunks, best match first.
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Answer `query_text` from the `top_k` most similar chunks in `store`.
pub async fn query_rag(
    store: &VectorStore,
    embedder: &dyn Embedder,
    model: &dyn ChatModel,
    query_text: &str,
    top_k: usize,
) -> Result<QueryResponse> {
    if query_text.trim().is_empty() {
        bail!("query_text must not be empty");
    }

    let query_vec = embed_query(embedder, query_text).await?;
    let results = store.similarity_search(&query_vec, top_k).await?;
    debug!(retrieved = results.len(), "similarity search complete");

    let prompt = build_prompt(&build_context(&results), query_text);
    let response_text = model.invoke(&prompt).await?;
    let sources: Vec<String> = results.into_iter().map(|r| r.chunk.id).collect();

    info!(model = model.model_name(), sources = sources.len(), "answered query");

    Ok(QueryResponse {
        query_text: query_text.to_string(),
        response_text,
        sources,
    })
}

/// CLI entry point for `rag query`.
pub async fn run_query(config: &Config, query_text: &str) -> Result<()> {
    let embedder = create_embedder(config)?;
    let model = create_chat_model(config)?;
    let store = VectorStore::open(&config.db.path).await?;

    let result = query_rag(
        &store,
        embedder.as_ref(),
        model.as_ref(),
        query_text,
        config.retrieval.top_k,
    )
    .await;
    store.close().await;
    let response = result?;

    println!("Response: {}", response.response_text);
    println!("Sources: {:?}", response.sources);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                source: "doc.pdf".to_string(),
                page: 0,
                text: text.to_string(),
            },
            score,
        }
    }

    #[test]
    fn test_prompt_template() {
        let prompt = build_prompt("CTX", "Q?");
        assert_eq!(
            prompt,
            "\nAnswer the question based only on the following context:\n\nCTX\n\n---\n\nAnswer the question based on the above context: Q?\n"
        );
    }

    #[test]
    fn test_context_joins_in_rank_order() {
        let results = vec![scored("a", "first", 0.9), scored("b", "second", 0.5)];
        assert_eq!(build_context(&results), "first\n\n---\n\nsecond");
    }

    #[test]
    fn test_context_empty_when_nothing_retrieved() {
        assert_eq!(build_context(&[]), "");
    }
}
