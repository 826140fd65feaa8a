//! Retriever - 질의 임베딩 + 벡터 인덱스 검색
//!
//! 질의를 `query: ` 접두어로 임베딩하고 인덱스에서 top-k를 가져와
//! 순위 순서대로 문서 목록을 돌려줍니다.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::embedding::EmbeddingProvider;

use super::index::VectorIndex;

/// 검색된 문서
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    /// 본문 (`metadata.text`)
    pub page_content: String,
    /// 인덱스 메타데이터 (`text` 포함)
    pub metadata: Map<String, Value>,
    /// 인덱스 유사도 스코어
    pub score: f32,
}

/// 벡터 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    k: usize,
}

impl Retriever {
    /// 새 검색기 생성 (`k`는 1 이상)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        k: usize,
    ) -> Result<Self> {
        if k == 0 {
            anyhow::bail!("Retriever k must be greater than zero");
        }
        Ok(Self { embedder, index, k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// 기본 k로 검색
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        self.retrieve_k(query, self.k).await
    }

    /// 지정한 k로 검색 (최대 k개, 순위순)
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if k == 0 {
            anyhow::bail!("Retriever k must be greater than zero");
        }

        let vector = self.embedder.embed_query(query).await?;
        let matches = self.index.query(&vector, k).await?;

        let mut documents = Vec::with_capacity(matches.len());
        for m in matches.into_iter().take(k) {
            let text = match m.text() {
                Some(text) if !text.trim().is_empty() => text.to_string(),
                _ => {
                    tracing::warn!("Skipping match {} without text metadata", m.id);
                    continue;
                }
            };

            documents.push(RetrievedDocument {
                page_content: text,
                metadata: m.metadata,
                score: m.score,
            });
        }

        tracing::debug!(
            "Retrieved {} documents from {} (k={})",
            documents.len(),
            self.index.name(),
            k
        );

        Ok(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================
