//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 백엔드(Pinecone, LanceDB)는 `VectorIndex` 트레이트 뒤에 숨겨집니다.
//! 레코드 ID는 `doc-{i}` 형식이며 메타데이터는 청크 원문(`text`)만 담습니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::embedding::EmbeddingProvider;

use super::chunker::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 레코드 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// 청크 원문
    pub text: String,
}

/// 인덱스 레코드 (저장용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// `doc-{i}`
    pub id: String,
    /// 임베딩 벡터
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    /// 유사도 스코어 (높을수록 유사)
    #[serde(default)]
    pub score: f32,
    /// 저장된 메타데이터 (백엔드가 돌려준 그대로)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IndexMatch {
    /// `metadata.text` 값 (없거나 문자열이 아니면 None)
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").and_then(Value::as_str)
    }
}

/// 청크 순번으로 레코드 ID 생성
pub fn record_id(index: usize) -> String {
    format!("doc-{}", index)
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 벡터 인덱스의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 레코드 업서트 (같은 ID는 덮어씀)
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize>;

    /// 질의 벡터와 가장 가까운 `top_k`개 (메타데이터 포함, 순위순)
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;

    /// 저장된 벡터 개수
    async fn count(&self) -> Result<usize>;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ingestion
// ============================================================================

/// 청크를 임베딩하여 인덱스에 업서트
///
/// 레코드 ID는 청크 순서대로 `doc-0`, `doc-1`, ... 입니다.
pub async fn ingest_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<usize> {
    if chunks.is_empty() {
        tracing::warn!("No chunks to ingest");
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    tracing::info!("Embedding {} chunks with {}", texts.len(), embedder.name());
    let vectors = embedder.embed_documents(&texts).await?;

    let records: Vec<IndexRecord> = chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (chunk, values))| IndexRecord {
            id: record_id(i),
            values,
            metadata: RecordMetadata {
                text: chunk.metadata.chunk_text.clone(),
            },
        })
        .collect();

    let upserted = index.upsert(&records).await?;
    tracing::info!("Upserted {} vectors into {}", upserted, index.name());

    Ok(upserted)
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::knowledge::chunker::build_chunks;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty_or_mismatch() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_match_text() {
        let mut metadata = Map::new();
        metadata.insert("text".into(), Value::String("hello".into()));
        let m = IndexMatch {
            id: "doc-0".into(),
            score: 0.9,
            metadata,
        };
        assert_eq!(m.text(), Some("hello"));

        let empty = IndexMatch {
            id: "doc-1".into(),
            score: 0.1,
            metadata: Map::new(),
        };
        assert_eq!(empty.text(), None);
    }

    struct ConstantEmbedding;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedding {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    #[derive(Default)]
    struct CapturingIndex {
        records: Mutex<Vec<IndexRecord>>,
    }

    #[async_trait]
    impl VectorIndex for CapturingIndex {
        async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
            self.records.lock().unwrap().extend(records.iter().cloned());
            Ok(records.len())
        }

        async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<IndexMatch>> {
            Ok(vec![])
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.records.lock().unwrap().len())
        }

        fn name(&self) -> &str {
            "capturing"
        }
    }

    #[tokio::test]
    async fn test_ingest_chunks_ids_and_metadata() {
        let chunks = build_chunks(vec!["first chunk".into(), "second chunk".into()]);
        let index = CapturingIndex::default();

        let count = ingest_chunks(&chunks, &ConstantEmbedding, &index).await.unwrap();
        assert_eq!(count, 2);

        let records = index.records.lock().unwrap();
        assert_eq!(records[0].id, "doc-0");
        assert_eq!(records[1].id, "doc-1");
        assert_eq!(records[1].metadata.text, "second chunk");
        assert!((records[0].values[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ingest_no_chunks() {
        let index = CapturingIndex::default();
        assert_eq!(ingest_chunks(&[], &ConstantEmbedding, &index).await.unwrap(), 0);
    }
}
