//! Knowledge 모듈 - 코퍼스 정제, 청킹, 벡터 인덱스, 검색
//!
//! - Normalizer: 추출 텍스트 정제
//! - Chunker: 재귀 문자 분할 / 의미 기반 분할
//! - Index: `VectorIndex` 트레이트 (Pinecone, LanceDB 구현)
//! - Retriever: 질의 임베딩 후 top-k 검색

mod chunker;
mod index;
mod lance;
mod normalizer;
mod pinecone;
mod retriever;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, VectorBackend};

// Re-exports
pub use chunker::{
    build_chunks, default_chunker, Chunk, ChunkConfig, ChunkMetadata, Chunker,
    RecursiveCharacterSplitter, SemanticSplitter, DEFAULT_SEPARATORS,
};
pub use index::{
    cosine_similarity, ingest_chunks, record_id, IndexMatch, IndexRecord, RecordMetadata,
    VectorIndex,
};
pub use lance::LanceIndex;
pub use normalizer::{clean_corpus_file, clean_text};
pub use pinecone::{IndexDescription, IndexStatus, PineconeAdmin, PineconeIndex};
pub use retriever::{RetrievedDocument, Retriever};

/// 설정된 백엔드의 벡터 인덱스 열기
pub async fn open_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.backend {
        VectorBackend::Pinecone => {
            let pinecone = config
                .pinecone
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Pinecone backend selected but not configured"))?;
            Ok(Arc::new(PineconeIndex::connect(pinecone).await?))
        }
        VectorBackend::Lance => Ok(Arc::new(LanceIndex::open(&config.lance_path).await?)),
    }
}
