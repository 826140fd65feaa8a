//! scaler-assist - Scaler Academy 문서 기반 대화형 RAG 챗봇
//!
//! PDF에서 추출/정제한 코퍼스를 청킹하여 벡터 인덱스(Pinecone 또는 LanceDB)에
//! 저장하고, 대화 이력을 반영한 검색 증강 답변을 생성합니다.

pub mod chain;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod eval;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod memory;

// Re-exports
pub use chain::{ChainOutput, RagChain, REFUSAL_ANSWER};
pub use config::{Config, ConfigError, MemoryStrategy, VectorBackend};
pub use embedding::{EmbeddingProvider, HuggingFaceEmbedding, EMBEDDING_DIMENSION};
pub use knowledge::{
    Chunk, ChunkConfig, Chunker, IndexMatch, IndexRecord, LanceIndex, PineconeIndex,
    RecursiveCharacterSplitter, RetrievedDocument, Retriever, SemanticSplitter, VectorIndex,
};
pub use llm::{ChatMessage, ChatModel, GroqChat, Role};
pub use memory::{ChatMemory, HybridMemory, MemoryStats};
