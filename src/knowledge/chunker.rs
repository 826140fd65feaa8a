//! Text Chunking Module
//!
//! 정제된 코퍼스를 검색 단위(패시지)로 분할합니다.
//! - `RecursiveCharacterSplitter`: 구분자 우선순위에 따른 재귀 분할 + 오버랩
//! - `SemanticSplitter`: 인접 문장 임베딩 거리 기반 경계 탐지

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;

use super::index::cosine_similarity;

// ============================================================================
// Chunk
// ============================================================================

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 청크 원문 (저장/검색 시 그대로 사용)
    pub chunk_text: String,
    /// 소스 내 순서 (0-based)
    pub chunk_index: usize,
}

/// 분할된 텍스트 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// 분할 결과 문자열을 순서대로 `Chunk`로 변환
pub fn build_chunks(pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            metadata: ChunkMetadata {
                chunk_text: text.clone(),
                chunk_index: i,
            },
            text,
        })
        .collect()
}

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (문자 수 기준)
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기
    pub chunk_size: usize,
    /// 인접 청크 간 오버랩 상한
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            chunk_overlap: 50,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 동기 텍스트 분할 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 조각으로 분할
    fn split_text(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 분할 후 메타데이터를 붙인 청크 목록
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        build_chunks(self.split_text(text))
    }
}

// ============================================================================
// RecursiveCharacterSplitter
// ============================================================================

/// 기본 구분자 우선순위 (문단 > 줄 > 문장 > 단어)
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

/// 재귀 문자 분할기
///
/// 텍스트에 존재하는 첫 번째 구분자로 자르고, 여전히 큰 조각은
/// 다음 구분자로 재귀 분할한 뒤, 작은 조각들을 `chunk_size`까지 병합합니다.
/// 구분자는 뒤따르는 조각의 앞에 붙어 유지됩니다.
pub struct RecursiveCharacterSplitter {
    config: ChunkConfig,
    separators: Vec<&'static str>,
}

impl RecursiveCharacterSplitter {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.to_vec(),
        })
    }

    /// 기본 설정(300/50)으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let (separator, remaining) = match separators.iter().position(|s| text.contains(s)) {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => (separators.last().copied().unwrap_or(" "), &[][..]),
        };

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(&piece) < self.config.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                // 더 쪼갤 구분자가 없음 - 큰 조각 그대로 유지
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// 작은 조각 병합 (오버랩 유지)
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let ChunkConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);

                // 오버랩 한도 이하가 될 때까지 앞에서 제거
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

impl Chunker for RecursiveCharacterSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveCharacterSplitter"
    }
}

// ============================================================================
// SemanticSplitter
// ============================================================================

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?!]\s+").expect("valid regex"));

/// 의미 기반 분할기
///
/// 문장마다 앞뒤 `buffer_size`개 문장을 묶어 임베딩하고, 인접 묶음 간
/// 코사인 거리가 백분위 임계값을 넘는 지점을 청크 경계로 삼습니다.
pub struct SemanticSplitter {
    embedder: Arc<dyn EmbeddingProvider>,
    buffer_size: usize,
    breakpoint_percentile: f32,
}

impl SemanticSplitter {
    /// 기본 설정(buffer 1, 95 백분위)으로 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            buffer_size: 1,
            breakpoint_percentile: 95.0,
        }
    }

    /// 경계 백분위 지정
    pub fn with_percentile(mut self, percentile: f32) -> Self {
        self.breakpoint_percentile = percentile.clamp(0.0, 100.0);
        self
    }

    /// 텍스트를 의미 단위로 분할
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>> {
        let sentences = split_sentences(text);
        if sentences.len() < 2 {
            return Ok(sentences);
        }

        let groups = combine_sentences(&sentences, self.buffer_size);
        let embeddings = self.embedder.embed_documents(&groups).await?;

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();

        let threshold = percentile(&distances, self.breakpoint_percentile);
        tracing::debug!(
            "Semantic split: {} sentences, breakpoint distance {:.4}",
            sentences.len(),
            threshold
        );

        let mut chunks = Vec::new();
        let mut start = 0;
        for (i, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                chunks.push(sentences[start..=i].join(" "));
                start = i + 1;
            }
        }
        if start < sentences.len() {
            chunks.push(sentences[start..].join(" "));
        }

        Ok(chunks)
    }

    /// 분할 후 메타데이터를 붙인 청크 목록
    pub async fn chunk(&self, text: &str) -> Result<Vec<Chunk>> {
        Ok(build_chunks(self.split_text(text).await?))
    }
}

/// 문장 종결 부호(.?!) + 공백 기준 문장 분리
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in SENTENCE_END.find_iter(text) {
        // 종결 부호는 한 바이트 ASCII
        let sentence = text[last..m.start() + 1].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = m.end();
    }

    let tail = text[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// 각 문장을 앞뒤 `buffer`개 문장과 묶음
fn combine_sentences(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let from = i.saturating_sub(buffer);
            let to = (i + buffer + 1).min(sentences.len());
            sentences[from..to].join(" ")
        })
        .collect()
}

/// 선형 보간 백분위
fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (sorted.len() - 1) as f32 * pct / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 구분자 위치에서 자르되 구분자는 뒤 조각 앞에 남김
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut last = 0;

    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }

    pieces
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>) {
    let joined: String = current.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveCharacterSplitter::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
