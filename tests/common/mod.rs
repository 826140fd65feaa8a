//! 통합 테스트용 인프로세스 대역 (임베딩, 인덱스, LLM)

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use scaler_assist::knowledge::cosine_similarity;
use scaler_assist::{
    ChatMessage, ChatModel, EmbeddingProvider, IndexMatch, IndexRecord, VectorIndex,
    EMBEDDING_DIMENSION,
};

/// 단어 주머니를 768차원에 해싱하는 임베더
///
/// 소문자화, 구두점 제거, 끝의 `s` 제거 후 단어마다 한 칸씩 더합니다.
/// `passage:` / `query:` 접두어 토큰은 무시합니다.
pub struct HashingEmbedder;

impl HashingEmbedder {
    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|w| w.len() > 2 && w != "passage" && w != "query")
            .map(|w| w.strip_suffix('s').map(str::to_string).unwrap_or(w))
            .collect()
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIMENSION];
        for token in Self::tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() % EMBEDDING_DIMENSION as u64) as usize] += 1.0;
        }
        // 단어가 없으면 영벡터가 되지 않도록 고정 칸 사용
        if v.iter().all(|x| *x == 0.0) {
            v[EMBEDDING_DIMENSION - 1] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// 메모리 내 코사인 인덱스 (유사도 0 이하 매치는 버림)
#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<Vec<IndexRecord>>,
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let stored = self.records.lock().unwrap();
        let mut matches: Vec<IndexMatch> = stored
            .iter()
            .map(|r| {
                let mut metadata = Map::new();
                metadata.insert("text".into(), Value::String(r.metadata.text.clone()));
                IndexMatch {
                    id: r.id.clone(),
                    score: cosine_similarity(vector, &r.values),
                    metadata,
                }
            })
            .filter(|m| m.score > 1e-6)
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.lock().unwrap().len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// 스크립트 응답 LLM
///
/// 큐에 응답이 있으면 순서대로 쓰고, 비면 `fallback`을 돌려줍니다.
/// 마지막 사용자 메시지에 `fail_on`이 들어 있으면 실패합니다.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    fail_on: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn answering(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            fail_on: None,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with_replies(mut self, replies: &[&str]) -> Self {
        self.replies = Mutex::new(replies.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());

        if let (Some(needle), Some(last)) = (&self.fail_on, messages.last()) {
            if last.content.contains(needle.as_str()) {
                anyhow::bail!("LLM API error (500): upstream failure");
            }
        }

        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
