//! 대화 메모리 모듈
//!
//! - `BufferMemory`: 모든 턴을 그대로 보관
//! - `HybridMemory`: LLM 누적 요약 + 최근 N개 메시지 윈도우
//!
//! 하이브리드 메모리는 아직 요약에 반영되지 않은 턴을 윈도우와 별도의
//! 대기 큐에 보관합니다. 윈도우에서 밀려난 턴도 요약에서 빠지지 않습니다.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::MemoryStrategy;
use crate::llm::{ChatMessage, ChatModel, Role};

/// 요약 메시지 접두어
pub const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// 요약 대기 큐 상한 (요약이 계속 실패하면 가장 오래된 메시지부터 버림)
pub const MAX_PENDING_MESSAGES: usize = 40;

const SUMMARIZE_PROMPT: &str = "Progressively summarize the lines of conversation provided, \
adding onto the previous summary and returning a new summary. Keep names, programs, numbers \
and any facts the user asked about. Reply with the summary only.";

// ============================================================================
// Stats
// ============================================================================

/// 메모리 사용 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// 요약 길이 (문자 수)
    pub summary_chars: usize,
    /// 윈도우에 있는 메시지 수
    pub window_messages: usize,
    /// 아직 요약되지 않은 메시지 수
    pub pending_messages: usize,
    /// 지금까지 추가된 전체 메시지 수
    pub total_messages: usize,
    /// 윈도우 용량 (버퍼 메모리는 0)
    pub window_size: usize,
}

// ============================================================================
// BufferMemory
// ============================================================================

/// 전체 대화 버퍼
#[derive(Debug, Default)]
pub struct BufferMemory {
    messages: Vec<ChatMessage>,
}

impl BufferMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn add_ai_message(&mut self, content: &str) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            window_messages: self.messages.len(),
            total_messages: self.messages.len(),
            ..MemoryStats::default()
        }
    }
}

// ============================================================================
// HybridMemory
// ============================================================================

/// 요약 + 윈도우 하이브리드 메모리
pub struct HybridMemory {
    llm: Arc<dyn ChatModel>,
    window_size: usize,
    summary: String,
    pending: VecDeque<ChatMessage>,
    window: VecDeque<ChatMessage>,
    total: usize,
}

impl HybridMemory {
    /// `window_size`는 윈도우에 보관할 메시지 수 (1 이상)
    pub fn new(llm: Arc<dyn ChatModel>, window_size: usize) -> Result<Self> {
        if window_size == 0 {
            anyhow::bail!("Memory window size must be greater than zero");
        }
        Ok(Self {
            llm,
            window_size,
            summary: String::new(),
            pending: VecDeque::new(),
            window: VecDeque::with_capacity(window_size),
            total: 0,
        })
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.push(ChatMessage::user(content));
    }

    pub fn add_ai_message(&mut self, content: &str) {
        self.push(ChatMessage::assistant(content));
    }

    fn push(&mut self, message: ChatMessage) {
        if self.pending.len() == MAX_PENDING_MESSAGES {
            self.pending.pop_front();
            tracing::warn!(
                "Summary backlog reached {} messages, dropping oldest",
                MAX_PENDING_MESSAGES
            );
        }
        self.pending.push_back(message.clone());
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(message);
        self.total += 1;
    }

    /// 현재 요약
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// 윈도우 메시지 (시간순)
    pub fn window(&self) -> Vec<ChatMessage> {
        self.window.iter().cloned().collect()
    }

    /// 요약 메시지 + 윈도우 메시지
    ///
    /// 대기 중인 턴을 먼저 요약에 반영합니다. 요약 호출이 실패하면
    /// 대기 턴을 유지하고 직전 요약과 윈도우를 돌려줍니다.
    pub async fn combined_history(&mut self) -> Vec<ChatMessage> {
        if !self.pending.is_empty() {
            match self.summarize_pending().await {
                Ok(summary) => {
                    self.summary = summary;
                    self.pending.clear();
                }
                Err(e) => tracing::warn!(
                    "Conversation summarization failed, keeping previous summary: {:#}",
                    e
                ),
            }
        }

        let mut messages = Vec::with_capacity(self.window.len() + 1);
        if !self.summary.is_empty() {
            messages.push(ChatMessage::system(format!("{}{}", SUMMARY_PREFIX, self.summary)));
        }
        messages.extend(self.window.iter().cloned());
        messages
    }

    async fn summarize_pending(&self) -> Result<String> {
        let new_lines = self
            .pending
            .iter()
            .map(|m| match m.role {
                Role::User => format!("Human: {}", m.content),
                Role::Assistant => format!("AI: {}", m.content),
                Role::System => format!("System: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Current summary:\n{}\n\nNew lines of conversation:\n{}\n\nNew summary:",
            self.summary, new_lines
        );

        tracing::debug!("Summarizing {} pending messages", self.pending.len());
        let summary = self
            .llm
            .complete(&[ChatMessage::system(SUMMARIZE_PROMPT), ChatMessage::user(prompt)])
            .await?;

        Ok(summary.trim().to_string())
    }

    pub fn clear(&mut self) {
        self.summary.clear();
        self.pending.clear();
        self.window.clear();
        self.total = 0;
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            summary_chars: self.summary.chars().count(),
            window_messages: self.window.len(),
            pending_messages: self.pending.len(),
            total_messages: self.total,
            window_size: self.window_size,
        }
    }
}

// ============================================================================
// ChatMemory
// ============================================================================

/// 설정으로 선택되는 대화 메모리
pub enum ChatMemory {
    Buffer(BufferMemory),
    Hybrid(HybridMemory),
}

impl ChatMemory {
    /// 전략에 맞는 메모리 생성 (하이브리드는 요약용 LLM 필요)
    pub fn from_strategy(
        strategy: MemoryStrategy,
        llm: Arc<dyn ChatModel>,
        window_size: usize,
    ) -> Result<Self> {
        Ok(match strategy {
            MemoryStrategy::Buffer => ChatMemory::Buffer(BufferMemory::new()),
            MemoryStrategy::Hybrid => ChatMemory::Hybrid(HybridMemory::new(llm, window_size)?),
        })
    }

    pub fn add_user_message(&mut self, content: &str) {
        match self {
            ChatMemory::Buffer(m) => m.add_user_message(content),
            ChatMemory::Hybrid(m) => m.add_user_message(content),
        }
    }

    pub fn add_ai_message(&mut self, content: &str) {
        match self {
            ChatMemory::Buffer(m) => m.add_ai_message(content),
            ChatMemory::Hybrid(m) => m.add_ai_message(content),
        }
    }

    pub async fn combined_history(&mut self) -> Vec<ChatMessage> {
        match self {
            ChatMemory::Buffer(m) => m.history(),
            ChatMemory::Hybrid(m) => m.combined_history().await,
        }
    }

    pub fn clear(&mut self) {
        match self {
            ChatMemory::Buffer(m) => m.clear(),
            ChatMemory::Hybrid(m) => m.clear(),
        }
    }

    pub fn stats(&self) -> MemoryStats {
        match self {
            ChatMemory::Buffer(m) => m.stats(),
            ChatMemory::Hybrid(m) => m.stats(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
