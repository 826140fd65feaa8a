//! RAG 체인 - 대화 맥락을 반영한 검색 증강 답변
//!
//! 1. 메모리에서 대화 이력 조회
//! 2. 이력이 있으면 후속 질문을 독립 질문으로 재작성
//! 3. 독립 질문으로 검색
//! 4. 검색 결과가 없으면 고정 거절 문구, 있으면 컨텍스트 기반 답변 생성
//! 5. 성공한 경우에만 메모리에 질문/답변 기록

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::knowledge::{RetrievedDocument, Retriever};
use crate::llm::{ChatMessage, ChatModel};
use crate::memory::{ChatMemory, MemoryStats};

/// 검색 결과가 없을 때의 답변
pub const REFUSAL_ANSWER: &str = "I'm sorry, I couldn't find that information.";

const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which \
can be understood without the chat history. Do NOT answer the question, just reformulate \
it if needed and otherwise return it as is.";

/// QA 시스템 프롬프트 (`{context}` 자리에 검색 문서가 들어감)
const QA_PROMPT: &str = "You are an intelligent assistant for Scaler Academy. \
You have access to internal documents, placement records, curricula, and student feedback.\n\n\
Maintain a professional tone. Answer only from the context.\n\n\
If the answer isn't available, say:\n\
\"I'm sorry, I couldn't find that information.\"\n\n\
Context:\n{context}";

/// 체인 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub answer: String,
    /// 답변에 사용된 문서 (순위순)
    pub source_documents: Vec<RetrievedDocument>,
    /// 검색에 사용한 독립 질문
    pub standalone_question: String,
}

/// 대화형 RAG 체인
pub struct RagChain {
    llm: Arc<dyn ChatModel>,
    retriever: Retriever,
    memory: ChatMemory,
}

impl RagChain {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Retriever, memory: ChatMemory) -> Self {
        Self {
            llm,
            retriever,
            memory,
        }
    }

    /// 질문 하나 처리
    ///
    /// 실패하면 에러를 그대로 돌려주고 메모리는 건드리지 않습니다.
    pub async fn invoke(&mut self, question: &str) -> Result<ChainOutput> {
        let history = self.memory.combined_history().await;

        let standalone_question = self.contextualize(&history, question).await?;
        if standalone_question != question {
            tracing::debug!("Standalone question: {}", standalone_question);
        }

        let source_documents = self.retriever.retrieve(&standalone_question).await?;

        let answer = if source_documents.is_empty() {
            tracing::info!("No documents retrieved, returning refusal");
            REFUSAL_ANSWER.to_string()
        } else {
            self.answer(&history, question, &source_documents).await?
        };

        self.memory.add_user_message(question);
        self.memory.add_ai_message(&answer);

        Ok(ChainOutput {
            answer,
            source_documents,
            standalone_question,
        })
    }

    /// 이력을 반영한 독립 질문 생성 (이력이 없으면 그대로)
    async fn contextualize(&self, history: &[ChatMessage], question: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(CONTEXTUALIZE_PROMPT));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));

        let rewritten = self.llm.complete(&messages).await?;
        let rewritten = rewritten.trim();

        Ok(if rewritten.is_empty() {
            question.to_string()
        } else {
            rewritten.to_string()
        })
    }

    async fn answer(
        &self,
        history: &[ChatMessage],
        question: &str,
        documents: &[RetrievedDocument],
    ) -> Result<String> {
        let context = documents
            .iter()
            .map(|d| d.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(QA_PROMPT.replace("{context}", &context)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));

        self.llm.complete(&messages).await
    }

    /// 대화 메모리 초기화
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }
}

// ============================================================================
// Tests
// ============================================================================
