//! 평가 모듈 - RAG 답변 품질 배치 평가
//!
//! 질문 목록(선택적으로 참조 답변 포함)을 체인에 넣고, 답변과 검색 컨텍스트를
//! `Evaluator`로 채점합니다. 기본 구현 `LlmJudge`는 지표마다 LLM에 0~1 점수를
//! 요청합니다.
//!
//! - 참조 없음: faithfulness, answer_relevancy
//! - 참조 있음: + context_precision, context_recall
//! - 기준 평가(선택): + helpfulness (참조 불필요)

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::RagChain;
use crate::llm::{ChatMessage, ChatModel};

// ============================================================================
// Types
// ============================================================================

/// 평가 지표
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Faithfulness,
    AnswerRelevancy,
    ContextPrecision,
    ContextRecall,
    /// 기준 평가: 질문에 도움이 되는 답변인지
    Helpfulness,
}

impl Metric {
    /// 참조 답변 유무에 따른 지표 목록
    pub fn for_reference(has_reference: bool) -> &'static [Metric] {
        if has_reference {
            &[
                Metric::Faithfulness,
                Metric::AnswerRelevancy,
                Metric::ContextPrecision,
                Metric::ContextRecall,
            ]
        } else {
            &[Metric::Faithfulness, Metric::AnswerRelevancy]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Faithfulness => "faithfulness",
            Metric::AnswerRelevancy => "answer_relevancy",
            Metric::ContextPrecision => "context_precision",
            Metric::ContextRecall => "context_recall",
            Metric::Helpfulness => "helpfulness",
        }
    }
}

/// 평가 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalItem {
    pub question: String,
    #[serde(default, rename = "reference_answer")]
    pub reference: Option<String>,
}

impl EvalItem {
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            reference: None,
        }
    }

    pub fn with_reference(question: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            reference: Some(reference.into()),
        }
    }
}

/// 채점 입력
#[derive(Debug, Clone)]
pub struct EvalSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub reference: Option<String>,
}

/// 질문별 평가 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub question: String,
    pub answer: String,
    pub metrics: BTreeMap<Metric, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub contexts: Vec<String>,
}

/// 평가 실행 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<EvalRecord>,
}

impl EvalReport {
    /// 지표별 평균
    pub fn averages(&self) -> BTreeMap<Metric, f32> {
        let mut sums: BTreeMap<Metric, (f32, usize)> = BTreeMap::new();
        for record in &self.records {
            for (metric, score) in &record.metrics {
                let entry = sums.entry(*metric).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(metric, (sum, n))| (metric, sum / n as f32))
            .collect()
    }
}

// ============================================================================
// Default Question Sets
// ============================================================================

/// 참조 없는 기본 질문
pub fn default_questions() -> Vec<EvalItem> {
    [
        "What is Scaler Academy?",
        "What courses does Scaler offer?",
        "How long is the Data Science program?",
        "What are the admission requirements?",
        "What is the fee structure?",
    ]
    .into_iter()
    .map(EvalItem::question)
    .collect()
}

/// 참조 답변이 있는 기본 데이터셋
pub fn default_reference_set() -> Vec<EvalItem> {
    vec![
        EvalItem::with_reference(
            "What is Scaler Academy?",
            "Scaler Academy is an online transformative upskilling platform for working tech \
             professionals that offers comprehensive courses in various technology domains.",
        ),
        EvalItem::with_reference(
            "What courses does Scaler offer?",
            "Scaler offers courses in Advanced AI and Machine Learning, Data Science, Software \
             Engineering, and other technology-focused programs.",
        ),
        EvalItem::with_reference(
            "How long is the Data Science program?",
            "The Data Science program at Scaler Academy has varying durations based on learner \
             profiles, typically ranging from 1 year to longer depending on the specific track.",
        ),
        EvalItem::with_reference(
            "What are the admission requirements?",
            "To get admission to Scaler Academy, candidates need to take the Scaler Entrance \
             Test, which consists of 16 questions covering various topics.",
        ),
        EvalItem::with_reference(
            "What is the fee structure?",
            "The fee structure includes admission fees of INR 1,00,000 (non-refundable) plus \
             additional program fees that vary by course.",
        ),
    ]
}

// ============================================================================
// Loading / Saving
// ============================================================================

/// 질문 파일 로드 (한 줄에 하나, 빈 줄과 `#` 주석 무시)
pub fn load_questions(path: &Path) -> Result<Vec<EvalItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {:?}", path))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(EvalItem::question)
        .collect())
}

/// 데이터셋 JSON 로드 (`[{question, reference_answer}]`)
pub fn load_dataset(path: &Path) -> Result<Vec<EvalItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid dataset JSON: {:?}", path))
}

/// 보고서를 JSON으로 저장
pub fn save_report(report: &EvalReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))
}

// ============================================================================
// Evaluator
// ============================================================================

/// 채점기 트레이트
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// 샘플 하나 채점 (참조 유무에 맞는 지표만)
    async fn score(&self, sample: &EvalSample) -> Result<BTreeMap<Metric, f32>>;
}

static SCORE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

/// 응답에서 첫 번째 숫자를 찾아 [0, 1]로 제한
fn parse_score(reply: &str) -> Option<f32> {
    SCORE_NUMBER
        .find(reply)
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict evaluator of a question-answering \
system. Reply with a single number between 0 and 1 and nothing else.";

/// LLM 기반 채점기 (지표당 LLM 호출 1회)
pub struct LlmJudge {
    llm: Arc<dyn ChatModel>,
    criteria: bool,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self {
            llm,
            criteria: false,
        }
    }

    /// helpfulness 기준 평가 추가 여부
    pub fn with_criteria(mut self, enabled: bool) -> Self {
        self.criteria = enabled;
        self
    }

    /// 샘플에 적용할 지표 목록
    pub fn metrics(&self, sample: &EvalSample) -> Vec<Metric> {
        let mut metrics = Metric::for_reference(sample.reference.is_some()).to_vec();
        if self.criteria {
            metrics.push(Metric::Helpfulness);
        }
        metrics
    }

    fn prompt(metric: Metric, sample: &EvalSample) -> String {
        let contexts = sample
            .contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n");
        let reference = sample.reference.as_deref().unwrap_or("");

        match metric {
            Metric::Faithfulness => format!(
                "What fraction of the claims in the answer are supported by the contexts?\n\n\
                 Contexts:\n{}\n\nAnswer:\n{}",
                contexts, sample.answer
            ),
            Metric::AnswerRelevancy => format!(
                "How directly and completely does the answer address the question?\n\n\
                 Question:\n{}\n\nAnswer:\n{}",
                sample.question, sample.answer
            ),
            Metric::ContextPrecision => format!(
                "What fraction of the contexts are useful for arriving at the reference \
                 answer to the question?\n\nQuestion:\n{}\n\nReference answer:\n{}\n\n\
                 Contexts:\n{}",
                sample.question, reference, contexts
            ),
            Metric::ContextRecall => format!(
                "What fraction of the statements in the reference answer can be found in \
                 the contexts?\n\nReference answer:\n{}\n\nContexts:\n{}",
                reference, contexts
            ),
            Metric::Helpfulness => format!(
                "Criterion: helpfulness. Is the answer helpful, insightful and appropriate \
                 for the question? Use 1 if it fully meets the criterion and 0 if it does \
                 not.\n\nQuestion:\n{}\n\nAnswer:\n{}",
                sample.question, sample.answer
            ),
        }
    }
}

#[async_trait]
impl Evaluator for LlmJudge {
    async fn score(&self, sample: &EvalSample) -> Result<BTreeMap<Metric, f32>> {
        let mut scores = BTreeMap::new();

        for metric in self.metrics(sample) {
            let reply = self
                .llm
                .complete(&[
                    ChatMessage::system(JUDGE_SYSTEM_PROMPT),
                    ChatMessage::user(Self::prompt(metric, sample)),
                ])
                .await
                .with_context(|| format!("Judge call failed for {}", metric.as_str()))?;

            let score = parse_score(&reply).ok_or_else(|| {
                anyhow::anyhow!("Judge returned no score for {}: {}", metric.as_str(), reply)
            })?;
            scores.insert(metric, score);
        }

        Ok(scores)
    }
}

// ============================================================================
// EvaluationHarness
// ============================================================================

/// 배치 평가 실행기
pub struct EvaluationHarness {
    evaluator: Arc<dyn Evaluator>,
}

impl EvaluationHarness {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }

    /// 항목을 순서대로 평가
    ///
    /// 각 질문 전에 대화 메모리를 비웁니다. 검색 결과가 없는 질문은 건너뛰고,
    /// 질문별 에러는 기록만 하고 다음 질문으로 넘어갑니다.
    pub async fn run(&self, chain: &mut RagChain, items: &[EvalItem]) -> EvalReport {
        let started_at = Utc::now();
        let mut records = Vec::new();

        for (i, item) in items.iter().enumerate() {
            tracing::info!("Evaluating question {}/{}: {}", i + 1, items.len(), item.question);
            chain.clear_memory();

            match self.evaluate_one(chain, item).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::warn!("No retrieved documents for: {}", item.question),
                Err(e) => tracing::warn!("Error evaluating \"{}\": {:#}", item.question, e),
            }
        }

        EvalReport {
            run_id: Uuid::new_v4(),
            started_at,
            records,
        }
    }

    async fn evaluate_one(&self, chain: &mut RagChain, item: &EvalItem) -> Result<Option<EvalRecord>> {
        let output = chain.invoke(&item.question).await?;
        if output.source_documents.is_empty() {
            return Ok(None);
        }

        let sample = EvalSample {
            question: item.question.clone(),
            answer: output.answer,
            contexts: output
                .source_documents
                .into_iter()
                .map(|d| d.page_content)
                .collect(),
            reference: item.reference.clone(),
        };

        let metrics = self.evaluator.score(&sample).await?;

        Ok(Some(EvalRecord {
            question: sample.question,
            answer: sample.answer,
            metrics,
            reference: sample.reference,
            contexts: sample.contexts,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
