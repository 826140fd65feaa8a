//! 인제스트 → 검색 → 답변 → 평가 전체 흐름 통합 테스트

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use common::{HashingEmbedder, MemoryIndex, ScriptedLlm};
use scaler_assist::eval::{EvalItem, EvalSample, EvaluationHarness, Evaluator, Metric};
use scaler_assist::knowledge::{build_chunks, ingest_chunks};
use scaler_assist::{
    ChatMemory, ChunkConfig, Chunker, EmbeddingProvider, MemoryStrategy, RagChain,
    RecursiveCharacterSplitter, Retriever, VectorIndex, REFUSAL_ANSWER,
};

const CORPUS: &str = "Scaler Academy offers a Data Science program.\n\n\
Placement support includes mock interviews with industry mentors.\n\n\
The admission process starts with the Scaler Entrance Test of sixteen questions.\n\n\
Learners attend live classes on weekday evenings and weekends.";

async fn populated_index(embedder: &HashingEmbedder) -> Arc<MemoryIndex> {
    let index = Arc::new(MemoryIndex::default());
    let splitter = RecursiveCharacterSplitter::new(ChunkConfig {
        chunk_size: 100,
        chunk_overlap: 0,
    })
    .unwrap();
    let chunks = splitter.chunk(CORPUS);
    ingest_chunks(&chunks, embedder, index.as_ref()).await.unwrap();
    index
}

fn chain_with(
    llm: Arc<ScriptedLlm>,
    index: Arc<MemoryIndex>,
    strategy: MemoryStrategy,
    k: usize,
) -> RagChain {
    let retriever = Retriever::new(Arc::new(HashingEmbedder), index, k).unwrap();
    let memory = ChatMemory::from_strategy(strategy, llm.clone(), 4).unwrap();
    RagChain::new(llm, retriever, memory)
}

#[tokio::test]
async fn test_ingest_assigns_sequential_ids() {
    let embedder = HashingEmbedder;
    let index = populated_index(&embedder).await;
    // 문단마다 하나씩
    assert_eq!(index.count().await.unwrap(), 4);

    let chunks = build_chunks(vec!["one".into(), "two".into(), "three".into()]);
    let fresh = MemoryIndex::default();
    assert_eq!(ingest_chunks(&chunks, &embedder, &fresh).await.unwrap(), 3);
    assert_eq!(fresh.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_scaler_program_question_is_answered() {
    let embedder = HashingEmbedder;
    let index = Arc::new(MemoryIndex::default());
    let chunks = build_chunks(vec![
        "Scaler Academy offers a Data Science program".into(),
        "Placement support includes mock interviews".into(),
        "Classes run on weekday evenings".into(),
    ]);
    ingest_chunks(&chunks, &embedder, index.as_ref()).await.unwrap();

    let retriever = Retriever::new(Arc::new(HashingEmbedder), index.clone(), 2).unwrap();
    let docs = retriever.retrieve("What programs does Scaler offer?").await.unwrap();
    assert!(docs
        .iter()
        .any(|d| d.page_content == "Scaler Academy offers a Data Science program"));

    let llm = Arc::new(ScriptedLlm::answering("Scaler offers a Data Science program."));
    let mut chain = chain_with(llm, index, MemoryStrategy::Hybrid, 2);
    let output = chain.invoke("What programs does Scaler offer?").await.unwrap();

    assert_ne!(output.answer, REFUSAL_ANSWER);
    assert_eq!(
        output.source_documents[0].page_content,
        "Scaler Academy offers a Data Science program"
    );
}

#[tokio::test]
async fn test_empty_index_returns_refusal() {
    let index = Arc::new(MemoryIndex::default());
    let llm = Arc::new(ScriptedLlm::answering("should not be used"));
    let mut chain = chain_with(llm.clone(), index, MemoryStrategy::Hybrid, 5);

    let output = chain.invoke("What programs does Scaler offer?").await.unwrap();
    assert!(output.source_documents.is_empty());
    assert_eq!(output.answer, "I'm sorry, I couldn't find that information.");
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_retrieve_at_most_k_non_empty() {
    let embedder = HashingEmbedder;
    let index = Arc::new(MemoryIndex::default());
    let texts: Vec<String> = (0..12)
        .map(|i| format!("Scaler cohort {} covers data structures and system design", i))
        .collect();
    ingest_chunks(&build_chunks(texts), &embedder, index.as_ref())
        .await
        .unwrap();

    let retriever = Retriever::new(Arc::new(HashingEmbedder), index, 3).unwrap();
    for query in ["Scaler cohort", "system design", "data structures", "unrelated words"] {
        for k in [1, 3, 5] {
            let docs = retriever.retrieve_k(query, k).await.unwrap();
            assert!(docs.len() <= k);
            assert!(docs.iter().all(|d| !d.page_content.trim().is_empty()));
        }
    }
}

#[tokio::test]
async fn test_embeddings_are_unit_length() {
    let embedder = HashingEmbedder;
    let docs = embedder
        .embed_documents(&["Scaler Academy".to_string(), "x".to_string()])
        .await
        .unwrap();
    let query = embedder.embed_query("What is the fee?").await.unwrap();

    for v in docs.iter().chain(std::iter::once(&query)) {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}

#[tokio::test]
async fn test_follow_up_uses_summary_and_window() {
    let embedder = HashingEmbedder;
    let index = populated_index(&embedder).await;

    // 첫 질문: 답변만. 두 번째: 요약, 재작성, 답변
    let llm = Arc::new(
        ScriptedLlm::answering("unused").with_replies(&[
            "Scaler offers a Data Science program.",
            "User asked about Scaler programs.",
            "How do admissions work for the Scaler Data Science program?",
            "Admission starts with the Scaler Entrance Test.",
        ]),
    );
    let mut chain = chain_with(llm.clone(), index, MemoryStrategy::Hybrid, 2);

    chain.invoke("What programs does Scaler offer?").await.unwrap();
    let output = chain.invoke("How do I get in?").await.unwrap();

    assert_eq!(
        output.standalone_question,
        "How do admissions work for the Scaler Data Science program?"
    );
    assert_eq!(output.answer, "Admission starts with the Scaler Entrance Test.");

    let calls = llm.calls();
    assert_eq!(calls.len(), 4);
    // 답변 프롬프트: QA 시스템, 요약, 윈도우 2개, 질문
    let answer_call = &calls[3];
    assert_eq!(answer_call.len(), 5);
    assert_eq!(
        answer_call[1].content,
        "Previous conversation summary: User asked about Scaler programs."
    );
    assert_eq!(answer_call[4].content, "How do I get in?");

    let stats = chain.memory_stats();
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.window_messages, 4);
    assert_eq!(stats.pending_messages, 2);
}

/// 모든 지표에 고정 점수를 주는 채점기
struct ConstantEvaluator;

#[async_trait]
impl Evaluator for ConstantEvaluator {
    async fn score(&self, sample: &EvalSample) -> Result<BTreeMap<Metric, f32>> {
        Ok(Metric::for_reference(sample.reference.is_some())
            .iter()
            .map(|m| (*m, 0.9))
            .collect())
    }
}

#[tokio::test]
async fn test_eval_skips_and_survives_failures() {
    let embedder = HashingEmbedder;
    let index = populated_index(&embedder).await;
    let llm = Arc::new(ScriptedLlm::answering("An answer from context.").failing_on("explode"));
    let mut chain = chain_with(llm, index, MemoryStrategy::Hybrid, 3);

    let items = vec![
        EvalItem::question("What programs does Scaler offer?"),
        // 코퍼스와 겹치는 단어 없음 -> 검색 결과 없음
        EvalItem::question("Zebra xylophone quantum?"),
        EvalItem::question("Scaler placement explode"),
        EvalItem::with_reference(
            "What are the admission requirements for Scaler?",
            "Candidates take the Scaler Entrance Test.",
        ),
    ];

    let report = EvaluationHarness::new(Arc::new(ConstantEvaluator))
        .run(&mut chain, &items)
        .await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].question, "What programs does Scaler offer?");
    assert_eq!(report.records[0].metrics.len(), 2);
    assert_eq!(report.records[1].metrics.len(), 4);
    assert_eq!(
        report.records[1].reference.as_deref(),
        Some("Candidates take the Scaler Entrance Test.")
    );
    assert!(!report.records[1].contexts.is_empty());

    // 질문마다 메모리를 비움
    assert_eq!(chain.memory_stats().total_messages, 2);
}

#[tokio::test]
async fn test_llm_failure_propagates_without_memory_update() {
    let embedder = HashingEmbedder;
    let index = populated_index(&embedder).await;
    let llm = Arc::new(ScriptedLlm::answering("ok").failing_on("explode"));
    let mut chain = chain_with(llm, index, MemoryStrategy::Buffer, 3);

    let err = chain.invoke("Scaler explode").await.unwrap_err();
    assert!(err.to_string().contains("upstream failure"));
    assert_eq!(chain.memory_stats().total_messages, 0);
}
