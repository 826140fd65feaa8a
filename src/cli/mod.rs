//! CLI 모듈
//!
//! scaler-assist CLI 명령어 정의 및 구현

mod chat;

pub use chat::{run_loop, ChatSession};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::chain::RagChain;
use crate::config::{Config, VectorBackend};
use crate::embedding::{EmbeddingProvider, HuggingFaceEmbedding};
use crate::eval::{self, EvalItem, EvaluationHarness, LlmJudge};
use crate::extractor::{self, PipelinePaths};
use crate::knowledge::{
    self, clean_corpus_file, ingest_chunks, ChunkConfig, Chunker, PineconeAdmin,
    RecursiveCharacterSplitter, Retriever, SemanticSplitter, VectorIndex,
};
use crate::llm::{ChatModel, GroqChat};
use crate::memory::ChatMemory;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "scaler-assist")]
#[command(version, about = "Scaler Academy 문서 기반 대화형 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 청킹 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitterKind {
    /// 구분자 기반 재귀 분할
    Recursive,
    /// 임베딩 거리 기반 의미 분할
    Semantic,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 추출 → 병합 → 정제 파이프라인
    Extract {
        /// PDF 폴더
        #[arg(long, default_value = "Context/PDFs")]
        pdf_dir: PathBuf,

        /// PDF별 텍스트 출력 폴더
        #[arg(long, default_value = "Context/Text")]
        text_dir: PathBuf,

        /// 병합 코퍼스 경로
        #[arg(long, default_value = "Context/extracted_corpus.txt")]
        corpus: PathBuf,

        /// 정제 코퍼스 경로
        #[arg(long, default_value = "Context/cleaned_text.txt")]
        cleaned: PathBuf,
    },

    /// 코퍼스 파일 정제
    Clean {
        input: PathBuf,
        output: PathBuf,
    },

    /// Pinecone 인덱스 생성 (없을 때만)
    CreateIndex,

    /// 정제 코퍼스를 청킹/임베딩하여 인덱스에 업서트
    Ingest {
        /// 정제 코퍼스 경로
        corpus: PathBuf,

        #[arg(long, value_enum, default_value_t = SplitterKind::Recursive)]
        splitter: SplitterKind,

        /// 최대 청크 크기 (문자)
        #[arg(long, default_value = "300")]
        chunk_size: usize,

        /// 청크 오버랩 (문자)
        #[arg(long, default_value = "50")]
        chunk_overlap: usize,
    },

    /// 단발 질문
    Ask {
        question: String,

        /// 검색 문서 수 (기본: RETRIEVAL_K)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 대화형 채팅
    Chat,

    /// 배치 평가
    Eval {
        /// 단일 질문 (지정하면 다른 입력은 무시)
        question: Option<String>,

        /// 질문 파일 (한 줄에 하나)
        #[arg(long)]
        questions: Option<PathBuf>,

        /// 참조 답변 데이터셋 JSON
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// 기본 참조 데이터셋 사용
        #[arg(long)]
        with_reference: bool,

        /// helpfulness 기준 평가 추가
        #[arg(long)]
        criteria: bool,

        /// 결과 JSON 저장 경로
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract {
            pdf_dir,
            text_dir,
            corpus,
            cleaned,
        } => cmd_extract(PipelinePaths {
            pdf_dir,
            text_dir,
            corpus,
            cleaned,
        }),
        Commands::Clean { input, output } => cmd_clean(&input, &output),
        Commands::CreateIndex => cmd_create_index(&load_config()?).await,
        Commands::Ingest {
            corpus,
            splitter,
            chunk_size,
            chunk_overlap,
        } => {
            let config = ChunkConfig {
                chunk_size,
                chunk_overlap,
            };
            cmd_ingest(&load_config()?, &corpus, splitter, config).await
        }
        Commands::Ask { question, k } => cmd_ask(&load_config()?, &question, k).await,
        Commands::Chat => {
            let config = load_config()?;
            let chain = build_chain(&config, config.retrieval_k).await?;
            run_loop(ChatSession::new(chain)).await
        }
        Commands::Eval {
            question,
            questions,
            dataset,
            with_reference,
            criteria,
            output,
        } => {
            let items = eval_items(question, questions, dataset, with_reference)?;
            cmd_eval(&load_config()?, &items, criteria, output).await
        }
        Commands::Status => cmd_status().await,
    }
}

fn load_config() -> Result<Config> {
    Config::from_env().context("설정 로드 실패 (.env 또는 환경변수를 확인하세요)")
}

// ============================================================================
// Component Wiring
// ============================================================================

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(
        HuggingFaceEmbedding::from_config(config).context("임베딩 클라이언트 생성 실패")?,
    ))
}

fn build_llm(config: &Config) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(
        GroqChat::from_config(config).context("LLM 클라이언트 생성 실패")?,
    ))
}

/// 설정으로 RAG 체인 조립
async fn build_chain(config: &Config, k: usize) -> Result<RagChain> {
    let embedder = build_embedder(config)?;
    let index = knowledge::open_index(config)
        .await
        .context("벡터 인덱스 열기 실패")?;
    let llm = build_llm(config)?;

    let retriever = Retriever::new(embedder, index, k)?;
    let memory = ChatMemory::from_strategy(config.memory_strategy, llm.clone(), config.memory_window)?;

    Ok(RagChain::new(llm, retriever, memory))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 추출 파이프라인 명령어 (extract)
fn cmd_extract(paths: PipelinePaths) -> Result<()> {
    println!("[*] PDF 처리 중: {}", paths.pdf_dir.display());
    let report = extractor::run_pipeline(&paths)?;

    let stats = &report.extraction.stats;
    println!(
        "[*] PDF {} 개 ({})",
        stats.pdf_files,
        format_bytes(stats.total_size as usize)
    );

    for (path, error) in &report.extraction.failed {
        println!("[!] 실패: {} ({})", path.display(), truncate_text(error, 120));
    }
    println!(
        "[OK] 추출 {} 건, 실패 {} 건, 병합 {} 파일",
        report.extraction.written.len(),
        report.extraction.failed.len(),
        report.merged_files
    );
    println!(
        "     정제 코퍼스: {} ({})",
        paths.cleaned.display(),
        format_bytes(report.cleaned_bytes)
    );

    Ok(())
}

/// 정제 명령어 (clean)
fn cmd_clean(input: &std::path::Path, output: &std::path::Path) -> Result<()> {
    let written = clean_corpus_file(input, output)?;
    println!("[OK] 정제 완료: {} ({})", output.display(), format_bytes(written));
    Ok(())
}

/// 인덱스 생성 명령어 (create-index)
async fn cmd_create_index(config: &Config) -> Result<()> {
    let pinecone = config
        .pinecone
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("VECTOR_BACKEND=pinecone 일 때만 사용할 수 있습니다"))?;

    println!("[*] 인덱스 확인 중: {}", pinecone.index_name);
    let admin = PineconeAdmin::from_config(pinecone)?;
    let (description, created) = admin.ensure_index(&pinecone.index_name).await?;

    if created {
        println!("[OK] 인덱스 생성 완료: {}", description.name);
    } else {
        println!("[OK] 인덱스가 이미 존재합니다: {}", description.name);
    }
    println!("     호스트: {}", description.host);

    Ok(())
}

/// 수집 명령어 (ingest)
async fn cmd_ingest(
    config: &Config,
    corpus: &std::path::Path,
    splitter: SplitterKind,
    chunk_config: ChunkConfig,
) -> Result<()> {
    let text = std::fs::read_to_string(corpus)
        .with_context(|| format!("코퍼스 읽기 실패: {:?}", corpus))?;

    let embedder = build_embedder(config)?;

    println!("[*] 청킹 중 ({:?})...", splitter);
    let chunks = match splitter {
        SplitterKind::Recursive => RecursiveCharacterSplitter::new(chunk_config)?.chunk(&text),
        SplitterKind::Semantic => SemanticSplitter::new(embedder.clone()).chunk(&text).await?,
    };

    if chunks.is_empty() {
        println!("[!] 코퍼스가 비어 있습니다.");
        return Ok(());
    }
    println!("[*] 청크 {} 개 임베딩 및 업서트 중...", chunks.len());

    let index = knowledge::open_index(config)
        .await
        .context("벡터 인덱스 열기 실패")?;
    let upserted = ingest_chunks(&chunks, embedder.as_ref(), index.as_ref()).await?;

    println!("[OK] {} 벡터 업서트 완료 ({})", upserted, index.name());
    Ok(())
}

/// 단발 질문 명령어 (ask)
async fn cmd_ask(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    let mut chain = build_chain(config, k.unwrap_or(config.retrieval_k)).await?;

    println!("[*] 질문: \"{}\"", question);
    let output = chain.invoke(question).await.context("답변 생성 실패")?;

    println!("\n{}\n", output.answer);

    if !output.source_documents.is_empty() {
        println!("[OK] 참고 문서 ({} 건):", output.source_documents.len());
        for (i, doc) in output.source_documents.iter().enumerate() {
            println!(
                "{}. [점수: {:.4}] {}",
                i + 1,
                doc.score,
                truncate_text(&doc.page_content, 200)
            );
        }
    }

    Ok(())
}

/// 평가 항목 결정 (단일 질문 > 데이터셋 > 질문 파일 > 기본 세트)
fn eval_items(
    question: Option<String>,
    questions: Option<PathBuf>,
    dataset: Option<PathBuf>,
    with_reference: bool,
) -> Result<Vec<EvalItem>> {
    if let Some(question) = question {
        return Ok(vec![EvalItem::question(question)]);
    }
    if let Some(path) = dataset {
        return eval::load_dataset(&path);
    }
    if let Some(path) = questions {
        return eval::load_questions(&path);
    }
    Ok(if with_reference {
        eval::default_reference_set()
    } else {
        eval::default_questions()
    })
}

/// 평가 명령어 (eval)
async fn cmd_eval(
    config: &Config,
    items: &[EvalItem],
    criteria: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut chain = build_chain(config, config.retrieval_k).await?;
    let judge = Arc::new(
        LlmJudge::new(Arc::new(GroqChat::from_config(config)?.with_temperature(0.0)))
            .with_criteria(criteria),
    );

    println!("[*] 평가 시작: {} 개 질문", items.len());
    let report = EvaluationHarness::new(judge).run(&mut chain, items).await;

    for record in &report.records {
        println!("\n질문: {}", record.question);
        println!("답변: {}", truncate_text(&record.answer, 100));
        for (metric, score) in &record.metrics {
            println!("  {:<18} {:.3}", metric.as_str(), score);
        }
    }

    println!(
        "\n[OK] 평가 완료: {}/{} 건 (run {})",
        report.records.len(),
        items.len(),
        report.run_id
    );
    for (metric, average) in report.averages() {
        println!("     평균 {:<18} {:.3}", metric.as_str(), average);
    }

    if let Some(path) = output {
        eval::save_report(&report, &path)?;
        println!("[OK] 결과 저장: {}", path.display());
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정 요약과 벡터 인덱스 상태를 확인합니다.
async fn cmd_status() -> Result<()> {
    println!("scaler-assist v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("[!] 설정 오류: {}", e);
            return Ok(());
        }
    };

    for (key, value) in config.summary() {
        println!("[*] {:<20} {}", key, value);
    }

    match knowledge::open_index(&config).await {
        Ok(index) => match index.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스 ({}): {} 청크", index.name(), count),
            Err(e) => println!("[!] 벡터 개수 조회 실패: {}", e),
        },
        Err(e) => {
            println!("[!] 벡터 인덱스 열기 실패: {:#}", e);
            if config.backend == VectorBackend::Pinecone {
                println!("    인덱스가 없다면: scaler-assist create-index");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
