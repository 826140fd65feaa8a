//! 콘텐츠 추출 모듈
//!
//! PDF 폴더 → PDF별 텍스트 파일 → 병합 코퍼스 → 정제 코퍼스 파이프라인입니다.
//! 스캔 문서 OCR은 지원하지 않습니다 (텍스트가 없으면 경고만 남김).

pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::collector::{CollectedFile, CollectionStats, FileCollector, FileType};
use crate::knowledge::clean_corpus_file;

/// PDF별 텍스트 파일 접미사
const TEXT_SUFFIX: &str = "_text.txt";

/// 추출 결과 요약
#[derive(Debug, Default)]
pub struct ExtractionSummary {
    /// 처리 대상 PDF 통계
    pub stats: CollectionStats,
    /// 성공한 PDF의 텍스트 파일
    pub written: Vec<PathBuf>,
    /// 실패한 PDF와 에러 메시지
    pub failed: Vec<(PathBuf, String)>,
}

/// 파이프라인 경로 설정
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub pdf_dir: PathBuf,
    pub text_dir: PathBuf,
    pub corpus: PathBuf,
    pub cleaned: PathBuf,
}

/// 파이프라인 결과
#[derive(Debug)]
pub struct PipelineReport {
    pub extraction: ExtractionSummary,
    pub merged_files: usize,
    pub cleaned_bytes: usize,
}

/// 폴더의 PDF 목록 (비재귀, 확장자 대소문자 무시, 이름순)
pub fn collect_pdfs(dir: &Path) -> Result<Vec<CollectedFile>> {
    FileCollector::new(FileType::Pdf).collect_directory(dir)
}

/// PDF 하나를 `<text_dir>/<name>_text.txt`로 추출
pub fn process_pdf_file(pdf: &CollectedFile, text_dir: &Path) -> Result<PathBuf> {
    let output = text_dir.join(format!("{}{}", pdf.stem(), TEXT_SUFFIX));

    // 이전 산출물 제거
    if output.exists() {
        std::fs::remove_file(&output)
            .with_context(|| format!("Failed to remove old output: {:?}", output))?;
        tracing::debug!("Deleted old file: {:?}", output);
    }

    let pages = pdf::extract_text_from_pdf(&pdf.path)?;
    std::fs::write(&output, pdf::format_pages(&pages))
        .with_context(|| format!("Failed to write text file: {:?}", output))?;

    tracing::info!("Extracted {} pages from {:?}", pages.len(), pdf.path);
    Ok(output)
}

/// 폴더의 모든 PDF 추출 (실패한 PDF는 기록 후 건너뜀)
pub fn process_all_pdfs(pdf_dir: &Path, text_dir: &Path) -> Result<ExtractionSummary> {
    std::fs::create_dir_all(text_dir)
        .with_context(|| format!("Failed to create text directory: {:?}", text_dir))?;

    let pdfs = collect_pdfs(pdf_dir)?;
    if pdfs.is_empty() {
        tracing::warn!("No PDF files found in {:?}", pdf_dir);
    }

    let mut summary = ExtractionSummary {
        stats: CollectionStats::from_files(&pdfs),
        ..ExtractionSummary::default()
    };
    for pdf in &pdfs {
        match process_pdf_file(pdf, text_dir) {
            Ok(path) => summary.written.push(path),
            Err(e) => {
                tracing::warn!("Failed to process {:?}: {:#}", pdf.path, e);
                summary.failed.push((pdf.path.clone(), format!("{:#}", e)));
            }
        }
    }

    Ok(summary)
}

/// 텍스트 폴더의 `*.txt`를 이름순으로 `\n` 연결하여 저장
pub fn merge_all_texts(text_dir: &Path, output: &Path) -> Result<usize> {
    let files = FileCollector::new(FileType::Text).collect_directory(text_dir)?;

    let mut parts = Vec::with_capacity(files.len());
    for file in &files {
        parts.push(
            std::fs::read_to_string(&file.path)
                .with_context(|| format!("Failed to read text file: {:?}", file.path))?,
        );
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }

    std::fs::write(output, parts.join("\n"))
        .with_context(|| format!("Failed to write corpus: {:?}", output))?;

    tracing::info!("Merged {} text files into {:?}", files.len(), output);
    Ok(files.len())
}

/// 추출 → 병합 → 정제
pub fn run_pipeline(paths: &PipelinePaths) -> Result<PipelineReport> {
    let extraction = process_all_pdfs(&paths.pdf_dir, &paths.text_dir)?;
    let merged_files = merge_all_texts(&paths.text_dir, &paths.corpus)?;
    let cleaned_bytes = clean_corpus_file(&paths.corpus, &paths.cleaned)?;

    Ok(PipelineReport {
        extraction,
        merged_files,
        cleaned_bytes,
    })
}

// ============================================================================
// Tests
// ============================================================================
