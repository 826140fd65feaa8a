//! 임베딩 모듈 - 호스팅 임베딩 API를 통한 텍스트 벡터화
//!
//! 문서(passage)와 질의(query)에 서로 다른 접두어를 붙여 임베딩하고,
//! 결과 벡터는 항상 L2 정규화(단위 길이)하여 반환합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HuggingFaceEmbedding::from_config(&config)?;
//! let vector = embedder.embed_query("What programs does Scaler offer?").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// 임베딩 차원 (bge-base 계열, 인덱스 설정과 일치해야 함)
pub const EMBEDDING_DIMENSION: usize = 768;

/// 문서 임베딩 접두어
pub const PASSAGE_PREFIX: &str = "passage: ";
/// 질의 임베딩 접두어
pub const QUERY_PREFIX: &str = "query: ";

/// 한 번의 API 호출에 보내는 최대 텍스트 수
const EMBED_BATCH_SIZE: usize = 32;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 구현체는 모델의 원시 출력(`embed_batch`)만 제공하면 되고,
/// 접두어 규칙과 정규화는 기본 메서드가 처리합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 원시 배치 임베딩 (접두어/정규화 없음)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;

    /// 문서 임베딩 (`passage: ` 접두어, 단위 벡터)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", PASSAGE_PREFIX, t))
            .collect();

        let raw = self.embed_batch(&prefixed).await?;
        if raw.len() != texts.len() {
            anyhow::bail!(
                "{} returned {} embeddings for {} texts",
                self.name(),
                raw.len(),
                texts.len()
            );
        }

        raw.into_iter()
            .map(|v| checked_unit_vector(v, self.dimension()))
            .collect()
    }

    /// 질의 임베딩 (`query: ` 접두어, 단위 벡터)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let raw = self
            .embed_batch(&[format!("{}{}", QUERY_PREFIX, text)])
            .await?;

        let vector = raw
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} returned no embedding for query", self.name()))?;

        checked_unit_vector(vector, self.dimension())
    }
}

/// 차원 확인 후 정규화
fn checked_unit_vector(mut vector: Vec<f32>, dimension: usize) -> Result<Vec<f32>> {
    if vector.len() != dimension {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            dimension,
            vector.len()
        );
    }
    if !l2_normalize(&mut vector) {
        anyhow::bail!("Embedding has zero norm and cannot be normalized");
    }
    Ok(vector)
}

/// 벡터를 제자리에서 L2 정규화
///
/// 노름이 0이면 벡터를 건드리지 않고 `false`를 반환합니다.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    true
}

// ============================================================================
// Hugging Face Inference Embedding
// ============================================================================

/// Hugging Face feature-extraction API 임베딩 구현체
///
/// `{base_url}/{model}/pipeline/feature-extraction` 엔드포인트를 사용합니다.
#[derive(Debug)]
pub struct HuggingFaceEmbedding {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

/// API 에러 응답 (`{"error": "..."}`)
#[derive(Debug, Deserialize)]
struct HfError {
    error: String,
}

impl HuggingFaceEmbedding {
    /// 새 임베딩 클라이언트 생성
    pub fn new(base_url: &str, model: &str, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = format!(
            "{}/{}/pipeline/feature-extraction",
            base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client,
            endpoint,
            token,
            model: model.to_string(),
            dimension: EMBEDDING_DIMENSION,
        })
    }

    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = Self::new(
            &config.embedding_base_url,
            &config.embedding_model,
            config.hf_api_token.clone(),
        )?;
        tracing::debug!("Using embedding endpoint {}", embedder.endpoint);
        Ok(embedder)
    }

    /// 엔드포인트 URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&FeatureExtractionRequest { inputs: texts })
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<HfError>(&body) {
                anyhow::bail!("Embedding API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        serde_json::from_str(&body).context("Failed to parse embedding response")
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(EMBED_BATCH_SIZE)
            );
            results.extend(self.request(batch).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
