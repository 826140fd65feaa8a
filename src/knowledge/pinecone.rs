//! Pinecone Vector Index - 관리형 벡터 DB REST 클라이언트
//!
//! - `PineconeIndex`: 데이터 플레인 (upsert / query / describe_index_stats)
//! - `PineconeAdmin`: 컨트롤 플레인 (인덱스 조회 / 생성 / 준비 대기)
//!
//! 모든 요청은 `Api-Key` 헤더로 인증합니다. 재시도는 하지 않습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PineconeConfig;
use crate::embedding::EMBEDDING_DIMENSION;

use super::index::{IndexMatch, IndexRecord, VectorIndex};

/// 업서트 요청 하나에 담는 최대 레코드 수
const UPSERT_BATCH_SIZE: usize = 100;
const API_VERSION: &str = "2024-07";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 서버리스 인덱스 기본 배치 위치
const SERVERLESS_CLOUD: &str = "aws";
const SERVERLESS_REGION: &str = "us-east-1";

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// 스킴 없는 호스트에 https:// 붙이기
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// 실패 응답을 에러로 변환
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Pinecone {} failed ({}): {}", what, status, body)
}

// ============================================================================
// Data Plane
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

/// Pinecone 데이터 플레인 클라이언트
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    index_name: String,
}

impl PineconeIndex {
    /// 데이터 플레인 호스트로 생성
    pub fn new(host: &str, api_key: String, index_name: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            host: normalize_host(host),
            api_key,
            index_name,
        })
    }

    /// 설정에서 생성 (호스트가 없으면 컨트롤 플레인에서 조회)
    pub async fn connect(config: &PineconeConfig) -> Result<Self> {
        let host = match &config.host {
            Some(host) => host.clone(),
            None => {
                PineconeAdmin::from_config(config)?
                    .resolve_host(&config.index_name)
                    .await?
            }
        };

        tracing::debug!("Pinecone index {} at {}", config.index_name, host);
        Self::new(&host, config.api_key.clone(), config.index_name.clone())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut total = 0;

        for (i, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Upserting batch {}/{} ({} vectors)",
                i + 1,
                records.len().div_ceil(UPSERT_BATCH_SIZE),
                batch.len()
            );

            let response = self
                .post("/vectors/upsert")
                .json(&UpsertRequest { vectors: batch })
                .send()
                .await
                .context("Failed to send upsert request")?;

            let parsed: UpsertResponse = check_status(response, "upsert")
                .await?
                .json()
                .await
                .context("Failed to parse upsert response")?;

            total += parsed.upserted_count;
        }

        Ok(total)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .post("/query")
            .json(&request)
            .send()
            .await
            .context("Failed to send query request")?;

        let parsed: QueryResponse = check_status(response, "query")
            .await?
            .json()
            .await
            .context("Failed to parse query response")?;

        Ok(parsed.matches)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .post("/describe_index_stats")
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to send describe_index_stats request")?;

        let stats: IndexStats = check_status(response, "describe_index_stats")
            .await?
            .json()
            .await
            .context("Failed to parse index stats")?;

        Ok(stats.total_vector_count)
    }

    fn name(&self) -> &str {
        &self.index_name
    }
}

// ============================================================================
// Control Plane
// ============================================================================

/// 인덱스 상태
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

/// 인덱스 설명 (`GET /indexes/{name}`)
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: serde_json::Value,
}

/// Pinecone 컨트롤 플레인 클라이언트
pub struct PineconeAdmin {
    client: reqwest::Client,
    control_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: usize,
}

impl PineconeAdmin {
    pub fn new(control_url: &str, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            control_url: normalize_host(control_url),
            api_key,
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
        })
    }

    pub fn from_config(config: &PineconeConfig) -> Result<Self> {
        Self::new(&config.control_url, config.api_key.clone())
    }

    /// 준비 대기 폴링 간격/횟수 지정
    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.control_url, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    /// 인덱스 조회 (없으면 None)
    pub async fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/indexes/{}", name))
            .send()
            .await
            .context("Failed to send describe_index request")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let description = check_status(response, "describe_index")
            .await?
            .json()
            .await
            .context("Failed to parse index description")?;

        Ok(Some(description))
    }

    /// 서버리스 인덱스 생성 요청 (768차원, cosine)
    pub async fn create(&self, name: &str) -> Result<()> {
        let request = CreateIndexRequest {
            name,
            dimension: EMBEDDING_DIMENSION,
            metric: "cosine",
            spec: serde_json::json!({
                "serverless": { "cloud": SERVERLESS_CLOUD, "region": SERVERLESS_REGION }
            }),
        };

        let response = self
            .request(reqwest::Method::POST, "/indexes")
            .json(&request)
            .send()
            .await
            .context("Failed to send create_index request")?;

        check_status(response, "create_index").await?;
        Ok(())
    }

    /// 인덱스가 준비될 때까지 폴링
    pub async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        for attempt in 1..=self.max_polls {
            match self.describe(name).await? {
                Some(description) if description.status.ready => return Ok(description),
                Some(description) => tracing::info!(
                    "Index {} is still being created ({}), waiting... [{}/{}]",
                    name,
                    description.status.state,
                    attempt,
                    self.max_polls
                ),
                None => tracing::info!("Index {} not visible yet, waiting...", name),
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        anyhow::bail!("Index {} did not become ready in time", name)
    }

    /// 인덱스가 없으면 생성 후 준비 대기
    ///
    /// 반환값의 `bool`은 새로 생성했는지 여부입니다.
    pub async fn ensure_index(&self, name: &str) -> Result<(IndexDescription, bool)> {
        if let Some(existing) = self.describe(name).await? {
            tracing::info!("Index {} already exists", name);
            if existing.status.ready {
                return Ok((existing, false));
            }
            return Ok((self.wait_until_ready(name).await?, false));
        }

        tracing::info!("Creating index {}...", name);
        self.create(name).await?;
        let description = self.wait_until_ready(name).await?;
        tracing::info!("Index {} is ready", name);
        Ok((description, true))
    }

    /// 데이터 플레인 호스트 조회
    pub async fn resolve_host(&self, name: &str) -> Result<String> {
        let description = self
            .describe(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pinecone index {} does not exist", name))?;

        if description.host.is_empty() {
            anyhow::bail!("Pinecone index {} has no host yet", name);
        }
        Ok(normalize_host(&description.host))
    }
}

// ============================================================================
// Tests
// ============================================================================
