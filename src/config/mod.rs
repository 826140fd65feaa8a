//! 설정 모듈
//!
//! 프로세스 시작 시 환경변수(.env 포함)에서 한 번 읽어 만드는 불변 설정입니다.
//! 각 컴포넌트는 생성자에서 `&Config`를 받아 필요한 값만 꺼내 씁니다.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-base-en-v1.5";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";
pub const DEFAULT_PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";
pub const DEFAULT_RETRIEVAL_K: usize = 5;
pub const DEFAULT_MEMORY_WINDOW: usize = 4;

// ============================================================================
// Errors
// ============================================================================

/// 설정 오류 (시작 시점 치명적 오류)
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ============================================================================
// Enums
// ============================================================================

/// 벡터 인덱스 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    /// Pinecone 관리형 인덱스
    Pinecone,
    /// 로컬 LanceDB 테이블
    Lance,
}

impl FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "lance" | "lancedb" => Ok(Self::Lance),
            other => Err(format!("unknown backend `{}` (expected pinecone or lance)", other)),
        }
    }
}

/// 대화 메모리 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStrategy {
    /// 전체 대화를 그대로 유지
    Buffer,
    /// 요약 + 최근 N개 메시지 윈도우
    Hybrid,
}

impl FromStr for MemoryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffer" => Ok(Self::Buffer),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown strategy `{}` (expected hybrid or buffer)", other)),
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Pinecone 접속 설정
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    /// 데이터 플레인 호스트 (없으면 컨트롤 플레인에서 조회)
    pub host: Option<String>,
    pub control_url: String,
}

/// 애플리케이션 설정 (시작 후 불변)
#[derive(Debug, Clone)]
pub struct Config {
    pub groq_api_key: String,
    pub llm_model: String,
    pub groq_base_url: String,
    pub llm_temperature: f32,

    pub hf_api_token: String,
    pub embedding_model: String,
    pub embedding_base_url: String,

    pub backend: VectorBackend,
    pub pinecone: Option<PineconeConfig>,
    pub lance_path: PathBuf,

    pub retrieval_k: usize,
    pub memory_window: usize,
    pub memory_strategy: MemoryStrategy,
}

impl Config {
    /// `.env` 파일과 프로세스 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 키 조회 함수로 설정 구성
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let backend: VectorBackend = parse_or(&get, "VECTOR_BACKEND", VectorBackend::Pinecone)?;

        let pinecone = match backend {
            VectorBackend::Pinecone => Some(PineconeConfig {
                api_key: require("PINECONE_API_KEY")?,
                index_name: require("PINECONE_INDEX_NAME")?,
                host: get("PINECONE_HOST"),
                control_url: endpoint_or(&get, "PINECONE_CONTROL_URL", DEFAULT_PINECONE_CONTROL_URL)?,
            }),
            VectorBackend::Lance => None,
        };

        let hf_api_token = get("HF_API_TOKEN")
            .or_else(|| get("HF_HUB_TOKEN"))
            .ok_or(ConfigError::Missing("HF_API_TOKEN"))?;

        let retrieval_k = parse_or(&get, "RETRIEVAL_K", DEFAULT_RETRIEVAL_K)?;
        if retrieval_k == 0 {
            return Err(invalid("RETRIEVAL_K", "0", "must be greater than zero"));
        }

        let memory_window = parse_or(&get, "MEMORY_WINDOW", DEFAULT_MEMORY_WINDOW)?;
        if memory_window == 0 {
            return Err(invalid("MEMORY_WINDOW", "0", "must be greater than zero"));
        }

        let llm_temperature: f32 = parse_or(&get, "LLM_TEMPERATURE", 0.0)?;
        if !(0.0..=2.0).contains(&llm_temperature) {
            return Err(invalid(
                "LLM_TEMPERATURE",
                &llm_temperature.to_string(),
                "must be within 0.0..=2.0",
            ));
        }

        Ok(Self {
            groq_api_key: require("GROQ_API_KEY")?,
            llm_model: require("INFER_MODEL_NAME")?,
            groq_base_url: endpoint_or(&get, "GROQ_BASE_URL", DEFAULT_GROQ_BASE_URL)?,
            llm_temperature,
            hf_api_token,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_base_url: endpoint_or(&get, "EMBEDDING_BASE_URL", DEFAULT_EMBEDDING_BASE_URL)?,
            backend,
            pinecone,
            lance_path: get("LANCE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| get_data_dir().join("vectors.lance")),
            retrieval_k,
            memory_window,
            memory_strategy: parse_or(&get, "MEMORY_STRATEGY", MemoryStrategy::Hybrid)?,
        })
    }

    /// API 키를 가린 설정 요약 (status 명령어용)
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("LLM model", self.llm_model.clone()),
            ("LLM endpoint", self.groq_base_url.clone()),
            ("Embedding model", self.embedding_model.clone()),
            ("Vector backend", format!("{:?}", self.backend)),
            ("Retrieval k", self.retrieval_k.to_string()),
            ("Memory", format!("{:?} (window {})", self.memory_strategy, self.memory_window)),
        ];

        match (&self.backend, &self.pinecone) {
            (VectorBackend::Pinecone, Some(pc)) => {
                lines.push(("Pinecone index", pc.index_name.clone()));
                lines.push(("Pinecone key", mask_secret(&pc.api_key)));
            }
            _ => lines.push(("Lance path", self.lance_path.display().to_string())),
        }

        lines.push(("Groq key", mask_secret(&self.groq_api_key)));
        lines.push(("HF token", mask_secret(&self.hf_api_token)));
        lines
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 데이터 디렉토리 경로 (~/.scaler-assist/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scaler-assist")
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}

/// HTTP(S) 엔드포인트 검증 (끝의 `/` 제거)
fn endpoint_or<G>(get: &G, key: &'static str, default: &str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(key, &raw, &e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(key, &raw, "expected an http or https URL"));
    }

    Ok(raw.trim().trim_end_matches('/').to_string())
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// 비밀값 마스킹 (앞 4자만 표시)
fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("GROQ_API_KEY", "gsk_test"),
            ("INFER_MODEL_NAME", "llama-3.1-8b-instant"),
            ("HF_API_TOKEN", "hf_test"),
            ("PINECONE_API_KEY", "pc_test"),
            ("PINECONE_INDEX_NAME", "scaler-assist"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.retrieval_k, 5);
        assert_eq!(config.memory_window, 4);
        assert_eq!(config.memory_strategy, MemoryStrategy::Hybrid);
        assert_eq!(config.backend, VectorBackend::Pinecone);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        let pc = config.pinecone.unwrap();
        assert_eq!(pc.index_name, "scaler-assist");
        assert!(pc.host.is_none());
    }

    #[test]
    fn test_missing_llm_key() {
        let mut env = base_env();
        env.remove("GROQ_API_KEY");
        assert_eq!(load(&env).unwrap_err(), ConfigError::Missing("GROQ_API_KEY"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("PINECONE_INDEX_NAME", "  ");
        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing("PINECONE_INDEX_NAME")
        );
    }

    #[test]
    fn test_lance_backend_skips_pinecone_keys() {
        let mut env = base_env();
        env.remove("PINECONE_API_KEY");
        env.remove("PINECONE_INDEX_NAME");
        env.insert("VECTOR_BACKEND", "lance");
        env.insert("LANCE_PATH", "/tmp/chunks.lance");

        let config = load(&env).unwrap();
        assert_eq!(config.backend, VectorBackend::Lance);
        assert!(config.pinecone.is_none());
        assert_eq!(config.lance_path, PathBuf::from("/tmp/chunks.lance"));
    }

    #[test]
    fn test_hf_hub_token_alias() {
        let mut env = base_env();
        env.remove("HF_API_TOKEN");
        env.insert("HF_HUB_TOKEN", "hf_alias");
        assert_eq!(load(&env).unwrap().hf_api_token, "hf_alias");
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut env = base_env();
        env.insert("RETRIEVAL_K", "0");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "RETRIEVAL_K", .. })
        ));
    }

    #[test]
    fn test_unparsable_window_rejected() {
        let mut env = base_env();
        env.insert("MEMORY_WINDOW", "four");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "MEMORY_WINDOW", .. })
        ));
    }

    #[test]
    fn test_endpoint_validation() {
        let mut env = base_env();
        env.insert("GROQ_BASE_URL", "http://localhost:8080/v1/");
        assert_eq!(load(&env).unwrap().groq_base_url, "http://localhost:8080/v1");

        env.insert("GROQ_BASE_URL", "not a url");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "GROQ_BASE_URL", .. })
        ));

        env.remove("GROQ_BASE_URL");
        env.insert("EMBEDDING_BASE_URL", "ftp://models.example.com");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "EMBEDDING_BASE_URL", .. })
        ));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Buffer".parse::<MemoryStrategy>(), Ok(MemoryStrategy::Buffer));
        assert!("window".parse::<MemoryStrategy>().is_err());
        assert_eq!("lancedb".parse::<VectorBackend>(), Ok(VectorBackend::Lance));
    }

    #[test]
    fn test_summary_masks_secrets() {
        let config = load(&base_env()).unwrap();
        let summary = config.summary();
        assert!(summary.iter().all(|(_, v)| !v.contains("gsk_test")));
        assert!(summary.iter().any(|(k, v)| *k == "Groq key" && v == "gsk_****"));
    }
}
