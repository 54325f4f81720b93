//! 설정 - 환경변수 + CLI 오버라이드
//!
//! 우선순위: CLI 인자 > 환경변수 > 기본값
//! `.env`는 `main`에서 로깅 초기화 전에 로드됩니다.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{RetryPolicy, DEFAULT_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS};

/// 원본 테이블 경로
pub const ENV_DATA_PATH: &str = "DATA_PATH";
/// 도면 이미지 디렉토리
pub const ENV_BLUEPRINT_DIR: &str = "BLUEPRINT_DIR";
/// 최대 시도 횟수
pub const ENV_RETRY_COUNT: &str = "RETRY_COUNT";
/// 재시도 간격 (초)
pub const ENV_RETRY_BACKOFF_SECS: &str = "RETRY_BACKOFF_SECS";
/// 지식베이스 데이터 디렉토리
pub const ENV_DATA_DIR: &str = "BLUEPRINT_KB_DATA_DIR";

/// 데이터 디렉토리 기본 경로
///
/// `~/.blueprint-kb` (홈 디렉토리를 찾지 못하면 현재 디렉토리)
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blueprint-kb")
}

/// CLI에서 전달되는 오버라이드
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_path: Option<PathBuf>,
    pub blueprint_dir: Option<PathBuf>,
    pub retry_count: Option<u32>,
    pub retry_backoff_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

/// 파이프라인 설정
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// 원본 워크북 경로
    pub data_path: Option<PathBuf>,
    /// 도면 이미지 디렉토리
    pub blueprint_dir: Option<PathBuf>,
    /// 모델 호출, 템플릿 재생성, 저장소 쓰기의 최대 시도 횟수
    pub retry_count: u32,
    /// 시도 사이 고정 대기
    pub retry_backoff: Duration,
    /// 지식베이스 데이터 디렉토리
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            blueprint_dir: None,
            retry_count: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            data_dir: get_data_dir(),
        }
    }
}

impl PipelineConfig {
    /// 환경변수에서 설정을 읽고 CLI 오버라이드 적용
    pub fn from_env(overrides: ConfigOverrides) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// 임의의 조회 함수로 설정 구성
    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.data_path = overrides
            .data_path
            .or_else(|| non_empty(ENV_DATA_PATH).map(PathBuf::from));
        config.blueprint_dir = overrides
            .blueprint_dir
            .or_else(|| non_empty(ENV_BLUEPRINT_DIR).map(PathBuf::from));

        if let Some(dir) = overrides
            .data_dir
            .or_else(|| non_empty(ENV_DATA_DIR).map(PathBuf::from))
        {
            config.data_dir = dir;
        }

        if let Some(n) = overrides
            .retry_count
            .or_else(|| parse_env(&non_empty, ENV_RETRY_COUNT))
        {
            config.retry_count = n.max(1);
        }

        if let Some(secs) = overrides
            .retry_backoff_secs
            .or_else(|| parse_env(&non_empty, ENV_RETRY_BACKOFF_SECS))
        {
            config.retry_backoff = Duration::from_secs(secs);
        }

        config
    }

    /// 설정 기반 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_backoff)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[]), ConfigOverrides::default());

        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
        assert!(config.data_path.is_none());
        assert!(config.data_dir.ends_with(".blueprint-kb"));
    }

    #[test]
    fn test_env_values() {
        let config = PipelineConfig::from_lookup(
            lookup(&[
                ("DATA_PATH", "/data/parts.xlsx"),
                ("BLUEPRINT_DIR", "/data/blueprints"),
                ("RETRY_COUNT", "5"),
                ("RETRY_BACKOFF_SECS", "1"),
                ("BLUEPRINT_KB_DATA_DIR", "/tmp/kb"),
            ]),
            ConfigOverrides::default(),
        );

        assert_eq!(config.data_path, Some(PathBuf::from("/data/parts.xlsx")));
        assert_eq!(config.blueprint_dir, Some(PathBuf::from("/data/blueprints")));
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/kb"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let overrides = ConfigOverrides {
            retry_count: Some(2),
            blueprint_dir: Some(PathBuf::from("./bp")),
            ..Default::default()
        };
        let config = PipelineConfig::from_lookup(
            lookup(&[("RETRY_COUNT", "7"), ("BLUEPRINT_DIR", "/data/blueprints")]),
            overrides,
        );

        assert_eq!(config.retry_count, 2);
        assert_eq!(config.blueprint_dir, Some(PathBuf::from("./bp")));
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = PipelineConfig::from_lookup(
            lookup(&[("RETRY_COUNT", "many"), ("RETRY_BACKOFF_SECS", "")]),
            ConfigOverrides::default(),
        );

        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_retry_count_is_clamped() {
        let config = PipelineConfig::from_lookup(
            lookup(&[("RETRY_COUNT", "0")]),
            ConfigOverrides::default(),
        );
        assert_eq!(config.retry_count, 1);
    }
}
