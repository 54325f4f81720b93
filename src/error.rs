//! 에러 타입 - 지식베이스 파이프라인 에러 분류
//!
//! - `Input`, `Schema`: 데이터 구조 결함 (재시도하지 않음)
//! - `EmptyTemplate`, `IncompatibleTemplate`: 재시도 소진 후 치명적 실패
//! - `Store`, `Serialization`: 인프라 계층 에러
//! - `Rejected`: 외부 서비스가 요청 자체를 거부 (재시도하지 않음)

use thiserror::Error;

use crate::embedding::EmbeddingRejected;

/// 파이프라인 결과 타입
pub type KbResult<T> = std::result::Result<T, KbError>;

/// 지식베이스 파이프라인 에러
#[derive(Error, Debug)]
pub enum KbError {
    /// 원본 테이블/이미지 입력 오류
    #[error("Input error: {0}")]
    Input(String),

    /// 모델이 재시도를 모두 소진할 때까지 치수 정보를 반환하지 않음
    #[error("Empty template for '{blueprint}' after {attempts} attempts{}", last_error_suffix(.last_error))]
    EmptyTemplate {
        blueprint: String,
        attempts: u32,
        last_error: Option<String>,
    },

    /// 템플릿 재생성을 모두 소진해도 피처와 템플릿이 맞지 않음
    #[error("Features of '{blueprint}' (row {row}) do not match the generated template after {attempts} attempts")]
    IncompatibleTemplate {
        blueprint: String,
        row: usize,
        attempts: u32,
    },

    /// 레코드가 지식베이스 스키마를 만족하지 않음
    #[error("Schema error in record #{index}: {reason}")]
    Schema { index: usize, reason: String },

    /// 벡터 저장소/임베딩 계층 오류
    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),

    /// 외부 서비스가 요청을 거부함 (잘못된 요청, 인증 실패)
    #[error("Rejected by service: {0:#}")]
    Rejected(anyhow::Error),

    /// JSON 직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KbError {
    /// 재시도로 회복될 수 있는 에러인지 여부
    pub fn is_transient(&self) -> bool {
        matches!(self, KbError::Store(_))
    }

    /// 외부 서비스 에러 분류
    ///
    /// 거부된 임베딩 요청은 `Rejected`, 그 외는 일시적일 수 있는 `Store`.
    pub fn from_service(error: anyhow::Error) -> Self {
        if error.downcast_ref::<EmbeddingRejected>().is_some() {
            KbError::Rejected(error)
        } else {
            KbError::Store(error)
        }
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}
