//! 구조화 출력 모델 인터페이스
//!
//! 파이프라인은 벤더에 의존하지 않고 이 트레이트에만 의존합니다.

use anyhow::Result;
use async_trait::async_trait;

use super::DimensionDescriptor;

/// 모델 요청
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// 시스템 지시문 (few-shot 예시 포함)
    pub system_instructions: String,
    /// base64 인코딩된 JPEG 도면 이미지
    pub image_base64: String,
    /// 샘플 피처 맵 JSON
    pub feature_context: String,
}

/// 구조화 출력(tool call) 모델 트레이트
///
/// 0건의 결과는 유효한 응답이며, 빈 템플릿 처리는 호출자가 결정합니다.
/// 네트워크/모델 오류는 `Err`로 반환합니다.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    /// 이미지 + 텍스트로 치수 디스크립터 생성
    async fn generate_structured(&self, request: &ModelRequest) -> Result<Vec<DimensionDescriptor>>;

    /// 모델 이름
    fn name(&self) -> &str;
}
