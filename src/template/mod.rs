//! Template 모듈 - 도면 치수 템플릿 생성 및 피처 매칭
//!
//! - Synthesizer: 도면 이미지 + 샘플 피처 맵 → Vision 모델 → 치수 템플릿
//! - Matcher: 피처 맵과 템플릿의 호환성 판단 및 값 채우기
//! - Model: 구조화 출력을 지원하는 모델 인터페이스 (Gemini 구현)

mod gemini;
mod blueprint_image;
mod matcher;
mod model;
mod normalize;
mod prompt;
mod synthesizer;

use serde::{Deserialize, Serialize};

pub use gemini::{GeminiVisionModel, DEFAULT_VISION_MODEL};
pub use blueprint_image::{encode_blueprint_jpeg, resolve_blueprint_image};
pub use matcher::{fill, fill_all, matches, FillMode};
pub use model::{ModelRequest, StructuredModel};
pub use normalize::normalize_text;
pub use prompt::{build_system_message, FEW_SHOT_EXAMPLES};
pub use synthesizer::TemplateSynthesizer;

// ============================================================================
// Types
// ============================================================================

/// 치수 디스크립터 (모델 구조화 출력 한 건)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDescriptor {
    /// 치수 의미를 나타내는 이름 (예: "Head Diameter")
    pub name: String,
    /// 도면상 치수 기호 (피처 맵 키와 조인)
    pub alphabet: String,
    /// 도면상 예시 값
    pub value: f64,
    /// 값 없이 치수를 설명하는 문장
    pub desc: String,
}

impl DimensionDescriptor {
    /// 텍스트 필드 정규화 사본
    pub fn normalized(&self) -> Self {
        Self {
            name: normalize_text(&self.name),
            alphabet: normalize_text(&self.alphabet),
            value: self.value,
            desc: normalize_text(&self.desc),
        }
    }
}

/// 템플릿 메타데이터 (레코드 생성 시 전달용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// 도면 이미지 파일 이름
    pub blueprint: String,
    /// 샘플 피처 맵 JSON
    pub ori_features: String,
}

/// 도면 치수 템플릿
///
/// 도면당 한 번 생성되어 해당 도면의 모든 피처 맵에 재사용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionTemplate {
    pub part_type: String,
    pub classification: String,
    pub dimension_details: Vec<DimensionDescriptor>,
    pub metadata: TemplateMetadata,
}

impl DimensionTemplate {
    /// 템플릿의 치수 기호 목록 (순서 유지)
    pub fn alphabets(&self) -> impl Iterator<Item = &str> {
        self.dimension_details.iter().map(|d| d.alphabet.as_str())
    }

    pub fn has_alphabet(&self, alphabet: &str) -> bool {
        self.alphabets().any(|a| a == alphabet)
    }
}
