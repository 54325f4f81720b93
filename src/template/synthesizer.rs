//! Template Synthesizer - 도면 이미지 + 샘플 피처 맵 → 치수 템플릿
//!
//! 모델 오류와 빈 응답은 모두 실패한 시도로 간주하고 고정 백오프로 재시도합니다.
//! 마지막 시도까지 치수가 나오지 않으면 `KbError::EmptyTemplate`.

use std::path::Path;
use std::sync::Arc;

use super::model::{ModelRequest, StructuredModel};
use super::prompt::{build_system_message, FEW_SHOT_EXAMPLES};
use super::{encode_blueprint_jpeg, DimensionDescriptor, DimensionTemplate, TemplateMetadata};
use crate::error::{KbError, KbResult};
use crate::features::{FeatureMap, CLASSIFICATION_KEY, PART_TYPE_KEY};
use crate::retry::RetryPolicy;

/// 치수 템플릿 생성기
pub struct TemplateSynthesizer {
    model: Arc<dyn StructuredModel>,
    retry: RetryPolicy,
    system_message: String,
}

impl TemplateSynthesizer {
    /// 기본 few-shot 지시문으로 생성
    pub fn new(model: Arc<dyn StructuredModel>, retry: RetryPolicy) -> Self {
        Self {
            model,
            retry,
            system_message: build_system_message(FEW_SHOT_EXAMPLES),
        }
    }

    /// few-shot 예시 교체
    pub fn with_examples<S: AsRef<str>>(mut self, examples: &[S]) -> Self {
        self.system_message = build_system_message(examples);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 이미지 파일로 템플릿 생성
    pub async fn synthesize(&self, image_path: &Path, sample: &FeatureMap) -> KbResult<DimensionTemplate> {
        let blueprint = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let image_base64 = encode_blueprint_jpeg(image_path)
            .await
            .map_err(|e| KbError::Input(format!("blueprint image {:?}: {:#}", image_path, e)))?;

        self.synthesize_encoded(&blueprint, image_base64, sample).await
    }

    /// base64 JPEG 이미지로 템플릿 생성
    ///
    /// `blueprint`는 템플릿 메타데이터에 기록되는 이미지 파일 이름입니다.
    pub async fn synthesize_encoded(
        &self,
        blueprint: &str,
        image_base64: String,
        sample: &FeatureMap,
    ) -> KbResult<DimensionTemplate> {
        let part_type = sample.part_type().ok_or_else(|| missing_key(blueprint, PART_TYPE_KEY))?;
        let classification = sample
            .classification()
            .ok_or_else(|| missing_key(blueprint, CLASSIFICATION_KEY))?;
        let ori_features = sample.to_canonical_json()?;

        let request = ModelRequest {
            system_instructions: self.system_message.clone(),
            image_base64,
            feature_context: ori_features.clone(),
        };

        let label = format!("Template synthesis for {}", blueprint);
        let descriptors = self
            .retry
            .run(
                &label,
                |attempt| {
                    let request = &request;
                    async move {
                        tracing::debug!(
                            "Requesting template from {} (attempt {})",
                            self.model.name(),
                            attempt
                        );
                        let descriptors = self.model.generate_structured(request).await?;
                        if descriptors.is_empty() {
                            anyhow::bail!("model returned no dimensional info");
                        }
                        Ok(descriptors)
                    }
                },
                |_: &anyhow::Error| true,
            )
            .await
            .map_err(|exhausted| KbError::EmptyTemplate {
                blueprint: blueprint.to_string(),
                attempts: exhausted.attempts,
                last_error: Some(format!("{:#}", exhausted.last_error)),
            })?;

        let dimension_details: Vec<DimensionDescriptor> =
            descriptors.iter().map(DimensionDescriptor::normalized).collect();

        tracing::info!(
            "Template for {} generated ({} dimensions)",
            blueprint,
            dimension_details.len()
        );

        Ok(DimensionTemplate {
            part_type,
            classification,
            dimension_details,
            metadata: TemplateMetadata {
                blueprint: blueprint.to_string(),
                ori_features,
            },
        })
    }
}

fn missing_key(blueprint: &str, key: &str) -> KbError {
    KbError::Input(format!("sample features of '{}' have no '{}'", blueprint, key))
}

// ============================================================================
// Tests
// ============================================================================
