//! Template Matcher/Filler - 피처 맵을 템플릿 슬롯에 채워 레코드 생성
//!
//! 호환성은 부분집합 검사입니다: 피처 맵의 치수 키 ⊆ 템플릿 기호.
//! 피처 맵이 템플릿의 일부 치수를 생략하는 것은 정상입니다.

use super::{DimensionDescriptor, DimensionTemplate};
use crate::error::{KbError, KbResult};
use crate::features::FeatureMap;
use crate::knowledge::{DimensionDetail, KnowledgeRecord, RecordMetadata};

/// 채우기 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FillMode {
    /// 피처 맵에 없는 치수는 제외
    #[default]
    Safe,
    /// 피처 맵에 없는 치수는 템플릿 예시 값 그대로 유지
    Greedy,
}

/// 피처 맵이 템플릿과 호환되는지 확인
pub fn matches(features: &FeatureMap, template: &DimensionTemplate) -> bool {
    let same_part_type = features.part_type().as_deref() == Some(template.part_type.as_str());
    let same_classification =
        features.classification().as_deref() == Some(template.classification.as_str());

    same_part_type
        && same_classification
        && features.dimension_keys().all(|key| template.has_alphabet(key))
}

/// 템플릿에 피처 값을 채워 레코드 생성
///
/// 템플릿과 피처 맵은 변경되지 않습니다. `metadata.ori_features`는 채운 피처 맵의
/// JSON이므로 같은 도면의 서로 다른 행은 서로 다른 식별자를 갖습니다.
pub fn fill(features: &FeatureMap, template: &DimensionTemplate, mode: FillMode) -> KbResult<KnowledgeRecord> {
    let dimension_details = template
        .dimension_details
        .iter()
        .filter_map(|descriptor| match features.get(&descriptor.alphabet) {
            Some(value) => Some(DimensionDetail {
                name: descriptor.name.clone(),
                alphabet: descriptor.alphabet.clone(),
                value: value.clone(),
                desc: descriptor.desc.clone(),
            }),
            None => match mode {
                FillMode::Safe => None,
                FillMode::Greedy => Some(unfilled(descriptor)),
            },
        })
        .collect();

    Ok(KnowledgeRecord {
        part_type: features.part_type().unwrap_or_else(|| template.part_type.clone()),
        classification: features
            .classification()
            .unwrap_or_else(|| template.classification.clone()),
        dimension_details,
        metadata: RecordMetadata {
            blueprint: template.metadata.blueprint.clone(),
            ori_features: features.to_canonical_json()?,
            id: None,
        },
    })
}

/// 도면의 모든 피처 맵을 채움
///
/// `check_template_matched`가 true이면 호환되지 않는 첫 피처 맵에서
/// `KbError::IncompatibleTemplate` (attempts = 1)을 반환합니다.
pub fn fill_all(
    features_list: &[FeatureMap],
    template: &DimensionTemplate,
    mode: FillMode,
    check_template_matched: bool,
) -> KbResult<Vec<KnowledgeRecord>> {
    let mut records = Vec::with_capacity(features_list.len());

    for (row, features) in features_list.iter().enumerate() {
        if check_template_matched && !matches(features, template) {
            return Err(KbError::IncompatibleTemplate {
                blueprint: template.metadata.blueprint.clone(),
                row,
                attempts: 1,
            });
        }
        records.push(fill(features, template, mode)?);
    }

    Ok(records)
}

fn unfilled(descriptor: &DimensionDescriptor) -> DimensionDetail {
    DimensionDetail {
        name: descriptor.name.clone(),
        alphabet: descriptor.alphabet.clone(),
        value: descriptor.value.into(),
        desc: descriptor.desc.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================
