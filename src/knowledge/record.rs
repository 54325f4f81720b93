//! Knowledge-Base Record - 스키마 검증과 콘텐츠 주소 식별자
//!
//! 레코드 식별자 = SHA-256(part_type ‖ classification ‖ ori_features) hex.
//! 같은 (part_type, classification, ori_features)는 항상 같은 식별자를 가지며
//! 저장소 upsert는 이 키에 대해 멱등입니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{KbError, KbResult};
use crate::features::FeatureValue;

/// 레코드 최상위 필수 키
pub const RECORD_KEYS: [&str; 4] = ["part_type", "classification", "dimension_details", "metadata"];
/// 메타데이터 필수 키
pub const METADATA_KEYS: [&str; 2] = ["blueprint", "ori_features"];
/// 치수 상세 필수 키
pub const DIMENSION_KEYS: [&str; 4] = ["name", "alphabet", "value", "desc"];

// ============================================================================
// Types
// ============================================================================

/// 치수 상세 (템플릿 디스크립터 + 실제 값)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDetail {
    pub name: String,
    pub alphabet: String,
    pub value: FeatureValue,
    pub desc: String,
}

/// 레코드 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// 도면 이미지 파일 이름
    pub blueprint: String,
    /// 원본 피처 맵 JSON
    pub ori_features: String,
    /// 콘텐츠 주소 식별자 (저장 시 부여)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// 지식베이스 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub part_type: String,
    pub classification: String,
    pub dimension_details: Vec<DimensionDetail>,
    pub metadata: RecordMetadata,
}

impl KnowledgeRecord {
    /// 저장된 문서에서 레코드 복원
    pub fn from_document(document: &Document) -> KbResult<Self> {
        let mut value: Value = serde_json::from_str(&document.page_content)?;
        if let Value::Object(map) = &mut value {
            map.insert("metadata".to_string(), Value::Object(document.metadata.clone()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 콘텐츠 주소 식별자 계산 (레코드는 변경하지 않음)
    pub fn content_id(&self) -> String {
        record_id(&self.part_type, &self.classification, &self.metadata.ori_features)
    }
}

/// 벡터 저장소 문서 형태
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    /// 메타데이터를 제외한 레코드의 정규 JSON
    pub page_content: String,
    pub metadata: Map<String, Value>,
}

/// 유사도 점수가 붙은 문서
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    /// 유사도 (높을수록 유사)
    pub score: f32,
}

// ============================================================================
// Validation & Identity
// ============================================================================

/// 레코드 스키마 검증
pub fn validate(record: &Value) -> Result<(), String> {
    let map = record.as_object().ok_or("record is not an object")?;

    for key in RECORD_KEYS {
        if !map.contains_key(key) {
            return Err(format!("missing key '{}'", key));
        }
    }
    if let Some(extra) = map.keys().find(|k| !RECORD_KEYS.contains(&k.as_str())) {
        return Err(format!("unexpected key '{}'", extra));
    }

    let metadata = map["metadata"]
        .as_object()
        .ok_or("'metadata' is not an object")?;
    for key in METADATA_KEYS {
        if !metadata.contains_key(key) {
            return Err(format!("metadata is missing '{}'", key));
        }
    }

    let details = map["dimension_details"]
        .as_array()
        .ok_or("'dimension_details' is not an array")?;
    for (i, detail) in details.iter().enumerate() {
        let detail = detail
            .as_object()
            .ok_or_else(|| format!("dimension_details[{}] is not an object", i))?;
        for key in DIMENSION_KEYS {
            if !detail.contains_key(key) {
                return Err(format!("dimension_details[{}] is missing '{}'", i, key));
            }
        }
    }

    Ok(())
}

/// 배치 전체 검증 (하나라도 실패하면 전체 거부)
pub fn validate_batch(records: &[Value]) -> KbResult<()> {
    for (index, record) in records.iter().enumerate() {
        validate(record).map_err(|reason| KbError::Schema { index, reason })?;
    }
    Ok(())
}

/// 식별자 계산 후 `metadata.id`에 기록
///
/// `validate`를 통과한 레코드를 전제로 합니다. `metadata`가 객체가 아니면
/// `validate`와 같은 형태의 사유 문자열을 반환합니다.
pub fn identify(record: &mut Value) -> Result<String, String> {
    let id = {
        let part_type = text_of(&record["part_type"]);
        let classification = text_of(&record["classification"]);
        let ori_features = text_of(&record["metadata"]["ori_features"]);
        record_id(&part_type, &classification, &ori_features)
    };

    let metadata = record
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or("record metadata is not an object")?;
    metadata.insert("id".to_string(), Value::String(id.clone()));

    Ok(id)
}

/// SHA-256(part_type ‖ classification ‖ ori_features) hex
pub fn record_id(part_type: &str, classification: &str, ori_features: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(part_type.as_bytes());
    hasher.update(classification.as_bytes());
    hasher.update(ori_features.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 레코드를 문서로 변환 (page_content = metadata 제외 정규 JSON)
pub fn to_document(mut record: Value, id: String) -> KbResult<Document> {
    let metadata = match record.as_object_mut().and_then(|m| m.remove("metadata")) {
        Some(Value::Object(metadata)) => metadata,
        _ => Map::new(),
    };

    Ok(Document {
        id,
        page_content: canonical_json(&record)?,
        metadata,
    })
}

/// 키를 재귀적으로 정렬한 compact JSON
pub fn canonical_json(value: &Value) -> KbResult<String> {
    Ok(serde_json::to_string(&sorted(value))?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, sorted(v))).collect();
            Value::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
