//! Feature 모듈 - 원본 테이블에서 도면별 피처 맵 추출
//!
//! - FeatureMap: 한 부품 인스턴스의 치수/분류 key-value
//! - SourceTable: 워크북 시트들을 외부 합집합(outer union)으로 합친 테이블
//! - extract_features: 도면 이름(`bp`) 기준 그룹화

mod table;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};

pub use table::{SourceTable, TableRow, BLUEPRINT_COLUMN};

/// 부품 타입 키
pub const PART_TYPE_KEY: &str = "part_type";
/// 분류 키
pub const CLASSIFICATION_KEY: &str = "classification";

// ============================================================================
// Types
// ============================================================================

/// 피처 값 (숫자 또는 문자열)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

/// 피처 맵
///
/// 키는 정렬되어 있어 `to_canonical_json`의 결과가 항상 같습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap(BTreeMap<String, FeatureValue>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 키-값 추가 (빌더 스타일)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.0.iter()
    }

    /// `part_type` 값 (문자열화)
    pub fn part_type(&self) -> Option<String> {
        self.get(PART_TYPE_KEY).map(|v| v.to_string())
    }

    /// `classification` 값 (문자열화)
    pub fn classification(&self) -> Option<String> {
        self.get(CLASSIFICATION_KEY).map(|v| v.to_string())
    }

    /// `part_type`/`classification`을 제외한 치수 키
    pub fn dimension_keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|k| *k != PART_TYPE_KEY && *k != CLASSIFICATION_KEY)
    }

    /// 정렬된 키의 compact JSON
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

/// 도면 하나에 속한 피처 맵 목록
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintFeatures {
    /// 도면 이름 (`bp` 컬럼 값)
    pub name: String,
    /// 행 순서대로의 피처 맵
    pub features: Vec<FeatureMap>,
    /// 이 도면에 속한 결함 행 ("sheet 'X' row N is missing ...")
    pub defects: Vec<String>,
}

impl BlueprintFeatures {
    pub fn new(name: impl Into<String>, features: Vec<FeatureMap>) -> Self {
        Self {
            name: name.into(),
            features,
            defects: Vec::new(),
        }
    }
}

/// 추출 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExtractMode {
    /// 도면별 첫 행만 사용
    Unique,
    /// 모든 행 사용
    #[default]
    All,
}

/// 테이블 추출 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// 도면 이름이 처음 등장한 순서
    pub blueprints: Vec<BlueprintFeatures>,
    /// 도면 이름(`bp`)이 비어 있어 어느 도면에도 속하지 않는 행의 위치
    pub unassigned_rows: Vec<String>,
}

// ============================================================================
// Extraction
// ============================================================================

/// 테이블 행들을 도면별 피처 맵 목록으로 변환
///
/// `bp` 컬럼이 없을 때만 테이블 전체가 `KbError::Input`으로 거부됩니다.
/// `part_type`/`classification`이 빠진 행은 해당 도면의 `defects`에,
/// `bp` 값이 없는 행은 `unassigned_rows`에 기록되고 나머지 행은 그대로 추출됩니다.
/// 비어 있는 셀은 피처 맵에 포함되지 않습니다.
pub fn extract_features(table: &SourceTable, mode: ExtractMode) -> KbResult<Extraction> {
    if !table.has_column(BLUEPRINT_COLUMN) {
        return Err(KbError::Input(format!(
            "column '{}' not found in source table (columns: {})",
            BLUEPRINT_COLUMN,
            table.columns().join(", ")
        )));
    }

    let mut extraction = Extraction::default();

    for row in table.rows() {
        let Some(name) = row.get(BLUEPRINT_COLUMN).map(|v| v.to_string()) else {
            tracing::warn!("Skipping {}: no blueprint name", row.location());
            extraction.unassigned_rows.push(row.location());
            continue;
        };

        let groups = &mut extraction.blueprints;
        let index = match groups.iter().position(|g| g.name == name) {
            Some(_) if mode == ExtractMode::Unique => continue,
            Some(i) => i,
            None => {
                groups.push(BlueprintFeatures::new(name, Vec::new()));
                groups.len() - 1
            }
        };

        match row_to_features(row) {
            Ok(features) => groups[index].features.push(features),
            Err(defect) => {
                tracing::warn!("Blueprint '{}': {}", groups[index].name, defect);
                groups[index].defects.push(defect);
            }
        }
    }

    tracing::debug!(
        "Extracted {} blueprints ({} feature maps, {} unassigned rows)",
        extraction.blueprints.len(),
        extraction.blueprints.iter().map(|g| g.features.len()).sum::<usize>(),
        extraction.unassigned_rows.len()
    );

    Ok(extraction)
}

fn row_to_features(row: &TableRow) -> Result<FeatureMap, String> {
    let mut features = FeatureMap::new();
    for (key, value) in row.values() {
        if key == BLUEPRINT_COLUMN {
            continue;
        }
        features.insert(key.clone(), value.clone());
    }

    for required in [PART_TYPE_KEY, CLASSIFICATION_KEY] {
        if !features.contains_key(required) {
            return Err(format!("{} is missing '{}'", row.location(), required));
        }
    }

    Ok(features)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bolt_table() -> SourceTable {
        let mut table = SourceTable::new("Sheet1");
        table.push_row(vec![
            ("bp", "boltA".into()),
            ("part_type", "Bolt".into()),
            ("classification", "Bolt>Stud".into()),
            ("D", 10.0.into()),
        ]);
        table.push_row(vec![
            ("bp", "nutB".into()),
            ("part_type", "Nut".into()),
            ("classification", "Nut>Wing Nut".into()),
            ("H", 6.0.into()),
        ]);
        table.push_row(vec![
            ("bp", "boltA".into()),
            ("part_type", "Bolt".into()),
            ("classification", "Bolt>Stud".into()),
            ("D", 12.0.into()),
            ("L", 30.0.into()),
        ]);
        table
    }

    #[test]
    fn test_extract_all_groups_in_row_order() {
        let groups = extract_features(&bolt_table(), ExtractMode::All).unwrap().blueprints;

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "boltA");
        assert_eq!(groups[1].name, "nutB");
        assert_eq!(groups[0].features.len(), 2);
        assert_eq!(groups[0].features[0].get("D"), Some(&FeatureValue::Number(10.0)));
        assert_eq!(groups[0].features[1].get("D"), Some(&FeatureValue::Number(12.0)));
    }

    #[test]
    fn test_extract_unique_keeps_first_row() {
        let groups = extract_features(&bolt_table(), ExtractMode::Unique).unwrap().blueprints;

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].features.len(), 1);
        assert_eq!(groups[0].features[0].get("D"), Some(&FeatureValue::Number(10.0)));
        assert!(!groups[0].features[0].contains_key("L"));
    }

    #[test]
    fn test_missing_cells_are_dropped() {
        let groups = extract_features(&bolt_table(), ExtractMode::All).unwrap().blueprints;
        // nutB 행에는 D 컬럼 값이 없음
        assert!(!groups[1].features[0].contains_key("D"));
        assert!(!groups[1].features[0].contains_key("bp"));
    }

    #[test]
    fn test_missing_blueprint_column_is_input_error() {
        let mut table = SourceTable::new("Sheet1");
        table.push_row(vec![("part_type", "Bolt".into())]);

        let result = extract_features(&table, ExtractMode::All);
        assert!(matches!(result, Err(KbError::Input(_))));
    }

    #[test]
    fn test_row_without_classification_is_blueprint_defect() {
        let mut table = SourceTable::new("Parts");
        table.push_row(vec![
            ("bp", "boltA".into()),
            ("part_type", "Bolt".into()),
            ("classification", "Bolt>Stud".into()),
            ("D", 10.0.into()),
        ]);
        table.push_row(vec![("bp", "nutB".into()), ("part_type", "Nut".into())]);

        let extraction = extract_features(&table, ExtractMode::All).unwrap();

        let bolt = &extraction.blueprints[0];
        assert_eq!(bolt.features.len(), 1);
        assert!(bolt.defects.is_empty());

        let nut = &extraction.blueprints[1];
        assert_eq!(nut.name, "nutB");
        assert!(nut.features.is_empty());
        assert_eq!(nut.defects, vec!["sheet 'Parts' row 3 is missing 'classification'"]);
    }

    #[test]
    fn test_row_without_blueprint_name_is_unassigned() {
        let mut table = SourceTable::new("Parts");
        table.push_row(vec![
            ("bp", "boltA".into()),
            ("part_type", "Bolt".into()),
            ("classification", "Bolt>Stud".into()),
        ]);
        table.push_row(vec![("part_type", "Bolt".into()), ("D", 8.0.into())]);

        let extraction = extract_features(&table, ExtractMode::All).unwrap();
        assert_eq!(extraction.blueprints.len(), 1);
        assert_eq!(extraction.unassigned_rows, vec!["sheet 'Parts' row 3"]);
    }

    #[test]
    fn test_workbook_defect_names_sheet_and_row() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/parts.xlsx");
        let table = SourceTable::from_workbook(&path).unwrap();

        let extraction = extract_features(&table, ExtractMode::All).unwrap();
        let names: Vec<&str> = extraction.blueprints.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["boltA", "nutB", "nutC"]);

        assert_eq!(extraction.blueprints[0].features.len(), 2);
        assert_eq!(
            extraction.blueprints[1].defects,
            vec!["sheet 'nuts' row 2 is missing 'classification'"]
        );
        assert!(extraction.blueprints[2].defects.is_empty());
    }

    #[test]
    fn test_canonical_json_is_key_sorted() {
        let features = FeatureMap::new()
            .with("part_type", "Bolt")
            .with("D", 10.0)
            .with("classification", "Bolt>Stud");

        assert_eq!(
            features.to_canonical_json().unwrap(),
            r#"{"D":10.0,"classification":"Bolt>Stud","part_type":"Bolt"}"#
        );
    }

    #[test]
    fn test_dimension_keys_skip_type_fields() {
        let features = FeatureMap::new()
            .with("part_type", "Bolt")
            .with("classification", "Bolt>Stud")
            .with("D", 10.0)
            .with("L", 20.0);

        let keys: Vec<&str> = features.dimension_keys().collect();
        assert_eq!(keys, vec!["D", "L"]);
    }
}
