//! Source Table - 워크북 로딩
//!
//! 모든 시트를 읽어 하나의 테이블로 이어 붙입니다.
//! 컬럼은 시트 간 외부 합집합이며, 시트에 없는 컬럼은 빈 셀로 취급합니다.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};

use super::FeatureValue;

/// 도면 이름 컬럼
pub const BLUEPRINT_COLUMN: &str = "bp";

/// 테이블 한 행 (빈 셀은 저장하지 않음)
#[derive(Debug, Clone)]
pub struct TableRow {
    sheet: String,
    /// 워크시트 행 번호 (1부터, 헤더가 1행)
    line: usize,
    values: BTreeMap<String, FeatureValue>,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.values.get(column)
    }

    pub fn values(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.values.iter()
    }

    /// 에러 메시지용 위치 ("sheet 'X' row N")
    pub fn location(&self) -> String {
        format!("sheet '{}' row {}", self.sheet, self.line)
    }
}

/// 헤더 행 번호
const HEADER_LINE: usize = 1;

/// 원본 테이블
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
    current_sheet: String,
    sheet_line: usize,
}

impl SourceTable {
    /// 빈 테이블 생성 (이후 push_row는 `sheet`에 속함)
    pub fn new(sheet: &str) -> Self {
        Self {
            current_sheet: sheet.to_string(),
            sheet_line: HEADER_LINE,
            ..Default::default()
        }
    }

    /// 워크북 파일 로드 (xlsx, xls, ods)
    pub fn from_workbook(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {:?}", path))?;

        let mut table = SourceTable::default();

        for sheet in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&sheet)
                .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

            // range는 첫 번째로 사용된 셀에서 시작 (0부터)
            let start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
            let mut rows = range.rows();
            let header: Vec<Option<String>> = match rows.next() {
                Some(cells) => cells.iter().map(header_name).collect(),
                None => {
                    tracing::debug!("Skipping empty sheet '{}'", sheet);
                    continue;
                }
            };

            table.begin_sheet(&sheet);
            for (offset, cells) in rows.enumerate() {
                let values: Vec<(&str, FeatureValue)> = header
                    .iter()
                    .zip(cells.iter())
                    .filter_map(|(name, cell)| {
                        let name = name.as_deref()?;
                        cell_value(cell).map(|v| (name, v))
                    })
                    .collect();

                if values.is_empty() {
                    continue;
                }
                table.push_row_at(start_row + offset + HEADER_LINE + 1, values);
            }
        }

        tracing::info!(
            "Loaded {} rows ({} columns) from {:?}",
            table.rows.len(),
            table.columns.len(),
            path
        );

        Ok(table)
    }

    /// 이후 추가되는 행이 속할 시트 지정
    pub fn begin_sheet(&mut self, sheet: &str) {
        self.current_sheet = sheet.to_string();
        self.sheet_line = HEADER_LINE;
    }

    /// 직전 행 다음 줄에 행 추가
    pub fn push_row(&mut self, values: Vec<(&str, FeatureValue)>) {
        self.push_row_at(self.sheet_line + 1, values);
    }

    /// 워크시트 행 번호를 지정하여 행 추가 (새 컬럼은 합집합에 포함)
    pub fn push_row_at(&mut self, line: usize, values: Vec<(&str, FeatureValue)>) {
        self.sheet_line = line;

        let mut row = BTreeMap::new();
        for (column, value) in values {
            if !self.has_column(column) {
                self.columns.push(column.to_string());
            }
            if is_missing(&value) {
                continue;
            }
            row.insert(column.to_string(), value);
        }

        self.rows.push(TableRow {
            sheet: self.current_sheet.clone(),
            line: self.sheet_line,
            values: row,
        });
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn header_name(cell: &Data) -> Option<String> {
    let name = cell.to_string();
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// 셀을 피처 값으로 변환 (빈 셀/에러 셀은 None)
fn cell_value(cell: &Data) -> Option<FeatureValue> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(FeatureValue::Number(*i as f64)),
        Data::Float(f) if f.is_nan() => None,
        Data::Float(f) => Some(FeatureValue::Number(*f)),
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(FeatureValue::Text(trimmed.to_string()))
            }
        }
        other => Some(FeatureValue::Text(other.to_string())),
    }
}

fn is_missing(value: &FeatureValue) -> bool {
    match value {
        FeatureValue::Number(n) => n.is_nan(),
        FeatureValue::Text(s) => s.trim().is_empty(),
    }
}
