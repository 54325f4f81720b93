//! Pipeline 모듈 - 도면 단위 지식베이스 구축
//!
//! 도면마다 순차적으로: 이미지 탐색 → 템플릿 생성 → 피처 채우기 → 저장.
//! 피처가 템플릿과 맞지 않으면 템플릿을 다시 생성하고 배치 전체를 다시 채웁니다.
//! 한 도면의 실패는 보고서에 기록되고 다음 도면으로 진행합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KbError, KbResult};
use crate::features::{extract_features, BlueprintFeatures, ExtractMode, SourceTable};
use crate::knowledge::{KnowledgeBase, KnowledgeRecord};
use crate::retry::RetryPolicy;
use crate::template::{fill_all, resolve_blueprint_image, FillMode, TemplateSynthesizer};

// ============================================================================
// Options & Report
// ============================================================================

/// 파이프라인 옵션
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub fill_mode: FillMode,
    /// 채우기 전 피처/템플릿 호환성 검사
    pub check_template_matched: bool,
    /// 템플릿 재생성 및 저장소 쓰기 재시도
    pub retry: RetryPolicy,
    /// 도면 사이 대기
    pub pacing: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            fill_mode: FillMode::Safe,
            check_template_matched: true,
            retry,
            pacing: retry.backoff,
        }
    }
}

/// 성공한 도면
#[derive(Debug, Clone)]
pub struct BlueprintSuccess {
    pub name: String,
    /// 저장된 레코드 id (피처 맵 순서)
    pub ids: Vec<String>,
}

/// 실패한 도면
#[derive(Debug)]
pub struct BlueprintFailure {
    pub name: String,
    pub error: KbError,
}

/// 구축 결과 보고서
#[derive(Debug, Default)]
pub struct BuildReport {
    pub succeeded: Vec<BlueprintSuccess>,
    pub failed: Vec<BlueprintFailure>,
}

impl BuildReport {
    /// 저장된 레코드 수
    pub fn record_count(&self) -> usize {
        self.succeeded.iter().map(|s| s.ids.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// 지식베이스 구축 파이프라인
pub struct Pipeline {
    synthesizer: TemplateSynthesizer,
    kb: KnowledgeBase,
    blueprint_dir: PathBuf,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        synthesizer: TemplateSynthesizer,
        kb: KnowledgeBase,
        blueprint_dir: impl Into<PathBuf>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            synthesizer,
            kb,
            blueprint_dir: blueprint_dir.into(),
            options,
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// 워크북 파일에서 구축
    pub async fn build_from_workbook(&self, data_path: &Path, mode: ExtractMode) -> KbResult<BuildReport> {
        let table = SourceTable::from_workbook(data_path)
            .map_err(|e| KbError::Input(format!("{:#}", e)))?;
        self.build_from_table(&table, mode).await
    }

    /// 테이블에서 구축
    ///
    /// `bp` 컬럼 누락만 아무것도 저장하기 전에 반환됩니다. 결함 행은 해당 도면의
    /// 실패로, 도면 이름이 없는 행은 행 위치 이름의 실패로 보고서에 기록됩니다.
    pub async fn build_from_table(&self, table: &SourceTable, mode: ExtractMode) -> KbResult<BuildReport> {
        let extraction = extract_features(table, mode)?;
        let mut report = self.run(&extraction.blueprints).await;

        for location in extraction.unassigned_rows {
            report.failed.push(BlueprintFailure {
                error: KbError::Input(format!("{} has no blueprint name", location)),
                name: location,
            });
        }

        Ok(report)
    }

    /// 도면 목록 처리
    pub async fn run(&self, blueprints: &[BlueprintFeatures]) -> BuildReport {
        let mut report = BuildReport::default();

        tracing::info!("Building knowledge base from {} blueprints", blueprints.len());

        for (i, blueprint) in blueprints.iter().enumerate() {
            if i > 0 && !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }

            match self.process_blueprint(blueprint).await {
                Ok(ids) => {
                    tracing::info!(
                        "[{}/{}] {}: stored {} records",
                        i + 1,
                        blueprints.len(),
                        blueprint.name,
                        ids.len()
                    );
                    report.succeeded.push(BlueprintSuccess {
                        name: blueprint.name.clone(),
                        ids,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        "[{}/{}] {}: failed: {}",
                        i + 1,
                        blueprints.len(),
                        blueprint.name,
                        error
                    );
                    report.failed.push(BlueprintFailure {
                        name: blueprint.name.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Build finished: {} records, {} blueprints ok, {} failed",
            report.record_count(),
            report.succeeded.len(),
            report.failed.len()
        );

        report
    }

    /// 도면 하나 처리 (템플릿 → 레코드 → 저장)
    pub async fn process_blueprint(&self, blueprint: &BlueprintFeatures) -> KbResult<Vec<String>> {
        let records = self.build_records(blueprint).await?;
        self.store(&blueprint.name, &records).await
    }

    /// 템플릿을 생성해 피처 맵들을 레코드로 변환
    ///
    /// 호환성 실패 시 첫 피처 맵으로 템플릿을 재생성하며, 재시도를 모두 소진하면
    /// `KbError::IncompatibleTemplate`을 반환합니다. 템플릿 생성 자체의 실패
    /// (`EmptyTemplate`, `Input`)는 재시도하지 않고 그대로 반환합니다.
    pub async fn build_records(&self, blueprint: &BlueprintFeatures) -> KbResult<Vec<KnowledgeRecord>> {
        if !blueprint.defects.is_empty() {
            return Err(KbError::Input(blueprint.defects.join("; ")));
        }

        let sample = blueprint
            .features
            .first()
            .ok_or_else(|| KbError::Input(format!("blueprint '{}' has no feature rows", blueprint.name)))?;

        let image_path = resolve_blueprint_image(&self.blueprint_dir, &blueprint.name).ok_or_else(|| {
            KbError::Input(format!(
                "no image for blueprint '{}' in {:?}",
                blueprint.name, self.blueprint_dir
            ))
        })?;

        let label = format!("Template fill for {}", blueprint.name);
        self.options
            .retry
            .run(
                &label,
                |attempt| {
                    let image_path = &image_path;
                    async move {
                        if attempt > 1 {
                            tracing::info!("Regenerating template for {}", blueprint.name);
                        }
                        let template = self.synthesizer.synthesize(image_path, sample).await?;
                        fill_all(
                            &blueprint.features,
                            &template,
                            self.options.fill_mode,
                            self.options.check_template_matched,
                        )
                    }
                },
                |e: &KbError| matches!(e, KbError::IncompatibleTemplate { .. }),
            )
            .await
            .map_err(|exhausted| match exhausted.last_error {
                KbError::IncompatibleTemplate { blueprint, row, .. } => KbError::IncompatibleTemplate {
                    blueprint,
                    row,
                    attempts: exhausted.attempts,
                },
                other => other,
            })
    }

    /// 레코드 저장 (일시적 저장소 오류만 재시도)
    async fn store(&self, name: &str, records: &[KnowledgeRecord]) -> KbResult<Vec<String>> {
        let label = format!("Store write for {}", name);
        self.options
            .retry
            .run(
                &label,
                |_| self.kb.insert_records(records),
                KbError::is_transient,
            )
            .await
            .map_err(|exhausted| exhausted.last_error)
    }
}

// ============================================================================
// Tests
// ============================================================================
