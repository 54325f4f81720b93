//! CLI 모듈
//!
//! blueprint-kb CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config::{ConfigOverrides, PipelineConfig};
use crate::embedding::{create_embedder, has_api_key};
use crate::features::ExtractMode;
use crate::knowledge::{KnowledgeBase, KnowledgeRecord, Retriever, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K};
use crate::pipeline::{BuildReport, Pipeline, PipelineOptions};
use crate::template::{FillMode, GeminiVisionModel, TemplateSynthesizer};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "blueprint-kb")]
#[command(version, about = "도면 치수 지식베이스 구축 도구", long_about = None)]
pub struct Cli {
    /// 지식베이스 데이터 디렉토리 (기본: ~/.blueprint-kb)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 원본 테이블과 도면 이미지로 지식베이스 구축
    Build {
        /// 원본 워크북 경로 (기본: DATA_PATH)
        #[arg(short, long)]
        data_path: Option<PathBuf>,

        /// 도면 이미지 디렉토리 (기본: BLUEPRINT_DIR)
        #[arg(short, long)]
        blueprint_dir: Option<PathBuf>,

        /// 도면별 행 추출 방식
        #[arg(long, value_enum, default_value_t = ExtractMode::All)]
        mode: ExtractMode,

        /// 템플릿 채우기 방식
        #[arg(long, value_enum, default_value_t = FillMode::Safe)]
        fill_mode: FillMode,

        /// 피처/템플릿 호환성 검사 생략
        #[arg(long)]
        no_check_template: bool,

        /// 최대 시도 횟수 (기본: RETRY_COUNT 또는 3)
        #[arg(long)]
        retry_count: Option<u32>,

        /// 재시도 간격 초 (기본: RETRY_BACKOFF_SECS 또는 5)
        #[arg(long)]
        retry_backoff: Option<u64>,

        /// 도면 사이 대기 초 (기본: 재시도 간격)
        #[arg(long)]
        pacing: Option<u64>,

        /// Vision 모델 이름
        #[arg(long)]
        model: Option<String>,

        /// few-shot 예시 JSON 파일 (문자열 배열, 기본 예시를 교체)
        #[arg(long, value_name = "FILE")]
        few_shot: Option<PathBuf>,
    },

    /// JSON 레코드 파일을 지식베이스에 추가
    Insert {
        /// JSON 파일 (레코드 배열 또는 단일 레코드)
        file: PathBuf,

        /// 스키마 검증 없이 무작위 id로 저장
        #[arg(long)]
        raw: bool,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value_t = DEFAULT_TOP_K)]
        k: usize,

        /// 최소 유사도
        #[arg(short, long, default_value_t = DEFAULT_SCORE_THRESHOLD)]
        threshold: f32,
    },

    /// id로 문서 조회
    Get {
        /// 문서 id 목록
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Build {
            data_path,
            blueprint_dir,
            mode,
            fill_mode,
            no_check_template,
            retry_count,
            retry_backoff,
            pacing,
            model,
            few_shot,
        } => {
            let config = PipelineConfig::from_env(ConfigOverrides {
                data_path,
                blueprint_dir,
                retry_count,
                retry_backoff_secs: retry_backoff,
                data_dir,
            });
            let options = PipelineOptions {
                fill_mode,
                check_template_matched: !no_check_template,
                retry: config.retry_policy(),
                pacing: pacing.map(Duration::from_secs).unwrap_or(config.retry_backoff),
            };
            cmd_build(&config, mode, options, model, few_shot.as_deref()).await
        }
        Commands::Insert { file, raw } => cmd_insert(&load_config(data_dir), &file, raw).await,
        Commands::Query { query, k, threshold } => {
            cmd_query(&load_config(data_dir), &query, Retriever::new(k, threshold)).await
        }
        Commands::Get { ids } => cmd_get(&load_config(data_dir), &ids).await,
        Commands::Status => cmd_status(&load_config(data_dir)).await,
    }
}

fn load_config(data_dir: Option<PathBuf>) -> PipelineConfig {
    PipelineConfig::from_env(ConfigOverrides {
        data_dir,
        ..Default::default()
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 구축 명령어 (build)
///
/// 도면별로 템플릿을 생성하고 피처 값을 채워 지식베이스에 저장합니다.
async fn cmd_build(
    config: &PipelineConfig,
    mode: ExtractMode,
    options: PipelineOptions,
    model: Option<String>,
    few_shot: Option<&Path>,
) -> Result<()> {
    require_api_key()?;

    let data_path = config
        .data_path
        .as_ref()
        .context("원본 테이블 경로가 필요합니다 (--data-path 또는 DATA_PATH)")?;
    let blueprint_dir = config
        .blueprint_dir
        .as_ref()
        .context("도면 이미지 디렉토리가 필요합니다 (--blueprint-dir 또는 BLUEPRINT_DIR)")?;

    println!("[*] 원본 테이블: {}", data_path.display());
    println!("[*] 도면 디렉토리: {}", blueprint_dir.display());
    println!(
        "[*] 재시도: 최대 {}회, 간격 {:?}",
        options.retry.max_attempts, options.retry.backoff
    );

    let vision = GeminiVisionModel::from_env(model).context("Vision 모델 생성 실패")?;
    let mut synthesizer = TemplateSynthesizer::new(Arc::new(vision), options.retry);
    if let Some(path) = few_shot {
        let examples = load_few_shot_examples(path)?;
        println!("[*] few-shot 예시: {} 개 ({})", examples.len(), path.display());
        synthesizer = synthesizer.with_examples(&examples);
    }
    let kb = open_knowledge_base(config).await?;

    let pipeline = Pipeline::new(synthesizer, kb, blueprint_dir, options);
    let report = pipeline
        .build_from_workbook(data_path, mode)
        .await
        .context("지식베이스 구축 실패")?;

    print_report(&report);
    Ok(())
}

/// few-shot 예시 파일 로드 (JSON 문자열 배열)
fn load_few_shot_examples(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("few-shot 파일 읽기 실패: {}", path.display()))?;
    let examples: Vec<String> =
        serde_json::from_str(&content).context("few-shot 파일은 문자열 배열이어야 합니다")?;

    if examples.iter().all(|e| e.trim().is_empty()) {
        bail!("few-shot 예시가 비어 있습니다: {}", path.display());
    }
    Ok(examples)
}

/// 추가 명령어 (insert)
async fn cmd_insert(config: &PipelineConfig, file: &Path, raw: bool) -> Result<()> {
    require_api_key()?;

    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", file.display()))?;
    let records = match serde_json::from_str::<Value>(&content).context("JSON 파싱 실패")? {
        Value::Array(items) => items,
        single => vec![single],
    };

    if records.is_empty() {
        println!("[!] 추가할 레코드가 없습니다.");
        return Ok(());
    }

    println!(
        "[*] 레코드 {} 건 저장 중{}...",
        records.len(),
        if raw { " (검증 생략)" } else { "" }
    );

    let kb = open_knowledge_base(config).await?;
    let ids = kb
        .insert_values(records, !raw)
        .await
        .context("레코드 저장 실패")?;

    println!("[OK] {} 건 저장됨", ids.len());
    for id in ids {
        println!("     {}", id);
    }

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(config: &PipelineConfig, query: &str, retriever: Retriever) -> Result<()> {
    require_api_key()?;

    println!("[*] 검색 중: \"{}\"", query);

    let kb = open_knowledge_base(config).await?;
    let hits = retriever.retrieve(&kb, query).await.context("검색 실패")?;

    if hits.is_empty() {
        println!(
            "\n[!] 유사도 {:.2} 이상인 결과가 없습니다.",
            retriever.score_threshold
        );
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [유사도: {:.4}] {}", i + 1, hit.score, hit.document.id);

        match KnowledgeRecord::from_document(&hit.document) {
            Ok(record) => print_record(&record),
            Err(_) => println!("   내용: {}", truncate_text(&hit.document.page_content, 200)),
        }

        println!();
    }

    Ok(())
}

/// 조회 명령어 (get)
async fn cmd_get(config: &PipelineConfig, ids: &[String]) -> Result<()> {
    require_api_key()?;

    let kb = open_knowledge_base(config).await?;
    let docs = kb.get_by_ids(ids).await.context("문서 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 일치하는 문서가 없습니다.");
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&docs).context("JSON 직렬화 실패")?;
    println!("{}", json);

    if docs.len() < ids.len() {
        println!("[!] {} 건은 찾을 수 없습니다.", ids.len() - docs.len());
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &PipelineConfig) -> Result<()> {
    println!("blueprint-kb v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    if let Some(ref path) = config.data_path {
        println!("[*] 원본 테이블: {}", path.display());
    }
    if let Some(ref dir) = config.blueprint_dir {
        println!("[*] 도면 디렉토리: {}", dir.display());
    }
    println!(
        "[*] 재시도: 최대 {}회, 간격 {:?}",
        config.retry_count, config.retry_backoff
    );

    // API 키 상태
    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
        return Ok(());
    }

    match open_knowledge_base(config).await {
        Ok(kb) => match kb.count().await {
            Ok(count) => println!("[OK] 저장된 레코드: {} 건 ({})", count, kb.embedder_name()),
            Err(e) => println!("[!] 레코드 수 조회 실패: {}", e),
        },
        Err(e) => {
            tracing::debug!("Knowledge base open failed: {:#}", e);
            println!("[!] 지식베이스 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

async fn open_knowledge_base(config: &PipelineConfig) -> Result<KnowledgeBase> {
    let embedder = create_embedder(config.retry_policy()).context("임베딩 프로바이더 생성 실패")?;
    KnowledgeBase::open(&config.data_dir, Arc::new(embedder))
        .await
        .context("지식베이스 열기 실패")
}

fn print_report(report: &BuildReport) {
    println!();
    for success in &report.succeeded {
        println!("[OK] {}: {} 건", success.name, success.ids.len());
    }
    for failure in &report.failed {
        println!("[!] {}: {}", failure.name, truncate_text(&failure.error.to_string(), 200));
    }
    println!();
    println!(
        "[OK] 완료: 레코드 {} 건, 도면 성공 {}, 실패 {}",
        report.record_count(),
        report.succeeded.len(),
        report.failed.len()
    );
}

fn print_record(record: &KnowledgeRecord) {
    println!("   부품: {} ({})", record.part_type, record.classification);
    println!("   도면: {}", record.metadata.blueprint);
    let id = record.metadata.id.clone().unwrap_or_else(|| record.content_id());
    println!("   ID: {}", id);

    let dimensions: Vec<String> = record
        .dimension_details
        .iter()
        .map(|d| format!("{}={}", d.alphabet, d.value))
        .collect();
    if !dimensions.is_empty() {
        println!("   치수: {}", truncate_text(&dimensions.join(", "), 200));
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        assert_eq!(truncate_text(korean, 5), "안녕하세요...");
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_arguments() {
        let cli = Cli::try_parse_from([
            "blueprint-kb",
            "build",
            "--data-path",
            "parts.xlsx",
            "--fill-mode",
            "greedy",
            "--mode",
            "unique",
            "--no-check-template",
            "--retry-count",
            "4",
        ])
        .unwrap();

        match cli.command {
            Commands::Build {
                data_path,
                fill_mode,
                mode,
                no_check_template,
                retry_count,
                ..
            } => {
                assert_eq!(data_path, Some(PathBuf::from("parts.xlsx")));
                assert_eq!(fill_mode, FillMode::Greedy);
                assert_eq!(mode, ExtractMode::Unique);
                assert!(no_check_template);
                assert_eq!(retry_count, Some(4));
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_build_few_shot_argument() {
        let cli = Cli::try_parse_from(["blueprint-kb", "build", "--few-shot", "examples.json"]).unwrap();

        match cli.command {
            Commands::Build { few_shot, .. } => {
                assert_eq!(few_shot, Some(PathBuf::from("examples.json")));
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_load_few_shot_examples() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("examples.json");

        std::fs::write(&path, r###"["##Part name:Hex Nut_M6", "##Part name:Flat Washer_M6"]"###).unwrap();
        let examples = load_few_shot_examples(&path).unwrap();
        assert_eq!(examples, vec!["##Part name:Hex Nut_M6", "##Part name:Flat Washer_M6"]);

        std::fs::write(&path, r#"{"examples": []}"#).unwrap();
        assert!(load_few_shot_examples(&path).is_err());

        std::fs::write(&path, "[]").unwrap();
        assert!(load_few_shot_examples(&path).is_err());
    }

    #[test]
    fn test_query_defaults() {
        let cli = Cli::try_parse_from(["blueprint-kb", "query", "stud bolt"]).unwrap();
        match cli.command {
            Commands::Query { k, threshold, .. } => {
                assert_eq!(k, 5);
                assert!((threshold - 0.6).abs() < f32::EPSILON);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_get_requires_ids() {
        assert!(Cli::try_parse_from(["blueprint-kb", "get"]).is_err());
        let cli = Cli::try_parse_from(["blueprint-kb", "--data-dir", "/tmp/kb", "get", "a", "b"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/kb")));
    }
}
