//! Vector Store - 벡터 저장소 트레이트
//!
//! 문서는 문자열 id를 쓰기 키로 사용합니다. 같은 id로 다시 쓰면 덮어씁니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 문서 ID (쓰기 키)
    pub id: String,
    /// 문서 본문 (정규 JSON)
    pub page_content: String,
    /// 메타데이터 JSON
    pub metadata: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 저장된 문서 (임베딩 제외)
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub id: String,
    pub page_content: String,
    pub metadata: String,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub page_content: String,
    pub metadata: String,
    /// 코사인 유사도 (1.0 = 동일 방향)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다. 동시성 제어는 구현체에 위임합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// id 기준 upsert (한 번의 호출이 하나의 원자적 쓰기)
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 유사도 내림차순 검색
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// id 목록으로 조회 (없는 id는 생략, 요청 순서 유지)
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredVector>>;

    /// 문서 개수 조회
    async fn count(&self) -> Result<usize>;
}
