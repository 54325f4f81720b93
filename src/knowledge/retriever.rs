//! Retriever - 유사도 임계값이 있는 top-k 검색

use super::base::KnowledgeBase;
use super::record::{KnowledgeRecord, ScoredDocument};
use crate::error::KbResult;

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 5;
/// 기본 유사도 임계값
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;

/// 검색 설정
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retriever {
    pub k: usize,
    pub score_threshold: f32,
}

impl Default for Retriever {
    fn default() -> Self {
        Self {
            k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl Retriever {
    pub fn new(k: usize, score_threshold: f32) -> Self {
        Self { k, score_threshold }
    }

    /// 텍스트 질의 검색
    pub async fn retrieve(&self, kb: &KnowledgeBase, query: &str) -> KbResult<Vec<ScoredDocument>> {
        let hits = kb.search(query, self.k, self.score_threshold).await?;
        tracing::debug!(
            "Retrieved {} documents (k={}, threshold={})",
            hits.len(),
            self.k,
            self.score_threshold
        );
        Ok(hits)
    }

    /// 임베딩 검색
    pub async fn retrieve_by_embedding(
        &self,
        kb: &KnowledgeBase,
        query_embedding: &[f32],
    ) -> KbResult<Vec<ScoredDocument>> {
        kb.search_by_embedding(query_embedding, self.k, self.score_threshold)
            .await
    }

    /// 검색 결과를 레코드로 변환
    pub async fn retrieve_records(
        &self,
        kb: &KnowledgeBase,
        query: &str,
    ) -> KbResult<Vec<(KnowledgeRecord, f32)>> {
        self.retrieve(kb, query)
            .await?
            .iter()
            .map(|hit| -> KbResult<_> {
                Ok((KnowledgeRecord::from_document(&hit.document)?, hit.score))
            })
            .collect()
    }
}
