//! Knowledge 모듈 - 콘텐츠 주소 지식베이스
//!
//! - Record: 스키마 검증, SHA-256 식별자, 문서 변환
//! - LanceDB: id 기준 merge insert + 코사인 유사도 검색
//! - KnowledgeBase: 검증 → 식별 → 임베딩 → upsert 통합
//! - Retriever: top-k + 유사도 임계값

mod base;
mod lance;
mod record;
mod retriever;
mod vector;

// Re-exports
pub use base::{KnowledgeBase, LANCE_DIR_NAME};
pub use lance::{LanceVectorStore, DEFAULT_TABLE_NAME};
pub use record::{
    canonical_json, identify, record_id, to_document, validate, validate_batch,
    DimensionDetail, Document, KnowledgeRecord, RecordMetadata, ScoredDocument,
    DIMENSION_KEYS, METADATA_KEYS, RECORD_KEYS,
};
pub use retriever::{Retriever, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K};
pub use vector::{SearchResult, StoredVector, VectorEntry, VectorStore};
