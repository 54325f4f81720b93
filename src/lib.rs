//! blueprint-kb - 도면 치수 지식베이스 구축 파이프라인
//!
//! 원본 부품 테이블과 도면 이미지로부터 Vision 모델이 치수 템플릿을 만들고,
//! 실제 피처 값을 채운 레코드를 콘텐츠 주소 id로 LanceDB에 저장합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod features;
pub mod knowledge;
pub mod pipeline;
pub mod retry;
pub mod template;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{get_data_dir, PipelineConfig};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, EmbeddingRejected, GeminiEmbedding};
pub use error::{KbError, KbResult};
pub use features::{extract_features, BlueprintFeatures, Extraction, ExtractMode, FeatureMap, FeatureValue, SourceTable};
pub use knowledge::{Document, KnowledgeBase, KnowledgeRecord, LanceVectorStore, Retriever, ScoredDocument, VectorStore};
pub use pipeline::{BuildReport, Pipeline, PipelineOptions};
pub use retry::RetryPolicy;
pub use template::{
    DimensionDescriptor, DimensionTemplate, FillMode, GeminiVisionModel, StructuredModel, TemplateSynthesizer,
};
