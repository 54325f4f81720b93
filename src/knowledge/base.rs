//! Knowledge Base - 레코드 검증/식별/임베딩/저장 통합
//!
//! 쓰기 경로: validate_batch → identify → to_document → embed → upsert.
//! 검증은 배치 전체에 대해 쓰기 이전에 끝나므로 스키마 오류가 있으면
//! 아무것도 저장되지 않습니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::lance::LanceVectorStore;
use super::record::{identify, to_document, validate_batch, Document, KnowledgeRecord, ScoredDocument};
use super::vector::{SearchResult, StoredVector, VectorEntry, VectorStore};
use crate::embedding::EmbeddingProvider;
use crate::error::{KbError, KbResult};

/// LanceDB 데이터 디렉토리 이름
pub const LANCE_DIR_NAME: &str = "knowledgebase.lance";

/// 지식베이스
pub struct KnowledgeBase {
    vector: Box<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl KnowledgeBase {
    /// 데이터 디렉토리의 LanceDB 저장소로 열기
    pub async fn open(data_dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> KbResult<Self> {
        let lance_path = data_dir.join(LANCE_DIR_NAME);
        let vector = LanceVectorStore::open(&lance_path, embedder.dimension()).await?;

        tracing::info!(
            "Knowledge base opened at {:?} (embedder: {})",
            lance_path,
            embedder.name()
        );

        Ok(Self::with_store(Box::new(vector), embedder))
    }

    /// 임의의 벡터 저장소로 생성
    pub fn with_store(vector: Box<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { vector, embedder }
    }

    /// 타입이 있는 레코드 저장 (항상 검증 경로)
    pub async fn insert_records(&self, records: &[KnowledgeRecord]) -> KbResult<Vec<String>> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_values(values, true).await
    }

    /// JSON 레코드 저장
    ///
    /// `check_is_kb`가 false이면 검증과 콘텐츠 주소 식별을 건너뛰고
    /// 무작위 UUID v4를 키로 사용합니다. 반환값은 입력 순서의 문서 id입니다.
    pub async fn insert_values(&self, records: Vec<Value>, check_is_kb: bool) -> KbResult<Vec<String>> {
        if records.is_empty() {
            return Ok(vec![]);
        }

        let documents = if check_is_kb {
            validate_batch(&records)?;
            records
                .into_iter()
                .enumerate()
                .map(|(index, mut record)| {
                    let id = identify(&mut record).map_err(|reason| KbError::Schema { index, reason })?;
                    to_document(record, id)
                })
                .collect::<KbResult<Vec<_>>>()?
        } else {
            records
                .into_iter()
                .map(|record| to_document(record, uuid::Uuid::new_v4().to_string()))
                .collect::<KbResult<Vec<_>>>()?
        };

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let documents = dedup_last_wins(documents);

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(KbError::from_service)?;

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(doc, embedding)| {
                Ok(VectorEntry {
                    id: doc.id,
                    page_content: doc.page_content,
                    metadata: serde_json::to_string(&doc.metadata)?,
                    embedding,
                })
            })
            .collect::<KbResult<Vec<_>>>()?;

        let written = self.vector.upsert(&entries).await?;
        tracing::info!("Stored {} documents ({} requested)", written, ids.len());

        Ok(ids)
    }

    /// 임베딩으로 검색 (유사도 ≥ threshold 중 상위 k개)
    pub async fn search_by_embedding(
        &self,
        query_embedding: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> KbResult<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let results = self.vector.search(query_embedding, k).await?;

        results
            .into_iter()
            .filter(|r| r.similarity >= score_threshold)
            .take(k)
            .map(scored_document)
            .collect()
    }

    /// 텍스트 질의로 검색
    pub async fn search(&self, query: &str, k: usize, score_threshold: f32) -> KbResult<Vec<ScoredDocument>> {
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(KbError::from_service)?;
        self.search_by_embedding(&embedding, k, score_threshold).await
    }

    /// id 목록으로 조회 (요청 순서, 없는 id 생략)
    pub async fn get_by_ids(&self, ids: &[String]) -> KbResult<Vec<Document>> {
        self.vector
            .get_by_ids(ids)
            .await?
            .into_iter()
            .map(stored_document)
            .collect()
    }

    /// 저장된 문서 개수
    pub async fn count(&self) -> KbResult<usize> {
        Ok(self.vector.count().await?)
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 같은 id는 마지막 것만 남김 (처음 등장한 위치 유지)
fn dedup_last_wins(documents: Vec<Document>) -> Vec<Document> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Document> = Vec::with_capacity(documents.len());

    for doc in documents {
        match index.get(&doc.id) {
            Some(&i) => unique[i] = doc,
            None => {
                index.insert(doc.id.clone(), unique.len());
                unique.push(doc);
            }
        }
    }

    unique
}

fn parse_metadata(raw: &str) -> KbResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(KbError::Store(anyhow::anyhow!(
            "stored metadata is not an object: {}",
            other
        ))),
    }
}

fn scored_document(result: SearchResult) -> KbResult<ScoredDocument> {
    Ok(ScoredDocument {
        document: Document {
            metadata: parse_metadata(&result.metadata)?,
            id: result.id,
            page_content: result.page_content,
        },
        score: result.similarity,
    })
}

fn stored_document(stored: StoredVector) -> KbResult<Document> {
    Ok(Document {
        metadata: parse_metadata(&stored.metadata)?,
        id: stored.id,
        page_content: stored.page_content,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;
    use crate::knowledge::{DimensionDetail, RecordMetadata};
    use crate::testing::BagOfWordsEmbedding;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_kb(dir: &TempDir) -> KnowledgeBase {
        KnowledgeBase::open(dir.path(), Arc::new(BagOfWordsEmbedding::default()))
            .await
            .unwrap()
    }

    fn record(diameter: f64) -> KnowledgeRecord {
        KnowledgeRecord {
            part_type: "Bolt".to_string(),
            classification: "Bolt>Stud".to_string(),
            dimension_details: vec![DimensionDetail {
                name: "Diameter".to_string(),
                alphabet: "D".to_string(),
                value: FeatureValue::Number(diameter),
                desc: "Thread diameter".to_string(),
            }],
            metadata: RecordMetadata {
                blueprint: "boltA.jpg".to_string(),
                ori_features: format!(r#"{{"D":{:?}}}"#, diameter),
                id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;
        let records = vec![record(10.0), record(12.0)];

        let first = kb.insert_records(&records).await.unwrap();
        let second = kb.insert_records(&records).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(kb.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_schema_error_rejects_whole_batch() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;

        let good = serde_json::to_value(record(10.0)).unwrap();
        let bad = json!({"part_type": "Bolt"});

        let err = kb.insert_values(vec![good, bad], true).await.unwrap_err();
        assert!(matches!(err, KbError::Schema { index: 1, .. }));
        assert_eq!(kb.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_batch_collapse_to_last() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;

        let mut later = record(10.0);
        later.dimension_details[0].desc = "updated".to_string();

        let ids = kb.insert_records(&[record(10.0), later]).await.unwrap();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(kb.count().await.unwrap(), 1);

        let docs = kb.get_by_ids(&ids[..1]).await.unwrap();
        assert!(docs[0].page_content.contains("updated"));
    }

    #[tokio::test]
    async fn test_degraded_insert_uses_random_ids() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;
        let raw = json!({"text": "free-form note", "metadata": {"source": "manual"}});

        let first = kb.insert_values(vec![raw.clone()], false).await.unwrap();
        let second = kb.insert_values(vec![raw], false).await.unwrap();

        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(&first[0]).is_ok());
        assert_eq!(kb.count().await.unwrap(), 2);

        let docs = kb.get_by_ids(&first).await.unwrap();
        assert_eq!(docs[0].metadata["source"], json!("manual"));
        assert!(docs[0].metadata.get("id").is_none());
    }

    #[tokio::test]
    async fn test_get_by_ids_returns_requested_order_and_shape() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;
        let ids = kb.insert_records(&[record(10.0), record(12.0)]).await.unwrap();

        let request = vec![ids[1].clone(), "unknown".to_string(), ids[0].clone()];
        let docs = kb.get_by_ids(&request).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, ids[1]);
        assert_eq!(docs[1].id, ids[0]);
        assert_eq!(docs[1].metadata["id"], json!(ids[0]));

        let shape = serde_json::to_value(&docs[0]).unwrap();
        let keys: Vec<&String> = shape.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn test_search_threshold_and_k() {
        let dir = TempDir::new().unwrap();
        let kb = open_kb(&dir).await;
        kb.insert_records(&[record(10.0), record(12.0)]).await.unwrap();

        // threshold 1.01은 어떤 문서도 통과할 수 없음
        assert!(kb.search("Bolt Stud", 5, 1.01).await.unwrap().is_empty());

        let hits = kb.search("Bolt Stud Diameter", 1, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);

        let hits = kb.search("Bolt Stud Diameter", 5, -1.0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(KnowledgeRecord::from_document(&hits[0].document).is_ok());
    }

    #[test]
    fn test_dedup_keeps_first_position() {
        let doc = |id: &str, content: &str| Document {
            id: id.to_string(),
            page_content: content.to_string(),
            metadata: Map::new(),
        };
        let unique = dedup_last_wins(vec![doc("a", "1"), doc("b", "2"), doc("a", "3")]);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "a");
        assert_eq!(unique[0].page_content, "3");
        assert_eq!(unique[1].id, "b");
    }
}
