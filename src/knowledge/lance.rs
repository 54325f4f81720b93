//! LanceDB Vector Store - 콘텐츠 주소 문서 저장소
//!
//! `id` 컬럼을 키로 merge insert하여 같은 id의 재수집을 덮어쓰기로 처리합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{SearchResult, StoredVector, VectorEntry, VectorStore};

/// 기본 테이블 이름
pub const DEFAULT_TABLE_NAME: &str = "knowledgebase";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        Self::open_table(path, DEFAULT_TABLE_NAME, dimension).await
    }

    /// 테이블 이름을 지정하여 열기
    pub async fn open_table(path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("page_content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.id,
                self.dimension,
                bad.embedding.len()
            );
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.page_content.as_str()).collect();
        let metadata: Vec<&str> = entries.iter().map(|e| e.metadata.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&self.table_name))
            .unwrap_or(false)
    }

    async fn open_existing(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table '{}'", self.table_name))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_existing().await?;

            let mut merge = table.merge_insert(&["id"]);
            merge.when_matched_update_all(None).when_not_matched_insert_all();
            merge
                .execute(Box::new(batches))
                .await
                .context("Failed to merge documents into table")?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        tracing::debug!("Upserted {} documents into '{}'", entries.len(), self.table_name);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_existing().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let contents = string_column(&batch, "page_content")?;
            let metadata = string_column(&batch, "metadata")?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                // 코사인 거리 -> 코사인 유사도
                let similarity = 1.0 - distances.value(i);

                results.push(SearchResult {
                    id: ids.value(i).to_string(),
                    page_content: contents.value(i).to_string(),
                    metadata: metadata.value(i).to_string(),
                    similarity,
                });
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<StoredVector>> {
        if ids.is_empty() || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_existing().await?;

        let stream = table
            .query()
            .only_if(id_filter(ids))
            .limit(ids.len())
            .execute()
            .await
            .context("Failed to query documents by id")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut found: HashMap<String, StoredVector> = HashMap::new();
        for batch in batches {
            let id_col = string_column(&batch, "id")?;
            let contents = string_column(&batch, "page_content")?;
            let metadata = string_column(&batch, "metadata")?;

            for i in 0..batch.num_rows() {
                let id = id_col.value(i).to_string();
                found.insert(
                    id.clone(),
                    StoredVector {
                        id,
                        page_content: contents.value(i).to_string(),
                        metadata: metadata.value(i).to_string(),
                    },
                );
            }
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_existing().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// `id IN (...)` 필터 (작은따옴표 이스케이프)
fn id_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("id IN ({})", quoted.join(", "))
}

// ============================================================================
// Tests
// ============================================================================
