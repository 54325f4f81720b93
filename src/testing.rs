//! 테스트용 가짜 모델/임베더와 픽스처

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::features::FeatureMap;
use crate::template::{
    DimensionDescriptor, DimensionTemplate, ModelRequest, StructuredModel, TemplateMetadata,
};

// ============================================================================
// ScriptedModel
// ============================================================================

/// 정해진 응답을 순서대로 돌려주는 모델
///
/// 스크립트가 끝나면 마지막 응답을 반복합니다.
pub struct ScriptedModel {
    script: Vec<Result<Vec<DimensionDescriptor>, String>>,
    pub calls: AtomicUsize,
    last_request: Mutex<Option<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<Vec<DimensionDescriptor>, String>>) -> Self {
        assert!(!script.is_empty());
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// 항상 같은 결과
    pub fn always(descriptors: Vec<DimensionDescriptor>) -> Self {
        Self::new(vec![Ok(descriptors)])
    }

    /// 처음 `failures`번은 오류, 이후 같은 결과
    pub fn failing_then(failures: usize, descriptors: Vec<DimensionDescriptor>) -> Self {
        let mut script: Vec<_> = (0..failures)
            .map(|i| Err(format!("transient failure {}", i + 1)))
            .collect();
        script.push(Ok(descriptors));
        Self::new(script)
    }

    pub fn last_request(&self) -> Option<ModelRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredModel for ScriptedModel {
    async fn generate_structured(&self, request: &ModelRequest) -> Result<Vec<DimensionDescriptor>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let step = &self.script[call.min(self.script.len() - 1)];
        match step {
            Ok(descriptors) => Ok(descriptors.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// BagOfWordsEmbedding
// ============================================================================

/// 결정적 bag-of-words 임베더 (FNV-1a 해시 버킷)
pub struct BagOfWordsEmbedding {
    dimension: usize,
}

impl Default for BagOfWordsEmbedding {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl BagOfWordsEmbedding {
    fn bucket(&self, token: &str) -> usize {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        // 토큰이 없으면 고정 버킷 하나 (영벡터 방지)
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter().map(|v| v / norm).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn descriptor(name: &str, alphabet: &str, value: f64) -> DimensionDescriptor {
    DimensionDescriptor {
        name: name.to_string(),
        alphabet: alphabet.to_string(),
        value,
        desc: format!("{} of the part", name),
    }
}

/// Bolt / Bolt>Stud, D 값만 가진 피처 맵
pub fn bolt_features(diameter: f64) -> FeatureMap {
    FeatureMap::new()
        .with("part_type", "Bolt")
        .with("classification", "Bolt>Stud")
        .with("D", diameter)
}

/// (D, L) 두 치수를 가진 boltA 템플릿
pub fn bolt_template() -> DimensionTemplate {
    DimensionTemplate {
        part_type: "Bolt".to_string(),
        classification: "Bolt>Stud".to_string(),
        dimension_details: vec![descriptor("Diameter", "D", 0.0), descriptor("Length", "L", 16.0)],
        metadata: TemplateMetadata {
            blueprint: "boltA.jpg".to_string(),
            ori_features: bolt_features(10.0).to_canonical_json().unwrap(),
        },
    }
}
