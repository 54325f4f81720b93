//! 도면 이미지 처리
//!
//! 모델에는 항상 RGB JPEG(base64)로 전달합니다.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageOutputFormat};

/// 도면 이미지 확장자 탐색 순서
const BLUEPRINT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// JPEG 인코딩 품질
const JPEG_QUALITY: u8 = 90;

/// 도면 이름으로 이미지 경로 찾기 (`<dir>/<name>.jpg` 우선)
pub fn resolve_blueprint_image(dir: &Path, name: &str) -> Option<PathBuf> {
    BLUEPRINT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|path| path.is_file())
}

/// 이미지를 읽어 RGB JPEG base64 문자열로 변환
pub async fn encode_blueprint_jpeg(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    // 디코딩/인코딩은 CPU 바운드
    tokio::task::spawn_blocking(move || encode_jpeg_blocking(&path))
        .await
        .context("Image encoding task failed")?
}

fn encode_jpeg_blocking(path: &Path) -> Result<String> {
    let img = image::open(path).with_context(|| format!("Failed to open image: {:?}", path))?;

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut bytes: Vec<u8> = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .with_context(|| format!("Failed to encode JPEG: {:?}", path))?;

    tracing::debug!("Encoded {:?} as JPEG ({} bytes)", path, bytes.len());
    Ok(STANDARD.encode(&bytes))
}
