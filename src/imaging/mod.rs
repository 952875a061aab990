//! 几何预处理/后处理：把 Gemini 原生支持的宽高比和用户要的最终尺寸对齐。
//!
//! - 模板图（背景）先 cover-fit 到原生比例的输入尺寸，再交给模型；
//! - 模型返回的图一律 center-crop 到最终尺寸。
//!
//! 像素运算都是同步 CPU 任务，`*_png` 包装放到 blocking 线程池执行。

pub mod codec;
pub mod geometry;
pub mod transform;

pub use transform::{center_crop, cover_fit};

use image::GenericImageView;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("图片解码失败: {0}")]
    Decode(String),

    #[error("图片编码失败: {0}")]
    Encode(String),

    #[error("base64 解码失败: {0}")]
    Base64(String),

    #[error("目标尺寸无效: {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    #[error("图片处理任务异常退出: {0}")]
    Task(String),
}

/// 处理后的 PNG。
#[derive(Debug, Clone)]
pub struct PngImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

async fn run_blocking<F>(f: F) -> Result<PngImage, ImagingError>
where
    F: FnOnce() -> Result<PngImage, ImagingError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ImagingError::Task(e.to_string()))?
}

/// 解码 → cover-fit → PNG。
pub async fn cover_fit_png(bytes: Vec<u8>, width: u32, height: u32) -> Result<PngImage, ImagingError> {
    run_blocking(move || {
        let img = codec::decode(&bytes)?;
        let out = cover_fit(&img, width, height)?;
        let (width, height) = out.dimensions();
        Ok(PngImage {
            bytes: codec::encode_png(&out)?,
            width,
            height,
        })
    })
    .await
}

/// 解码 → center-crop → PNG。
pub async fn center_crop_png(bytes: Vec<u8>, width: u32, height: u32) -> Result<PngImage, ImagingError> {
    run_blocking(move || {
        let img = codec::decode(&bytes)?;
        let out = center_crop(&img, width, height)?;
        let (width, height) = out.dimensions();
        Ok(PngImage {
            bytes: codec::encode_png(&out)?,
            width,
            height,
        })
    })
    .await
}
