use super::ImagingError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

pub const PNG_MIME: &str = "image/png";

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImagingError> {
    if bytes.is_empty() {
        return Err(ImagingError::Decode("图片数据为空".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImagingError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// 接受纯 base64，也接受 `data:<mime>;base64,<payload>` 形式。
pub fn from_base64(data: &str) -> Result<Vec<u8>, ImagingError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ImagingError::Base64(e.to_string()))
}

/// 从 data URL 前缀里取 MIME；没有前缀时返回 None。
pub fn data_url_mime(data: &str) -> Option<&str> {
    let rest = data.strip_prefix("data:")?;
    let (mime, _) = rest.split_once(";base64,")?;
    Some(mime).filter(|m| !m.is_empty())
}
