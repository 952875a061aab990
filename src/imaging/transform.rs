use super::ImagingError;
use super::geometry::center_crop_rect;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

fn ensure_target(width: u32, height: u32) -> Result<(), ImagingError> {
    if width == 0 || height == 0 {
        return Err(ImagingError::InvalidTarget { width, height });
    }
    Ok(())
}

/// 先在源图上取同比例的居中区域，再缩放到精确的 `width × height`。
///
/// 尺寸已经正确时原样返回。
fn crop_then_scale(img: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, ImagingError> {
    ensure_target(width, height)?;
    let source = img.dimensions();
    if source == (width, height) {
        return Ok(img.clone());
    }

    let r = center_crop_rect(source, (width, height));
    let cropped = img.crop_imm(r.x, r.y, r.width, r.height);
    if cropped.dimensions() == (width, height) {
        return Ok(cropped);
    }
    Ok(cropped.resize_exact(width, height, FilterType::Lanczos3))
}

/// 铺满 `width × height`，溢出部分居中裁掉（等价 CSS `object-fit: cover`）。
pub fn cover_fit(img: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, ImagingError> {
    crop_then_scale(img, width, height)
}

/// 只裁不补：对称裁掉多出来的一个方向，再缩放到目标尺寸。重复调用是 no-op。
pub fn center_crop(
    img: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<DynamicImage, ImagingError> {
    crop_then_scale(img, width, height)
}
