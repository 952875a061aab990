use super::profile::OutputProfile;
use crate::gemini::types::{GenerateRequest, Part};
use crate::imaging::codec::{self, PNG_MIME};

const CLEANING_INSTRUCTIONS: &str = "CRITICAL: REMOVE ALL BOXES/PACKAGING. \
1. EXTRACT ONLY THE SHOES. \
2. Place shoes DIRECTLY on the surface. \
3. Realistic lighting and shadows.";

pub fn composite_instruction() -> String {
    format!("Composite shoes into background. {CLEANING_INSTRUCTIONS}")
}

pub fn scene_instruction() -> String {
    format!(
        "High-end footwear photography. Shoes on wooden table. \
Background: vertical garden with white roses and \"BELLA\" sign. {CLEANING_INSTRUCTIONS}"
    )
}

/// 原样发送的用户图片。
#[derive(Debug, Clone)]
pub struct SubjectImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// 有模板：[模板 PNG, 商品图, 指令]；无模板：[商品图, 指令]。
pub fn build_request(
    subject: &SubjectImage,
    template_png: Option<&[u8]>,
    profile: &OutputProfile,
) -> GenerateRequest {
    let subject_part = Part::inline(subject.mime_type.clone(), codec::to_base64(&subject.bytes));
    let parts = match template_png {
        Some(template) => vec![
            Part::inline(PNG_MIME, codec::to_base64(template)),
            subject_part,
            Part::text(composite_instruction()),
        ],
        None => vec![subject_part, Part::text(scene_instruction())],
    };
    GenerateRequest::user(parts).with_aspect_ratio(profile.native_ratio)
}
