use serde::Serialize;

/// 用户选择的输出格式 → (Gemini 原生比例, 模板预处理尺寸, 最终尺寸)。
///
/// 预处理尺寸的高宽比总是 ≥ 最终尺寸，所以后处理只需要裁剪，不需要补边。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputProfile {
    pub tag: &'static str,
    pub native_ratio: &'static str,
    pub input_width: u32,
    pub input_height: u32,
    pub final_width: u32,
    pub final_height: u32,
}

pub const SQUARE: OutputProfile = OutputProfile {
    tag: "1:1",
    native_ratio: "1:1",
    input_width: 1080,
    input_height: 1080,
    final_width: 1080,
    final_height: 1080,
};

pub const STORY: OutputProfile = OutputProfile {
    tag: "9:16",
    native_ratio: "9:16",
    input_width: 1080,
    input_height: 1920,
    final_width: 1080,
    final_height: 1920,
};

// Gemini 没有 4:5，用最接近的 3:4 生成再裁掉上下各 45px。
pub const PORTRAIT: OutputProfile = OutputProfile {
    tag: "4:5",
    native_ratio: "3:4",
    input_width: 1080,
    input_height: 1440,
    final_width: 1080,
    final_height: 1350,
};

pub const ALL_PROFILES: [OutputProfile; 3] = [SQUARE, PORTRAIT, STORY];

impl OutputProfile {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        ALL_PROFILES.into_iter().find(|p| p.tag == tag)
    }

    /// 未知格式按 1:1 处理。
    pub fn resolve(tag: &str) -> Self {
        Self::from_tag(tag).unwrap_or_else(|| {
            tracing::warn!("未知输出格式 {tag:?}，按 1:1 处理");
            SQUARE
        })
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn final_size(&self) -> (u32, u32) {
        (self.final_width, self.final_height)
    }
}
