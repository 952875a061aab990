//! 单次尝试结果分类。
//!
//! 规则（先判额度耗尽，与文本匹配顺序一致）：
//! - 额度耗尽：HTTP 429/404，或错误文本含 limit / exhausted / quota / too many requests
//! - key 无效：HTTP 401/403，或 API_KEY_INVALID / PERMISSION_DENIED / UNAUTHENTICATED
//! - 内容拦截：promptFeedback.blockReason，或无图且 finishReason 属于安全类
//! - 空结果：没有图片数据，也没有拦截原因
//! - 其他一律视为致命错误
//!
//! 只有额度耗尽会继续试同一 key 的下一个模型；其余类别直接放弃该 key。

use crate::gemini::ApiError;
use crate::gemini::types::{GenerateResponse, InlineData};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Exhaustion,
    InvalidCredential,
    ContentPolicy,
    EmptyResult,
    Fatal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exhaustion => "exhaustion",
            Self::InvalidCredential => "invalid_credential",
            Self::ContentPolicy => "content_policy",
            Self::EmptyResult => "empty_result",
            Self::Fatal => "fatal",
        }
    }

    /// 是否放弃当前 key 的剩余模型。
    pub fn abandons_credential(self) -> bool {
        !matches!(self, Self::Exhaustion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.detail)
    }
}

const EXHAUSTION_MARKERS: [&str; 4] = ["limit", "exhausted", "quota", "too many requests"];
const INVALID_KEY_MARKERS: [&str; 4] = [
    "api_key_invalid",
    "api key not valid",
    "permission_denied",
    "unauthenticated",
];
const SAFETY_FINISH_REASONS: [&str; 6] = [
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
    "IMAGE_PROHIBITED_CONTENT",
];

pub fn classify_error(err: &ApiError) -> Failure {
    let detail = err.detail();
    let text = detail.to_lowercase();
    let status = err.status();

    let kind = if matches!(status, Some(429 | 404))
        || EXHAUSTION_MARKERS.iter().any(|m| text.contains(m))
    {
        FailureKind::Exhaustion
    } else if matches!(status, Some(401 | 403))
        || INVALID_KEY_MARKERS.iter().any(|m| text.contains(m))
    {
        FailureKind::InvalidCredential
    } else {
        FailureKind::Fatal
    };

    Failure::new(kind, detail)
}

/// 成功返回第一张图片，否则给出失败类别。拦截原因优先于图片数据。
pub fn classify_response(resp: &GenerateResponse) -> Result<&InlineData, Failure> {
    if let Some(reason) = resp.block_reason() {
        return Err(Failure::new(
            FailureKind::ContentPolicy,
            format!("安全拦截: {reason}"),
        ));
    }

    if let Some(image) = resp.first_image() {
        return Ok(image);
    }

    match resp.finish_reason() {
        Some(reason) if SAFETY_FINISH_REASONS.contains(&reason) => Err(Failure::new(
            FailureKind::ContentPolicy,
            format!("安全拦截: {reason}"),
        )),
        Some(reason) => Err(Failure::new(
            FailureKind::EmptyResult,
            format!("生成结果为空 (finishReason={reason})"),
        )),
        None => Err(Failure::new(FailureKind::EmptyResult, "生成结果为空")),
    }
}

pub fn classify(result: &Result<GenerateResponse, ApiError>) -> Result<&InlineData, Failure> {
    match result {
        Ok(resp) => classify_response(resp),
        Err(err) => Err(classify_error(err)),
    }
}
