use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 生成流程对调用方暴露的全部失败。单次尝试的失败在内部消化，不在这里出现。
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("所有 API Key 均已耗尽或失败（共尝试 {attempts} 次），请稍后再试。最后错误: {last}")]
    AllCredentialsExhausted { attempts: usize, last: String },

    #[error("图片无效: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("参数错误: {0}")]
    BadRequest(String),

    #[error("服务暂不可用: {0}")]
    Exhausted(String),

    #[error("后端请求失败: {0}")]
    Backend(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorBodyInner,
}

#[derive(Debug, Serialize)]
struct ErrorBodyInner {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_and_type().0
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Exhausted(_) => (StatusCode::SERVICE_UNAVAILABLE, "exhausted"),
            AppError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend"),
        }
    }
}

impl From<GenerateError> for AppError {
    fn from(e: GenerateError) -> Self {
        match e {
            GenerateError::Configuration(msg) => AppError::Config(msg),
            e @ GenerateError::AllCredentialsExhausted { .. } => AppError::Exhausted(e.to_string()),
            GenerateError::InvalidImage(msg) => AppError::BadRequest(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, ty) = self.status_and_type();
        let body = ErrorBody {
            error: ErrorBodyInner {
                message: self.to_string(),
                r#type: Some(ty.to_string()),
            },
        };

        (status, Json(body)).into_response()
    }
}
