use crate::config::Config;
use crate::gemini::types::{GenerateRequest, GenerateResponse};
use crate::logging::{self, LogLevel};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use sonic_rs::JsonValueTrait;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Gemini API 错误 {status}: {message}")]
    Http {
        status: u16,
        /// google.rpc 状态名，如 RESOURCE_EXHAUSTED / PERMISSION_DENIED。
        status_text: String,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] sonic_rs::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 用于分类的完整错误文本（状态名 + 消息）。
    pub fn detail(&self) -> String {
        match self {
            Self::Http {
                status_text,
                message,
                ..
            } if !status_text.is_empty() => format!("{status_text}: {message}"),
            other => other.to_string(),
        }
    }
}

/// 远端生成调用的抽象，便于在测试中替换为脚本化实现。
pub trait GenerationBackend: Send + Sync {
    fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        req: &GenerateRequest,
    ) -> impl Future<Output = Result<GenerateResponse, ApiError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    log_level: LogLevel,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90));

        if cfg.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(cfg.timeout_ms));
        }
        if !cfg.proxy.trim().is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(cfg.proxy.trim())?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: cfg.base_url.clone(),
            log_level: cfg.log_level(),
        })
    }

    pub fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(model)
        )
    }

    fn build_headers(&self, api_key: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static("mockgen/0.1"));
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(v) = HeaderValue::from_str(api_key) {
            h.insert(API_KEY_HEADER, v);
        }
        h
    }
}

impl GenerationBackend for GeminiClient {
    // 只发一次：换模型/换 key 的决策全部在上层完成，这里不做原地重试。
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiError> {
        let url = self.generate_url(model);
        let body = sonic_rs::to_vec(req)?;
        let headers = self.build_headers(api_key);
        logging::backend_request(self.log_level, "POST", &url, &headers, &body);

        let start = Instant::now();
        let resp = self.http.post(&url).headers(headers).body(body).send().await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        logging::backend_response(self.log_level, status.as_u16(), start.elapsed(), &bytes);

        if !status.is_success() {
            return Err(extract_error_details(status.as_u16(), &bytes));
        }
        Ok(sonic_rs::from_slice::<GenerateResponse>(&bytes)?)
    }
}

fn extract_error_details(status: u16, body: &[u8]) -> ApiError {
    #[derive(Debug, serde::Deserialize)]
    struct ErrResp {
        error: ErrInner,
    }

    #[derive(Debug, serde::Deserialize)]
    struct ErrInner {
        #[serde(default)]
        code: Option<sonic_rs::Value>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        status: String,
    }

    let mut out_status = status;
    let mut status_text = String::new();
    let mut message = String::from_utf8_lossy(body).trim().to_string();
    if message.is_empty() {
        message = "Unknown error".to_string();
    }

    if let Ok(err_resp) = sonic_rs::from_slice::<ErrResp>(body) {
        let err = err_resp.error;
        message = err.message;
        status_text = err.status;

        if let Some(code) = err.code {
            if let Some(i) = code.as_i64() {
                if i > 0 && i <= u16::MAX as i64 {
                    out_status = i as u16;
                }
            } else if let Some(s) = code.as_str() {
                match s.to_uppercase().as_str() {
                    "RESOURCE_EXHAUSTED" => out_status = 429,
                    "PERMISSION_DENIED" => out_status = 403,
                    "UNAUTHENTICATED" => out_status = 401,
                    "NOT_FOUND" => out_status = 404,
                    _ => {}
                }
            }
        }
    }

    ApiError::Http {
        status: out_status,
        status_text,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_error_details_reads_google_rpc_body() {
        let body = r#"{
            "error": {
                "code": 429,
                "message": "You exceeded your current quota. Quota exceeded for metric: generate_content_free_tier_requests, limit: 0",
                "status": "RESOURCE_EXHAUSTED"
            }
        }"#;
        let err = extract_error_details(429, body.as_bytes());
        assert_eq!(err.status(), Some(429));
        let detail = err.detail();
        assert!(detail.starts_with("RESOURCE_EXHAUSTED: "));
        assert!(detail.contains("limit: 0"));
    }

    #[test]
    fn extract_error_details_maps_string_codes() {
        let body = r#"{"error": {"code": "PERMISSION_DENIED", "message": "denied"}}"#;
        let err = extract_error_details(400, body.as_bytes());
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn extract_error_details_keeps_plain_text_body() {
        let err = extract_error_details(502, b"upstream connect error");
        assert_eq!(err.status(), Some(502));
        assert!(err.detail().contains("upstream connect error"));
    }

    #[test]
    fn generate_url_escapes_model_name() {
        let mut cfg = Config::for_tests("");
        cfg.base_url = "http://localhost:1".to_string();
        let client = GeminiClient::new(&cfg).unwrap();
        assert_eq!(
            client.generate_url("gemini-2.5-flash-image"),
            "http://localhost:1/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }
}
