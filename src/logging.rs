use reqwest::header::HeaderMap;
use sonic_rs::prelude::*;
use std::borrow::Cow;
use std::time::Duration;

/// 请求转储等级：
/// - off：不输出请求/响应详情
/// - low：只输出本服务对外 API 的请求摘要
/// - medium：额外输出发往 Gemini 的请求/响应（脱敏 + base64 截断）
/// - high：Gemini 请求/响应原样输出（key 仍然脱敏）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "low" | "client" => Self::Low,
            "medium" | "backend" => Self::Medium,
            "high" | "all" | "raw" => Self::High,
            _ => Self::Off,
        }
    }

    pub fn client_enabled(self) -> bool {
        self >= Self::Low
    }

    pub fn backend_enabled(self) -> bool {
        self >= Self::Medium
    }

    pub fn raw_enabled(self) -> bool {
        self >= Self::High
    }
}

pub fn format_duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// 对外 API 请求摘要（low 及以上）。
pub fn client_request(level: LogLevel, method: &str, path: &str, status: u16, duration: Duration) {
    if !level.client_enabled() {
        return;
    }
    tracing::info!("[客户端] {method} {path} -> {status} ({}ms)", format_duration_ms(duration));
}

pub fn backend_request(level: LogLevel, method: &str, url: &str, headers: &HeaderMap, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        String::from_utf8_lossy(body).into_owned()
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n====================== Gemini 请求 ========================\n[请求] {method} {url}\n[请求头]\n{}\n{}\n==========================================================",
        format_headers(headers),
        body
    );
}

pub fn backend_response(level: LogLevel, status: u16, duration: Duration, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        String::from_utf8_lossy(body).into_owned()
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n====================== Gemini 响应 ========================\n[响应] {} {}ms\n{}\n==========================================================",
        status,
        format_duration_ms(duration),
        body
    );
}

const REDACTED_HEADERS: [&str; 4] = ["x-goog-api-key", "authorization", "apikey", "proxy-authorization"];

fn format_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers.iter() {
        let key = name.as_str();
        let val = if REDACTED_HEADERS.contains(&key.to_lowercase().as_str()) {
            "***".to_string()
        } else {
            value.to_str().unwrap_or("<binary>").to_string()
        };
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&val);
        out.push('\n');
    }
    out
}

fn format_body_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    // 图片请求动辄数 MB，超过阈值不做 JSON 解析。
    const MAX_PARSE_BYTES: usize = 32 * 1024 * 1024;
    if bytes.len() > MAX_PARSE_BYTES {
        return format!("(body too large: {} bytes)", bytes.len());
    }

    match sonic_rs::from_slice::<sonic_rs::Value>(bytes) {
        Ok(v) => {
            let sanitized = sanitize_json_for_log(&v, false);
            sonic_rs::to_string_pretty(&sanitized).unwrap_or_else(|_| sanitized.to_string())
        }
        Err(_) => truncate_text_for_log(&String::from_utf8_lossy(bytes)),
    }
}

fn truncate_text_for_log(s: &str) -> String {
    const MAX_CHARS: usize = 32 * 1024;
    if s.chars().count() <= MAX_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_CHARS).collect();
    out.push_str("...[TRUNCATED]");
    out
}

fn sanitize_json_for_log(v: &sonic_rs::Value, in_inline_data: bool) -> sonic_rs::Value {
    if let Some(obj) = v.as_object() {
        let mut out = sonic_rs::Object::new();
        for (key, child) in obj.iter() {
            let sanitized = match key {
                "inlineData" => sanitize_json_for_log(child, true),
                "data" if in_inline_data => match child.as_str() {
                    Some(s) => sonic_rs::Value::from(truncate_base64(s).as_ref()),
                    None => sanitize_json_for_log(child, false),
                },
                _ => sanitize_json_for_log(child, in_inline_data),
            };
            out.insert(key, sanitized);
        }
        return out.into_value();
    }

    if let Some(arr) = v.as_array() {
        let items: Vec<sonic_rs::Value> = arr
            .iter()
            .map(|item| sanitize_json_for_log(item, in_inline_data))
            .collect();
        return sonic_rs::Value::from(items);
    }

    v.to_owned()
}

fn truncate_base64(s: &str) -> Cow<'_, str> {
    const KEEP: usize = 20;
    if s.len() <= 100 || !s.is_ascii() {
        return Cow::Borrowed(s);
    }
    let omitted = s.len() - KEEP * 2;
    Cow::Owned(format!(
        "{}...[TRUNCATED: {omitted} chars]...{}",
        &s[..KEEP],
        &s[s.len() - KEEP..]
    ))
}
