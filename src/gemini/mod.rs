//! Gemini `generateContent` 传输层：线上结构、HTTP 客户端与可替换的调用抽象。

pub mod client;
pub mod types;

pub use client::{ApiError, GeminiClient, GenerationBackend};
