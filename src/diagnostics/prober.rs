use crate::config::Config;
use crate::credential::{CredentialSource, mask_key};
use crate::gemini::types::{GenerateRequest, Part};
use crate::gemini::{ApiError, GenerationBackend};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PROBE_PROMPT: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Ok,
    Error,
}

/// 失败类别，判定顺序即枚举顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCategory {
    QuotaExhausted,
    Blocked,
    BadRequest,
    InvalidKey,
    NotFound,
    Error,
}

impl ProbeCategory {
    pub fn from_error(err: &ApiError) -> Self {
        let status = err.status();
        if status == Some(429) {
            return Self::QuotaExhausted;
        }
        if err.detail().to_lowercase().contains("limit: 0") {
            return Self::Blocked;
        }
        match status {
            Some(400) => Self::BadRequest,
            Some(401 | 403) => Self::InvalidKey,
            Some(404) => Self::NotFound,
            _ => Self::Error,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::QuotaExhausted => "quota exhausted (429)",
            Self::Blocked => "blocked (limit: 0)",
            Self::BadRequest => "bad request (400)",
            Self::InvalidKey => "invalid key",
            Self::NotFound => "model not found (404)",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    /// 配置中的位置（0 起）。
    pub index: usize,
    pub key: String,
    pub status: ProbeState,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ProbeCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl KeyStatus {
    pub fn is_ok(&self) -> bool {
        self.status == ProbeState::Ok
    }
}

pub struct Prober<B> {
    backend: Arc<B>,
    source: CredentialSource,
    model: String,
    pause: Duration,
}

impl<B: GenerationBackend> Prober<B> {
    pub fn new(backend: Arc<B>, source: CredentialSource, model: String, pause: Duration) -> Self {
        Self {
            backend,
            source,
            model,
            pause,
        }
    }

    pub fn from_config(backend: Arc<B>, cfg: &Config) -> Self {
        Self::new(
            backend,
            CredentialSource::from_config(&cfg.api_keys_pool, &cfg.legacy_api_key),
            cfg.probe_model.clone(),
            cfg.probe_pause(),
        )
    }

    /// 按配置顺序逐个探测，不会失败；每次探测后固定暂停。
    pub async fn probe_all(&self) -> Vec<KeyStatus> {
        if self.source.is_empty() {
            tracing::warn!("诊断：没有配置任何 API Key");
            return Vec::new();
        }

        let request = GenerateRequest::user(vec![Part::text(PROBE_PROMPT)]);
        let mut out = Vec::with_capacity(self.source.len());

        for (index, key) in self.source.keys().iter().enumerate() {
            let start = Instant::now();
            let result = self
                .backend
                .generate_content(key, &self.model, &request)
                .await;
            let latency_ms = crate::logging::format_duration_ms(start.elapsed());

            let status = match result {
                Ok(_) => KeyStatus {
                    index,
                    key: mask_key(key),
                    status: ProbeState::Ok,
                    latency_ms,
                    category: None,
                    message: None,
                    checked_at: Utc::now(),
                },
                Err(e) => {
                    let category = ProbeCategory::from_error(&e);
                    tracing::warn!(
                        key = %mask_key(key),
                        category = category.label(),
                        "诊断探测失败: {}",
                        e.detail()
                    );
                    KeyStatus {
                        index,
                        key: mask_key(key),
                        status: ProbeState::Error,
                        latency_ms,
                        category: Some(category),
                        message: Some(category.label().to_string()),
                        checked_at: Utc::now(),
                    }
                }
            };
            out.push(status);

            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        let ok = out.iter().filter(|s| s.is_ok()).count();
        tracing::info!("诊断完成：可用 {ok}，失败 {}", out.len() - ok);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{MemoryPreferenceStore, PreferenceStore};
    use crate::error::GenerateError;
    use crate::generation::orchestrator::testing::{Scripted, ScriptedBackend};
    use crate::generation::{GenerateInput, Generator, SubjectImage};

    fn http(status: u16, message: &str) -> ApiError {
        ApiError::Http {
            status,
            status_text: String::new(),
            message: message.to_string(),
        }
    }

    fn prober(backend: &Arc<ScriptedBackend>, pool: &str) -> Prober<ScriptedBackend> {
        Prober::new(
            Arc::clone(backend),
            CredentialSource::from_config(pool, ""),
            "gemini-2.5-flash-lite".to_string(),
            Duration::ZERO,
        )
    }

    #[test]
    fn categories_follow_check_order() {
        assert_eq!(
            ProbeCategory::from_error(&http(429, "limit: 0")),
            ProbeCategory::QuotaExhausted
        );
        assert_eq!(
            ProbeCategory::from_error(&http(400, "Quota exceeded, limit: 0")),
            ProbeCategory::Blocked
        );
        assert_eq!(
            ProbeCategory::from_error(&http(400, "bad")),
            ProbeCategory::BadRequest
        );
        assert_eq!(
            ProbeCategory::from_error(&http(403, "denied")),
            ProbeCategory::InvalidKey
        );
        assert_eq!(
            ProbeCategory::from_error(&http(401, "unauthenticated")),
            ProbeCategory::InvalidKey
        );
        assert_eq!(
            ProbeCategory::from_error(&http(404, "no such model")),
            ProbeCategory::NotFound
        );
        assert_eq!(
            ProbeCategory::from_error(&http(503, "overloaded")),
            ProbeCategory::Error
        );
    }

    #[tokio::test]
    async fn probes_every_key_in_configuration_order() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on_key("key-aaaa", Scripted::Body(r#"{"candidates":[]}"#))
                .on_key(
                    "key-cccc",
                    Scripted::Http {
                        status: 403,
                        status_text: "PERMISSION_DENIED",
                        message: "denied",
                    },
                ),
        );
        let rows = prober(&backend, "key-aaaa,key-bbbb,key-cccc").probe_all().await;

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["...aaaa", "...bbbb", "...cccc"]
        );
        assert!(rows[0].is_ok());
        assert_eq!(rows[0].message, None);
        assert_eq!(rows[1].category, Some(ProbeCategory::QuotaExhausted));
        assert_eq!(rows[2].category, Some(ProbeCategory::InvalidKey));
        assert_eq!(rows[2].index, 2);

        let calls = backend.calls();
        assert_eq!(
            calls.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["key-aaaa", "key-bbbb", "key-cccc"]
        );
        assert!(calls.iter().all(|(_, m)| m == "gemini-2.5-flash-lite"));
        let sent = backend.last_request().unwrap();
        assert_eq!(sent.contents[0].parts[0].text, "ping");
        assert!(sent.generation_config.is_none());
    }

    #[tokio::test]
    async fn empty_configuration_gives_empty_report() {
        let backend = Arc::new(ScriptedBackend::new());
        assert!(prober(&backend, "").probe_all().await.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_pool_shows_all_errors_and_clears_preference() {
        let backend = Arc::new(ScriptedBackend::new());
        let store = Arc::new(MemoryPreferenceStore::with_value("k1"));
        let generator = Generator::new(
            Arc::clone(&backend),
            CredentialSource::from_config("k1,k2,k3", ""),
            store.clone(),
            vec!["fast".to_string(), "pro".to_string()],
            Duration::ZERO,
        );
        let err = generator
            .generate(GenerateInput {
                image: SubjectImage {
                    mime_type: "image/jpeg".to_string(),
                    bytes: b"shoe".to_vec(),
                },
                template: None,
                ratio_tag: "1:1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::AllCredentialsExhausted { attempts: 6, .. }));
        assert_eq!(store.get(), None);

        let rows = prober(&backend, "k1,k2,k3").probe_all().await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| !r.is_ok()));
        assert!(
            rows.iter()
                .all(|r| r.category == Some(ProbeCategory::QuotaExhausted))
        );
        // 探测不碰偏好
        assert_eq!(store.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_every_probe_whatever_the_outcome() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on_key("ok-1", Scripted::Body(r#"{"candidates":[]}"#))
                .on_key("bad-2", Scripted::invalid_key()),
        );
        let prober = Prober::new(
            Arc::clone(&backend),
            CredentialSource::from_config("ok-1,bad-2,gone-3", ""),
            "gemini-2.5-flash-lite".to_string(),
            Duration::from_millis(200),
        );
        let start = tokio::time::Instant::now();
        let rows = prober.probe_all().await;

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(!rows[1].is_ok() && !rows[2].is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(600));
        // 暂停不计入单次延迟
        assert!(rows.iter().all(|r| r.latency_ms == 0));
    }
}
