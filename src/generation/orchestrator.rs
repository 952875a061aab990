use super::attempt::{GenerationAttempt, plan_attempts};
use super::classify::{Failure, FailureKind, classify};
use super::profile::OutputProfile;
use super::prompt::{SubjectImage, build_request};
use crate::config::Config;
use crate::credential::{CredentialSource, PreferenceStore, build_pool, mask_key};
use crate::error::GenerateError;
use crate::gemini::GenerationBackend;
use crate::gemini::types::InlineData;
use crate::imaging::{self, codec};
use std::sync::Arc;
use std::time::Duration;

pub struct GenerateInput {
    pub image: SubjectImage,
    /// 背景模板原始字节（任意可解码格式）。
    pub template: Option<Vec<u8>>,
    pub ratio_tag: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub model: String,
    /// 脱敏后的 key。
    pub credential_hint: String,
}

/// 单次生成：按 (key, 模型) 计划线性尝试，拿到第一张图即返回。
pub struct Generator<B> {
    backend: Arc<B>,
    source: CredentialSource,
    store: Arc<dyn PreferenceStore>,
    models: Vec<String>,
    credential_pause: Duration,
}

impl<B: GenerationBackend> Generator<B> {
    pub fn new(
        backend: Arc<B>,
        source: CredentialSource,
        store: Arc<dyn PreferenceStore>,
        models: Vec<String>,
        credential_pause: Duration,
    ) -> Self {
        Self {
            backend,
            source,
            store,
            models,
            credential_pause,
        }
    }

    pub fn from_config(backend: Arc<B>, store: Arc<dyn PreferenceStore>, cfg: &Config) -> Self {
        Self::new(
            backend,
            CredentialSource::from_config(&cfg.api_keys_pool, &cfg.legacy_api_key),
            store,
            cfg.generation_models.clone(),
            cfg.credential_pause(),
        )
    }

    pub async fn generate(&self, input: GenerateInput) -> Result<GeneratedImage, GenerateError> {
        let profile = OutputProfile::resolve(&input.ratio_tag);
        if input.image.bytes.is_empty() {
            return Err(GenerateError::InvalidImage("商品图片为空".to_string()));
        }

        let template_png = match input.template {
            Some(raw) => {
                let (w, h) = profile.input_size();
                let fitted = imaging::cover_fit_png(raw, w, h)
                    .await
                    .map_err(|e| GenerateError::InvalidImage(format!("模板处理失败: {e}")))?;
                Some(fitted.bytes)
            }
            None => None,
        };
        let request = build_request(&input.image, template_png.as_deref(), &profile);

        let pool = build_pool(&self.source, self.store.as_ref())?;
        let plan = plan_attempts(&pool, &self.models);
        if plan.is_empty() {
            return Err(GenerateError::Configuration(
                "没有配置生成模型（GENERATION_MODELS）".to_string(),
            ));
        }

        tracing::info!(
            ratio = profile.tag,
            native_ratio = profile.native_ratio,
            keys = pool.len(),
            models = self.models.len(),
            template = template_png.is_some(),
            "开始生成"
        );

        let mut attempts = 0usize;
        let mut last: Option<Failure> = None;
        let mut abandoned: Option<usize> = None;

        for attempt in &plan {
            if abandoned == Some(attempt.credential_index) {
                continue;
            }
            attempts += 1;
            tracing::info!(
                key = %mask_key(&attempt.credential),
                model = %attempt.model,
                "尝试 {}/{} 号 key",
                attempt.credential_index + 1,
                pool.len()
            );

            let result = self
                .backend
                .generate_content(&attempt.credential, &attempt.model, &request)
                .await;

            let failure = match classify(&result) {
                Ok(image) => {
                    self.store.set(&attempt.credential);
                    match self.finish(image, &profile, attempt).await {
                        Ok(out) => return Ok(out),
                        Err(f) => f,
                    }
                }
                Err(f) => f,
            };

            tracing::warn!(
                key = %mask_key(&attempt.credential),
                model = %attempt.model,
                kind = failure.kind.as_str(),
                "生成失败: {}",
                failure.detail
            );

            if failure.kind.abandons_credential() {
                abandoned = Some(attempt.credential_index);
            } else if attempt.last_model {
                self.on_credential_exhausted(attempt, pool.len()).await;
            }
            last = Some(failure);
        }

        Err(GenerateError::AllCredentialsExhausted {
            attempts,
            last: last.map(|f| f.to_string()).unwrap_or_default(),
        })
    }

    async fn on_credential_exhausted(&self, attempt: &GenerationAttempt, pool_len: usize) {
        if self.store.clear_if(&attempt.credential) {
            tracing::info!(key = %mask_key(&attempt.credential), "偏好 key 已耗尽，清除偏好");
        }
        let has_next = attempt.credential_index + 1 < pool_len;
        if has_next && !self.credential_pause.is_zero() {
            tokio::time::sleep(self.credential_pause).await;
        }
    }

    async fn finish(
        &self,
        image: &InlineData,
        profile: &OutputProfile,
        attempt: &GenerationAttempt,
    ) -> Result<GeneratedImage, Failure> {
        let raw = codec::from_base64(&image.data)
            .map_err(|e| Failure::new(FailureKind::Fatal, e.to_string()))?;
        let (w, h) = profile.final_size();
        let cropped = imaging::center_crop_png(raw, w, h)
            .await
            .map_err(|e| Failure::new(FailureKind::Fatal, e.to_string()))?;

        tracing::info!(
            key = %mask_key(&attempt.credential),
            model = %attempt.model,
            width = cropped.width,
            height = cropped.height,
            "生成成功"
        );

        Ok(GeneratedImage {
            mime_type: codec::PNG_MIME.to_string(),
            bytes: cropped.bytes,
            width: cropped.width,
            height: cropped.height,
            model: attempt.model.clone(),
            credential_hint: mask_key(&attempt.credential),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::gemini::types::{GenerateRequest, GenerateResponse};
    use crate::gemini::{ApiError, GenerationBackend};
    use crate::imaging::codec;
    use image::{DynamicImage, RgbImage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Scripted {
        Image { width: u32, height: u32 },
        Http { status: u16, status_text: &'static str, message: &'static str },
        Body(&'static str),
    }

    impl Scripted {
        pub fn exhausted() -> Self {
            Self::Http {
                status: 429,
                status_text: "RESOURCE_EXHAUSTED",
                message: "Resource has been exhausted (e.g. check quota).",
            }
        }

        pub fn invalid_key() -> Self {
            Self::Http {
                status: 400,
                status_text: "INVALID_ARGUMENT",
                message: "API key not valid. Please pass a valid API key.",
            }
        }
    }

    /// 按 (key, 模型) 返回预设结果，并记录调用顺序。未配置的组合视为耗尽。
    #[derive(Default)]
    pub struct ScriptedBackend {
        outcomes: HashMap<(String, String), Scripted>,
        by_key: HashMap<String, Scripted>,
        calls: Mutex<Vec<(String, String)>>,
        last_request: Mutex<Option<GenerateRequest>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, key: &str, model: &str, outcome: Scripted) -> Self {
            self.outcomes
                .insert((key.to_string(), model.to_string()), outcome);
            self
        }

        pub fn on_key(mut self, key: &str, outcome: Scripted) -> Self {
            self.by_key.insert(key.to_string(), outcome);
            self
        }

        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn last_request(&self) -> Option<GenerateRequest> {
            self.last_request.lock().unwrap().clone()
        }

        fn respond(outcome: Scripted) -> Result<GenerateResponse, ApiError> {
            match outcome {
                Scripted::Image { width, height } => {
                    let png = codec::encode_png(&DynamicImage::ImageRgb8(RgbImage::new(width, height)))
                        .unwrap();
                    let body = format!(
                        r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"image/png","data":"{}"}}}}]}},"finishReason":"STOP"}}]}}"#,
                        codec::to_base64(&png)
                    );
                    Ok(sonic_rs::from_str(&body).unwrap())
                }
                Scripted::Http {
                    status,
                    status_text,
                    message,
                } => Err(ApiError::Http {
                    status,
                    status_text: status_text.to_string(),
                    message: message.to_string(),
                }),
                Scripted::Body(body) => Ok(sonic_rs::from_str(body).unwrap()),
            }
        }
    }

    impl GenerationBackend for ScriptedBackend {
        async fn generate_content(
            &self,
            api_key: &str,
            model: &str,
            req: &GenerateRequest,
        ) -> Result<GenerateResponse, ApiError> {
            *self.last_request.lock().unwrap() = Some(req.clone());
            self.calls
                .lock()
                .unwrap()
                .push((api_key.to_string(), model.to_string()));
            let outcome = self
                .outcomes
                .get(&(api_key.to_string(), model.to_string()))
                .or_else(|| self.by_key.get(api_key))
                .cloned()
                .unwrap_or_else(Scripted::exhausted);
            Self::respond(outcome)
        }
    }
}
