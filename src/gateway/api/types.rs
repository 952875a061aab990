use crate::error::AppError;
use crate::generation::{GeneratedImage, SubjectImage};
use crate::imaging::codec;
use crate::scenario::ScenarioRecord;
use serde::{Deserialize, Serialize};

const DEFAULT_SUBJECT_MIME: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub image: InlineImage,
    /// base64 或 data URL；与 scenarioId 同时给出时以它为准。
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<i64>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

impl GenerateBody {
    pub fn subject(&self) -> Result<SubjectImage, AppError> {
        let bytes = codec::from_base64(&self.image.data)
            .map_err(|e| AppError::bad_request(format!("image: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("image: 图片数据为空"));
        }
        let mime_type = Some(self.image.mime_type.trim())
            .filter(|m| !m.is_empty())
            .or_else(|| codec::data_url_mime(&self.image.data))
            .unwrap_or(DEFAULT_SUBJECT_MIME)
            .to_string();
        Ok(SubjectImage { mime_type, bytes })
    }

    pub fn template_bytes(&self) -> Result<Option<Vec<u8>>, AppError> {
        match self.template.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => codec::from_base64(t)
                .map(Some)
                .map_err(|e| AppError::bad_request(format!("template: {e}"))),
            _ => Ok(None),
        }
    }

    /// 显式格式优先，其次场景名推断，最后 1:1。
    pub fn ratio_tag(&self, scenario: Option<&ScenarioRecord>) -> String {
        self.aspect_ratio
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| scenario.map(|s| s.suggested_ratio().to_string()))
            .unwrap_or_else(|| "1:1".to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReply {
    pub mime_type: String,
    pub data: String,
    pub width: u32,
    pub height: u32,
    pub model: String,
    pub key: String,
}

impl From<GeneratedImage> for GenerateReply {
    fn from(img: GeneratedImage) -> Self {
        Self {
            data: codec::to_base64(&img.bytes),
            mime_type: img.mime_type,
            width: img.width,
            height: img.height,
            model: img.model,
            key: img.credential_hint,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ScenarioQuery {
    #[serde(default)]
    pub refresh: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioView {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub suggested_ratio: &'static str,
}

impl From<ScenarioRecord> for ScenarioView {
    fn from(r: ScenarioRecord) -> Self {
        Self {
            suggested_ratio: r.suggested_ratio(),
            id: r.id,
            name: r.name,
            image_url: r.image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::fallback_records;

    fn body(json: &str) -> GenerateBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn subject_mime_falls_back_to_data_url_then_jpeg() {
        let b = body(r#"{"image":{"data":"data:image/webp;base64,Zm9v"}}"#);
        let s = b.subject().unwrap();
        assert_eq!(s.mime_type, "image/webp");
        assert_eq!(s.bytes, b"foo");

        let b = body(r#"{"image":{"data":"Zm9v"}}"#);
        assert_eq!(b.subject().unwrap().mime_type, "image/jpeg");

        let b = body(r#"{"image":{"mimeType":"image/png","data":"Zm9v"}}"#);
        assert_eq!(b.subject().unwrap().mime_type, "image/png");
    }

    #[test]
    fn bad_payloads_are_rejected() {
        assert!(matches!(
            body(r#"{"image":{"data":"@@@"}}"#).subject(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            body(r#"{"image":{"data":""}}"#).subject(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            body(r#"{"image":{"data":"Zm9v"},"template":"@@@"}"#).template_bytes(),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(
            body(r#"{"image":{"data":"Zm9v"},"template":"  "}"#)
                .template_bytes()
                .unwrap(),
            None
        );
    }

    #[test]
    fn ratio_prefers_explicit_then_scenario() {
        let story = fallback_records().pop().unwrap();
        let b = body(r#"{"image":{"data":"Zm9v"},"scenarioId":103}"#);
        assert_eq!(b.scenario_id, Some(103));
        assert_eq!(b.ratio_tag(Some(&story)), "9:16");
        assert_eq!(b.ratio_tag(None), "1:1");

        let b = body(r#"{"image":{"data":"Zm9v"},"scenarioId":103,"aspectRatio":"4:5"}"#);
        assert_eq!(b.ratio_tag(Some(&story)), "4:5");
    }

    #[test]
    fn reply_encodes_image_as_base64() {
        let reply = GenerateReply::from(GeneratedImage {
            mime_type: "image/png".to_string(),
            bytes: b"foo".to_vec(),
            width: 1080,
            height: 1350,
            model: "gemini-2.5-flash-image".to_string(),
            credential_hint: "...abcd".to_string(),
        });
        let v = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["data"], "Zm9v");
        assert_eq!(v["mimeType"], "image/png");
        assert_eq!(v["key"], "...abcd");
        assert_eq!(v["height"], 1350);
    }
}
