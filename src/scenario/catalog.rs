use crate::config::Config;
use crate::credential::mask_key;
use moka::future::Cache;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CATALOG_TTL: Duration = Duration::from_secs(60);
const FALLBACK_BASE: &str =
    "https://njxodvldycdindlrpund.supabase.co/storage/v1/object/public/scenarios/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image_url: String,
}

impl ScenarioRecord {
    pub fn suggested_ratio(&self) -> &'static str {
        suggested_ratio(&self.name)
    }
}

/// 从场景名推断输出格式。
pub fn suggested_ratio(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.contains("vertical") || name.contains("4:5") {
        "4:5"
    } else if ["historia", "reel", "9:16", "story"]
        .iter()
        .any(|m| name.contains(m))
    {
        "9:16"
    } else {
        "1:1"
    }
}

/// 内置的三个场景，远端不可用时使用。
pub fn fallback_records() -> Vec<ScenarioRecord> {
    [
        (101, "Post Vertical (4:5)", "Escenario%20post%20vertical.jpg"),
        (102, "Post Cuadrado (1:1)", "Escenario%20post%20cuadrado.jpg"),
        (103, "Historia / Reel (9:16)", "Escenario%20post%20historia%20o%20reel.jpg"),
    ]
    .into_iter()
    .map(|(id, name, file)| ScenarioRecord {
        id,
        name: name.to_string(),
        image_url: format!("{FALLBACK_BASE}{file}"),
    })
    .collect()
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("场景服务返回 {status}: {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] sonic_rs::Error),
}

/// 只读场景列表（PostgREST 表），60 秒缓存。
#[derive(Clone)]
pub struct ScenarioCatalog {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    table: String,
    cache: Cache<(), Arc<Vec<ScenarioRecord>>>,
}

impl ScenarioCatalog {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if !cfg.proxy.trim().is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(cfg.proxy.trim())?);
        }
        Ok(Self {
            http: builder.build()?,
            url: cfg.supabase_url.trim().trim_end_matches('/').to_string(),
            anon_key: cfg.supabase_anon_key.trim().to_string(),
            table: cfg.scenario_table.clone(),
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(CATALOG_TTL)
                .build(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.anon_key.is_empty()
    }

    fn list_url(&self) -> String {
        format!(
            "{}/rest/v1/{}?select=*&order=id.desc",
            self.url,
            urlencoding::encode(&self.table)
        )
    }

    /// 未配置、请求失败或结果为空时返回内置场景；`refresh` 跳过缓存。
    pub async fn list(&self, refresh: bool) -> Vec<ScenarioRecord> {
        if !self.is_configured() {
            return fallback_records();
        }
        if !refresh && let Some(cached) = self.cache.get(&()).await {
            return cached.as_ref().clone();
        }

        match self.fetch().await {
            Ok(records) if !records.is_empty() => {
                self.cache.insert((), Arc::new(records.clone())).await;
                records
            }
            Ok(_) => {
                tracing::info!("场景表为空，使用内置场景");
                fallback_records()
            }
            Err(e) => {
                tracing::warn!(anon_key = %mask_key(&self.anon_key), "拉取场景失败，使用内置场景: {e}");
                fallback_records()
            }
        }
    }

    pub async fn find(&self, id: i64) -> Option<ScenarioRecord> {
        self.list(false).await.into_iter().find(|r| r.id == id)
    }

    async fn fetch(&self) -> Result<Vec<ScenarioRecord>, CatalogError> {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.anon_key)) {
            headers.insert(AUTHORIZATION, v);
        }

        let resp = self.http.get(self.list_url()).headers(headers).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(CatalogError::Http {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        Ok(sonic_rs::from_slice(&bytes)?)
    }

    /// 下载场景图片原始字节。
    pub async fn download(&self, record: &ScenarioRecord) -> Result<Vec<u8>, CatalogError> {
        let resp = self.http.get(&record.image_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Http {
                status: status.as_u16(),
                message: format!("下载场景 {} 失败", record.id),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_inferred_from_name() {
        assert_eq!(suggested_ratio("Post Vertical (4:5)"), "4:5");
        assert_eq!(suggested_ratio("feed 4:5"), "4:5");
        assert_eq!(suggested_ratio("Historia / Reel (9:16)"), "9:16");
        assert_eq!(suggested_ratio("Instagram STORY"), "9:16");
        assert_eq!(suggested_ratio("Post Cuadrado (1:1)"), "1:1");
        assert_eq!(suggested_ratio("Jardín"), "1:1");
    }

    #[test]
    fn fallback_has_one_record_per_format() {
        let records = fallback_records();
        assert_eq!(
            records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![101, 102, 103]
        );
        assert_eq!(
            records.iter().map(|r| r.suggested_ratio()).collect::<Vec<_>>(),
            vec!["4:5", "1:1", "9:16"]
        );
        assert!(records.iter().all(|r| r.image_url.starts_with(FALLBACK_BASE)));
    }

    #[test]
    fn rows_deserialize_with_extra_columns() {
        let rows: Vec<ScenarioRecord> = sonic_rs::from_str(
            r#"[{"id":7,"name":"Story","image_url":"https://x/y.jpg","created_at":"2025-01-01"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].suggested_ratio(), "9:16");
    }

    #[tokio::test]
    async fn unconfigured_catalog_uses_fallback() {
        let catalog = ScenarioCatalog::new(&Config::for_tests("")).unwrap();
        assert!(!catalog.is_configured());
        assert_eq!(catalog.list(false).await, fallback_records());
        assert_eq!(catalog.find(103).await.unwrap().suggested_ratio(), "9:16");
        assert!(catalog.find(1).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_catalog_uses_fallback() {
        let mut cfg = Config::for_tests("");
        cfg.supabase_url = "http://127.0.0.1:9/".to_string();
        cfg.supabase_anon_key = "anon".to_string();
        let catalog = ScenarioCatalog::new(&cfg).unwrap();
        assert_eq!(
            catalog.list_url(),
            "http://127.0.0.1:9/rest/v1/templates?select=*&order=id.desc"
        );
        assert_eq!(catalog.list(true).await, fallback_records());
    }
}
