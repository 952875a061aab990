use anyhow::Context;
use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8046;
const DEFAULT_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_PROBE_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_CREDENTIAL_PAUSE_MS: u64 = 500;
const DEFAULT_PROBE_PAUSE_MS: u64 = 200;
const DEFAULT_SCENARIO_TABLE: &str = "templates";

/// 每个 key 依次尝试的模型：先快/便宜，额度耗尽后再试 Pro。
pub const DEFAULT_GENERATION_MODELS: [&str; 2] =
    ["gemini-2.5-flash-image", "gemini-3-pro-image-preview"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub api_keys_pool: String,
    pub legacy_api_key: String,

    pub base_url: String,
    pub timeout_ms: u64,
    pub proxy: String,

    pub generation_models: Vec<String>,
    pub probe_model: String,
    pub credential_pause_ms: u64,
    pub probe_pause_ms: u64,

    pub debug: String,
    pub data_dir: String,

    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub scenario_table: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    #[serde(alias = "HOST")]
    host: Option<String>,
    #[serde(alias = "PORT")]
    port: Option<u16>,

    #[serde(alias = "API_KEYS_POOL")]
    api_keys_pool: Option<String>,
    #[serde(alias = "API_KEY")]
    api_key: Option<String>,
    #[serde(alias = "VITE_API_KEY")]
    vite_api_key: Option<String>,

    #[serde(alias = "GEMINI_BASE_URL")]
    gemini_base_url: Option<String>,
    #[serde(alias = "TIMEOUT")]
    timeout: Option<u64>,
    #[serde(alias = "PROXY")]
    proxy: Option<String>,

    #[serde(alias = "GENERATION_MODELS")]
    generation_models: Option<String>,
    #[serde(alias = "PROBE_MODEL")]
    probe_model: Option<String>,
    #[serde(alias = "CREDENTIAL_PAUSE_MS")]
    credential_pause_ms: Option<u64>,
    #[serde(alias = "PROBE_PAUSE_MS")]
    probe_pause_ms: Option<u64>,

    #[serde(alias = "DEBUG")]
    debug: Option<String>,
    #[serde(alias = "DATA_DIR")]
    data_dir: Option<String>,

    #[serde(alias = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[serde(alias = "VITE_SUPABASE_URL")]
    vite_supabase_url: Option<String>,
    #[serde(alias = "SUPABASE_ANON_KEY")]
    supabase_anon_key: Option<String>,
    #[serde(alias = "VITE_SUPABASE_ANON_KEY")]
    vite_supabase_anon_key: Option<String>,
    #[serde(alias = "SCENARIO_TABLE")]
    scenario_table: Option<String>,
}

impl Config {
    /// 任何一个变量解析失败都直接报错，不静默回落到默认值。
    pub fn load() -> anyhow::Result<Self> {
        load_dotenv();

        let raw = extract_raw(Figment::from(Env::raw()))?;
        let mut cfg = Self::from_raw(raw);

        // 命令行覆盖：-debug <level>
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            if arg == "-debug"
                && let Some(v) = args.next()
            {
                cfg.debug = v;
            }
        }

        Ok(cfg)
    }

    fn from_raw(raw: RawEnv) -> Self {
        Self {
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            api_keys_pool: raw.api_keys_pool.unwrap_or_default(),
            // 兼容构建工具注入的 VITE_API_KEY。
            legacy_api_key: first_non_empty(raw.api_key, raw.vite_api_key),
            base_url: raw
                .gemini_base_url
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_ms: raw.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            proxy: raw.proxy.unwrap_or_default(),
            generation_models: parse_model_list(raw.generation_models.as_deref())
                .unwrap_or_else(|| {
                    DEFAULT_GENERATION_MODELS
                        .iter()
                        .map(|s| s.to_string())
                        .collect()
                }),
            probe_model: raw
                .probe_model
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_PROBE_MODEL.to_string()),
            credential_pause_ms: raw
                .credential_pause_ms
                .unwrap_or(DEFAULT_CREDENTIAL_PAUSE_MS),
            probe_pause_ms: raw.probe_pause_ms.unwrap_or(DEFAULT_PROBE_PAUSE_MS),
            debug: raw.debug.unwrap_or_else(|| "off".to_string()),
            data_dir: raw.data_dir.unwrap_or_else(|| "./data".to_string()),
            supabase_url: first_non_empty(raw.supabase_url, raw.vite_supabase_url)
                .trim_end_matches('/')
                .to_string(),
            supabase_anon_key: first_non_empty(raw.supabase_anon_key, raw.vite_supabase_anon_key),
            scenario_table: raw
                .scenario_table
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCENARIO_TABLE.to_string()),
        }
    }

    pub fn credential_pause(&self) -> Duration {
        Duration::from_millis(self.credential_pause_ms)
    }

    pub fn probe_pause(&self) -> Duration {
        Duration::from_millis(self.probe_pause_ms)
    }

    pub fn preference_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("preference.json")
    }

    pub fn scenario_catalog_enabled(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }
}

fn extract_raw(figment: Figment) -> anyhow::Result<RawEnv> {
    figment
        .extract::<RawEnv>()
        .context("解析环境变量失败（检查 PORT / TIMEOUT / *_PAUSE_MS 等数值配置）")
}

fn first_non_empty(a: Option<String>, b: Option<String>) -> String {
    [a, b]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn parse_model_list(value: Option<&str>) -> Option<Vec<String>> {
    let value = value?;
    let mut out: Vec<String> = Vec::new();
    for part in value.split(',') {
        let p = part.trim();
        if p.is_empty() || out.iter().any(|m| m == p) {
            continue;
        }
        out.push(p.to_string());
    }
    if out.is_empty() { None } else { Some(out) }
}

fn load_dotenv() {
    let Some(dotenv_path) = find_dotenv_path() else {
        return;
    };

    let Ok(file) = std::fs::File::open(&dotenv_path) else {
        return;
    };

    let reader = std::io::BufReader::new(file);
    for line in std::io::BufRead::lines(reader).map_while(Result::ok) {
        let Some((key, value)) = parse_dotenv_line(&line) else {
            continue;
        };
        // 已存在的进程环境变量优先，.env 只补缺。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：set_var 为 unsafe；这里只在启动阶段单线程调用。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }

        // 不越过仓库根目录。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }

        let parent = dir.parent()?;
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(rest) = line.strip_prefix("export ") {
        line = rest.trim_start();
    }

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return Some((key.to_string(), raw[1..raw.len() - 1].to_string()));
        }
    }

    Some((key.to_string(), strip_inline_comment(raw).trim().to_string()))
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] != b'#' {
            continue;
        }
        if i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t' {
            return value[..i].trim_end();
        }
    }
    value
}

#[cfg(test)]
impl Config {
    /// 测试用配置：不读取环境变量，暂停时间归零。
    pub fn for_tests(pool: &str) -> Self {
        let mut cfg = Self::from_raw(RawEnv::default());
        cfg.api_keys_pool = pool.to_string();
        cfg.credential_pause_ms = 0;
        cfg.probe_pause_ms = 0;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::from_raw(RawEnv::default());
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            cfg.generation_models,
            vec!["gemini-2.5-flash-image", "gemini-3-pro-image-preview"]
        );
        assert_eq!(cfg.probe_model, "gemini-2.5-flash-lite");
        assert_eq!(cfg.credential_pause(), Duration::from_millis(500));
        assert_eq!(cfg.probe_pause(), Duration::from_millis(200));
        assert_eq!(cfg.scenario_table, "templates");
        assert!(!cfg.scenario_catalog_enabled());
    }

    #[test]
    fn malformed_number_is_an_error_not_empty_config() {
        let figment = Figment::new()
            .merge(Serialized::default("api_keys_pool", "k1,k2"))
            .merge(Serialized::default("timeout", "3s"));
        let err = extract_raw(figment).unwrap_err();
        assert!(format!("{err:#}").contains("timeout"), "{err:#}");
    }

    #[test]
    fn well_formed_values_are_extracted() {
        let figment = Figment::new()
            .merge(Serialized::default("api_keys_pool", "k1,k2"))
            .merge(Serialized::default("timeout", 3000))
            .merge(Serialized::default("PORT", 9000));
        let cfg = Config::from_raw(extract_raw(figment).unwrap());
        assert_eq!(cfg.api_keys_pool, "k1,k2");
        assert_eq!(cfg.timeout_ms, 3000);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn legacy_key_prefers_api_key_over_vite_variant() {
        let raw = RawEnv {
            api_key: Some("  ".to_string()),
            vite_api_key: Some("vite-key".to_string()),
            ..RawEnv::default()
        };
        assert_eq!(Config::from_raw(raw).legacy_api_key, "vite-key");

        let raw = RawEnv {
            api_key: Some("main-key".to_string()),
            vite_api_key: Some("vite-key".to_string()),
            ..RawEnv::default()
        };
        assert_eq!(Config::from_raw(raw).legacy_api_key, "main-key");
    }

    #[test]
    fn model_list_override_is_trimmed_and_deduplicated() {
        assert_eq!(
            parse_model_list(Some(" a , b,,a ")),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(parse_model_list(Some(" , ")), None);
        assert_eq!(parse_model_list(None), None);
    }

    #[test]
    fn base_url_trailing_slash_is_removed() {
        let raw = RawEnv {
            gemini_base_url: Some("http://127.0.0.1:9000/".to_string()),
            ..RawEnv::default()
        };
        assert_eq!(Config::from_raw(raw).base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn dotenv_line_parsing() {
        assert_eq!(
            parse_dotenv_line("export API_KEYS_POOL=a,b # keys"),
            Some(("API_KEYS_POOL".to_string(), "a,b".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("API_KEY=\"with space\""),
            Some(("API_KEY".to_string(), "with space".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("URL=http://x/#frag"),
            Some(("URL".to_string(), "http://x/#frag".to_string()))
        );
        assert_eq!(parse_dotenv_line("# comment"), None);
        assert_eq!(parse_dotenv_line("=value"), None);
    }
}
