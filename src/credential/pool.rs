use crate::credential::preference::PreferenceStore;
use crate::error::GenerateError;
use crate::util::rand;

/// 配置中的原始 key 列表（去空白、去重、保持配置顺序）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSource {
    keys: Vec<String>,
}

impl CredentialSource {
    /// `pool` 为逗号分隔列表；列表为空时才回退到单个旧式 key。
    pub fn from_config(pool: &str, legacy: &str) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for part in pool.split(',') {
            let k = part.trim();
            if k.is_empty() || keys.iter().any(|existing| existing == k) {
                continue;
            }
            keys.push(k.to_string());
        }

        let legacy = legacy.trim();
        if keys.is_empty() && !legacy.is_empty() {
            keys.push(legacy.to_string());
        }

        Self { keys }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// 计算本次调用的尝试顺序：偏好 key（若仍在池中）排第一，其余随机打散。
pub fn build_pool(
    source: &CredentialSource,
    store: &dyn PreferenceStore,
) -> Result<Vec<String>, GenerateError> {
    if source.is_empty() {
        return Err(GenerateError::Configuration(
            "没有配置任何 API Key（API_KEYS_POOL / API_KEY）".to_string(),
        ));
    }

    let preferred = store.get().filter(|k| source.contains(k));
    match preferred {
        Some(sticky) => {
            let mut rest: Vec<String> = source
                .keys()
                .iter()
                .filter(|k| **k != sticky)
                .cloned()
                .collect();
            rand::shuffle(&mut rest);
            let mut ordered = Vec::with_capacity(source.len());
            ordered.push(sticky);
            ordered.extend(rest);
            Ok(ordered)
        }
        None => {
            let mut ordered = source.keys().to_vec();
            rand::shuffle(&mut ordered);
            Ok(ordered)
        }
    }
}

/// 展示/日志用：只保留末尾 4 个字符。
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "...".to_string() + key;
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("...{tail}")
}
