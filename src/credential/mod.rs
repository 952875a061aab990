//! API Key 池：配置解析、每次调用的尝试顺序、"上次成功 key" 偏好存储。

pub mod pool;
pub mod preference;

pub use pool::{CredentialSource, build_pool, mask_key};
pub use preference::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
