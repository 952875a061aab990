//! 背景场景目录：远端只读列表 + 内置兜底。生成流程本身不依赖它。

pub mod catalog;

pub use catalog::{CatalogError, ScenarioCatalog, ScenarioRecord, fallback_records, suggested_ratio};
