//! 一次生成调用：格式解析 → 模板预处理 → 按 (key, 模型) 计划顺序尝试 → 结果裁剪。

pub mod attempt;
pub mod classify;
pub mod orchestrator;
pub mod profile;
pub mod prompt;

pub use classify::{Failure, FailureKind};
pub use orchestrator::{GenerateInput, GeneratedImage, Generator};
pub use profile::OutputProfile;
pub use prompt::SubjectImage;
