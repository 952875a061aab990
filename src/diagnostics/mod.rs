//! key 池健康检查：逐个 key 发一次最小请求，报告可用性。与生成流程完全独立。

pub mod prober;

pub use prober::{KeyStatus, ProbeCategory, ProbeState, Prober};
