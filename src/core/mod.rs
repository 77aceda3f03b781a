//! 核心层：错误类型与编排器门面（分析 → 执行 → 上下文协调）

pub mod error;
pub mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::{create_llm_from_config, Orchestrator, TurnOutcome};
