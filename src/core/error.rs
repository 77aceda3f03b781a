//! 编排错误类型
//!
//! 仅用于内部 Result 传递：公开入口不向调用方抛出这些错误，
//! 分析失败转为回退结果，Agent 失败转为失败的 StepResult。

use thiserror::Error;

/// 编排过程中可能出现的错误（分析、Agent 调用、LLM、配置）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("No execution steps in plan")]
    EmptyPlan,

    #[error("No agents available")]
    NoAgents,

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent} failed: {message}")]
    AgentFailed { agent: String, message: String },

    #[error("Agent timeout: {agent} after {secs}s")]
    AgentTimeout { agent: String, secs: u64 },

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),
}
