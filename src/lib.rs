//! Voice Orchestrator - 语音 Gmail / Calendar 助手的多 Agent 编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与编排器门面
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **orchestration**: 意图分析、工作流模板、执行引擎、上下文协调

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod orchestration;

pub use crate::core::{Orchestrator, TurnOutcome};
