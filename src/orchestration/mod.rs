//! 多 Agent 编排核心
//!
//! - **types**: Agent、复杂度、工作流类型、计划、分析结果、步骤与工作流结果
//! - **catalog**: Agent 能力目录（关键词、主要功能）
//! - **templates**: 命名工作流模板与意图路由
//! - **context**: 会话上下文（写时复制的 JSON 映射）
//! - **agent**: Agent trait 与注册表
//! - **analyzer**: 意图分析（规则 / LLM / 混合）
//! - **step_input**: 步骤输入拼接规则
//! - **outcome**: 步骤结果分类与最终回复
//! - **engine**: 执行引擎（顺序 / 并行 / 混合）
//! - **coordinator**: 工作流结束后的上下文协调

pub mod agent;
pub mod analyzer;
pub mod catalog;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod outcome;
pub mod step_input;
pub mod templates;
pub mod types;

pub use agent::{Agent, AgentRegistry, FnAgent, Generate, Run};
pub use analyzer::{analyze_user_request, AnalysisMode, IntentAnalysisStrategy};
pub use catalog::CapabilityCatalog;
pub use context::SessionContext;
pub use coordinator::coordinate_agent_contexts;
pub use engine::{delegate_task, ExecutionEngine};
pub use templates::WorkflowTemplateStore;
pub use types::{
    AgentType, AnalysisMethod, Coordination, ExecutionPlan, IntentAnalysisResult, PlanKind,
    StepResult, TaskComplexity, WorkflowResult, WorkflowStep, WorkflowTemplate, WorkflowType,
};
