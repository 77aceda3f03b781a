//! 编排器：单轮对话的主控流程
//!
//! 负责：按配置选择 LLM 后端与意图分析策略、创建执行引擎，并在每一轮中依次
//! 分析意图 → 执行工作流 → 协调上下文，返回本轮的分析、执行结果与新的会话上下文。

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{load_config_or_default, AppConfig};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::orchestration::analyzer::{
    build_analyzer, AnalysisMode, IntentAnalysisStrategy, RuleBasedAnalyzer,
};
use crate::orchestration::catalog::CapabilityCatalog;
use crate::orchestration::coordinator::coordinate_agent_contexts;
use crate::orchestration::engine::ExecutionEngine;
use crate::orchestration::templates::WorkflowTemplateStore;
use crate::orchestration::{AgentRegistry, IntentAnalysisResult, SessionContext, WorkflowResult};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）；无可用后端时返回 None
pub fn create_llm_from_config(cfg: &AppConfig) -> Option<Arc<dyn LlmClient>> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Some(Arc::new(MockLlmClient::new()))
        }
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Some(Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None)
                    .with_request_timeout(cfg.llm.request_timeout_secs),
            ))
        }
        other => {
            tracing::warn!(provider = other, "No API key set or provider unknown, LLM disabled");
            None
        }
    }
}

/// 一轮对话的产出
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub analysis: IntentAnalysisResult,
    pub workflow: WorkflowResult,
    pub context: SessionContext,
}

/// 编排器：持有分析策略、执行引擎与 Agent 注册表
pub struct Orchestrator {
    analyzer: Arc<dyn IntentAnalysisStrategy>,
    engine: ExecutionEngine,
    registry: AgentRegistry,
}

impl Orchestrator {
    pub fn new(
        analyzer: Arc<dyn IntentAnalysisStrategy>,
        engine: ExecutionEngine,
        registry: AgentRegistry,
    ) -> Self {
        Self {
            analyzer,
            engine,
            registry,
        }
    }

    /// 按配置组装：默认能力目录与模板库，LLM 后端由 create_llm_from_config 选择
    pub fn from_config(cfg: &AppConfig, registry: AgentRegistry) -> Self {
        let rules = RuleBasedAnalyzer::new(
            Arc::new(CapabilityCatalog::default()),
            Arc::new(WorkflowTemplateStore::default()),
        );
        let llm = (cfg.orchestrator.analysis_mode != AnalysisMode::Rule)
            .then(|| create_llm_from_config(cfg))
            .flatten();
        let analyzer = build_analyzer(&cfg.orchestrator, rules, llm);
        tracing::info!(
            analyzer = analyzer.name(),
            agents = registry.len(),
            "Orchestrator ready"
        );
        Self::new(analyzer, ExecutionEngine::from_config(&cfg.orchestrator), registry)
    }

    /// 从磁盘配置创建；配置加载失败时使用默认值
    pub fn load(config_path: Option<PathBuf>, registry: AgentRegistry) -> Self {
        let cfg = load_config_or_default(config_path);
        Self::from_config(&cfg, registry)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn analyzer_name(&self) -> &'static str {
        self.analyzer.name()
    }

    /// 处理一轮：分析 → 执行 → 协调上下文（输入上下文不被修改）
    pub async fn handle(&self, user_input: &str, context: &SessionContext) -> TurnOutcome {
        let analysis = self.analyzer.analyze(user_input, context).await;
        tracing::info!(
            intent = %analysis.primary_intent,
            method = ?analysis.analysis_method,
            complexity = analysis.complexity.as_str(),
            steps = analysis.estimated_steps,
            "Intent analyzed"
        );

        let workflow = self
            .engine
            .delegate_task(&analysis, user_input, context, &self.registry)
            .await;
        let context = coordinate_agent_contexts(context, &workflow);

        TurnOutcome {
            analysis,
            workflow,
            context,
        }
    }
}
