//! 意图分析
//!
//! 三种策略共享同一 trait：规则（rule）、LLM（llm，失败降级到规则）、混合（hybrid，规则为基线、高置信 LLM 覆盖）。
//! 所有入口永不失败：空输入或内部错误都返回兜底结果。

pub mod cache;
pub mod hybrid;
pub mod llm;
pub mod rule;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OrchestratorSection;
use crate::llm::LlmClient;
use crate::orchestration::context::SessionContext;
use crate::orchestration::types::IntentAnalysisResult;

pub use cache::{cache_key, AnalysisCache, CacheStats};
pub use hybrid::{merge_results, HybridAnalyzer};
pub use llm::{extract_json, validate_response, LlmAnalyzer, LlmIntentResponse, ValidatedIntent};
pub use rule::{plan_for, RuleBasedAnalyzer};

/// 意图分析策略
#[async_trait]
pub trait IntentAnalysisStrategy: Send + Sync {
    async fn analyze(&self, user_input: &str, context: &SessionContext) -> IntentAnalysisResult;

    fn name(&self) -> &'static str;
}

/// 分析模式；配置中大小写不敏感，接受 rule_based 等别名，未知值按 rule 处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum AnalysisMode {
    #[default]
    Rule,
    Llm,
    Hybrid,
}

impl AnalysisMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "rule" | "rules" | "rule_based" => Some(AnalysisMode::Rule),
            "llm" => Some(AnalysisMode::Llm),
            "hybrid" => Some(AnalysisMode::Hybrid),
            _ => None,
        }
    }
}

impl From<String> for AnalysisMode {
    fn from(value: String) -> Self {
        AnalysisMode::parse(&value).unwrap_or_else(|| {
            tracing::warn!(mode = %value, "Unknown analysis mode, using rule-based analysis");
            AnalysisMode::Rule
        })
    }
}

/// 按配置构建分析策略；需要 LLM 的模式在未提供客户端时退回规则分析
pub fn build_analyzer(
    section: &OrchestratorSection,
    rules: RuleBasedAnalyzer,
    llm: Option<Arc<dyn LlmClient>>,
) -> Arc<dyn IntentAnalysisStrategy> {
    match (section.analysis_mode, llm) {
        (AnalysisMode::Rule, _) => Arc::new(rules),
        (AnalysisMode::Llm, Some(client)) => Arc::new(llm_analyzer(section, rules, client)),
        (AnalysisMode::Hybrid, Some(client)) => Arc::new(
            HybridAnalyzer::new(llm_analyzer(section, rules, client))
                .with_override_confidence(section.llm_override_confidence),
        ),
        (mode, None) => {
            tracing::warn!(mode = ?mode, "No LLM client configured, using rule-based analysis");
            Arc::new(rules)
        }
    }
}

fn llm_analyzer(
    section: &OrchestratorSection,
    rules: RuleBasedAnalyzer,
    client: Arc<dyn LlmClient>,
) -> LlmAnalyzer {
    LlmAnalyzer::new(client, rules)
        .with_cache(AnalysisCache::new(
            section.cache.capacity,
            Duration::from_secs(section.cache.ttl_secs),
        ))
        .with_min_confidence(section.min_intent_confidence)
}

/// 同步入口：默认目录与模板的规则分析
pub fn analyze_user_request(user_input: &str, context: &SessionContext) -> IntentAnalysisResult {
    RuleBasedAnalyzer::default().analyze_user_request(user_input, context)
}
