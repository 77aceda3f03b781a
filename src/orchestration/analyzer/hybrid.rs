//! 混合意图分析器
//!
//! 先做规则分析得到基线，再调用 LLM 路径：
//! - LLM 置信度高于阈值时，以 LLM 的意图、Agent、工作流类型、复杂度与计划覆盖基线
//! - 否则保留规则结果，仅附上 LLM 的置信度与建议
//! - LLM 路径出错时返回规则结果并标记为 RuleFallback

use async_trait::async_trait;

use crate::orchestration::context::SessionContext;
use crate::orchestration::types::{AnalysisMethod, IntentAnalysisResult};

use super::llm::{rule_fallback, LlmAnalyzer};
use super::IntentAnalysisStrategy;

pub const DEFAULT_OVERRIDE_CONFIDENCE: f64 = 0.8;

/// 合并规则基线与 LLM 结果；置信度严格大于阈值才覆盖
pub fn merge_results(
    rule: IntentAnalysisResult,
    llm: IntentAnalysisResult,
    override_confidence: f64,
) -> IntentAnalysisResult {
    let confidence = llm.confidence.unwrap_or(0.0);
    let mut merged = rule;
    merged.confidence = llm.confidence;
    merged.advisory = llm.advisory;
    merged.from_cache = llm.from_cache;

    if confidence > override_confidence {
        merged.primary_intent = llm.primary_intent;
        merged.required_agents = llm.required_agents;
        merged.workflow_type = llm.workflow_type;
        merged.complexity = llm.complexity;
        merged.execution_plan = llm.execution_plan;
        merged.analysis_method = AnalysisMethod::HybridLlmOverride;
    } else {
        merged.analysis_method = AnalysisMethod::HybridRulePrimary;
    }
    merged.refresh_derived();
    merged
}

pub struct HybridAnalyzer {
    llm: LlmAnalyzer,
    override_confidence: f64,
}

impl HybridAnalyzer {
    pub fn new(llm: LlmAnalyzer) -> Self {
        Self {
            llm,
            override_confidence: DEFAULT_OVERRIDE_CONFIDENCE,
        }
    }

    pub fn with_override_confidence(mut self, threshold: f64) -> Self {
        self.override_confidence = threshold;
        self
    }

    pub fn llm(&self) -> &LlmAnalyzer {
        &self.llm
    }

    pub async fn analyze_user_request(
        &self,
        user_input: &str,
        context: &SessionContext,
    ) -> IntentAnalysisResult {
        let rules = self.llm.rules();
        let baseline = rules.analyze_user_request(user_input, context);
        if baseline.analysis_method == AnalysisMethod::EmergencyFallback {
            return baseline;
        }

        match self.llm.try_llm_analysis(user_input, context).await {
            Ok(llm_result) => {
                let merged = merge_results(baseline, llm_result, self.override_confidence);
                tracing::debug!(
                    method = ?merged.analysis_method,
                    confidence = ?merged.confidence,
                    "Hybrid analysis merged"
                );
                merged
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM path of hybrid analysis failed, keeping rule result");
                rule_fallback(rules, user_input, context, e)
            }
        }
    }
}

#[async_trait]
impl IntentAnalysisStrategy for HybridAnalyzer {
    async fn analyze(&self, user_input: &str, context: &SessionContext) -> IntentAnalysisResult {
        self.analyze_user_request(user_input, context).await
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
