//! LLM 意图分析器
//!
//! 拼装 prompt（Agent 能力、工作流模式、响应 JSON Schema、会话上下文）后调用 LLM，
//! 从回复中提取 JSON 并校验；校验失败或调用出错时降级到规则分析并记录原因。
//! 通过校验的结果写入缓存，相同 (输入, 上下文) 再次请求时不再调用 LLM。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::core::OrchestratorError;
use crate::llm::{LlmClient, Message};
use crate::orchestration::context::SessionContext;
use crate::orchestration::types::{
    AgentType, AnalysisMethod, Advisory, Coordination, IntentAnalysisResult, TaskComplexity,
    WorkflowType,
};

use super::cache::{cache_key, AnalysisCache};
use super::rule::{plan_for, RuleBasedAnalyzer};
use super::IntentAnalysisStrategy;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// LLM 返回的意图分析 JSON（同时用于生成 prompt 中的 Schema）
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LlmIntentResponse {
    /// 主意图，snake_case，如 check_emails、schedule_meeting
    pub primary_intent: Option<String>,
    /// 所需 Agent：email_agent / content_agent / calendar_agent（或 email / content / calendar）
    pub required_agents: Option<Vec<String>>,
    /// email_only / calendar_only / email_content / calendar_content / email_calendar / all_agents / custom
    pub workflow_type: Option<String>,
    /// simple / moderate / complex / advanced
    pub complexity: Option<String>,
    /// sequential / parallel / mixed
    pub execution_strategy: Option<String>,
    /// 0.0 ~ 1.0
    pub intent_confidence: Option<f64>,
    #[serde(default)]
    pub optimization_suggestions: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    /// 简短说明（仅记录日志）
    pub reasoning: Option<String>,
}

/// 校验通过的 LLM 意图
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIntent {
    pub primary_intent: String,
    pub required_agents: Vec<AgentType>,
    pub workflow_type: Option<WorkflowType>,
    pub complexity: TaskComplexity,
    pub coordination: Option<Coordination>,
    pub confidence: Option<f64>,
    pub advisory: Advisory,
}

pub fn response_schema_json() -> String {
    let schema = schema_for!(LlmIntentResponse);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 从 LLM 输出中提取 JSON 片段：优先 ```json 代码块，其次最外层花括号
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

pub fn parse_response(output: &str) -> Result<LlmIntentResponse, OrchestratorError> {
    let json_str = extract_json(output)
        .ok_or_else(|| OrchestratorError::JsonParse("no JSON object in LLM output".to_string()))?;
    serde_json::from_str(json_str)
        .map_err(|e| OrchestratorError::JsonParse(format!("{}: {}", e, json_str)))
}

/// 校验 LLM 响应：四个必需字段齐全且取值合法，置信度不低于阈值
pub fn validate_response(
    response: LlmIntentResponse,
    min_confidence: f64,
) -> Result<ValidatedIntent, OrchestratorError> {
    let missing = |field: &str| OrchestratorError::Validation(format!("missing field: {field}"));

    let primary_intent = response
        .primary_intent
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("primary_intent"))?;
    let raw_agents = response.required_agents.ok_or_else(|| missing("required_agents"))?;
    let raw_workflow = response.workflow_type.ok_or_else(|| missing("workflow_type"))?;
    let raw_complexity = response.complexity.ok_or_else(|| missing("complexity"))?;

    let mut required_agents = Vec::with_capacity(raw_agents.len());
    for name in &raw_agents {
        let agent = AgentType::parse(name)
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown agent: {name}")))?;
        required_agents.push(agent);
    }
    if required_agents.is_empty() {
        return Err(OrchestratorError::Validation("required_agents is empty".to_string()));
    }

    let workflow_type = match raw_workflow.trim().to_lowercase().as_str() {
        "custom" => None,
        other => Some(WorkflowType::parse(other).ok_or_else(|| {
            OrchestratorError::Validation(format!("unknown workflow_type: {raw_workflow}"))
        })?),
    };

    let complexity = TaskComplexity::parse(&raw_complexity).ok_or_else(|| {
        OrchestratorError::Validation(format!("unknown complexity: {raw_complexity}"))
    })?;

    if let Some(confidence) = response.intent_confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(OrchestratorError::Validation(format!(
                "intent_confidence out of range: {confidence}"
            )));
        }
        if confidence < min_confidence {
            return Err(OrchestratorError::Validation(format!(
                "intent_confidence {confidence} below threshold {min_confidence}"
            )));
        }
    }

    Ok(ValidatedIntent {
        primary_intent,
        required_agents,
        workflow_type,
        complexity,
        coordination: response.execution_strategy.as_deref().map(Coordination::parse),
        confidence: response.intent_confidence,
        advisory: Advisory {
            optimization_suggestions: response.optimization_suggestions,
            risk_factors: response.risk_factors,
        },
    })
}

/// LLM 分析器：失败时回退到内置的规则分析器
pub struct LlmAnalyzer {
    llm: Arc<dyn LlmClient>,
    rules: RuleBasedAnalyzer,
    cache: AnalysisCache,
    min_confidence: f64,
}

impl LlmAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, rules: RuleBasedAnalyzer) -> Self {
        Self {
            llm,
            rules,
            cache: AnalysisCache::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_cache(mut self, cache: AnalysisCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn rules(&self) -> &RuleBasedAnalyzer {
        &self.rules
    }

    /// 底层客户端的累计 token 用量：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn build_prompt(&self, user_input: &str, context: &SessionContext) -> Vec<Message> {
        let system = format!(
            "You are the intent analyzer of a voice assistant that manages Gmail and Google Calendar.\n\
             Decide which agents must work together to satisfy the user's request.\n\n\
             ## Agents\n{}\n\n\
             ## Workflow patterns\n{}\n\n\
             ## Response format\n\
             Reply with a single JSON object matching this schema and nothing else:\n{}",
            self.rules.catalog().describe(),
            self.rules.templates().describe(),
            response_schema_json()
        );
        let context_json = serde_json::to_string(context).unwrap_or_else(|_| "{}".to_string());
        vec![
            Message::system(system),
            Message::user(format!(
                "User request: {user_input}\nSession context: {context_json}"
            )),
        ]
    }

    /// 只走 LLM 路径（含缓存）；出错时返回错误而不降级，供混合分析器使用
    pub async fn try_llm_analysis(
        &self,
        user_input: &str,
        context: &SessionContext,
    ) -> Result<IntentAnalysisResult, OrchestratorError> {
        let key = cache_key(user_input, context);
        if let Some(mut cached) = self.cache.get(&key) {
            tracing::debug!(intent = %cached.primary_intent, "Intent analysis cache hit");
            cached.from_cache = true;
            return Ok(cached);
        }

        let messages = self.build_prompt(user_input, context);
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(OrchestratorError::Llm)?;
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::debug!(
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "LLM intent analysis token usage"
        );
        let response = parse_response(&output)?;
        if let Some(reasoning) = &response.reasoning {
            tracing::debug!(reasoning = %reasoning, "LLM intent reasoning");
        }
        let validated = validate_response(response, self.min_confidence)?;
        let result = self.assemble(validated);

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    fn assemble(&self, intent: ValidatedIntent) -> IntentAnalysisResult {
        let plan = plan_for(
            self.rules.templates(),
            &intent.primary_intent,
            &intent.required_agents,
            intent.workflow_type,
            intent.coordination,
        );
        let mut result = IntentAnalysisResult::assemble(
            intent.primary_intent,
            intent.required_agents,
            intent.workflow_type,
            intent.complexity,
            plan,
            AnalysisMethod::LlmEnhanced,
        );
        result.confidence = intent.confidence;
        if !intent.advisory.is_empty() {
            result.advisory = Some(intent.advisory);
        }
        result
    }

    /// 异步入口：永不失败；LLM 路径出错时返回规则结果（RuleFallback）并附原因
    pub async fn analyze_user_request(
        &self,
        user_input: &str,
        context: &SessionContext,
    ) -> IntentAnalysisResult {
        if user_input.trim().is_empty() {
            return IntentAnalysisResult::emergency_fallback("empty input");
        }
        match self.try_llm_analysis(user_input, context).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "LLM intent analysis failed, falling back to rules");
                rule_fallback(&self.rules, user_input, context, e)
            }
        }
    }
}

/// 规则降级：方法标记为 RuleFallback（兜底结果保持 EmergencyFallback）并记录原因
pub(crate) fn rule_fallback(
    rules: &RuleBasedAnalyzer,
    user_input: &str,
    context: &SessionContext,
    error: OrchestratorError,
) -> IntentAnalysisResult {
    let mut result = rules.analyze_user_request(user_input, context);
    if result.analysis_method != AnalysisMethod::EmergencyFallback {
        result.analysis_method = AnalysisMethod::RuleFallback;
    }
    result.fallback_reason = Some(error.to_string());
    result
}

#[async_trait]
impl IntentAnalysisStrategy for LlmAnalyzer {
    async fn analyze(&self, user_input: &str, context: &SessionContext) -> IntentAnalysisResult {
        self.analyze_user_request(user_input, context).await
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::orchestration::types::PlanKind;

    const GOOD_REPLY: &str = r#"Here you go:
```json
{
  "primary_intent": "schedule_and_notify",
  "required_agents": ["calendar_agent", "email_agent"],
  "workflow_type": "email_calendar",
  "complexity": "complex",
  "execution_strategy": "sequential",
  "intent_confidence": 0.92,
  "optimization_suggestions": ["check availability before creating the event"],
  "risk_factors": []
}
```"#;

    fn analyzer(mock: Arc<MockLlmClient>) -> LlmAnalyzer {
        LlmAnalyzer::new(mock, RuleBasedAnalyzer::default())
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(extract_json("prefix {\"a\":{\"b\":2}} suffix"), Some("{\"a\":{\"b\":2}}"));
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_validate_rejects_missing_and_unknown_fields() {
        let base: LlmIntentResponse = serde_json::from_str(
            r#"{"primary_intent":"x","required_agents":["email"],"workflow_type":"email_only","complexity":"simple"}"#,
        )
        .unwrap();
        assert!(validate_response(base.clone(), 0.3).is_ok());

        let mut no_type = base.clone();
        no_type.workflow_type = None;
        assert!(matches!(
            validate_response(no_type, 0.3),
            Err(OrchestratorError::Validation(msg)) if msg.contains("workflow_type")
        ));

        let mut bad_agent = base.clone();
        bad_agent.required_agents = Some(vec!["slack_agent".to_string()]);
        assert!(validate_response(bad_agent, 0.3).is_err());

        let mut bad_complexity = base.clone();
        bad_complexity.complexity = Some("epic".to_string());
        assert!(validate_response(bad_complexity, 0.3).is_err());

        let mut custom = base.clone();
        custom.workflow_type = Some("custom".to_string());
        assert_eq!(validate_response(custom, 0.3).unwrap().workflow_type, None);

        let mut low = base;
        low.intent_confidence = Some(0.1);
        assert!(validate_response(low, 0.3).is_err());
    }

    #[tokio::test]
    async fn test_valid_reply_is_used_and_cached() {
        let mock = Arc::new(MockLlmClient::replying(GOOD_REPLY));
        let analyzer = analyzer(mock.clone());
        let ctx = SessionContext::new();

        let first = analyzer.analyze_user_request("set up a sync with Dana and tell her", &ctx).await;
        assert_eq!(first.analysis_method, AnalysisMethod::LlmEnhanced);
        assert_eq!(first.primary_intent, "schedule_and_notify");
        assert_eq!(first.required_agents, vec![AgentType::Calendar, AgentType::Email]);
        assert_eq!(first.complexity, TaskComplexity::Complex);
        assert_eq!(first.execution_plan.template.as_deref(), Some("meeting_scheduling"));
        assert_eq!(first.confidence, Some(0.92));
        assert!(first.advisory.is_some());
        assert!(!first.from_cache);

        let second = analyzer.analyze_user_request("set up a sync with Dana and tell her", &ctx).await;
        assert!(second.from_cache);
        assert_eq!(second.primary_intent, first.primary_intent);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(analyzer.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_token_usage_accumulates_per_llm_call() {
        let mock = Arc::new(MockLlmClient::replying(GOOD_REPLY));
        let analyzer = analyzer(mock.clone());
        let ctx = SessionContext::new();
        assert_eq!(analyzer.token_usage(), (0, 0, 0));

        analyzer.analyze_user_request("book lunch with Sam", &ctx).await;
        let (prompt, completion, total) = analyzer.token_usage();
        assert!(prompt > 0);
        assert_eq!(completion, GOOD_REPLY.split_whitespace().count() as u64);
        assert_eq!(total, prompt + completion);

        analyzer.analyze_user_request("book lunch with Sam", &ctx).await;
        assert_eq!(analyzer.token_usage().2, total);
        assert_eq!(mock.token_usage(), analyzer.token_usage());
    }

    #[tokio::test]
    async fn test_custom_workflow_uses_heuristic_plan() {
        let reply = r#"{"primary_intent":"sync_everything","required_agents":["email","calendar"],
            "workflow_type":"custom","complexity":"moderate","execution_strategy":"parallel"}"#;
        let analyzer = analyzer(Arc::new(MockLlmClient::replying(reply)));
        let result = analyzer.analyze_user_request("sync", &SessionContext::new()).await;
        assert_eq!(result.workflow_type_label(), "custom");
        assert_eq!(result.execution_plan.kind, PlanKind::Custom);
        assert_eq!(result.execution_plan.coordination, Coordination::Parallel);
        assert!(result.parallel_possible);
    }

    #[tokio::test]
    async fn test_invalid_reply_falls_back_to_rules() {
        let mock = Arc::new(MockLlmClient::replying(r#"{"primary_intent": "check_emails"}"#));
        let analyzer = analyzer(mock.clone());
        let result = analyzer.analyze_user_request("Check my emails", &SessionContext::new()).await;
        assert_eq!(result.analysis_method, AnalysisMethod::RuleFallback);
        assert_eq!(result.primary_intent, "check_emails");
        assert!(result.fallback_reason.unwrap().contains("required_agents"));
        assert!(analyzer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_falls_back_to_rules() {
        let analyzer = analyzer(Arc::new(MockLlmClient::failing("connection refused")));
        let result = analyzer.analyze_user_request("Check my emails", &SessionContext::new()).await;
        assert_eq!(result.analysis_method, AnalysisMethod::RuleFallback);
        assert!(result.fallback_reason.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_prose_reply_falls_back() {
        let analyzer = analyzer(Arc::new(MockLlmClient::replying("I think you want emails.")));
        let result = analyzer.analyze_user_request("Check my emails", &SessionContext::new()).await;
        assert_eq!(result.analysis_method, AnalysisMethod::RuleFallback);
    }

    #[test]
    fn test_prompt_mentions_agents_and_schema() {
        let analyzer = analyzer(Arc::new(MockLlmClient::new()));
        let messages = analyzer.build_prompt("hi", &SessionContext::new());
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("email_agent"));
        assert!(messages[0].content.contains("meeting_scheduling"));
        assert!(messages[0].content.contains("primary_intent"));
        assert!(messages[1].content.contains("User request: hi"));
    }
}
