//! 规则意图分析器
//!
//! 不调用外部服务，始终可用：
//! 1. 按能力目录做整词关键词匹配
//! 2. 按固定顺序的短语规则确定主意图，未命中时按关键词最多的 Agent 兜底
//! 3. 由关键词与意图名推导所需 Agent
//! 4. 关键词、连接词、顺序词加权得到复杂度
//! 5. Agent 集合精确匹配工作流类型，再解析模板或按 Agent 组合启发式生成计划

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::OrchestratorError;
use crate::orchestration::catalog::{count_phrase, normalize_words, CapabilityCatalog};
use crate::orchestration::context::SessionContext;
use crate::orchestration::templates::WorkflowTemplateStore;
use crate::orchestration::types::{
    dedup_agents, AgentType, AnalysisMethod, Coordination, ExecutionPlan, IntentAnalysisResult,
    TaskComplexity, WorkflowStep, WorkflowType,
};

use super::IntentAnalysisStrategy;

pub const AGENT_WEIGHT: u32 = 2;
pub const KEYWORD_CAP: u32 = 10;
pub const COORDINATION_WEIGHT: u32 = 2;
pub const SEQUENCING_WEIGHT: u32 = 3;

const COORDINATION_WORDS: &[&str] = &["and", "then", "after", "before", "while", "also", "plus"];
const COMPOUND_PHRASES: &[&str] = &[
    "schedule and send",
    "check and reply",
    "read and summarize",
    "find and schedule",
    "summarize and send",
];
const SEQUENCING_WORDS: &[&str] = &["first", "then", "next", "finally", "after that"];

/// (意图名, 触发短语)；按顺序匹配，首个命中的规则生效
const INTENT_RULES: &[(&str, &[&str])] = &[
    ("email_to_calendar", &[
        "from this email", "from the email", "from my email", "event from email",
        "add this email to my calendar", "meeting from email",
    ]),
    ("daily_briefing", &[
        "daily briefing", "morning briefing", "brief me", "what's on today", "catch me up",
    ]),
    ("meeting_follow_up", &[
        "follow up on the meeting", "follow up on my meeting", "meeting follow up",
        "meeting follow-up", "after the meeting",
    ]),
    ("schedule_and_notify", &[
        "schedule and send", "and send invite", "and send an invite", "send invites",
        "send the invite", "and notify", "and invite",
    ]),
    ("summarize_emails", &[
        "summarize my email", "summarise my email", "summarize emails", "summarize my inbox",
        "email summary", "summary of my email",
    ]),
    ("compose_email", &[
        "write an email", "draft an email", "compose an email", "write a reply", "draft a reply",
    ]),
    ("reply_email", &["reply to", "respond to"]),
    ("send_email", &["send an email", "send email", "send a message", "email to"]),
    ("check_emails", &[
        "check my email", "check email", "read my email", "unread", "new email", "my inbox",
        "any emails",
    ]),
    ("check_availability", &[
        "am i free", "am i available", "my availability", "free time", "free slot",
    ]),
    ("schedule_meeting", &[
        "schedule a meeting", "schedule meeting", "book a meeting", "set up a meeting",
        "create an event", "create event", "add to my calendar", "add to calendar",
    ]),
    ("view_calendar", &[
        "my calendar", "my schedule", "upcoming events", "my meetings", "what's on",
    ]),
    ("analyze_content", &["analyze", "analyse"]),
    ("generate_content", &["write", "draft", "generate", "rewrite"]),
];

/// 已知的多 Agent 意图：强制启用全部三个 Agent
const MULTI_AGENT_INTENTS: &[&str] = &["email_to_calendar", "daily_briefing", "meeting_follow_up"];

const CALENDAR_INTENT_MARKERS: &[&str] = &["calendar", "schedule", "meeting", "availability"];
const CONTENT_INTENT_MARKERS: &[&str] = &[
    "content", "summar", "compose", "draft", "analy", "generate", "briefing",
];

/// 按 Agent 组合生成计划：先解析模板，再套用组合启发式，最后退化为首个 Agent 的单步计划
pub fn plan_for(
    templates: &WorkflowTemplateStore,
    intent: &str,
    agents: &[AgentType],
    workflow_type: Option<WorkflowType>,
    coordination_hint: Option<Coordination>,
) -> ExecutionPlan {
    if let Some(template) = templates.resolve(intent, workflow_type) {
        return ExecutionPlan::from_template(template);
    }
    if let Some(mut plan) = pair_heuristic(intent, agents) {
        if let Some(hint) = coordination_hint {
            plan.coordination = hint;
        }
        return plan;
    }
    let first = agents.first().copied().unwrap_or(AgentType::Email);
    ExecutionPlan::fallback(vec![WorkflowStep::sequential(first, "process_request")])
}

fn pair_heuristic(intent: &str, agents: &[AgentType]) -> Option<ExecutionPlan> {
    use AgentType::*;
    let has = |a: AgentType| agents.contains(&a);

    if has(Email) && has(Calendar) {
        if intent.contains("schedule") || intent.contains("meeting") {
            return Some(ExecutionPlan::custom(
                vec![
                    WorkflowStep::sequential(Calendar, "check_availability"),
                    WorkflowStep::sequential(Calendar, "create_event"),
                    WorkflowStep::sequential(Email, "send_notification"),
                ],
                Coordination::Sequential,
            ));
        }
        return Some(ExecutionPlan::custom(
            vec![
                WorkflowStep::parallel(Email, "fetch_emails"),
                WorkflowStep::parallel(Calendar, "get_events"),
            ],
            Coordination::Parallel,
        ));
    }
    if has(Email) && has(Content) {
        let (first, second) = if intent.contains("summar") || intent.contains("check") {
            ("fetch_emails", "summarize_content")
        } else if intent.contains("reply") || intent.contains("compose") || intent.contains("send") {
            ("fetch_emails", "generate_content")
        } else {
            return None;
        };
        return Some(ExecutionPlan::custom(
            vec![
                WorkflowStep::sequential(Email, first),
                WorkflowStep::sequential(Content, second),
            ],
            Coordination::Sequential,
        ));
    }
    if has(Calendar) && has(Content) {
        return Some(ExecutionPlan::custom(
            vec![
                WorkflowStep::sequential(Calendar, "get_events"),
                WorkflowStep::sequential(Content, "summarize_content"),
            ],
            Coordination::Sequential,
        ));
    }
    None
}

/// 规则分析器：持有注入的能力目录与模板库
#[derive(Clone, Default)]
pub struct RuleBasedAnalyzer {
    catalog: Arc<CapabilityCatalog>,
    templates: Arc<WorkflowTemplateStore>,
}

impl RuleBasedAnalyzer {
    pub fn new(catalog: Arc<CapabilityCatalog>, templates: Arc<WorkflowTemplateStore>) -> Self {
        Self { catalog, templates }
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    pub fn templates(&self) -> &Arc<WorkflowTemplateStore> {
        &self.templates
    }

    /// 同步入口：永不失败，分析出错时返回兜底结果
    pub fn analyze_user_request(&self, user_input: &str, context: &SessionContext) -> IntentAnalysisResult {
        match self.try_analyze(user_input, context) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Rule analysis failed, using emergency fallback");
                IntentAnalysisResult::emergency_fallback(e.to_string())
            }
        }
    }

    /// 先按有序短语规则识别；都未命中时取关键词命中最多的 Agent（同分按目录顺序，EMAIL 优先）
    fn detect_intent(&self, lowered: &str) -> String {
        for (intent, phrases) in INTENT_RULES {
            if phrases.iter().any(|p| lowered.contains(p)) {
                return intent.to_string();
            }
        }
        let top = self.catalog.suggest_agents(lowered).first().map(|(agent, _)| *agent);
        match top {
            Some(AgentType::Email) => "email_general",
            Some(AgentType::Calendar) => "calendar_general",
            Some(AgentType::Content) => "content_general",
            None => "general_assistance",
        }
        .to_string()
    }

    pub fn try_analyze(
        &self,
        user_input: &str,
        _context: &SessionContext,
    ) -> Result<IntentAnalysisResult, OrchestratorError> {
        let lowered = user_input.trim().to_lowercase();
        if lowered.is_empty() {
            return Err(OrchestratorError::Analysis("empty input".to_string()));
        }
        let normalized = normalize_words(&lowered);

        let matches = self.catalog.match_keywords(&normalized);
        let hits = |agent: AgentType| -> usize {
            matches
                .iter()
                .find(|(a, _)| *a == agent)
                .map(|(_, k)| k.len())
                .unwrap_or(0)
        };
        let total_keywords: usize = matches.iter().map(|(_, k)| k.len()).sum();

        let primary_intent = self.detect_intent(&lowered);
        let required_agents = required_agents(
            &primary_intent,
            hits(AgentType::Email) > 0,
            hits(AgentType::Calendar) > 0,
            hits(AgentType::Content) > 0,
        );

        let score = complexity_score(&normalized, required_agents.len(), total_keywords);
        let complexity = TaskComplexity::from_score(score);
        let workflow_type = WorkflowType::from_agents(&required_agents);
        let plan = plan_for(&self.templates, &primary_intent, &required_agents, workflow_type, None);

        tracing::debug!(
            intent = %primary_intent,
            agents = ?required_agents,
            score,
            plan = ?plan.kind,
            "Rule analysis"
        );

        Ok(IntentAnalysisResult::assemble(
            primary_intent,
            required_agents,
            workflow_type,
            complexity,
            plan,
            AnalysisMethod::RuleBased,
        ))
    }
}

/// 所需 Agent：EMAIL、CALENDAR 按关键词 / 意图名决定；只涉及其一时附带 CONTENT 做整理，
/// 内容关键词或意图命中时也附带；多 Agent 意图强制三者全开；结果为空时默认 {EMAIL, CONTENT}
fn required_agents(intent: &str, email_kw: bool, calendar_kw: bool, content_kw: bool) -> Vec<AgentType> {
    if MULTI_AGENT_INTENTS.contains(&intent) {
        return vec![AgentType::Email, AgentType::Calendar, AgentType::Content];
    }

    let email = email_kw || intent.contains("email");
    let calendar = calendar_kw || CALENDAR_INTENT_MARKERS.iter().any(|m| intent.contains(m));
    let content = content_kw || CONTENT_INTENT_MARKERS.iter().any(|m| intent.contains(m));

    let mut agents = Vec::new();
    if email {
        agents.push(AgentType::Email);
    }
    if calendar {
        agents.push(AgentType::Calendar);
    }
    if content || (email ^ calendar) {
        agents.push(AgentType::Content);
    }
    if agents.is_empty() {
        agents = vec![AgentType::Email, AgentType::Content];
    }
    dedup_agents(agents)
}

fn complexity_score(normalized: &str, agent_count: usize, total_keywords: usize) -> u32 {
    let coordination: usize = COORDINATION_WORDS
        .iter()
        .chain(COMPOUND_PHRASES)
        .map(|w| count_phrase(normalized, w))
        .sum();
    let sequencing: usize = SEQUENCING_WORDS
        .iter()
        .map(|w| count_phrase(normalized, w))
        .sum();

    AGENT_WEIGHT * agent_count as u32
        + (total_keywords as u32).min(KEYWORD_CAP)
        + COORDINATION_WEIGHT * coordination as u32
        + SEQUENCING_WEIGHT * sequencing as u32
}

#[async_trait]
impl IntentAnalysisStrategy for RuleBasedAnalyzer {
    async fn analyze(&self, user_input: &str, context: &SessionContext) -> IntentAnalysisResult {
        self.analyze_user_request(user_input, context)
    }

    fn name(&self) -> &'static str {
        "rule_based"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::PlanKind;

    fn analyzer() -> RuleBasedAnalyzer {
        RuleBasedAnalyzer::default()
    }

    #[test]
    fn test_check_my_emails() {
        let result = analyzer().analyze_user_request("Check my emails", &SessionContext::new());
        assert_eq!(result.primary_intent, "check_emails");
        assert_eq!(result.required_agents, vec![AgentType::Email, AgentType::Content]);
        assert_eq!(result.workflow_type_label(), "email_content");
        assert_eq!(result.complexity, TaskComplexity::Simple);
        assert_eq!(result.execution_plan.kind, PlanKind::Template);
        assert!(result
            .execution_plan
            .steps
            .iter()
            .any(|s| s.agent == AgentType::Email));
        assert_eq!(result.analysis_method, AnalysisMethod::RuleBased);
    }

    #[test]
    fn test_schedule_and_send_invites() {
        let result = analyzer().analyze_user_request(
            "Schedule a meeting and send invites tomorrow at 2pm",
            &SessionContext::new(),
        );
        assert_eq!(result.primary_intent, "schedule_and_notify");
        assert!(result.required_agents.contains(&AgentType::Email));
        assert!(result.required_agents.contains(&AgentType::Calendar));
        assert_eq!(result.workflow_type, Some(WorkflowType::EmailCalendar));
        assert!(result.complexity >= TaskComplexity::Moderate);
        assert_eq!(result.execution_plan.template.as_deref(), Some("meeting_scheduling"));
        assert!(result.context_coordination_needed);
    }

    #[test]
    fn test_multi_agent_intent_forces_all_agents() {
        let result = analyzer().analyze_user_request("Give me my morning briefing", &SessionContext::new());
        assert_eq!(result.primary_intent, "daily_briefing");
        assert_eq!(
            result.required_agents,
            vec![AgentType::Email, AgentType::Calendar, AgentType::Content]
        );
        assert_eq!(result.workflow_type, Some(WorkflowType::AllAgents));
        assert_eq!(result.execution_plan.coordination, Coordination::Mixed);
        assert!(result.parallel_possible);
    }

    #[test]
    fn test_no_keywords_defaults_to_email_and_content() {
        let result = analyzer().analyze_user_request("hello there", &SessionContext::new());
        assert_eq!(result.primary_intent, "general_assistance");
        assert_eq!(result.required_agents, vec![AgentType::Email, AgentType::Content]);
    }

    #[test]
    fn test_keyword_fallback_prefers_email_on_tie() {
        let result = analyzer().analyze_user_request("inbox calendar", &SessionContext::new());
        assert_eq!(result.primary_intent, "email_general");
        let result = analyzer().analyze_user_request("meeting calendar gmail", &SessionContext::new());
        assert_eq!(result.primary_intent, "calendar_general");
    }

    #[test]
    fn test_keyword_fallback_follows_catalog_ranking() {
        let rules = analyzer();
        for input in ["tone calendar", "inbox calendar", "invite tomorrow tone"] {
            let expected = match rules.catalog().suggest_agents(input).first().map(|(a, _)| *a) {
                Some(AgentType::Email) => "email_general",
                Some(AgentType::Calendar) => "calendar_general",
                Some(AgentType::Content) => "content_general",
                None => "general_assistance",
            };
            let result = rules.analyze_user_request(input, &SessionContext::new());
            assert_eq!(result.primary_intent, expected, "input: {input}");
        }
        let result = rules.analyze_user_request("tone calendar", &SessionContext::new());
        assert_eq!(result.primary_intent, "content_general");
        let result = rules.analyze_user_request("invite tomorrow tone", &SessionContext::new());
        assert_eq!(result.primary_intent, "calendar_general");
    }

    #[test]
    fn test_sequencing_words_raise_complexity() {
        let plain = analyzer().analyze_user_request("check my inbox", &SessionContext::new());
        let sequenced = analyzer().analyze_user_request(
            "First check my inbox, then reply to Sam, and finally schedule a meeting after that",
            &SessionContext::new(),
        );
        assert!(sequenced.complexity > plain.complexity);
        assert_eq!(sequenced.complexity, TaskComplexity::Advanced);
    }

    #[test]
    fn test_deterministic_results() {
        let ctx = SessionContext::new();
        let a = analyzer().analyze_user_request("Reply to Alice about the budget", &ctx);
        let b = analyzer().analyze_user_request("Reply to Alice about the budget", &ctx);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_empty_input_uses_emergency_fallback() {
        for input in ["", "   \n\t"] {
            let result = analyzer().analyze_user_request(input, &SessionContext::new());
            assert_eq!(result.analysis_method, AnalysisMethod::EmergencyFallback);
            assert_eq!(result.primary_intent, "general_assistance");
        }
    }

    #[test]
    fn test_pair_heuristics_without_templates() {
        let empty_store = WorkflowTemplateStore::new(Vec::new(), Default::default());
        let plan = plan_for(
            &empty_store,
            "schedule_meeting",
            &[AgentType::Email, AgentType::Calendar],
            Some(WorkflowType::EmailCalendar),
            None,
        );
        assert_eq!(plan.kind, PlanKind::Custom);
        let actions: Vec<&str> = plan.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["check_availability", "create_event", "send_notification"]);

        let plan = plan_for(&empty_store, "content_general", &[AgentType::Content], None, None);
        assert_eq!(plan.kind, PlanKind::Fallback);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].agent, AgentType::Content);
    }
}
