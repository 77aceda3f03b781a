//! 步骤输入构建
//!
//! 从用户原话出发，按动作标签匹配规则表做少量拼接（前序邮件结果、日历事件、邮件上下文快照），
//! 最后附上目标 Agent 的上下文片段。尽力而为：缺少可拼接内容时原样传递，Agent 需能容忍。

use super::context::{SessionContext, CALENDAR_CONTEXT, EMAIL_CONTEXT};
use super::outcome::payload_text;
use super::types::{AgentType, StepResult, WorkflowStep};

type Augment = fn(&SessionContext, &[StepResult]) -> Option<String>;

/// 规则：动作标签（精确匹配）→ 拼接函数
pub struct AugmentationRule {
    pub actions: &'static [&'static str],
    pub augment: Augment,
}

fn latest_success(prior: &[StepResult], agent: AgentType) -> Option<&StepResult> {
    prior.iter().rev().find(|r| r.success && r.agent == agent)
}

fn splice_email_payload(_ctx: &SessionContext, prior: &[StepResult]) -> Option<String> {
    latest_success(prior, AgentType::Email)
        .map(|r| format!("\n\nEmail content to process:\n{}", payload_text(&r.result)))
}

fn splice_event_payload(_ctx: &SessionContext, prior: &[StepResult]) -> Option<String> {
    latest_success(prior, AgentType::Calendar)
        .map(|r| format!("\n\nEvent details:\n{}", payload_text(&r.result)))
}

fn splice_email_context(ctx: &SessionContext, _prior: &[StepResult]) -> Option<String> {
    ctx.section_snapshot(EMAIL_CONTEXT)
        .map(|snapshot| format!("\n\nRelated email context: {snapshot}"))
}

pub const DEFAULT_RULES: &[AugmentationRule] = &[
    AugmentationRule {
        actions: &["summarize_content", "analyze_content"],
        augment: splice_email_payload,
    },
    AugmentationRule {
        actions: &["send_invites", "send_notification"],
        augment: splice_event_payload,
    },
    AugmentationRule {
        actions: &["create_event", "schedule_meeting"],
        augment: splice_email_context,
    },
];

/// 步骤输入构建器（规则表可替换，便于单测）
#[derive(Clone, Copy)]
pub struct StepInputBuilder {
    rules: &'static [AugmentationRule],
}

impl Default for StepInputBuilder {
    fn default() -> Self {
        Self { rules: DEFAULT_RULES }
    }
}

impl StepInputBuilder {
    pub fn with_rules(rules: &'static [AugmentationRule]) -> Self {
        Self { rules }
    }

    pub fn build(
        &self,
        user_input: &str,
        step: &WorkflowStep,
        context: &SessionContext,
        prior: &[StepResult],
    ) -> String {
        let mut input = user_input.to_string();

        for rule in self.rules {
            if rule.actions.contains(&step.action.as_str()) {
                if let Some(extra) = (rule.augment)(context, prior) {
                    input.push_str(&extra);
                }
            }
        }

        let snippet = match step.agent {
            AgentType::Email => context
                .section_snapshot(EMAIL_CONTEXT)
                .map(|s| format!("[Email context: {s}]")),
            AgentType::Calendar => context
                .section_snapshot(CALENDAR_CONTEXT)
                .map(|s| format!("[Calendar context: {s}]")),
            AgentType::Content => None,
        };
        if let Some(snippet) = snippet {
            input.push_str("\n\n");
            input.push_str(&snippet);
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(agent: AgentType, success: bool, payload: serde_json::Value) -> StepResult {
        StepResult {
            step_index: 0,
            agent,
            action: "x".to_string(),
            success,
            result: payload,
            execution_time_ms: 0.0,
            error: None,
            input: String::new(),
            completed_at: String::new(),
        }
    }

    #[test]
    fn test_summarize_splices_latest_successful_email() {
        let builder = StepInputBuilder::default();
        let prior = vec![
            result(AgentType::Email, true, json!("old inbox")),
            result(AgentType::Email, true, json!("Subject: Q3 plan")),
            result(AgentType::Email, false, json!(null)),
        ];
        let step = WorkflowStep::sequential(AgentType::Content, "summarize_content");
        let input = builder.build("Summarize my email", &step, &SessionContext::new(), &prior);
        assert!(input.starts_with("Summarize my email"));
        assert!(input.contains("Subject: Q3 plan"));
        assert!(!input.contains("old inbox"));
    }

    #[test]
    fn test_missing_prior_results_leave_input_untouched() {
        let builder = StepInputBuilder::default();
        let step = WorkflowStep::sequential(AgentType::Email, "send_notification");
        let input = builder.build("Tell them", &step, &SessionContext::new(), &[]);
        assert_eq!(input, "Tell them");
    }

    #[test]
    fn test_create_event_gets_email_context_and_calendar_snippet() {
        let builder = StepInputBuilder::default();
        let ctx = SessionContext::from_value(json!({
            "current_email_context": {"thread": "lunch"},
            "current_calendar_context": {"tz": "UTC"}
        }));
        let step = WorkflowStep::sequential(AgentType::Calendar, "create_event");
        let input = builder.build("Book it", &step, &ctx, &[]);
        assert!(input.contains(r#"Related email context: {"thread":"lunch"}"#));
        assert!(input.ends_with(r#"[Calendar context: {"tz":"UTC"}]"#));
    }
}
