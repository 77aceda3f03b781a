//! 步骤结果分类与工作流结果汇总
//!
//! classify_step_outcome 是唯一的「按子串粗分类」入口：最终回复文本与上下文协调都只经过这里，
//! 以后换成结构化结果时只需改这一处。

use serde_json::Value;

use super::types::{
    AgentType, Coordination, StepResult, WorkflowResult, WorkflowSummary,
};

/// 动作类别（由 Agent + 动作标签粗分）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    EmailFetch,
    EmailSend,
    EmailReply,
    CalendarCreate,
    CalendarCheck,
    CalendarFind,
    ContentSummarize,
    ContentAnalyze,
    ContentGenerate,
    Other,
}

impl ActionClass {
    /// 写入上下文子段的 (时间戳键, 成功标记键)
    pub fn context_keys(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ActionClass::EmailFetch => Some(("last_email_fetch", "fetch_successful")),
            ActionClass::EmailSend => Some(("last_email_sent", "send_successful")),
            ActionClass::EmailReply => Some(("last_reply_sent", "reply_successful")),
            ActionClass::CalendarCreate => Some(("last_event_created", "create_successful")),
            ActionClass::CalendarCheck => Some(("last_availability_check", "check_successful")),
            ActionClass::CalendarFind => Some(("last_slot_search", "find_successful")),
            ActionClass::ContentSummarize => Some(("last_summary", "summarize_successful")),
            ActionClass::ContentAnalyze => Some(("last_analysis", "analyze_successful")),
            ActionClass::ContentGenerate => Some(("last_generation", "generate_successful")),
            ActionClass::Other => None,
        }
    }
}

/// 单步的粗分类：动作类别 + 面向用户的一句话（仅成功步骤有）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub class: ActionClass,
    pub clause: Option<String>,
}

pub fn classify_action(agent: AgentType, action: &str) -> ActionClass {
    let action = action.to_lowercase();
    match agent {
        AgentType::Email => {
            if action.contains("fetch") || action.contains("get") {
                ActionClass::EmailFetch
            } else if action.contains("send") {
                ActionClass::EmailSend
            } else if action.contains("reply") {
                ActionClass::EmailReply
            } else {
                ActionClass::Other
            }
        }
        AgentType::Calendar => {
            if action.contains("create") {
                ActionClass::CalendarCreate
            } else if action.contains("check") {
                ActionClass::CalendarCheck
            } else if action.contains("find") {
                ActionClass::CalendarFind
            } else {
                ActionClass::Other
            }
        }
        AgentType::Content => {
            if action.contains("summarize") {
                ActionClass::ContentSummarize
            } else if action.contains("analyze") {
                ActionClass::ContentAnalyze
            } else if action.contains("generate") {
                ActionClass::ContentGenerate
            } else {
                ActionClass::Other
            }
        }
    }
}

/// 载荷转为文本（字符串原样，其余序列化为 JSON），供子串检查；大小写由调用方处理
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn response_clause(agent: AgentType, payload: &Value) -> String {
    let text = payload_text(payload).to_lowercase();
    let clause = match agent {
        AgentType::Email => {
            if text.contains("repl") {
                "Reply sent successfully."
            } else if text.contains("sent") {
                "Email sent successfully."
            } else if text.contains("email") || text.contains("message") || text.contains("found") {
                "I've retrieved your emails."
            } else {
                "Email task completed."
            }
        }
        AgentType::Calendar => {
            if text.contains("created") || text.contains("scheduled") {
                "Calendar event created."
            } else if text.contains("available") || text.contains("free") {
                "I've checked your availability."
            } else if text.contains("event") || text.contains("meeting") {
                "I've retrieved your calendar events."
            } else {
                "Calendar task completed."
            }
        }
        AgentType::Content => {
            if text.contains("summary") || text.contains("summar") {
                "Content summarized."
            } else if text.contains("draft") {
                "Draft prepared."
            } else {
                "Content processed."
            }
        }
    };
    clause.to_string()
}

pub fn classify_step_outcome(step: &StepResult) -> StepOutcome {
    let class = classify_action(step.agent, &step.action);
    let clause = step
        .success
        .then(|| response_clause(step.agent, &step.result));
    StepOutcome { class, clause }
}

pub const APOLOGY_RESPONSE: &str =
    "I'm sorry, I couldn't complete your request. Please check your connected accounts and try again.";

/// 由成功步骤生成最终回复：每种 Agent 一句，取该 Agent 最后一个成功步骤（顺序按首次出现）；
/// 全失败时道歉；部分失败时附失败数
pub fn compose_final_response(results: &[StepResult]) -> String {
    let successes: Vec<&StepResult> = results.iter().filter(|r| r.success).collect();
    if successes.is_empty() {
        return APOLOGY_RESPONSE.to_string();
    }

    let mut latest: Vec<(AgentType, &StepResult)> = Vec::new();
    for step in &successes {
        match latest.iter_mut().find(|(agent, _)| *agent == step.agent) {
            Some(slot) => slot.1 = step,
            None => latest.push((step.agent, step)),
        }
    }
    let clauses: Vec<String> = latest
        .iter()
        .filter_map(|(_, step)| classify_step_outcome(step).clause)
        .collect();

    let mut response = clauses.join(" ");
    let failed = results.len() - successes.len();
    if failed > 0 {
        let noun = if failed == 1 { "step" } else { "steps" };
        response.push_str(&format!(" Note: {failed} {noun} could not be completed."));
    }
    response
}

/// 由 StepResult 序列一次性构建 WorkflowResult（结果按 step_index 排序）
pub fn compile_workflow_result(
    workflow_id: String,
    started_at: String,
    coordination: Coordination,
    mut results: Vec<StepResult>,
) -> WorkflowResult {
    results.sort_by_key(|r| r.step_index);
    let total_steps = results.len();
    let successful_steps = results.iter().filter(|r| r.success).count();
    let failed_steps = total_steps - successful_steps;
    let total_execution_time_ms = results.iter().map(|r| r.execution_time_ms).sum();

    let mut agents_involved: Vec<AgentType> = Vec::new();
    for r in &results {
        if !agents_involved.contains(&r.agent) {
            agents_involved.push(r.agent);
        }
    }
    let actions_completed = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.action.clone())
        .collect();
    let workflow_efficiency = if total_steps == 0 {
        0.0
    } else {
        successful_steps as f64 / total_steps as f64
    };

    WorkflowResult {
        workflow_id,
        started_at,
        success: successful_steps > 0,
        total_steps,
        successful_steps,
        failed_steps,
        coordination_type: coordination,
        total_execution_time_ms,
        final_response: compose_final_response(&results),
        detailed_results: results,
        workflow_summary: WorkflowSummary {
            agents_involved,
            actions_completed,
            execution_pattern: coordination,
            workflow_efficiency,
        },
        error: None,
    }
}

/// 结构性失败（无步骤 / 无 Agent）时的结果
pub fn structural_failure(
    workflow_id: String,
    started_at: String,
    coordination: Coordination,
    error: String,
    final_response: &str,
) -> WorkflowResult {
    let mut result = compile_workflow_result(workflow_id, started_at, coordination, Vec::new());
    result.final_response = final_response.to_string();
    result.error = Some(error);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(index: usize, agent: AgentType, action: &str, success: bool, result: Value) -> StepResult {
        StepResult {
            step_index: index,
            agent,
            action: action.to_string(),
            success,
            result,
            execution_time_ms: 10.0,
            error: (!success).then(|| "boom".to_string()),
            input: String::new(),
            completed_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_classify_action_order() {
        assert_eq!(classify_action(AgentType::Email, "fetch_emails"), ActionClass::EmailFetch);
        assert_eq!(classify_action(AgentType::Email, "send_notification"), ActionClass::EmailSend);
        assert_eq!(classify_action(AgentType::Email, "reply_email"), ActionClass::EmailReply);
        assert_eq!(classify_action(AgentType::Calendar, "check_availability"), ActionClass::CalendarCheck);
        assert_eq!(classify_action(AgentType::Calendar, "find_free_slots"), ActionClass::CalendarFind);
        assert_eq!(classify_action(AgentType::Content, "generate_reply"), ActionClass::ContentGenerate);
        assert_eq!(classify_action(AgentType::Content, "translate"), ActionClass::Other);
    }

    #[test]
    fn test_final_response_one_clause_per_agent() {
        let results = vec![
            step(0, AgentType::Email, "fetch_emails", true, json!("Found 3 emails")),
            step(1, AgentType::Content, "summarize_content", true, json!({"summary": "..."})),
            step(2, AgentType::Email, "send_email", true, json!("Email sent")),
        ];
        let response = compose_final_response(&results);
        assert_eq!(response, "Email sent successfully. Content summarized.");
    }

    #[test]
    fn test_final_response_reports_reply_after_fetch() {
        let results = vec![
            step(0, AgentType::Email, "fetch_emails", true, json!("Found 3 emails: Alice asks about Friday")),
            step(1, AgentType::Content, "generate_reply", true, json!({"draft": "Friday works for me."})),
            step(2, AgentType::Email, "reply_email", true, json!("Reply sent to Alice")),
        ];
        let response = compose_final_response(&results);
        assert_eq!(response, "Reply sent successfully. Draft prepared.");
        assert!(!response.contains("retrieved"));
    }

    #[test]
    fn test_final_response_ignores_failed_last_step() {
        let results = vec![
            step(0, AgentType::Email, "fetch_emails", true, json!("Found 3 emails")),
            step(1, AgentType::Email, "reply_email", false, Value::Null),
        ];
        let response = compose_final_response(&results);
        assert!(response.starts_with("I've retrieved your emails."));
        assert!(response.contains("1 step could not be completed"));
    }

    #[test]
    fn test_final_response_reports_failures() {
        let results = vec![
            step(0, AgentType::Calendar, "create_event", true, json!("Event created")),
            step(1, AgentType::Email, "send_notification", false, Value::Null),
        ];
        let response = compose_final_response(&results);
        assert!(response.starts_with("Calendar event created."));
        assert!(response.contains("1 step could not be completed"));

        let all_failed = vec![step(0, AgentType::Email, "fetch_emails", false, Value::Null)];
        assert_eq!(compose_final_response(&all_failed), APOLOGY_RESPONSE);
    }

    #[test]
    fn test_compile_sorts_and_counts() {
        let results = vec![
            step(2, AgentType::Content, "summarize_content", true, json!("summary")),
            step(0, AgentType::Email, "fetch_emails", false, Value::Null),
            step(1, AgentType::Calendar, "get_events", true, json!("2 events")),
        ];
        let compiled = compile_workflow_result(
            "wf_1".to_string(),
            "2026-01-01T00:00:00+00:00".to_string(),
            Coordination::Parallel,
            results,
        );
        assert!(compiled.success);
        assert_eq!(compiled.total_steps, 3);
        assert_eq!(compiled.failed_steps, 1);
        assert_eq!(compiled.total_execution_time_ms, 30.0);
        let order: Vec<usize> = compiled.detailed_results.iter().map(|r| r.step_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(
            compiled.workflow_summary.actions_completed,
            vec!["get_events".to_string(), "summarize_content".to_string()]
        );
        assert!((compiled.workflow_summary.workflow_efficiency - 2.0 / 3.0).abs() < 1e-9);
    }
}
