//! 工作流模板库
//!
//! 固定的多步骤计划，按名称查找；另维护「意图名 → 模板名」直接映射与「工作流类型 → 模板」索引。

use std::collections::HashMap;

use super::types::{AgentType, Coordination, TaskComplexity, WorkflowStep, WorkflowTemplate, WorkflowType};

/// 模板库（只读；启动时构建后注入分析器）
#[derive(Debug, Clone)]
pub struct WorkflowTemplateStore {
    templates: Vec<WorkflowTemplate>,
    by_name: HashMap<String, usize>,
    intent_routes: HashMap<String, String>,
}

impl Default for WorkflowTemplateStore {
    fn default() -> Self {
        use AgentType::*;
        use Coordination::*;

        let t = |name: &str,
                 workflow_type: WorkflowType,
                 complexity: TaskComplexity,
                 coordination: Coordination,
                 steps: Vec<WorkflowStep>| WorkflowTemplate {
            name: name.to_string(),
            workflow_type,
            complexity,
            steps,
            coordination,
        };
        let seq = WorkflowStep::sequential;
        let par = WorkflowStep::parallel;

        let templates = vec![
            t("email_check", WorkflowType::EmailContent, TaskComplexity::Simple, Sequential, vec![
                seq(Email, "fetch_emails"),
                seq(Content, "summarize_content"),
            ]),
            t("email_summary", WorkflowType::EmailContent, TaskComplexity::Moderate, Sequential, vec![
                seq(Email, "fetch_emails"),
                seq(Content, "analyze_content"),
                seq(Content, "summarize_content"),
            ]),
            t("email_compose", WorkflowType::EmailContent, TaskComplexity::Moderate, Sequential, vec![
                seq(Content, "generate_content"),
                seq(Email, "send_email"),
            ]),
            t("email_reply", WorkflowType::EmailContent, TaskComplexity::Moderate, Sequential, vec![
                seq(Email, "fetch_emails"),
                seq(Content, "generate_reply"),
                seq(Email, "reply_email"),
            ]),
            t("email_only", WorkflowType::EmailOnly, TaskComplexity::Simple, Sequential, vec![
                seq(Email, "process_email"),
            ]),
            t("calendar_view", WorkflowType::CalendarContent, TaskComplexity::Simple, Sequential, vec![
                seq(Calendar, "get_events"),
                seq(Content, "summarize_content"),
            ]),
            t("availability_check", WorkflowType::CalendarContent, TaskComplexity::Simple, Sequential, vec![
                seq(Calendar, "check_availability"),
                seq(Content, "summarize_content"),
            ]),
            t("calendar_scheduling", WorkflowType::CalendarContent, TaskComplexity::Moderate, Sequential, vec![
                seq(Calendar, "check_availability"),
                seq(Calendar, "create_event"),
            ]),
            t("calendar_only", WorkflowType::CalendarOnly, TaskComplexity::Simple, Sequential, vec![
                seq(Calendar, "manage_calendar"),
            ]),
            t("meeting_scheduling", WorkflowType::EmailCalendar, TaskComplexity::Moderate, Sequential, vec![
                seq(Calendar, "check_availability"),
                seq(Calendar, "create_event"),
                seq(Email, "send_notification"),
            ]),
            t("inbox_and_agenda", WorkflowType::EmailCalendar, TaskComplexity::Moderate, Parallel, vec![
                par(Email, "fetch_emails"),
                par(Calendar, "get_events"),
            ]),
            t("email_to_calendar", WorkflowType::AllAgents, TaskComplexity::Complex, Sequential, vec![
                seq(Email, "fetch_emails"),
                seq(Content, "analyze_content"),
                seq(Calendar, "create_event"),
                seq(Email, "send_notification"),
            ]),
            t("daily_briefing", WorkflowType::AllAgents, TaskComplexity::Complex, Mixed, vec![
                par(Email, "fetch_emails"),
                par(Calendar, "get_events"),
                seq(Content, "summarize_content"),
            ]),
            t("meeting_follow_up", WorkflowType::AllAgents, TaskComplexity::Advanced, Mixed, vec![
                par(Calendar, "get_events"),
                par(Email, "fetch_emails"),
                seq(Content, "generate_content"),
                seq(Email, "send_email"),
            ]),
        ];

        let intent_routes = [
            ("check_emails", "email_check"),
            ("summarize_emails", "email_summary"),
            ("compose_email", "email_compose"),
            ("send_email", "email_compose"),
            ("reply_email", "email_reply"),
            ("view_calendar", "calendar_view"),
            ("check_availability", "availability_check"),
            ("schedule_meeting", "calendar_scheduling"),
            ("schedule_and_notify", "meeting_scheduling"),
            ("email_to_calendar", "email_to_calendar"),
            ("daily_briefing", "daily_briefing"),
            ("meeting_follow_up", "meeting_follow_up"),
        ];

        Self::new(
            templates,
            intent_routes
                .into_iter()
                .map(|(intent, template)| (intent.to_string(), template.to_string()))
                .collect(),
        )
    }
}

impl WorkflowTemplateStore {
    pub fn new(templates: Vec<WorkflowTemplate>, intent_routes: HashMap<String, String>) -> Self {
        let by_name = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            templates,
            by_name,
            intent_routes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    pub fn templates(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    /// 意图名直接映射的模板
    pub fn for_intent(&self, intent: &str) -> Option<&WorkflowTemplate> {
        self.intent_routes.get(intent).and_then(|name| self.get(name))
    }

    /// 指定工作流类型下声明顺序中的第一个模板
    pub fn first_for_type(&self, workflow_type: WorkflowType) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.workflow_type == workflow_type)
    }

    /// 解析模板：先按意图名直接查找，再按工作流类型取首个
    pub fn resolve(&self, intent: &str, workflow_type: Option<WorkflowType>) -> Option<&WorkflowTemplate> {
        self.for_intent(intent)
            .or_else(|| workflow_type.and_then(|t| self.first_for_type(t)))
    }

    /// 生成 prompt 中的工作流模式段落
    pub fn describe(&self) -> String {
        self.templates
            .iter()
            .map(|t| {
                let steps = t
                    .steps
                    .iter()
                    .map(|s| format!("{}:{}{}", s.agent, s.action, if s.parallel { "(parallel)" } else { "" }))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                format!("- {} [{}; {}]: {}", t.name, t.workflow_type.as_str(), t.coordination.as_str(), steps)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_intent_route_points_to_a_template() {
        let store = WorkflowTemplateStore::default();
        for intent in store.intent_routes.keys() {
            assert!(store.for_intent(intent).is_some(), "dangling route: {intent}");
        }
    }

    #[test]
    fn test_every_workflow_type_has_a_template() {
        let store = WorkflowTemplateStore::default();
        for workflow_type in WorkflowType::ALL {
            let template = store.first_for_type(workflow_type).expect("template");
            assert_eq!(template.workflow_type, workflow_type);
        }
    }

    #[test]
    fn test_resolve_prefers_intent_route() {
        let store = WorkflowTemplateStore::default();
        let template = store
            .resolve("schedule_meeting", Some(WorkflowType::EmailCalendar))
            .unwrap();
        assert_eq!(template.name, "calendar_scheduling");

        let template = store.resolve("unknown_intent", Some(WorkflowType::EmailCalendar)).unwrap();
        assert_eq!(template.name, "meeting_scheduling");

        assert!(store.resolve("unknown_intent", None).is_none());
    }

    #[test]
    fn test_template_signatures_cover_their_agents() {
        let store = WorkflowTemplateStore::default();
        for template in store.templates() {
            let signature = template.workflow_type.signature();
            assert!(
                template.steps.iter().all(|s| signature.contains(&s.agent)),
                "{} uses an agent outside its signature",
                template.name
            );
        }
    }
}
