//! 上下文协调器
//!
//! 把成功步骤的结果折叠回会话上下文：每个 Agent 子段写入最近动作时间戳与成功标记，
//! 顶层 agent_coordination 段记录本次工作流的协调方式、参与 Agent 与整体成败。
//! 纯函数：时间戳取自 StepResult，不读时钟，相同输入得到相同输出。

use serde_json::{json, Value};

use super::context::{section_for, SessionContext, AGENT_COORDINATION};
use super::outcome::classify_step_outcome;
use super::types::{AgentType, StepResult, WorkflowResult};

/// 折叠单个步骤；失败步骤不写入
pub fn fold_step(context: &SessionContext, step: &StepResult) -> SessionContext {
    if !step.success {
        return context.clone();
    }
    let entries = step_entries(step);
    context.with_section_entries(section_for(step.agent), entries)
}

fn step_entries(step: &StepResult) -> Vec<(String, Value)> {
    let mut entries = vec![
        ("last_action".to_string(), json!(step.action)),
        ("last_action_at".to_string(), json!(step.completed_at)),
    ];
    if let Some((timestamp_key, flag_key)) = classify_step_outcome(step).class.context_keys() {
        entries.push((timestamp_key.to_string(), json!(step.completed_at)));
        entries.push((flag_key.to_string(), json!(true)));
    }
    entries
}

/// 工作流结束后的上下文协调：按 Agent 分组成功步骤并逐段更新，返回新上下文
pub fn coordinate_agent_contexts(
    session_context: &SessionContext,
    workflow_result: &WorkflowResult,
) -> SessionContext {
    let mut next = session_context.clone();

    for agent in AgentType::ALL {
        let successes: Vec<&StepResult> = workflow_result
            .detailed_results
            .iter()
            .filter(|r| r.success && r.agent == agent)
            .collect();
        if successes.is_empty() {
            continue;
        }
        for step in successes {
            next = fold_step(&next, step);
        }
    }

    let agents_involved: Vec<&str> = workflow_result
        .workflow_summary
        .agents_involved
        .iter()
        .map(|a| a.as_str())
        .collect();
    next.with_section_entries(
        AGENT_COORDINATION,
        vec![
            ("last_workflow_id".to_string(), json!(workflow_result.workflow_id)),
            ("last_workflow_at".to_string(), json!(workflow_result.started_at)),
            (
                "last_coordination_type".to_string(),
                json!(workflow_result.coordination_type.as_str()),
            ),
            ("agents_involved".to_string(), json!(agents_involved)),
            ("last_workflow_success".to_string(), json!(workflow_result.success)),
        ],
    )
}
