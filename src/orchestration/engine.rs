//! 执行引擎
//!
//! 按计划的协调方式执行步骤：
//! - sequential：逐步执行，第 N 步的输入总是反映第 N-1 步之后的上下文与结果
//! - parallel：所有步骤共享同一份上下文快照并发执行，互不可见，失败互不影响
//! - mixed：相邻的 parallel 步骤合为一批，非 parallel 步骤单独成批；批间顺序执行并折叠上下文
//!
//! Agent 调用统一加超时；超时、报错、panic、注册表缺失都转成失败的 StepResult，不向调用方传播。

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::OrchestratorSection;
use crate::core::OrchestratorError;

use super::agent::AgentRegistry;
use super::context::SessionContext;
use super::coordinator::fold_step;
use super::outcome::{compile_workflow_result, structural_failure};
use super::step_input::StepInputBuilder;
use super::types::{
    Coordination, ExecutionPlan, IntentAnalysisResult, StepResult, WorkflowResult, WorkflowStep,
};

pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_PARALLEL_AGENTS: usize = 3;

const EMPTY_PLAN_RESPONSE: &str =
    "I couldn't work out any steps for that request. Could you rephrase it?";
const NO_AGENTS_RESPONSE: &str =
    "No assistants are connected right now, so I couldn't handle that request.";

/// 把步骤列表切成有序批次（元素为步骤下标）：相邻且都标记 parallel 的步骤同批，其余单独成批
pub fn partition_batches(steps: &[WorkflowStep]) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let joins_previous = index > 0 && step.parallel && steps[index - 1].parallel;
        match batches.last_mut() {
            Some(last) if joins_previous => last.push(index),
            _ => batches.push(vec![index]),
        }
    }
    batches
}

/// 执行引擎：持有单步超时、批内并发上限与步骤输入构建器
///
/// 并发上限只作用于单个批次内部：每次 run_batch 新建信号量，不同工作流之间互不占用许可。
pub struct ExecutionEngine {
    agent_timeout: Duration,
    max_parallel_agents: usize,
    inputs: StepInputBuilder,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_TIMEOUT_SECS, DEFAULT_MAX_PARALLEL_AGENTS)
    }
}

impl ExecutionEngine {
    pub fn new(agent_timeout_secs: u64, max_parallel_agents: usize) -> Self {
        Self {
            agent_timeout: Duration::from_secs(agent_timeout_secs),
            max_parallel_agents: max_parallel_agents.max(1),
            inputs: StepInputBuilder::default(),
        }
    }

    pub fn from_config(section: &OrchestratorSection) -> Self {
        Self::new(section.agent_timeout_secs, section.max_parallel_agents)
    }

    pub fn with_timeout(mut self, agent_timeout: Duration) -> Self {
        self.agent_timeout = agent_timeout;
        self
    }

    pub fn with_input_builder(mut self, inputs: StepInputBuilder) -> Self {
        self.inputs = inputs;
        self
    }

    /// 执行分析结果中的计划
    pub async fn delegate_task(
        &self,
        analysis: &IntentAnalysisResult,
        user_input: &str,
        context: &SessionContext,
        registry: &AgentRegistry,
    ) -> WorkflowResult {
        tracing::info!(
            intent = %analysis.primary_intent,
            workflow_type = analysis.workflow_type_label(),
            method = ?analysis.analysis_method,
            "Delegating task"
        );
        self.execute(&analysis.execution_plan, user_input, context, registry)
            .await
    }

    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        user_input: &str,
        context: &SessionContext,
        registry: &AgentRegistry,
    ) -> WorkflowResult {
        let workflow_id = format!("wf_{}", uuid::Uuid::new_v4());
        let started_at = chrono::Utc::now().to_rfc3339();

        if plan.steps.is_empty() {
            tracing::warn!(workflow_id = %workflow_id, "Plan has no steps");
            return structural_failure(
                workflow_id,
                started_at,
                plan.coordination,
                OrchestratorError::EmptyPlan.to_string(),
                EMPTY_PLAN_RESPONSE,
            );
        }
        if registry.is_empty() {
            tracing::warn!(workflow_id = %workflow_id, "Agent registry is empty");
            return structural_failure(
                workflow_id,
                started_at,
                plan.coordination,
                OrchestratorError::NoAgents.to_string(),
                NO_AGENTS_RESPONSE,
            );
        }

        tracing::info!(
            workflow_id = %workflow_id,
            steps = plan.steps.len(),
            coordination = plan.coordination.as_str(),
            "Workflow started"
        );

        let results = match plan.coordination {
            Coordination::Sequential => {
                self.run_sequential(plan, user_input, context, registry).await
            }
            Coordination::Parallel => {
                let all: Vec<usize> = (0..plan.steps.len()).collect();
                self.run_batch(&plan.steps, &all, user_input, context, &[], registry)
                    .await
            }
            Coordination::Mixed => self.run_mixed(plan, user_input, context, registry).await,
        };

        let result = compile_workflow_result(workflow_id, started_at, plan.coordination, results);
        tracing::info!(
            workflow_id = %result.workflow_id,
            success = result.success,
            successful = result.successful_steps,
            failed = result.failed_steps,
            total_ms = result.total_execution_time_ms,
            "Workflow finished"
        );
        result
    }

    async fn run_sequential(
        &self,
        plan: &ExecutionPlan,
        user_input: &str,
        context: &SessionContext,
        registry: &AgentRegistry,
    ) -> Vec<StepResult> {
        let mut accumulated = context.clone();
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.steps.len());

        for (index, step) in plan.steps.iter().enumerate() {
            let input = self.inputs.build(user_input, step, &accumulated, &results);
            let result = self.execute_step(index, step, input, registry).await;
            accumulated = fold_step(&accumulated, &result);

            let halt = !result.success && plan.is_critical(index);
            results.push(result);
            if halt {
                tracing::warn!(
                    step = index,
                    action = %step.action,
                    remaining = plan.steps.len() - index - 1,
                    "Critical step failed, halting workflow"
                );
                break;
            }
        }
        results
    }

    async fn run_mixed(
        &self,
        plan: &ExecutionPlan,
        user_input: &str,
        context: &SessionContext,
        registry: &AgentRegistry,
    ) -> Vec<StepResult> {
        let batches = partition_batches(&plan.steps);
        let mut accumulated = context.clone();
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.steps.len());

        for (batch_no, batch) in batches.iter().enumerate() {
            tracing::debug!(batch = batch_no, size = batch.len(), "Running batch");
            let batch_results = self
                .run_batch(&plan.steps, batch, user_input, &accumulated, &results, registry)
                .await;
            for r in &batch_results {
                accumulated = fold_step(&accumulated, r);
            }
            results.extend(batch_results);
        }
        results
    }

    /// 并发执行一批步骤：共享同一份快照与前序结果，收集全部结果（不因单步失败提前结束）
    async fn run_batch(
        &self,
        steps: &[WorkflowStep],
        batch: &[usize],
        user_input: &str,
        snapshot: &SessionContext,
        prior: &[StepResult],
        registry: &AgentRegistry,
    ) -> Vec<StepResult> {
        let permits = Semaphore::new(self.max_parallel_agents);
        let permits = &permits;
        let futures = batch.iter().map(|&index| {
            let step = &steps[index];
            let input = self.inputs.build(user_input, step, snapshot, prior);
            async move {
                let _permit = permits.acquire().await.ok();
                self.execute_step(index, step, input, registry).await
            }
        });
        let mut results = join_all(futures).await;
        results.sort_by_key(|r| r.step_index);
        results
    }

    async fn execute_step(
        &self,
        index: usize,
        step: &WorkflowStep,
        input: String,
        registry: &AgentRegistry,
    ) -> StepResult {
        let start = Instant::now();
        let outcome = self.invoke_agent(step, &input, registry).await;
        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (ok, label) = match &outcome {
            Ok(_) => (true, "ok"),
            Err(OrchestratorError::AgentTimeout { .. }) => (false, "timeout"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "agent_audit",
            "step": index,
            "agent": step.agent.as_str(),
            "action": step.action,
            "ok": ok,
            "outcome": label,
            "duration_ms": execution_time_ms as u64,
            "input_preview": input_preview(&input),
        });
        tracing::info!(audit = %audit.to_string(), "agent");

        let (success, result, error) = match outcome {
            Ok(value) => (true, value, None),
            Err(e) => {
                tracing::warn!(step = index, agent = step.agent.as_str(), error = %e, "Step failed");
                (false, Value::Null, Some(e.to_string()))
            }
        };

        StepResult {
            step_index: index,
            agent: step.agent,
            action: step.action.clone(),
            success,
            result,
            execution_time_ms,
            error,
            input,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn invoke_agent(
        &self,
        step: &WorkflowStep,
        input: &str,
        registry: &AgentRegistry,
    ) -> Result<Value, OrchestratorError> {
        let agent = registry
            .get(step.agent)
            .ok_or_else(|| OrchestratorError::AgentNotFound(step.agent.agent_id().to_string()))?;

        let call = AssertUnwindSafe(agent.invoke(input)).catch_unwind();
        match timeout(self.agent_timeout, call).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(OrchestratorError::AgentFailed {
                agent: step.agent.agent_id().to_string(),
                message,
            }),
            Ok(Err(_panic)) => Err(OrchestratorError::AgentFailed {
                agent: step.agent.agent_id().to_string(),
                message: "agent panicked".to_string(),
            }),
            Err(_) => Err(OrchestratorError::AgentTimeout {
                agent: step.agent.agent_id().to_string(),
                secs: self.agent_timeout.as_secs(),
            }),
        }
    }
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}

/// 使用默认配置的引擎执行分析结果中的计划
pub async fn delegate_task(
    analysis: &IntentAnalysisResult,
    user_input: &str,
    context: &SessionContext,
    available_agents: &AgentRegistry,
) -> WorkflowResult {
    ExecutionEngine::default()
        .delegate_task(analysis, user_input, context, available_agents)
        .await
}
