//! 编排类型定义
//!
//! Agent 类型、任务复杂度、工作流类型与模板、执行计划、意图分析结果、步骤结果与工作流结果。
//! IntentAnalysisResult 是分析器交给执行引擎的唯一计划表示。

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 逻辑 Agent 类型（新增变体时需同步补充能力目录）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Email,
    Content,
    Calendar,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Email, AgentType::Content, AgentType::Calendar];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Email => "email",
            AgentType::Content => "content",
            AgentType::Calendar => "calendar",
        }
    }

    /// 注册表 / LLM 输出中使用的完整标识（如 email_agent）
    pub fn agent_id(&self) -> &'static str {
        match self {
            AgentType::Email => "email_agent",
            AgentType::Content => "content_agent",
            AgentType::Calendar => "calendar_agent",
        }
    }

    /// 归一化 Agent 名称：接受 email / email_agent / gmail 等别名，大小写不敏感
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "email" | "email_agent" | "gmail" | "gmail_agent" | "mail" => Some(AgentType::Email),
            "content" | "content_agent" | "writer" | "writing_agent" => Some(AgentType::Content),
            "calendar" | "calendar_agent" | "schedule" | "scheduler" => Some(AgentType::Calendar),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务复杂度（仅描述用途，不影响执行）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
    Advanced,
}

/// 复杂度阈值：score <= SIMPLE_MAX 为 Simple，以此类推
pub const SIMPLE_MAX_SCORE: u32 = 5;
pub const MODERATE_MAX_SCORE: u32 = 10;
pub const COMPLEX_MAX_SCORE: u32 = 15;

impl TaskComplexity {
    pub fn from_score(score: u32) -> Self {
        if score <= SIMPLE_MAX_SCORE {
            TaskComplexity::Simple
        } else if score <= MODERATE_MAX_SCORE {
            TaskComplexity::Moderate
        } else if score <= COMPLEX_MAX_SCORE {
            TaskComplexity::Complex
        } else {
            TaskComplexity::Advanced
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "simple" => Some(TaskComplexity::Simple),
            "moderate" => Some(TaskComplexity::Moderate),
            "complex" => Some(TaskComplexity::Complex),
            "advanced" => Some(TaskComplexity::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskComplexity::Simple => "simple",
            TaskComplexity::Moderate => "moderate",
            TaskComplexity::Complex => "complex",
            TaskComplexity::Advanced => "advanced",
        }
    }
}

/// 工作流类型：由所需 Agent 集合（与顺序无关）唯一确定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    EmailOnly,
    CalendarOnly,
    EmailContent,
    CalendarContent,
    EmailCalendar,
    AllAgents,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 6] = [
        WorkflowType::EmailOnly,
        WorkflowType::CalendarOnly,
        WorkflowType::EmailContent,
        WorkflowType::CalendarContent,
        WorkflowType::EmailCalendar,
        WorkflowType::AllAgents,
    ];

    /// 该类型对应的 Agent 集合签名
    pub fn signature(&self) -> BTreeSet<AgentType> {
        use AgentType::*;
        let agents: &[AgentType] = match self {
            WorkflowType::EmailOnly => &[Email],
            WorkflowType::CalendarOnly => &[Calendar],
            WorkflowType::EmailContent => &[Email, Content],
            WorkflowType::CalendarContent => &[Calendar, Content],
            WorkflowType::EmailCalendar => &[Email, Calendar],
            WorkflowType::AllAgents => &[Email, Content, Calendar],
        };
        agents.iter().copied().collect()
    }

    /// 按集合精确匹配六种签名；不匹配返回 None（即 "custom"）
    pub fn from_agents(agents: &[AgentType]) -> Option<Self> {
        let set: BTreeSet<AgentType> = agents.iter().copied().collect();
        Self::ALL.into_iter().find(|t| t.signature() == set)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::EmailOnly => "email_only",
            WorkflowType::CalendarOnly => "calendar_only",
            WorkflowType::EmailContent => "email_content",
            WorkflowType::CalendarContent => "calendar_content",
            WorkflowType::EmailCalendar => "email_calendar",
            WorkflowType::AllAgents => "all_agents",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

/// 工作流类型标签：未匹配任何签名时为 "custom"
pub fn workflow_type_label(workflow_type: Option<WorkflowType>) -> &'static str {
    workflow_type.map(|t| t.as_str()).unwrap_or("custom")
}

/// 协调方式；未知取值一律按 Sequential 处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Coordination {
    #[default]
    Sequential,
    Parallel,
    Mixed,
}

impl Coordination {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "parallel" => Coordination::Parallel,
            "mixed" | "batched" => Coordination::Mixed,
            _ => Coordination::Sequential,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Coordination::Sequential => "sequential",
            Coordination::Parallel => "parallel",
            Coordination::Mixed => "mixed",
        }
    }
}

impl From<String> for Coordination {
    fn from(value: String) -> Self {
        Coordination::parse(&value)
    }
}

/// 工作流中的单个步骤；parallel 只是分批提示，不保证并发
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: AgentType,
    pub action: String,
    #[serde(default)]
    pub parallel: bool,
}

impl WorkflowStep {
    pub fn new(agent: AgentType, action: impl Into<String>, parallel: bool) -> Self {
        Self {
            agent,
            action: action.into(),
            parallel,
        }
    }

    pub fn sequential(agent: AgentType, action: impl Into<String>) -> Self {
        Self::new(agent, action, false)
    }

    pub fn parallel(agent: AgentType, action: impl Into<String>) -> Self {
        Self::new(agent, action, true)
    }
}

/// 静态工作流模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub workflow_type: WorkflowType,
    pub complexity: TaskComplexity,
    pub steps: Vec<WorkflowStep>,
    pub coordination: Coordination,
}

/// 执行计划来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Template,
    Custom,
    Fallback,
}

/// 执行计划：有序步骤 + 协调方式；critical_steps 为计划级元数据（失败即中止串行执行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(rename = "type")]
    pub kind: PlanKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub coordination: Coordination,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_steps: Vec<usize>,
}

impl ExecutionPlan {
    pub fn from_template(template: &WorkflowTemplate) -> Self {
        Self {
            kind: PlanKind::Template,
            template: Some(template.name.clone()),
            steps: template.steps.clone(),
            coordination: template.coordination,
            critical_steps: Vec::new(),
        }
    }

    pub fn custom(steps: Vec<WorkflowStep>, coordination: Coordination) -> Self {
        Self {
            kind: PlanKind::Custom,
            template: None,
            steps,
            coordination,
            critical_steps: Vec::new(),
        }
    }

    pub fn fallback(steps: Vec<WorkflowStep>) -> Self {
        Self {
            kind: PlanKind::Fallback,
            template: None,
            steps,
            coordination: Coordination::Sequential,
            critical_steps: Vec::new(),
        }
    }

    /// 标记关键步骤（串行执行中该步失败会中止剩余步骤）
    pub fn with_critical(mut self, step_index: usize) -> Self {
        if !self.critical_steps.contains(&step_index) {
            self.critical_steps.push(step_index);
        }
        self
    }

    pub fn is_critical(&self, step_index: usize) -> bool {
        self.critical_steps.contains(&step_index)
    }
}

/// 分析结果的产出路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    RuleBased,
    LlmEnhanced,
    RuleFallback,
    HybridLlmOverride,
    HybridRulePrimary,
    EmergencyFallback,
}

/// LLM 给出的建议性字段，不参与路由
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    #[serde(default)]
    pub optimization_suggestions: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

impl Advisory {
    pub fn is_empty(&self) -> bool {
        self.optimization_suggestions.is_empty() && self.risk_factors.is_empty()
    }
}

/// 所有分析策略共同的输出契约
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysisResult {
    pub primary_intent: String,
    pub required_agents: Vec<AgentType>,
    #[serde(
        serialize_with = "serialize_workflow_type",
        deserialize_with = "deserialize_workflow_type"
    )]
    pub workflow_type: Option<WorkflowType>,
    pub complexity: TaskComplexity,
    pub execution_plan: ExecutionPlan,
    pub estimated_steps: usize,
    pub parallel_possible: bool,
    pub context_coordination_needed: bool,
    pub analysis_method: AnalysisMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<Advisory>,
    #[serde(default)]
    pub from_cache: bool,
}

impl IntentAnalysisResult {
    /// 由核心字段组装结果；派生字段（步骤数、并行可能、是否需要上下文协调）在此统一计算
    pub fn assemble(
        primary_intent: impl Into<String>,
        required_agents: Vec<AgentType>,
        workflow_type: Option<WorkflowType>,
        complexity: TaskComplexity,
        execution_plan: ExecutionPlan,
        analysis_method: AnalysisMethod,
    ) -> Self {
        let required_agents = dedup_agents(required_agents);
        let mut result = Self {
            primary_intent: primary_intent.into(),
            required_agents,
            workflow_type,
            complexity,
            execution_plan,
            estimated_steps: 0,
            parallel_possible: false,
            context_coordination_needed: false,
            analysis_method,
            confidence: None,
            fallback_reason: None,
            advisory: None,
            from_cache: false,
        };
        result.refresh_derived();
        result
    }

    /// 修改 required_agents 或 execution_plan 后重新计算派生字段
    pub fn refresh_derived(&mut self) {
        self.estimated_steps = self.execution_plan.steps.len();
        self.parallel_possible = self.execution_plan.steps.iter().any(|s| s.parallel)
            || self.execution_plan.coordination == Coordination::Parallel;
        self.context_coordination_needed = self.required_agents.len() > 1;
    }

    /// 兜底结果：分析路径整体失败时返回，保证入口永不出错
    pub fn emergency_fallback(reason: impl Into<String>) -> Self {
        let plan = ExecutionPlan::fallback(vec![
            WorkflowStep::sequential(AgentType::Email, "process_request"),
            WorkflowStep::sequential(AgentType::Content, "generate_response"),
        ]);
        let mut result = Self::assemble(
            "general_assistance",
            vec![AgentType::Email, AgentType::Content],
            Some(WorkflowType::EmailContent),
            TaskComplexity::Simple,
            plan,
            AnalysisMethod::EmergencyFallback,
        );
        result.fallback_reason = Some(reason.into());
        result
    }

    pub fn workflow_type_label(&self) -> &'static str {
        workflow_type_label(self.workflow_type)
    }
}

/// 去重并保留首次出现的顺序
pub fn dedup_agents(agents: Vec<AgentType>) -> Vec<AgentType> {
    let mut seen = Vec::with_capacity(agents.len());
    for agent in agents {
        if !seen.contains(&agent) {
            seen.push(agent);
        }
    }
    seen
}

fn serialize_workflow_type<S: Serializer>(
    value: &Option<WorkflowType>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(workflow_type_label(*value))
}

fn deserialize_workflow_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<WorkflowType>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(WorkflowType::parse(&raw))
}

/// 单步执行结果：创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub agent: AgentType,
    pub action: String,
    pub success: bool,
    pub result: serde_json::Value,
    pub execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 实际发送给 Agent 的指令文本
    pub input: String,
    /// 完成时间（RFC3339）
    pub completed_at: String,
}

/// 工作流汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub agents_involved: Vec<AgentType>,
    pub actions_completed: Vec<String>,
    pub execution_pattern: Coordination,
    pub workflow_efficiency: f64,
}

/// 工作流最终结果：执行结束时一次性由 StepResult 序列构建
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub started_at: String,
    pub success: bool,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub coordination_type: Coordination,
    pub total_execution_time_ms: f64,
    pub final_response: String,
    pub detailed_results: Vec<StepResult>,
    pub workflow_summary: WorkflowSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
