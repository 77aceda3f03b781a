//! Agent 能力接口与注册表
//!
//! 所有 Agent 统一实现 Agent trait（invoke）。底层对象可能只提供 generate、run 或直接可调用，
//! 在注册时用适配器包装一次，执行引擎调用处不再探测调用约定。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::OrchestratorError;

use super::types::AgentType;

/// Agent trait：执行一条自然语言指令，返回结构化结果（引擎视为不透明载荷）
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, instruction: &str) -> Result<Value, String>;
}

/// 以 generate 为入口的 Agent
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(&self, text: &str) -> Result<Value, String>;
}

/// 以 run 为入口的 Agent
#[async_trait]
pub trait Run: Send + Sync {
    async fn run(&self, text: &str) -> Result<Value, String>;
}

/// 把 Generate 适配为 Agent
pub struct GenerateAdapter<T>(pub T);

#[async_trait]
impl<T: Generate> Agent for GenerateAdapter<T> {
    async fn invoke(&self, instruction: &str) -> Result<Value, String> {
        self.0.generate(instruction).await
    }
}

/// 把 Run 适配为 Agent
pub struct RunAdapter<T>(pub T);

#[async_trait]
impl<T: Run> Agent for RunAdapter<T> {
    async fn invoke(&self, instruction: &str) -> Result<Value, String> {
        self.0.run(instruction).await
    }
}

/// 直接可调用的 Agent：闭包接收指令文本，返回 Future
pub struct FnAgent<F> {
    f: F,
}

impl<F, Fut> FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn invoke(&self, instruction: &str) -> Result<Value, String> {
        (self.f)(instruction.to_string()).await
    }
}

/// Agent 注册表：按 AgentType 存储 Arc<dyn Agent>，由外部构建后注入执行引擎
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentType, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_type: AgentType, agent: impl Agent + 'static) {
        self.agents.insert(agent_type, Arc::new(agent));
    }

    pub fn register_arc(&mut self, agent_type: AgentType, agent: Arc<dyn Agent>) {
        self.agents.insert(agent_type, agent);
    }

    pub fn register_generate(&mut self, agent_type: AgentType, agent: impl Generate + 'static) {
        self.register(agent_type, GenerateAdapter(agent));
    }

    pub fn register_run(&mut self, agent_type: AgentType, agent: impl Run + 'static) {
        self.register(agent_type, RunAdapter(agent));
    }

    pub fn register_fn<F, Fut>(&mut self, agent_type: AgentType, f: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.register(agent_type, FnAgent::new(f));
    }

    /// 按字符串标识注册（email / email_agent 等别名均可）
    pub fn register_by_id(
        &mut self,
        agent_id: &str,
        agent: Arc<dyn Agent>,
    ) -> Result<AgentType, OrchestratorError> {
        let agent_type = AgentType::parse(agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(agent_id.to_string()))?;
        self.agents.insert(agent_type, agent);
        Ok(agent_type)
    }

    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.get(&agent_type).cloned()
    }

    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.agents.contains_key(&agent_type)
    }

    pub fn agent_types(&self) -> Vec<AgentType> {
        let mut types: Vec<AgentType> = self.agents.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
