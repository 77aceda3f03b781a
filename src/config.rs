//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `VOICE__*` 覆盖（双下划线表示嵌套，如 `VOICE__ORCHESTRATOR__ANALYSIS_MODE=hybrid`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::OrchestratorError;
use crate::orchestration::analyzer::AnalysisMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需要 OPENAI_API_KEY，缺失时不创建 LLM 客户端，意图分析退回规则模式
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            request_timeout_secs: 60,
        }
    }
}

/// [orchestrator] 段：意图分析模式、Agent 超时与并发上限、LLM 置信度阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub analysis_mode: AnalysisMode,
    /// 单次 Agent 调用超时（秒）
    pub agent_timeout_secs: u64,
    /// 同一批次内同时执行的 Agent 调用上限
    pub max_parallel_agents: usize,
    /// 混合模式下 LLM 置信度高于该值才覆盖规则结果
    pub llm_override_confidence: f64,
    /// LLM 结果最低置信度，低于则视为无效
    pub min_intent_confidence: f64,
    pub cache: CacheSection,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            analysis_mode: AnalysisMode::Rule,
            agent_timeout_secs: 30,
            max_parallel_agents: 3,
            llm_override_confidence: 0.8,
            min_intent_confidence: 0.3,
            cache: CacheSection::default(),
        }
    }
}

/// [orchestrator.cache] 段：LLM 分析结果缓存
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 300,
        }
    }
}

/// 从 config 目录加载配置，环境变量 VOICE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 VOICE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, OrchestratorError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VOICE")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| OrchestratorError::Config(e.to_string()))
}

/// 加载失败时记录警告并使用默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
