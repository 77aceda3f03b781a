//! Voice Orchestrator 演示入口
//!
//! 用法：`voice-orchestrator [--config path.toml] <utterance...>`
//! 初始化日志、加载配置，用回显 Agent 处理一句话，并以 JSON 打印分析结果、工作流结果与新的会话上下文。

use std::path::PathBuf;

use anyhow::Context;
use serde_json::json;
use voice_orchestrator::observability;
use voice_orchestrator::orchestration::{AgentRegistry, AgentType, SessionContext};
use voice_orchestrator::Orchestrator;

fn demo_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register_fn(AgentType::Email, |instruction: String| async move {
        Ok(json!({
            "status": "ok",
            "message": "Found 2 unread emails",
            "instruction_chars": instruction.chars().count(),
        }))
    });
    registry.register_fn(AgentType::Calendar, |_instruction: String| async move {
        Ok(json!("Event created: Project sync, tomorrow 14:00"))
    });
    registry.register_fn(AgentType::Content, |instruction: String| async move {
        let first_line = instruction.lines().next().unwrap_or_default().to_string();
        Ok(json!({"summary": format!("Summary of request: {first_line}")}))
    });
    registry
}

fn parse_args() -> anyhow::Result<(Option<PathBuf>, String)> {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config requires a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            words.push(arg);
        }
    }
    if words.is_empty() {
        anyhow::bail!("usage: voice-orchestrator [--config path.toml] <utterance...>");
    }
    Ok((config_path, words.join(" ")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, utterance) = parse_args()?;
    let orchestrator = Orchestrator::load(config_path, demo_registry());

    let turn = orchestrator
        .handle(&utterance, &SessionContext::new())
        .await;

    let output = serde_json::to_string_pretty(&turn).context("Failed to serialize turn")?;
    println!("{output}");
    Ok(())
}
