//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按脚本依次返回预设回复（最后一条重复使用）；未设置脚本时返回空 JSON 对象。
//! 记录调用次数，便于验证缓存命中；token 用量按空白分词近似统计。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, TokenUsage};

/// Mock 客户端：脚本化回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    usage: TokenUsage,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 始终返回同一条回复
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::scripted(vec![Ok(reply.into())])
    }

    /// 始终返回传输错误
    pub fn failing(error: impl Into<String>) -> Self {
        Self::scripted(vec![Err(error.into())])
    }

    pub fn scripted(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            usage: TokenUsage::new(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| "mock script poisoned".to_string())?;
            match script.len() {
                0 => Ok("{}".to_string()),
                1 => script.front().cloned().unwrap_or_else(|| Ok("{}".to_string())),
                _ => script.pop_front().unwrap_or_else(|| Ok("{}".to_string())),
            }
        }?;
        let prompt: usize = messages.iter().map(|m| m.content.split_whitespace().count()).sum();
        self.usage
            .add(prompt as u64, reply.split_whitespace().count() as u64);
        Ok(reply)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
