//! 会话上下文
//!
//! 调用方持有的 JSON 映射，含各 Agent 的子段（current_email_context 等）。
//! 编排层按写时复制使用：所有「更新」都返回新的 SessionContext，不修改调用方的副本。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::AgentType;

pub const EMAIL_CONTEXT: &str = "current_email_context";
pub const CALENDAR_CONTEXT: &str = "current_calendar_context";
pub const CONTENT_CONTEXT: &str = "current_content_context";
pub const AGENT_COORDINATION: &str = "agent_coordination";

/// Agent 对应的上下文子段名
pub fn section_for(agent: AgentType) -> &'static str {
    match agent {
        AgentType::Email => EMAIL_CONTEXT,
        AgentType::Calendar => CALENDAR_CONTEXT,
        AgentType::Content => CONTENT_CONTEXT,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionContext {
    inner: Map<String, Value>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从任意 JSON 构建；非对象时得到空上下文
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self { inner },
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.inner.get(name).and_then(Value::as_object)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.inner
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.inner)
    }

    /// 返回设置了顶层键的新上下文
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.inner.insert(key.into(), value);
        next
    }

    /// 返回合并了子段条目的新上下文；子段不存在或不是对象时新建
    pub fn with_section_entries<I>(&self, name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut next = self.clone();
        let slot = next
            .inner
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(section) = slot {
            section.extend(entries);
        }
        next
    }

    /// 子段的紧凑 JSON 文本，空或缺失时返回 None（用于拼接进 Agent 指令）
    pub fn section_snapshot(&self, name: &str) -> Option<String> {
        self.section(name)
            .filter(|s| !s.is_empty())
            .map(|s| Value::Object(s.clone()).to_string())
    }
}

impl From<Map<String, Value>> for SessionContext {
    fn from(inner: Map<String, Value>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_updates_do_not_touch_original() {
        let original = SessionContext::from_value(json!({
            "current_email_context": {"last_query": "from:alice"}
        }));
        let updated = original.with_section_entries(
            EMAIL_CONTEXT,
            vec![("fetch_successful".to_string(), json!(true))],
        );

        assert_eq!(original.section(EMAIL_CONTEXT).unwrap().len(), 1);
        let section = updated.section(EMAIL_CONTEXT).unwrap();
        assert_eq!(section["last_query"], "from:alice");
        assert_eq!(section["fetch_successful"], true);
    }

    #[test]
    fn test_non_object_section_is_replaced() {
        let ctx = SessionContext::new().with(CALENDAR_CONTEXT, json!("garbage"));
        let updated = ctx.with_section_entries(CALENDAR_CONTEXT, vec![("k".to_string(), json!(1))]);
        assert_eq!(updated.section(CALENDAR_CONTEXT).unwrap()["k"], 1);
    }

    #[test]
    fn test_snapshot_skips_empty_sections() {
        let ctx = SessionContext::new().with(EMAIL_CONTEXT, json!({}));
        assert!(ctx.section_snapshot(EMAIL_CONTEXT).is_none());
        assert!(ctx.section_snapshot(CALENDAR_CONTEXT).is_none());
        let ctx = ctx.with(EMAIL_CONTEXT, json!({"unread": 3}));
        assert_eq!(ctx.section_snapshot(EMAIL_CONTEXT).unwrap(), r#"{"unread":3}"#);
    }

    #[test]
    fn test_non_object_value_yields_empty_context() {
        assert!(SessionContext::from_value(json!([1, 2])).is_empty());
    }
}
