//! 能力目录
//!
//! 每种 Agent 的主要功能与触发关键词，供规则分析器做关键词打分、供 LLM 分析器拼 prompt。
//! 目录在启动时构建一次，以引用方式注入分析器，不使用全局可变状态。

use serde::{Deserialize, Serialize};

use super::types::AgentType;

/// 单个 Agent 的能力描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub agent: AgentType,
    pub description: String,
    pub primary_functions: Vec<String>,
    pub keywords: Vec<String>,
}

/// 能力目录（按 Agent 顺序迭代，关键词匹配结果也按目录顺序记录）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    entries: Vec<AgentCapability>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        Self::new(vec![
            AgentCapability {
                agent: AgentType::Email,
                description: "Reads, searches, sends and replies to Gmail messages".to_string(),
                primary_functions: strings(&[
                    "fetch_emails",
                    "search_emails",
                    "send_email",
                    "reply_email",
                    "send_notification",
                ]),
                keywords: strings(&[
                    "email", "emails", "mail", "gmail", "inbox", "message", "messages", "send",
                    "reply", "forward", "unread", "attachment", "sender",
                ]),
            },
            AgentCapability {
                agent: AgentType::Content,
                description: "Summarizes, analyzes and drafts text content".to_string(),
                primary_functions: strings(&[
                    "summarize_content",
                    "analyze_content",
                    "generate_content",
                    "generate_reply",
                ]),
                keywords: strings(&[
                    "summarize", "summarise", "summary", "analyze", "analyse", "analysis",
                    "draft", "write", "compose", "generate", "rewrite", "translate", "content",
                    "tone",
                ]),
            },
            AgentCapability {
                agent: AgentType::Calendar,
                description: "Checks availability and manages Google Calendar events".to_string(),
                primary_functions: strings(&[
                    "get_events",
                    "check_availability",
                    "find_free_slots",
                    "create_event",
                    "send_invites",
                ]),
                keywords: strings(&[
                    "calendar", "schedule", "meeting", "meetings", "event", "events",
                    "appointment", "availability", "available", "free", "busy", "invite",
                    "invites", "tomorrow", "today", "reschedule",
                ]),
            },
        ])
    }
}

impl CapabilityCatalog {
    pub fn new(entries: Vec<AgentCapability>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AgentCapability] {
        &self.entries
    }

    pub fn get(&self, agent: AgentType) -> Option<&AgentCapability> {
        self.entries.iter().find(|e| e.agent == agent)
    }

    /// 对已规范化的文本（见 normalize_words）按词匹配关键词，返回 (Agent, 命中关键词) 列表，顺序同目录
    pub fn match_keywords(&self, normalized: &str) -> Vec<(AgentType, Vec<String>)> {
        self.entries
            .iter()
            .map(|entry| {
                let hits = entry
                    .keywords
                    .iter()
                    .filter(|k| contains_phrase(normalized, k))
                    .cloned()
                    .collect();
                (entry.agent, hits)
            })
            .collect()
    }

    /// 按关键词命中数降序推荐 Agent（命中数相同时保持目录顺序）
    pub fn suggest_agents(&self, text: &str) -> Vec<(AgentType, usize)> {
        let normalized = normalize_words(text);
        let mut ranked: Vec<(AgentType, usize)> = self
            .match_keywords(&normalized)
            .into_iter()
            .map(|(agent, hits)| (agent, hits.len()))
            .filter(|(_, n)| *n > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// 生成 prompt 中的 Agent 能力段落
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "- {} ({}): {}. Functions: {}. Keywords: {}",
                    e.agent.agent_id(),
                    e.agent,
                    e.description,
                    e.primary_functions.join(", "),
                    e.keywords.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 小写化并按非字母数字切词，首尾补空格，便于整词 / 短语匹配
pub fn normalize_words(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    format!(" {} ", words.join(" "))
}

/// 整词（或整短语）是否出现在规范化文本中
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase.trim()))
}

/// 整词（或整短语）在规范化文本中出现的次数
pub fn count_phrase(normalized: &str, phrase: &str) -> usize {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return 0;
    }
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let target: Vec<&str> = phrase.split_whitespace().collect();
    if target.len() > words.len() {
        return 0;
    }
    words
        .windows(target.len())
        .filter(|window| *window == target.as_slice())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_match_whole_words_only() {
        let catalog = CapabilityCatalog::default();
        let normalized = normalize_words("Check my emails");
        let matches = catalog.match_keywords(&normalized);
        let email_hits = &matches.iter().find(|(a, _)| *a == AgentType::Email).unwrap().1;
        assert_eq!(email_hits, &vec!["emails".to_string()]);
        assert!(matches
            .iter()
            .filter(|(a, _)| *a != AgentType::Email)
            .all(|(_, hits)| hits.is_empty()));
    }

    #[test]
    fn test_count_phrase() {
        let normalized = normalize_words("Read this, and then reply and archive. Then stop");
        assert_eq!(count_phrase(&normalized, "and"), 2);
        assert_eq!(count_phrase(&normalized, "then"), 2);
        assert_eq!(count_phrase(&normalized, "and then"), 1);
        assert_eq!(count_phrase(&normalized, "after that"), 0);
    }

    #[test]
    fn test_suggest_agents_ranks_by_hits() {
        let catalog = CapabilityCatalog::default();
        let ranked = catalog.suggest_agents("schedule a meeting tomorrow and email the team");
        assert_eq!(ranked[0].0, AgentType::Calendar);
        assert!(ranked.iter().any(|(a, _)| *a == AgentType::Email));
    }

    #[test]
    fn test_describe_lists_every_agent() {
        let text = CapabilityCatalog::default().describe();
        assert!(text.contains("email_agent"));
        assert!(text.contains("content_agent"));
        assert!(text.contains("calendar_agent"));
    }
}
