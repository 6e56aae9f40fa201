use std::collections::{ HashMap, HashSet };

use crate::models::chat::{ ConversationSummary, Message, Role };

const SUMMARY_TITLE_LEN: usize = 60;

/// A conversation keyed by its context key, messages in timestamp order.
#[derive(Clone, Debug)]
pub struct ConversationGroup {
    pub key: String,
    pub messages: Vec<Message>,
}

impl ConversationGroup {
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }
}

/// Groups messages by context key, keeping first-seen key order.
/// Messages without a context are dropped.
pub fn group_by_context(messages: &[Message]) -> Vec<ConversationGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ConversationGroup> = Vec::new();

    for msg in messages {
        let Some(key) = msg.context_key() else {
            continue;
        };
        match index.get(&key) {
            Some(&i) => groups[i].messages.push(msg.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ConversationGroup { key, messages: vec![msg.clone()] });
            }
        }
    }

    for group in &mut groups {
        group.messages.sort_by_key(|m| m.timestamp);
    }
    groups
}

/// Drops repeated ids and collapses back-to-back messages with the same role and text.
pub fn dedupe(messages: &[Message]) -> Vec<Message> {
    let mut seen_ids = HashSet::new();
    let mut result: Vec<Message> = Vec::with_capacity(messages.len());

    for msg in messages {
        if !seen_ids.insert(msg.id.as_str()) {
            continue;
        }
        if let Some(prev) = result.last() {
            if
                prev.role == msg.role &&
                prev.context_key() == msg.context_key() &&
                prev.content.trim() == msg.content.trim()
            {
                continue;
            }
        }
        result.push(msg.clone());
    }
    result
}

pub fn summarize(messages: &[Message]) -> Vec<ConversationSummary> {
    let mut summaries: Vec<ConversationSummary> = group_by_context(&dedupe(messages))
        .into_iter()
        .filter_map(|group| {
            let last = group.messages.last()?;
            let context = last.context.clone()?;
            let first_message = group
                .first_user_message()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let title = context.title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| truncate(&first_message, SUMMARY_TITLE_LEN));
            Some(ConversationSummary {
                key: group.key.clone(),
                context,
                title,
                first_message,
                last_message_at: last.timestamp,
                message_count: group.messages.len(),
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    summaries
}

/// Messages of one conversation, deduplicated and in timestamp order.
pub fn conversation(messages: &[Message], key: &str) -> Vec<Message> {
    let mut convo: Vec<Message> = dedupe(messages)
        .into_iter()
        .filter(|m| m.context_key().as_deref() == Some(key))
        .collect();
    convo.sort_by_key(|m| m.timestamp);
    convo
}

pub fn format_history_for_prompt(messages: &[Message], limit: usize) -> String {
    if messages.is_empty() || limit == 0 {
        return String::new();
    }
    let start = messages.len().saturating_sub(limit);
    let mut result = String::from("Previous conversation:\n");
    for msg in &messages[start..] {
        result.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }

    result
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatContext, ContextKind };
    use chrono::{ Duration, Utc };

    fn course_ctx(id: &str) -> ChatContext {
        ChatContext {
            kind: ContextKind::Course,
            id: Some(id.to_string()),
            course_id: None,
            title: None,
        }
    }

    fn msg(role: Role, content: &str, ctx: Option<ChatContext>, offset_secs: i64) -> Message {
        let mut m = Message::new(role, content, ctx);
        m.timestamp = Utc::now() + Duration::seconds(offset_secs);
        m
    }

    #[test]
    fn test_group_drops_messages_without_context() {
        let messages = vec![
            msg(Role::User, "loose", None, 0),
            msg(Role::User, "about 101", Some(course_ctx("101")), 1),
            msg(Role::User, "about 202", Some(course_ctx("202")), 2),
            msg(Role::Assistant, "reply 101", Some(course_ctx("101")), 3)
        ];
        let groups = group_by_context(&messages);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "course-101");
        assert_eq!(groups[0].messages.len(), 2);
        assert_eq!(groups[1].key, "course-202");
    }

    #[test]
    fn test_dedupe_collapses_repeats() {
        let first = msg(Role::User, "same question", Some(course_ctx("101")), 0);
        let repeat_id = first.clone();
        let repeat_text = msg(Role::User, "same question ", Some(course_ctx("101")), 1);
        let answer = msg(Role::Assistant, "answer", Some(course_ctx("101")), 2);
        let deduped = dedupe(&[first, repeat_id, repeat_text, answer]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[1].role, Role::Assistant);
    }

    #[test]
    fn test_summaries_most_recent_first_with_fallback_title() {
        let messages = vec![
            msg(Role::User, "Old question about loops", Some(course_ctx("101")), 0),
            msg(Role::User, "Newer question", Some(ChatContext::dashboard()), 10)
        ];
        let summaries = summarize(&messages);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "dashboard-dashboard");
        assert_eq!(summaries[0].title, "Dashboard");
        assert_eq!(summaries[1].title, "Old question about loops");
        assert_eq!(summaries[1].message_count, 1);
    }

    #[test]
    fn test_format_history_keeps_last_messages() {
        let messages = vec![
            msg(Role::User, "one", None, 0),
            msg(Role::Assistant, "two", None, 1),
            msg(Role::User, "three", None, 2)
        ];
        let formatted = format_history_for_prompt(&messages, 2);
        assert!(formatted.starts_with("Previous conversation:\n"));
        assert!(!formatted.contains("one"));
        assert!(formatted.contains("Assistant: two\nUser: three\n"));
    }
}
