//! The conversational record (§3): legacy and enhanced message forms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message role. At most one system message may occupy a session's
/// context, and when present it sits at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The system prompt.
    System,
    /// The human operator.
    User,
    /// The model.
    Assistant,
}

/// The transport/persistence projection of a message: a role and a flat
/// string. Legacy messages are what cross the LLM transport boundary and
/// what gets written to `<id>-history.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyMessage {
    /// Who said it.
    pub role: Role,
    /// The flattened text content.
    pub content: String,
}

impl LegacyMessage {
    /// Build a legacy message directly.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Discriminator for a message part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartKind {
    /// Plain prose.
    Text,
    /// Model "thinking" content, shown in the UI but rarely sent back.
    Reasoning,
    /// A tool invocation emitted by the model.
    ToolCall,
    /// The outcome of executing a tool call.
    ToolResult,
    /// An attached file's content.
    File,
    /// A system-level note (e.g. a correction prompt).
    System,
}

/// Tag-specific metadata carried by a part. Only the fields relevant to
/// the part's kind are populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartMeta {
    /// For `tool-call` parts: the tool name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// For `tool-call` parts: the raw argument bag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_arguments: Option<Value>,
    /// For `tool-result` parts: the call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// For `tool-result` parts: whether the tool reported success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// For `tool-result` parts: wall-clock duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// For `tool-result` parts: whether the output was truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

/// One atomic unit of an enhanced message. Parts carry a stable identifier
/// so a `tool-result` part can reference the `tool-call` part that
/// produced it within the same session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Stable identifier, unique within the owning message.
    pub id: String,
    /// What this part represents.
    pub kind: PartKind,
    /// The textual content (the tool-call's rendered form, the tool
    /// result's preview text, the reasoning transcript, etc).
    pub content: String,
    /// Excluded from LLM context when true, kept for UI display.
    #[serde(default)]
    pub ignored: bool,
    /// Kind-specific metadata.
    #[serde(default)]
    pub meta: PartMeta,
}

impl Part {
    /// Build a plain text part.
    #[must_use]
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PartKind::Text,
            content: content.into(),
            ignored: false,
            meta: PartMeta::default(),
        }
    }

    /// Build a system-tagged part (excluded from legacy flattening).
    #[must_use]
    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PartKind::System,
            content: content.into(),
            ignored: false,
            meta: PartMeta::default(),
        }
    }
}

/// A message with its parts. The canonical, in-memory form; flattens to
/// [`LegacyMessage`] at adapter boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedMessage {
    /// Who said it.
    pub role: Role,
    /// Ordered parts making up the message.
    pub parts: Vec<Part>,
}

impl EnhancedMessage {
    /// Build a single-part text message.
    #[must_use]
    pub fn text(role: Role, id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(id, content)],
        }
    }

    /// Flatten to a legacy message by joining the content of every
    /// non-ignored, non-system-tagged part with newlines. Returns `None`
    /// when the flattened content would be empty.
    #[must_use]
    pub fn flatten(&self) -> Option<LegacyMessage> {
        let joined = self
            .parts
            .iter()
            .filter(|p| !p.ignored && p.kind != PartKind::System)
            .map(|p| p.content.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if joined.is_empty() {
            return None;
        }
        Some(LegacyMessage {
            role: self.role,
            content: joined,
        })
    }

    /// Replace this message's parts with a single summary text part,
    /// prefixed per the compactor's convention. Used by rule-based
    /// summarization; never reorders the message within the buffer.
    pub fn replace_with_summary(&mut self, id: impl Into<String>, summary: impl Into<String>) {
        self.parts = vec![Part::text(id, format!("[摘要] {}", summary.into()))];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_joins_non_ignored_non_system_parts() {
        let msg = EnhancedMessage {
            role: Role::Assistant,
            parts: vec![
                Part::text("1", "hello"),
                Part::system("2", "internal note"),
                Part {
                    id: "3".into(),
                    kind: PartKind::Text,
                    content: "ignored".into(),
                    ignored: true,
                    meta: PartMeta::default(),
                },
                Part::text("4", "world"),
            ],
        };
        let flat = msg.flatten().unwrap();
        assert_eq!(flat.content, "hello\nworld");
        assert!(matches!(flat.role, Role::Assistant));
    }

    #[test]
    fn flatten_empty_when_all_filtered() {
        let msg = EnhancedMessage {
            role: Role::User,
            parts: vec![Part::system("1", "note")],
        };
        assert!(msg.flatten().is_none());
    }

    #[test]
    fn replace_with_summary_single_part() {
        let mut msg = EnhancedMessage::text(Role::Assistant, "1", "a long message");
        msg.replace_with_summary("s1", "short version");
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.parts[0].content, "[摘要] short version");
    }
}
