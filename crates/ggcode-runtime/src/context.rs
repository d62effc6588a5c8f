//! Context manager (§4.F): the append-only message buffer, its
//! token-budgeted view, and history persistence.

use std::path::Path;

use ggcode_core::{estimate_tokens, EnhancedMessage, LegacyMessage, PartKind, Role};

use crate::error::{RuntimeError, RuntimeResult};

/// Owns the ordered, append-only buffer of [`EnhancedMessage`]s for one
/// session and exposes a token-budgeted [`Self::context_view`] for
/// transport, per spec.md §4.F.
#[derive(Debug, Default)]
pub struct ContextManager {
    messages: Vec<EnhancedMessage>,
}

impl ContextManager {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages currently held, in append order. Exposed for the
    /// compactor, which mutates in place via [`Self::messages_mut`].
    #[must_use]
    pub fn messages(&self) -> &[EnhancedMessage] {
        &self.messages
    }

    /// Mutable access for the compactor's removal/summarization passes.
    pub fn messages_mut(&mut self) -> &mut Vec<EnhancedMessage> {
        &mut self.messages
    }

    /// Append a message to the buffer. Messages are append-only within a
    /// turn; only compaction may replace a message's parts in place.
    pub fn append(&mut self, message: EnhancedMessage) {
        self.messages.push(message);
    }

    /// Replace any prior system message and place the new one at index 0
    /// (spec.md §4.F, §3 invariant: at most one system message, always at
    /// the head of the context view).
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.messages.retain(|m| m.role != Role::System);
        let system = EnhancedMessage::text(Role::System, "system-prompt", text.into());
        self.messages.insert(0, system);
    }

    /// Discard all messages, including any system message.
    pub fn clear_context(&mut self) {
        self.messages.clear();
    }

    /// Sum of [`estimate_tokens`] over every non-system message's
    /// flattened content.
    #[must_use]
    pub fn total_tokens(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .filter_map(EnhancedMessage::flatten)
            .map(|m| estimate_tokens(&m.content))
            .sum()
    }

    /// Build the token-budgeted context view (spec.md §4.F):
    /// 1. gather all system messages, in order, unconditionally included;
    /// 2. walk non-system messages newest→oldest, admitting while
    ///    cumulative cost ≤ `budget`;
    /// 3. reverse the admitted tail so chronological order is preserved;
    /// 4. flatten to legacy form;
    /// 5. drop messages whose flattened content is empty.
    #[must_use]
    pub fn context_view(&self, budget: usize) -> Vec<LegacyMessage> {
        let mut system: Vec<LegacyMessage> = Vec::new();
        let mut non_system: Vec<&EnhancedMessage> = Vec::new();
        for m in &self.messages {
            if m.role == Role::System {
                if let Some(flat) = m.flatten() {
                    system.push(flat);
                }
            } else {
                non_system.push(m);
            }
        }

        let mut admitted_rev: Vec<&EnhancedMessage> = Vec::new();
        let mut used = 0usize;
        for m in non_system.iter().rev() {
            let Some(flat) = m.flatten() else { continue };
            let cost = estimate_tokens(&flat.content);
            if used.saturating_add(cost) > budget {
                break;
            }
            used += cost;
            admitted_rev.push(m);
        }
        admitted_rev.reverse();

        let mut view = system;
        view.extend(admitted_rev.into_iter().filter_map(EnhancedMessage::flatten));
        view
    }

    /// Replace the buffer with `history`. If the loaded buffer has no
    /// system message but the current in-memory buffer did, the old
    /// system message(s) are prepended (spec.md §4.F).
    pub fn load_history(&mut self, history: Vec<EnhancedMessage>) {
        let had_system = !history.iter().any(|m| m.role == Role::System);
        let prior_system: Vec<EnhancedMessage> = if had_system {
            self.messages.iter().filter(|m| m.role == Role::System).cloned().collect()
        } else {
            Vec::new()
        };
        self.messages = prior_system.into_iter().chain(history).collect();
    }

    /// Load history from a JSON file of legacy messages, converting each
    /// to a single-part enhanced message. Overwrites the in-memory buffer
    /// per [`Self::load_history`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or doesn't parse.
    pub fn load_history_file(&mut self, path: &Path) -> RuntimeResult<()> {
        let data = std::fs::read_to_string(path)?;
        let legacy: Vec<LegacyMessage> = serde_json::from_str(&data).map_err(|source| {
            RuntimeError::SessionCorrupt { path: path.display().to_string(), source }
        })?;
        let history = legacy
            .into_iter()
            .enumerate()
            .map(|(i, m)| EnhancedMessage::text(m.role, format!("loaded-{i}"), m.content))
            .collect();
        self.load_history(history);
        Ok(())
    }

    /// Persist the buffer as an ordered legacy-message array, per spec.md
    /// §6's `<id>-history.json` layout. Writes via temp-then-rename for
    /// durability (spec.md §9).
    ///
    /// # Errors
    ///
    /// Returns an error if the write or rename fails.
    pub fn save_history_file(&self, path: &Path) -> RuntimeResult<()> {
        let legacy: Vec<LegacyMessage> = self.messages.iter().filter_map(EnhancedMessage::flatten).collect();
        let json = serde_json::to_string_pretty(&legacy).map_err(|e| {
            RuntimeError::SessionPersist {
                session_id: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| RuntimeError::SessionPersist {
            session_id: path.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| RuntimeError::SessionPersist {
            session_id: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Whether any message carries a part of the given kind — used by the
    /// orchestrator to decide whether the last assistant message contains
    /// tool calls.
    #[must_use]
    pub fn last_message_has_kind(&self, kind: PartKind) -> bool {
        self.messages.last().is_some_and(|m| m.parts.iter().any(|p| p.kind == kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggcode_core::Part;

    #[test]
    fn system_prompt_replaces_and_stays_at_head() {
        let mut ctx = ContextManager::new();
        ctx.append(EnhancedMessage::text(Role::User, "1", "hi"));
        ctx.set_system_prompt("be helpful");
        assert_eq!(ctx.messages()[0].role, Role::System);
        ctx.set_system_prompt("be terse");
        assert_eq!(ctx.messages().iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(ctx.messages()[0].flatten().unwrap().content, "be terse");
    }

    #[test]
    fn context_view_keeps_system_unconditionally() {
        let mut ctx = ContextManager::new();
        ctx.set_system_prompt("sys");
        for i in 0..5 {
            ctx.append(EnhancedMessage::text(Role::User, format!("u{i}"), "x".repeat(1000)));
        }
        let view = ctx.context_view(1);
        assert_eq!(view[0].role, Role::System);
    }

    #[test]
    fn context_view_respects_budget_and_preserves_order() {
        let mut ctx = ContextManager::new();
        ctx.append(EnhancedMessage::text(Role::User, "1", "aaaa"));
        ctx.append(EnhancedMessage::text(Role::Assistant, "2", "bbbb"));
        ctx.append(EnhancedMessage::text(Role::User, "3", "cccc"));
        // Each message costs 1 token; budget 2 admits the newest two.
        let view = ctx.context_view(2);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].content, "bbbb");
        assert_eq!(view[1].content, "cccc");
    }

    #[test]
    fn context_view_drops_empty_flattened_messages() {
        let mut ctx = ContextManager::new();
        ctx.append(EnhancedMessage { role: Role::User, parts: vec![Part::system("1", "hidden")] });
        ctx.append(EnhancedMessage::text(Role::User, "2", "visible"));
        let view = ctx.context_view(1000);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].content, "visible");
    }

    #[test]
    fn load_history_prepends_prior_system_when_loaded_lacks_one() {
        let mut ctx = ContextManager::new();
        ctx.set_system_prompt("sys");
        ctx.load_history(vec![EnhancedMessage::text(Role::User, "1", "hi")]);
        assert_eq!(ctx.messages()[0].role, Role::System);
        assert_eq!(ctx.messages().len(), 2);
    }

    #[test]
    fn clear_context_discards_system_too() {
        let mut ctx = ContextManager::new();
        ctx.set_system_prompt("sys");
        ctx.append(EnhancedMessage::text(Role::User, "1", "hi"));
        ctx.clear_context();
        assert!(ctx.messages().is_empty());
    }
}
