//! Context compactor (§4.G): rule-based pruning, Jaccard-similarity
//! deduplication, and extractive summarization. The LLM-assisted mode
//! lives alongside the rule-based one but is invoked by the orchestrator
//! through [`crate::subagent::run_subagent`] with [`crate::subagent::SubagentKind::Compaction`]
//! rather than from this module, since it needs an [`ggcode_llm::LlmProvider`].

use std::collections::{HashMap, HashSet};

use ggcode_core::{estimate_tokens, CompactionConfig, EnhancedMessage, Part, PartKind, Role};

/// Outcome of a compaction pass (spec.md §4.G).
#[derive(Debug, Clone, Default)]
pub struct CompactionReport {
    /// Whether anything changed.
    pub compressed: bool,
    /// Token cost of the buffer before compaction.
    pub original_tokens: usize,
    /// Token cost of the buffer after compaction.
    pub compressed_tokens: usize,
    /// `original_tokens - compressed_tokens`.
    pub saved_tokens: usize,
    /// Messages removed outright.
    pub removed_count: usize,
    /// Messages collapsed into a summary.
    pub summarized_count: usize,
    /// Messages removed as near-duplicates.
    pub deduplicated_count: usize,
}

/// Run the rule-based compactor over `messages` in place (spec.md §4.G):
/// score → mark-for-removal → deduplicate → summarize → apply removals
/// in descending index order.
///
/// Open question resolved (spec.md §9, decided in DESIGN.md): a
/// tool-call part and the tool-result part answering it (matched by
/// `meta.call_id`) are treated as an atomic pair — if either message is
/// marked for removal, both are removed, so no tool-result ever survives
/// without its call.
pub fn compact_rule_based(messages: &mut Vec<EnhancedMessage>, config: &CompactionConfig) -> CompactionReport {
    let original_tokens = total_tokens(messages);

    let non_system_indices: Vec<usize> =
        messages.iter().enumerate().filter(|(_, m)| m.role != Role::System).map(|(i, _)| i).collect();
    let total = non_system_indices.len();

    let pairs = call_result_pairs(messages);

    let mut to_remove: HashSet<usize> = HashSet::new();
    for (pos, &idx) in non_system_indices.iter().enumerate() {
        let score = importance_score(&messages[idx], pos, total);
        if score < config.min_importance_score {
            to_remove.insert(idx);
        }
    }

    let mut deduplicated_count = 0usize;
    if config.enable_deduplication {
        deduplicated_count = mark_duplicates(messages, &non_system_indices, config.similarity_threshold, &mut to_remove);
    }

    // Atomic call/result pairs: if either side is marked, mark both.
    for pair in &pairs {
        if pair.iter().any(|i| to_remove.contains(i)) {
            for i in pair {
                to_remove.insert(*i);
            }
        }
    }

    let removed_count = to_remove.len();

    let mut summarized_count = 0usize;
    if config.enable_summarization {
        for (pos, &idx) in non_system_indices.iter().enumerate() {
            if to_remove.contains(&idx) {
                continue;
            }
            let age = total.saturating_sub(pos + 1);
            if age <= config.summarize_older_than {
                continue;
            }
            let Some(flat) = messages[idx].flatten() else { continue };
            if estimate_tokens(&flat.content) <= config.summary_max_tokens / 2 {
                continue;
            }
            let summary = summarize_content(&flat.content, config.summary_max_tokens);
            messages[idx].replace_with_summary(format!("summary-{idx}"), summary);
            summarized_count += 1;
        }
    }

    let mut remove_sorted: Vec<usize> = to_remove.into_iter().collect();
    remove_sorted.sort_unstable_by(|a, b| b.cmp(a));
    for idx in remove_sorted {
        messages.remove(idx);
    }

    let compressed_tokens = total_tokens(messages);
    let saved_tokens = original_tokens.saturating_sub(compressed_tokens);
    CompactionReport {
        compressed: removed_count > 0 || summarized_count > 0,
        original_tokens,
        compressed_tokens,
        saved_tokens,
        removed_count,
        summarized_count,
        deduplicated_count,
    }
}

fn total_tokens(messages: &[EnhancedMessage]) -> usize {
    messages.iter().filter_map(EnhancedMessage::flatten).map(|m| estimate_tokens(&m.content)).sum()
}

/// Group message indices that together form a tool-call/tool-result
/// pair, matched by `meta.call_id` against the call part's own `id`.
fn call_result_pairs(messages: &[EnhancedMessage]) -> Vec<Vec<usize>> {
    let mut call_index: HashMap<String, usize> = HashMap::new();
    for (i, m) in messages.iter().enumerate() {
        for p in &m.parts {
            if p.kind == PartKind::ToolCall {
                call_index.insert(p.id.clone(), i);
            }
        }
    }
    let mut pairs = Vec::new();
    for (i, m) in messages.iter().enumerate() {
        for p in &m.parts {
            if p.kind == PartKind::ToolResult {
                if let Some(call_id) = &p.meta.call_id {
                    if let Some(&call_idx) = call_index.get(call_id) {
                        if call_idx != i {
                            pairs.push(vec![call_idx, i]);
                        }
                    }
                }
            }
        }
    }
    pairs
}

/// Score a non-system message's importance in `[0, 1]` (spec.md §4.G
/// step 1). `pos` is the message's position among non-system messages
/// (0 = oldest); `total` is the count of non-system messages.
fn importance_score(message: &EnhancedMessage, pos: usize, total: usize) -> f64 {
    let mut score = 0.0f64;
    if total > 0 {
        let fraction_from_end = (total - pos) as f64 / total as f64;
        if fraction_from_end <= 0.30 {
            score += 0.25;
        } else if fraction_from_end <= 0.60 {
            score += 0.10;
        }
    }

    let has_tool_result = message.parts.iter().any(|p| p.kind == PartKind::ToolResult);
    if has_tool_result {
        let is_error = message.parts.iter().any(|p| p.kind == PartKind::ToolResult && p.meta.success == Some(false));
        score += if is_error { 0.20 } else { 0.15 };
    }

    if has_file_modifying_part(message) {
        score += 0.25;
    }

    if message.parts.iter().any(|p| p.kind == PartKind::Reasoning) {
        score += 0.10;
    }

    if message.role == Role::User && is_new_task_opener(message) {
        score += 0.20;
    }

    score.min(1.0)
}

const FILE_MODIFYING_TOOLS: &[&str] = &["write_file", "edit_file", "mkdir"];

fn has_file_modifying_part(message: &EnhancedMessage) -> bool {
    message.parts.iter().any(|p| {
        (p.kind == PartKind::ToolCall || p.kind == PartKind::ToolResult)
            && p.meta.tool_name.as_deref().is_some_and(|name| FILE_MODIFYING_TOOLS.contains(&name))
    })
}

const NEW_TASK_MARKERS: &[&str] = &["new task", "let's start", "next task", "another task", "start over"];

fn is_new_task_opener(message: &EnhancedMessage) -> bool {
    let Some(flat) = message.flatten() else { return false };
    let lower = flat.content.to_lowercase();
    NEW_TASK_MARKERS.iter().any(|marker| lower.starts_with(marker) || lower.contains(marker))
}

/// Mark near-duplicate messages for removal (spec.md §4.G step 3): for
/// each pair `(i, j)` with `i > j`, average raw and lowercase Jaccard
/// similarity on word-tokenized key content; if above `threshold` and
/// the older message (`j`) is at least as important, mark the newer
/// duplicate (`i`) for removal.
fn mark_duplicates(
    messages: &[EnhancedMessage],
    non_system_indices: &[usize],
    threshold: f64,
    to_remove: &mut HashSet<usize>,
) -> usize {
    let total = non_system_indices.len();
    let keys: Vec<(usize, String)> = non_system_indices
        .iter()
        .map(|&idx| (idx, key_content(&messages[idx])))
        .collect();

    let mut count = 0usize;
    for a in 0..keys.len() {
        let (idx_i, ref key_i) = keys[a];
        if to_remove.contains(&idx_i) {
            continue;
        }
        for b in 0..a {
            let (idx_j, ref key_j) = keys[b];
            if to_remove.contains(&idx_j) {
                continue;
            }
            let sim = average_jaccard(key_i, key_j);
            if sim <= threshold {
                continue;
            }
            let pos_i = non_system_indices.iter().position(|&x| x == idx_i).unwrap_or(0);
            let pos_j = non_system_indices.iter().position(|&x| x == idx_j).unwrap_or(0);
            let score_i = importance_score(&messages[idx_i], pos_i, total);
            let score_j = importance_score(&messages[idx_j], pos_j, total);
            if score_j >= score_i {
                to_remove.insert(idx_i);
                count += 1;
                break;
            }
        }
    }
    count
}

/// Build the comparison key for a message: `tool:NAME args` for a
/// tool-call, `result:NAME preview` for a tool-result, else the raw
/// flattened content.
fn key_content(message: &EnhancedMessage) -> String {
    if let Some(call) = message.parts.iter().find(|p| p.kind == PartKind::ToolCall) {
        let name = call.meta.tool_name.clone().unwrap_or_default();
        return format!("tool:{name} {}", call.content);
    }
    if let Some(result) = message.parts.iter().find(|p| p.kind == PartKind::ToolResult) {
        let name = result.meta.tool_name.clone().unwrap_or_default();
        let preview: String = result.content.chars().take(200).collect();
        return format!("result:{name} {preview}");
    }
    message.flatten().map(|m| m.content).unwrap_or_default()
}

fn average_jaccard(a: &str, b: &str) -> f64 {
    let raw = jaccard(a, b);
    let lower = jaccard(&a.to_lowercase(), &b.to_lowercase());
    (raw + lower) / 2.0
}

fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Extractive summary (spec.md §4.G step 4): lines matching "important"
/// patterns, else the first three sentences, capped to `max_tokens`.
fn summarize_content(content: &str, max_tokens: usize) -> String {
    let important: Vec<&str> = content.lines().filter(|line| is_important_line(line)).collect();
    let base = if important.is_empty() {
        first_three_sentences(content)
    } else {
        important.join("\n")
    };
    cap_to_tokens(&base, max_tokens)
}

fn is_important_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    let starts_numbered = trimmed.chars().next().is_some_and(char::is_numeric) && trimmed.contains('.');
    let starts_bullet = trimmed.starts_with('-') || trimmed.starts_with('*');
    let is_symbol_decl = ["fn ", "struct ", "enum ", "class ", "impl ", "pub fn ", "def ", "function "]
        .iter()
        .any(|kw| trimmed.starts_with(kw) || trimmed.contains(kw));
    let lower = trimmed.to_lowercase();
    let mentions_error = lower.contains("error") || lower.contains("warning") || lower.contains("fail");
    let is_test = lower.contains("test_") || lower.contains("#[test]") || lower.starts_with("test ");
    starts_numbered || starts_bullet || is_symbol_decl || mentions_error || is_test
}

fn first_three_sentences(content: &str) -> String {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(current.trim().to_string());
            current.clear();
            if sentences.len() == 3 {
                break;
            }
        }
    }
    if sentences.is_empty() && !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.join(" ")
}

fn cap_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = max_tokens.saturating_mul(4);
    ggcode_tools::truncate_at_char_boundary(text, max_chars)
}

/// Build a single text part to hold the filtered-conversation digest fed
/// to the LLM-assisted compaction subagent (user+assistant only, per
/// spec.md §4.K).
#[must_use]
pub fn filter_for_llm_compaction(messages: &[EnhancedMessage]) -> Vec<EnhancedMessage> {
    messages.iter().filter(|m| m.role == Role::User || m.role == Role::Assistant).cloned().collect()
}

/// Replace the buffer's non-system tail with a single assistant message
/// carrying `summary` (spec.md §4.G LLM-assisted mode).
pub fn apply_llm_summary(messages: &mut Vec<EnhancedMessage>, summary: String) {
    messages.retain(|m| m.role == Role::System);
    messages.push(EnhancedMessage {
        role: Role::Assistant,
        parts: vec![Part::text("llm-summary", format!("[摘要] {summary}"))],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggcode_core::{PartMeta, Role};

    fn text_msg(role: Role, id: &str, content: &str) -> EnhancedMessage {
        EnhancedMessage::text(role, id, content)
    }

    #[test]
    fn compresses_below_original() {
        let mut messages: Vec<EnhancedMessage> = (0..50)
            .map(|i| text_msg(if i % 2 == 0 { Role::User } else { Role::Assistant }, &format!("m{i}"), &"word ".repeat(60)))
            .collect();
        let config = CompactionConfig { min_importance_score: 0.5, ..CompactionConfig::default() };
        let report = compact_rule_based(&mut messages, &config);
        assert!(report.compressed_tokens <= report.original_tokens);
        assert_eq!(report.saved_tokens, report.original_tokens - report.compressed_tokens);
    }

    #[test]
    fn system_message_survives_low_importance() {
        let mut messages = vec![text_msg(Role::System, "sys", "be helpful")];
        messages.push(text_msg(Role::User, "u1", "hi"));
        let config = CompactionConfig { min_importance_score: 0.9, ..CompactionConfig::default() };
        compact_rule_based(&mut messages, &config);
        assert!(messages.iter().any(|m| m.role == Role::System));
    }

    #[test]
    fn duplicate_messages_are_deduplicated() {
        let mut messages = vec![
            text_msg(Role::User, "1", "please read the config file and summarize its contents for me"),
            text_msg(Role::Assistant, "2", "ok"),
            text_msg(Role::User, "3", "please read the config file and summarize its contents for me"),
        ];
        let config = CompactionConfig { min_importance_score: 0.0, similarity_threshold: 0.5, ..CompactionConfig::default() };
        let report = compact_rule_based(&mut messages, &config);
        assert!(report.deduplicated_count >= 1);
    }

    #[test]
    fn tool_call_and_result_removed_together() {
        let mut call = text_msg(Role::Assistant, "c1", "");
        call.parts = vec![Part { id: "call-1".into(), kind: PartKind::ToolCall, content: "tool:glob".into(), ignored: false, meta: PartMeta { tool_name: Some("glob".into()), ..PartMeta::default() } }];
        let mut result = text_msg(Role::User, "r1", "");
        result.parts = vec![Part { id: "res-1".into(), kind: PartKind::ToolResult, content: "no matches".into(), ignored: false, meta: PartMeta { call_id: Some("call-1".into()), success: Some(true), tool_name: Some("glob".into()), ..PartMeta::default() } }];
        let mut messages = vec![call, result, text_msg(Role::User, "keep", "important recent message")];
        let config = CompactionConfig { min_importance_score: 1.1, ..CompactionConfig::default() };
        compact_rule_based(&mut messages, &config);
        // Both call and result removed together (neither survives alone), keep remains pending its own score.
        let has_call = messages.iter().any(|m| m.parts.iter().any(|p| p.kind == PartKind::ToolCall));
        let has_result = messages.iter().any(|m| m.parts.iter().any(|p| p.kind == PartKind::ToolResult));
        assert_eq!(has_call, has_result);
    }

    #[test]
    fn summarized_message_prefixed() {
        let long_text = "This is the first sentence. This is the second sentence. This is the third sentence. This is extra content that should be dropped from the summary because it exceeds the budget.";
        let mut messages = vec![text_msg(Role::User, "old", long_text)];
        for i in 0..30 {
            messages.push(text_msg(Role::User, &format!("u{i}"), "recent filler content"));
        }
        let config = CompactionConfig { min_importance_score: 0.0, summarize_older_than: 5, summary_max_tokens: 10, ..CompactionConfig::default() };
        compact_rule_based(&mut messages, &config);
        let summarized = messages.iter().find(|m| m.parts.len() == 1 && m.parts[0].content.starts_with("[摘要] "));
        assert!(summarized.is_some());
    }
}
