//! Fixed prompt templates (§4.J, §4.K, §4.L): the malformed-call
//! correction message, the max-iterations warning, and the system
//! prompts for the three functional subagents.

/// Injected as a synthetic user message after the streaming format
/// detector aborts a request, per spec.md §4.J step 2. `snippet` is the
/// malformed text the model produced, tagged `ignored=true` on the
/// preceding assistant message.
#[must_use]
pub fn correction_prompt(snippet: &str) -> String {
    format!(
        "Your previous reply used an invalid tool-call format and was not executed:\n\n\
         {snippet}\n\n\
         Tool calls must be a JSON array of objects, each with a \"tool\" name and a \
         \"parameters\" object, e.g. [{{\"tool\": \"read_file\", \"parameters\": \
         {{\"file_path\": \"...\"}}}}]. Please reissue your request in that form."
    )
}

/// Appended as the final assistant message when a turn hits
/// `maxIterations` without reaching a final answer (spec.md §4.J step 6).
#[must_use]
pub fn max_iterations_warning(max_iterations: u32) -> String {
    format!(
        "Stopped after {max_iterations} steps without reaching a final answer. \
         The conversation can continue, but this turn's automatic tool loop has \
         been cut off to avoid runaway execution."
    )
}

/// System prompt prepended to the `compaction` functional subagent's
/// filtered (user+assistant) transcript, per spec.md §4.G / §4.K.
pub const COMPACTION_PROMPT: &str = "\
Summarize the conversation below, preserving facts, decisions, file paths, \
and any unresolved tasks that matter for continuing the work. Write a dense, \
plain-text summary with no preamble.";

/// System prompt for the `summary` functional subagent (last 10 messages).
pub const SUMMARY_PROMPT: &str = "\
Summarize what happened in this conversation in one or two sentences, \
focused on what was changed or accomplished. Plain text, no preamble.";

/// System prompt for the `title` functional subagent (first user message).
pub const TITLE_PROMPT: &str = "\
Generate a short title (5 words or fewer) for a conversation that starts \
with the following user request. Reply with the title only, no quotes, no \
punctuation at the end.";

/// Benign fallback returned by a functional subagent on failure or timeout
/// (spec.md §4.K: \"failure returns a benign default string\").
#[must_use]
pub fn subagent_fallback(kind: &str) -> String {
    match kind {
        "title" => "Untitled session".to_string(),
        "summary" => "No summary available.".to_string(),
        _ => String::new(),
    }
}
