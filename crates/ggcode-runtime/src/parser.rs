//! Tool-call parser (§4.C, §9): extracts structured tool invocations from
//! free-form model text, auto-correcting common format mistakes first.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde_json::Value;

use ggcode_core::tool::ToolCall;

/// Hard cap on tool calls recognized from a single response (spec.md §4.C).
pub const MAX_CALLS_PER_RESPONSE: usize = 10;

/// Parse `text` for tool calls, discarding anything naming a tool not in
/// `known_tools`. Tool names are canonicalized to lowercase; byte-identical
/// duplicates (same tool + parameters) are suppressed; at most
/// [`MAX_CALLS_PER_RESPONSE`] calls survive.
#[must_use]
pub fn parse_tool_calls(text: &str, known_tools: &HashSet<String>) -> Vec<ToolCall> {
    let corrected = auto_correct(text, known_tools);
    let mut calls = Vec::new();
    for value in scan_json_values(&corrected) {
        collect_calls(&value, known_tools, &mut calls);
    }
    dedup_and_cap(calls)
}

/// Apply the three auto-correction rules from spec.md §4.C, in order:
/// XML-style calls, function-call shorthand, unquoted JSON keys.
/// Capitalized tool names need no textual rewrite — they're canonicalized
/// to lowercase when a call is collected.
fn auto_correct(text: &str, known_tools: &HashSet<String>) -> String {
    let text = convert_xml_calls(text, known_tools);
    let text = convert_function_shorthand(&text, known_tools);
    fix_unquoted_keys(&text)
}

/// `<read><filePath>x</filePath></read>` → `{"tool":"read","parameters":{"filePath":"x"}}`.
fn convert_xml_calls(text: &str, known_tools: &HashSet<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if let Some((tag, inner, end)) = match_xml_tag(text, i) {
                if known_tools.contains(&tag.to_lowercase()) {
                    let params = scan_xml_children(&inner);
                    out.push_str(&render_call_json(&tag.to_lowercase(), &params, None));
                    i = end;
                    continue;
                }
            }
        }
        // Push the next char (handles multi-byte UTF-8 correctly).
        let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Find a well-formed `<tag>...</tag>` span starting at byte offset
/// `start` (which must point at the opening `<`). Returns the tag name,
/// inner content, and the byte offset just past the closing tag.
fn match_xml_tag(text: &str, start: usize) -> Option<(String, String, usize)> {
    let rest = &text[start..];
    let open_end = rest.find('>')?;
    let open_tag = &rest[1..open_end];
    if open_tag.is_empty() || !open_tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let close_marker = format!("</{open_tag}>");
    let body_start = start + open_end + 1;
    let close_offset = text[body_start..].find(&close_marker)?;
    let inner = text[body_start..body_start + close_offset].to_string();
    let end = body_start + close_offset + close_marker.len();
    Some((open_tag.to_string(), inner, end))
}

/// Scan single-level `<key>value</key>` children inside an XML tool call.
fn scan_xml_children(inner: &str) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    let mut pos = 0;
    while let Some(start) = inner[pos..].find('<') {
        let abs = pos + start;
        if let Some((key, value, end)) = match_xml_tag(inner, abs) {
            params.insert(key, Value::String(value.trim().to_string()));
            pos = end;
        } else {
            pos = abs + 1;
        }
    }
    params
}

/// A small hint table mapping a built-in tool to its parameters' order,
/// used to assign positional arguments from function-call shorthand like
/// `read_file(path)`. Grounded in the built-in handlers of §4.B.
fn positional_param_names(tool: &str) -> &'static [&'static str] {
    match tool {
        "read_file" | "read" => &["file_path", "offset", "limit"],
        "write_file" | "write" => &["file_path", "content"],
        "edit_file" | "edit" => &["file_path", "old_string", "new_string", "replace_all"],
        "glob" => &["pattern", "path"],
        "grep" => &["pattern", "path", "glob"],
        "bash" => &["command", "timeout"],
        "mkdir" => &["path"],
        _ => &[],
    }
}

/// `read(path)` → `{"tool":"read","parameters":{"file_path":"path"}}`.
fn convert_function_shorthand(text: &str, known_tools: &HashSet<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some((name, args, end)) = match_function_call(text, i) {
            let lower = name.to_lowercase();
            if known_tools.contains(&lower) {
                let hints = positional_param_names(&lower);
                let mut params = HashMap::new();
                for (idx, arg) in args.iter().enumerate() {
                    let key = hints.get(idx).map_or_else(|| format!("arg{idx}"), ToString::to_string);
                    params.insert(key, guess_value(arg));
                }
                out.push_str(&render_call_json(&lower, &params, None));
                i = end;
                continue;
            }
        }
        let ch_len = text[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Match `name(arg1, arg2, ...)` at byte offset `start`. `name` must be a
/// bare identifier immediately followed by `(`, with no nested parens in
/// the argument list.
fn match_function_call(text: &str, start: usize) -> Option<(String, Vec<String>, usize)> {
    let rest = &text[start..];
    let mut chars = rest.char_indices().peekable();
    let mut name_end = 0;
    while let Some(&(idx, ch)) = chars.peek() {
        if ch.is_alphanumeric() || ch == '_' {
            name_end = idx + ch.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    if name_end == 0 {
        return None;
    }
    let name = &rest[..name_end];
    if !name.chars().next()?.is_alphabetic() {
        return None;
    }
    if rest[name_end..].chars().next() != Some('(') {
        return None;
    }
    let close = rest[name_end..].find(')')?;
    let args_str = &rest[name_end + 1..name_end + close];
    if args_str.contains('(') {
        return None;
    }
    let args = if args_str.trim().is_empty() {
        Vec::new()
    } else {
        args_str.split(',').map(|a| a.trim().trim_matches(|c| c == '"' || c == '\'').to_string()).collect()
    };
    Some((name.to_string(), args, start + name_end + close + 1))
}

fn guess_value(arg: &str) -> Value {
    if let Ok(n) = arg.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(b) = arg.parse::<bool>() {
        return Value::from(b);
    }
    Value::String(arg.to_string())
}

fn render_call_json(tool: &str, params: &HashMap<String, Value>, id: Option<&str>) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("tool".to_string(), Value::String(tool.to_string()));
    obj.insert("parameters".to_string(), Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()));
    if let Some(id) = id {
        obj.insert("id".to_string(), Value::String(id.to_string()));
    }
    Value::Object(obj).to_string()
}

/// Quote bare JSON object keys: `{tool: "read"}` → `{"tool": "read"}`.
/// Only matches identifiers immediately following `{` or `,` (optionally
/// with whitespace) and followed by `:` — already-quoted keys don't match
/// this pattern since the character after `{`/`,` would be `"`, not a
/// bare identifier start.
fn fix_unquoted_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' || chars[i] == ',' {
            out.push(chars[i]);
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                out.push(chars[j]);
                j += 1;
            }
            let key_start = j;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            if j > key_start {
                let mut k = j;
                while k < chars.len() && chars[k].is_whitespace() {
                    k += 1;
                }
                if k < chars.len() && chars[k] == ':' {
                    out.push('"');
                    out.extend(&chars[key_start..j]);
                    out.push('"');
                    i = j;
                    continue;
                }
            }
            i = j.max(i + 1);
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Scan `text` left to right for top-level balanced `[...]` or `{...}`
/// spans that parse as JSON, recognition priority per spec.md §4.C:
/// arrays first, then inline objects (fenced code blocks are scanned the
/// same way — the fence markers are just more text to skip over).
fn scan_json_values(text: &str) -> Vec<Value> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i];
        if ch == b'[' || ch == b'{' {
            if let Some(end) = find_balanced_end(text, i) {
                if let Ok(value) = serde_json::from_str::<Value>(&text[i..end]) {
                    out.push(value);
                    i = end;
                    continue;
                }
            }
        }
        i += 1;
    }
    out
}

/// Find the byte offset just past the closing bracket matching the
/// opener at `start`, respecting string literals and escapes.
fn find_balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'[' { b']' } else { b'}' };
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i + 1);
            }
        }
        i += 1;
    }
    None
}

fn collect_calls(value: &Value, known_tools: &HashSet<String>, out: &mut Vec<ToolCall>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_one(item, known_tools, out);
            }
        },
        Value::Object(_) => collect_one(value, known_tools, out),
        _ => {},
    }
}

fn collect_one(value: &Value, known_tools: &HashSet<String>, out: &mut Vec<ToolCall>) {
    let Some(obj) = value.as_object() else { return };
    let Some(tool) = obj.get("tool").and_then(Value::as_str) else { return };
    let tool = tool.to_lowercase();
    if !known_tools.contains(&tool) {
        return;
    }
    let parameters: HashMap<String, Value> = obj
        .get("parameters")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(mint_id);
    out.push(ToolCall { tool, parameters, id });
}

/// Mint a synthetic call id, `tool_<timestamp>_<random9>` (spec.md §4.C).
fn mint_id() -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("tool_{timestamp}_{suffix}")
}

fn dedup_and_cap(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for call in calls {
        if out.len() >= MAX_CALLS_PER_RESPONSE {
            break;
        }
        if seen.insert(call.dedup_key()) {
            out.push(call);
        }
    }
    out
}

/// Runs on accumulating output during generation to detect a model
/// drifting into a non-JSON tool-call format (spec.md §4.C, §9). Scan
/// position is memoized so each call only examines newly-arrived text.
pub struct StreamingFormatDetector {
    known_tools: HashSet<String>,
    scanned_to: usize,
    fence_marker_count: usize,
    saw_tool_keyword: bool,
    saw_xml_tag: bool,
    saw_literal_tool: bool,
}

/// Confidence threshold above which the detector signals an abort.
pub const ABORT_CONFIDENCE: f64 = 0.8;

impl StreamingFormatDetector {
    /// Build a detector for one streaming response.
    #[must_use]
    pub fn new(known_tools: HashSet<String>) -> Self {
        Self {
            known_tools,
            scanned_to: 0,
            fence_marker_count: 0,
            saw_tool_keyword: false,
            saw_xml_tag: false,
            saw_literal_tool: false,
        }
    }

    /// Feed the full buffer accumulated so far. Returns `true` once the
    /// malformed-format confidence crosses [`ABORT_CONFIDENCE`] outside a
    /// fenced code block.
    pub fn scan(&mut self, buffer: &str) -> bool {
        if self.scanned_to >= buffer.len() {
            return false;
        }
        let chunk = &buffer[self.scanned_to..];
        self.scanned_to = buffer.len();

        self.fence_marker_count += chunk.matches("```").count();
        let in_fence = self.fence_marker_count % 2 == 1;

        if chunk.contains('<') {
            self.saw_xml_tag = true;
        }
        if chunk.contains("\"tool\"") || chunk.contains("'tool'") {
            self.saw_literal_tool = true;
        }
        if !self.saw_tool_keyword {
            let lower = chunk.to_lowercase();
            if self.known_tools.iter().any(|name| lower.contains(name.as_str())) {
                self.saw_tool_keyword = true;
            }
        }

        if in_fence {
            return false;
        }
        self.confidence() >= ABORT_CONFIDENCE
    }

    fn confidence(&self) -> f64 {
        let mut score = 0.0;
        if self.saw_tool_keyword {
            score += 0.34;
        }
        if self.saw_xml_tag {
            score += 0.34;
        }
        if !self.saw_literal_tool {
            score += 0.34;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_json_array() {
        let text = r#"[{"tool": "read_file", "parameters": {"file_path": "/tmp/a.txt"}}]"#;
        let calls = parse_tool_calls(text, &tools(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "read_file");
        assert_eq!(calls[0].parameters["file_path"], "/tmp/a.txt");
    }

    #[test]
    fn parses_inline_object_with_id() {
        let text = r#"Sure, here: {"tool": "bash", "parameters": {"command": "ls"}, "id": "abc"}"#;
        let calls = parse_tool_calls(text, &tools(&["bash"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "abc");
    }

    #[test]
    fn parses_fenced_json_array() {
        let text = "```json\n[{\"tool\": \"glob\", \"parameters\": {\"pattern\": \"*.rs\"}}]\n```";
        let calls = parse_tool_calls(text, &tools(&["glob"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "glob");
    }

    #[test]
    fn unknown_tool_discarded() {
        let text = r#"{"tool": "nonexistent", "parameters": {}}"#;
        let calls = parse_tool_calls(text, &tools(&["read_file"]));
        assert!(calls.is_empty());
    }

    #[test]
    fn capitalized_tool_name_lowercased() {
        let text = r#"{"tool": "Read_File", "parameters": {"file_path": "a"}}"#;
        let calls = parse_tool_calls(text, &tools(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "read_file");
    }

    #[test]
    fn duplicate_calls_suppressed() {
        let text = r#"[{"tool":"glob","parameters":{"pattern":"*"}},{"tool":"glob","parameters":{"pattern":"*"}}]"#;
        let calls = parse_tool_calls(text, &tools(&["glob"]));
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn caps_at_ten_calls() {
        let items: Vec<String> = (0..15)
            .map(|i| format!(r#"{{"tool":"glob","parameters":{{"pattern":"{i}"}}}}"#))
            .collect();
        let text = format!("[{}]", items.join(","));
        let calls = parse_tool_calls(&text, &tools(&["glob"]));
        assert_eq!(calls.len(), MAX_CALLS_PER_RESPONSE);
    }

    #[test]
    fn missing_id_is_minted() {
        let text = r#"{"tool": "bash", "parameters": {"command": "ls"}}"#;
        let calls = parse_tool_calls(text, &tools(&["bash"]));
        assert!(calls[0].id.starts_with("tool_"));
    }

    #[test]
    fn xml_style_call_converted() {
        let text = "<read_file><file_path>/tmp/a.txt</file_path></read_file>";
        let calls = parse_tool_calls(text, &tools(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["file_path"], "/tmp/a.txt");
    }

    #[test]
    fn function_shorthand_converted() {
        let text = "read_file(/tmp/a.txt)";
        let calls = parse_tool_calls(text, &tools(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["file_path"], "/tmp/a.txt");
    }

    #[test]
    fn unquoted_keys_fixed() {
        let text = r#"{tool: "bash", parameters: {command: "ls"}}"#;
        let calls = parse_tool_calls(text, &tools(&["bash"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["command"], "ls");
    }

    #[test]
    fn detector_flags_xml_without_tool_keyword_string() {
        let mut detector = StreamingFormatDetector::new(tools(&["read_file"]));
        assert!(!detector.scan("Sure, let me "));
        assert!(detector.scan("Sure, let me <read_file><file_path>x</file_path></read_file>"));
    }

    #[test]
    fn detector_ignores_content_inside_fence() {
        let mut detector = StreamingFormatDetector::new(tools(&["read_file"]));
        let buffer = "```\n<read_file><file_path>x</file_path></read_file>\n```";
        assert!(!detector.scan(buffer));
    }

    #[test]
    fn detector_not_confident_when_literal_tool_present() {
        let mut detector = StreamingFormatDetector::new(tools(&["read_file"]));
        let buffer = "<read_file> uses \"tool\" key too";
        assert!(!detector.scan(buffer));
    }
}
