//! CLI theme and styling.

use colored::Colorize;
use ggcode_core::tool::Permission;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::as_24_bit_terminal_escaped;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a prompt.
    #[allow(dead_code)]
    pub(crate) fn prompt(text: &str) -> String {
        format!("{}", text.bold())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Format a box around text using box-drawing characters.
    pub(crate) fn approval_box(title: &str, content: &str, risk: Permission) -> String {
        let color_fn: fn(&str) -> String = match risk {
            Permission::Safe => |s: &str| s.green().to_string(),
            Permission::LocalModify => |s: &str| s.cyan().to_string(),
            Permission::Network => |s: &str| s.yellow().to_string(),
            Permission::Dangerous => |s: &str| s.red().bold().to_string(),
        };

        let width = 60;
        let top = format!("╭{}╮", "─".repeat(width - 2));
        let bottom = format!("╰{}╯", "─".repeat(width - 2));
        let empty = format!("│{:w$}│", "", w = width - 2);

        let pad_line = |text: &str| -> String {
            // Strip ANSI for length calculation
            let visible_len = strip_ansi(text).len();
            let padding = (width - 4).saturating_sub(visible_len);
            format!("│ {text}{:p$} │", "", p = padding)
        };

        let mut lines = vec![
            color_fn(&top),
            pad_line(&title.bold().to_string()),
            color_fn(&empty),
        ];

        for line in content.lines() {
            lines.push(pad_line(line));
        }

        lines.push(color_fn(&bottom));
        lines.join("\n")
    }

    /// Format a tool's required permission tier.
    pub(crate) fn risk_level(level: Permission) -> String {
        match level {
            Permission::Safe => "safe".green().to_string(),
            Permission::LocalModify => "local-modify".cyan().to_string(),
            Permission::Network => "network".yellow().to_string(),
            Permission::Dangerous => "dangerous".red().bold().to_string(),
        }
    }

}

/// Strip ANSI escape codes from a string for visible-length calculation.
fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            result.push(c);
        }
    }
    result
}

/// Render assistant output for the terminal: fenced code blocks are
/// syntax-highlighted with `syntect`, everything else passes through
/// unchanged (spec.md §4.M's streaming Markdown renderer).
pub(crate) fn render_markdown(text: &str) -> String {
    let syntax_set = SyntaxSet::load_defaults_newlines();
    let theme_set = ThemeSet::load_defaults();
    let theme = &theme_set.themes["base16-ocean.dark"];

    let mut out = String::with_capacity(text.len());
    let mut highlighter: Option<HighlightLines<'_>> = None;
    let mut in_fence = false;

    for line in text.lines() {
        if let Some(lang) = line.trim_start().strip_prefix("```") {
            in_fence = !in_fence;
            highlighter = if in_fence {
                let syntax = syntax_set
                    .find_syntax_by_token(lang.trim())
                    .unwrap_or_else(|| syntax_set.find_syntax_plain_text());
                Some(HighlightLines::new(syntax, theme))
            } else {
                None
            };
            continue;
        }
        match &mut highlighter {
            Some(h) => match h.highlight_line(line, &syntax_set) {
                Ok(ranges) => {
                    out.push_str(&as_24_bit_terminal_escaped(&ranges, false));
                    out.push_str("\x1b[0m\n");
                },
                Err(_) => {
                    out.push_str(line);
                    out.push('\n');
                },
            },
            None => {
                out.push_str(line);
                out.push('\n');
            },
        }
    }
    out.trim_end().to_string()
}
