//! Command manager (§2, §6, SPEC_FULL §4.I): dispatches a leading
//! `/name args` REPL line to session/model/compress/tokens/setting
//! handlers, or reports [`CommandOutcome::NotACommand`] so the caller can
//! route the line to the orchestrator instead.

use ggcode_config::Config;
use ggcode_core::{CompactionConfig, Session};

use crate::compactor::compact_rule_based;
use crate::context::ContextManager;
use crate::error::{RuntimeError, RuntimeResult};
use crate::store::SessionStore;

/// What happened after dispatching a line to the command manager.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The line didn't start with `/`; the orchestrator should handle it.
    NotACommand,
    /// Handled locally; text to show the user.
    Message(String),
    /// `/exit` was issued.
    Exit,
    /// `/session switch <id>` or `/session fork` changed the current
    /// session; the caller must reload its context from the new session.
    SessionChanged(Session),
    /// `/models <name>` requested a model switch.
    ModelSwitch(String),
}

/// Everything a command handler needs, borrowed for the duration of one
/// dispatch call.
pub struct CommandContext<'a> {
    /// The live context buffer for the current session.
    pub context: &'a mut ContextManager,
    /// The session store.
    pub store: &'a SessionStore,
    /// The current session record; updated in place by session commands.
    pub session: &'a mut Session,
    /// Mutable configuration (agent/model/session sections).
    pub config: &'a mut Config,
}

/// Parses and dispatches slash commands (SPEC_FULL §4.I). Stateless: all
/// mutable state is borrowed per-call via [`CommandContext`].
#[derive(Debug, Default)]
pub struct CommandManager;

impl CommandManager {
    /// A fresh command manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `line` should be routed here at all.
    #[must_use]
    pub fn is_command(line: &str) -> bool {
        line.trim_start().starts_with('/')
    }

    /// Dispatch one REPL line. Returns [`CommandOutcome::NotACommand`]
    /// immediately if `line` doesn't start with `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if an underlying session-store or config
    /// operation fails.
    pub fn dispatch(&self, line: &str, ctx: &mut CommandContext<'_>) -> RuntimeResult<CommandOutcome> {
        let trimmed = line.trim();
        if !Self::is_command(trimmed) {
            return Ok(CommandOutcome::NotACommand);
        }
        let rest = &trimmed[1..];
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match name {
            "exit" | "quit" => Ok(CommandOutcome::Exit),
            "help" => Ok(CommandOutcome::Message(HELP_TEXT.to_string())),
            "tokens" => Ok(CommandOutcome::Message(tokens_report(ctx))),
            "models" => handle_models(&args, ctx),
            "session" => handle_session(&args, ctx),
            "compress" => handle_compress(&args, ctx),
            "setting" => handle_setting(&args, ctx),
            "init" => Ok(CommandOutcome::Message(
                "Run the `init` top-level command to generate AGENTS.md (requires an LLM call).".to_string(),
            )),
            other => Err(RuntimeError::CommandError(format!("unknown command /{other}"))),
        }
    }
}

const HELP_TEXT: &str = "\
Available commands:
  /exit                         Quit
  /help                         Show this help
  /models [name]                List or switch the active model
  /session list|switch|fork|rename|export|import|cleanup|status
  /compress on|off|manual|llm|status
  /tokens                       Show context token usage
  /setting list|set <p> <v>|reset";

fn tokens_report(ctx: &CommandContext<'_>) -> String {
    let used = ctx.context.total_tokens();
    let budget = ctx.config.agent.max_context_tokens;
    format!("{used} / {budget} tokens used ({:.1}%)", (used as f64 / budget.max(1) as f64) * 100.0)
}

fn handle_models(args: &[&str], ctx: &mut CommandContext<'_>) -> RuntimeResult<CommandOutcome> {
    match args.first() {
        None => Ok(CommandOutcome::Message(format!("Current model: {}", ctx.config.api.model))),
        Some(name) => {
            ctx.config.api.model = (*name).to_string();
            Ok(CommandOutcome::ModelSwitch((*name).to_string()))
        },
    }
}

fn handle_session(args: &[&str], ctx: &mut CommandContext<'_>) -> RuntimeResult<CommandOutcome> {
    match args {
        ["list"] | [] => {
            let sessions = ctx.store.list()?;
            let lines: Vec<String> = sessions
                .iter()
                .map(|s| format!("{} {} ({} msgs){}", s.id, s.title, s.message_count, if s.id == ctx.session.id { " *" } else { "" }))
                .collect();
            Ok(CommandOutcome::Message(lines.join("\n")))
        },
        ["status"] => Ok(CommandOutcome::Message(format!(
            "session {} \"{}\" — {} messages, {} tool calls",
            ctx.session.id, ctx.session.title, ctx.session.message_count, ctx.session.stats.tool_calls
        ))),
        ["switch", id] => {
            let session = ctx.store.switch(id)?;
            Ok(CommandOutcome::SessionChanged(session))
        },
        ["fork"] => {
            let forked = ctx.store.fork(&ctx.session.id, None)?;
            Ok(CommandOutcome::SessionChanged(forked))
        },
        ["fork", idx] => {
            let index: usize = idx.parse().map_err(|_| RuntimeError::CommandError("fork index must be a number".into()))?;
            let forked = ctx.store.fork(&ctx.session.id, Some(index))?;
            Ok(CommandOutcome::SessionChanged(forked))
        },
        ["rename", rest @ ..] if !rest.is_empty() => {
            let title = rest.join(" ");
            let renamed = ctx.store.rename(&ctx.session.id, title)?;
            *ctx.session = renamed;
            Ok(CommandOutcome::Message(format!("renamed to \"{}\"", ctx.session.title)))
        },
        ["export", path] => {
            let export = ctx.store.export(&ctx.session.id)?;
            let json = serde_json::to_string_pretty(&export)
                .map_err(|e| RuntimeError::CommandError(format!("export failed: {e}")))?;
            std::fs::write(path, json)?;
            Ok(CommandOutcome::Message(format!("exported to {path}")))
        },
        ["import", path] => {
            let data = std::fs::read_to_string(path)?;
            let export = serde_json::from_str(&data)
                .map_err(|e| RuntimeError::CommandError(format!("import failed: {e}")))?;
            let imported = ctx.store.import(export)?;
            Ok(CommandOutcome::Message(format!("imported as session {}", imported.id)))
        },
        ["cleanup"] => {
            let removed = ctx.store.cleanup()?;
            Ok(CommandOutcome::Message(format!("removed {removed} stale session(s)")))
        },
        _ => Err(RuntimeError::CommandError("usage: /session list|switch <id>|fork [idx]|rename <title>|export <path>|import <path>|cleanup|status".into())),
    }
}

fn handle_compress(args: &[&str], ctx: &mut CommandContext<'_>) -> RuntimeResult<CommandOutcome> {
    match args.first().copied() {
        Some("on") => {
            ctx.config.agent.auto_compress = true;
            Ok(CommandOutcome::Message("auto-compression enabled".to_string()))
        },
        Some("off") => {
            ctx.config.agent.auto_compress = false;
            Ok(CommandOutcome::Message("auto-compression disabled".to_string()))
        },
        Some("manual") => {
            let config = compaction_config_from(ctx.config);
            let report = compact_rule_based(ctx.context.messages_mut(), &config);
            Ok(CommandOutcome::Message(format!(
                "compacted: removed {}, summarized {}, deduplicated {}, saved {} tokens",
                report.removed_count, report.summarized_count, report.deduplicated_count, report.saved_tokens
            )))
        },
        Some("llm") => Ok(CommandOutcome::Message(
            "LLM-assisted compaction runs automatically via the `compaction` subagent when rule-based pruning alone isn't enough.".to_string(),
        )),
        Some("status") => Ok(CommandOutcome::Message(format!(
            "auto_compress={} threshold={:.0}% used={}",
            ctx.config.agent.auto_compress,
            ctx.config.agent.compress_threshold * 100.0,
            ctx.context.total_tokens()
        ))),
        _ => Err(RuntimeError::CommandError("usage: /compress on|off|manual|llm|status".into())),
    }
}

fn handle_setting(args: &[&str], ctx: &mut CommandContext<'_>) -> RuntimeResult<CommandOutcome> {
    match args {
        ["list"] | [] => Ok(CommandOutcome::Message(format!(
            "temperature={} top_p={} top_k={} repetition_penalty={}",
            ctx.config.model_config.temperature,
            ctx.config.model_config.top_p,
            ctx.config.model_config.top_k,
            ctx.config.model_config.repetition_penalty
        ))),
        ["set", param, value] => {
            let updated = ggcode_config::apply_setting(ctx.config.clone(), param, value)?;
            *ctx.config = updated;
            Ok(CommandOutcome::Message(format!("{param} set to {value}")))
        },
        ["reset"] => {
            ctx.config.model_config = ggcode_config::ModelConfig::default();
            Ok(CommandOutcome::Message("settings reset to defaults".to_string()))
        },
        _ => Err(RuntimeError::CommandError("usage: /setting list|set <param> <value>|reset".into())),
    }
}

/// Bridge `ggcode_config::AgentConfig` to the compactor's
/// [`CompactionConfig`], per SPEC_FULL §4.G.
#[must_use]
pub fn compaction_config_from(config: &Config) -> CompactionConfig {
    let agent = &config.agent;
    // The orchestrator's trigger is `total_tokens >= max_tokens - reserve_tokens`
    // (SPEC_FULL §4.J step 1), so `compress_threshold`'s fraction of
    // `max_context_tokens` is baked into `max_tokens` here rather than
    // carried as a separate field.
    let max_tokens = (agent.max_context_tokens as f64 * agent.compress_threshold) as usize;
    CompactionConfig {
        enabled: agent.auto_compress,
        max_tokens,
        reserve_tokens: agent.compress_reserve,
        min_importance_score: 0.3,
        similarity_threshold: 0.8,
        summarize_older_than: 20,
        summary_max_tokens: 500,
        enable_deduplication: true,
        enable_summarization: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ggcode_core::{GgcodeHome, Role};

    fn context_with(store: &SessionStore, session: &Session) -> ContextManager {
        let mut ctx = ContextManager::new();
        for m in store.load_history(&session.id).unwrap() {
            ctx.append(m);
        }
        ctx
    }

    fn setup() -> (tempfile::TempDir, SessionStore, Session, Config) {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        let store = SessionStore::new(home, crate::store::RetentionPolicy::default()).unwrap();
        let session = store.create("untitled", "build", None).unwrap();
        (dir, store, session, Config::default())
    }

    #[test]
    fn not_a_command_passes_through() {
        let (_d, store, mut session, mut config) = setup();
        let mut context = context_with(&store, &session);
        let manager = CommandManager::new();
        let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
        let outcome = manager.dispatch("hello world", &mut cc).unwrap();
        assert!(matches!(outcome, CommandOutcome::NotACommand));
    }

    #[test]
    fn exit_command_recognized() {
        let (_d, store, mut session, mut config) = setup();
        let mut context = context_with(&store, &session);
        let manager = CommandManager::new();
        let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
        assert!(matches!(manager.dispatch("/exit", &mut cc).unwrap(), CommandOutcome::Exit));
    }

    #[test]
    fn session_rename_updates_store() {
        let (_d, store, mut session, mut config) = setup();
        let mut context = context_with(&store, &session);
        let manager = CommandManager::new();
        {
            let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
            manager.dispatch("/session rename my experiment", &mut cc).unwrap();
        }
        assert_eq!(session.title, "my experiment");
    }

    #[test]
    fn compress_manual_runs_rule_based_pass() {
        let (_d, store, mut session, mut config) = setup();
        let mut context = context_with(&store, &session);
        for i in 0..5 {
            context.append(ggcode_core::EnhancedMessage::text(Role::User, format!("u{i}"), "hello there"));
        }
        let manager = CommandManager::new();
        let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
        let outcome = manager.dispatch("/compress manual", &mut cc).unwrap();
        assert!(matches!(outcome, CommandOutcome::Message(_)));
    }

    #[test]
    fn unknown_command_errors() {
        let (_d, store, mut session, mut config) = setup();
        let mut context = context_with(&store, &session);
        let manager = CommandManager::new();
        let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
        assert!(manager.dispatch("/bogus", &mut cc).is_err());
    }
}
