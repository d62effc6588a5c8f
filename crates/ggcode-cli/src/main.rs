//! ggcode - an interactive command-line coding agent.
//!
//! The CLI is a thin front-end: it wires configuration, the LLM
//! transport, the tool registry, and the orchestrator together, then
//! drives a `rustyline` REPL (or a one-shot turn) over them.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod theme;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ggcode_config::{ApiMode, Config};
use ggcode_core::{EnhancedMessage, GgcodeHome, Role};
use ggcode_llm::{ChatOptions, EnterpriseProvider, LlmProvider, OpenAiCompatProvider};
use ggcode_runtime::{
    commands::CommandContext, ApprovalCallback, ApprovalDecision, CommandManager, CommandOutcome,
    ConcurrencyGate, ContextManager, GateJob, Orchestrator, OrchestratorConfig, Priority,
    SessionStore, StatusCallback, StatusEvent, TurnOutcome,
};
use ggcode_tools::{default_registry, ExecutionContext};
use tracing_subscriber::EnvFilter;

use theme::Theme;

/// ggcode - an interactive coding agent.
#[derive(Parser)]
#[command(name = "ggcode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive agent REPL with tool dispatch (default).
    Agent,

    /// Start a plain chat REPL with no tool dispatch.
    Chat,

    /// Inspect or change the on-disk configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current configuration as JSON.
    Show,
    /// Print one dotted-path configuration field (e.g. `agent.max_iterations`).
    Get {
        /// Dotted path into the configuration document.
        key: String,
    },
    /// Validate and apply one setting (`temperature`, `top_p`, `top_k`, `repetition_penalty`).
    Set {
        /// Setting name.
        key: String,
        /// New value.
        value: String,
    },
    /// Write out a fresh default configuration file.
    Init,
    /// Load and validate the configuration without changing it.
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", Theme::error(&format!("{err:#}")));
            if err.downcast_ref::<ggcode_config::ConfigError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var("GGCODE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Agent) {
        Commands::Agent => run_repl(true).await,
        Commands::Chat => run_repl(false).await,
        Commands::Config { command } => run_config(command),
    }
}

fn run_config(command: ConfigCommands) -> anyhow::Result<()> {
    let home = GgcodeHome::resolve()?;
    match command {
        ConfigCommands::Show => {
            let config = ggcode_config::load(&home)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
        ConfigCommands::Get { key } => {
            let config = ggcode_config::load(&home)?;
            let value = serde_json::to_value(&config)?;
            let field = key
                .split('.')
                .try_fold(&value, |v, part| v.get(part))
                .ok_or_else(|| anyhow::anyhow!("no such configuration field: {key}"))?;
            println!("{field}");
            Ok(())
        },
        ConfigCommands::Set { key, value } => {
            let config = ggcode_config::load(&home)?;
            let updated = ggcode_config::apply_setting(config, &key, &value)?;
            ggcode_config::save(&home, &updated)?;
            println!("{}", Theme::success(&format!("{key} set to {value}")));
            Ok(())
        },
        ConfigCommands::Init => {
            ggcode_config::init(&home)?;
            println!("{}", Theme::success(&format!("wrote {}", home.config_path().display())));
            Ok(())
        },
        ConfigCommands::Validate => {
            ggcode_config::load(&home)?;
            println!("{}", Theme::success("configuration is valid"));
            Ok(())
        },
    }
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let max_context = config.agent.max_context_tokens;
    let provider: Arc<dyn LlmProvider> = match config.api.mode {
        ApiMode::OpenaiCompat => Arc::new(OpenAiCompatProvider::custom(
            config.api.base_url.clone(),
            config.api.resolve_api_key(),
            config.api.model.clone(),
            max_context,
        )),
        ApiMode::Enterprise => {
            let api_key = config
                .api
                .resolve_api_key()
                .ok_or_else(|| anyhow::anyhow!("enterprise api mode requires an api key"))?;
            Arc::new(EnterpriseProvider::new(config.api.base_url.clone(), api_key, config.api.model.clone(), max_context))
        },
    };
    Ok(provider)
}

async fn run_repl(tool_dispatch: bool) -> anyhow::Result<()> {
    let home = GgcodeHome::resolve()?;
    home.ensure()?;
    let config = match ggcode_config::load(&home) {
        Ok(config) => config,
        Err(ggcode_config::ConfigError::Missing(_)) => ggcode_config::init(&home)?,
        Err(err) => return Err(err.into()),
    };

    let provider = build_provider(&config)?;
    let gate = ConcurrencyGate::new();
    let store = SessionStore::new(home.clone(), ggcode_runtime::store::RetentionPolicy::default())?;

    let agent_type = if tool_dispatch { "build" } else { "chat" };
    let session = match store.current_id()? {
        Some(id) => store.switch(&id)?,
        None => store.create("untitled", agent_type, None)?,
    };
    let mut context = ContextManager::new();
    context.load_history(store.load_history(&session.id)?);

    let workspace_root = std::env::current_dir()?;
    context.set_system_prompt(ggcode_tools::build_system_prompt(&workspace_root));

    println!("{}", Theme::header("ggcode"));
    println!("{}", Theme::dimmed(&format!("session {} \"{}\"", session.id, session.title)));
    println!("{}", Theme::separator());

    if tool_dispatch {
        run_agent_repl(config, provider, gate, store, session, context, workspace_root).await
    } else {
        run_chat_repl(config, provider, gate, store, session, context).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_agent_repl(
    mut config: Config,
    provider: Arc<dyn LlmProvider>,
    gate: ConcurrencyGate,
    store: SessionStore,
    mut session: ggcode_core::Session,
    mut context: ContextManager,
    workspace_root: std::path::PathBuf,
) -> anyhow::Result<()> {
    let tools = Arc::new(default_registry());
    let exec_ctx = ExecutionContext::new(workspace_root, store.tool_output_dir());

    let orchestrator_config = OrchestratorConfig {
        max_iterations: config.agent.max_iterations,
        auto_approve: config.agent.auto_approve,
        compaction: ggcode_runtime::commands::compaction_config_from(&config),
        ..OrchestratorConfig::default()
    };
    let mut orchestrator = Orchestrator::new(Arc::clone(&provider), gate, Arc::clone(&tools), orchestrator_config);

    let abort = orchestrator.abort_token();
    spawn_ctrl_c_handler(abort);

    let approval: ApprovalCallback = Arc::new(|call, permission| prompt_for_approval(call, permission));
    let status: StatusCallback = Arc::new(render_status_event);

    let commands = CommandManager::new();
    let mut rl = rustyline::DefaultEditor::new()?;

    loop {
        let Ok(line) = rl.readline(&Theme::prompt("ggcode> ")) else {
            break;
        };
        let _ = rl.add_history_entry(line.as_str());
        if line.trim().is_empty() {
            continue;
        }

        if CommandManager::is_command(&line) {
            let mut cc = CommandContext { context: &mut context, store: &store, session: &mut session, config: &mut config };
            match commands.dispatch(&line, &mut cc) {
                Ok(CommandOutcome::Exit) => break,
                Ok(CommandOutcome::Message(text)) => println!("{text}"),
                Ok(CommandOutcome::SessionChanged(new_session)) => {
                    context.clear_context();
                    context.load_history(store.load_history(&new_session.id)?);
                    session = new_session;
                    println!("{}", Theme::success(&format!("switched to session {}", session.id)));
                },
                Ok(CommandOutcome::ModelSwitch(model)) => println!("{}", Theme::success(&format!("model set to {model}"))),
                Ok(CommandOutcome::NotACommand) => unreachable!("is_command already checked"),
                Err(err) => println!("{}", Theme::error(&err.to_string())),
            }
            persist_turn(&store, &session, &context);
            continue;
        }

        match orchestrator.run_turn(&mut context, &exec_ctx, line, Some(Arc::clone(&status)), Arc::clone(&approval)).await {
            Ok(TurnOutcome::Completed { response }) => println!("\n{}\n", theme::render_markdown(&response)),
            Ok(TurnOutcome::MaxIterations) => println!("{}", Theme::warning("turn stopped: iteration budget exhausted")),
            Ok(TurnOutcome::Interrupted) => println!("{}", Theme::warning("turn interrupted")),
            Err(err) => println!("{}", Theme::error(&err.to_string())),
        }
        persist_turn(&store, &session, &context);
    }

    Ok(())
}

async fn run_chat_repl(
    config: Config,
    provider: Arc<dyn LlmProvider>,
    gate: ConcurrencyGate,
    store: SessionStore,
    session: ggcode_core::Session,
    mut context: ContextManager,
) -> anyhow::Result<()> {
    let mut rl = rustyline::DefaultEditor::new()?;

    loop {
        let Ok(line) = rl.readline(&Theme::prompt("chat> ")) else {
            break;
        };
        let _ = rl.add_history_entry(line.as_str());
        if line.trim().is_empty() {
            continue;
        }
        if line.trim() == "/exit" || line.trim() == "/quit" {
            break;
        }

        context.append(EnhancedMessage::text(Role::User, mint_id(), line));
        let budget = provider.max_context_tokens().saturating_sub(config.agent.compress_reserve);
        let view = context.context_view(budget);
        let (system, rest) = split_system(view);

        let options = ChatOptions {
            temperature: Some(config.model_config.temperature),
            top_p: Some(config.model_config.top_p),
            stream: true,
            ..ChatOptions::default()
        };

        println!();
        let mut on_chunk = |chunk: &str| print!("{chunk}");
        let job: GateJob = {
            let provider = Arc::clone(&provider);
            Box::pin(async move { provider.chat(&system, &rest, &options, Some(&mut on_chunk)).await })
        };

        match gate.submit(Priority::High, job).await {
            Ok(reply) => {
                println!();
                context.append(EnhancedMessage::text(Role::Assistant, mint_id(), reply));
            },
            Err(err) => println!("{}", Theme::error(&err.to_string())),
        }
        persist_turn(&store, &session, &context);
    }

    Ok(())
}

fn persist_turn(store: &SessionStore, session: &ggcode_core::Session, context: &ContextManager) {
    let legacy: Vec<_> = context.messages().iter().filter_map(ggcode_core::EnhancedMessage::flatten).collect();
    if let Err(err) = store.save_history(&session.id, &legacy) {
        tracing::warn!(session_id = %session.id, error = %err, "failed to persist session history");
    }
}

fn split_system(view: Vec<ggcode_core::LegacyMessage>) -> (String, Vec<ggcode_core::LegacyMessage>) {
    let mut iter = view.into_iter();
    match iter.next() {
        Some(first) if first.role == Role::System => (first.content, iter.collect()),
        Some(first) => {
            let mut rest = vec![first];
            rest.extend(iter);
            (String::new(), rest)
        },
        None => (String::new(), Vec::new()),
    }
}

fn mint_id() -> String {
    use rand::Rng;
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng().sample_iter(rand::distributions::Alphanumeric).take(9).map(char::from).collect();
    format!("msg_{timestamp}_{suffix}")
}

fn spawn_ctrl_c_handler(abort: ggcode_runtime::AbortToken) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            abort.cancel();
        }
    });
}

fn prompt_for_approval(call: &ggcode_core::tool::ToolCall, permission: ggcode_core::tool::Permission) -> ApprovalDecision {
    let args = serde_json::to_string_pretty(&call.parameters).unwrap_or_default();
    println!("{}", Theme::approval_box(&format!("{} ({})", call.tool, Theme::risk_level(permission)), &args, permission));
    match dialoguer::Confirm::new().with_prompt("Run this tool call?").default(false).interact() {
        Ok(true) => ApprovalDecision::Approve,
        _ => ApprovalDecision::Deny,
    }
}

fn render_status_event(event: StatusEvent) {
    match event {
        StatusEvent::Thinking => println!("{}", Theme::dimmed("thinking...")),
        StatusEvent::Compacting => println!("{}", Theme::dimmed("compacting context...")),
        StatusEvent::CorrectionRetry { attempt } => {
            println!("{}", Theme::warning(&format!("malformed reply, retrying ({attempt})")));
        },
        StatusEvent::ToolCallStarted { id: _, tool } => println!("{}", Theme::info(&format!("running {tool}"))),
        StatusEvent::ToolCallFinished { id: _, success } => {
            if success {
                println!("{}", Theme::success("tool call finished"));
            } else {
                println!("{}", Theme::error("tool call failed"));
            }
        },
        StatusEvent::TitleGenerated(title) => println!("{}", Theme::dimmed(&format!("session titled \"{title}\""))),
        StatusEvent::SummaryGenerated(summary) => println!("{}", Theme::dimmed(&format!("progress: {summary}"))),
    }
}
