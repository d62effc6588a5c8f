//! The agent orchestrator (§4.J): the think→act→observe loop tying the
//! parser, the concurrency gate, the tool registry, the context manager,
//! the compactor, and the functional subagents together into one turn.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use ggcode_core::{CompactionConfig, EnhancedMessage, LegacyMessage, Part, PartKind, PartMeta, Role};
use ggcode_core::tool::{Permission, ToolCall};
use ggcode_llm::{ChatOptions, LlmError, LlmProvider};
use ggcode_tools::{ExecutionContext, ToolRegistry};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::compactor::compact_rule_based;
use crate::context::ContextManager;
use crate::error::{RuntimeError, RuntimeResult};
use crate::gate::{ConcurrencyGate, GateJob, Priority};
use crate::parser::{parse_tool_calls, StreamingFormatDetector};
use crate::subagent::{run_subagent, SubagentKind};
use crate::templates;

/// Cooperative, cloneable cancellation handle shared by a turn and
/// whoever drives the REPL (e.g. a `Ctrl-C` handler). Cancelling it stops
/// the current turn at its next checkpoint (spec.md §4.J step 7).
#[derive(Debug, Clone)]
pub struct AbortToken(CancellationToken);

impl AbortToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl Default for AbortToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What the approval callback decided about one non-safe tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Run the tool.
    Approve,
    /// Skip it; a denial result is recorded in its place.
    Deny,
}

/// Asked once per tool call whose [`Permission`] is above `Safe` and
/// `auto_approve` is off. Synchronous: a REPL typically answers this with
/// a blocking terminal prompt.
pub type ApprovalCallback = Arc<dyn Fn(&ToolCall, Permission) -> ApprovalDecision + Send + Sync>;

/// Progress notifications emitted during a turn, for a REPL's live status
/// line (spec.md §4.J, §6).
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// About to submit a model request.
    Thinking,
    /// Rule-based compaction ran before this turn's first model call.
    Compacting,
    /// The streaming format detector aborted a malformed reply; this is
    /// the nth correction attempt this turn.
    CorrectionRetry {
        /// 1-based attempt count.
        attempt: u32,
    },
    /// A tool call is about to run.
    ToolCallStarted {
        /// The call's id.
        id: String,
        /// The tool name.
        tool: String,
    },
    /// A tool call finished.
    ToolCallFinished {
        /// The call's id.
        id: String,
        /// Whether it succeeded.
        success: bool,
    },
    /// The `title` functional subagent produced a session title.
    TitleGenerated(String),
    /// The `summary` functional subagent produced a progress summary.
    SummaryGenerated(String),
}

/// Receives [`StatusEvent`]s as a turn progresses.
pub type StatusCallback = Arc<dyn Fn(StatusEvent) + Send + Sync>;

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A final, non-tool-call answer was reached.
    Completed {
        /// The model's final reply text.
        response: String,
    },
    /// The iteration budget was exhausted first (spec.md §4.J step 6).
    MaxIterations,
    /// The turn's abort token fired before completion.
    Interrupted,
}

/// Tuning knobs for one [`Orchestrator`] (spec.md §4.J, §6's `agent`
/// config section).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-turn think→act iteration cap.
    pub max_iterations: u32,
    /// When true, non-safe tool calls run without asking the approval
    /// callback.
    pub auto_approve: bool,
    /// Malformed-reply correction attempts allowed per turn before the
    /// turn fails outright (spec.md §4.J step 2: capped at 2).
    pub max_correction_retries: u32,
    /// Compaction tuning, checked before each turn's first model call.
    pub compaction: CompactionConfig,
    /// Run the `title` subagent after the first completed turn.
    pub title_after_first_turn: bool,
    /// Run the `summary` subagent every N completed turns (0 disables).
    pub summary_every_n_turns: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            auto_approve: false,
            max_correction_retries: 2,
            compaction: CompactionConfig::default(),
            title_after_first_turn: true,
            summary_every_n_turns: 5,
        }
    }
}

enum ModelCallOutcome {
    Completed(String),
    Malformed(String),
    Interrupted,
}

/// Drives one session's think→act→observe loop (spec.md §2, §4.J).
/// Holds no session identity of its own — callers pass the
/// [`ContextManager`] and [`ExecutionContext`] to operate on per turn, so
/// one orchestrator can be reused across a process's lifetime.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    gate: ConcurrencyGate,
    tools: Arc<ToolRegistry>,
    known_tools: HashSet<String>,
    config: OrchestratorConfig,
    abort: AbortToken,
    turns_completed: u64,
}

impl Orchestrator {
    /// Build an orchestrator over `provider`, dispatching through `gate`
    /// and executing tool calls against `tools`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, gate: ConcurrencyGate, tools: Arc<ToolRegistry>, config: OrchestratorConfig) -> Self {
        let known_tools = tools.list_all().iter().map(|t| t.name.to_lowercase()).collect();
        Self {
            provider,
            gate,
            tools,
            known_tools,
            config,
            abort: AbortToken::new(),
            turns_completed: 0,
        }
    }

    /// A clone of this orchestrator's abort token, to wire up to e.g. a
    /// `Ctrl-C` handler. Cancelling it stops the in-flight turn.
    #[must_use]
    pub fn abort_token(&self) -> AbortToken {
        self.abort.clone()
    }

    /// Run one full turn: append `user_text`, compact if over threshold,
    /// then loop think→act until a final answer, the iteration cap, or
    /// an interrupt (spec.md §4.J).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ExecutionFailed`] if the correction-retry
    /// budget is exhausted, or propagates a non-transient
    /// [`ggcode_llm::LlmError`].
    pub async fn run_turn(
        &mut self,
        context: &mut ContextManager,
        exec_ctx: &ExecutionContext,
        user_text: String,
        status: Option<StatusCallback>,
        approval: ApprovalCallback,
    ) -> RuntimeResult<TurnOutcome> {
        let emit = |event: StatusEvent| {
            if let Some(cb) = &status {
                cb(event);
            }
        };

        context.append(EnhancedMessage::text(Role::User, mint_part_id(), user_text));

        if self.config.compaction.enabled {
            let ceiling = self.config.compaction.max_tokens.saturating_sub(self.config.compaction.reserve_tokens);
            if context.total_tokens() >= ceiling {
                emit(StatusEvent::Compacting);
                compact_rule_based(context.messages_mut(), &self.config.compaction);
            }
        }

        let mut corrections_used = 0u32;

        for _ in 0..self.config.max_iterations {
            if self.abort.is_cancelled() {
                return Ok(TurnOutcome::Interrupted);
            }
            emit(StatusEvent::Thinking);

            let budget = self.provider.max_context_tokens().saturating_sub(self.config.compaction.reserve_tokens);
            let (system, rest) = split_system(context.context_view(budget));

            let text = match self.call_model_once(system, rest).await? {
                ModelCallOutcome::Completed(text) => text,
                ModelCallOutcome::Interrupted => return Ok(TurnOutcome::Interrupted),
                ModelCallOutcome::Malformed(snippet) => {
                    if corrections_used >= self.config.max_correction_retries {
                        return Err(RuntimeError::ExecutionFailed);
                    }
                    corrections_used += 1;
                    emit(StatusEvent::CorrectionRetry { attempt: corrections_used });

                    let mut ignored_reply = EnhancedMessage::text(Role::Assistant, mint_part_id(), snippet.clone());
                    ignored_reply.parts[0].ignored = true;
                    context.append(ignored_reply);
                    context.append(EnhancedMessage::text(Role::User, mint_part_id(), templates::correction_prompt(&snippet)));
                    continue;
                },
            };

            let calls = parse_tool_calls(&text, &self.known_tools);
            if calls.is_empty() {
                context.append(EnhancedMessage::text(Role::Assistant, mint_part_id(), text.clone()));
                self.turns_completed += 1;
                self.run_hooks(context, &emit).await;
                return Ok(TurnOutcome::Completed { response: text });
            }

            let mut assistant_msg = EnhancedMessage::text(Role::Assistant, mint_part_id(), text);
            for call in &calls {
                assistant_msg.parts.push(tool_call_part(call));
            }
            context.append(assistant_msg);

            for call in calls {
                emit(StatusEvent::ToolCallStarted { id: call.id.clone(), tool: call.tool.clone() });
                let Some(def) = self.tools.get(&call.tool) else { continue };

                let decision = if self.config.auto_approve || def.permission == Permission::Safe {
                    ApprovalDecision::Approve
                } else {
                    approval(&call, def.permission)
                };

                if decision == ApprovalDecision::Deny {
                    emit(StatusEvent::ToolCallFinished { id: call.id.clone(), success: false });
                    let denial = denied_result_message(&call);
                    let response = denial.parts[0].content.clone();
                    context.append(denial);
                    self.turns_completed += 1;
                    self.run_hooks(context, &emit).await;
                    return Ok(TurnOutcome::Completed { response });
                }

                let result = self.tools.execute(&call, exec_ctx).await;
                emit(StatusEvent::ToolCallFinished { id: call.id.clone(), success: result.success });
                context.append(tool_result_message(&call, result));
            }
        }

        let warning = templates::max_iterations_warning(self.config.max_iterations);
        context.append(EnhancedMessage::text(Role::Assistant, mint_part_id(), warning));
        Ok(TurnOutcome::MaxIterations)
    }

    /// Run the `title` subagent after the first completed turn and the
    /// `summary` subagent every `summary_every_n_turns` turns (spec.md
    /// §4.K), reporting results through `emit` rather than persisting
    /// them directly — the session store is the caller's concern.
    async fn run_hooks(&self, context: &ContextManager, emit: &impl Fn(StatusEvent)) {
        if self.config.title_after_first_turn && self.turns_completed == 1 {
            let title = run_subagent(SubagentKind::Title, Arc::clone(&self.provider), &self.gate, context.messages()).await;
            emit(StatusEvent::TitleGenerated(title));
        }
        if self.config.summary_every_n_turns > 0 && self.turns_completed % u64::from(self.config.summary_every_n_turns) == 0 {
            let summary = run_subagent(SubagentKind::Summary, Arc::clone(&self.provider), &self.gate, context.messages()).await;
            emit(StatusEvent::SummaryGenerated(summary));
        }
    }

    /// Issue one streaming model request through the gate at
    /// `Priority::High`, scanning the accumulating reply with a
    /// [`StreamingFormatDetector`] and cancelling early if it crosses the
    /// abort-confidence threshold (spec.md §4.C, §4.J step 2, §9).
    async fn call_model_once(&self, system: String, messages: Vec<LegacyMessage>) -> RuntimeResult<ModelCallOutcome> {
        let provider = Arc::clone(&self.provider);
        let local_abort = self.abort.0.child_token();

        let buffer: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let detector: Arc<Mutex<StreamingFormatDetector>> = Arc::new(Mutex::new(StreamingFormatDetector::new(self.known_tools.clone())));

        let buffer_job = Arc::clone(&buffer);
        let detector_job = Arc::clone(&detector);
        let abort_job = local_abort.clone();

        let job: GateJob = Box::pin(async move {
            let options = ChatOptions { stream: true, abort: Some(abort_job.clone()), ..ChatOptions::default() };
            let mut on_chunk = move |chunk: &str| {
                let Ok(mut buf) = buffer_job.lock() else { return };
                buf.push_str(chunk);
                let snapshot = buf.clone();
                drop(buf);
                let Ok(mut det) = detector_job.lock() else { return };
                if det.scan(&snapshot) {
                    abort_job.cancel();
                }
            };
            provider.chat(&system, &messages, &options, Some(&mut on_chunk)).await
        });

        match self.gate.submit(Priority::High, job).await {
            Ok(text) => Ok(ModelCallOutcome::Completed(text)),
            Err(LlmError::Aborted) if self.abort.is_cancelled() => Ok(ModelCallOutcome::Interrupted),
            Err(LlmError::Aborted) => {
                let snippet = buffer.lock().map(|b| b.clone()).unwrap_or_default();
                Ok(ModelCallOutcome::Malformed(snippet))
            },
            Err(other) => Err(RuntimeError::from(other)),
        }
    }
}

/// Split a context view into the system prompt text (if the first
/// message is system-role) and the remaining transport messages.
fn split_system(view: Vec<LegacyMessage>) -> (String, Vec<LegacyMessage>) {
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

fn tool_call_part(call: &ToolCall) -> Part {
    Part {
        id: call.id.clone(),
        kind: PartKind::ToolCall,
        content: serde_json::json!({"tool": call.tool, "parameters": call.parameters}).to_string(),
        ignored: false,
        meta: PartMeta {
            tool_name: Some(call.tool.clone()),
            tool_arguments: Some(Value::Object(call.parameters.clone().into_iter().collect())),
            ..PartMeta::default()
        },
    }
}

fn denied_result_message(call: &ToolCall) -> EnhancedMessage {
    EnhancedMessage {
        role: Role::User,
        parts: vec![Part {
            id: mint_part_id(),
            kind: PartKind::ToolResult,
            content: "PERMISSION_DENIED: operator declined this tool call".to_string(),
            ignored: false,
            meta: PartMeta {
                call_id: Some(call.id.clone()),
                success: Some(false),
                tool_name: Some(call.tool.clone()),
                ..PartMeta::default()
            },
        }],
    }
}

fn tool_result_message(call: &ToolCall, result: ggcode_core::tool::ToolResult) -> EnhancedMessage {
    let content = result.output.or(result.error).unwrap_or_default();
    EnhancedMessage {
        role: Role::User,
        parts: vec![Part {
            id: mint_part_id(),
            kind: PartKind::ToolResult,
            content,
            ignored: false,
            meta: PartMeta {
                call_id: Some(call.id.clone()),
                success: Some(result.success),
                duration_ms: Some(u64::try_from(result.metadata.duration_ms.max(0)).unwrap_or(0)),
                truncated: result.metadata.truncated,
                tool_name: Some(call.tool.clone()),
                ..PartMeta::default()
            },
        }],
    }
}

fn mint_part_id() -> String {
    use rand::Rng;
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::thread_rng().sample_iter(rand::distributions::Alphanumeric).take(9).map(char::from).collect();
    format!("msg_{timestamp}_{suffix}")
}
