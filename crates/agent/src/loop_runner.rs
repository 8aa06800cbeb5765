//! The orchestration loop implementation.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::augment::{ContextAugmenter, merge_context};
use toolbridge_core::error::{Error, ReasoningError, Result};
use toolbridge_core::event::{DomainEvent, EventBus};
use toolbridge_core::message::{ToolCallRequest, ToolCallResult, Turn};
use toolbridge_core::reasoning::{ReasoningRequest, ReasoningService};
use toolbridge_core::tool::{ToolInvoker, ToolManifest};
use tracing::{debug, info, warn};
use crate::session::Session;

/// States a round moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    AwaitingUserInput,
    Reasoning,
    ToolsPending,
    Done,
    Failed,
}

/// What a committed round hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// The committed final answer
    pub answer: String,

    /// REASONING → TOOLS_PENDING transitions taken
    pub tool_rounds: u32,

    /// Tool invocations across all batches
    pub tool_calls: usize,
}

/// Drives one user utterance to a committed answer, calling the reasoning
/// service and the tool invoker as often as the reasoning service asks.
pub struct OrchestrationLoop {
    reasoning: Arc<dyn ReasoningService>,

    invoker: Arc<dyn ToolInvoker>,

    augmenter: Arc<dyn ContextAugmenter>,

    model: String,

    system_prompt: String,

    temperature: f32,

    max_tokens: Option<u32>,

    /// Tool batches allowed per round before the round fails
    max_tool_rounds: u32,

    /// Wall-clock budget for a whole round
    round_timeout: Duration,

    event_bus: Arc<EventBus>,
}

impl OrchestrationLoop {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        invoker: Arc<dyn ToolInvoker>,
        augmenter: Arc<dyn ContextAugmenter>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            reasoning,
            invoker,
            augmenter,
            model: model.into(),
            system_prompt: system_prompt.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_rounds: 10,
            round_timeout: Duration::from_secs(120),
            event_bus,
        }
    }

    pub fn with_max_tool_rounds(mut self, max: u32) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Run one round for `utterance` on `session`.
    ///
    /// Either the raw utterance and the final answer are both appended to the
    /// session's transcript, or nothing is. Rejected with `SessionBusy` if the
    /// session already has a round running.
    pub async fn run_round(
        &self,
        session: &Session,
        manifest: &ToolManifest,
        utterance: &str,
    ) -> Result<RoundOutcome> {
        let _gate = session.begin_round()?;
        let session_id = session.id().to_string();

        info!(
            session_id = %session_id,
            history = session.history().len(),
            tools = manifest.len(),
            "Starting round"
        );
        self.event_bus.publish(DomainEvent::RoundStarted {
            session_id: session_id.clone(),
            content_preview: utterance.chars().take(100).collect(),
            timestamp: Utc::now(),
        });

        let cancel = session.cancellation().clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            driven = tokio::time::timeout(
                self.round_timeout,
                self.drive(session, manifest, utterance),
            ) => driven.unwrap_or(Err(Error::RoundTimedOut {
                timeout_secs: self.round_timeout.as_secs(),
            })),
        };

        let result = result.and_then(|outcome| {
            session.commit(Turn::user(utterance), Turn::assistant(&outcome.answer))?;
            Ok(outcome)
        });

        match &result {
            Ok(outcome) => {
                info!(
                    session_id = %session_id,
                    tool_rounds = outcome.tool_rounds,
                    tool_calls = outcome.tool_calls,
                    "Round committed"
                );
                self.event_bus.publish(DomainEvent::RoundCommitted {
                    session_id,
                    tool_rounds: outcome.tool_rounds,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                debug!(session_id = %session_id, to = ?RoundState::Failed, "Round state transition");
                warn!(session_id = %session_id, error = %e, "Round failed, nothing committed");
                self.event_bus.publish(DomainEvent::RoundFailed {
                    session_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    /// The state machine proper. Works on a private copy of the transcript;
    /// nothing here touches the session's persisted state.
    async fn drive(
        &self,
        session: &Session,
        manifest: &ToolManifest,
        utterance: &str,
    ) -> Result<RoundOutcome> {
        let session_id = session.id().to_string();
        let mut state = RoundState::AwaitingUserInput;

        let context = self.augmenter.augment(utterance).await;
        if !context.is_empty() {
            debug!(session_id = %session_id, chars = context.len(), "Augmented utterance with context");
        }

        let mut working = session.history();
        working.push(Turn::user(merge_context(&context, utterance)));

        let tools = manifest.to_reasoning_format();
        let mut tool_rounds = 0u32;
        let mut tool_calls = 0usize;

        loop {
            transition(&session_id, &mut state, RoundState::Reasoning);

            let request = ReasoningRequest {
                model: self.model.clone(),
                system_prompt: self.system_prompt.clone(),
                conversation: working.clone(),
                tools: tools.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            let response = self.reasoning.complete(request).await?;

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_id: session_id.clone(),
                    model: response.model.clone(),
                    tokens_used: usage.total(),
                    timestamp: Utc::now(),
                });
            }

            let requests: Vec<ToolCallRequest> =
                response.tool_requests().into_iter().cloned().collect();

            if requests.is_empty() {
                let answer = response.joined_text();
                if answer.trim().is_empty() {
                    return Err(ReasoningError::MalformedResponse(
                        "final answer contains no text".into(),
                    )
                    .into());
                }
                transition(&session_id, &mut state, RoundState::Done);
                return Ok(RoundOutcome {
                    answer,
                    tool_rounds,
                    tool_calls,
                });
            }

            if tool_rounds >= self.max_tool_rounds {
                return Err(Error::LoopBoundExceeded {
                    max_tool_rounds: self.max_tool_rounds,
                });
            }
            tool_rounds += 1;

            transition(&session_id, &mut state, RoundState::ToolsPending);
            debug!(
                session_id = %session_id,
                tool_round = tool_rounds,
                batch = requests.len(),
                "Executing tool batch"
            );

            // Text blocks stay in the ephemeral assistant turn
            working.push(Turn::assistant_blocks(response.content));

            // Independent calls run concurrently; join_all keeps request order
            let results = join_all(requests.iter().map(|req| async move {
                ToolCallResult {
                    id: req.id.clone(),
                    value: self.invoker.invoke(&req.name, &req.arguments, manifest).await,
                }
            }))
            .await;

            tool_calls += results.len();
            working.push(Turn::tool_results(results));
        }
    }
}

fn transition(session_id: &str, state: &mut RoundState, next: RoundState) {
    debug!(session_id, from = ?*state, to = ?next, "Round state transition");
    *state = next;
}
