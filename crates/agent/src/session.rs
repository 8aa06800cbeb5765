//! Sessions and their persisted transcripts.
//!
//! A [`Session`] owns one [`ConversationState`]. Only the orchestration loop
//! writes to it, once per round, and only while holding the session's round
//! gate.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use toolbridge_core::error::{Error, Result};
use toolbridge_core::message::{Role, SessionId, Turn};
use tracing::debug;

/// The persisted transcript: user utterances and final answers, in order.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a finished round: the user turn followed by the final answer.
    ///
    /// Both turns are checked before either is appended.
    pub fn commit_round(&mut self, user: Turn, answer: Turn) -> Result<()> {
        if user.role() != Role::User || !user.is_persistable() {
            return Err(Error::Internal(
                "round commit expects a user turn first".into(),
            ));
        }
        if answer.role() != Role::Assistant || !answer.is_persistable() {
            return Err(Error::Internal(
                "only assistant turns with text and no tool requests can be persisted".into(),
            ));
        }

        self.turns.push(user);
        self.turns.push(answer);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }
}

/// One conversation: its transcript, a single-round gate, and a cancellation
/// token that `close()` fires.
pub struct Session {
    id: SessionId,
    state: RwLock<ConversationState>,
    round_gate: Mutex<()>,
    busy: AtomicBool,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

/// Held for the duration of one round. Dropping it frees the session.
pub(crate) struct RoundGuard<'a> {
    _gate: MutexGuard<'a, ()>,
    busy: &'a AtomicBool,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SessionId(id.into()),
            state: RwLock::new(ConversationState::new()),
            round_gate: Mutex::new(()),
            busy: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the persisted transcript.
    pub fn history(&self) -> Vec<Turn> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Clear the transcript. Rejected while a round is running.
    pub fn reset(&self) -> Result<()> {
        let _gate = self
            .round_gate
            .try_lock()
            .map_err(|_| Error::SessionBusy(self.id.to_string()))?;

        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!(session_id = %self.id, "Session transcript cleared");
        Ok(())
    }

    /// Cancel any in-flight round and refuse new ones.
    pub fn close(&self) {
        self.cancel.cancel();
        debug!(session_id = %self.id, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether a round is in flight. Never touches the gate itself.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Take the round gate, failing fast if the session is closed or busy.
    pub(crate) fn begin_round(&self) -> Result<RoundGuard<'_>> {
        if self.is_closed() {
            return Err(Error::SessionClosed(self.id.to_string()));
        }
        let gate = self
            .round_gate
            .try_lock()
            .map_err(|_| Error::SessionBusy(self.id.to_string()))?;
        self.busy.store(true, Ordering::Release);
        Ok(RoundGuard {
            _gate: gate,
            busy: &self.busy,
        })
    }

    /// Persist a finished round unless the session was closed in the meantime.
    pub(crate) fn commit(&self, user: Turn, answer: Turn) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if self.is_closed() {
            return Err(Error::Cancelled);
        }
        state.commit_round(user, answer)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbridge_core::message::{ContentBlock, ToolCallRequest, ToolCallResult};

    #[test]
    fn commit_appends_user_then_answer() {
        let mut state = ConversationState::new();
        state
            .commit_round(Turn::user("hi"), Turn::assistant("hello"))
            .unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.turns()[0].role(), Role::User);
        assert_eq!(state.turns()[1].text(), "hello");
    }

    #[test]
    fn tool_turns_never_persist() {
        let mut state = ConversationState::new();

        let tool_request = Turn::assistant_blocks(vec![ContentBlock::ToolUse(ToolCallRequest {
            id: "t1".into(),
            name: "calculate_margin".into(),
            arguments: serde_json::json!({}),
        })]);
        assert!(state.commit_round(Turn::user("q"), tool_request).is_err());

        let tool_result = Turn::tool_results(vec![ToolCallResult {
            id: "t1".into(),
            value: serde_json::json!({"margin": 25.0}),
        }]);
        assert!(state.commit_round(Turn::user("q"), tool_result).is_err());

        assert!(state.commit_round(Turn::user("q"), Turn::assistant("  ")).is_err());
        assert!(state.is_empty());
    }

    #[test]
    fn reset_is_idempotent() {
        let session = Session::new("s1");
        session
            .commit(Turn::user("a"), Turn::assistant("b"))
            .unwrap();
        assert_eq!(session.history().len(), 2);

        session.reset().unwrap();
        session.reset().unwrap();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn second_round_is_rejected_while_busy() {
        let session = Session::new("s1");
        let gate = session.begin_round().unwrap();
        assert!(session.is_busy());
        assert!(matches!(session.begin_round(), Err(Error::SessionBusy(_))));
        assert!(matches!(session.reset(), Err(Error::SessionBusy(_))));

        drop(gate);
        assert!(!session.is_busy());
        assert!(session.begin_round().is_ok());
    }

    #[test]
    fn busy_check_never_blocks_an_idle_session() {
        let session = std::sync::Arc::new(Session::new("s1"));
        let stop = std::sync::Arc::new(AtomicBool::new(false));

        let watcher = {
            let session = session.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let _ = session.is_busy();
                }
            })
        };

        for _ in 0..20_000 {
            let guard = session.begin_round().unwrap();
            drop(guard);
        }
        stop.store(true, Ordering::Relaxed);
        watcher.join().unwrap();
        assert!(!session.is_busy());
    }

    #[test]
    fn closed_session_refuses_rounds_and_commits() {
        let session = Session::new("s1");
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.begin_round(), Err(Error::SessionClosed(_))));
        assert!(matches!(
            session.commit(Turn::user("a"), Turn::assistant("b")),
            Err(Error::Cancelled)
        ));
        assert!(session.history().is_empty());
    }
}
