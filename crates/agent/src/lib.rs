//! The orchestration loop, the heart of toolbridge.
//!
//! One round takes a single user utterance to a committed answer:
//!
//! 1. **Augment** the utterance with retrieved context (best-effort)
//! 2. **Reason** over the persisted transcript plus the working turns
//! 3. **If tool requests**: invoke the whole batch concurrently, append the
//!    results in request order, loop back to step 2
//! 4. **If text**: commit the raw utterance and the answer to the session
//!
//! Intermediate assistant and tool-result turns never leave the round. The
//! loop is bounded by a tool-round cap and a wall-clock budget, and a closed
//! session cancels it at the next suspension point.

pub mod loop_runner;
pub mod session;

pub use loop_runner::{OrchestrationLoop, RoundOutcome, RoundState};
pub use session::{ConversationState, Session};
