//! Execution state machine.
//!
//! ```text
//! Idle --BEGIN--> Active --document--> Active
//!                 Active --END | close--> Terminated   (finish hook)
//!                 Active --ABORT--> Terminated         (abort hook, no flush)
//! Idle --END | ABORT | close--> Terminated
//! ```

use std::fmt;

use crate::{ProtocolError, ProtocolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Active,
    Terminated,
}

/// The kinds of input that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Begin,
    Document,
    End,
    Abort,
    /// End of input, a blank line, or an unreadable frame.
    Closed,
}

/// What the session must do for an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Bind parameters and run the start hook.
    Start,
    /// Run the stage over one document and answer with its journal.
    Process,
    /// Run the finish hook.
    Finish,
    /// Run the abort hook; nothing is flushed.
    Abort,
    /// Stop without running any hook.
    Stop,
}

impl ExecutionState {
    /// Apply `frame`, returning the work it calls for.
    ///
    /// A rejected frame leaves the state unchanged.
    pub fn advance(&mut self, frame: FrameKind) -> ProtocolResult<Transition> {
        use ExecutionState::*;

        let (next, transition) = match (*self, frame) {
            (Idle, FrameKind::Begin) => (Active, Transition::Start),
            (Idle, FrameKind::End | FrameKind::Abort | FrameKind::Closed) => {
                (Terminated, Transition::Stop)
            }
            (Active, FrameKind::Document) => (Active, Transition::Process),
            (Active, FrameKind::End | FrameKind::Closed) => (Terminated, Transition::Finish),
            (Active, FrameKind::Abort) => (Terminated, Transition::Abort),
            (state, frame) => return Err(ProtocolError::InvalidTransition { state, frame }),
        };

        log::debug!("{} on {} frame -> {}", self, frame, next);
        *self = next;
        Ok(transition)
    }

    pub fn is_terminated(&self) -> bool {
        *self == ExecutionState::Terminated
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Active => "active",
            ExecutionState::Terminated => "terminated",
        })
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameKind::Begin => "BEGIN_EXECUTION",
            FrameKind::Document => "document",
            FrameKind::End => "END_EXECUTION",
            FrameKind::Abort => "ABORT_EXECUTION",
            FrameKind::Closed => "channel close",
        })
    }
}
