//! The cache slot state machine.
//!
//! A [`Slot`] holds one independently cached artifact. Its payload lives
//! inside the state, so a value exists exactly when the slot is VALID and a
//! cause exists exactly when it is in ERROR.
//!
//! Legal transitions:
//!
//! ```text
//! INVALID --mark_in_process--> IN_PROCESS --mark_valid--> VALID --flush--> FLUSHED
//!                                         --mark_error--> ERROR
//! any --invalidate--> INVALID
//! ```
//!
//! Starting a computation hands out a [`Ticket`]. Invalidating a slot bumps
//! its generation, so a result computed against an older generation is
//! rejected by [`Slot::commit`] instead of overwriting newer state.

use ember_common::{EmberResult, InternalError};

use crate::error::AnalysisFailure;
use crate::state::CacheState;

#[derive(Debug, Clone)]
enum SlotState<T> {
    Invalid,
    InProcess,
    Valid(T),
    Flushed,
    Error(AnalysisFailure),
}

/// Proof that a computation of a slot was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a ticket is needed to commit the computed result"]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    /// The slot generation this ticket was issued for.
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// One independently valid or invalid cached artifact.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    state: SlotState<T>,
    generation: u64,
}

impl<T> Slot<T> {
    /// Creates an INVALID slot.
    pub fn new() -> Self {
        Self {
            state: SlotState::Invalid,
            generation: 0,
        }
    }

    /// Returns the current state. Never blocks or computes anything.
    pub fn state(&self) -> CacheState {
        match self.state {
            SlotState::Invalid => CacheState::Invalid,
            SlotState::InProcess => CacheState::InProcess,
            SlotState::Valid(_) => CacheState::Valid,
            SlotState::Flushed => CacheState::Flushed,
            SlotState::Error(_) => CacheState::Error,
        }
    }

    /// Returns the cached value if the slot is VALID.
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            SlotState::Valid(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the cached failure if the slot is in ERROR.
    pub fn cause(&self) -> Option<&AnalysisFailure> {
        match &self.state {
            SlotState::Error(cause) => Some(cause),
            _ => None,
        }
    }

    /// Returns `true` if the slot is VALID.
    pub fn is_valid(&self) -> bool {
        matches!(self.state, SlotState::Valid(_))
    }

    /// Returns `true` if the value has to be (re)computed before use.
    pub fn needs_computation(&self) -> bool {
        matches!(self.state, SlotState::Invalid | SlotState::Flushed)
    }

    /// Returns the current generation. It changes every time the slot is
    /// invalidated from a non-INVALID state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks the slot as stale, discarding any value or cause.
    ///
    /// Always legal and idempotent. Invalidating an IN_PROCESS slot makes the
    /// outstanding ticket stale.
    pub fn invalidate(&mut self) {
        if !matches!(self.state, SlotState::Invalid) {
            self.state = SlotState::Invalid;
            self.generation += 1;
        }
    }

    /// Records that a computation of this slot has started.
    ///
    /// Only legal from INVALID. Any other state means two computations of the
    /// same artifact overlap, or a FLUSHED/VALID slot was not invalidated
    /// first.
    pub fn mark_in_process(&mut self) -> EmberResult<Ticket> {
        match self.state {
            SlotState::Invalid => {
                self.state = SlotState::InProcess;
                Ok(Ticket {
                    generation: self.generation,
                })
            }
            _ => Err(self.illegal("mark_in_process")),
        }
    }

    /// Stores a computed value. Only legal from IN_PROCESS.
    pub fn mark_valid(&mut self, value: T) -> EmberResult<()> {
        match self.state {
            SlotState::InProcess => {
                self.state = SlotState::Valid(value);
                Ok(())
            }
            _ => Err(self.illegal("mark_valid")),
        }
    }

    /// Stores the cause of a failed computation. Only legal from IN_PROCESS.
    pub fn mark_error(&mut self, cause: AnalysisFailure) -> EmberResult<()> {
        match self.state {
            SlotState::InProcess => {
                self.state = SlotState::Error(cause);
                Ok(())
            }
            _ => Err(self.illegal("mark_error")),
        }
    }

    /// Returns `true` if `ticket` belongs to the computation currently in
    /// process.
    pub fn accepts(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation && matches!(self.state, SlotState::InProcess)
    }

    /// Stores the outcome of the computation that `ticket` was issued for.
    ///
    /// Returns `false` and drops the outcome if the slot has been invalidated
    /// since the ticket was issued.
    pub fn commit(&mut self, ticket: Ticket, outcome: Result<T, AnalysisFailure>) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.state = match outcome {
            Ok(value) => SlotState::Valid(value),
            Err(cause) => SlotState::Error(cause),
        };
        true
    }

    /// Gives up an IN_PROCESS computation without storing anything.
    ///
    /// Returns `true` if the slot was IN_PROCESS.
    pub fn abandon(&mut self) -> bool {
        if matches!(self.state, SlotState::InProcess) {
            self.invalidate();
            true
        } else {
            false
        }
    }

    /// Evicts a VALID value. No-op in every other state.
    ///
    /// Returns `true` if a value was discarded.
    pub fn flush(&mut self) -> bool {
        if matches!(self.state, SlotState::Valid(_)) {
            self.state = SlotState::Flushed;
            true
        } else {
            false
        }
    }

    fn illegal(&self, transition: &str) -> InternalError {
        InternalError::new(format!(
            "illegal slot transition `{transition}` from {}",
            self.state()
        ))
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}
