//! Five-state tuner lifecycle with internal/external transition queues
//! and the edge-triggered engine wake event (C5).

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// The tuner's lifecycle state. No terminal state — the engine loop
/// runs until the engine itself is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerState {
    Idle,
    Release,
    Set,
    Tuned,
    Locked,
}

/// Which queue a transition request targets. Internal transitions are
/// engine-generated recovery/progress steps; external transitions come
/// from consumer-thread calls like `SetSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Internal,
    External,
}

/// Dual-FIFO transition queue behind a single mutex. Internal
/// transitions strictly preempt external ones: [`Self::drain_one`]
/// always returns an internal item first if one is queued.
#[derive(Debug, Default)]
struct Queues {
    internal: VecDeque<TunerState>,
    external: VecDeque<TunerState>,
    /// Most recently *requested* internal target, used for the minimal
    /// legality check — not the machine's actual current state.
    last_internal_target: Option<TunerState>,
}

/// The tuner state machine: current state plus its transition queues.
///
/// Per the Design Notes, the only rejected request is queuing an
/// internal `Release` when the last-queued internal target was `Idle`;
/// every other transition (internal or external) queues unconditionally.
pub struct StateMachine {
    current: Mutex<TunerState>,
    queues: Mutex<Queues>,
    wake: Wake,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            current: Mutex::new(TunerState::Idle),
            queues: Mutex::new(Queues {
                last_internal_target: Some(TunerState::Idle),
                ..Queues::default()
            }),
            wake: Wake::new(),
        }
    }

    pub fn current(&self) -> TunerState {
        *self.current.lock()
    }

    /// Request a transition. Returns `false` if the internal-queue
    /// legality check rejects it (the request is dropped silently, as
    /// in the original: the caller observes no effect).
    pub fn request_state(&self, state: TunerState, kind: QueueKind) -> bool {
        let mut queues = self.queues.lock();
        match kind {
            QueueKind::Internal => {
                if queues.last_internal_target == Some(TunerState::Idle)
                    && state == TunerState::Release
                {
                    tracing::debug!(?state, "internal Release rejected from Idle");
                    return false;
                }
                queues.last_internal_target = Some(state);
                queues.internal.push_back(state);
            }
            QueueKind::External => {
                queues.external.push_back(state);
            }
        }
        drop(queues);
        self.wake.signal();
        true
    }

    /// Drain at most one transition per call: an internal item if any
    /// is queued, else one external item. Advances `current` and
    /// returns the new state, or `None` if both queues were empty.
    pub fn drain_one(&self) -> Option<TunerState> {
        let mut queues = self.queues.lock();
        let next = queues
            .internal
            .pop_front()
            .or_else(|| queues.external.pop_front())?;
        drop(queues);
        *self.current.lock() = next;
        Some(next)
    }

    /// Block until woken or `timeout` elapses. Used by the engine loop
    /// when both queues are empty.
    pub fn wait(&self, timeout: Duration) {
        self.wake.wait(timeout);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot, edge-triggered wake event: multiple `signal()` calls
/// before a `wait()` collapse into one wake, never a counted semaphore.
struct Wake {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Wake {
    fn new() -> Self {
        Wake {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn signal(&self) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            *signaled = true;
            self.condvar.notify_one();
        }
    }

    fn wait(&self, timeout: Duration) {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            self.condvar.wait_for(&mut signaled, timeout);
        }
        *signaled = false;
    }
}
