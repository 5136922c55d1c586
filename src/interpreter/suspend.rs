//! Pause, resume, step, cancel, and interrupt scripts
//!
//! [`ScriptControl`] is the handle a host keeps to steer a running script
//! from another thread. The dispatch loop checks it before each statement;
//! while paused it blocks on a condition variable, waking on every poll
//! interval to run queued interrupt scripts.

use crate::interpreter::types::CompiledScript;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ControlState {
    paused: bool,
    stepping: bool,
    cancelled: bool,
    interrupts: VecDeque<CompiledScript>,
}

#[derive(Debug, Default)]
struct ControlInner {
    state: Mutex<ControlState>,
    wake: Condvar,
}

/// Why a suspended dispatch loop woke up
#[derive(Debug)]
pub(crate) enum Wake {
    Resumed,
    TimedOut,
    Cancelled,
    Interrupt(CompiledScript),
}

/// Cloneable handle shared between the interpreter and its host
#[derive(Debug, Clone, Default)]
pub struct ScriptControl {
    inner: Arc<ControlInner>,
}

impl ScriptControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        state.stepping = false;
        self.inner.wake.notify_all();
    }

    /// Run one statement, then pause again
    pub fn step(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        state.stepping = true;
        self.inner.wake.notify_all();
    }

    /// Stop the running script at the next statement boundary
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.cancelled = true;
        state.paused = false;
        self.inner.wake.notify_all();
    }

    /// Queue a script to run while the main script is paused or delayed
    pub fn queue_interrupt(&self, script: CompiledScript) {
        self.inner.state.lock().interrupts.push_back(script);
        self.inner.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn is_stepping(&self) -> bool {
        self.inner.state.lock().stepping
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    pub(crate) fn pause_after_step(&self) {
        let mut state = self.inner.state.lock();
        if state.stepping {
            state.paused = true;
        }
    }

    /// Clear every flag and drop queued interrupts, at the end of a run
    pub(crate) fn reset(&self) {
        let mut state = self.inner.state.lock();
        *state = ControlState::default();
    }

    /// Block until resumed, cancelled, interrupted, or `deadline` passes
    ///
    /// Without a deadline the wait ends when the pause flag clears. With a
    /// deadline (the `delay` command) the pause flag is ignored.
    pub(crate) fn wait(&self, deadline: Option<Instant>, poll: Duration) -> Wake {
        let mut state = self.inner.state.lock();
        loop {
            if state.cancelled {
                return Wake::Cancelled;
            }
            if let Some(script) = state.interrupts.pop_front() {
                return Wake::Interrupt(script);
            }
            let timeout = match deadline {
                None if !state.paused => return Wake::Resumed,
                None => poll,
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        return Wake::TimedOut;
                    }
                    poll.min(at - now)
                }
            };
            self.inner.wake.wait_for(&mut state, timeout);
        }
    }
}
