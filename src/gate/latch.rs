use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::ScreenScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateState {
    pub fired: bool,
}

/// One-shot latch: the first qualifying call wins, every later call is a no-op.
///
/// There is no reset. Re-arming means building a new gate together with a new
/// screen session.
#[derive(Debug, Default)]
pub struct TransitionGate {
    fired: AtomicBool,
}

impl TransitionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for exactly one caller whose `condition` holds.
    pub fn try_fire(&self, condition: bool) -> bool {
        condition
            && self
                .fired
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Run `action` if this call wins the latch.
    pub fn fire<T>(&self, condition: bool, action: impl FnOnce() -> T) -> Option<T> {
        if self.try_fire(condition) {
            Some(action())
        } else {
            None
        }
    }

    /// Win the latch and schedule `action` on `scope` after `delay`.
    ///
    /// The timer belongs to the scope, so closing the scope before the delay
    /// elapses means `action` never runs.
    pub fn fire_after<F>(&self, condition: bool, scope: &ScreenScope, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.try_fire(condition) {
            return false;
        }
        scope.schedule(delay, action);
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn state(&self) -> GateState {
        GateState {
            fired: self.has_fired(),
        }
    }
}
