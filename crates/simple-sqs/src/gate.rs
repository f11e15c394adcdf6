//! One-shot readiness gate.
//!
//! A [`ReadinessGate`] starts pending and transitions exactly once, either to
//! ready (carrying a value) or to failed (carrying a reason). Callers that
//! [`wait`](ReadinessGate::wait) while the gate is pending are queued and
//! released in registration order when the transition happens. Once the gate
//! has transitioned, `wait` returns immediately.
//!
//! The transition is driven through a [`GateOpener`]. Dropping an opener
//! without completing it fails the gate, so a resolver task that panics or is
//! cancelled can never leave waiters suspended.

use crate::error::QueueError;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

type Waiter<T> = oneshot::Sender<Result<T, String>>;

enum GateState<T> {
    Pending(Vec<Waiter<T>>),
    Ready(T),
    Failed(String),
}

/// Shared one-shot completion cell
pub struct ReadinessGate<T> {
    state: Arc<Mutex<GateState<T>>>,
}

impl<T> Clone for ReadinessGate<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> ReadinessGate<T> {
    /// Create a pending gate and the opener that completes it
    pub fn pending() -> (Self, GateOpener<T>) {
        let gate = Self {
            state: Arc::new(Mutex::new(GateState::Pending(Vec::new()))),
        };
        let opener = GateOpener {
            gate: gate.clone(),
            completed: false,
        };
        (gate, opener)
    }

    /// Create a gate completed by `resolve` on a spawned Tokio task.
    ///
    /// Fails with a configuration error when called outside a Tokio runtime.
    pub fn spawn<F>(resolve: F) -> Result<Self, QueueError>
    where
        F: Future<Output = Result<T, QueueError>> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            crate::error::ConfigurationError::Invalid {
                message: format!("a Tokio runtime is required to resolve the endpoint: {}", e),
            }
        })?;

        let (gate, opener) = Self::pending();
        handle.spawn(async move {
            match resolve.await {
                Ok(value) => opener.open(value),
                Err(e) => opener.fail(e.to_string()),
            }
        });
        Ok(gate)
    }

    /// Wait until the gate is ready and return its value.
    ///
    /// Fails with `BackendUnavailable` if the gate failed or its opener was
    /// dropped.
    pub async fn wait(&self) -> Result<T, QueueError> {
        let receiver = {
            let mut state = self.lock();
            match &mut *state {
                GateState::Ready(value) => return Ok(value.clone()),
                GateState::Failed(reason) => return Err(unavailable(reason)),
                GateState::Pending(waiters) => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    receiver
                }
            }
        };

        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(unavailable(&reason)),
            Err(_) => Err(unavailable("readiness gate was dropped")),
        }
    }

    /// Check if the gate has transitioned to ready
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), GateState::Ready(_))
    }

    /// Check if the gate has transitioned to failed
    pub fn is_failed(&self) -> bool {
        matches!(&*self.lock(), GateState::Failed(_))
    }

    /// Number of callers currently suspended on the gate
    pub fn pending_waiters(&self) -> usize {
        match &*self.lock() {
            GateState::Pending(waiters) => waiters.len(),
            _ => 0,
        }
    }

    fn complete(&self, outcome: Result<T, String>) {
        let waiters = {
            let mut state = self.lock();
            let next = match &outcome {
                Ok(value) => GateState::Ready(value.clone()),
                Err(reason) => GateState::Failed(reason.clone()),
            };
            match std::mem::replace(&mut *state, next) {
                GateState::Pending(waiters) => waiters,
                // Already transitioned; the first outcome stands
                previous => {
                    *state = previous;
                    return;
                }
            }
        };

        // Registration order is release order
        for waiter in waiters {
            // Waiters that gave up have dropped their receiver
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle that completes a [`ReadinessGate`] exactly once
pub struct GateOpener<T: Clone + Send + 'static> {
    gate: ReadinessGate<T>,
    completed: bool,
}

impl<T: Clone + Send + 'static> GateOpener<T> {
    /// Transition the gate to ready and release all waiters
    pub fn open(mut self, value: T) {
        self.completed = true;
        self.gate.complete(Ok(value));
    }

    /// Transition the gate to failed and fail all waiters
    pub fn fail(mut self, reason: impl Into<String>) {
        self.completed = true;
        self.gate.complete(Err(reason.into()));
    }
}

impl<T: Clone + Send + 'static> Drop for GateOpener<T> {
    fn drop(&mut self) {
        if !self.completed {
            self.gate
                .complete(Err("endpoint resolution was abandoned".to_string()));
        }
    }
}

fn unavailable(reason: &str) -> QueueError {
    QueueError::BackendUnavailable {
        message: format!("endpoint resolution failed: {}", reason),
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
