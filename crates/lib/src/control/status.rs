//! Completion tokens for asynchronous puts.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::watch;

use super::errors::ControlError;

/// Callback run once when a put completes.
pub type Callback = Box<dyn FnOnce(&TaskStatus) + Send + 'static>;

struct State {
    outcome: Option<Result<(), ControlError>>,
    callbacks: Vec<Callback>,
}

struct Inner {
    state: Mutex<State>,
    done: watch::Sender<bool>,
}

/// Handle on an in-flight put.
///
/// Clones share the same underlying task. Callbacks added after completion
/// run immediately on the caller's thread.
#[derive(Clone)]
pub struct TaskStatus {
    inner: Arc<Inner>,
}

impl TaskStatus {
    pub(crate) fn pending() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                done,
            }),
        }
    }

    /// A status that is already finished with `outcome`.
    pub fn finished(outcome: Result<(), ControlError>) -> Self {
        let status = Self::pending();
        status.finish(outcome);
        status
    }

    /// Records the outcome and runs pending callbacks. Later calls are ignored.
    pub(crate) fn finish(&self, outcome: Result<(), ControlError>) {
        let callbacks = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback(self);
        }
        self.inner.done.send_replace(true);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn done(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// True once the put has completed without error.
    pub fn success(&self) -> bool {
        matches!(self.lock().outcome, Some(Ok(())))
    }

    /// The failure, if the put has completed with one.
    pub fn exception(&self) -> Option<ControlError> {
        match &self.lock().outcome {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn add_callback(&self, callback: impl FnOnce(&TaskStatus) + Send + 'static) {
        {
            let mut state = self.lock();
            if state.outcome.is_none() {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Waits for completion and returns the put's outcome.
    ///
    /// With a `timeout`, fails with [`ControlError::Timeout`] if the put is
    /// still running when it elapses. The put itself keeps running.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), ControlError> {
        let mut rx = self.inner.done.subscribe();
        let finished = rx.wait_for(|done| *done);
        match timeout {
            Some(after) => {
                // A closed channel cannot happen while `self` holds the sender
                let _ = tokio::time::timeout(after, finished)
                    .await
                    .map_err(|_| ControlError::Timeout { after })?;
            }
            None => {
                let _ = finished.await;
            }
        }
        self.lock().outcome.clone().unwrap_or(Ok(()))
    }
}

impl fmt::Debug for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.lock().outcome {
            None => "pending".to_string(),
            Some(Ok(())) => "done".to_string(),
            Some(Err(e)) => format!("errored: {e}"),
        };
        f.debug_struct("TaskStatus").field("state", &state).finish()
    }
}
