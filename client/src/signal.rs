//! One-shot lifecycle signals.
//!
//! Event handlers fire a [`Signal`] when an event reaches the active state;
//! the state's run routine awaits the matching [`Waiter`] in its race.
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

/// The sending half of a lifecycle signal.
///
/// Fires at most once. Later attempts are ignored,
/// as are attempts made after the receiving state has moved on.
#[derive(Debug)]
pub(crate) struct Signal<T> {
    name: &'static str,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

/// The receiving half of a lifecycle signal.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    rx: Option<oneshot::Receiver<T>>,
}

pub(crate) fn signal<T>(name: &'static str) -> (Signal<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Signal {
            name,
            sender: Mutex::new(Some(tx)),
        },
        Waiter { rx: Some(rx) },
    )
}

impl<T> Signal<T> {
    /// Fire the signal with the given value.
    ///
    /// Returns `true` if this was the first time
    /// and the receiving side was still listening.
    pub fn fire(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                if tx.send(value).is_err() {
                    tracing::trace!("Signal `{}` no longer awaited", self.name);
                    false
                } else {
                    true
                }
            }
            None => {
                tracing::trace!("Ignoring repeated signal `{}`", self.name);
                false
            }
        }
    }
}

impl<T> Waiter<T> {
    /// Wait for the signal to fire.
    ///
    /// Stays pending forever if the sending half was dropped
    /// or the value was already taken,
    /// so that a dead signal never wins a race.
    /// Dropping the returned future before completion
    /// leaves the waiter intact.
    pub async fn fired(&mut self) -> T {
        if let Some(rx) = self.rx.as_mut() {
            let outcome = rx.await;
            self.rx = None;
            if let Ok(value) = outcome {
                return value;
            }
        }
        std::future::pending().await
    }

    /// Take the value if the signal already fired.
    #[cfg(test)]
    pub fn try_take(&mut self) -> Option<T> {
        let value = self.rx.as_mut()?.try_recv().ok()?;
        self.rx = None;
        Some(value)
    }
}
