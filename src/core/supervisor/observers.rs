//! Subscriber callbacks for server events.
//!
//! Callbacks run synchronously on the thread that produced the event (the
//! console reader for log lines and player events). They must return quickly
//! or hand work off elsewhere: a blocked callback stalls console ingestion.

use std::sync::{Arc, Mutex, PoisonError};

use crate::core::server::ServerState;

/// A subscriber callback. Identity is the `Arc` allocation: clone the same
/// `Arc` to unsubscribe it later.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of callbacks for one event kind.
///
/// Subscribing a callback that is already registered is ignored, so a
/// callback is invoked at most once per event and a single unsubscribe
/// removes it completely.
pub struct Observers<T: ?Sized> {
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Observers<T> {
    /// Returns `false` when the callback was already registered.
    pub fn subscribe(&self, callback: Callback<T>) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        if callbacks.iter().any(|existing| same_callback(existing, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Returns `false` when the callback was not registered.
    pub fn unsubscribe(&self, callback: &Callback<T>) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|existing| !same_callback(existing, callback));
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with `value`.
    ///
    /// Iterates over a snapshot, so callbacks may subscribe or unsubscribe
    /// (themselves included) while being notified.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in snapshot {
            callback(value);
        }
    }
}

fn same_callback<T: ?Sized>(a: &Callback<T>, b: &Callback<T>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// All observer sets of one managed server.
#[derive(Default)]
pub struct ServerObservers {
    pub state_changed: Observers<ServerState>,
    pub log_line: Observers<str>,
    pub player_joined: Observers<str>,
    pub player_left: Observers<str>,
}
