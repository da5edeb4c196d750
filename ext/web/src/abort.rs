//! `AbortController`/`AbortSignal` (spec §4.4): the controller's `signal` is
//! identity-stable, `abort(reason?)` fires a single `"abort"` event to every
//! current listener, and `throwIfAborted()` throws the stored reason.
//!
//! The "guest" in this bridge is Rust code reached through `#[op2]`/cppgc,
//! not a second JS engine with its own heap, so there is only ever one
//! `AbortSignal` value in play: `ext/http/src/dispatcher.rs` passes the same
//! `AbortSignal` it was given straight onto `Request::signal`, and
//! `ext/fetch/src/outbound.rs::fetch` races that same value against the
//! response future. No cross-heap mirroring primitive is needed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AbortError;
use crate::identity::InstanceId;

#[derive(Clone)]
struct SignalState {
    aborted: bool,
    reason: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct AbortSignal {
    id: InstanceId,
    state: Arc<Mutex<SignalState>>,
    listeners: Arc<Mutex<Vec<Box<dyn Fn(&serde_json::Value) + Send + Sync>>>>,
}

impl AbortSignal {
    fn new() -> Self {
        Self {
            id: InstanceId::next(),
            state: Arc::new(Mutex::new(SignalState {
                aborted: false,
                reason: None,
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn aborted(&self) -> bool {
        self.state.lock().aborted
    }

    pub fn reason(&self) -> Option<serde_json::Value> {
        self.state.lock().reason.clone()
    }

    pub fn throw_if_aborted(&self) -> Result<(), AbortError> {
        let state = self.state.lock();
        if state.aborted {
            Err(AbortError {
                reason: state
                    .reason
                    .clone()
                    .unwrap_or_else(default_abort_reason),
            })
        } else {
            Ok(())
        }
    }

    pub fn add_listener(&self, listener: Box<dyn Fn(&serde_json::Value) + Send + Sync>) {
        self.listeners.lock().push(listener);
    }

    fn fire(&self, reason: serde_json::Value) {
        let mut state = self.state.lock();
        if state.aborted {
            return;
        }
        state.aborted = true;
        state.reason = Some(reason.clone());
        drop(state);
        for listener in self.listeners.lock().iter() {
            listener(&reason);
        }
    }

    /// `AbortSignal.abort(reason?)`: returns an already-aborted signal.
    pub fn already_aborted(reason: Option<serde_json::Value>) -> Self {
        let signal = Self::new();
        signal.fire(reason.unwrap_or_else(default_abort_reason));
        signal
    }

    /// `AbortSignal.timeout(ms)`: the external timer collaborator drives
    /// `fire_after`, which callers schedule via their own timer integration.
    pub fn timeout_signal() -> Self {
        Self::new()
    }

    pub fn fire_timeout(&self) {
        self.fire(default_timeout_reason());
    }
}

fn default_abort_reason() -> serde_json::Value {
    serde_json::json!({ "name": "AbortError", "message": "The operation was aborted" })
}

fn default_timeout_reason() -> serde_json::Value {
    serde_json::json!({ "name": "TimeoutError", "message": "Signal timed out" })
}

pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal::new(),
        }
    }

    /// Returns the same `AbortSignal` instance on every call.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self, reason: Option<serde_json::Value>) {
        self.signal.fire(reason.unwrap_or_else(default_abort_reason));
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
