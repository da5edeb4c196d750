//! WebSocket Manager (C8, spec §4.8): per-connection state, dispatch of
//! guest `websocket.open/message/close/error` handlers, and the guest-side
//! `ws` object contract (`data`, `readyState`, `send`, `close`). The actual
//! `fastwebsockets` read/write loop lives in `crate::transport`; this module
//! only tracks state and broadcasts `Command`s to whichever transport task
//! is listening for its own `connection_id`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

/// Guest-initiated commands emitted by `ws.send`/`ws.close`, broadcast to
/// `onWebSocketCommand` listeners as they happen (spec §4.8).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Message { connection_id: u64, data: Value },
    Close { connection_id: u64, code: Option<u16>, reason: Option<String> },
}

type Listeners = Arc<Mutex<Vec<Box<dyn Fn(&Command) + Send + Sync>>>>;

struct Connection {
    data: Arc<Mutex<Value>>,
    ready_state: Arc<Mutex<ReadyState>>,
}

/// The live object passed to guest handlers and reachable from later guest
/// ops by `connection_id` alone — `data` is the same retained object across
/// the whole connection lifecycle (spec invariant: the close handler's
/// `ws.data` reflects message-handler mutations).
#[derive(Clone)]
pub struct WsHandle {
    connection_id: u64,
    data: Arc<Mutex<Value>>,
    ready_state: Arc<Mutex<ReadyState>>,
    listeners: Listeners,
}

impl WsHandle {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn data(&self) -> Value {
        self.data.lock().clone()
    }

    pub fn set_data(&self, value: Value) {
        *self.data.lock() = value;
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready_state.lock()
    }

    pub fn send(&self, message: Value) {
        broadcast(
            &self.listeners,
            &Command::Message { connection_id: self.connection_id, data: message },
        );
    }

    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        *self.ready_state.lock() = ReadyState::Closing;
        broadcast(
            &self.listeners,
            &Command::Close { connection_id: self.connection_id, code, reason },
        );
    }
}

fn broadcast(listeners: &Listeners, command: &Command) {
    for listener in listeners.lock().iter() {
        listener(command);
    }
}

#[derive(Default)]
pub struct WebSocketHandlers {
    pub open: Option<Box<dyn Fn(WsHandle) + Send + Sync>>,
    pub message: Option<Box<dyn Fn(WsHandle, Value) + Send + Sync>>,
    pub close: Option<Box<dyn Fn(WsHandle, Option<u16>, Option<String>) + Send + Sync>>,
    pub error: Option<Box<dyn Fn(WsHandle, Value) + Send + Sync>>,
}

pub struct WebSocketManager {
    connections: Mutex<HashMap<u64, Connection>>,
    handlers: Mutex<Option<Arc<WebSocketHandlers>>>,
    listeners: Listeners,
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            handlers: Mutex::new(None),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_handlers(&self, handlers: WebSocketHandlers) {
        *self.handlers.lock() = Some(Arc::new(handlers));
    }

    /// Registers a connection at upgrade time. The connection is tracked
    /// even if no `open` handler is defined (spec §4.8).
    pub fn register_connection(&self, connection_id: u64, data: Value) {
        self.connections.lock().insert(
            connection_id,
            Connection {
                data: Arc::new(Mutex::new(data)),
                ready_state: Arc::new(Mutex::new(ReadyState::Connecting)),
            },
        );
    }

    fn handle_of(&self, connection_id: u64) -> Option<WsHandle> {
        let connections = self.connections.lock();
        let conn = connections.get(&connection_id)?;
        Some(WsHandle {
            connection_id,
            data: conn.data.clone(),
            ready_state: conn.ready_state.clone(),
            listeners: self.listeners.clone(),
        })
    }

    fn current_handlers(&self) -> Option<Arc<WebSocketHandlers>> {
        self.handlers.lock().clone()
    }

    pub fn dispatch_open(&self, connection_id: u64) {
        let Some(handle) = self.handle_of(connection_id) else { return };
        *handle.ready_state.lock() = ReadyState::Open;
        if let Some(handlers) = self.current_handlers() {
            if let Some(open) = &handlers.open {
                open(handle);
            }
        }
    }

    /// Messages for an unknown or non-open connection are silently ignored
    /// (spec §4.8, §7 `UpgradeProtocolError`).
    pub fn dispatch_message(&self, connection_id: u64, data: Value) {
        let Some(handle) = self.handle_of(connection_id) else { return };
        if handle.ready_state() != ReadyState::Open {
            return;
        }
        if let Some(handlers) = self.current_handlers() {
            if let Some(message) = &handlers.message {
                message(handle, data);
            }
        }
    }

    pub fn dispatch_close(&self, connection_id: u64, code: Option<u16>, reason: Option<String>) {
        let Some(handle) = self.handle_of(connection_id) else { return };
        if let Some(handlers) = self.current_handlers() {
            if let Some(close) = &handlers.close {
                close(handle, code, reason);
            }
        }
        *handle.ready_state.lock() = ReadyState::Closed;
        self.connections.lock().remove(&connection_id);
    }

    pub fn dispatch_error(&self, connection_id: u64, error: Value) {
        let Some(handle) = self.handle_of(connection_id) else { return };
        if let Some(handlers) = self.current_handlers() {
            if let Some(on_error) = &handlers.error {
                on_error(handle, error);
            }
        }
    }

    /// Guest-driven `ws.send(message)`, looked up by `connection_id` alone
    /// since the guest call arrives as a separate op invocation, not inside
    /// a dispatch closure.
    pub fn send(&self, connection_id: u64, message: Value) {
        if let Some(handle) = self.handle_of(connection_id) {
            handle.send(message);
        }
    }

    /// Guest-driven `ws.close(code?, reason?)`.
    pub fn close_connection(&self, connection_id: u64, code: Option<u16>, reason: Option<String>) {
        if let Some(handle) = self.handle_of(connection_id) {
            handle.close(code, reason);
        }
    }

    pub fn ready_state(&self, connection_id: u64) -> Option<ReadyState> {
        self.connections.lock().get(&connection_id).map(|c| *c.ready_state.lock())
    }

    pub fn data(&self, connection_id: u64) -> Option<Value> {
        self.connections.lock().get(&connection_id).map(|c| c.data.lock().clone())
    }

    pub fn on_command(&self, listener: Box<dyn Fn(&Command) + Send + Sync>) {
        self.listeners.lock().push(listener);
    }

    pub fn has_active_connections(&self) -> bool {
        !self.connections.lock().is_empty()
    }
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}
