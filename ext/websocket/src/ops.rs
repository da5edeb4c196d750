//! `#[op2]` bindings for the guest-invoked half of the WebSocket Connection
//! Manager: `ws.send`, `ws.close`, and the read-only `ws.readyState`
//! accessor. `dispatchWebSocketOpen/Message/Close/Error` are driven by
//! `islet::FetchContext` directly (they call back into the registered guest
//! `websocket` handlers, which needs a live `deno_core::JsRuntime` handle)
//! and so are not bound here.

use std::sync::Arc;

use deno_core::op2;
use deno_core::OpState;

use crate::manager::WebSocketManager;

#[op2(fast)]
pub fn op_ws_send(state: &mut OpState, #[bigint] connection_id: u64, #[serde] data: serde_json::Value) {
    state.borrow::<Arc<WebSocketManager>>().send(connection_id, data);
}

#[op2]
pub fn op_ws_close(
    state: &mut OpState,
    #[bigint] connection_id: u64,
    code: Option<u16>,
    #[string] reason: Option<String>,
) {
    state.borrow::<Arc<WebSocketManager>>().close_connection(connection_id, code, reason);
}

#[op2(fast)]
pub fn op_ws_ready_state(state: &mut OpState, #[bigint] connection_id: u64) -> u8 {
    state
        .borrow::<Arc<WebSocketManager>>()
        .ready_state(connection_id)
        .map(|s| s as u8)
        .unwrap_or(3)
}

#[op2(fast)]
pub fn op_ws_has_active_connections(state: &mut OpState) -> bool {
    state.borrow::<Arc<WebSocketManager>>().has_active_connections()
}

deno_core::extension!(
    islet_websocket,
    ops = [op_ws_send, op_ws_close, op_ws_ready_state, op_ws_has_active_connections],
    state = |state| {
        state.put(Arc::new(WebSocketManager::new()));
    },
);
