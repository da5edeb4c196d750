//! `#[op2]` bindings for the host-facing half of the Serve Dispatcher.
//! `dispatchRequest` itself is driven by `islet::FetchContext` (it needs a
//! `deno_core::JsRuntime` handle to call back into the registered guest
//! `fetch` function, which lives one layer up in the `runtime` crate); this
//! module exposes the observer surface guest code and the host both need
//! synchronously.

use std::sync::Arc;

use deno_core::op2;
use deno_core::OpState;

use crate::dispatcher::ServeDispatcher;

#[op2(fast)]
pub fn op_serve_has_handler(state: &mut OpState) -> bool {
    state.borrow::<Arc<ServeDispatcher>>().has_serve_handler()
}

#[op2(fast)]
#[bigint]
pub fn op_serve_take_upgrade_request(state: &mut OpState) -> Option<u64> {
    state.borrow::<Arc<ServeDispatcher>>().take_upgrade_request()
}

deno_core::extension!(
    islet_http,
    ops = [op_serve_has_handler, op_serve_take_upgrade_request],
    state = |state| {
        state.put(Arc::new(ServeDispatcher::new()));
    },
);
