//! `#[op2]` bindings exposing the `StreamRegistry` to guest code. State is
//! kept in `OpState` as a plain `StreamRegistry` (itself `Arc<Mutex<..>>`),
//! not behind the resource table, since rows are identified by the registry's
//! own `StreamId` rather than by a `deno_core::Resource` handle.

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::op2;
use deno_core::OpState;
use deno_error::JsErrorBox;

use crate::registry::{ErrorValue, PullOutcome, StreamId, StreamRegistry};

fn registry(state: &Rc<RefCell<OpState>>) -> StreamRegistry {
    state
        .borrow()
        .borrow::<StreamRegistry>()
        .clone()
}

#[op2(fast)]
#[bigint]
pub fn op_stream_create(state: &mut OpState) -> u64 {
    state.borrow::<StreamRegistry>().create()
}

#[op2(fast)]
pub fn op_stream_push(state: &mut OpState, #[bigint] id: u64, #[buffer] chunk: &[u8]) -> bool {
    state
        .borrow::<StreamRegistry>()
        .push(id, bytes::Bytes::copy_from_slice(chunk))
}

#[op2(fast)]
pub fn op_stream_close(state: &mut OpState, #[bigint] id: u64) {
    state.borrow::<StreamRegistry>().close(id);
}

#[op2(fast)]
pub fn op_stream_error(
    state: &mut OpState,
    #[bigint] id: u64,
    #[serde] value: serde_json::Value,
) {
    state
        .borrow::<StreamRegistry>()
        .error(id, ErrorValue::opaque(value));
}

#[op2(fast)]
pub fn op_stream_is_queue_full(state: &mut OpState, #[bigint] id: u64) -> bool {
    state.borrow::<StreamRegistry>().is_queue_full(id)
}

#[op2(fast)]
pub fn op_stream_delete(state: &mut OpState, #[bigint] id: u64) {
    state.borrow::<StreamRegistry>().delete(id);
}

#[op2(fast)]
pub fn op_stream_cancel(state: &mut OpState, #[bigint] id: u64) {
    state.borrow::<StreamRegistry>().cancel(id);
}

/// Resolves to `{ chunk, done }` via the `#[serde]` return below: `chunk` is
/// `null` once `done` is true, carrying the opaque error value (if any) in a
/// subsequent `op_stream_error`-raised rejection instead of this op's return,
/// mirroring guest-side `{value, done}` / thrown-error shapes.
#[derive(Debug, serde::Serialize)]
pub struct PullResult {
    pub chunk: Option<serde_bytes::ByteBuf>,
    pub done: bool,
}

#[op2(async)]
#[serde]
pub async fn op_stream_pull(
    state: Rc<RefCell<OpState>>,
    #[bigint] id: StreamId,
) -> Result<PullResult, JsErrorBox> {
    let reg = registry(&state);
    match reg.pull(id).await {
        PullOutcome::Chunk(bytes) => Ok(PullResult {
            chunk: Some(serde_bytes::ByteBuf::from(bytes.to_vec())),
            done: false,
        }),
        PullOutcome::Done => Ok(PullResult {
            chunk: None,
            done: true,
        }),
        PullOutcome::Err(value) => Err(JsErrorBox::generic(value.to_string())),
    }
}

deno_core::extension!(
    islet_io,
    ops = [
        op_stream_create,
        op_stream_push,
        op_stream_close,
        op_stream_error,
        op_stream_is_queue_full,
        op_stream_delete,
        op_stream_cancel,
        op_stream_pull,
    ],
    state = |state| {
        state.put(StreamRegistry::new());
    },
);
