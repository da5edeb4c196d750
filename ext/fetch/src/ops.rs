//! `#[op2]` binding exposing outbound `fetch` to the guest. The heavy
//! lifting (hook dispatch, abort racing, response marshalling) is
//! `outbound::fetch`; this op just adapts it to `OpState`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use deno_core::op2;
use deno_core::OpState;
use deno_error::JsErrorBox;
use islet_io::StreamRegistry;
use islet_web::ops::AbortSignalResource;

use crate::outbound::{fetch, OnFetchHook, OutboundRequest};

#[derive(serde::Deserialize)]
pub struct FetchArgs {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(serde::Serialize)]
pub struct FetchResult {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub stream_id: u64,
}

#[op2(async)]
#[serde]
pub async fn op_fetch_dispatch(
    state: Rc<RefCell<OpState>>,
    #[serde] args: FetchArgs,
    #[cppgc] signal: Option<&AbortSignalResource>,
) -> Result<FetchResult, JsErrorBox> {
    let (hook, registry) = {
        let state = state.borrow();
        (
            state.try_borrow::<Arc<OnFetchHook>>().cloned(),
            state.borrow::<StreamRegistry>().clone(),
        )
    };

    let mut headers = islet_web::headers::Headers::new();
    for (name, value) in args.headers {
        headers
            .append(&name, &value)
            .map_err(|e| JsErrorBox::type_error(e.to_string()))?;
    }

    let request = OutboundRequest {
        method: args.method,
        url: args.url,
        headers,
        body: args.body.map(bytes::Bytes::from),
    };

    let response = fetch(hook.as_deref(), request, signal.map(|s| &s.0), &registry)
        .await
        .map_err(|e| JsErrorBox::generic(e.to_string()))?;

    let stream_id = response.body.stream_id().unwrap_or_default();

    Ok(FetchResult {
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.entries(),
        stream_id,
    })
}

// `StreamRegistry` is owned by `islet_io`; this extension must be composed
// after it so the registry `op_fetch_dispatch` reads is the same one
// `islet_io`'s stream ops operate on, not a second disconnected instance.
deno_core::extension!(islet_fetch, ops = [op_fetch_dispatch]);
