//! Serve Dispatcher (C6, spec §4.6): `serve({fetch, websocket?})`
//! registration and the six-step `dispatchRequest` contract. The guest
//! `fetch` handler is modeled as a boxed async closure — from the
//! dispatcher's perspective that is exactly what a guest handler is, an
//! opaque callback the boundary invokes and awaits.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use islet_web::abort::AbortSignal;
use islet_web::request::Request;
use islet_web::response::Response;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No serve() handler registered")]
    NoServeHandler,

    #[error("fetch handler did not return a Response")]
    NotAResponse,

    #[error("fetch handler rejected: {0}")]
    HandlerRejected(String),
}

/// Exposed to the guest handler as `server`; `upgrade` returns false if the
/// request is not a WebSocket upgrade (spec §4.6).
pub struct ServerHandle {
    upgrade_requested: Arc<AtomicBool>,
    connection_id: Arc<Mutex<Option<u64>>>,
    next_connection_id: Arc<AtomicU64>,
}

impl ServerHandle {
    fn new(next_connection_id: Arc<AtomicU64>) -> Self {
        Self {
            upgrade_requested: Arc::new(AtomicBool::new(false)),
            connection_id: Arc::new(Mutex::new(None)),
            next_connection_id,
        }
    }

    /// `server.upgrade(request, { data? })`. The `is_upgrade_request` flag
    /// is supplied by the caller (the host dispatcher knows whether the
    /// inbound request actually carried `Upgrade: websocket`).
    pub fn upgrade(&self, is_upgrade_request: bool) -> bool {
        if !is_upgrade_request {
            return false;
        }
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        *self.connection_id.lock() = Some(id);
        self.upgrade_requested.store(true, Ordering::Release);
        true
    }

    fn requested_upgrade(&self) -> Option<u64> {
        if self.upgrade_requested.load(Ordering::Acquire) {
            *self.connection_id.lock()
        } else {
            None
        }
    }
}

pub type FetchHandler = Arc<
    dyn Fn(Request, Arc<ServerHandle>) -> Pin<Box<dyn Future<Output = Result<Response, DispatchError>> + Send>>
        + Send
        + Sync,
>;

pub struct DispatchOptions {
    pub signal: Option<AbortSignal>,
}

pub struct ServeDispatcher {
    handler: Mutex<Option<FetchHandler>>,
    has_websocket_handler: Mutex<bool>,
    next_connection_id: Arc<AtomicU64>,
    last_upgrade: Mutex<Option<u64>>,
}

impl ServeDispatcher {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            has_websocket_handler: Mutex::new(false),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            last_upgrade: Mutex::new(None),
        }
    }

    /// `serve({fetch, websocket?})`: re-registration replaces.
    pub fn register(&self, handler: FetchHandler, has_websocket_handler: bool) {
        *self.handler.lock() = Some(handler);
        *self.has_websocket_handler.lock() = has_websocket_handler;
    }

    pub fn has_serve_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    pub fn has_websocket_handler(&self) -> bool {
        *self.has_websocket_handler.lock()
    }

    /// The six-step contract of spec §4.6.
    pub async fn dispatch_request(
        &self,
        mut request: Request,
        is_upgrade_request: bool,
        options: DispatchOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        // 1.
        let handler = self
            .handler
            .lock()
            .clone()
            .ok_or(DispatchError::NoServeHandler)?;

        // 2. Marshalling into a guest Request is the marshaller's job
        // (islet_fetch::marshal); here the Request is already constructed.
        // Mirror an abort signal onto the request if one was supplied.
        if let Some(signal) = options.signal {
            request.signal = Some(signal);
        }

        // 3.
        let server = Arc::new(ServerHandle::new(self.next_connection_id.clone()));
        let response = handler(request, server.clone()).await?;

        // 4.
        if let Some(connection_id) = server.requested_upgrade() {
            *self.last_upgrade.lock() = Some(connection_id);
            let mut response = response;
            response.mark_for_upgrade();
            return Ok(DispatchOutcome::Upgrade {
                connection_id,
                response,
            });
        }

        // 5. + 6.: the host Response streams lazily from C1 by construction
        // — `Body` never materializes a stream-sourced body eagerly.
        Ok(DispatchOutcome::Response(response))
    }

    /// `getUpgradeRequest()`: cleared after reading.
    pub fn take_upgrade_request(&self) -> Option<u64> {
        self.last_upgrade.lock().take()
    }
}

impl Default for ServeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

pub enum DispatchOutcome {
    Response(Response),
    Upgrade { connection_id: u64, response: Response },
}
