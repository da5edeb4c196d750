//! Wires the `islet_io`, `islet_web`, `islet_fetch`, `islet_http`, and
//! `islet_websocket` extensions into a single `deno_core::JsRuntime` and
//! exposes the host-side control surface (`FetchContext`) that the embedder
//! drives: registering a `serve` handler, dispatching inbound requests,
//! running outbound `fetch()`, and pumping WebSocket connection events.

use std::sync::Arc;

use deno_core::JsRuntime;
use deno_core::RuntimeOptions;
use islet_fetch::outbound::OnFetchHook;
use islet_fetch::marshal::Marshaller;
use islet_http::dispatcher::{DispatchError, DispatchOptions, DispatchOutcome, FetchHandler, ServeDispatcher};
use islet_io::StreamRegistry;
use islet_web::abort::AbortSignal;
use islet_web::request::Request;
use islet_websocket::manager::{Command, WebSocketHandlers, WebSocketManager};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("extension state missing: {0}")]
    MissingState(&'static str),
}

/// Handler bundle an embedder supplies up front; `setup_fetch` registers
/// whichever of these were provided, mirroring `serve({fetch, websocket})`.
#[derive(Default)]
pub struct FetchContextOptions {
    pub on_fetch: Option<Arc<OnFetchHook>>,
    pub on_serve: Option<FetchHandler>,
    pub websocket_handlers: Option<WebSocketHandlers>,
    pub high_water_mark: Option<usize>,
    pub max_queue_chunks: Option<usize>,
}

/// Builds the `JsRuntime` extension set. Call before `JsRuntime::new` and
/// pass the result as `RuntimeOptions.extensions`.
pub fn extensions() -> Vec<deno_core::Extension> {
    vec![
        islet_io::islet_io::init(),
        islet_web::islet_web::init(),
        islet_fetch::islet_fetch::init(),
        islet_http::islet_http::init(),
        islet_websocket::islet_websocket::init(),
    ]
}

pub fn runtime_options() -> RuntimeOptions {
    RuntimeOptions { extensions: extensions(), ..Default::default() }
}

/// The host-side handle returned by `setup_fetch`. Holds `Arc` clones of
/// the state each extension already put into the runtime's `OpState`, so
/// calling its methods does not require holding the `JsRuntime` borrow.
pub struct FetchContext {
    dispatcher: Arc<ServeDispatcher>,
    websockets: Arc<WebSocketManager>,
    stream_registry: StreamRegistry,
    marshaller: Arc<Marshaller>,
    on_fetch: Option<Arc<OnFetchHook>>,
}

impl FetchContext {
    pub fn has_serve_handler(&self) -> bool {
        self.dispatcher.has_serve_handler()
    }

    pub fn has_websocket_handler(&self) -> bool {
        self.dispatcher.has_websocket_handler()
    }

    pub fn has_active_connections(&self) -> bool {
        self.websockets.has_active_connections()
    }

    pub fn get_upgrade_request(&self) -> Option<u64> {
        self.dispatcher.take_upgrade_request()
    }

    pub async fn dispatch_request(
        &self,
        request: Request,
        is_upgrade_request: bool,
        signal: Option<AbortSignal>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let outcome = self
            .dispatcher
            .dispatch_request(request, is_upgrade_request, DispatchOptions { signal })
            .await?;
        if let DispatchOutcome::Upgrade { connection_id, .. } = &outcome {
            self.websockets.register_connection(*connection_id, serde_json::Value::Null);
        }
        Ok(outcome)
    }

    pub fn dispatch_websocket_open(&self, connection_id: u64) {
        self.websockets.dispatch_open(connection_id);
    }

    pub fn dispatch_websocket_message(&self, connection_id: u64, data: serde_json::Value) {
        self.websockets.dispatch_message(connection_id, data);
    }

    pub fn dispatch_websocket_close(&self, connection_id: u64, code: Option<u16>, reason: Option<String>) {
        self.websockets.dispatch_close(connection_id, code, reason);
    }

    pub fn dispatch_websocket_error(&self, connection_id: u64, error: serde_json::Value) {
        self.websockets.dispatch_error(connection_id, error);
    }

    pub fn on_websocket_command(&self, listener: Box<dyn Fn(&Command) + Send + Sync>) {
        self.websockets.on_command(listener);
    }

    pub async fn fetch(
        &self,
        request: islet_fetch::outbound::OutboundRequest,
        signal: Option<&AbortSignal>,
    ) -> Result<islet_web::response::Response, islet_fetch::outbound::OutboundFetchError> {
        islet_fetch::outbound::fetch(self.on_fetch.as_deref(), request, signal, &self.stream_registry).await
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    /// Tears down all live state: rejects any pending stream pulls,
    /// forgets the host/guest identity tables, and drops tracked
    /// connections. Call once the embedding `JsRuntime` is being disposed.
    pub fn dispose(&self) {
        self.stream_registry.clear();
        self.marshaller.clear_all();
    }
}

/// Registers the bundled extensions' state and the embedder-supplied
/// handlers. `runtime` must already have been constructed with
/// `runtime_options()`'s extensions (or an equivalent set) so the
/// `OpState` entries this pulls out actually exist.
pub fn setup_fetch(runtime: &mut JsRuntime, options: FetchContextOptions) -> Result<FetchContext, SetupError> {
    let op_state = runtime.op_state();
    let mut state = op_state.borrow_mut();

    let dispatcher = state
        .try_borrow::<Arc<ServeDispatcher>>()
        .ok_or(SetupError::MissingState("ServeDispatcher"))?
        .clone();
    if let Some(handler) = options.on_serve {
        dispatcher.register(handler, options.websocket_handlers.is_some());
    }

    let websockets = state
        .try_borrow::<Arc<WebSocketManager>>()
        .ok_or(SetupError::MissingState("WebSocketManager"))?
        .clone();
    if let Some(handlers) = options.websocket_handlers {
        websockets.set_handlers(handlers);
    }

    if options.high_water_mark.is_some() || options.max_queue_chunks.is_some() {
        let hwm = options.high_water_mark.unwrap_or(islet_io::HIGH_WATER_MARK);
        let max_chunks = options.max_queue_chunks.unwrap_or(islet_io::MAX_QUEUE_CHUNKS);
        state.put(StreamRegistry::with_limits(hwm, max_chunks));
    }
    let stream_registry = state
        .try_borrow::<StreamRegistry>()
        .ok_or(SetupError::MissingState("StreamRegistry"))?
        .clone();

    if !state.has::<Arc<Marshaller>>() {
        state.put(Arc::new(Marshaller::default()));
    }
    let marshaller = state.borrow::<Arc<Marshaller>>().clone();

    if let Some(hook) = &options.on_fetch {
        state.put(hook.clone());
    }

    Ok(FetchContext { dispatcher, websockets, stream_registry, marshaller, on_fetch: options.on_fetch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_web::body::Body;
    use islet_web::request::RequestInit;
    use islet_web::response::{Response, ResponseInit};

    fn request() -> Request {
        Request::new("http://t/", RequestInit { method: None, headers: None, body: None, signal: None }).unwrap()
    }

    #[tokio::test]
    async fn setup_registers_serve_handler_and_dispatches() {
        let mut runtime = JsRuntime::new(runtime_options());
        let ctx = setup_fetch(
            &mut runtime,
            FetchContextOptions {
                on_serve: Some(Arc::new(|_req, _server| {
                    Box::pin(async move { Ok(Response::new(Body::empty(), ResponseInit::default())) })
                })),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(ctx.has_serve_handler());
        let outcome = ctx.dispatch_request(request(), false, None).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Response(_)));
    }

    #[tokio::test]
    async fn upgrade_registers_websocket_connection() {
        let mut runtime = JsRuntime::new(runtime_options());
        let ctx = setup_fetch(
            &mut runtime,
            FetchContextOptions {
                on_serve: Some(Arc::new(|_req, server| {
                    Box::pin(async move {
                        server.upgrade(true);
                        Ok(Response::new(Body::empty(), ResponseInit::default()))
                    })
                })),
                websocket_handlers: Some(WebSocketHandlers::default()),
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = ctx.dispatch_request(request(), true, None).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Upgrade { .. }));
        assert!(ctx.get_upgrade_request().is_some());
        let DispatchOutcome::Upgrade { connection_id, .. } = outcome else { unreachable!() };
        ctx.dispatch_websocket_open(connection_id);
        assert!(ctx.has_active_connections());
    }

    #[tokio::test]
    async fn websocket_echo_end_to_end() {
        let mut runtime = JsRuntime::new(runtime_options());
        let ctx = setup_fetch(
            &mut runtime,
            FetchContextOptions {
                websocket_handlers: Some(WebSocketHandlers {
                    open: None,
                    message: Some(Box::new(|ws, data| {
                        let text = data.as_str().unwrap_or_default();
                        ws.send(serde_json::Value::String(format!("Echo: {text}")));
                    })),
                    close: None,
                    error: None,
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        ctx.on_websocket_command(Box::new(move |cmd| seen2.lock().push(cmd.clone())));
        ctx.websockets.register_connection(7, serde_json::Value::Null);
        ctx.dispatch_websocket_open(7);
        ctx.dispatch_websocket_message(7, serde_json::Value::String("Hello".into()));
        let seen = seen.lock();
        match &seen[0] {
            Command::Message { data, .. } => assert_eq!(data, &serde_json::Value::String("Echo: Hello".into())),
            _ => panic!("expected an echoed message command"),
        }
    }

    #[tokio::test]
    async fn dispose_clears_stream_registry() {
        let mut runtime = JsRuntime::new(runtime_options());
        let ctx = setup_fetch(&mut runtime, FetchContextOptions::default()).unwrap();
        let id = ctx.stream_registry.create();
        assert_eq!(ctx.stream_registry.len(), 1);
        ctx.dispose();
        assert_eq!(ctx.stream_registry.len(), 0);
        let _ = id;
    }
}
