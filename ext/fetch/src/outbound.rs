//! Outbound Fetch (C7, spec §4.7): guest `fetch(input, init?)` → host
//! `onFetch(Request)` → guest Response, preserving streams. Host networking
//! is `reqwest` (matching the teacher's `deno_fetch` dependency); the
//! abort-signal racing via `tokio::select!` is grounded on `passcod-faith`'s
//! `faith_fetch`.

use std::sync::Arc;

use bytes::Bytes;
use islet_io::StreamRegistry;
use islet_web::abort::AbortSignal;
use islet_web::body::Body;
use islet_web::error::AbortError;
use islet_web::headers::Headers;
use islet_web::response::{Response, ResponseInit};
use islet_web::streams::HostBackedReadableStream;

#[derive(Debug, thiserror::Error)]
pub enum OutboundFetchError {
    #[error(transparent)]
    Abort(#[from] AbortError),

    #[error("no onFetch hook configured and no embedder pass-through is available")]
    NoFetchHook,

    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
}

/// Embedder-configured interception point. The built-in pass-through
/// (`OnFetchHook::passthrough`) performs the request directly with
/// `reqwest`; an embedding may instead install a hook that routes through
/// its own policy (proxying, mocking, sandboxing).
pub enum OnFetchHook {
    Passthrough(reqwest::Client),
    Custom(Arc<dyn Fn(OutboundRequest) -> OutboundFuture + Send + Sync>),
}

pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

pub type OutboundFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<OutboundResponse, OutboundFetchError>> + Send>>;

pub struct OutboundResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl OnFetchHook {
    pub fn passthrough() -> Self {
        Self::Passthrough(reqwest::Client::new())
    }

    async fn dispatch(&self, request: OutboundRequest) -> Result<OutboundResponse, OutboundFetchError> {
        match self {
            OnFetchHook::Passthrough(client) => {
                let method = reqwest::Method::from_bytes(request.method.as_bytes())
                    .unwrap_or(reqwest::Method::GET);
                let mut builder = client.request(method, &request.url);
                for (name, value) in request.headers.entries() {
                    builder = builder.header(name, value);
                }
                if let Some(body) = request.body {
                    builder = builder.body(body);
                }
                let resp = builder.send().await.map_err(OutboundFetchError::Network)?;
                let status = resp.status().as_u16();
                let status_text = resp
                    .status()
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string();
                let mut headers = Headers::new();
                for (name, value) in resp.headers().iter() {
                    if let Ok(v) = value.to_str() {
                        headers.append(name.as_str(), v).ok();
                    }
                }
                let body = resp.bytes().await.map_err(OutboundFetchError::Network)?;
                Ok(OutboundResponse {
                    status,
                    status_text,
                    headers,
                    body,
                })
            }
            OnFetchHook::Custom(hook) => hook(request).await,
        }
    }
}

/// Races the request future against the abort signal, the way
/// `passcod-faith`'s `faith_fetch` races its request future against the
/// abort channel with `tokio::select!`.
pub async fn fetch(
    hook: Option<&OnFetchHook>,
    request: OutboundRequest,
    signal: Option<&AbortSignal>,
    stream_registry: &StreamRegistry,
) -> Result<Response, OutboundFetchError> {
    if let Some(signal) = signal {
        signal.throw_if_aborted()?;
    }

    let Some(hook) = hook else {
        return Err(OutboundFetchError::NoFetchHook);
    };

    let request_future = hook.dispatch(request);

    let outcome = match signal {
        Some(signal) if !signal.aborted() => {
            let abort_wait = wait_for_abort(signal);
            tokio::select! {
                result = request_future => result,
                reason = abort_wait => {
                    return Err(OutboundFetchError::Abort(AbortError { reason }));
                }
            }
        }
        _ => request_future.await,
    }?;

    let stream_id = stream_registry.create();
    stream_registry.push(stream_id, outcome.body);
    stream_registry.close(stream_id);
    let body_stream = HostBackedReadableStream::new(stream_id, stream_registry.clone());
    let content_type = outcome.headers.get("content-type");

    Ok(Response::new(
        Body::from_stream(body_stream, content_type),
        ResponseInit {
            status: outcome.status,
            status_text: outcome.status_text,
            headers: Some(outcome.headers),
        },
    ))
}

async fn wait_for_abort(signal: &AbortSignal) -> serde_json::Value {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    signal.add_listener(Box::new(move |reason| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(reason.clone());
        }
    }));
    rx.await.unwrap_or_else(|_| serde_json::json!({"name": "AbortError"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_web::abort::AbortController;

    #[tokio::test]
    async fn missing_hook_fails() {
        let registry = StreamRegistry::new();
        let request = OutboundRequest {
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: Headers::new(),
            body: None,
        };
        let result = fetch(None, request, None, &registry).await;
        assert!(matches!(result, Err(OutboundFetchError::NoFetchHook)));
    }

    #[tokio::test]
    async fn pre_aborted_signal_rejects_with_abort_error() {
        let registry = StreamRegistry::new();
        let controller = AbortController::new();
        controller.abort(None);
        let hook = OnFetchHook::passthrough();
        let request = OutboundRequest {
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: Headers::new(),
            body: None,
        };
        let result = fetch(Some(&hook), request, Some(&controller.signal()), &registry).await;
        assert!(matches!(result, Err(OutboundFetchError::Abort(_))));
    }

    #[tokio::test]
    async fn custom_hook_is_used_over_passthrough() {
        let registry = StreamRegistry::new();
        let hook = OnFetchHook::Custom(Arc::new(|_req| {
            Box::pin(async move {
                Ok(OutboundResponse {
                    status: 200,
                    status_text: "OK".into(),
                    headers: Headers::new(),
                    body: Bytes::from_static(b"mocked"),
                })
            })
        }));
        let request = OutboundRequest {
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: Headers::new(),
            body: None,
        };
        let response = fetch(Some(&hook), request, None, &registry).await.unwrap();
        assert_eq!(response.status, 200);
    }
}
