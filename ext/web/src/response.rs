//! `Response` (spec §3, §4.4), including the upgrade sentinel used by
//! `islet_http`'s dispatcher (spec §4.6, §6, §9 "Upgrade status 101").

use std::sync::OnceLock;

use bytes::Bytes;

use crate::body::Body;
use crate::headers::Headers;
use crate::identity::InstanceId;
use crate::streams::HostBackedReadableStream;

pub struct ResponseInit {
    pub status: u16,
    pub status_text: String,
    pub headers: Option<Headers>,
}

impl Default for ResponseInit {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: String::new(),
            headers: None,
        }
    }
}

/// A cheap handle clone sharing the same `Body` state (used by the
/// marshaller's round-trip tables); `OnceLock`'s own `Clone` impl carries
/// over an already-cached `body_shim` so the identity invariant still holds
/// on the clone.
#[derive(Clone)]
pub struct Response {
    id: InstanceId,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Body,
    pub response_type: &'static str,
    pub redirected: bool,
    pub url: String,
    /// Non-enumerable in the spec's JS terms: a field the public `status()`
    /// getter omits, read directly by `islet_http`'s dispatcher to detect a
    /// WebSocket upgrade (spec §4.6, §9).
    original_status: Option<u16>,
    body_shim: OnceLock<HostBackedReadableStream>,
}

impl Response {
    pub fn new(body: Body, init: ResponseInit) -> Self {
        Self {
            id: InstanceId::next(),
            status: init.status,
            status_text: init.status_text,
            headers: init.headers.unwrap_or_default(),
            body,
            response_type: "default",
            redirected: false,
            url: String::new(),
            original_status: None,
            body_shim: OnceLock::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Response.json(value, init?)`.
    pub fn json(value: &serde_json::Value, mut init: ResponseInit) -> Self {
        let bytes = Bytes::from(serde_json::to_vec(value).unwrap_or_default());
        let mut headers = init.headers.take().unwrap_or_default();
        if !headers.has("content-type") {
            headers.set("content-type", "application/json;charset=UTF-8").ok();
        }
        init.headers = Some(headers);
        Self::new(Body::from_bytes(bytes.clone(), Some("application/json".into())), init)
    }

    /// `Response.redirect(url, status=302)`.
    pub fn redirect(url: &str, status: u16) -> Self {
        let mut headers = Headers::new();
        headers.set("location", url).ok();
        Self::new(
            Body::empty(),
            ResponseInit {
                status,
                status_text: String::new(),
                headers: Some(headers),
            },
        )
    }

    /// `Response.error()`: `type: "error"`, `status: 0`.
    pub fn network_error() -> Self {
        let mut response = Self::new(Body::empty(), ResponseInit { status: 0, ..Default::default() });
        response.response_type = "error";
        response
    }

    /// Marks this response for a WebSocket upgrade without disturbing the
    /// externally observable, normalized status.
    pub fn mark_for_upgrade(&mut self) {
        self.original_status = Some(101);
    }

    pub fn is_upgrade(&self) -> bool {
        self.original_status == Some(101)
    }

    /// Caches the body shim so repeated access returns the same object
    /// (spec §4.2 identity invariant).
    pub fn body_stream(&self) -> Option<&HostBackedReadableStream> {
        // Only meaningful when the body is actually stream-backed; callers
        // needing the materialized path use `self.body` directly.
        self.body_shim.get()
    }

    pub fn set_body_stream(&self, stream: HostBackedReadableStream) -> &HostBackedReadableStream {
        self.body_shim.get_or_init(|| stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_reflects_2xx_range() {
        let r = Response::new(Body::empty(), ResponseInit::default());
        assert!(r.ok());
        let r = Response::new(Body::empty(), ResponseInit { status: 404, ..Default::default() });
        assert!(!r.ok());
    }

    #[test]
    fn json_sets_content_type_unless_overridden() {
        let r = Response::json(&serde_json::json!({"a":1}), ResponseInit::default());
        assert_eq!(r.headers.get("content-type").as_deref(), Some("application/json;charset=UTF-8"));
    }

    #[test]
    fn redirect_sets_location_and_status() {
        let r = Response::redirect("https://example.com/", 302);
        assert_eq!(r.status, 302);
        assert_eq!(r.headers.get("location").as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn network_error_has_zero_status_and_error_type() {
        let r = Response::network_error();
        assert_eq!(r.status, 0);
        assert_eq!(r.response_type, "error");
    }

    #[test]
    fn upgrade_sentinel_is_hidden_from_status_but_readable_internally() {
        let mut r = Response::new(Body::empty(), ResponseInit { status: 200, ..Default::default() });
        r.mark_for_upgrade();
        assert_eq!(r.status, 200);
        assert!(r.is_upgrade());
    }

    #[test]
    fn body_stream_identity_is_cached() {
        use islet_io::StreamRegistry;
        let registry = StreamRegistry::new();
        let id = registry.create();
        let r = Response::new(Body::empty(), ResponseInit::default());
        let first = r.set_body_stream(HostBackedReadableStream::new(id, registry.clone()));
        let first_id = first.id();
        let second = r.body_stream().unwrap();
        assert_eq!(first_id, second.id());
    }
}
