//! The Marshaller (C5, spec §4.5): translates Web objects across the
//! boundary without loss of semantics or type identity. `InstanceId`-keyed
//! weak tables live in `islet_web::identity`; this module is the crate that
//! actually walks Request/Response/Headers/FormData/stream values across
//! the boundary for `dispatchRequest`/`fetch`, reusing `identity` for the
//! round-trip-identity rule (spec §4.5's table, row by row).

use islet_web::blob::Blob;
use islet_web::error::WebError;
use islet_web::form_data::FormData;
use islet_web::headers::Headers;
use islet_web::identity::{HostGuestTable, InstanceId};
use islet_web::request::{Request, RequestInit};
use islet_web::response::{Response, ResponseInit};
use islet_web::url::{Url, UrlSearchParams};

/// One table per marshalled Web object kind. Each table's round-trip rule:
/// "when the host passes a value that already originated from the guest
/// (known InstanceId in the map), the existing guest instance is returned
/// unchanged" (spec §4.5) — and symmetrically for guest→host.
#[derive(Default)]
pub struct Marshaller {
    headers: HostGuestTable<Headers>,
    urls: HostGuestTable<Url>,
    search_params: HostGuestTable<UrlSearchParams>,
    blobs: HostGuestTable<Blob>,
    form_data: HostGuestTable<FormData>,
    requests: HostGuestTable<Request>,
    responses: HostGuestTable<Response>,
}

impl Marshaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterator-based traversal (never enumerable-own-property copy, spec
    /// §4.5, §9): rebuilds via `Headers::from_existing`'s public-entries
    /// walk, unless a live counterpart is already known.
    pub fn headers_to_guest(&self, host: &Headers) -> Headers {
        if let Some(existing) = self.headers.lookup_guest(host.id()) {
            return existing;
        }
        let guest = Headers::from_existing(host);
        self.headers.record_host_to_guest(host.id(), guest.clone());
        self.headers.record_guest_to_host(guest.id(), host.clone());
        guest
    }

    pub fn headers_to_host(&self, guest: &Headers) -> Headers {
        if let Some(existing) = self.headers.lookup_host(guest.id()) {
            return existing;
        }
        let host = Headers::from_existing(guest);
        self.headers.record_guest_to_host(guest.id(), host.clone());
        self.headers.record_host_to_guest(host.id(), guest.clone());
        host
    }

    /// Serializes to href + InstanceId, rehydrates as a `Url` (spec §4.5).
    pub fn url_to_guest(&self, host: &Url) -> Url {
        if let Some(existing) = self.urls.lookup_guest(host.id()) {
            return existing;
        }
        let guest = Url::parse(&host.href(), None).expect("href was already a valid URL");
        self.urls.record_host_to_guest(host.id(), guest.clone());
        self.urls.record_guest_to_host(guest.id(), host.clone());
        guest
    }

    /// Entries list + InstanceId; live binding restored on rehydrate if
    /// attached to a URL (spec §4.5) — callers that have the owning `Url`
    /// should prefer `url.search_params()` over a bare entries rehydrate so
    /// the live-binding invariant actually holds.
    pub fn search_params_to_guest(&self, host: &UrlSearchParams) -> UrlSearchParams {
        if let Some(existing) = self.search_params.lookup_guest(host.id()) {
            return existing;
        }
        let guest = UrlSearchParams::from_existing(host);
        self.search_params.record_host_to_guest(host.id(), guest.clone());
        self.search_params.record_guest_to_host(guest.id(), host.clone());
        guest
    }

    /// Bytes (or blob handle) + metadata; identity via InstanceId.
    pub fn blob_to_guest(&self, host: &Blob) -> Blob {
        if let Some(existing) = self.blobs.lookup_guest(host.id()) {
            return existing;
        }
        let guest = Blob::from_bytes(host.bytes(), host.content_type().to_string());
        self.blobs.record_host_to_guest(host.id(), guest.clone());
        self.blobs.record_guest_to_host(guest.id(), host.clone());
        guest
    }

    /// Ordered entries; Blobs rehydrated as Files (already true of
    /// `FormData`'s own promotion rule, so a straight clone over the
    /// public `entries()` iterator suffices here).
    pub fn form_data_to_guest(&self, host: &FormData) -> FormData {
        if let Some(existing) = self.form_data.lookup_guest(host.id()) {
            return existing;
        }
        let mut guest = FormData::new();
        for (name, value) in host.entries() {
            match value {
                islet_web::form_data::FormValue::Text(text) => guest.append_text(name, text),
                islet_web::form_data::FormValue::File(file) => {
                    guest.append_blob(name, file.blob.clone(), Some(&file.name))
                }
            }
        }
        self.form_data.record_host_to_guest(host.id(), guest.clone());
        self.form_data.record_guest_to_host(guest.id(), host.clone());
        guest
    }

    /// Rebuilds the method/url/headers/body/signal envelope plus the
    /// non-`RequestInit` fields (`mode`, `credentials`, ...) a plain
    /// constructor can't set, reusing each field's own marshaller table so
    /// the nested `url`/`headers` each keep their own round-trip identity
    /// (spec §4.5). The body is teed via `Body::clone_body()`, so marshalling
    /// a streamed-body request is itself a one-shot operation on the host's
    /// own body handle, same as the guest-visible `clone()`.
    pub fn request_to_guest(&self, host: &Request) -> Result<Request, WebError> {
        if let Some(existing) = self.requests.lookup_guest(host.id()) {
            return Ok(existing);
        }
        let url = self.url_to_guest(&host.url);
        let headers = self.headers_to_guest(&host.headers);
        let body = host.body.clone_body()?;
        let mut guest = Request::new(
            &url.href(),
            RequestInit {
                method: Some(host.method.as_str().to_string()),
                headers: Some(headers),
                body: Some(body),
                signal: host.signal.clone(),
            },
        )?;
        guest.url = url;
        guest.mode = host.mode;
        guest.credentials = host.credentials;
        guest.cache = host.cache;
        guest.redirect = host.redirect;
        guest.referrer = host.referrer.clone();
        guest.integrity = host.integrity.clone();
        self.requests.record_host_to_guest(host.id(), guest.clone());
        self.requests.record_guest_to_host(guest.id(), host.clone());
        Ok(guest)
    }

    /// Same shape as `request_to_guest`, for the response side (spec §4.5,
    /// §4.6); preserves the WebSocket-upgrade sentinel across the boundary
    /// via `mark_for_upgrade`/`is_upgrade` rather than the hidden field
    /// itself, which stays private to `islet_web::response`.
    pub fn response_to_guest(&self, host: &Response) -> Result<Response, WebError> {
        if let Some(existing) = self.responses.lookup_guest(host.id()) {
            return Ok(existing);
        }
        let headers = self.headers_to_guest(&host.headers);
        let body = host.body.clone_body()?;
        let mut guest = Response::new(
            body,
            ResponseInit {
                status: host.status,
                status_text: host.status_text.clone(),
                headers: Some(headers),
            },
        );
        guest.response_type = host.response_type;
        guest.redirected = host.redirected;
        guest.url = host.url.clone();
        if host.is_upgrade() {
            guest.mark_for_upgrade();
        }
        self.responses.record_host_to_guest(host.id(), guest.clone());
        self.responses.record_guest_to_host(guest.id(), host.clone());
        Ok(guest)
    }

    /// `clearAllInstanceState()` (spec §5): empties every table; idempotent.
    pub fn clear_all(&self) {
        self.headers.clear_all();
        self.urls.clear_all();
        self.search_params.clear_all();
        self.blobs.clear_all();
        self.form_data.clear_all();
        self.requests.clear_all();
        self.responses.clear_all();
    }
}

/// `ReadableStream`/`Writable`/`Transform`: a `StreamId` reference, never a
/// copy (spec §4.5) — the identity used across the boundary is the pair
/// `(StreamId, InstanceId)`, since the same C1 row backs both sides' shim.
pub fn stream_identity(stream_id: islet_io::StreamId, instance_id: InstanceId) -> (islet_io::StreamId, InstanceId) {
    (stream_id, instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn headers_round_trip_preserves_values_and_reuses_existing_instance() {
        let marshaller = Marshaller::new();
        let mut host = Headers::new();
        host.append("X-Foo", "bar").unwrap();

        let guest = marshaller.headers_to_guest(&host);
        assert_eq!(guest.get("x-foo").as_deref(), Some("bar"));

        let guest_again = marshaller.headers_to_guest(&host);
        assert_eq!(guest_again.id(), guest.id());
    }

    #[test]
    fn url_round_trip_preserves_href() {
        let marshaller = Marshaller::new();
        let host = Url::parse("https://example.com/a?b=1", None).unwrap();
        let guest = marshaller.url_to_guest(&host);
        assert_eq!(guest.href(), host.href());
    }

    #[test]
    fn blob_round_trip_preserves_bytes() {
        let marshaller = Marshaller::new();
        let host = Blob::from_bytes(Bytes::from_static(b"hi"), "text/plain");
        let guest = marshaller.blob_to_guest(&host);
        assert_eq!(guest.text(), "hi");
    }

    #[test]
    fn form_data_round_trip_preserves_entries_and_promotes_blobs() {
        let marshaller = Marshaller::new();
        let mut host = FormData::new();
        host.append_text("name", "John");
        host.append_blob("file", Blob::from_bytes(Bytes::from_static(b"x"), "text/plain"), None);
        let guest = marshaller.form_data_to_guest(&host);
        assert!(guest.has("name"));
        assert!(guest.has("file"));
    }

    #[test]
    fn request_round_trip_preserves_method_url_and_headers_and_reuses_existing_instance() {
        use islet_web::request::{Request, RequestInit};

        let marshaller = Marshaller::new();
        let mut headers = Headers::new();
        headers.append("X-Foo", "bar").unwrap();
        let host = Request::new(
            "https://example.com/a?b=1",
            RequestInit {
                method: Some("POST".into()),
                headers: Some(headers),
                body: None,
                signal: None,
            },
        )
        .unwrap();

        let guest = marshaller.request_to_guest(&host).unwrap();
        assert_eq!(guest.url_string(), host.url_string());
        assert_eq!(guest.method, host.method);
        assert_eq!(guest.headers.get("x-foo").as_deref(), Some("bar"));

        let guest_again = marshaller.request_to_guest(&host).unwrap();
        assert_eq!(guest_again.id(), guest.id());
    }

    #[test]
    fn response_round_trip_preserves_status_and_upgrade_sentinel() {
        use islet_web::body::Body;
        use islet_web::response::{Response, ResponseInit};

        let marshaller = Marshaller::new();
        let mut host = Response::new(
            Body::empty(),
            ResponseInit {
                status: 200,
                ..Default::default()
            },
        );
        host.mark_for_upgrade();

        let guest = marshaller.response_to_guest(&host).unwrap();
        assert_eq!(guest.status, 200);
        assert!(guest.is_upgrade());

        let guest_again = marshaller.response_to_guest(&host).unwrap();
        assert_eq!(guest_again.id(), guest.id());
    }

    #[test]
    fn clear_all_is_idempotent() {
        let marshaller = Marshaller::new();
        let host = Headers::new();
        marshaller.headers_to_guest(&host);
        marshaller.clear_all();
        marshaller.clear_all();
    }
}
