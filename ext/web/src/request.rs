//! `Request` (spec §3, §4.4).

use bytes::Bytes;

use crate::abort::AbortSignal;
use crate::body::Body;
use crate::error::WebError;
use crate::headers::Headers;
use crate::identity::InstanceId;
use crate::url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Connect,
    Trace,
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            "CONNECT" => Method::Connect,
            "TRACE" => Method::Trace,
            _ => Method::Get,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }

    pub fn is_bodyless(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<Headers>,
    pub body: Option<Body>,
    pub signal: Option<AbortSignal>,
}

/// A cheap handle clone sharing the same `Body` state (used by the
/// marshaller's round-trip tables) — distinct from the WHATWG `clone()`
/// operation, which goes through `Body::clone_body()` to tee a streamed
/// body into two independently readable halves.
#[derive(Clone)]
pub struct Request {
    id: InstanceId,
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Body,
    pub signal: Option<AbortSignal>,
    pub mode: &'static str,
    pub credentials: &'static str,
    pub cache: &'static str,
    pub redirect: &'static str,
    pub referrer: String,
    pub integrity: String,
}

impl Request {
    pub fn new(url: &str, init: RequestInit) -> Result<Self, WebError> {
        let method = Method::parse(init.method.as_deref().unwrap_or("GET"));
        let body = init.body.unwrap_or_else(Body::empty);
        if method.is_bodyless() && !body.is_null() {
            return Err(WebError::BodyWithGetOrHead { what: "Request" });
        }
        Ok(Self {
            id: InstanceId::next(),
            method,
            url: Url::parse(url, None)?,
            headers: init.headers.unwrap_or_default(),
            body,
            signal: init.signal,
            mode: "cors",
            credentials: "same-origin",
            cache: "default",
            redirect: "follow",
            referrer: String::new(),
            integrity: String::new(),
        })
    }

    /// `Request(request)` / `Request(request, init)`: copies the existing
    /// request, allowing `init` to override individual fields.
    pub fn from_existing(other: &Request, override_init: Option<RequestInit>) -> Result<Self, WebError> {
        let override_init = override_init.unwrap_or(RequestInit {
            method: None,
            headers: None,
            body: None,
            signal: None,
        });
        let method = match override_init.method {
            Some(m) => Method::parse(&m),
            None => other.method,
        };
        let body = match override_init.body {
            Some(b) => b,
            None => other.body.clone_body()?,
        };
        if method.is_bodyless() && !body.is_null() {
            return Err(WebError::BodyWithGetOrHead { what: "Request" });
        }
        Ok(Self {
            id: InstanceId::next(),
            method,
            url: other.url.clone(),
            headers: override_init
                .headers
                .unwrap_or_else(|| Headers::from_existing(&other.headers)),
            body,
            signal: override_init.signal.or_else(|| other.signal.clone()),
            mode: other.mode,
            credentials: other.credentials,
            cache: other.cache,
            redirect: other.redirect,
            referrer: other.referrer.clone(),
            integrity: other.integrity.clone(),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Always a serialized absolute string (spec §4.4).
    pub fn url_string(&self) -> String {
        self.url.href()
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_null()
    }
}

pub fn bytes_body(bytes: Bytes, content_type: Option<String>) -> Body {
    Body::from_bytes(bytes, content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_rejects_body() {
        let init = RequestInit {
            method: Some("GET".into()),
            headers: None,
            body: Some(Body::from_bytes(Bytes::from_static(b"x"), None)),
            signal: None,
        };
        assert!(matches!(
            Request::new("https://example.com", init),
            Err(WebError::BodyWithGetOrHead { .. })
        ));
    }

    #[test]
    fn get_request_body_is_null() {
        let init = RequestInit {
            method: Some("GET".into()),
            headers: None,
            body: None,
            signal: None,
        };
        let req = Request::new("https://example.com", init).unwrap();
        assert!(!req.has_body());
    }

    #[test]
    fn defaults_match_spec() {
        let init = RequestInit {
            method: None,
            headers: None,
            body: None,
            signal: None,
        };
        let req = Request::new("https://example.com", init).unwrap();
        assert_eq!(req.mode, "cors");
        assert_eq!(req.credentials, "same-origin");
        assert_eq!(req.cache, "default");
        assert_eq!(req.redirect, "follow");
    }

    #[test]
    fn url_is_always_absolute() {
        let init = RequestInit { method: None, headers: None, body: None, signal: None };
        let req = Request::new("https://example.com/a", init).unwrap();
        assert_eq!(req.url_string(), "https://example.com/a");
    }
}
