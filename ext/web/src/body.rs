//! Body Consumption state machine (C3, spec §3 "Body", §4.3): the three
//! states Unused/Locked/Consumed shared by Request/Response, plus the five
//! consuming methods and `clone()`.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::blob::Blob;
use crate::error::WebError;
use crate::form_data::FormData;
use crate::multipart;
use crate::streams::{HostBackedReadableStream, ReadChunk, ReadableStreamLike};
use crate::url::UrlSearchParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Unused,
    Locked,
    Consumed,
}

enum BodySource {
    Empty,
    Bytes(Bytes),
    Stream(HostBackedReadableStream),
}

struct Inner {
    state: BodyState,
    source: BodySource,
    content_type: Option<String>,
}

/// Shared so `Request`/`Response` can cheaply clone a handle to the same
/// body without cloning its (possibly large) bytes.
#[derive(Clone)]
pub struct Body {
    inner: Arc<Mutex<Inner>>,
}

impl Body {
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BodyState::Unused,
                source: BodySource::Empty,
                content_type: None,
            })),
        }
    }

    pub fn from_bytes(bytes: Bytes, content_type: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BodyState::Unused,
                source: BodySource::Bytes(bytes),
                content_type,
            })),
        }
    }

    pub fn from_stream(stream: HostBackedReadableStream, content_type: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BodyState::Unused,
                source: BodySource::Stream(stream),
                content_type,
            })),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner.lock().source, BodySource::Empty)
    }

    /// True iff state is Locked-after-consumption or Consumed; since a
    /// consuming method transitions Unused straight to Consumed (it reads
    /// to completion), only `get_reader` leaves a stream Locked without yet
    /// being "used" — `bodyUsed` tracks the consumed flag, not the lock.
    pub fn used(&self) -> bool {
        matches!(self.inner.lock().state, BodyState::Consumed)
    }

    pub fn locked(&self) -> bool {
        matches!(self.inner.lock().state, BodyState::Locked)
    }

    /// The backing `StreamId`, if this body is stream-sourced rather than
    /// already materialized into bytes.
    pub fn stream_id(&self) -> Option<islet_io::StreamId> {
        match &self.inner.lock().source {
            BodySource::Stream(s) => Some(s.stream_id()),
            _ => None,
        }
    }

    fn begin_consume(&self) -> Result<(), WebError> {
        let mut inner = self.inner.lock();
        if inner.state != BodyState::Unused {
            return Err(WebError::BodyAlreadyRead);
        }
        inner.state = BodyState::Consumed;
        Ok(())
    }

    async fn drain_to_bytes(&self) -> Bytes {
        let source = {
            let inner = self.inner.lock();
            match &inner.source {
                BodySource::Empty => return Bytes::new(),
                BodySource::Bytes(b) => return b.clone(),
                BodySource::Stream(s) => s.clone(),
            }
        };
        let mut buf = Vec::new();
        loop {
            match source.read().await {
                Ok(ReadChunk::Chunk(chunk)) => buf.extend_from_slice(&chunk),
                Ok(ReadChunk::Done) | Err(_) => break,
            }
        }
        Bytes::from(buf)
    }

    pub async fn text(&self) -> Result<String, WebError> {
        self.begin_consume()?;
        Ok(String::from_utf8_lossy(&self.drain_to_bytes().await).into_owned())
    }

    pub async fn json(&self) -> Result<serde_json::Value, WebError> {
        self.begin_consume()?;
        let bytes = self.drain_to_bytes().await;
        serde_json::from_slice(&bytes).map_err(|e| WebError::TypeError(e.to_string()))
    }

    pub async fn array_buffer(&self) -> Result<Bytes, WebError> {
        self.begin_consume()?;
        Ok(self.drain_to_bytes().await)
    }

    pub async fn blob(&self) -> Result<Blob, WebError> {
        self.begin_consume()?;
        let content_type = self.inner.lock().content_type.clone().unwrap_or_default();
        Ok(Blob::from_bytes(self.drain_to_bytes().await, content_type))
    }

    /// Dispatches on Content-Type per spec §4.3.
    pub async fn form_data(&self) -> Result<FormData, WebError> {
        self.begin_consume()?;
        let content_type = self.inner.lock().content_type.clone().unwrap_or_default();
        let bytes = self.drain_to_bytes().await;
        if let Some(boundary) = multipart::extract_boundary(&content_type) {
            multipart::parse(&bytes, &boundary)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let text = String::from_utf8_lossy(&bytes);
            let params = UrlSearchParams::parse(&text);
            let mut fd = FormData::new();
            for (name, value) in params.entries() {
                fd.append_text(&name, &value);
            }
            Ok(fd)
        } else {
            Err(WebError::TypeError(format!(
                "unsupported content type for formData(): {content_type}"
            )))
        }
    }

    pub fn get_reader(&self) -> Result<HostBackedReadableStream, WebError> {
        let mut inner = self.inner.lock();
        if inner.state != BodyState::Unused {
            return Err(WebError::StreamLock {
                target: "Body",
                method: "getReader",
            });
        }
        match &inner.source {
            BodySource::Stream(s) => {
                s.lock()?;
                inner.state = BodyState::Locked;
                Ok(s.clone())
            }
            _ => Err(WebError::TypeError("body has no stream".into())),
        }
    }

    pub fn release_reader(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BodyState::Locked {
            if let BodySource::Stream(s) = &inner.source {
                s.release_lock();
            }
            inner.state = BodyState::Unused;
        }
    }

    /// Permitted only in Unused; tees the stream when present (the other
    /// fork is swapped into `self` so both sides keep draining the same
    /// underlying source), else copies bytes. Both halves begin Unused.
    pub fn clone_body(&self) -> Result<Body, WebError> {
        let mut inner = self.inner.lock();
        if inner.state != BodyState::Unused {
            return Err(WebError::TypeError("cannot clone a used body".into()));
        }
        match &inner.source {
            BodySource::Empty => Ok(Body::empty()),
            BodySource::Bytes(b) => Ok(Body::from_bytes(b.clone(), inner.content_type.clone())),
            BodySource::Stream(s) => {
                let (mine, theirs) = s.tee();
                let content_type = inner.content_type.clone();
                inner.source = BodySource::Stream(mine);
                Ok(Body::from_stream(theirs, content_type))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_io::StreamRegistry;

    #[tokio::test]
    async fn second_consume_fails_with_body_already_read() {
        let body = Body::from_bytes(Bytes::from_static(b"hi"), None);
        assert_eq!(body.text().await.unwrap(), "hi");
        assert!(matches!(body.text().await, Err(WebError::BodyAlreadyRead)));
    }

    #[tokio::test]
    async fn used_flag_follows_consumed_state() {
        let body = Body::from_bytes(Bytes::from_static(b"hi"), None);
        assert!(!body.used());
        body.text().await.unwrap();
        assert!(body.used());
    }

    #[test]
    fn clone_of_bytes_body_is_independent() {
        let body = Body::from_bytes(Bytes::from_static(b"hi"), None);
        let cloned = body.clone_body().unwrap();
        assert!(!cloned.used());
    }

    #[tokio::test]
    async fn clone_after_consume_fails() {
        let body = Body::from_bytes(Bytes::from_static(b"hi"), None);
        body.text().await.unwrap();
        assert!(body.clone_body().is_err());
    }

    #[tokio::test]
    async fn streamed_body_drains_in_order() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        registry.push(id, Bytes::from_static(b"chunk1"));
        registry.push(id, Bytes::from_static(b"chunk2"));
        registry.close(id);
        let body = Body::from_stream(HostBackedReadableStream::new(id, registry), None);
        assert_eq!(body.text().await.unwrap(), "chunk1chunk2");
    }

    #[tokio::test]
    async fn clone_of_streamed_body_tees_so_both_sides_drain_independently() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        registry.push(id, Bytes::from_static(b"chunk1"));
        registry.push(id, Bytes::from_static(b"chunk2"));
        registry.close(id);
        let body = Body::from_stream(HostBackedReadableStream::new(id, registry), None);
        let cloned = body.clone_body().unwrap();
        assert!(!cloned.used());
        let (a, b) = tokio::join!(body.text(), cloned.text());
        assert_eq!(a.unwrap(), "chunk1chunk2");
        assert_eq!(b.unwrap(), "chunk1chunk2");
    }

    #[test]
    fn get_reader_locks_then_released_unlocks() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        let body = Body::from_stream(HostBackedReadableStream::new(id, registry), None);
        assert!(!body.locked());
        body.get_reader().unwrap();
        assert!(body.locked());
        body.release_reader();
        assert!(!body.locked());
    }
}
