use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use islet_io::{ErrorValue, PullOutcome, StreamId, StreamRegistry};

use super::{ReadChunk, ReadableStreamLike};
use crate::error::WebError;
use crate::identity::InstanceId;

/// A `ReadableStream` bound to a C1 `StreamId`: `getReader().read()`
/// delegates to `StreamRegistry::pull`, `cancel` to `StreamRegistry::cancel`
/// (spec §4.2).
#[derive(Clone)]
pub struct HostBackedReadableStream {
    id: InstanceId,
    stream_id: StreamId,
    registry: StreamRegistry,
    locked: Arc<AtomicBool>,
}

impl HostBackedReadableStream {
    pub fn new(stream_id: StreamId, registry: StreamRegistry) -> Self {
        Self {
            id: InstanceId::next(),
            stream_id,
            registry,
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn backing_stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// `tee()`: C1 enforces single-consumer `pull`, so both forks are
    /// fresh rows fed by a background task draining this stream and
    /// republishing every chunk to each (spec §4.2). Both forks observe the
    /// same terminal transition (`close`/`error`) as the source.
    pub fn tee(&self) -> (HostBackedReadableStream, HostBackedReadableStream) {
        let registry = self.registry.clone();
        let left_id = registry.create();
        let right_id = registry.create();
        let source = self.clone();
        let sink = registry.clone();
        tokio::spawn(async move {
            loop {
                match source.read().await {
                    Ok(ReadChunk::Chunk(chunk)) => {
                        sink.push(left_id, chunk.clone());
                        sink.push(right_id, chunk);
                    }
                    Ok(ReadChunk::Done) => {
                        sink.close(left_id);
                        sink.close(right_id);
                        break;
                    }
                    Err(e) => {
                        let value = ErrorValue::opaque(serde_json::json!({ "message": e.to_string() }));
                        sink.error(left_id, value.clone());
                        sink.error(right_id, value);
                        break;
                    }
                }
            }
        });
        (
            HostBackedReadableStream::new(left_id, registry.clone()),
            HostBackedReadableStream::new(right_id, registry),
        )
    }
}

#[async_trait]
impl ReadableStreamLike for HostBackedReadableStream {
    async fn read(&self) -> Result<ReadChunk, WebError> {
        match self.registry.pull(self.stream_id).await {
            PullOutcome::Chunk(bytes) => Ok(ReadChunk::Chunk(bytes)),
            PullOutcome::Done => Ok(ReadChunk::Done),
            PullOutcome::Err(value) => Err(WebError::TypeError(value.to_string())),
        }
    }

    fn locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<(), WebError> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(())
        } else {
            Err(WebError::StreamLock {
                target: "ReadableStream",
                method: "getReader",
            })
        }
    }

    fn release_lock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    async fn cancel(&self, _reason: Option<ErrorValue>) {
        self.registry.cancel(self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn read_drains_in_push_order_then_done() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        registry.push(id, Bytes::from_static(b"a"));
        registry.push(id, Bytes::from_static(b"b"));
        registry.close(id);
        let stream = HostBackedReadableStream::new(id, registry);

        let ReadChunk::Chunk(first) = stream.read().await.unwrap() else {
            panic!("expected chunk")
        };
        assert_eq!(first, Bytes::from_static(b"a"));
        let ReadChunk::Chunk(second) = stream.read().await.unwrap() else {
            panic!("expected chunk")
        };
        assert_eq!(second, Bytes::from_static(b"b"));
        assert!(matches!(stream.read().await.unwrap(), ReadChunk::Done));
    }

    #[test]
    fn getting_a_second_reader_while_locked_fails() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        let stream = HostBackedReadableStream::new(id, registry);
        stream.lock().unwrap();
        assert!(stream.lock().is_err());
        stream.release_lock();
        assert!(stream.lock().is_ok());
    }

    #[tokio::test]
    async fn tee_republishes_every_chunk_to_both_forks() {
        let registry = StreamRegistry::new();
        let id = registry.create();
        registry.push(id, Bytes::from_static(b"a"));
        registry.push(id, Bytes::from_static(b"b"));
        registry.close(id);
        let stream = HostBackedReadableStream::new(id, registry);
        let (left, right) = stream.tee();

        let ReadChunk::Chunk(l1) = left.read().await.unwrap() else { panic!() };
        let ReadChunk::Chunk(r1) = right.read().await.unwrap() else { panic!() };
        assert_eq!(l1, Bytes::from_static(b"a"));
        assert_eq!(r1, Bytes::from_static(b"a"));
        let ReadChunk::Chunk(l2) = left.read().await.unwrap() else { panic!() };
        let ReadChunk::Chunk(r2) = right.read().await.unwrap() else { panic!() };
        assert_eq!(l2, Bytes::from_static(b"b"));
        assert_eq!(r2, Bytes::from_static(b"b"));
        assert!(matches!(left.read().await.unwrap(), ReadChunk::Done));
        assert!(matches!(right.read().await.unwrap(), ReadChunk::Done));
    }
}
