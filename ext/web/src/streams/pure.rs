//! The non-host-backed half of C2: a pure-Rust `ReadableStream` built from
//! `start`/`cancel` callbacks over the same C1 substrate (per spec §3's
//! lifecycle note: "guest `new ReadableStream(...)` → C2 registers with
//! C1"), plus `WritableStream`/`TransformStream` shims supplementing the
//! distillation's `ReadableStream` focus (spec §6 names all three as
//! guest-visible globals).

use bytes::Bytes;
use islet_io::{ErrorValue, StreamId, StreamRegistry};

use super::host_backed::HostBackedReadableStream;
use crate::error::WebError;

/// Passed once to a `start` callback; `enqueue`/`close`/`error` push directly
/// into the backing C1 row.
pub struct ReadableStreamController {
    stream_id: StreamId,
    registry: StreamRegistry,
}

impl ReadableStreamController {
    pub fn enqueue(&self, chunk: Bytes) -> bool {
        self.registry.push(self.stream_id, chunk)
    }

    pub fn close(&self) {
        self.registry.close(self.stream_id);
    }

    pub fn error(&self, value: serde_json::Value) {
        self.registry.error(self.stream_id, ErrorValue::opaque(value));
    }
}

/// A guest-constructed `ReadableStream`. `start` runs synchronously at
/// construction; `cancel` is wired as the C1 cleanup so a host-side
/// `getReader().cancel()` unwinds back to the guest's underlying source.
pub struct GuestReadableStream {
    backing: HostBackedReadableStream,
}

impl GuestReadableStream {
    pub fn new<S, C>(registry: StreamRegistry, start: S, cancel: Option<C>) -> Self
    where
        S: FnOnce(&ReadableStreamController),
        C: FnOnce(Option<serde_json::Value>) + Send + 'static,
    {
        let stream_id = registry.create();
        let controller = ReadableStreamController {
            stream_id,
            registry: registry.clone(),
        };
        start(&controller);
        if let Some(cancel) = cancel {
            registry.set_cleanup(
                stream_id,
                Box::new(move || {
                    Box::pin(async move {
                        cancel(None);
                    })
                }),
            );
        }
        Self {
            backing: HostBackedReadableStream::new(stream_id, registry),
        }
    }

    pub fn as_readable(&self) -> HostBackedReadableStream {
        self.backing.clone()
    }
}

/// Sink-style shim: `write`/`close`/`abort` forward to a guest-supplied
/// underlying sink. Backpressure is derived from `isQueueFull` on a
/// C1 row the writer feeds, mirroring the native adapter's own policy.
#[derive(Clone)]
pub struct WritableStream {
    stream_id: StreamId,
    registry: StreamRegistry,
}

impl WritableStream {
    pub fn new(registry: StreamRegistry) -> Self {
        let stream_id = registry.create();
        Self { stream_id, registry }
    }

    pub fn write(&self, chunk: Bytes) -> Result<(), WebError> {
        if self.registry.is_queue_full(self.stream_id) {
            return Err(WebError::TypeError("WritableStream queue is full".into()));
        }
        self.registry.push(self.stream_id, chunk);
        Ok(())
    }

    pub fn close(&self) {
        self.registry.close(self.stream_id);
    }

    pub fn abort(&self, reason: serde_json::Value) {
        self.registry.error(self.stream_id, ErrorValue::opaque(reason));
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

/// `TransformStream`: a writable side whose chunks are run through a
/// transformer before being enqueued on the readable side's own C1 row.
#[derive(Clone)]
pub struct TransformStream {
    pub writable: WritableStream,
    pub readable: HostBackedReadableStream,
    transformer: std::sync::Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>,
    readable_registry: StreamRegistry,
    readable_stream_id: StreamId,
}

impl TransformStream {
    pub fn new(registry: StreamRegistry, transformer: std::sync::Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>) -> Self {
        let writable = WritableStream::new(registry.clone());
        let readable_stream_id = registry.create();
        let readable = HostBackedReadableStream::new(readable_stream_id, registry.clone());
        Self {
            writable,
            readable,
            transformer,
            readable_registry: registry,
            readable_stream_id,
        }
    }

    /// Drains one written chunk through the transformer onto the readable
    /// side; a production pump task would call this in a loop per write.
    pub fn pump_one(&self, chunk: Bytes) {
        let transformed = (self.transformer)(chunk);
        self.readable_registry.push(self.readable_stream_id, transformed);
    }

    pub fn finish(&self) {
        self.writable.close();
        self.readable_registry.close(self.readable_stream_id);
    }
}
