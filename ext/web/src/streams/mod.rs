//! Guest Stream Shims (C2): `HostBackedReadableStream` (bound to an
//! `islet_io::StreamId`) and a conformant pure-Rust `GuestStream`, unified
//! behind `ReadableStreamLike` so C5/C6 do not care which backs a given
//! Request/Response body.

mod host_backed;
mod pure;
mod queuing;
mod text_codec;

pub use host_backed::HostBackedReadableStream;
pub use pure::{GuestReadableStream, TransformStream, WritableStream};
pub use queuing::{ByteLengthQueuingStrategy, CountQueuingStrategy};
pub use text_codec::{TextDecoderStream, TextEncoderStream};

use crate::error::WebError;
use islet_io::ErrorValue;

#[derive(Debug, Clone)]
pub enum ReadChunk {
    Chunk(bytes::Bytes),
    Done,
}

/// Unifies `HostBackedReadableStream` and `GuestReadableStream` so callers
/// needing only "the next chunk" / "lock" / "cancel" never branch on which
/// kind backs a body.
#[async_trait::async_trait]
pub trait ReadableStreamLike: Send + Sync {
    async fn read(&self) -> Result<ReadChunk, WebError>;
    fn locked(&self) -> bool;
    fn lock(&self) -> Result<(), WebError>;
    fn release_lock(&self);
    async fn cancel(&self, reason: Option<ErrorValue>);
}

impl HostBackedReadableStream {
    /// `pipeTo(dest)`: drains this stream into `dest` on a background task,
    /// closing `dest` once the source finishes. Backpressure is handled by
    /// yielding and retrying a write that finds `dest`'s queue full, rather
    /// than a wakeup channel — acceptable for the single-writer C1 rows this
    /// bridges between.
    pub fn pipe_to(&self, dest: &WritableStream) {
        let source = self.clone();
        let dest = dest.clone();
        tokio::spawn(async move {
            loop {
                match source.read().await {
                    Ok(ReadChunk::Chunk(chunk)) => {
                        let mut pending = chunk;
                        loop {
                            match dest.write(pending.clone()) {
                                Ok(()) => break,
                                Err(_) => tokio::task::yield_now().await,
                            }
                        }
                    }
                    Ok(ReadChunk::Done) => {
                        dest.close();
                        break;
                    }
                    Err(_) => break,
                }
            }
        });
    }

    /// `pipeThrough({writable, readable})`: feeds this stream's chunks into
    /// `transform`'s writable side and returns its readable side immediately
    /// (spec §6 names `TransformStream` alongside `ReadableStream`).
    pub fn pipe_through(&self, transform: &TransformStream) -> HostBackedReadableStream {
        let source = self.clone();
        let transform = transform.clone();
        tokio::spawn(async move {
            loop {
                match source.read().await {
                    Ok(ReadChunk::Chunk(chunk)) => transform.pump_one(chunk),
                    Ok(ReadChunk::Done) | Err(_) => {
                        transform.finish();
                        break;
                    }
                }
            }
        });
        transform.readable.clone()
    }
}
