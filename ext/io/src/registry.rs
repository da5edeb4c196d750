use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{HIGH_WATER_MARK, MAX_QUEUE_CHUNKS};

/// Process-local, strictly-positive, never-reused identifier for a row in the
/// registry (spec §3).
pub type StreamId = u64;

/// Opaque payload carried by `error(id, value)` and by the builtin
/// `StreamDeletedError` sentinel produced by `delete`/`cancel` of a stream
/// with a pending pull.
#[derive(Debug, Clone)]
pub enum ErrorValue {
    /// An error value supplied by whichever side called `error()`.
    Opaque(Arc<serde_json::Value>),
    /// The builtin `"Stream deleted"` error (spec §7 `StreamDeletedError`).
    Deleted,
}

impl ErrorValue {
    pub fn opaque(value: serde_json::Value) -> Self {
        Self::Opaque(Arc::new(value))
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque(v) => write!(f, "{v}"),
            Self::Deleted => write!(f, "Stream deleted"),
        }
    }
}

/// Outcome of `pull()`, mirroring the `{value, done}` / `{done: true}` /
/// rejection shapes of spec §4.1.
#[derive(Debug, Clone)]
pub enum PullOutcome {
    Chunk(Bytes),
    Done,
    Err(ErrorValue),
}

pub type CleanupFn = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Row {
    queue: VecDeque<Bytes>,
    queue_size: usize,
    closed: bool,
    errored: Option<ErrorValue>,
    pull_waiter: Option<oneshot::Sender<PullOutcome>>,
    cleanup: Option<CleanupFn>,
}

impl Row {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queue_size: 0,
            closed: false,
            errored: None,
            pull_waiter: None,
            cleanup: None,
        }
    }

    fn is_terminal(&self) -> bool {
        self.closed || self.errored.is_some()
    }
}

/// A point-in-time, read-only view of a row, for diagnostics (`get`).
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub queue_len: usize,
    pub queue_size: usize,
    pub closed: bool,
    pub errored: bool,
    pub has_pull_waiter: bool,
}

struct Inner {
    rows: HashMap<StreamId, Row>,
    next_id: AtomicU64,
    high_water_mark: usize,
    max_queue_chunks: usize,
}

/// The Host Stream Registry (spec §4.1, component C1). One instance per
/// embedding context; separate contexts must not share ids, so this is never
/// a global singleton — the host wires one `Arc<StreamRegistry>` per
/// `FetchContext`.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::with_limits(HIGH_WATER_MARK, MAX_QUEUE_CHUNKS)
    }

    pub fn with_limits(high_water_mark: usize, max_queue_chunks: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                rows: HashMap::new(),
                next_id: AtomicU64::new(1),
                high_water_mark,
                max_queue_chunks,
            })),
        }
    }

    /// Allocates a fresh row. The first allocation in a fresh registry
    /// returns `1`.
    pub fn create(&self) -> StreamId {
        let mut inner = self.inner.lock();
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.rows.insert(id, Row::new());
        log::trace!("stream {id} created");
        id
    }

    pub fn get(&self, id: StreamId) -> Option<StreamMetrics> {
        let inner = self.inner.lock();
        inner.rows.get(&id).map(|row| StreamMetrics {
            queue_len: row.queue.len(),
            queue_size: row.queue_size,
            closed: row.closed,
            errored: row.errored.is_some(),
            has_pull_waiter: row.pull_waiter.is_some(),
        })
    }

    /// Appends `chunk` if the stream exists and is non-terminal. Delivers
    /// directly to a pending pull waiter when present (fast path), bypassing
    /// the queue entirely so invariant (c) (`pullWaiter != null` implies an
    /// empty queue) always holds.
    pub fn push(&self, id: StreamId, chunk: Bytes) -> bool {
        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(&id) else {
            return false;
        };
        if row.is_terminal() {
            return false;
        }
        if let Some(waiter) = row.pull_waiter.take() {
            let _ = waiter.send(PullOutcome::Chunk(chunk));
        } else {
            row.queue_size += chunk.len();
            row.queue.push_back(chunk);
        }
        log::trace!("stream {id} push, queue_size={}", row.queue_size);
        true
    }

    /// Resolves with the head chunk if queued, else with the terminal state,
    /// else installs the single pending pull waiter. Missing ids resolve as
    /// already-closed (never throw) per spec §4.1 / §7.
    pub async fn pull(&self, id: StreamId) -> PullOutcome {
        let rx = {
            let mut inner = self.inner.lock();
            let Some(row) = inner.rows.get_mut(&id) else {
                return PullOutcome::Done;
            };
            if let Some(chunk) = row.queue.pop_front() {
                row.queue_size -= chunk.len();
                return PullOutcome::Chunk(chunk);
            }
            if let Some(err) = &row.errored {
                return PullOutcome::Err(err.clone());
            }
            if row.closed {
                return PullOutcome::Done;
            }
            // Single consumer assumed (spec §4.1): a second concurrent pull
            // supersedes the first, whose receiver then observes a dropped
            // sender and is treated as a stale read.
            let (tx, rx) = oneshot::channel();
            row.pull_waiter = Some(tx);
            rx
        };
        rx.await.unwrap_or(PullOutcome::Done)
    }

    /// Idempotent terminal transition; resolves a pending waiter with `done`.
    pub fn close(&self, id: StreamId) {
        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(&id) else {
            return;
        };
        if row.is_terminal() {
            return;
        }
        row.closed = true;
        if let Some(waiter) = row.pull_waiter.take() {
            let _ = waiter.send(PullOutcome::Done);
        }
        log::trace!("stream {id} closed");
    }

    /// Idempotent terminal transition; rejects a pending waiter.
    pub fn error(&self, id: StreamId, value: ErrorValue) {
        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(&id) else {
            return;
        };
        if row.is_terminal() {
            return;
        }
        if let Some(waiter) = row.pull_waiter.take() {
            let _ = waiter.send(PullOutcome::Err(value.clone()));
        }
        row.errored = Some(value);
        log::trace!("stream {id} errored");
    }

    /// `queueSize >= HIGH_WATER_MARK || len(queue) >= MAX_QUEUE_CHUNKS`.
    /// Missing ids are treated as saturated, to stop producers racing a
    /// `delete`.
    pub fn is_queue_full(&self, id: StreamId) -> bool {
        let inner = self.inner.lock();
        match inner.rows.get(&id) {
            Some(row) => {
                row.queue_size >= inner.high_water_mark
                    || row.queue.len() >= inner.max_queue_chunks
            }
            None => true,
        }
    }

    /// Removes the row; a pending waiter is rejected with `StreamDeletedError`.
    pub fn delete(&self, id: StreamId) {
        let mut inner = self.inner.lock();
        if let Some(mut row) = inner.rows.remove(&id) {
            if let Some(waiter) = row.pull_waiter.take() {
                let _ = waiter.send(PullOutcome::Err(ErrorValue::Deleted));
            }
            log::trace!("stream {id} deleted");
        }
    }

    /// Attaches the cancel cleanup, replacing any previous one.
    pub fn set_cleanup(&self, id: StreamId, cleanup: CleanupFn) {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get_mut(&id) {
            row.cleanup = Some(cleanup);
        }
    }

    /// `close()`s the stream, then fire-and-forgets the registered cleanup at
    /// most once; cleanup errors are swallowed (the cleanup returns no
    /// `Result`, matching spec §4.1's "errors swallowed").
    pub fn cancel(&self, id: StreamId) {
        self.close(id);
        let cleanup = {
            let mut inner = self.inner.lock();
            inner.rows.get_mut(&id).and_then(|row| row.cleanup.take())
        };
        if let Some(cleanup) = cleanup {
            tokio::spawn(async move {
                cleanup().await;
            });
        }
    }

    /// Rejects every pending pull waiter with `StreamDeletedError` and
    /// forgets every row and cleanup (spec §5 context teardown).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for (_, mut row) in inner.rows.drain() {
            if let Some(waiter) = row.pull_waiter.take() {
                let _ = waiter.send(PullOutcome::Err(ErrorValue::Deleted));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registry-wide snapshot for host observability (row count, total
    /// queued bytes across all rows).
    pub fn metrics(&self) -> RegistryMetrics {
        let inner = self.inner.lock();
        let queued_bytes = inner.rows.values().map(|row| row.queue_size).sum();
        RegistryMetrics {
            row_count: inner.rows.len(),
            queued_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryMetrics {
    pub row_count: usize,
    pub queued_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_at_one() {
        let reg = StreamRegistry::new();
        assert_eq!(reg.create(), 1);
        assert_eq!(reg.create(), 2);
    }

    #[test]
    fn push_to_missing_returns_false() {
        let reg = StreamRegistry::new();
        assert!(!reg.push(999, Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn push_then_pull_preserves_order() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        assert!(reg.push(id, Bytes::from_static(b"a")));
        assert!(reg.push(id, Bytes::from_static(b"b")));
        reg.close(id);

        let mut seen = Vec::new();
        loop {
            match reg.pull(id).await {
                PullOutcome::Chunk(c) => seen.push(c),
                PullOutcome::Done => break,
                PullOutcome::Err(_) => panic!("unexpected error"),
            }
        }
        assert_eq!(seen, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn pull_on_empty_open_stream_awaits_then_gets_fast_path_push() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        let reg2 = reg.clone();
        let pulled = tokio::spawn(async move { reg2.pull(id).await });
        // Give the pull a chance to install its waiter.
        tokio::task::yield_now().await;
        assert!(reg.push(id, Bytes::from_static(b"late")));
        match pulled.await.unwrap() {
            PullOutcome::Chunk(c) => assert_eq!(c, Bytes::from_static(b"late")),
            other => panic!("unexpected {other:?}"),
        }
        // The fast path must not have queued the chunk.
        let metrics = reg.get(id).unwrap();
        assert_eq!(metrics.queue_len, 0);
    }

    #[tokio::test]
    async fn closing_after_n_pushes_yields_exactly_n_then_done() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        for i in 0..3 {
            reg.push(id, Bytes::from(vec![i]));
        }
        reg.close(id);
        for _ in 0..3 {
            assert!(matches!(reg.pull(id).await, PullOutcome::Chunk(_)));
        }
        assert!(matches!(reg.pull(id).await, PullOutcome::Done));
        assert!(matches!(reg.pull(id).await, PullOutcome::Done));
    }

    #[tokio::test]
    async fn errored_stream_surfaces_queued_bytes_before_erroring() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        reg.push(id, Bytes::from_static(b"first"));
        reg.error(id, ErrorValue::opaque(serde_json::json!("boom")));
        assert!(matches!(reg.pull(id).await, PullOutcome::Chunk(_)));
        assert!(matches!(reg.pull(id).await, PullOutcome::Err(_)));
    }

    #[test]
    fn is_queue_full_by_bytes_or_chunk_count() {
        let reg = StreamRegistry::with_limits(10, 100);
        let id = reg.create();
        assert!(!reg.is_queue_full(id));
        reg.push(id, Bytes::from(vec![0u8; 11]));
        assert!(reg.is_queue_full(id));

        let reg = StreamRegistry::with_limits(usize::MAX, 2);
        let id = reg.create();
        reg.push(id, Bytes::from_static(b"a"));
        reg.push(id, Bytes::from_static(b"b"));
        assert!(reg.is_queue_full(id));
    }

    #[test]
    fn missing_id_queue_full_is_true() {
        let reg = StreamRegistry::new();
        assert!(reg.is_queue_full(12345));
    }

    #[tokio::test]
    async fn delete_rejects_pending_pull_with_stream_deleted() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        let reg2 = reg.clone();
        let pulled = tokio::spawn(async move { reg2.pull(id).await });
        tokio::task::yield_now().await;
        reg.delete(id);
        match pulled.await.unwrap() {
            PullOutcome::Err(ErrorValue::Deleted) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_closes_and_runs_cleanup_once() {
        use std::sync::atomic::AtomicUsize;
        let reg = StreamRegistry::new();
        let id = reg.create();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        reg.set_cleanup(
            id,
            Box::new(move || {
                let calls = calls2.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        reg.cancel(id);
        reg.cancel(id); // idempotent close; cleanup already taken, no double-run
        // Allow the spawned cleanup task to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(reg.pull(id).await, PullOutcome::Done));
    }

    #[test]
    fn push_to_closed_returns_false() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        reg.close(id);
        assert!(!reg.push(id, Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn clear_rejects_all_pending_waiters() {
        let reg = StreamRegistry::new();
        let id = reg.create();
        let reg2 = reg.clone();
        let pulled = tokio::spawn(async move { reg2.pull(id).await });
        tokio::task::yield_now().await;
        reg.clear();
        assert!(matches!(pulled.await.unwrap(), PullOutcome::Err(ErrorValue::Deleted)));
        assert!(reg.is_empty());
    }
}
