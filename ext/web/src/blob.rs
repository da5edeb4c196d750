//! `Blob`/`File` (spec §3, §4.4): immutable, independently owned byte
//! carriers. Unlike a Body, reading a Blob is repeatable — `text()`,
//! `array_buffer()`, and `stream()` never consume it (spec §9 "Body
//! one-shot vs. Blob repeatable").

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::identity::InstanceId;

/// Current time as Unix-epoch milliseconds, the teacher's idiom for
/// timestamps (`cli/cache/http_cache.rs` and friends use the same
/// `SystemTime`/`UNIX_EPOCH` pairing).
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    id: InstanceId,
    bytes: Bytes,
    content_type: String,
}

impl Blob {
    /// Parts are resolved eagerly to bytes at construction (spec §3): byte
    /// slices are copied, nested Blobs contribute their own bytes.
    pub fn new(parts: Vec<BlobPart>, content_type: impl Into<String>) -> Self {
        let mut buf = Vec::new();
        for part in parts {
            match part {
                BlobPart::Bytes(b) => buf.extend_from_slice(&b),
                BlobPart::Text(s) => buf.extend_from_slice(s.as_bytes()),
                BlobPart::Blob(b) => buf.extend_from_slice(&b.bytes),
            }
        }
        Self {
            id: InstanceId::next(),
            bytes: Bytes::from(buf),
            content_type: content_type.into(),
        }
    }

    pub fn from_bytes(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            id: InstanceId::next(),
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Supports negative indices per spec §4.4; the returned Blob is
    /// independent (its own byte copy, not a view).
    pub fn slice(&self, start: Option<i64>, end: Option<i64>, content_type: Option<&str>) -> Self {
        let len = self.bytes.len() as i64;
        let resolve = |idx: i64| -> i64 {
            if idx < 0 {
                (len + idx).max(0)
            } else {
                idx.min(len)
            }
        };
        let start = resolve(start.unwrap_or(0)) as usize;
        let end = resolve(end.unwrap_or(len)) as usize;
        let (start, end) = if start > end { (start, start) } else { (start, end) };
        Self {
            id: InstanceId::next(),
            bytes: self.bytes.slice(start..end),
            content_type: content_type.unwrap_or("").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BlobPart {
    Bytes(Bytes),
    Text(String),
    Blob(Blob),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub blob: Blob,
    pub name: String,
    pub last_modified: i64,
    /// Always empty by design (spec §3, §9 open question: exposed
    /// unconditionally rather than only on some code paths).
    pub webkit_relative_path: String,
}

impl File {
    pub fn new(parts: Vec<BlobPart>, name: impl Into<String>, content_type: impl Into<String>, last_modified: Option<i64>) -> Self {
        Self {
            blob: Blob::new(parts, content_type),
            name: name.into(),
            last_modified: last_modified.unwrap_or_else(now_millis),
            webkit_relative_path: String::new(),
        }
    }

    /// Blob→File promotion with a default filename, used when a plain Blob
    /// is appended to FormData (spec §3, §4.9).
    pub fn promote(blob: Blob, name: impl Into<String>) -> Self {
        Self {
            blob,
            name: name.into(),
            last_modified: now_millis(),
            webkit_relative_path: String::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.blob.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_repeatable() {
        let blob = Blob::new(vec![BlobPart::Text("hello".into())], "text/plain");
        assert_eq!(blob.text(), "hello");
        assert_eq!(blob.text(), "hello");
    }

    #[test]
    fn slice_supports_negative_indices() {
        let blob = Blob::new(vec![BlobPart::Text("hello world".into())], "text/plain");
        let sliced = blob.slice(Some(-5), None, None);
        assert_eq!(sliced.text(), "world");
    }

    #[test]
    fn nested_blob_parts_contribute_bytes() {
        let inner = Blob::new(vec![BlobPart::Text("ab".into())], "");
        let outer = Blob::new(vec![BlobPart::Blob(inner), BlobPart::Text("cd".into())], "");
        assert_eq!(outer.text(), "abcd");
    }

    #[test]
    fn promoted_file_has_default_blob_filename() {
        let blob = Blob::new(vec![BlobPart::Text("x".into())], "text/plain");
        let file = File::promote(blob, "blob");
        assert_eq!(file.name, "blob");
        assert_eq!(file.webkit_relative_path, "");
    }

    #[test]
    fn last_modified_defaults_to_current_time_not_epoch_zero() {
        let blob = Blob::new(vec![BlobPart::Text("x".into())], "text/plain");
        let file = File::promote(blob.clone(), "blob");
        assert!(file.last_modified > 0);
        let file = File::new(vec![BlobPart::Text("x".into())], "a.txt", "text/plain", None);
        assert!(file.last_modified > 0);
        let file = File::new(vec![BlobPart::Text("x".into())], "a.txt", "text/plain", Some(42));
        assert_eq!(file.last_modified, 42);
    }
}
