//! `TextEncoderStream`/`TextDecoderStream` (UTF-8 only): supplemented from
//! the original streams surface since spec §6 names them as required
//! globals. Decoding uses `encoding_rs` in `fatal` mode to produce
//! `EncodingError` on invalid UTF-8 (spec §7).

use crate::error::WebError;

#[derive(Default)]
pub struct TextEncoderStream;

impl TextEncoderStream {
    pub fn new() -> Self {
        Self
    }

    pub fn encode_chunk(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }
}

pub struct TextDecoderStream {
    fatal: bool,
    decoder: encoding_rs::Decoder,
}

impl TextDecoderStream {
    pub fn new(fatal: bool) -> Self {
        Self {
            fatal,
            decoder: encoding_rs::UTF_8.new_decoder(),
        }
    }

    /// Feeds one chunk through the incremental decoder; `last` indicates
    /// stream end so trailing partial sequences are flushed/rejected.
    pub fn decode_chunk(&mut self, bytes: &[u8], last: bool) -> Result<String, WebError> {
        let mut out = String::with_capacity(bytes.len());
        let (result, _read, had_errors) = self.decoder.decode_to_string(bytes, &mut out, last);
        if self.fatal && had_errors {
            return Err(WebError::Encoding("invalid UTF-8 sequence".into()));
        }
        debug_assert_eq!(result, encoding_rs::CoderResult::InputEmpty);
        Ok(out)
    }
}

impl Default for TextDecoderStream {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_round_trips_ascii() {
        let encoder = TextEncoderStream::new();
        assert_eq!(encoder.encode_chunk("hi"), b"hi".to_vec());
    }

    #[test]
    fn decode_rejects_invalid_utf8_in_fatal_mode() {
        let mut decoder = TextDecoderStream::new(true);
        let invalid = [0xff, 0xfe];
        assert!(decoder.decode_chunk(&invalid, true).is_err());
    }

    #[test]
    fn decode_is_lossy_when_not_fatal() {
        let mut decoder = TextDecoderStream::new(false);
        let invalid = [0xff];
        assert!(decoder.decode_chunk(&invalid, true).is_ok());
    }
}
