//! Incremental decoder for raw notification records
//!
//! A record is a 16-byte header (handle, mask, cookie, name length, all in
//! native byte order) followed by `name length` bytes of NUL-padded name.
//! The stream is not self-delimiting and reads may tear a record anywhere,
//! including between the header and its name, so a record is only consumed
//! once both parts are buffered. Everything else stays in the buffer for
//! the next read.

use crate::source::{InotifyMask, WatchHandle};
use bytes::BytesMut;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use thiserror::Error;

/// Size of the fixed record header
pub const HEADER_SIZE: usize = 16;

/// Largest name length accepted from the stream
///
/// The kernel never sends more than NAME_MAX plus padding; anything larger
/// means the stream is out of sync.
pub const MAX_NAME_LEN: usize = 4096;

/// One decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub mask: InotifyMask,
    pub cookie: u32,
    /// Present iff the record declared a non-empty name
    pub name: Option<OsString>,
}

/// Stream corruption detected while decoding
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record declares a {0}-byte name (limit {MAX_NAME_LEN})")]
    NameTooLong(usize),
}

/// Decoder holding the unconsumed tail between reads
#[derive(Debug, Default)]
pub struct EventCodec {
    buf: BytesMut,
}

impl EventCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes waiting for the rest of their record
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Decode the next complete record, if one is buffered
    pub fn decode_next(&mut self) -> Result<Option<RawEvent>, CodecError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let name_len = read_u32(&self.buf, 12) as usize;
        if name_len > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong(name_len));
        }
        if self.buf.len() < HEADER_SIZE + name_len {
            return Ok(None);
        }

        let record = self.buf.split_to(HEADER_SIZE + name_len);
        let handle = read_u32(&record, 0) as WatchHandle;
        let mask = InotifyMask::from_bits_retain(read_u32(&record, 4));
        let cookie = read_u32(&record, 8);
        let name = decode_name(&record[HEADER_SIZE..]);

        Ok(Some(RawEvent {
            handle,
            mask,
            cookie,
            name,
        }))
    }

    /// Decode every complete record currently buffered
    pub fn decode_all(&mut self) -> Result<Vec<RawEvent>, CodecError> {
        let mut events = Vec::new();
        while let Some(event) = self.decode_next()? {
            events.push(event);
        }
        Ok(events)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(word)
}

/// Strip the NUL padding; an all-padding name counts as absent
fn decode_name(raw: &[u8]) -> Option<OsString> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if end == 0 {
        return None;
    }
    Some(OsStr::from_bytes(&raw[..end]).to_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encode_record;

    #[test]
    fn test_decodes_consecutive_records() {
        let mut codec = EventCodec::new();
        let mut bytes = encode_record(1, InotifyMask::CREATE, 0, Some("a.txt"));
        bytes.extend(encode_record(2, InotifyMask::DELETE_SELF, 0, None));
        codec.extend(&bytes);

        let events = codec.decode_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].handle, 1);
        assert_eq!(events[0].name.as_deref(), Some(OsStr::new("a.txt")));
        assert_eq!(events[1].mask, InotifyMask::DELETE_SELF);
        assert_eq!(events[1].name, None);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_torn_header_is_retained() {
        let mut codec = EventCodec::new();
        let bytes = encode_record(3, InotifyMask::MODIFY, 0, Some("f"));
        codec.extend(&bytes[..10]);

        assert!(codec.decode_next().unwrap().is_none());
        assert_eq!(codec.buffered(), 10);

        codec.extend(&bytes[10..]);
        let event = codec.decode_next().unwrap().unwrap();
        assert_eq!(event.handle, 3);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_header_without_name_is_not_consumed() {
        // A read that ends right after the header must not emit a record
        // with a truncated or missing name.
        let mut codec = EventCodec::new();
        let bytes = encode_record(4, InotifyMask::MOVED_TO, 9, Some("renamed.txt"));
        codec.extend(&bytes[..HEADER_SIZE + 3]);

        assert!(codec.decode_next().unwrap().is_none());
        assert_eq!(codec.buffered(), HEADER_SIZE + 3);

        codec.extend(&bytes[HEADER_SIZE + 3..]);
        let event = codec.decode_next().unwrap().unwrap();
        assert_eq!(event.cookie, 9);
        assert_eq!(event.name.as_deref(), Some(OsStr::new("renamed.txt")));
    }

    #[test]
    fn test_complete_records_emitted_before_tail() {
        let mut codec = EventCodec::new();
        let mut bytes = encode_record(1, InotifyMask::CREATE, 0, Some("one"));
        let second = encode_record(1, InotifyMask::CREATE, 0, Some("two"));
        bytes.extend(&second[..HEADER_SIZE]);
        codec.extend(&bytes);

        let events = codec.decode_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(codec.buffered(), HEADER_SIZE);
    }

    #[test]
    fn test_all_padding_name_is_absent() {
        let mut codec = EventCodec::new();
        let mut bytes = encode_record(5, InotifyMask::IGNORED, 0, None);
        // Rewrite the length field to declare 16 bytes of pure padding.
        bytes[12..16].copy_from_slice(&16u32.to_ne_bytes());
        bytes.extend([0u8; 16]);
        codec.extend(&bytes);

        let event = codec.decode_next().unwrap().unwrap();
        assert_eq!(event.name, None);
    }

    #[test]
    fn test_oversized_name_is_rejected() {
        let mut codec = EventCodec::new();
        let mut bytes = encode_record(6, InotifyMask::CREATE, 0, None);
        bytes[12..16].copy_from_slice(&((MAX_NAME_LEN as u32) + 1).to_ne_bytes());
        codec.extend(&bytes);

        assert!(matches!(
            codec.decode_next(),
            Err(CodecError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_overflow_record_has_negative_handle() {
        let mut codec = EventCodec::new();
        codec.extend(&encode_record(-1, InotifyMask::Q_OVERFLOW, 0, None));
        let event = codec.decode_next().unwrap().unwrap();
        assert_eq!(event.handle, -1);
        assert!(event.mask.contains(InotifyMask::Q_OVERFLOW));
    }
}
