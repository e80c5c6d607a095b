//! Byte encodings for keys, values and log frames.
//!
//! # Frame
//!
//! ```text
//! u32 BE body length | u8 kind | u32 BE key length | key | value
//! ```
//!
//! # Key
//!
//! ```text
//! u32 BE category length | category | label
//! ```
//!
//! The category is length-prefixed so any byte sequence, separators and
//! NUL included, round-trips.
//!
//! # Value
//!
//! A versioned JSON envelope. Durations are stored in nanoseconds so a
//! track reads back exactly as it was written.

use chrono::{DateTime, Duration, Utc};
use gone_core::{FocusTarget, StoreError, Track};
use serde::{Deserialize, Serialize};

pub const KIND_PUT: u8 = 1;
pub const KIND_DELETE: u8 = 2;

const LEN: usize = 4;
const ENVELOPE_VERSION: u32 = 1;

/// Size of the frame length prefix.
pub const FRAME_HEADER: usize = LEN;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    seen: DateTime<Utc>,
    spent_ns: i64,
    idle_ns: i64,
}

/// A decoded frame body borrowing from the segment buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: u8,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

fn length(len: usize) -> Result<[u8; LEN], StoreError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| StoreError::Codec(format!("field too large: {len} bytes")))
}

fn read_len(bytes: &[u8]) -> Option<usize> {
    let prefix: [u8; LEN] = bytes.get(..LEN)?.try_into().ok()?;
    usize::try_from(u32::from_be_bytes(prefix)).ok()
}

pub fn encode_key(target: &FocusTarget) -> Result<Vec<u8>, StoreError> {
    let category = target.category.as_bytes();
    let label = target.label.as_bytes();
    let mut key = Vec::with_capacity(LEN + category.len() + label.len());
    key.extend_from_slice(&length(category.len())?);
    key.extend_from_slice(category);
    key.extend_from_slice(label);
    Ok(key)
}

pub fn decode_key(key: &[u8]) -> Result<FocusTarget, StoreError> {
    let category_len =
        read_len(key).ok_or_else(|| StoreError::Codec("key shorter than its prefix".into()))?;
    let rest = &key[LEN..];
    if category_len > rest.len() {
        return Err(StoreError::Codec(format!(
            "category length {category_len} exceeds key length {}",
            rest.len()
        )));
    }
    let (category, label) = rest.split_at(category_len);
    let text = |bytes: &[u8]| {
        String::from_utf8(bytes.to_vec())
            .map_err(|err| StoreError::Codec(format!("key is not UTF-8: {err}")))
    };
    Ok(FocusTarget::new(text(category)?, text(label)?))
}

pub fn encode_track(track: &Track) -> Result<Vec<u8>, StoreError> {
    let nanos = |d: Duration| {
        d.num_nanoseconds()
            .ok_or_else(|| StoreError::Codec(format!("duration out of range: {d}")))
    };
    let envelope = Envelope {
        v: ENVELOPE_VERSION,
        seen: track.seen,
        spent_ns: nanos(track.spent)?,
        idle_ns: nanos(track.idle)?,
    };
    serde_json::to_vec(&envelope).map_err(|err| StoreError::Codec(err.to_string()))
}

pub fn decode_track(value: &[u8]) -> Result<Track, StoreError> {
    let envelope: Envelope =
        serde_json::from_slice(value).map_err(|err| StoreError::Codec(err.to_string()))?;
    if envelope.v != ENVELOPE_VERSION {
        return Err(StoreError::Codec(format!(
            "unsupported track version {}",
            envelope.v
        )));
    }
    Ok(Track {
        seen: envelope.seen,
        spent: Duration::nanoseconds(envelope.spent_ns),
        idle: Duration::nanoseconds(envelope.idle_ns),
    })
}

pub fn encode_frame(kind: u8, key: &[u8], value: &[u8]) -> Result<Vec<u8>, StoreError> {
    let body_len = 1 + LEN + key.len() + value.len();
    let mut frame = Vec::with_capacity(LEN + body_len);
    frame.extend_from_slice(&length(body_len)?);
    frame.push(kind);
    frame.extend_from_slice(&length(key.len())?);
    frame.extend_from_slice(key);
    frame.extend_from_slice(value);
    Ok(frame)
}

/// Parses a complete frame, length prefix included.
pub fn decode_frame(frame: &[u8]) -> Result<Frame<'_>, String> {
    let body_len = read_len(frame).ok_or("frame shorter than its prefix")?;
    let body = frame
        .get(LEN..LEN + body_len)
        .ok_or_else(|| format!("frame body truncated, want {body_len} bytes"))?;
    let (&kind, rest) = body.split_first().ok_or("empty frame body")?;
    if kind != KIND_PUT && kind != KIND_DELETE {
        return Err(format!("unknown frame kind {kind}"));
    }
    let key_len = read_len(rest).ok_or("frame key length truncated")?;
    let rest = &rest[LEN..];
    if key_len > rest.len() {
        return Err(format!("key length {key_len} exceeds frame body"));
    }
    let (key, value) = rest.split_at(key_len);
    Ok(Frame { kind, key, value })
}

/// Total length (prefix included) of the frame starting at `bytes`, if the
/// whole frame is present.
pub fn frame_len(bytes: &[u8]) -> Option<usize> {
    let body_len = read_len(bytes)?;
    let total = LEN.checked_add(body_len)?;
    (total <= bytes.len()).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keys_with_separators_round_trip() {
        for (category, label) in [
            ("xterm", "vim"),
            ("a=::=b", "c=::=d"),
            ("tab\there", "nul\0byte"),
            ("", ""),
            ("", "only label"),
            ("ünïcödé", "タイトル"),
        ] {
            let target = FocusTarget::new(category, label);
            let key = encode_key(&target).unwrap();
            assert_eq!(decode_key(&key).unwrap(), target);
        }
    }

    #[test]
    fn distinct_targets_never_share_a_key() {
        let left = encode_key(&FocusTarget::new("ab", "c")).unwrap();
        let right = encode_key(&FocusTarget::new("a", "bc")).unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(decode_key(&[0, 0]).is_err());
        assert!(decode_key(&[0, 0, 0, 9, b'a']).is_err());
    }

    #[test]
    fn track_keeps_nanosecond_precision() {
        let track = Track {
            seen: Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            spent: Duration::nanoseconds(90_000_000_001),
            idle: Duration::nanoseconds(7),
        };
        let value = encode_track(&track).unwrap();
        assert_eq!(decode_track(&value).unwrap(), track);
    }

    #[test]
    fn unknown_envelope_version_is_rejected() {
        let value = br#"{"v":2,"seen":"2024-01-01T00:00:00Z","spent_ns":0,"idle_ns":0}"#;
        let err = decode_track(value).unwrap_err();
        assert!(err.to_string().contains("unsupported track version 2"));
    }

    #[test]
    fn frame_round_trip() {
        let frame = encode_frame(KIND_PUT, b"key", b"value").unwrap();
        assert_eq!(frame_len(&frame), Some(frame.len()));

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.kind, KIND_PUT);
        assert_eq!(decoded.key, b"key");
        assert_eq!(decoded.value, b"value");
    }

    #[test]
    fn partial_frame_has_no_length() {
        let frame = encode_frame(KIND_DELETE, b"key", b"").unwrap();
        assert_eq!(frame_len(&frame[..frame.len() - 1]), None);
        assert_eq!(frame_len(&frame[..2]), None);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut frame = encode_frame(KIND_PUT, b"k", b"v").unwrap();
        frame[FRAME_HEADER] = 9;
        assert!(decode_frame(&frame).is_err());
    }
}
