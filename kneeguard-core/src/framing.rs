//! JSON document framing for the smoothness-analysis stream
//!
//! The analysis link is a plain byte stream, so something has to say where one
//! document ends. Two framings are supported:
//!
//! ```text
//! LengthPrefixed:  ┌──────────────┬───────────────────────┐
//!                  │ u32 BE len   │ len bytes of JSON     │
//!                  └──────────────┴───────────────────────┘
//!
//! Unframed:        ┌───────────────────────┐
//!                  │ one JSON document     │   end = closing brace, read bounded by a byte limit
//!                  └───────────────────────┘
//! ```
//!
//! `LengthPrefixed` is the default. `Unframed` exists for analysis services that write
//! a bare document per request.
//!
//! Failures are split the same way as everywhere else: socket problems (including a
//! peer that closed mid-document) are `Transport`, bad bytes are `Decode`.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{KneeGuardError, KneeGuardResult};

/// How documents are delimited on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// 4-byte big-endian length, then the document
    #[default]
    LengthPrefixed,
    /// Bare document, delimited by its own syntax
    Unframed,
}

/// Serialize `value` and write it as one framed document
pub fn write_json<T: Serialize, W: Write>(writer: &mut W, framing: Framing, value: &T) -> KneeGuardResult<()> {
    let body = serde_json::to_vec(value)
        .map_err(|e| KneeGuardError::Decode(format!("cannot encode document: {e}")))?;

    let io = |e: std::io::Error| KneeGuardError::Transport(e.to_string());
    if framing == Framing::LengthPrefixed {
        let len = u32::try_from(body.len())
            .map_err(|_| KneeGuardError::Transport("document exceeds u32 length prefix".into()))?;
        writer.write_all(&len.to_be_bytes()).map_err(io)?;
    }
    writer.write_all(&body).map_err(io)?;
    writer.flush().map_err(io)
}

/// Read exactly one framed document of at most `max_bytes` and decode it
pub fn read_json<T: DeserializeOwned, R: Read>(
    reader: &mut R,
    framing: Framing,
    max_bytes: usize,
) -> KneeGuardResult<T> {
    match framing {
        Framing::LengthPrefixed => {
            let io = |e: std::io::Error| KneeGuardError::Transport(e.to_string());
            let mut prefix = [0u8; 4];
            reader.read_exact(&mut prefix).map_err(io)?;

            let len = u32::from_be_bytes(prefix) as usize;
            if len > max_bytes {
                return Err(KneeGuardError::Decode(format!(
                    "frame of {len} bytes exceeds limit of {max_bytes}"
                )));
            }

            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(io)?;
            serde_json::from_slice(&body).map_err(KneeGuardError::from)
        }
        Framing::Unframed => {
            let bounded = reader.by_ref().take(max_bytes as u64);
            let mut de = serde_json::Deserializer::from_reader(bounded);
            T::deserialize(&mut de).map_err(|e| {
                if e.is_io() || e.is_eof() {
                    KneeGuardError::Transport(e.to_string())
                } else {
                    KneeGuardError::Decode(e.to_string())
                }
            })
        }
    }
}
