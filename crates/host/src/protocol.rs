//! Wire frames exchanged between the host and a worker
//!
//! Every frame travels as exactly one `SOCK_SEQPACKET` packet:
//!
//! ```text
//! [kind: u8][len: u32 BE][len bytes of JSON]
//! ```
//!
//! Descriptors ride along as `SCM_RIGHTS` ancillary data of the same packet.
//!
//! A frame bigger than the socket will take in one packet is sent as a bare
//! header with the kind's high bit set and `len` zero; its body is the
//! content of the last attached descriptor.

use osforge_errors::{ErrorEnvelope, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest frame either side will send or accept
pub const MAX_PACKET: usize = 4 * 1024 * 1024;

/// Largest packet sent inline; bigger frames move their body to a descriptor
pub const INLINE_LIMIT: usize = 64 * 1024;

/// Most descriptors accepted on a single packet
pub const MAX_FDS: usize = 32;

pub(crate) const HEADER_LEN: usize = 5;

/// Kind flag of a header whose body travels in a descriptor
const SPILLED: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Call = 1,
    Reply = 2,
    Signal = 3,
    Error = 4,
}

impl FrameKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Call),
            2 => Some(Self::Reply),
            3 => Some(Self::Signal),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Reply => "reply",
            Self::Signal => "signal",
            Self::Error => "error",
        }
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Request to run `method` with `args`
    Call { method: String, args: Value },
    /// Successful terminal answer to a call
    Reply { result: Value },
    /// Out-of-band message emitted while a call is in flight
    Signal { payload: Value },
    /// Failed terminal answer to a call
    Error { error: ErrorEnvelope },
}

#[derive(Serialize, Deserialize)]
struct CallBody {
    method: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    result: Value,
}

#[derive(Serialize, Deserialize)]
struct SignalBody {
    #[serde(default)]
    payload: Value,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error: ErrorEnvelope,
}

fn malformed(message: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed {
        message: message.into(),
    }
}

impl Frame {
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Call { .. } => FrameKind::Call,
            Self::Reply { .. } => FrameKind::Reply,
            Self::Signal { .. } => FrameKind::Signal,
            Self::Error { .. } => FrameKind::Error,
        }
    }

    /// Whether this frame ends a call
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reply { .. } | Self::Error { .. })
    }

    /// Encode into a single packet
    ///
    /// # Errors
    /// Fails if the body cannot be serialized or the packet would exceed
    /// [`MAX_PACKET`].
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = match self {
            Self::Call { method, args } => serde_json::to_vec(&CallBody {
                method: method.clone(),
                args: args.clone(),
            }),
            Self::Reply { result } => serde_json::to_vec(&ReplyBody {
                result: result.clone(),
            }),
            Self::Signal { payload } => serde_json::to_vec(&SignalBody {
                payload: payload.clone(),
            }),
            Self::Error { error } => serde_json::to_vec(&ErrorBody {
                error: error.clone(),
            }),
        }
        .map_err(|e| malformed(format!("cannot encode {}: {e}", self.kind().as_str())))?;

        if body.len() + HEADER_LEN > MAX_PACKET {
            return Err(malformed(format!(
                "{} frame of {} bytes exceeds the {MAX_PACKET} byte limit",
                self.kind().as_str(),
                body.len()
            )));
        }
        let len = u32::try_from(body.len()).map_err(|_| malformed("frame length overflow"))?;

        let mut packet = Vec::with_capacity(HEADER_LEN + body.len());
        packet.push(self.kind() as u8);
        packet.extend_from_slice(&len.to_be_bytes());
        packet.extend_from_slice(&body);
        Ok(packet)
    }

    /// Header announcing a body carried by a descriptor
    pub(crate) fn spilled_header(&self) -> [u8; HEADER_LEN] {
        [self.kind() as u8 | SPILLED, 0, 0, 0, 0]
    }

    /// Decode one packet
    ///
    /// # Errors
    /// Returns `ProtocolError::Malformed` for a short header, an unknown
    /// kind, a length that disagrees with the packet size, or a body that
    /// does not match the kind.
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        if packet.len() < HEADER_LEN {
            return Err(malformed(format!("short packet of {} bytes", packet.len())));
        }

        let kind = FrameKind::from_u8(packet[0])
            .ok_or_else(|| malformed(format!("unknown frame kind {}", packet[0])))?;
        let len = u32::from_be_bytes([packet[1], packet[2], packet[3], packet[4]]) as usize;
        let body = &packet[HEADER_LEN..];
        if len != body.len() {
            return Err(malformed(format!(
                "length field says {len} bytes, packet carries {}",
                body.len()
            )));
        }

        let bad_body = |e: serde_json::Error| malformed(format!("bad {} body: {e}", kind.as_str()));
        let frame = match kind {
            FrameKind::Call => {
                let CallBody { method, args } = serde_json::from_slice(body).map_err(bad_body)?;
                Self::Call { method, args }
            }
            FrameKind::Reply => {
                let ReplyBody { result } = serde_json::from_slice(body).map_err(bad_body)?;
                Self::Reply { result }
            }
            FrameKind::Signal => {
                let SignalBody { payload } = serde_json::from_slice(body).map_err(bad_body)?;
                Self::Signal { payload }
            }
            FrameKind::Error => {
                let ErrorBody { error } = serde_json::from_slice(body).map_err(bad_body)?;
                Self::Error { error }
            }
        };
        Ok(frame)
    }
}

/// Whether `packet` is a header whose body travels in a descriptor
pub(crate) fn is_spilled(packet: &[u8]) -> bool {
    packet.first().is_some_and(|kind| kind & SPILLED != 0)
}

/// Rebuild a complete packet from a spilled header and its body
pub(crate) fn unspill(header: &[u8], body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if header.len() != HEADER_LEN || header[1..] != [0, 0, 0, 0] {
        return Err(malformed("spilled header carries an inline body"));
    }
    if body.len() + HEADER_LEN > MAX_PACKET {
        return Err(malformed(format!(
            "spilled body of {} bytes exceeds the {MAX_PACKET} byte limit",
            body.len()
        )));
    }
    let len = u32::try_from(body.len()).map_err(|_| malformed("frame length overflow"))?;

    let mut packet = Vec::with_capacity(HEADER_LEN + body.len());
    packet.push(header[0] & !SPILLED);
    packet.extend_from_slice(&len.to_be_bytes());
    packet.extend_from_slice(body);
    Ok(packet)
}
