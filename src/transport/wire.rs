//! Frame encoding and decoding.
//!
//! A data frame is `[payload bytes][sequence: u64]` behind a 2-byte tag.
//! Datagram transports send one frame per datagram; stream transports
//! prefix every frame with a `u16` length and additionally carry a send
//! timestamp in data frames. All integers are big-endian.

use thiserror::Error;

/// Frame sizing constants.
pub mod sizes {
    /// Frame kind byte plus a reserved byte.
    pub const TAG_SIZE: usize = 2;

    /// Trailing sequence number of a data frame.
    pub const SEQ_SIZE: usize = 8;

    /// Length prefix on stream transports.
    pub const LEN_PREFIX_SIZE: usize = 2;

    /// Send timestamp carried by stream data frames.
    pub const TIMESTAMP_SIZE: usize = 8;

    /// Per-packet overhead on datagram transports.
    pub const DATAGRAM_OVERHEAD: usize = TAG_SIZE + SEQ_SIZE;

    /// Per-packet overhead on stream transports.
    pub const STREAM_OVERHEAD: usize = LEN_PREFIX_SIZE + TAG_SIZE + TIMESTAMP_SIZE + SEQ_SIZE;

    /// Largest encodable frame; bounded by the u16 length prefix.
    pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;
}

const KIND_DATA: u8 = 0x00;
const KIND_START: u8 = 0x01;
const KIND_START_ACK: u8 = 0x02;
const KIND_SHUTDOWN: u8 = 0x03;

/// How frames are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One frame per datagram, no length prefix.
    Datagram,
    /// Length-prefixed frames with a timestamp field in data frames.
    Stream,
}

impl Framing {
    /// Fixed per-packet overhead of a data frame.
    pub fn overhead(self) -> usize {
        match self {
            Framing::Datagram => sizes::DATAGRAM_OVERHEAD,
            Framing::Stream => sizes::STREAM_OVERHEAD,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A measurement packet.
    Data {
        /// Emission-order sequence number.
        seq: u64,
        /// Size of the packet on the wire, overhead included.
        wire_len: usize,
        /// Sender timestamp in microseconds (stream framing only). Carried
        /// for one-way delay experiments; loss accounting ignores it.
        timestamp: Option<u64>,
    },
    /// Client requests a measuring session.
    Start {
        /// Target packets per interval negotiated for the run.
        packets_per_interval: u32,
    },
    /// Server accepted the start request.
    StartAck,
    /// Terminate the peer session.
    Shutdown,
}

/// Malformed frame errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame shorter than its fixed layout requires.
    #[error("truncated frame: need {need} bytes, got {got}")]
    Truncated {
        /// Minimum bytes the layout requires.
        need: usize,
        /// Bytes actually present.
        got: usize,
    },

    /// Unrecognized frame kind byte.
    #[error("unknown frame kind 0x{0:02x}")]
    UnknownKind(u8),
}

fn put_tag(buf: &mut Vec<u8>, kind: u8) {
    buf.push(kind);
    buf.push(0);
}

/// Encode a data frame into `buf` (assumed empty), filling `payload_len`
/// generated bytes. The resulting wire size is `payload_len` plus the
/// framing overhead.
pub fn encode_data(
    framing: Framing,
    buf: &mut Vec<u8>,
    payload_len: usize,
    seq: u64,
    timestamp_micros: u64,
) {
    debug_assert!(buf.is_empty());
    match framing {
        Framing::Datagram => {
            buf.reserve(sizes::DATAGRAM_OVERHEAD + payload_len);
            put_tag(buf, KIND_DATA);
            buf.resize(buf.len() + payload_len, crate::core::constants::FILL_BYTE);
            buf.extend_from_slice(&seq.to_be_bytes());
        }
        Framing::Stream => {
            let body = sizes::TAG_SIZE + sizes::TIMESTAMP_SIZE + payload_len + sizes::SEQ_SIZE;
            buf.reserve(sizes::LEN_PREFIX_SIZE + body);
            buf.extend_from_slice(&(body as u16).to_be_bytes());
            put_tag(buf, KIND_DATA);
            buf.extend_from_slice(&timestamp_micros.to_be_bytes());
            buf.resize(buf.len() + payload_len, crate::core::constants::FILL_BYTE);
            buf.extend_from_slice(&seq.to_be_bytes());
        }
    }
}

/// Encode a start request.
pub fn encode_start(framing: Framing, packets_per_interval: u32) -> Vec<u8> {
    encode_control(framing, KIND_START, &packets_per_interval.to_be_bytes())
}

/// Encode a start acknowledgment.
pub fn encode_start_ack(framing: Framing) -> Vec<u8> {
    encode_control(framing, KIND_START_ACK, &[])
}

/// Encode a shutdown notice.
pub fn encode_shutdown(framing: Framing) -> Vec<u8> {
    encode_control(framing, KIND_SHUTDOWN, &[])
}

fn encode_control(framing: Framing, kind: u8, fields: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(sizes::LEN_PREFIX_SIZE + sizes::TAG_SIZE + fields.len());
    if framing == Framing::Stream {
        let body = (sizes::TAG_SIZE + fields.len()) as u16;
        buf.extend_from_slice(&body.to_be_bytes());
    }
    put_tag(&mut buf, kind);
    buf.extend_from_slice(fields);
    buf
}

/// Decode a whole frame, dispatching on the framing.
///
/// For stream framing `buf` must hold the length prefix and exactly the
/// body it announces (the reader assembles that before calling in).
pub fn decode_frame(framing: Framing, buf: &[u8]) -> Result<Frame, WireError> {
    match framing {
        Framing::Datagram => decode_datagram(buf),
        Framing::Stream => {
            if buf.len() < sizes::LEN_PREFIX_SIZE {
                return Err(WireError::Truncated {
                    need: sizes::LEN_PREFIX_SIZE,
                    got: buf.len(),
                });
            }
            decode_stream_body(&buf[sizes::LEN_PREFIX_SIZE..])
        }
    }
}

/// Decode one datagram.
pub fn decode_datagram(buf: &[u8]) -> Result<Frame, WireError> {
    let (kind, rest) = split_tag(buf)?;
    match kind {
        KIND_DATA => {
            if buf.len() < sizes::DATAGRAM_OVERHEAD {
                return Err(WireError::Truncated {
                    need: sizes::DATAGRAM_OVERHEAD,
                    got: buf.len(),
                });
            }
            Ok(Frame::Data {
                seq: read_u64(&rest[rest.len() - sizes::SEQ_SIZE..]),
                wire_len: buf.len(),
                timestamp: None,
            })
        }
        _ => decode_control(kind, rest),
    }
}

/// Decode a stream frame body (everything after the length prefix).
///
/// The reported wire length includes the prefix, so byte counts reflect
/// what actually crossed the wire.
pub fn decode_stream_body(body: &[u8]) -> Result<Frame, WireError> {
    let (kind, rest) = split_tag(body)?;
    match kind {
        KIND_DATA => {
            let need = sizes::STREAM_OVERHEAD - sizes::LEN_PREFIX_SIZE;
            if body.len() < need {
                return Err(WireError::Truncated {
                    need,
                    got: body.len(),
                });
            }
            Ok(Frame::Data {
                seq: read_u64(&rest[rest.len() - sizes::SEQ_SIZE..]),
                wire_len: sizes::LEN_PREFIX_SIZE + body.len(),
                timestamp: Some(read_u64(&rest[..sizes::TIMESTAMP_SIZE])),
            })
        }
        _ => decode_control(kind, rest),
    }
}

fn decode_control(kind: u8, fields: &[u8]) -> Result<Frame, WireError> {
    match kind {
        KIND_START => {
            if fields.len() < 4 {
                return Err(WireError::Truncated {
                    need: sizes::TAG_SIZE + 4,
                    got: sizes::TAG_SIZE + fields.len(),
                });
            }
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&fields[..4]);
            Ok(Frame::Start {
                packets_per_interval: u32::from_be_bytes(raw),
            })
        }
        KIND_START_ACK => Ok(Frame::StartAck),
        KIND_SHUTDOWN => Ok(Frame::Shutdown),
        other => Err(WireError::UnknownKind(other)),
    }
}

fn split_tag(buf: &[u8]) -> Result<(u8, &[u8]), WireError> {
    if buf.len() < sizes::TAG_SIZE {
        return Err(WireError::Truncated {
            need: sizes::TAG_SIZE,
            got: buf.len(),
        });
    }
    Ok((buf[0], &buf[sizes::TAG_SIZE..]))
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(raw)
}
