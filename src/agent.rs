//! Messages exchanged with the host agent, and their binary framing.
//!
//! Every message is a [`Header`] of four little-endian `u32`s (kind, two arguments, payload
//! size) followed by the payload.

use bytes::{Buf, BufMut, BytesMut};
use log::warn;

use crate::resolution::{MonitorConfig, MonitorsConfig};
use crate::{ContentType, Selection};

/// Size of an encoded [`Header`].
pub const HEADER_SIZE: usize = 16;

/// Message kinds.
pub mod kind {
    pub const GUEST_RESOLUTION: u32 = 0;
    pub const MONITORS_CONFIG: u32 = 1;
    pub const CLIPBOARD_GRAB: u32 = 2;
    pub const CLIPBOARD_REQUEST: u32 = 3;
    pub const CLIPBOARD_DATA: u32 = 4;
    pub const CLIPBOARD_RELEASE: u32 = 5;
}

const MONITOR_RECORD_SIZE: usize = 5 * 4;

/// Upper bound on the buffer space reserved ahead for a partially received message.
pub const MAX_RESERVE: usize = 64 * 1024;

/// Errors that can occur while decoding agent messages.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("Message truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unknown message kind {0}")]
    UnknownKind(u32),

    #[error("Unknown selection {0}")]
    UnknownSelection(u32),

    #[error("Unknown content type {0}")]
    UnknownContentType(u32),
}

/// The fixed-size part of every message.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct Header {
    pub kind: u32,
    pub arg1: u32,
    pub arg2: u32,
    /// Size of the payload following the header.
    pub size: u32,
}

impl Header {
    pub fn decode(mut buf: &[u8]) -> Result<Self, DecodeError> {
        check_len(buf, HEADER_SIZE)?;
        Ok(Self {
            kind: buf.get_u32_le(),
            arg1: buf.get_u32_le(),
            arg2: buf.get_u32_le(),
            size: buf.get_u32_le(),
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE);
        buf.put_u32_le(self.kind);
        buf.put_u32_le(self.arg1);
        buf.put_u32_le(self.arg2);
        buf.put_u32_le(self.size);
    }
}

/// A message from the bridge to the agent.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum AgentMessage {
    /// The size of the local desktop changed (or is reported for the first time).
    GuestResolution { width: u32, height: u32 },
    /// A desktop application owns the selection and offers these content types.
    ClipboardGrab {
        selection: Selection,
        types: Vec<ContentType>,
    },
    /// A desktop application wants the remote client's data in this content type.
    ClipboardRequest {
        selection: Selection,
        content_type: ContentType,
    },
    /// The answer to an [`AgentRequest::ClipboardRequest`].
    ///
    /// `content_type` is [`ContentType::None`] and `data` is empty when the data could not be
    /// fetched.
    ClipboardData {
        selection: Selection,
        content_type: ContentType,
        data: Vec<u8>,
    },
    /// The desktop application which owned the selection gave it up.
    ClipboardRelease { selection: Selection },
}

impl AgentMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AgentMessage::GuestResolution { width, height } => {
                frame(buf, kind::GUEST_RESOLUTION, 0, 0, 8);
                buf.put_u32_le(*width);
                buf.put_u32_le(*height);
            }
            AgentMessage::ClipboardGrab { selection, types } => {
                frame(buf, kind::CLIPBOARD_GRAB, selection.to_wire(), 0, types.len() * 4);
                for content_type in types {
                    buf.put_u32_le(content_type.to_wire());
                }
            }
            AgentMessage::ClipboardRequest {
                selection,
                content_type,
            } => frame(
                buf,
                kind::CLIPBOARD_REQUEST,
                selection.to_wire(),
                content_type.to_wire(),
                0,
            ),
            AgentMessage::ClipboardData {
                selection,
                content_type,
                data,
            } => {
                frame(
                    buf,
                    kind::CLIPBOARD_DATA,
                    selection.to_wire(),
                    content_type.to_wire(),
                    data.len(),
                );
                buf.put_slice(data);
            }
            AgentMessage::ClipboardRelease { selection } => {
                frame(buf, kind::CLIPBOARD_RELEASE, selection.to_wire(), 0, 0)
            }
        }
    }
}

/// A request from the agent to the bridge.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum AgentRequest {
    /// Resize the local desktop to match the remote client's monitors.
    MonitorsConfig(MonitorsConfig),
    /// The remote client owns the selection and offers these content types.
    ClipboardGrab {
        selection: Selection,
        types: Vec<ContentType>,
    },
    /// The remote client wants the selection data in this content type.
    ClipboardRequest {
        selection: Selection,
        content_type: ContentType,
    },
    /// The answer to an [`AgentMessage::ClipboardRequest`].
    ClipboardData {
        selection: Selection,
        content_type: ContentType,
        data: Vec<u8>,
    },
    /// The remote client no longer owns the selection.
    ClipboardRelease { selection: Selection },
}

impl AgentRequest {
    /// Decodes a request from its header and payload.
    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self, DecodeError> {
        check_len(payload, header.size as usize)?;
        let payload = &payload[..header.size as usize];

        let request = match header.kind {
            kind::MONITORS_CONFIG => AgentRequest::MonitorsConfig(decode_monitors(payload)?),
            kind::CLIPBOARD_GRAB => {
                let selection = decode_selection(header.arg1)?;
                check_len(payload, payload.len().next_multiple_of(4))?;
                let types = payload
                    .chunks_exact(4)
                    .map(|mut chunk| chunk.get_u32_le())
                    .filter_map(|value| {
                        let content_type = ContentType::from_wire(value);
                        if content_type.is_none() {
                            warn!(
                                "{}: dropping unknown content type {} from grab",
                                selection, value
                            );
                        }
                        content_type
                    })
                    .collect();
                AgentRequest::ClipboardGrab { selection, types }
            }
            kind::CLIPBOARD_REQUEST => AgentRequest::ClipboardRequest {
                selection: decode_selection(header.arg1)?,
                content_type: decode_content_type(header.arg2)?,
            },
            kind::CLIPBOARD_DATA => AgentRequest::ClipboardData {
                selection: decode_selection(header.arg1)?,
                content_type: decode_content_type(header.arg2)?,
                data: payload.to_vec(),
            },
            kind::CLIPBOARD_RELEASE => AgentRequest::ClipboardRelease {
                selection: decode_selection(header.arg1)?,
            },
            other => return Err(DecodeError::UnknownKind(other)),
        };

        Ok(request)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AgentRequest::MonitorsConfig(config) => {
                let size = 8 + config.monitors.len() * MONITOR_RECORD_SIZE;
                frame(buf, kind::MONITORS_CONFIG, 0, 0, size);
                buf.put_u32_le(config.monitors.len() as u32);
                buf.put_u32_le(config.flags);
                for monitor in &config.monitors {
                    buf.put_u32_le(monitor.height);
                    buf.put_u32_le(monitor.width);
                    buf.put_u32_le(monitor.depth);
                    buf.put_i32_le(monitor.x);
                    buf.put_i32_le(monitor.y);
                }
            }
            AgentRequest::ClipboardGrab { selection, types } => {
                frame(buf, kind::CLIPBOARD_GRAB, selection.to_wire(), 0, types.len() * 4);
                for content_type in types {
                    buf.put_u32_le(content_type.to_wire());
                }
            }
            AgentRequest::ClipboardRequest {
                selection,
                content_type,
            } => frame(
                buf,
                kind::CLIPBOARD_REQUEST,
                selection.to_wire(),
                content_type.to_wire(),
                0,
            ),
            AgentRequest::ClipboardData {
                selection,
                content_type,
                data,
            } => {
                frame(
                    buf,
                    kind::CLIPBOARD_DATA,
                    selection.to_wire(),
                    content_type.to_wire(),
                    data.len(),
                );
                buf.put_slice(data);
            }
            AgentRequest::ClipboardRelease { selection } => {
                frame(buf, kind::CLIPBOARD_RELEASE, selection.to_wire(), 0, 0)
            }
        }
    }
}

/// Splits the first complete request off `buf`.
///
/// Returns `Ok(None)` if `buf` does not hold a complete message yet. A message which fails to
/// decode is still removed from `buf`, so decoding can continue with the next one.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<AgentRequest>, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = Header::decode(&buf[..HEADER_SIZE])?;
    let frame_len = HEADER_SIZE + header.size as usize;
    if buf.len() < frame_len {
        // The size is untrusted, later reads grow the buffer as needed.
        buf.reserve((frame_len - buf.len()).min(MAX_RESERVE));
        return Ok(None);
    }

    let frame = buf.split_to(frame_len);
    AgentRequest::decode(&header, &frame[HEADER_SIZE..]).map(Some)
}

fn frame(buf: &mut BytesMut, kind: u32, arg1: u32, arg2: u32, size: usize) {
    Header {
        kind,
        arg1,
        arg2,
        size: size as u32,
    }
    .encode(buf);
    buf.reserve(size);
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn decode_selection(value: u32) -> Result<Selection, DecodeError> {
    Selection::from_wire(value).ok_or(DecodeError::UnknownSelection(value))
}

fn decode_content_type(value: u32) -> Result<ContentType, DecodeError> {
    ContentType::from_wire(value).ok_or(DecodeError::UnknownContentType(value))
}

fn decode_monitors(mut payload: &[u8]) -> Result<MonitorsConfig, DecodeError> {
    check_len(payload, 8)?;
    let count = payload.get_u32_le() as usize;
    let flags = payload.get_u32_le();

    check_len(payload, count.saturating_mul(MONITOR_RECORD_SIZE))?;
    let monitors = (0..count)
        .map(|_| MonitorConfig {
            height: payload.get_u32_le(),
            width: payload.get_u32_le(),
            depth: payload.get_u32_le(),
            x: payload.get_i32_le(),
            y: payload.get_i32_le(),
        })
        .collect();

    Ok(MonitorsConfig { flags, monitors })
}
