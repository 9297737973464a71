// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Length-prefixed framing for the socket backend.
//!
//! Wire format (11 bytes overhead):
//! ```text
//! [u16 BE: schema_version][u8: frame_kind][u32 BE: header_len][u32 BE: payload_len][header bytes][payload bytes]
//! ```
//!
//! Decoded header and payload are zero-copy slices of the receive buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::context::{ContextId, PeerId};
use crate::message::{Channel, Envelope, Tag};

const SCHEMA_VERSION_V1: u16 = 1;

/// Maximum header plus payload size (16 MB).
pub(crate) const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// version + kind + 2 lengths
const PREAMBLE_SIZE: usize = 2 + 1 + 4 + 4;

/// Kinds of frames exchanged between peers and the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Peer → registry publish endpoint: request a peer id.
    Join = 1,
    /// Registry → peer: the assigned peer id.
    Welcome = 2,
    /// Peer → registry collect endpoint: start streaming rosters.
    Subscribe = 3,
    /// Registry → peer: full roster snapshot.
    Roster = 4,
    /// Peer → peer: application or collective payload.
    Data = 5,
}

impl FrameKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameKind::Join),
            2 => Some(FrameKind::Welcome),
            3 => Some(FrameKind::Subscribe),
            4 => Some(FrameKind::Roster),
            5 => Some(FrameKind::Data),
            _ => None,
        }
    }
}

/// A decoded frame: kind, header, payload.
pub type Frame = (FrameKind, Bytes, Bytes);

/// Stateful frame codec supporting partial reads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: DecodeState,
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    AwaitingPreamble,
    AwaitingBody {
        kind: FrameKind,
        header_len: u32,
        payload_len: u32,
    },
}

impl FrameCodec {
    /// Create a codec waiting for the first preamble.
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitingPreamble,
        }
    }

    /// Encodes one frame into a single contiguous buffer.
    pub fn encode_to_bytes(kind: FrameKind, header: &[u8], payload: &[u8]) -> io::Result<Bytes> {
        let mut buf = BytesMut::with_capacity(PREAMBLE_SIZE + header.len() + payload.len());
        Self::write_frame(&mut buf, kind, header, payload)?;
        Ok(buf.freeze())
    }

    fn write_frame(
        dst: &mut BytesMut,
        kind: FrameKind,
        header: &[u8],
        payload: &[u8],
    ) -> io::Result<()> {
        let header_len = u32::try_from(header.len()).map_err(|_| oversized(header.len()))?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| oversized(payload.len()))?;
        validate_lengths(header_len, payload_len)?;

        dst.reserve(PREAMBLE_SIZE + header.len() + payload.len());
        dst.put_u16(SCHEMA_VERSION_V1);
        dst.put_u8(kind as u8);
        dst.put_u32(header_len);
        dst.put_u32(payload_len);
        dst.extend_from_slice(header);
        dst.extend_from_slice(payload);
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn oversized(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Frame size {len} exceeds maximum {MAX_FRAME_SIZE}"),
    )
}

fn validate_lengths(header_len: u32, payload_len: u32) -> io::Result<()> {
    let total = header_len
        .checked_add(payload_len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Frame size overflow"))?;
    if total > MAX_FRAME_SIZE {
        return Err(oversized(total as usize));
    }
    Ok(())
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::AwaitingPreamble => {
                    if src.len() < PREAMBLE_SIZE {
                        return Ok(None);
                    }

                    let schema_version = u16::from_be_bytes([src[0], src[1]]);
                    if schema_version != SCHEMA_VERSION_V1 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "Unsupported schema version: {schema_version} (expected {SCHEMA_VERSION_V1})"
                            ),
                        ));
                    }
                    let kind = FrameKind::from_u8(src[2]).ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Invalid frame kind: {}", src[2]),
                        )
                    })?;
                    let header_len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]);
                    let payload_len = u32::from_be_bytes([src[7], src[8], src[9], src[10]]);
                    validate_lengths(header_len, payload_len)?;

                    src.advance(PREAMBLE_SIZE);
                    self.state = DecodeState::AwaitingBody {
                        kind,
                        header_len,
                        payload_len,
                    };
                }

                DecodeState::AwaitingBody {
                    kind,
                    header_len,
                    payload_len,
                } => {
                    let body_len = (header_len + payload_len) as usize;
                    if src.len() < body_len {
                        src.reserve(body_len - src.len());
                        return Ok(None);
                    }

                    let header = src.split_to(header_len as usize).freeze();
                    let payload = src.split_to(payload_len as usize).freeze();
                    self.state = DecodeState::AwaitingPreamble;
                    return Ok(Some((kind, header, payload)));
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, (kind, header, payload): Frame, dst: &mut BytesMut) -> io::Result<()> {
        Self::write_frame(dst, kind, &header, &payload)
    }
}

/// Routing header of a [`FrameKind::Data`] frame.
///
/// Layout: `[u64 BE context][u8 channel][u32 BE src][u32 BE tag]`.
pub(crate) struct DataHeader;

impl DataHeader {
    pub(crate) const LEN: usize = 8 + 1 + 4 + 4;

    pub(crate) fn encode(envelope: &Envelope) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..8].copy_from_slice(&envelope.context.0.to_be_bytes());
        out[8] = envelope.channel.as_u8();
        out[9..13].copy_from_slice(&envelope.src.0.to_be_bytes());
        out[13..17].copy_from_slice(&envelope.tag.to_be_bytes());
        out
    }

    pub(crate) fn decode(mut header: Bytes) -> io::Result<Envelope> {
        if header.len() != Self::LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("data header is {} bytes, expected {}", header.len(), Self::LEN),
            ));
        }
        let context = ContextId(header.get_u64());
        let channel_byte = header.get_u8();
        let channel = Channel::from_u8(channel_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid channel: {channel_byte}"),
            )
        })?;
        let src = PeerId(header.get_u32());
        let tag: Tag = header.get_u32();
        Ok(Envelope {
            context,
            channel,
            src,
            tag,
        })
    }
}
