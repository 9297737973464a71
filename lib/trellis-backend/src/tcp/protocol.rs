// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous messages exchanged with the [`super::Registry`].
//!
//! Control messages travel as JSON in the payload of a frame whose kind names
//! the message.

use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use super::framing::{FrameCodec, FrameKind};
use crate::context::PeerId;

/// Join request sent to the publish endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct JoinRequest {
    pub(crate) data_addr: SocketAddr,
}

/// Reply to a [`JoinRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Welcome {
    pub(crate) peer_id: PeerId,
}

/// Subscription request sent to the collect endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Subscribe {
    pub(crate) peer_id: PeerId,
}

/// Every registered peer, indexed by [`PeerId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roster {
    /// Incremented on every join.
    pub version: u64,
    /// Data address of peer `i` at index `i`.
    pub peers: Vec<SocketAddr>,
}

impl Roster {
    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True before anyone joined.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Data address of `peer`.
    pub fn addr_of(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(peer.index()).copied()
    }
}

pub(crate) type ControlStream = Framed<TcpStream, FrameCodec>;

pub(crate) async fn send_control<T: Serialize>(
    framed: &mut ControlStream,
    kind: FrameKind,
    message: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(message).context("Failed to encode control message")?;
    framed
        .send((kind, Bytes::new(), Bytes::from(payload)))
        .await
        .with_context(|| format!("Failed to send {kind:?} frame"))
}

/// Reads the next frame and decodes it as `expected`. `Ok(None)` on a clean close.
pub(crate) async fn recv_control<T: DeserializeOwned>(
    framed: &mut ControlStream,
    expected: FrameKind,
) -> Result<Option<T>> {
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let (kind, _header, payload) = frame.context("Failed to read control frame")?;
    if kind != expected {
        bail!("expected {expected:?} frame, got {kind:?}");
    }
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| anyhow!("Malformed {kind:?} frame: {e}"))
}
