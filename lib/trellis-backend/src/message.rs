// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

use crate::context::{ContextId, PeerId};

/// Message tag chosen by the sender.
pub type Tag = u32;

/// Independent matching space for messages.
///
/// Tags on different channels never match each other, so graph traffic and
/// collectives cannot collide with user tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Point-to-point traffic issued by the application.
    User = 0,
    /// Internal traffic of collective operations.
    Collective = 1,
    /// Edge-addressed traffic of a graph layer.
    Graph = 2,
}

impl Channel {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Channel::User),
            1 => Some(Channel::Collective),
            2 => Some(Channel::Graph),
            _ => None,
        }
    }
}

/// A received message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Sender.
    pub src: PeerId,
    /// Tag the sender used.
    pub tag: Tag,
    /// Raw payload.
    pub payload: Bytes,
}

/// Routing key attached to every payload in flight.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Envelope {
    pub(crate) context: ContextId,
    pub(crate) channel: Channel,
    pub(crate) src: PeerId,
    pub(crate) tag: Tag,
}

/// What a pending receive is willing to accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecvFilter {
    pub(crate) context: ContextId,
    pub(crate) channel: Channel,
    pub(crate) src: Option<PeerId>,
    pub(crate) tag: Option<Tag>,
}

impl RecvFilter {
    pub(crate) fn matches(&self, envelope: &Envelope) -> bool {
        self.context == envelope.context
            && self.channel == envelope.channel
            && self.src.is_none_or(|src| src == envelope.src)
            && self.tag.is_none_or(|tag| tag == envelope.tag)
    }
}
