// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process message passing with fixed membership.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;
use trellis_event::Event;

use crate::backend::Backend;
use crate::context::{Context, ContextVersions, PeerId};
use crate::error::CommError;
use crate::mailbox::Mailbox;
use crate::message::{Channel, Envelope, RecvFilter, Tag};
use crate::{RecvEvent, SendEvent};

struct Fabric {
    mailboxes: Vec<Mailbox>,
}

/// One peer of an in-process world.
///
/// All peers of a world share one fabric of mailboxes. Sends are buffered:
/// a send completes as soon as the payload sits in the receiver's mailbox.
/// Membership is fixed when the world is created.
pub struct LocalBackend {
    me: PeerId,
    fabric: Arc<Fabric>,
    context: Context,
    versions: ContextVersions,
}

impl LocalBackend {
    /// Creates `size` connected peers; element `i` is peer `i`.
    pub fn create_world(size: usize) -> Result<Vec<LocalBackend>, CommError> {
        if size == 0 {
            return Err(CommError::InvalidContext(
                "a world needs at least one peer".to_string(),
            ));
        }
        let fabric = Arc::new(Fabric {
            mailboxes: (0..size).map(|_| Mailbox::new()).collect(),
        });

        (0..size as u32)
            .map(PeerId)
            .map(|me| {
                let context = Context::global(size, me)?;
                let versions = ContextVersions::new();
                versions.observe(&context);
                Ok(LocalBackend {
                    me,
                    fabric: Arc::clone(&fabric),
                    context,
                    versions,
                })
            })
            .collect()
    }

    /// This peer's id.
    pub fn peer_id(&self) -> PeerId {
        self.me
    }

    fn mailbox(&self, peer: PeerId) -> Result<&Mailbox, CommError> {
        self.fabric
            .mailboxes
            .get(peer.index())
            .ok_or_else(|| CommError::InvalidContext(format!("{peer} is not part of this world")))
    }

    fn try_send(
        &self,
        dest: PeerId,
        channel: Channel,
        tag: Tag,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<(), CommError> {
        self.versions.check(ctx)?;
        ctx.check_member(dest)?;
        trace!(src = %self.me, %dest, ?channel, tag, len = payload.len(), "local send");
        self.mailbox(dest)?
            .deliver(
                Envelope {
                    context: ctx.id(),
                    channel,
                    src: self.me,
                    tag,
                },
                payload,
            )
            .map_err(|_| CommError::Transport(format!("{dest} has shut down")))
    }

    fn try_recv(
        &self,
        channel: Channel,
        src: Option<PeerId>,
        tag: Option<Tag>,
        ctx: &Context,
    ) -> Result<RecvEvent, CommError> {
        self.versions.check(ctx)?;
        if let Some(src) = src {
            ctx.check_member(src)?;
        }
        Ok(self.mailbox(self.me)?.post(RecvFilter {
            context: ctx.id(),
            channel,
            src,
            tag,
        }))
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        if let Some(mailbox) = self.fabric.mailboxes.get(self.me.index()) {
            mailbox.close();
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn initial_context(&self) -> Context {
        self.context.clone()
    }

    fn versions(&self) -> &ContextVersions {
        &self.versions
    }

    fn async_send_data(
        &self,
        dest: PeerId,
        channel: Channel,
        tag: Tag,
        ctx: &Context,
        payload: Bytes,
    ) -> SendEvent {
        match self.try_send(dest, channel, tag, ctx, payload) {
            Ok(()) => Event::ready(()),
            Err(e) => Event::failed(e),
        }
    }

    fn async_recv_data(
        &self,
        channel: Channel,
        src: Option<PeerId>,
        tag: Option<Tag>,
        ctx: &Context,
    ) -> RecvEvent {
        self.try_recv(channel, src, tag, ctx)
            .unwrap_or_else(Event::failed)
    }

    async fn update_context(&self, ctx: &Context) -> Result<Context, CommError> {
        Ok(ctx.clone())
    }
}
