// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use bytemuck::Pod;
use bytes::Bytes;

use crate::collective::{self, tags};
use crate::context::{Context, ContextVersions, PeerId};
use crate::error::CommError;
use crate::message::{Channel, Tag};
use crate::{RecvEvent, SendEvent};

const GROWTH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A transport able to move byte payloads between the peers of a [`Context`].
///
/// Implementors provide raw asynchronous send and receive plus membership
/// handling. Collectives default to root-based linear algorithms over the
/// [`Channel::Collective`] channel and may be overridden by backends with
/// native support.
///
/// Every member of a context must call the same collective, in the same
/// order, with consistent sizes; the default implementations do not detect
/// violations.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// The global context as it stood when this peer came up.
    fn initial_context(&self) -> Context;

    /// Version table consulted to reject stale contexts.
    fn versions(&self) -> &ContextVersions;

    /// Starts sending `payload` to `dest`.
    ///
    /// Fails with [`CommError::StaleContext`] if `ctx` was superseded and with
    /// [`CommError::InvalidContext`] if `dest` is not a member of `ctx`.
    fn async_send_data(
        &self,
        dest: PeerId,
        channel: Channel,
        tag: Tag,
        ctx: &Context,
        payload: Bytes,
    ) -> SendEvent;

    /// Posts a receive. `None` for `src` or `tag` accepts any value.
    fn async_recv_data(
        &self,
        channel: Channel,
        src: Option<PeerId>,
        tag: Option<Tag>,
        ctx: &Context,
    ) -> RecvEvent;

    /// Returns the newest context of `ctx`'s lineage; `ctx` itself when
    /// nothing changed. The result never has fewer members than `ctx`.
    async fn update_context(&self, ctx: &Context) -> Result<Context, CommError>;

    /// Derives a sub-group of `parent`. Purely local.
    fn create_context(&self, ids: &[PeerId], parent: &Context) -> Result<Context, CommError> {
        self.versions().check(parent)?;
        parent.subset(ids)
    }

    /// Waits until the lineage of `ctx` has more members than `ctx`.
    ///
    /// The default polls [`Backend::update_context`]; backends with a
    /// membership feed wake on notification instead.
    async fn wait_for_growth(&self, ctx: &Context) -> Result<Context, CommError> {
        loop {
            let updated = self.update_context(ctx).await?;
            if updated.size() > ctx.size() {
                return Ok(updated);
            }
            tokio::time::sleep(GROWTH_POLL_INTERVAL).await;
        }
    }

    /// Collects every member's payload at `root`, in rank order. Non-roots get `None`.
    async fn gather(
        &self,
        root: PeerId,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<Option<Vec<Bytes>>, CommError> {
        collective::gather(self, root, ctx, payload, tags::GATHER).await
    }

    /// Every member receives every member's payload, in rank order.
    ///
    /// Payload sizes may differ between members.
    async fn all_gather(&self, ctx: &Context, payload: Bytes) -> Result<Vec<Bytes>, CommError> {
        collective::all_gather(self, ctx, payload).await
    }

    /// `root` hands chunk `i` to the member of rank `i`. Non-roots pass no chunks.
    async fn scatter(
        &self,
        root: PeerId,
        ctx: &Context,
        chunks: Vec<Bytes>,
    ) -> Result<Bytes, CommError> {
        collective::scatter(self, root, ctx, chunks).await
    }

    /// Every member sends chunk `i` to rank `i` and receives one chunk per rank.
    async fn all_to_all(&self, ctx: &Context, chunks: Vec<Bytes>) -> Result<Vec<Bytes>, CommError> {
        collective::all_to_all(self, ctx, chunks).await
    }

    /// Returns `root`'s payload on every member. Non-root payloads are ignored.
    async fn broadcast(
        &self,
        root: PeerId,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<Bytes, CommError> {
        collective::broadcast(self, root, ctx, payload, tags::BROADCAST).await
    }

    /// Returns once every member has entered the barrier.
    async fn synchronize(&self, ctx: &Context) -> Result<(), CommError> {
        collective::synchronize(self, ctx).await
    }

    /// Element-wise reduction of every member's `data` at `root`, folded in rank order.
    async fn reduce<T, F>(
        &self,
        root: PeerId,
        ctx: &Context,
        data: &[T],
        op: F,
    ) -> Result<Option<Vec<T>>, CommError>
    where
        Self: Sized,
        T: Pod + Send + Sync,
        F: Fn(T, T) -> T + Send + Sync,
    {
        collective::reduce(self, root, ctx, data, &op, tags::REDUCE).await
    }

    /// [`Backend::reduce`] with the result delivered to every member.
    async fn all_reduce<T, F>(&self, ctx: &Context, data: &[T], op: F) -> Result<Vec<T>, CommError>
    where
        Self: Sized,
        T: Pod + Send + Sync,
        F: Fn(T, T) -> T + Send + Sync,
    {
        collective::all_reduce(self, ctx, data, &op).await
    }
}
