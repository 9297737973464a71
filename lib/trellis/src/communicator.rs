// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use bytemuck::Pod;
use bytes::Bytes;
use tracing::debug;
use trellis_backend::{
    Backend, Channel, CommError, Context, Message, PeerId, RecvEvent, SendEvent, Tag,
};

/// Copies a typed slice into an owned payload.
pub(crate) fn encode<T: Pod>(data: &[T]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(data))
}

/// Reinterprets a payload as elements of `T`.
pub(crate) fn decode<T: Pod>(payload: &[u8]) -> Result<Vec<T>, CommError> {
    let width = std::mem::size_of::<T>();
    if width != 0 && payload.len() % width != 0 {
        return Err(CommError::BufferSize {
            expected: payload.len().next_multiple_of(width),
            actual: payload.len(),
        });
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, T>(payload))
}

/// Overwrites `buf` with a payload of exactly its size.
pub(crate) fn decode_into<T: Pod>(payload: &[u8], buf: &mut [T]) -> Result<(), CommError> {
    let target: &mut [u8] = bytemuck::cast_slice_mut(buf);
    if target.len() != payload.len() {
        return Err(CommError::BufferSize {
            expected: target.len(),
            actual: payload.len(),
        });
    }
    target.copy_from_slice(payload);
    Ok(())
}

fn split_even<T: Pod>(data: &[T], parts: usize) -> Result<Vec<Bytes>, CommError> {
    if parts == 0 || data.len() % parts != 0 {
        return Err(CommError::BufferSize {
            expected: std::mem::size_of::<T>() * data.len().next_multiple_of(parts.max(1)),
            actual: std::mem::size_of_val(data),
        });
    }
    let chunk = data.len() / parts;
    if chunk == 0 {
        return Ok(vec![Bytes::new(); parts]);
    }
    Ok(data.chunks(chunk).map(encode).collect())
}

fn concat<T: Pod>(chunks: &[Bytes]) -> Result<Vec<T>, CommError> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(decode::<T>(chunk)?);
    }
    Ok(out)
}

/// Backend-agnostic communication façade.
///
/// Every operation names the [`Context`] it runs in. Blocking forms await
/// completion; `async_*` forms return an [`trellis_event::Event`] right away.
/// Payloads are slices of plain-old-data elements sent in their in-memory
/// representation, so both ends must agree on the element type.
pub struct Communicator<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> Clone for Communicator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> Communicator<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Wraps a shared backend.
    pub fn from_arc(backend: Arc<B>) -> Self {
        debug!(backend = backend.name(), "Communicator created");
        Self { backend }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The context every peer started with.
    pub fn global_context(&self) -> Context {
        self.backend.initial_context()
    }

    /// Starts sending `data` to `dest`. The data is copied before returning.
    pub fn async_send<T: Pod>(&self, dest: PeerId, tag: Tag, ctx: &Context, data: &[T]) -> SendEvent {
        self.async_send_bytes(dest, tag, ctx, encode(data))
    }

    /// Starts sending a pre-encoded payload.
    pub fn async_send_bytes(&self, dest: PeerId, tag: Tag, ctx: &Context, payload: Bytes) -> SendEvent {
        self.backend
            .async_send_data(dest, Channel::User, tag, ctx, payload)
    }

    /// Sends `data` to `dest` and waits for completion.
    pub async fn send<T: Pod>(
        &self,
        dest: PeerId,
        tag: Tag,
        ctx: &Context,
        data: &[T],
    ) -> Result<(), CommError> {
        self.async_send(dest, tag, ctx, data).await
    }

    /// Posts a receive for a message from `src` with `tag`.
    pub fn async_recv(&self, src: PeerId, tag: Tag, ctx: &Context) -> RecvEvent {
        self.backend
            .async_recv_data(Channel::User, Some(src), Some(tag), ctx)
    }

    /// Receives a message from `src` with `tag`.
    pub async fn recv<T: Pod>(
        &self,
        src: PeerId,
        tag: Tag,
        ctx: &Context,
    ) -> Result<Vec<T>, CommError> {
        let msg = self.async_recv(src, tag, ctx).await?;
        decode(&msg.payload)
    }

    /// Receives into `buf`; the message must have exactly `buf`'s size.
    pub async fn recv_into<T: Pod>(
        &self,
        src: PeerId,
        tag: Tag,
        ctx: &Context,
        buf: &mut [T],
    ) -> Result<(), CommError> {
        let msg = self.async_recv(src, tag, ctx).await?;
        decode_into(&msg.payload, buf)
    }

    /// Receives the next message from any member with any tag.
    pub async fn recv_any(&self, ctx: &Context) -> Result<Message, CommError> {
        self.backend
            .async_recv_data(Channel::User, None, None, ctx)
            .await
    }

    /// Concatenates every member's `data` at `root`, in rank order.
    pub async fn gather<T: Pod>(
        &self,
        data: &[T],
        root: PeerId,
        ctx: &Context,
    ) -> Result<Option<Vec<T>>, CommError> {
        match self.backend.gather(root, ctx, encode(data)).await? {
            Some(chunks) => concat(&chunks).map(Some),
            None => Ok(None),
        }
    }

    /// Concatenates every member's `data` on every member.
    ///
    /// All members must contribute the same number of elements.
    pub async fn all_gather<T: Pod>(&self, data: &[T], ctx: &Context) -> Result<Vec<T>, CommError> {
        let chunks = self.backend.all_gather(ctx, encode(data)).await?;
        let expected = std::mem::size_of_val(data);
        if let Some(odd) = chunks.iter().find(|c| c.len() != expected) {
            return Err(CommError::BufferSize {
                expected,
                actual: odd.len(),
            });
        }
        concat(&chunks)
    }

    /// Every member's `data` on every member; sizes may differ per member.
    pub async fn all_gather_varying<T: Pod>(
        &self,
        data: &[T],
        ctx: &Context,
    ) -> Result<Vec<Vec<T>>, CommError> {
        self.backend
            .all_gather(ctx, encode(data))
            .await?
            .iter()
            .map(|chunk| decode(chunk))
            .collect()
    }

    /// Splits `root`'s `data` into one equal share per member.
    ///
    /// At `root` the length of `data` must be a multiple of the context
    /// size; elsewhere `data` is ignored.
    pub async fn scatter<T: Pod>(
        &self,
        data: &[T],
        root: PeerId,
        ctx: &Context,
    ) -> Result<Vec<T>, CommError> {
        let chunks = if ctx.peer_id() == root {
            split_even(data, ctx.size())?
        } else {
            Vec::new()
        };
        let share = self.backend.scatter(root, ctx, chunks).await?;
        decode(&share)
    }

    /// Sends share `i` of `data` to rank `i` and concatenates the shares received.
    pub async fn all_to_all<T: Pod>(&self, data: &[T], ctx: &Context) -> Result<Vec<T>, CommError> {
        let chunks = split_even(data, ctx.size())?;
        let received = self.backend.all_to_all(ctx, chunks).await?;
        concat(&received)
    }

    /// Element-wise reduction with `op` at `root`, folded in rank order.
    pub async fn reduce<T, F>(
        &self,
        data: &[T],
        root: PeerId,
        ctx: &Context,
        op: F,
    ) -> Result<Option<Vec<T>>, CommError>
    where
        T: Pod + Send + Sync,
        F: Fn(T, T) -> T + Send + Sync,
    {
        self.backend.reduce(root, ctx, data, op).await
    }

    /// Element-wise reduction with `op`, delivered to every member.
    pub async fn all_reduce<T, F>(&self, data: &[T], ctx: &Context, op: F) -> Result<Vec<T>, CommError>
    where
        T: Pod + Send + Sync,
        F: Fn(T, T) -> T + Send + Sync,
    {
        self.backend.all_reduce(ctx, data, op).await
    }

    /// Returns `root`'s `data` on every member.
    pub async fn broadcast<T: Pod>(
        &self,
        data: &[T],
        root: PeerId,
        ctx: &Context,
    ) -> Result<Vec<T>, CommError> {
        let payload = self.backend.broadcast(root, ctx, encode(data)).await?;
        decode(&payload)
    }

    /// Overwrites `buf` with `root`'s buffer on every member.
    pub async fn broadcast_into<T: Pod>(
        &self,
        buf: &mut [T],
        root: PeerId,
        ctx: &Context,
    ) -> Result<(), CommError> {
        let payload = self.backend.broadcast(root, ctx, encode(buf)).await?;
        decode_into(&payload, buf)
    }

    /// Waits until every member reached this point.
    pub async fn synchronize(&self, ctx: &Context) -> Result<(), CommError> {
        self.backend.synchronize(ctx).await
    }

    /// Derives the sub-group `ids` of `parent`.
    pub fn create_context(&self, ids: &[PeerId], parent: &Context) -> Result<Context, CommError> {
        self.backend.create_context(ids, parent)
    }

    /// Returns the newest version of `ctx`, never smaller than `ctx`.
    pub async fn update_context(&self, ctx: &Context) -> Result<Context, CommError> {
        self.backend.update_context(ctx).await
    }

    /// Waits until `ctx`'s lineage gains members.
    pub async fn wait_for_growth(&self, ctx: &Context) -> Result<Context, CommError> {
        self.backend.wait_for_growth(ctx).await
    }
}
