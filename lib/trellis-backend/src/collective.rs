// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Linear, root-based collectives over point-to-point messages.

use bytemuck::Pod;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use trellis_event::wait_all;

use crate::backend::Backend;
use crate::context::{Context, PeerId};
use crate::error::CommError;
use crate::message::{Channel, Tag};

pub(crate) mod tags {
    use crate::message::Tag;

    pub(crate) const GATHER: Tag = 1;
    pub(crate) const ALL_GATHER: Tag = 2;
    pub(crate) const SCATTER: Tag = 3;
    pub(crate) const ALL_TO_ALL: Tag = 4;
    pub(crate) const BROADCAST: Tag = 5;
    pub(crate) const BARRIER: Tag = 6;
    pub(crate) const REDUCE: Tag = 7;
    pub(crate) const ALL_REDUCE: Tag = 8;
}

fn first_member(ctx: &Context) -> Result<PeerId, CommError> {
    ctx.peer_at(0)
        .ok_or_else(|| CommError::InvalidContext(format!("{} has no members", ctx.id())))
}

fn check_chunk_count(ctx: &Context, chunks: &[Bytes], op: &str) -> Result<(), CommError> {
    if chunks.len() != ctx.size() {
        return Err(CommError::InvalidContext(format!(
            "{op} needs one chunk per member: {} members, {} chunks",
            ctx.size(),
            chunks.len()
        )));
    }
    Ok(())
}

pub(crate) async fn gather<B: Backend + ?Sized>(
    backend: &B,
    root: PeerId,
    ctx: &Context,
    payload: Bytes,
    tag: Tag,
) -> Result<Option<Vec<Bytes>>, CommError> {
    backend.versions().check(ctx)?;
    ctx.check_member(root)?;

    if ctx.peer_id() != root {
        backend
            .async_send_data(root, Channel::Collective, tag, ctx, payload)
            .await?;
        return Ok(None);
    }

    let (ranks, events): (Vec<usize>, Vec<_>) = ctx
        .iter()
        .enumerate()
        .filter(|(_, peer)| *peer != root)
        .map(|(rank, peer)| {
            let event = backend.async_recv_data(Channel::Collective, Some(peer), Some(tag), ctx);
            (rank, event)
        })
        .unzip();

    let mut out = vec![Bytes::new(); ctx.size()];
    out[ctx.rank()] = payload;
    for (rank, msg) in ranks.into_iter().zip(wait_all(events).await?) {
        out[rank] = msg.payload;
    }
    Ok(Some(out))
}

pub(crate) async fn broadcast<B: Backend + ?Sized>(
    backend: &B,
    root: PeerId,
    ctx: &Context,
    payload: Bytes,
    tag: Tag,
) -> Result<Bytes, CommError> {
    backend.versions().check(ctx)?;
    ctx.check_member(root)?;

    if ctx.peer_id() == root {
        let sends: Vec<_> = ctx
            .iter()
            .filter(|peer| *peer != root)
            .map(|peer| {
                backend.async_send_data(peer, Channel::Collective, tag, ctx, payload.clone())
            })
            .collect();
        wait_all(sends).await?;
        Ok(payload)
    } else {
        let msg = backend
            .async_recv_data(Channel::Collective, Some(root), Some(tag), ctx)
            .await?;
        Ok(msg.payload)
    }
}

pub(crate) async fn all_gather<B: Backend + ?Sized>(
    backend: &B,
    ctx: &Context,
    payload: Bytes,
) -> Result<Vec<Bytes>, CommError> {
    let root = first_member(ctx)?;
    let gathered = gather(backend, root, ctx, payload, tags::ALL_GATHER).await?;
    let packed = gathered.map(|chunks| pack(&chunks)).unwrap_or_default();
    let packed = broadcast(backend, root, ctx, packed, tags::ALL_GATHER).await?;
    unpack(packed)
}

pub(crate) async fn scatter<B: Backend + ?Sized>(
    backend: &B,
    root: PeerId,
    ctx: &Context,
    chunks: Vec<Bytes>,
) -> Result<Bytes, CommError> {
    backend.versions().check(ctx)?;
    ctx.check_member(root)?;

    if ctx.peer_id() != root {
        let msg = backend
            .async_recv_data(Channel::Collective, Some(root), Some(tags::SCATTER), ctx)
            .await?;
        return Ok(msg.payload);
    }

    check_chunk_count(ctx, &chunks, "scatter")?;
    let mut own = Bytes::new();
    let mut sends = Vec::with_capacity(chunks.len());
    for (peer, chunk) in ctx.iter().zip(chunks) {
        if peer == root {
            own = chunk;
        } else {
            sends.push(backend.async_send_data(
                peer,
                Channel::Collective,
                tags::SCATTER,
                ctx,
                chunk,
            ));
        }
    }
    wait_all(sends).await?;
    Ok(own)
}

pub(crate) async fn all_to_all<B: Backend + ?Sized>(
    backend: &B,
    ctx: &Context,
    chunks: Vec<Bytes>,
) -> Result<Vec<Bytes>, CommError> {
    backend.versions().check(ctx)?;
    check_chunk_count(ctx, &chunks, "all_to_all")?;

    let me = ctx.peer_id();
    let mut out = vec![Bytes::new(); ctx.size()];
    let mut sends = Vec::with_capacity(chunks.len());
    for (rank, (peer, chunk)) in ctx.iter().zip(chunks).enumerate() {
        if peer == me {
            out[rank] = chunk;
        } else {
            sends.push(backend.async_send_data(
                peer,
                Channel::Collective,
                tags::ALL_TO_ALL,
                ctx,
                chunk,
            ));
        }
    }

    let (ranks, recvs): (Vec<usize>, Vec<_>) = ctx
        .iter()
        .enumerate()
        .filter(|(_, peer)| *peer != me)
        .map(|(rank, peer)| {
            let event =
                backend.async_recv_data(Channel::Collective, Some(peer), Some(tags::ALL_TO_ALL), ctx);
            (rank, event)
        })
        .unzip();

    wait_all(sends).await?;
    for (rank, msg) in ranks.into_iter().zip(wait_all(recvs).await?) {
        out[rank] = msg.payload;
    }
    Ok(out)
}

pub(crate) async fn synchronize<B: Backend + ?Sized>(
    backend: &B,
    ctx: &Context,
) -> Result<(), CommError> {
    let root = first_member(ctx)?;
    gather(backend, root, ctx, Bytes::new(), tags::BARRIER).await?;
    broadcast(backend, root, ctx, Bytes::new(), tags::BARRIER).await?;
    Ok(())
}

pub(crate) async fn reduce<B, T, F>(
    backend: &B,
    root: PeerId,
    ctx: &Context,
    data: &[T],
    op: &F,
    tag: Tag,
) -> Result<Option<Vec<T>>, CommError>
where
    B: Backend + ?Sized,
    T: Pod + Send + Sync,
    F: Fn(T, T) -> T + Send + Sync,
{
    let payload = Bytes::copy_from_slice(bytemuck::cast_slice(data));
    let Some(chunks) = gather(backend, root, ctx, payload, tag).await? else {
        return Ok(None);
    };

    let expected = std::mem::size_of_val(data);
    let mut acc: Option<Vec<T>> = None;
    for chunk in chunks {
        if chunk.len() != expected {
            return Err(CommError::BufferSize {
                expected,
                actual: chunk.len(),
            });
        }
        let values: Vec<T> = bytemuck::pod_collect_to_vec::<u8, T>(&chunk);
        acc = Some(match acc {
            None => values,
            Some(mut acc) => {
                for (slot, value) in acc.iter_mut().zip(values) {
                    *slot = op(*slot, value);
                }
                acc
            }
        });
    }
    Ok(Some(acc.unwrap_or_default()))
}

pub(crate) async fn all_reduce<B, T, F>(
    backend: &B,
    ctx: &Context,
    data: &[T],
    op: &F,
) -> Result<Vec<T>, CommError>
where
    B: Backend + ?Sized,
    T: Pod + Send + Sync,
    F: Fn(T, T) -> T + Send + Sync,
{
    let root = first_member(ctx)?;
    let reduced = reduce(backend, root, ctx, data, op, tags::ALL_REDUCE).await?;
    let payload = reduced
        .map(|values| Bytes::copy_from_slice(bytemuck::cast_slice(&values)))
        .unwrap_or_default();
    let payload = broadcast(backend, root, ctx, payload, tags::ALL_REDUCE).await?;
    if payload.len() != std::mem::size_of_val(data) {
        return Err(CommError::BufferSize {
            expected: std::mem::size_of_val(data),
            actual: payload.len(),
        });
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, T>(&payload))
}

/// `[u32 count][u32 len; count][bytes...]`, little endian.
pub(crate) fn pack(chunks: &[Bytes]) -> Bytes {
    let body: usize = chunks.iter().map(Bytes::len).sum();
    let mut buf = BytesMut::with_capacity(4 + 4 * chunks.len() + body);
    buf.put_u32_le(chunks.len() as u32);
    for chunk in chunks {
        buf.put_u32_le(chunk.len() as u32);
    }
    for chunk in chunks {
        buf.extend_from_slice(chunk);
    }
    buf.freeze()
}

pub(crate) fn unpack(mut packed: Bytes) -> Result<Vec<Bytes>, CommError> {
    let malformed = || CommError::Transport("malformed packed collective payload".to_string());

    if packed.remaining() < 4 {
        return Err(malformed());
    }
    let count = packed.get_u32_le() as usize;
    if packed.remaining() < 4 * count {
        return Err(malformed());
    }
    let lens: Vec<usize> = (0..count).map(|_| packed.get_u32_le() as usize).collect();

    let mut out = Vec::with_capacity(count);
    for len in lens {
        if packed.remaining() < len {
            return Err(malformed());
        }
        out.push(packed.split_to(len));
    }
    if packed.has_remaining() {
        return Err(malformed());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_preserves_uneven_chunks() {
        let chunks = vec![
            Bytes::from_static(b"a"),
            Bytes::new(),
            Bytes::from_static(b"longer chunk"),
        ];
        assert_eq!(unpack(pack(&chunks)).unwrap(), chunks);
    }

    #[test]
    fn unpack_rejects_truncated_input() {
        let packed = pack(&[Bytes::from_static(b"abcdef")]);
        let truncated = packed.slice(..packed.len() - 1);
        assert!(matches!(unpack(truncated), Err(CommError::Transport(_))));
        assert!(unpack(Bytes::from_static(&[1, 0])).is_err());
    }
}
