// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Graphs distributed over the socket backend, including re-placement after
//! membership grows.

mod common;

use futures::future::join_all;
use trellis::graph::{Cage, Mapping, Pattern};
use trellis::tcp::SocketBackend;
use trellis::{Backend, CommError, Communicator, Context, PeerId};

use common::{TIMEOUT, connect, registry, socket_cluster};

async fn ring_exchange(cage: &Cage<SocketBackend>) -> Vec<(u32, u32)> {
    for vertex in cage.hosted_vertices().unwrap() {
        vertex.spread(&[vertex.id().0]).await.unwrap();
    }
    let mut seen = Vec::new();
    for vertex in cage.hosted_vertices().unwrap() {
        for (edge, data) in vertex.collect::<u32>().await.unwrap() {
            assert_eq!(data, vec![edge.source.0]);
            seen.push((edge.source.0, edge.target.0));
        }
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ring_over_sockets() {
    trellis::logging::init();
    let registry = registry().await;
    let peers = socket_cluster(&registry, 3).await;

    let tasks = peers.into_iter().map(|backend| {
        tokio::spawn(async move {
            let comm = Communicator::new(backend);
            let ctx = comm.global_context();
            let mut cage = Cage::<_, ()>::new(comm, ctx);
            cage.set_pattern(&Pattern::Ring, 6);
            cage.distribute(&Mapping::RoundRobin).unwrap();
            let edges = ring_exchange(&cage).await;
            cage.communicator().synchronize(cage.context()).await.unwrap();
            edges
        })
    });
    let results = tokio::time::timeout(TIMEOUT, join_all(tasks)).await.unwrap();

    let mut edges: Vec<_> = results.into_iter().flat_map(|r| r.unwrap()).collect();
    edges.sort_unstable();
    assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)]);
}

async fn grow_and_redistribute(comm: Communicator<SocketBackend>, ctx: Context) -> Vec<(u32, u32)> {
    let grown = if ctx.size() < 3 {
        tokio::time::timeout(TIMEOUT, comm.wait_for_growth(&ctx))
            .await
            .unwrap()
            .unwrap()
    } else {
        ctx.clone()
    };
    assert_eq!(grown.size(), 3);

    let mut cage = Cage::<_, ()>::new(comm.clone(), ctx.clone());
    cage.set_pattern(&Pattern::Ring, 3);
    cage.set_context(grown.clone());
    cage.distribute(&Mapping::Consecutive).unwrap();

    let edges = ring_exchange(&cage).await;

    if grown.version() > ctx.version() {
        // the pre-growth context is superseded
        let stale = comm.send(PeerId(0), 1, &ctx, &[0u8]).await;
        assert!(matches!(stale, Err(CommError::StaleContext { .. })));
    }
    comm.synchronize(&grown).await.unwrap();
    edges
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_joiner_takes_over_vertices() {
    let registry = registry().await;
    let originals = socket_cluster(&registry, 2).await;
    let contexts: Vec<Context> = originals.iter().map(|p| p.initial_context()).collect();

    let mut tasks: Vec<_> = originals
        .into_iter()
        .zip(contexts)
        .map(|(backend, ctx)| tokio::spawn(grow_and_redistribute(Communicator::new(backend), ctx)))
        .collect();

    let late = connect(&registry, 2).await;
    assert_eq!(late.peer_id(), PeerId(2));
    let ctx = late.initial_context();
    tasks.push(tokio::spawn(grow_and_redistribute(Communicator::new(late), ctx)));

    let results = tokio::time::timeout(TIMEOUT, join_all(tasks)).await.unwrap();
    let per_peer: Vec<Vec<(u32, u32)>> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(per_peer, vec![vec![(2, 0)], vec![(0, 1)], vec![(1, 2)]]);
}
