// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Socket backend: rendezvous, growth and staleness.

mod common;

use std::net::TcpListener as StdTcpListener;

use bytes::Bytes;
use trellis_backend::tcp::{SocketBackend, SocketConfig};
use trellis_backend::{Backend, Channel, CommError, ContextId, PeerId};

use common::{TIMEOUT, config_for, poll_until_size, registry, socket_cluster};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn peers_receive_dense_ids_and_initial_context() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 3).await;

    for (i, peer) in peers.iter().enumerate() {
        let ctx = peer.initial_context();
        assert_eq!(peer.peer_id(), PeerId(i as u32));
        assert_eq!(ctx.peer_id(), PeerId(i as u32));
        assert_eq!(ctx.size(), 3);
        assert_eq!(ctx.id(), ContextId::GLOBAL);
    }
    assert_eq!(registry.roster().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_joiner_grows_the_context_of_original_peers() {
    let registry = registry().await;
    let originals = socket_cluster(&registry, 2).await;
    let before: Vec<_> = originals.iter().map(|p| p.initial_context()).collect();

    let late = tokio::time::timeout(TIMEOUT, SocketBackend::connect(config_for(&registry, 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(late.peer_id(), PeerId(2));
    assert_eq!(late.initial_context().size(), 3);

    for (peer, ctx) in originals.iter().zip(before) {
        let seen = poll_until_size(peer, ctx, 3, 200).await;
        let last = seen.last().unwrap();
        assert_eq!(last.size(), 3, "peer {} never saw the join", peer.peer_id());
        // sizes never shrink from one update to the next
        assert!(seen.windows(2).all(|w| w[1].size() >= w[0].size()));
        assert!(seen.windows(2).all(|w| w[1].version() >= w[0].version()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn update_without_growth_returns_same_context() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 2).await;
    let ctx = peers[0].initial_context();
    assert_eq!(peers[0].update_context(&ctx).await.unwrap(), ctx);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wait_for_growth_wakes_on_join() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 1).await;
    let ctx = peers[0].initial_context();

    let config = config_for(&registry, 1);
    let joiner = tokio::spawn(async move { SocketBackend::connect(config).await });

    let grown = tokio::time::timeout(TIMEOUT, peers[0].wait_for_growth(&ctx))
        .await
        .expect("growth never observed")
        .unwrap();
    assert_eq!(grown.size(), 2);
    drop(joiner.await.unwrap().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn send_on_superseded_context_is_stale() {
    let registry = registry().await;
    let originals = socket_cluster(&registry, 2).await;
    let old = originals[0].initial_context();

    let late = tokio::time::timeout(TIMEOUT, SocketBackend::connect(config_for(&registry, 2)))
        .await
        .unwrap()
        .unwrap();
    let new = poll_until_size(&originals[0], old.clone(), 3, 200)
        .await
        .pop()
        .unwrap();
    assert_eq!(new.size(), 3);

    let stale = originals[0]
        .async_send_data(PeerId(1), Channel::User, 1, &old, Bytes::from_static(b"x"))
        .await;
    assert!(matches!(
        stale,
        Err(CommError::StaleContext { version: 2, latest: 3, .. })
    ));
    assert!(matches!(
        originals[0].create_context(&[PeerId(0)], &old),
        Err(CommError::StaleContext { .. })
    ));

    // the new context reaches the late joiner
    originals[0]
        .async_send_data(PeerId(2), Channel::User, 1, &new, Bytes::from_static(b"welcome"))
        .await
        .unwrap();
    let msg = tokio::time::timeout(
        TIMEOUT,
        late.async_recv_data(Channel::User, Some(PeerId(0)), Some(1), &late.initial_context()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(msg.payload.as_ref(), b"welcome");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_trip_is_byte_identical_and_ordered() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 2).await;
    let ctx0 = peers[0].initial_context();
    let ctx1 = peers[1].initial_context();

    let payloads: Vec<Bytes> = (0..32u32)
        .map(|i| Bytes::from((0..=i).map(|b| (b * 7) as u8).collect::<Vec<u8>>()))
        .collect();
    let sends: Vec<_> = payloads
        .iter()
        .map(|p| peers[0].async_send_data(PeerId(1), Channel::User, 9, &ctx0, p.clone()))
        .collect();
    trellis_event::wait_all(sends).await.unwrap();

    for expected in &payloads {
        let msg = tokio::time::timeout(
            TIMEOUT,
            peers[1].async_recv_data(Channel::User, Some(PeerId(0)), Some(9), &ctx1),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&msg.payload, expected);
        assert_eq!(msg.src, PeerId(0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn self_send_loops_back() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 1).await;
    let ctx = peers[0].initial_context();

    peers[0]
        .async_send_data(PeerId(0), Channel::User, 3, &ctx, Bytes::from_static(b"me"))
        .await
        .unwrap();
    let msg = peers[0]
        .async_recv_data(Channel::User, None, None, &ctx)
        .await
        .unwrap();
    assert_eq!(msg.payload.as_ref(), b"me");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collectives_run_over_sockets() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 3).await;

    let results = futures::future::join_all(peers.iter().map(|peer| async move {
        let ctx = peer.initial_context();
        let me = ctx.peer_id().0 as i32;
        let gathered = peer.all_gather(&ctx, Bytes::from(vec![me as u8; 2])).await.unwrap();
        let sum = peer.all_reduce(&ctx, &[me, -me], |a, b| a + b).await.unwrap();
        peer.synchronize(&ctx).await.unwrap();
        (gathered, sum)
    }));
    let results = tokio::time::timeout(TIMEOUT, results).await.unwrap();

    for (gathered, sum) in results {
        assert_eq!(gathered.len(), 3);
        assert_eq!(gathered[2].as_ref(), &[2, 2]);
        assert_eq!(sum, vec![3, -3]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_fails_pending_receives() {
    let registry = registry().await;
    let peers = socket_cluster(&registry, 1).await;
    let ctx = peers[0].initial_context();

    let pending = peers[0].async_recv_data(Channel::User, None, None, &ctx);
    peers[0].shutdown();
    assert_eq!(pending.await, Err(CommError::Shutdown));
    assert!(matches!(
        peers[0]
            .async_send_data(PeerId(0), Channel::User, 0, &ctx, Bytes::new())
            .await,
        Err(CommError::Shutdown)
    ));
}

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_peer_can_host_the_registry() {
    let publish = format!("tcp://127.0.0.1:{}", free_port());
    let collect = format!("tcp://127.0.0.1:{}", free_port());

    let host = SocketConfig::new(&publish, &collect, 2).with_host_registry(true);
    let guest = SocketConfig::new(&publish, &collect, 2);

    let (host, guest) = tokio::time::timeout(TIMEOUT, async {
        let host = tokio::spawn(SocketBackend::connect(host));
        // the guest retries until the host's registry is listening
        let guest = SocketBackend::connect(guest).await;
        (host.await.unwrap(), guest)
    })
    .await
    .unwrap();
    let (host, guest) = (host.unwrap(), guest.unwrap());

    assert!(host.registry().is_some());
    assert!(guest.registry().is_none());
    assert_eq!(host.initial_context().size(), 2);
    assert_eq!(guest.initial_context().size(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hosted_registry_on_ephemeral_ports() {
    let any = "tcp://127.0.0.1:0";
    let config = SocketConfig::new(any, any, 1).with_host_registry(true);
    let host = tokio::time::timeout(TIMEOUT, SocketBackend::connect(config))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host.peer_id(), PeerId(0));

    let registry = host.registry().unwrap();
    assert_ne!(registry.publish_addr().port(), 0);
    assert_ne!(registry.collect_addr().port(), 0);

    let guest = tokio::time::timeout(TIMEOUT, SocketBackend::connect(config_for(registry, 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(guest.peer_id(), PeerId(1));

    let seen = poll_until_size(&host, host.initial_context(), 2, 200).await;
    assert_eq!(seen.last().unwrap().size(), 2);
}
