// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use trellis::tcp::{Registry, SocketBackend, SocketConfig};
use trellis::{Communicator, LocalBackend};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `body` for every peer of a fresh local world; results are in peer order.
pub async fn run_local<F, Fut, R>(size: usize, body: F) -> Vec<R>
where
    F: Fn(Communicator<LocalBackend>) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    trellis::logging::init();
    let world = LocalBackend::create_world(size).expect("world");
    let handles: Vec<_> = world
        .into_iter()
        .map(|b| tokio::spawn(body(Communicator::new(b))))
        .collect();
    tokio::time::timeout(TIMEOUT, join_all(handles))
        .await
        .expect("local world timed out")
        .into_iter()
        .map(|r| r.expect("peer task panicked"))
        .collect()
}

pub async fn registry() -> Registry {
    let any = "127.0.0.1:0".parse().unwrap();
    Registry::bind(any, any).await.expect("registry")
}

pub fn config_for(registry: &Registry, expected: usize) -> SocketConfig {
    SocketConfig::new(
        format!("tcp://{}", registry.publish_addr()),
        format!("tcp://{}", registry.collect_addr()),
        expected,
    )
}

pub async fn connect(registry: &Registry, expected: usize) -> SocketBackend {
    tokio::time::timeout(TIMEOUT, SocketBackend::connect(config_for(registry, expected)))
        .await
        .expect("connect timed out")
        .expect("connect")
}

/// Connects `size` peers concurrently, ordered by peer id.
pub async fn socket_cluster(registry: &Registry, size: usize) -> Vec<SocketBackend> {
    let connects = (0..size).map(|_| connect(registry, size));
    let mut peers = join_all(connects).await;
    peers.sort_by_key(|p| p.peer_id());
    peers
}
