// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use trellis_backend::tcp::{Registry, SocketBackend, SocketConfig};
use trellis_backend::{Backend, LocalBackend};

/// Upper bound for any single network wait in tests.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `body` once per peer of a fresh local world, each on its own task.
pub async fn run_local<F, Fut, R>(size: usize, body: F) -> Vec<R>
where
    F: Fn(LocalBackend) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let world = LocalBackend::create_world(size).expect("world");
    let handles: Vec<_> = world.into_iter().map(|b| tokio::spawn(body(b))).collect();
    let results = tokio::time::timeout(TIMEOUT, join_all(handles))
        .await
        .expect("local world timed out");
    results.into_iter().map(|r| r.expect("peer task panicked")).collect()
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

/// Connects `size` peers concurrently and returns them ordered by peer id.
pub async fn socket_cluster(registry: &Registry, size: usize) -> Vec<SocketBackend> {
    let connects = (0..size).map(|_| SocketBackend::connect(config_for(registry, size)));
    let mut peers: Vec<SocketBackend> = tokio::time::timeout(TIMEOUT, join_all(connects))
        .await
        .expect("cluster formation timed out")
        .into_iter()
        .map(|r| r.expect("connect"))
        .collect();
    peers.sort_by_key(|p| p.peer_id());
    peers
}

/// Polls `update_context` until the context reaches `size`, at most `attempts` times.
pub async fn poll_until_size<B: Backend>(
    backend: &B,
    mut ctx: trellis_backend::Context,
    size: usize,
    attempts: usize,
) -> Vec<trellis_backend::Context> {
    let mut seen = vec![ctx.clone()];
    for _ in 0..attempts {
        ctx = backend.update_context(&ctx).await.expect("update_context");
        seen.push(ctx.clone());
        if ctx.size() >= size {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    seen
}
