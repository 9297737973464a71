// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous service for socket peers.
//!
//! The registry owns the authoritative roster. Joins arrive on the publish
//! endpoint and are handled one at a time: the next id is offered in a
//! `Welcome`, and the roster grows only once that reply has been written, so
//! peer ids stay dense and a joiner that vanishes mid-handshake never becomes
//! a member. Subscribers on the collect endpoint receive the full roster once
//! on subscription and again after every join.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::framing::{FrameCodec, FrameKind};
use super::listener::tune_stream;
use super::protocol::{JoinRequest, Roster, Subscribe, Welcome, recv_control, send_control};
use crate::context::PeerId;

/// Upper bound on writing a `Welcome` while other joins wait.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Running rendezvous service. Stops when dropped.
pub struct Registry {
    publish_addr: SocketAddr,
    collect_addr: SocketAddr,
    membership: Arc<Membership>,
    cancel: CancellationToken,
}

struct Membership {
    roster: watch::Sender<Roster>,
    // held from id assignment until the roster is updated
    joining: Mutex<()>,
}

impl Registry {
    /// Binds both endpoints and starts serving.
    pub async fn bind(publish: SocketAddr, collect: SocketAddr) -> Result<Self> {
        let publish_listener = TcpListener::bind(publish)
            .await
            .with_context(|| format!("Failed to bind publish endpoint {publish}"))?;
        let collect_listener = TcpListener::bind(collect)
            .await
            .with_context(|| format!("Failed to bind collect endpoint {collect}"))?;

        let publish_addr = publish_listener.local_addr()?;
        let collect_addr = collect_listener.local_addr()?;
        info!(%publish_addr, %collect_addr, "Registry listening");

        let (roster, _) = watch::channel(Roster::default());
        let registry = Self {
            publish_addr,
            collect_addr,
            membership: Arc::new(Membership {
                roster,
                joining: Mutex::new(()),
            }),
            cancel: CancellationToken::new(),
        };

        tokio::spawn(accept_loop(
            publish_listener,
            Arc::clone(&registry.membership),
            registry.cancel.clone(),
            Role::Publish,
        ));
        tokio::spawn(accept_loop(
            collect_listener,
            Arc::clone(&registry.membership),
            registry.cancel.clone(),
            Role::Collect,
        ));

        Ok(registry)
    }

    /// Address joins are accepted on.
    pub fn publish_addr(&self) -> SocketAddr {
        self.publish_addr
    }

    /// Address roster subscriptions are accepted on.
    pub fn collect_addr(&self) -> SocketAddr {
        self.collect_addr
    }

    /// Current roster snapshot.
    pub fn roster(&self) -> Roster {
        self.membership.roster.borrow().clone()
    }

    /// Stops accepting joins and closes subscriptions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Copy, Clone, Debug)]
enum Role {
    Publish,
    Collect,
}

async fn accept_loop(
    listener: TcpListener,
    membership: Arc<Membership>,
    cancel: CancellationToken,
    role: Role,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let membership = Arc::clone(&membership);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let result = match role {
                            Role::Publish => handle_join(stream, addr, membership).await,
                            Role::Collect => handle_subscription(stream, addr, membership, cancel).await,
                        };
                        if let Err(e) = result {
                            warn!("Registry {:?} connection from {} failed: {:#}", role, addr, e);
                        }
                    });
                }
                Err(e) => error!("Registry failed to accept on {:?} endpoint: {}", role, e),
            },
            _ = cancel.cancelled() => {
                debug!("Registry {:?} endpoint shutting down", role);
                break;
            }
        }
    }
}

async fn handle_join(
    stream: TcpStream,
    addr: SocketAddr,
    membership: Arc<Membership>,
) -> Result<()> {
    tune_stream(&stream, addr);
    let mut framed = Framed::new(stream, FrameCodec::new());
    let Some(request) = recv_control::<JoinRequest>(&mut framed, FrameKind::Join).await? else {
        return Ok(());
    };

    let _turn = membership.joining.lock().await;
    let assigned = PeerId(membership.roster.borrow().peers.len() as u32);
    let welcome = Welcome { peer_id: assigned };
    match tokio::time::timeout(
        WELCOME_TIMEOUT,
        send_control(&mut framed, FrameKind::Welcome, &welcome),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(peer = %assigned, %addr, "Joiner left before its welcome was sent; id not assigned");
            return Err(e);
        }
        Err(_) => {
            warn!(peer = %assigned, %addr, "Timed out welcoming joiner; id not assigned");
            return Ok(());
        }
    }

    membership.roster.send_modify(|roster| {
        roster.peers.push(request.data_addr);
        roster.version += 1;
    });
    info!(peer = %assigned, data_addr = %request.data_addr, "Peer joined");
    Ok(())
}

async fn handle_subscription(
    stream: TcpStream,
    addr: SocketAddr,
    membership: Arc<Membership>,
    cancel: CancellationToken,
) -> Result<()> {
    tune_stream(&stream, addr);
    let mut framed = Framed::new(stream, FrameCodec::new());
    let Some(subscribe) = recv_control::<Subscribe>(&mut framed, FrameKind::Subscribe).await?
    else {
        return Ok(());
    };
    debug!(peer = %subscribe.peer_id, "Roster subscription opened");

    let mut updates = membership.roster.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        send_control(&mut framed, FrameKind::Roster, &snapshot).await?;

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    debug!(peer = %subscribe.peer_id, "Roster subscription closed");
    Ok(())
}
