// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Inbound data connections.
//!
//! Accepts connections from other peers, decodes data frames and hands each
//! payload to the local mailbox.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::framing::{DataHeader, FrameCodec, FrameKind};
use crate::mailbox::Mailbox;

pub(crate) struct DataListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    mailbox: Arc<Mailbox>,
    cancel: CancellationToken,
}

impl DataListener {
    pub(crate) async fn bind(
        addr: SocketAddr,
        mailbox: Arc<Mailbox>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind data listener to {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to get local address")?;
        info!("Data listener bound to {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
            mailbox,
            cancel,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted data connection from {}", peer_addr);
                        let mailbox = Arc::clone(&self.mailbox);
                        let cancel = self.cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, mailbox, cancel).await {
                                warn!("Error handling connection from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept data connection: {}", e),
                },
                _ = self.cancel.cancelled() => {
                    info!("Data listener on {} shutting down", self.local_addr);
                    break;
                }
            }
        }
    }
}

pub(crate) fn tune_stream(stream: &TcpStream, peer_addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY on {}: {}", peer_addr, e);
    }

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));
    let sock_ref = socket2::SockRef::from(stream);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on {}: {}", peer_addr, e);
    }
    if let Err(e) = sock_ref.set_recv_buffer_size(1_048_576) {
        warn!("Failed to set receive buffer size on {}: {}", peer_addr, e);
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mailbox: Arc<Mailbox>,
    cancel: CancellationToken,
) -> Result<()> {
    tune_stream(&stream, peer_addr);
    let mut frames = FramedRead::new(stream, FrameCodec::new());

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = cancel.cancelled() => return Ok(()),
        };
        let Some(frame) = frame else {
            debug!("Data connection from {} closed", peer_addr);
            return Ok(());
        };

        let (kind, header, payload) = frame.context("Failed to decode frame")?;
        if kind != FrameKind::Data {
            warn!("Dropping unexpected {:?} frame from {}", kind, peer_addr);
            continue;
        }
        let envelope = DataHeader::decode(header)?;
        if mailbox.deliver(envelope, payload).is_err() {
            debug!("Mailbox closed; dropping data connection from {}", peer_addr);
            return Ok(());
        }
    }
}
