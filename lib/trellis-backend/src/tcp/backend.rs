// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Socket backend: rendezvous, roster tracking and the data path.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trellis_event::{Completer, Event, event_pair};

use super::config::{SocketConfig, parse_endpoint};
use super::framing::{DataHeader, FrameCodec, FrameKind};
use super::listener::{DataListener, tune_stream};
use super::protocol::{
    ControlStream, JoinRequest, Roster, Subscribe, Welcome, recv_control, send_control,
};
use super::registry::Registry;
use crate::backend::Backend;
use crate::context::{Context, ContextId, ContextVersions, PeerId};
use crate::error::CommError;
use crate::mailbox::Mailbox;
use crate::message::{Channel, Envelope, RecvFilter, Tag};
use crate::{RecvEvent, SendEvent};

/// Handle to a connection's writer task
#[derive(Clone)]
struct ConnectionHandle {
    tx: flume::Sender<SendTask>,
}

/// Pre-encoded frame plus the completion to resolve once it is written
struct SendTask {
    frame: Bytes,
    completer: Completer<(), CommError>,
}

/// A peer reachable over TCP.
///
/// Connecting registers with the rendezvous [`Registry`], subscribes to
/// roster updates and waits until the expected number of peers has joined.
/// Peers joining later grow the global context; [`Backend::update_context`]
/// and [`Backend::wait_for_growth`] expose the growth.
///
/// One writer task per destination keeps sends to a peer in issue order. A
/// send completes once its frame has been written to the socket.
pub struct SocketBackend {
    me: PeerId,
    config: SocketConfig,
    context: Context,
    versions: ContextVersions,
    mailbox: Arc<Mailbox>,
    roster: watch::Receiver<Roster>,
    connections: DashMap<PeerId, ConnectionHandle>,
    data_addr: SocketAddr,
    cancel: CancellationToken,
    registry: Option<Registry>,
}

impl SocketBackend {
    /// Joins the computation described by `config`.
    pub async fn connect(config: SocketConfig) -> Result<Self> {
        validator::Validate::validate(&config).context("Invalid socket configuration")?;
        let mut publish = parse_endpoint(&config.publish_endpoint)?;
        let mut collect = parse_endpoint(&config.collect_endpoint)?;
        let bind = parse_endpoint(&config.bind_endpoint)?;

        // a hosted registry may bind port 0; dial what it actually bound
        let registry = if config.host_registry {
            let registry = Registry::bind(publish, collect).await?;
            publish = registry.publish_addr();
            collect = registry.collect_addr();
            Some(registry)
        } else {
            None
        };

        let cancel = CancellationToken::new();
        let mailbox = Arc::new(Mailbox::new());
        let listener = DataListener::bind(bind, Arc::clone(&mailbox), cancel.child_token()).await?;
        let data_addr = listener.local_addr();
        listener.spawn();

        let mut join = dial(publish, &config).await?;
        send_control(&mut join, FrameKind::Join, &JoinRequest { data_addr }).await?;
        let welcome: Welcome = recv_control(&mut join, FrameKind::Welcome)
            .await?
            .ok_or_else(|| anyhow!("Registry closed the connection before welcoming us"))?;
        let me = welcome.peer_id;
        info!(peer = %me, %data_addr, "Joined computation");

        let mut subscription = dial(collect, &config).await?;
        send_control(&mut subscription, FrameKind::Subscribe, &Subscribe { peer_id: me }).await?;
        let (roster_tx, mut roster) = watch::channel(Roster::default());
        tokio::spawn(follow_roster(subscription, roster_tx, me, cancel.child_token()));

        // late joiners start from the roster up to and including themselves
        let initial_size = config.expected_peer_count.max(me.index() + 1);
        roster
            .wait_for(|r| r.len() >= initial_size)
            .await
            .map(|_| ())
            .map_err(|_| anyhow!("Roster subscription ended before {initial_size} peers joined"))?;

        let context = Context::global(initial_size, me)?;
        let versions = ContextVersions::new();
        versions.observe(&context);
        info!(peer = %me, size = initial_size, "Initial context ready");

        Ok(Self {
            me,
            config,
            context,
            versions,
            mailbox,
            roster,
            connections: DashMap::new(),
            data_addr,
            cancel,
            registry,
        })
    }

    /// This peer's id.
    pub fn peer_id(&self) -> PeerId {
        self.me
    }

    /// Address of this peer's data listener.
    pub fn data_addr(&self) -> SocketAddr {
        self.data_addr
    }

    /// Latest roster received from the registry.
    pub fn roster(&self) -> Roster {
        self.roster.borrow().clone()
    }

    /// The registry hosted by this peer, if any.
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// Stops background tasks and fails pending receives.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!(peer = %self.me, "Shutting down socket backend");
        self.cancel.cancel();
        self.mailbox.close();
        self.connections.clear();
        if let Some(registry) = &self.registry {
            registry.shutdown();
        }
    }

    fn check_running(&self) -> Result<(), CommError> {
        if self.cancel.is_cancelled() {
            Err(CommError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Get or create the writer for `peer` (lazy initialization)
    fn connection(&self, peer: PeerId) -> Result<ConnectionHandle, CommError> {
        if let Some(handle) = self.connections.get(&peer) {
            return Ok(handle.clone());
        }

        let addr = self.roster.borrow().addr_of(peer).ok_or_else(|| {
            CommError::Transport(format!("no address known for {peer}"))
        })?;

        let handle = self
            .connections
            .entry(peer)
            .or_insert_with(|| {
                let (tx, rx) = flume::unbounded();
                tokio::spawn(connection_writer_task(
                    peer,
                    addr,
                    rx,
                    self.config.clone(),
                    self.cancel.child_token(),
                ));
                debug!("Created new connection to {} ({})", peer, addr);
                ConnectionHandle { tx }
            })
            .clone();
        Ok(handle)
    }

    fn enqueue(&self, dest: PeerId, task: SendTask) -> Result<(), CommError> {
        let task = match self.connection(dest)?.tx.send(task) {
            Ok(()) => return Ok(()),
            Err(flume::SendError(task)) => task,
        };

        // writer exited after a failure; replace it once
        self.connections.remove(&dest);
        self.connection(dest)?
            .tx
            .send(task)
            .map_err(|_| CommError::Transport(format!("connection to {dest} is closed")))
    }

    fn try_send(
        &self,
        dest: PeerId,
        channel: Channel,
        tag: Tag,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<SendEvent, CommError> {
        self.check_running()?;
        self.versions.check(ctx)?;
        ctx.check_member(dest)?;

        let envelope = Envelope {
            context: ctx.id(),
            channel,
            src: self.me,
            tag,
        };
        if dest == self.me {
            self.mailbox.deliver(envelope, payload)?;
            return Ok(Event::ready(()));
        }

        let frame =
            FrameCodec::encode_to_bytes(FrameKind::Data, &DataHeader::encode(&envelope), &payload)
                .map_err(|e| CommError::Transport(e.to_string()))?;
        let (completer, event) = event_pair();
        self.enqueue(dest, SendTask { frame, completer })?;
        Ok(event)
    }

    fn try_recv(
        &self,
        channel: Channel,
        src: Option<PeerId>,
        tag: Option<Tag>,
        ctx: &Context,
    ) -> Result<RecvEvent, CommError> {
        self.check_running()?;
        self.versions.check(ctx)?;
        if let Some(src) = src {
            ctx.check_member(src)?;
        }
        Ok(self.mailbox.post(RecvFilter {
            context: ctx.id(),
            channel,
            src,
            tag,
        }))
    }

    fn grown(&self, ctx: &Context, size: usize) -> Result<Context, CommError> {
        let updated = Context::global(size, self.me)?;
        self.versions.observe(&updated);
        info!(peer = %self.me, from = ctx.size(), to = size, "Context grew");
        Ok(updated)
    }
}

impl Drop for SocketBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl Backend for SocketBackend {
    fn name(&self) -> &'static str {
        "socket"
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
        self.try_send(dest, channel, tag, ctx, payload)
            .unwrap_or_else(Event::failed)
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
        self.check_running()?;
        if ctx.id() != ContextId::GLOBAL {
            return Ok(ctx.clone());
        }
        let size = self.roster.borrow().len();
        if size > ctx.size() {
            self.grown(ctx, size)
        } else {
            Ok(ctx.clone())
        }
    }

    async fn wait_for_growth(&self, ctx: &Context) -> Result<Context, CommError> {
        self.check_running()?;
        if ctx.id() != ContextId::GLOBAL {
            return Err(CommError::InvalidContext(format!(
                "{} is a derived context and never grows",
                ctx.id()
            )));
        }

        let mut roster = self.roster.clone();
        let target = ctx.size();
        let grown = async { roster.wait_for(|r| r.len() > target).await.map(|r| r.len()) };
        tokio::select! {
            size = grown => {
                let size = size
                    .map_err(|_| CommError::Transport("roster subscription closed".to_string()))?;
                self.grown(ctx, size)
            }
            _ = self.cancel.cancelled() => Err(CommError::Shutdown),
        }
    }
}

async fn dial(addr: SocketAddr, config: &SocketConfig) -> Result<ControlStream> {
    let stream = connect_with_retry(addr, config).await?;
    Ok(Framed::new(stream, FrameCodec::new()))
}

async fn connect_with_retry(addr: SocketAddr, config: &SocketConfig) -> Result<TcpStream> {
    let mut last_error = None;
    for attempt in 1..=config.connect_attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tune_stream(&stream, addr);
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect attempt {} to {} failed: {}", attempt, addr, e);
                last_error = Some(e);
                tokio::time::sleep(config.connect_retry()).await;
            }
        }
    }
    match last_error {
        Some(e) => Err(e).with_context(|| format!("Failed to connect to {addr}")),
        None => bail!("Failed to connect to {addr}: no attempts configured"),
    }
}

/// Applies roster snapshots pushed by the registry.
async fn follow_roster(
    mut subscription: ControlStream,
    roster_tx: watch::Sender<Roster>,
    me: PeerId,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            next = recv_control::<Roster>(&mut subscription, FrameKind::Roster) => next,
            _ = cancel.cancelled() => return,
        };
        match next {
            Ok(Some(roster)) => {
                roster_tx.send_if_modified(|current| {
                    if roster.version > current.version {
                        debug!(peer = %me, version = roster.version, peers = roster.len(), "Roster update");
                        *current = roster;
                        true
                    } else {
                        false
                    }
                });
            }
            Ok(None) => {
                warn!(peer = %me, "Registry closed the roster subscription");
                return;
            }
            Err(e) => {
                error!(peer = %me, "Roster subscription failed: {:#}", e);
                return;
            }
        }
    }
}

/// Writer task for a single outbound connection
async fn connection_writer_task(
    peer: PeerId,
    addr: SocketAddr,
    rx: flume::Receiver<SendTask>,
    config: SocketConfig,
    cancel: CancellationToken,
) {
    let mut stream = match connect_with_retry(addr, &config).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to connect to {} ({}): {:#}", peer, addr, e);
            let reason = format!("failed to connect to {peer}: {e}");
            for task in rx.drain() {
                task.completer.fail(CommError::Transport(reason.clone()));
            }
            return;
        }
    };

    loop {
        let task = tokio::select! {
            task = rx.recv_async() => match task {
                Ok(task) => task,
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        };

        match stream.write_all(&task.frame).await {
            Ok(()) => task.completer.succeed(()),
            Err(e) => {
                error!("Write to {} ({}) failed: {}", peer, addr, e);
                task.completer
                    .fail(CommError::Transport(format!("write to {peer} failed: {e}")));
                break;
            }
        }
    }

    debug!("Writer for {} ({}) exiting", peer, addr);
    for task in rx.drain() {
        task.completer.fail(CommError::Transport(format!(
            "connection to {peer} closed"
        )));
    }
}
