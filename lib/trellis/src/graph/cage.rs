// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use bytemuck::Pod;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, info};
use trellis_backend::{Backend, Channel, CommError, Context, PeerId, RecvEvent, SendEvent, Tag};
use trellis_event::wait_all;

use super::storage::{ArenaGraph, EdgeId, GraphStorage};
use super::{Edge, GraphError, Mapping, Pattern, VertexId};
use crate::communicator::{Communicator, decode, decode_into, encode};

/// Lifecycle of a [`Cage`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CageState {
    /// No graph yet.
    Uninitialized,
    /// A graph is set but vertices are not placed.
    GraphSet,
    /// Vertices are placed; vertex and edge operations are available.
    Distributed,
}

/// Hosts this peer's share of a distributed graph.
///
/// Every peer of the cage context builds the same graph and runs the same
/// mapping, so all peers agree on who hosts which vertex without talking.
/// Messages along an edge travel on the graph channel, tagged with the edge's
/// position in the edge table.
pub struct Cage<B: Backend, P = ()> {
    comm: Communicator<B>,
    context: Context,
    state: CageState,
    graph: ArenaGraph<P>,
    owners: Vec<PeerId>,
    hosted: Vec<VertexId>,
}

impl<B: Backend, P: Default> Cage<B, P> {
    /// Empty cage spanning `context`.
    pub fn new(comm: Communicator<B>, context: Context) -> Self {
        Self {
            comm,
            context,
            state: CageState::Uninitialized,
            graph: ArenaGraph::default(),
            owners: Vec::new(),
            hosted: Vec::new(),
        }
    }

    /// Replaces the topology. The vertex count is one past the highest endpoint.
    pub fn set_graph(&mut self, edges: Vec<Edge>) {
        self.set_graph_with_count(edges, 0);
    }

    /// Replaces the topology with `pattern` over `vertex_count` vertices.
    pub fn set_pattern(&mut self, pattern: &Pattern, vertex_count: usize) {
        self.set_graph_with_count(pattern.generate(vertex_count), vertex_count);
    }

    /// Replaces the topology, keeping at least `vertex_count` vertices.
    pub fn set_graph_with_count(&mut self, edges: Vec<Edge>, vertex_count: usize) {
        self.graph = ArenaGraph::from_edges(edges, vertex_count);
        self.owners.clear();
        self.hosted.clear();
        self.state = CageState::GraphSet;
        debug!(
            vertices = self.graph.vertex_count(),
            edges = self.graph.edge_count(),
            "Cage graph set"
        );
    }
}

impl<B: Backend, P> Cage<B, P> {
    /// Current lifecycle state.
    pub fn state(&self) -> CageState {
        self.state
    }

    /// Context the cage spans.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Moves the cage to another context, e.g. after membership grew.
    ///
    /// A distributed cage falls back to [`CageState::GraphSet`] and has to be
    /// distributed again.
    pub fn set_context(&mut self, context: Context) {
        self.context = context;
        if self.state == CageState::Distributed {
            self.owners.clear();
            self.hosted.clear();
            self.state = CageState::GraphSet;
        }
    }

    /// The communicator messages travel through.
    pub fn communicator(&self) -> &Communicator<B> {
        &self.comm
    }

    /// Number of vertices in the graph.
    pub fn vertex_count(&self) -> usize {
        self.graph.vertex_count()
    }

    /// Edge table in generation order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.graph.edge_count()).filter_map(|id| self.graph.edge(id))
    }

    /// Peers of the cage context, in rank order.
    pub fn peers(&self) -> &[PeerId] {
        self.context.members()
    }

    /// Places every vertex on a peer of the cage context.
    ///
    /// Mapping ranks are translated to the context's members, so a cage on a
    /// derived context places vertices only on that context's peers.
    pub fn distribute(&mut self, mapping: &Mapping) -> Result<(), GraphError> {
        if self.state == CageState::Uninitialized {
            return Err(GraphError::NoGraph);
        }
        let ranks = mapping.assign(self.graph.vertex_count(), self.context.size())?;
        let owners = ranks
            .into_iter()
            .map(|rank| {
                self.context.peer_at(rank.index()).ok_or_else(|| {
                    GraphError::Comm(CommError::InvalidContext(format!(
                        "mapping produced rank {rank} outside a context of {}",
                        self.context.size()
                    )))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let me = self.context.peer_id();
        self.hosted = owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| **owner == me)
            .map(|(v, _)| VertexId(v as u32))
            .collect();
        self.owners = owners;
        self.state = CageState::Distributed;

        info!(
            peer = %me,
            hosted = self.hosted.len(),
            vertices = self.owners.len(),
            ?mapping,
            "Graph distributed"
        );
        Ok(())
    }

    fn require_distributed(&self) -> Result<(), GraphError> {
        match self.state {
            CageState::Distributed => Ok(()),
            _ => Err(GraphError::NotDistributed),
        }
    }

    /// Peer hosting `vertex`.
    pub fn peer_of(&self, vertex: VertexId) -> Result<PeerId, GraphError> {
        self.require_distributed()?;
        self.owners
            .get(vertex.index())
            .copied()
            .ok_or(GraphError::UnknownVertex(vertex))
    }

    fn is_hosted(&self, vertex: VertexId) -> bool {
        self.owners.get(vertex.index()) == Some(&self.context.peer_id())
    }

    /// Handle to any vertex of the graph.
    pub fn vertex(&self, id: VertexId) -> Result<Vertex<'_, B, P>, GraphError> {
        let owner = self.peer_of(id)?;
        Ok(Vertex {
            cage: self,
            id,
            owner,
        })
    }

    /// Vertices hosted by this peer, in ascending id order.
    ///
    /// Each call starts a fresh iteration over the same set.
    pub fn hosted_vertices(&self) -> Result<impl Iterator<Item = Vertex<'_, B, P>> + '_, GraphError> {
        self.require_distributed()?;
        let me = self.context.peer_id();
        Ok(self.hosted.iter().map(move |id| Vertex {
            cage: self,
            id: *id,
            owner: me,
        }))
    }

    /// Number of hosted vertices.
    pub fn hosted_count(&self) -> usize {
        self.hosted.len()
    }

    /// Mutable payload of a hosted vertex.
    pub fn payload_mut(&mut self, vertex: VertexId) -> Result<&mut P, GraphError> {
        self.require_distributed()?;
        if !self.is_hosted(vertex) {
            return Err(match self.owners.get(vertex.index()) {
                Some(_) => GraphError::NotHosted(vertex),
                None => GraphError::UnknownVertex(vertex),
            });
        }
        self.graph
            .payload_mut(vertex)
            .ok_or(GraphError::UnknownVertex(vertex))
    }

    fn edge_id(&self, edge: Edge) -> Result<EdgeId, GraphError> {
        self.require_distributed()?;
        self.graph
            .edge_id(edge)
            .ok_or(GraphError::InvalidEdge(edge))
    }

    fn owner(&self, vertex: VertexId) -> Result<PeerId, GraphError> {
        self.owners
            .get(vertex.index())
            .copied()
            .ok_or(GraphError::UnknownVertex(vertex))
    }

    /// Wire tag of `edge`. Duplicates of an edge share the tag of its first
    /// occurrence, so they form one FIFO stream.
    fn tag_of(&self, edge: Edge) -> Result<Tag, GraphError> {
        self.graph
            .edge_id(edge)
            .map(|id| id as Tag)
            .ok_or(GraphError::InvalidEdge(edge))
    }

    fn send_on(&self, edge: Edge, payload: Bytes) -> Result<SendEvent, GraphError> {
        let tag = self.tag_of(edge)?;
        if !self.is_hosted(edge.source) {
            return Err(GraphError::NotHosted(edge.source));
        }
        let dest = self.owner(edge.target)?;
        debug!(%edge, %dest, len = payload.len(), "Edge send");
        Ok(self
            .comm
            .backend()
            .async_send_data(dest, Channel::Graph, tag, &self.context, payload))
    }

    fn recv_on(&self, edge: Edge) -> Result<RecvEvent, GraphError> {
        let tag = self.tag_of(edge)?;
        if !self.is_hosted(edge.target) {
            return Err(GraphError::NotHosted(edge.target));
        }
        let src = self.owner(edge.source)?;
        Ok(self.comm.backend().async_recv_data(
            Channel::Graph,
            Some(src),
            Some(tag),
            &self.context,
        ))
    }

    /// Starts sending `data` along `edge`. The source must be hosted here.
    pub fn async_send<T: Pod>(&self, edge: Edge, data: &[T]) -> Result<SendEvent, GraphError> {
        self.edge_id(edge)?;
        self.send_on(edge, encode(data))
    }

    /// Sends `data` along `edge` and waits for completion.
    pub async fn send<T: Pod>(&self, edge: Edge, data: &[T]) -> Result<(), GraphError> {
        self.async_send(edge, data)?.await?;
        Ok(())
    }

    /// Posts a receive on `edge`. The target must be hosted here.
    pub fn async_recv(&self, edge: Edge) -> Result<RecvEvent, GraphError> {
        self.edge_id(edge)?;
        self.recv_on(edge)
    }

    /// Receives the next message sent along `edge`.
    pub async fn recv<T: Pod>(&self, edge: Edge) -> Result<Vec<T>, GraphError> {
        let msg = self.async_recv(edge)?.await?;
        Ok(decode(&msg.payload)?)
    }

    /// Receives the next message on any edge ending at a hosted vertex and
    /// reports the edge it travelled on.
    pub async fn recv_any<T: Pod>(&self) -> Result<(Edge, Vec<T>), GraphError> {
        self.require_distributed()?;
        let msg = self
            .comm
            .backend()
            .async_recv_data(Channel::Graph, None, None, &self.context)
            .await?;
        let edge = self.graph.edge(msg.tag as EdgeId).ok_or_else(|| {
            CommError::Transport(format!(
                "{} sent on unknown edge tag {}",
                msg.src, msg.tag
            ))
        })?;
        debug!(%edge, src = %msg.src, "Edge receive (any)");
        Ok((edge, decode(&msg.payload)?))
    }
}

/// Handle to one vertex of a distributed [`Cage`].
pub struct Vertex<'a, B: Backend, P> {
    cage: &'a Cage<B, P>,
    id: VertexId,
    owner: PeerId,
}

impl<B: Backend, P> Clone for Vertex<'_, B, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend, P> Copy for Vertex<'_, B, P> {}

impl<B: Backend, P> std::fmt::Debug for Vertex<'_, B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}

impl<'a, B: Backend, P> Vertex<'a, B, P> {
    /// Vertex id.
    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Peer hosting this vertex.
    pub fn owner(&self) -> PeerId {
        self.owner
    }

    /// Whether this peer hosts the vertex.
    pub fn is_local(&self) -> bool {
        self.owner == self.cage.context.peer_id()
    }

    /// Application payload; only hosted vertices expose one.
    pub fn payload(&self) -> Option<&'a P> {
        let cage: &'a Cage<B, P> = self.cage;
        if self.is_local() {
            cage.graph.payload(self.id)
        } else {
            None
        }
    }

    /// Edges leaving this vertex, in edge table order.
    pub fn outgoing_edges(&self) -> impl Iterator<Item = Edge> + 'a {
        let cage: &'a Cage<B, P> = self.cage;
        let graph = &cage.graph;
        graph.outgoing(self.id).iter().filter_map(|id| graph.edge(*id))
    }

    /// Edges entering this vertex, in edge table order.
    pub fn incoming_edges(&self) -> impl Iterator<Item = Edge> + 'a {
        let cage: &'a Cage<B, P> = self.cage;
        let graph = &cage.graph;
        graph.incoming(self.id).iter().filter_map(|id| graph.edge(*id))
    }

    fn require_local(&self) -> Result<(), GraphError> {
        if self.is_local() {
            Ok(())
        } else {
            Err(GraphError::NotHosted(self.id))
        }
    }

    fn incoming_events(&self) -> Result<Vec<(Edge, RecvEvent)>, GraphError> {
        let graph = &self.cage.graph;
        graph
            .incoming(self.id)
            .iter()
            .filter_map(|id| graph.edge(*id))
            .map(|edge| self.cage.recv_on(edge).map(|event| (edge, event)))
            .collect()
    }

    /// Sends `data` along every outgoing edge.
    ///
    /// All sends are issued before any is awaited.
    pub async fn spread<T: Pod>(&self, data: &[T]) -> Result<(), GraphError> {
        self.require_local()?;
        let payload = encode(data);
        let graph = &self.cage.graph;
        let sends = graph
            .outgoing(self.id)
            .iter()
            .filter_map(|id| graph.edge(*id))
            .map(|edge| self.cage.send_on(edge, payload.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        wait_all(sends).await?;
        Ok(())
    }

    /// Receives one message per incoming edge, paired with its edge.
    pub async fn collect<T: Pod>(&self) -> Result<Vec<(Edge, Vec<T>)>, GraphError> {
        self.require_local()?;
        let (edges, recvs): (Vec<Edge>, Vec<RecvEvent>) =
            self.incoming_events()?.into_iter().unzip();
        let messages = wait_all(recvs).await?;
        edges
            .into_iter()
            .zip(messages)
            .map(|(edge, msg)| {
                decode(&msg.payload)
                    .map(|data| (edge, data))
                    .map_err(GraphError::from)
            })
            .collect()
    }

    /// Receives one message per incoming edge, overwriting `buf` with each
    /// in arrival order. Returns the number of messages received.
    pub async fn collect_into<T: Pod>(&self, buf: &mut [T]) -> Result<usize, GraphError> {
        self.require_local()?;
        let mut pending: FuturesUnordered<RecvEvent> = self
            .incoming_events()?
            .into_iter()
            .map(|(_, event)| event)
            .collect();

        let mut received = 0;
        while let Some(msg) = pending.next().await {
            decode_into(&msg?.payload, buf)?;
            received += 1;
        }
        Ok(received)
    }
}
