// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use super::{Edge, VertexId};

/// Position of an edge in the edge table.
pub type EdgeId = usize;

/// Vertex payloads plus adjacency.
pub trait GraphStorage {
    /// Per-vertex application data.
    type Payload;

    /// Number of vertices.
    fn vertex_count(&self) -> usize;

    /// Number of materialized edges.
    fn edge_count(&self) -> usize;

    /// Edge at `id`.
    fn edge(&self, id: EdgeId) -> Option<Edge>;

    /// First table position of `edge`.
    fn edge_id(&self, edge: Edge) -> Option<EdgeId>;

    /// Edges leaving `vertex`, in table order.
    fn outgoing(&self, vertex: VertexId) -> &[EdgeId];

    /// Edges entering `vertex`, in table order.
    fn incoming(&self, vertex: VertexId) -> &[EdgeId];

    /// Payload of `vertex`.
    fn payload(&self, vertex: VertexId) -> Option<&Self::Payload>;

    /// Mutable payload of `vertex`.
    fn payload_mut(&mut self, vertex: VertexId) -> Option<&mut Self::Payload>;
}

struct VertexRecord<P> {
    payload: P,
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

/// Arena of vertex records indexed by [`VertexId`], with a separate edge table.
pub struct ArenaGraph<P> {
    vertices: Vec<VertexRecord<P>>,
    edges: Vec<Edge>,
    index: BTreeMap<Edge, EdgeId>,
}

impl<P> Default for ArenaGraph<P> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<P: Default> ArenaGraph<P> {
    /// Builds the arena. The vertex count is the larger of `vertex_count`
    /// and one past the highest endpoint. Duplicate edges are kept.
    pub fn from_edges(edges: Vec<Edge>, vertex_count: usize) -> Self {
        let highest = edges
            .iter()
            .map(|e| e.source.index().max(e.target.index()) + 1)
            .max()
            .unwrap_or(0);
        let count = vertex_count.max(highest);

        let mut vertices: Vec<VertexRecord<P>> = (0..count)
            .map(|_| VertexRecord {
                payload: P::default(),
                outgoing: Vec::new(),
                incoming: Vec::new(),
            })
            .collect();
        let mut index = BTreeMap::new();
        for (id, edge) in edges.iter().enumerate() {
            vertices[edge.source.index()].outgoing.push(id);
            vertices[edge.target.index()].incoming.push(id);
            index.entry(*edge).or_insert(id);
        }

        Self {
            vertices,
            edges,
            index,
        }
    }
}

impl<P> GraphStorage for ArenaGraph<P> {
    type Payload = P;

    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn edge(&self, id: EdgeId) -> Option<Edge> {
        self.edges.get(id).copied()
    }

    fn edge_id(&self, edge: Edge) -> Option<EdgeId> {
        self.index.get(&edge).copied()
    }

    fn outgoing(&self, vertex: VertexId) -> &[EdgeId] {
        self.vertices
            .get(vertex.index())
            .map(|v| v.outgoing.as_slice())
            .unwrap_or_default()
    }

    fn incoming(&self, vertex: VertexId) -> &[EdgeId] {
        self.vertices
            .get(vertex.index())
            .map(|v| v.incoming.as_slice())
            .unwrap_or_default()
    }

    fn payload(&self, vertex: VertexId) -> Option<&P> {
        self.vertices.get(vertex.index()).map(|v| &v.payload)
    }

    fn payload_mut(&mut self, vertex: VertexId) -> Option<&mut P> {
        self.vertices.get_mut(vertex.index()).map(|v| &mut v.payload)
    }
}
