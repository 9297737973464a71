// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Graph topology layer: edge patterns, vertex placement and the [`Cage`]
//! that exchanges messages along edges.

mod cage;
mod mapping;
mod pattern;
mod storage;

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_backend::CommError;

pub use cage::{Cage, CageState, Vertex};
pub use mapping::Mapping;
pub use pattern::Pattern;
pub use storage::{ArenaGraph, EdgeId, GraphStorage};

/// Identifier of a graph vertex, independent of peer ids.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Index form, for addressing per-vertex tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VertexId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for VertexId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Directed edge between two vertices.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Edge {
    /// Tail of the edge.
    pub source: VertexId,
    /// Head of the edge.
    pub target: VertexId,
}

impl Edge {
    /// Edge from vertex `source` to vertex `target`.
    pub fn new(source: u32, target: u32) -> Self {
        Self {
            source: VertexId(source),
            target: VertexId(target),
        }
    }

    /// The same endpoints in the opposite direction.
    ///
    /// The inverse need not exist in the graph; sending on a missing inverse
    /// fails with [`GraphError::InvalidEdge`].
    pub fn inverse(&self) -> Self {
        Self {
            source: self.target,
            target: self.source,
        }
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// Errors of the graph layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A vertex operation ran before [`Cage::distribute`].
    #[error("graph has not been distributed")]
    NotDistributed,

    /// [`Cage::distribute`] ran before a graph was set.
    #[error("no graph has been set")]
    NoGraph,

    /// The edge is not part of the graph.
    #[error("edge {0} is not part of the graph")]
    InvalidEdge(Edge),

    /// The vertex id is outside the graph.
    #[error("vertex {0} is not part of the graph")]
    UnknownVertex(VertexId),

    /// The operation needs a vertex hosted by this peer.
    #[error("vertex {0} is not hosted by this peer")]
    NotHosted(VertexId),

    /// A mapping was asked to place vertices on zero peers.
    #[error("cannot map vertices onto zero peers")]
    NoPeers,

    /// Underlying communication failure.
    #[error(transparent)]
    Comm(#[from] CommError),
}
