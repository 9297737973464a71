// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Graph-structured distributed computation over pluggable communication backends.
//!
//! - [`Communicator`]: typed point-to-point and collective operations over any
//!   [`Backend`], with explicit [`Context`] arguments
//! - [`graph::Pattern`]: deterministic edge sets for common topologies
//! - [`graph::Mapping`]: vertex to peer assignment strategies
//! - [`graph::Cage`]: hosts this peer's share of a graph and exchanges
//!   messages along its edges
//!
//! ```rust,ignore
//! let comm = Communicator::new(backend);
//! let mut cage = Cage::<_, ()>::new(comm.clone(), comm.global_context());
//! cage.set_pattern(&Pattern::BidirectionalStar, 4);
//! cage.distribute(&Mapping::Consecutive)?;
//! for vertex in cage.hosted_vertices()? {
//!     vertex.spread(&[vertex.id().0]).await?;
//! }
//! ```

#![deny(missing_docs)]

mod communicator;
pub mod graph;
pub mod logging;

pub use communicator::Communicator;
pub use trellis_backend::{
    Backend, Channel, CommError, Context, ContextId, LocalBackend, Message, PeerId, Tag, tcp,
};
pub use trellis_event::{Event, EventStatus};
