// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport backends for trellis.
//!
//! A [`Backend`] moves opaque byte payloads between peers of a [`Context`]
//! and reports completion through [`trellis_event::Event`]s. Collectives come
//! with default implementations built from point-to-point messages on a
//! reserved channel, so a backend only has to provide raw send and receive.
//!
//! Two backends ship with the crate:
//!
//! - [`LocalBackend`]: peers of one process exchanging messages through
//!   shared in-memory mailboxes; membership is fixed at creation.
//! - [`tcp::SocketBackend`]: TCP peers that rendezvous through a
//!   [`tcp::Registry`]; peers may join a running computation.

#![deny(missing_docs)]

mod backend;
mod collective;
mod context;
mod error;
mod local;
mod mailbox;
mod message;

pub mod tcp;

pub use backend::Backend;
pub use context::{Context, ContextId, ContextVersions, PeerId};
pub use error::CommError;
pub use local::LocalBackend;
pub use message::{Channel, Message, Tag};

/// Event type returned by asynchronous sends.
pub type SendEvent = trellis_event::Event<(), CommError>;

/// Event type returned by asynchronous receives.
pub type RecvEvent = trellis_event::Event<Message, CommError>;
