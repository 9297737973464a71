// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Single-shot completion handles for asynchronous communication operations.
//!
//! # Overview
//!
//! Every asynchronous send or receive issued against a transport backend hands
//! back an [`Event`]. The backend keeps the matching [`Completer`] and resolves
//! it once the operation finishes.
//!
//! - [`Event`]: caller side; await it, [`Event::wait`] on it, or poll it
//!   without blocking through [`Event::status`]
//! - [`Completer`]: producer side; fails the event on drop if never completed
//! - [`EventHandle`]: process-unique identifier used for tracing
//! - [`wait_all`]: awaits a batch of events, stopping at the first failure

#![deny(missing_docs)]

mod event;
mod handle;
mod join;
mod slot;
mod status;

pub use event::{Completer, Event, event_pair};
pub use handle::EventHandle;
pub use join::wait_all;
pub use status::{EventPoison, EventStatus};
