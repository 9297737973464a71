// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! TCP socket backend with late-joining peers.

mod backend;
mod config;
mod framing;
mod listener;
mod protocol;
mod registry;

pub use backend::SocketBackend;
pub use config::{CONFIG_PATH_ENV, ConfigError, ENV_PREFIX, SocketConfig, parse_endpoint};
pub use framing::{Frame, FrameCodec, FrameKind};
pub use protocol::Roster;
pub use registry::Registry;
