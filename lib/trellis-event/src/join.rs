// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use futures::future::try_join_all;

use crate::event::Event;
use crate::status::EventPoison;

/// Waits for every event, returning their values in input order.
///
/// Stops at the first failure; the remaining events are dropped, which does
/// not cancel their operations.
pub async fn wait_all<T, E, I>(events: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Event<T, E>>,
    E: From<EventPoison>,
{
    try_join_all(events).await
}
