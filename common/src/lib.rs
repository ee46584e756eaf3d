// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Types and utilities shared by the chassis daemon and the hardware layers
//! beneath it.

pub mod channel;
pub mod logging;
pub mod network;
pub mod ports;

/// Config-facing port ID reserved for the CPU port.  No singleton or trunk
/// port may claim it.
pub const CPU_PORT_ID: u32 = 0xFFFF_FFFD;

/// SDK logical port reserved on every unit for the CPU (CMIC) path.
pub const CPU_LOGICAL_PORT: i32 = 0;

/// Bits per second in one gigabit.
pub const BITS_PER_GIGABIT: u64 = 1_000_000_000;

/// Depth of the channel carrying link-state events from the driver.
pub const MAX_LINK_EVENT_DEPTH: usize = 256;

/// Depth of the channel carrying transceiver insert/remove events.
pub const MAX_XCVR_EVENT_DEPTH: usize = 256;
