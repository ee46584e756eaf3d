// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use common::ports::HwState;
use common::ports::PortState;

/// When link scanning detects a state change for a port, the driver sends a
/// LinkEvent to every registered link event writer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkEvent {
    pub unit: i32,
    pub logical_port: i32,
    pub state: PortState,
}

/// Signals that a transceiver module was inserted into or removed from the
/// cage at `(slot, port)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransceiverEvent {
    pub slot: i32,
    pub port: i32,
    pub state: HwState,
}
