// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Notifications published by the chassis manager when port state changes.

use common::channel::ChannelWriter;
use common::ports::AdminState;
use common::ports::LoopbackState;
use common::ports::PortState;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChassisEvent {
    PortOperStateChanged {
        node_id: u64,
        port_id: u32,
        state: PortState,
    },
    PortAdminStateChanged {
        node_id: u64,
        port_id: u32,
        state: AdminState,
    },
    PortLoopbackStateChanged {
        node_id: u64,
        port_id: u32,
        state: LoopbackState,
    },
}

impl ChassisEvent {
    /// The (node_id, port_id) the event is about.
    pub fn port(&self) -> (u64, u32) {
        match *self {
            ChassisEvent::PortOperStateChanged {
                node_id, port_id, ..
            }
            | ChassisEvent::PortAdminStateChanged {
                node_id, port_id, ..
            }
            | ChassisEvent::PortLoopbackStateChanged {
                node_id, port_id, ..
            } => (node_id, port_id),
        }
    }
}

/// A consumer of chassis events.  Writes are best-effort and must not block.
/// A sink returns `false` when it can no longer accept events, after which
/// the manager stops writing to it.
pub trait NotificationSink: Send + Sync {
    fn write(&self, event: ChassisEvent) -> bool;
}

/// Forwards events into an [`EventChannel`](common::channel::EventChannel).
pub struct ChannelSink {
    writer: ChannelWriter<ChassisEvent>,
}

impl ChannelSink {
    pub fn new(writer: ChannelWriter<ChassisEvent>) -> Self {
        ChannelSink { writer }
    }
}

impl NotificationSink for ChannelSink {
    // A full channel only loses this event, but a closed one will never
    // accept another.
    fn write(&self, event: ChassisEvent) -> bool {
        self.writer.send(event) || !self.writer.is_closed()
    }
}
