// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use common::ports::LoopbackState;
use common::BITS_PER_GIGABIT;

/// A sparse set of port settings.  Only the fields that are `Some` are
/// applied by `set_port_options()`; the rest are left as they are.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct PortOptions {
    pub enabled: Option<bool>,
    pub blocked: Option<bool>,
    pub speed_bps: Option<u64>,
    pub num_serdes_lanes: Option<u8>,
    pub loopback_mode: Option<LoopbackState>,
}

impl PortOptions {
    pub fn enable(enabled: bool) -> Self {
        PortOptions {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == PortOptions::default()
    }
}

impl fmt::Display for PortOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(e) = self.enabled {
            fields.push(format!("enabled: {e}"));
        }
        if let Some(b) = self.blocked {
            fields.push(format!("blocked: {b}"));
        }
        if let Some(s) = self.speed_bps {
            fields.push(format!("speed: {}G", s / BITS_PER_GIGABIT));
        }
        if let Some(n) = self.num_serdes_lanes {
            fields.push(format!("num_serdes_lanes: {n}"));
        }
        if let Some(l) = self.loopback_mode {
            fields.push(format!("loopback_mode: {l}"));
        }
        write!(f, "{{{}}}", fields.join(", "))
    }
}

/// Lane-level parameters used to program the SerDes behind a logical port.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct SerdesParams {
    pub speed_bps: u64,
    pub serdes_core: i32,
    pub serdes_lane: i32,
    pub num_serdes_lanes: u8,
    pub tx_lane_map: i32,
    pub rx_lane_map: i32,
    pub tx_polarity_flip: i32,
    pub rx_polarity_flip: i32,
}

/// Per-port traffic counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct PortCounters {
    pub in_octets: u64,
    pub out_octets: u64,
    pub in_unicast_pkts: u64,
    pub out_unicast_pkts: u64,
    pub in_broadcast_pkts: u64,
    pub out_broadcast_pkts: u64,
    pub in_multicast_pkts: u64,
    pub out_multicast_pkts: u64,
    pub in_discards: u64,
    pub out_discards: u64,
    pub in_errors: u64,
    pub out_errors: u64,
    pub in_fcs_errors: u64,
}
