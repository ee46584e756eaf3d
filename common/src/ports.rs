// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Port identifiers and the state enumerations tracked for each port.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::BITS_PER_GIGABIT;

pub const SPEED_1G: u64 = BITS_PER_GIGABIT;
pub const SPEED_10G: u64 = 10 * BITS_PER_GIGABIT;
pub const SPEED_20G: u64 = 20 * BITS_PER_GIGABIT;
pub const SPEED_25G: u64 = 25 * BITS_PER_GIGABIT;
pub const SPEED_40G: u64 = 40 * BITS_PER_GIGABIT;
pub const SPEED_50G: u64 = 50 * BITS_PER_GIGABIT;
pub const SPEED_100G: u64 = 100 * BITS_PER_GIGABIT;

/// Identifies a physical port by its location on the chassis.  With the
/// channel omitted, the key names the whole port group: the transceiver cage
/// that all channels of the port share.
///
/// Keys order lexicographically by (slot, port, channel), with a group key
/// sorting ahead of every channel in that group.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Deserialize,
    Serialize,
)]
pub struct PortKey {
    pub slot: i32,
    pub port: i32,
    pub channel: Option<i32>,
}

impl PortKey {
    pub fn new(slot: i32, port: i32, channel: i32) -> Self {
        PortKey {
            slot,
            port,
            channel: Some(channel),
        }
    }

    /// The key for the port group (transceiver cage) at `(slot, port)`.
    pub fn group(slot: i32, port: i32) -> Self {
        PortKey {
            slot,
            port,
            channel: None,
        }
    }

    /// Strip the channel, yielding the key of the group containing this port.
    pub fn to_group(self) -> Self {
        PortKey::group(self.slot, self.port)
    }

    pub fn is_group(&self) -> bool {
        self.channel.is_none()
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(c) => write!(
                f,
                "(slot: {}, port: {}, channel: {})",
                self.slot, self.port, c
            ),
            None => write!(f, "(slot: {}, port: {})", self.slot, self.port),
        }
    }
}

/// The driver-facing name of a port: a logical port number on a unit.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Deserialize,
    Serialize,
)]
pub struct SdkPort {
    pub unit: i32,
    pub logical_port: i32,
}

impl SdkPort {
    pub fn new(unit: i32, logical_port: i32) -> Self {
        SdkPort { unit, logical_port }
    }
}

impl fmt::Display for SdkPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(unit: {}, logical_port: {})",
            self.unit, self.logical_port
        )
    }
}

/// The driver-facing name of a trunk.  A trunk port number of -1 means the
/// trunk has not yet been created in hardware.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Deserialize,
    Serialize,
)]
pub struct SdkTrunk {
    pub unit: i32,
    pub trunk_port: i32,
}

impl SdkTrunk {
    pub const UNASSIGNED: i32 = -1;

    pub fn new(unit: i32, trunk_port: i32) -> Self {
        SdkTrunk { unit, trunk_port }
    }
}

impl fmt::Display for SdkTrunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(unit: {}, trunk_port: {})", self.unit, self.trunk_port)
    }
}

/// Operational (link) state of a port.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    #[default]
    Unknown,
    Up,
    Down,
    Failed,
}

/// Administrative state of a port.  `Unknown` in a config means "leave the
/// current state alone".
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdminState {
    #[default]
    Unknown,
    Disabled,
    Enabled,
    Diag,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unknown,
    Good,
    Bad,
}

/// Loopback mode of a port.  `Unknown` is the "not configured" value, and
/// requests to apply it are no-ops.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoopbackState {
    #[default]
    Unknown,
    None,
    Mac,
    Phy,
}

/// Hardware state of a transceiver port group.
///
/// Only `Present` and `NotPresent` are ever reported by presence detection.
/// `Ready` is reached once a present group has been programmed.  The
/// remaining states exist in the hardware model but have no meaning as a
/// presence event.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HwState {
    #[default]
    Unknown,
    NotPresent,
    Present,
    Ready,
    Off,
    Diagnostic,
    Failed,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrunkState {
    #[default]
    Unknown,
    AllMembersUp,
    SomeMembersUp,
    AllMembersDown,
}
