// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The declarative description of a chassis: the nodes (chips) it carries,
//! the singleton ports on those nodes, and the trunks built out of them.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use common::network::MacAddr;
use common::ports::AdminState;
use common::ports::LoopbackState;
use common::ports::PortKey;

use crate::types::ChassisResult;

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Unknown,
    GenericTridentPlus,
    GenericTrident2,
    GenericTomahawk,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Chassis {
    pub platform: Platform,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Node {
    pub id: u64,
    pub slot: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SingletonPort {
    pub id: u32,
    pub node: u64,
    pub slot: i32,
    pub port: i32,
    #[serde(default)]
    pub channel: i32,
    pub speed_bps: u64,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub loopback_state: LoopbackState,
    #[serde(default)]
    pub autoneg: bool,
    #[serde(default)]
    pub mac_address: Option<MacAddr>,
}

impl SingletonPort {
    /// The (slot, port, channel) of this port.
    pub fn key(&self) -> PortKey {
        PortKey::new(self.slot, self.port, self.channel)
    }

    /// The (slot, port) of the transceiver cage this port lives in.
    pub fn group_key(&self) -> PortKey {
        PortKey::group(self.slot, self.port)
    }
}

impl std::fmt::Display for SingletonPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(node_id: {}, port_id: {}, slot: {}, port: {}, channel: {}, \
            speed: {}G)",
            self.node,
            self.id,
            self.slot,
            self.port,
            self.channel,
            self.speed_bps / common::BITS_PER_GIGABIT
        )
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrunkType {
    #[default]
    Unknown,
    Static,
    Lacp,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct TrunkPort {
    pub id: u32,
    pub node: u64,
    #[serde(default, rename = "type")]
    pub trunk_type: TrunkType,
    #[serde(default)]
    pub members: Vec<u32>,
}

impl std::fmt::Display for TrunkPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(node_id: {}, trunk_id: {}, type: {}, members: {:?})",
            self.node, self.id, self.trunk_type, self.members
        )
    }
}

/// The complete configuration pushed to the chassis manager.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ChassisConfig {
    pub chassis: Chassis,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub singleton_ports: Vec<SingletonPort>,
    #[serde(default)]
    pub trunk_ports: Vec<TrunkPort>,
}

impl ChassisConfig {
    pub fn from_toml(txt: &str) -> ChassisResult<Self> {
        Ok(toml::from_str(txt)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ChassisResult<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_toml(&txt)
    }
}
