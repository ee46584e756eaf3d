// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The hardware capability map: every chip and every (slot, port, channel,
//! speed) combination the platform is able to support.  A capability map is
//! loaded once at startup.  Each config push specializes it into a target
//! map holding just the chips and ports the config uses.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use aal::ChipInit;
use aal::ChipType;
use aal::SerdesParams;
use common::ports::PortKey;
use common::ports::SdkPort;
use common::BITS_PER_GIGABIT;

use crate::types::ChassisError;
use crate::types::ChassisResult;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Chip {
    pub unit: i32,
    pub chip_type: ChipType,
    #[serde(default)]
    pub slot: i32,
    #[serde(default)]
    pub module: i32,
    #[serde(default)]
    pub pci_bus: i32,
    #[serde(default)]
    pub pci_slot: i32,
}

impl Chip {
    pub fn init_params(&self) -> ChipInit {
        ChipInit {
            chip_type: self.chip_type,
            module: self.module,
            pci_bus: self.pci_bus,
            pci_slot: self.pci_slot,
        }
    }
}

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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// 10G-class ethernet port
    Xe,
    /// 100G-class ethernet port
    Ce,
    /// 1G ethernet port
    Ge,
    /// Management port
    Mgmt,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct HardwarePort {
    pub unit: i32,
    #[serde(default)]
    pub slot: i32,
    pub port: i32,
    #[serde(default)]
    pub channel: i32,
    pub speed_bps: u64,
    pub port_type: PortType,
    pub physical_port: i32,
    #[serde(default)]
    pub diag_port: i32,
    #[serde(default)]
    pub logical_port: i32,
    #[serde(default)]
    pub module: i32,
    #[serde(default)]
    pub serdes_core: i32,
    #[serde(default)]
    pub serdes_lane: i32,
    #[serde(default)]
    pub num_serdes_lanes: u8,
    #[serde(default)]
    pub tx_lane_map: i32,
    #[serde(default)]
    pub rx_lane_map: i32,
    #[serde(default)]
    pub tx_polarity_flip: i32,
    #[serde(default)]
    pub rx_polarity_flip: i32,
    #[serde(default)]
    pub flex_port: bool,
    #[serde(default)]
    pub internal: bool,
}

impl HardwarePort {
    pub fn key(&self) -> PortKey {
        PortKey::new(self.slot, self.port, self.channel)
    }

    pub fn group_key(&self) -> PortKey {
        PortKey::group(self.slot, self.port)
    }

    pub fn sdk_port(&self) -> SdkPort {
        SdkPort::new(self.unit, self.logical_port)
    }

    /// Only ethernet data ports can back a configured singleton port.
    pub fn is_data_port(&self) -> bool {
        matches!(self.port_type, PortType::Xe | PortType::Ce | PortType::Ge)
    }

    pub fn serdes_params(&self) -> SerdesParams {
        SerdesParams {
            speed_bps: self.speed_bps,
            serdes_core: self.serdes_core,
            serdes_lane: self.serdes_lane,
            num_serdes_lanes: self.num_serdes_lanes,
            tx_lane_map: self.tx_lane_map,
            rx_lane_map: self.rx_lane_map,
            tx_polarity_flip: self.tx_polarity_flip,
            rx_polarity_flip: self.rx_polarity_flip,
        }
    }
}

impl std::fmt::Display for HardwarePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(unit: {}, slot: {}, port: {}, channel: {}, speed: {}G, \
            logical_port: {}, type: {})",
            self.unit,
            self.slot,
            self.port,
            self.channel,
            self.speed_bps / BITS_PER_GIGABIT,
            self.logical_port,
            self.port_type
        )
    }
}

/// The full set of chips and ports a platform supports.  The same type also
/// describes a target map, the subset of a capability map selected by a
/// config push.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct HardwareCapabilityMap {
    #[serde(default)]
    pub id: String,
    /// The logical port numbers are assigned by software rather than given
    /// in the map.
    #[serde(default)]
    pub auto_add_logical_ports: bool,
    /// The slot is taken from the pushed config rather than given in the
    /// map.
    #[serde(default)]
    pub auto_add_slot: bool,
    #[serde(default)]
    pub chips: Vec<Chip>,
    #[serde(default)]
    pub ports: Vec<HardwarePort>,
}

pub type TargetMap = HardwareCapabilityMap;

impl HardwareCapabilityMap {
    pub fn chip(&self, unit: i32) -> Option<&Chip> {
        self.chips.iter().find(|c| c.unit == unit)
    }

    fn chip_type(&self, unit: i32) -> Option<ChipType> {
        self.chip(unit).map(|c| c.chip_type)
    }

    /// GE ports on a TridentPlus don't have a fixed logical port.  One is
    /// picked out of the unused numbers in the X pipeline.
    pub fn is_ge_on_trident_plus(&self, port: &HardwarePort) -> bool {
        port.port_type == PortType::Ge
            && self.chip_type(port.unit) == Some(ChipType::TridentPlus)
    }

    /// Check that the map is internally consistent.
    pub fn validate(&self) -> ChassisResult<()> {
        let mut slots = BTreeSet::new();
        let mut units = BTreeSet::new();
        let mut modules = BTreeSet::new();

        for chip in &self.chips {
            if self.auto_add_slot {
                if chip.slot != 0 {
                    return Err(invalid(format!(
                        "auto_add_slot is set and slot is non-zero for \
                        chip {chip:?}"
                    )));
                }
            } else {
                if chip.slot <= 0 {
                    return Err(invalid(format!("invalid slot in {chip:?}")));
                }
                slots.insert(chip.slot);
            }
            if chip.unit < 0 || !units.insert(chip.unit) {
                return Err(invalid(format!("invalid unit in {chip:?}")));
            }
            if chip.module < 0 || !modules.insert(chip.module) {
                return Err(invalid(format!("invalid module in {chip:?}")));
            }
            if chip.pci_bus < 0 || chip.pci_slot < 0 {
                return Err(invalid(format!(
                    "invalid pci location in {chip:?}"
                )));
            }
        }

        for port in &self.ports {
            if self.auto_add_slot {
                if port.slot != 0 {
                    return Err(invalid(format!(
                        "auto_add_slot is set and slot is non-zero for \
                        port {port}"
                    )));
                }
            } else if port.slot <= 0 || !slots.contains(&port.slot) {
                return Err(invalid(format!("invalid slot in {port}")));
            }
            if port.port <= 0 {
                return Err(invalid(format!("invalid port in {port}")));
            }
            if !(0..=4).contains(&port.channel) {
                return Err(invalid(format!("invalid channel in {port}")));
            }
            if !units.contains(&port.unit) {
                return Err(invalid(format!("invalid unit in {port}")));
            }
            if port.speed_bps == 0 || port.speed_bps % BITS_PER_GIGABIT != 0 {
                return Err(invalid(format!("invalid speed in {port}")));
            }
            if port.physical_port < 0 || port.diag_port < 0 {
                return Err(invalid(format!(
                    "invalid physical or diag port in {port}"
                )));
            }
            if !modules.contains(&port.module) {
                return Err(invalid(format!("invalid module in {port}")));
            }
            if port.serdes_core < 0 || !(0..=3).contains(&port.serdes_lane) {
                return Err(invalid(format!("invalid serdes lane in {port}")));
            }
            if port.port_type != PortType::Mgmt
                && !(1..=4).contains(&port.num_serdes_lanes)
            {
                return Err(invalid(format!(
                    "invalid num_serdes_lanes in {port}"
                )));
            }
            if port.tx_lane_map < 0
                || port.rx_lane_map < 0
                || port.tx_polarity_flip < 0
                || port.rx_polarity_flip < 0
            {
                return Err(invalid(format!("invalid lane map in {port}")));
            }
            if self.auto_add_logical_ports || self.is_ge_on_trident_plus(port)
            {
                if port.logical_port != 0 {
                    return Err(invalid(format!(
                        "logical port is assigned automatically and must \
                        be zero in {port}"
                    )));
                }
            } else if port.logical_port <= 0 {
                return Err(invalid(format!(
                    "logical port must be positive in {port}"
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> ChassisError {
    ChassisError::InvalidParam(msg)
}

/// A capability map file holds one map per supported hardware variant.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CapabilityMapFile {
    #[serde(default, rename = "map")]
    pub maps: Vec<HardwareCapabilityMap>,
}

impl CapabilityMapFile {
    pub fn from_toml(txt: &str) -> ChassisResult<Self> {
        Ok(toml::from_str(txt)?)
    }

    /// Pick the map with the given id, or the first map if no id is given,
    /// and validate it.
    pub fn select(&self, id: &str) -> ChassisResult<HardwareCapabilityMap> {
        let map = self
            .maps
            .iter()
            .find(|m| id.is_empty() || m.id == id)
            .ok_or_else(|| {
                ChassisError::InvalidParam(format!(
                    "no capability map with id \"{id}\""
                ))
            })?;
        map.validate()?;
        Ok(map.clone())
    }
}

/// Read a capability map file and select one map out of it.
pub fn load(
    path: impl AsRef<Path>,
    id: &str,
) -> ChassisResult<HardwareCapabilityMap> {
    let txt = std::fs::read_to_string(path)?;
    CapabilityMapFile::from_toml(&txt)?.select(id)
}
