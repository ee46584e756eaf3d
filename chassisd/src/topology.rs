// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Turns a pushed [`ChassisConfig`] plus the platform's capability map into
//! the target map: the chips and ports that must be brought up to realize
//! the config.
//!
//! Building is a pure function of its inputs.  Checks run in a fixed order
//! and the first failure is returned, so the same inputs always produce the
//! same map or the same error.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use aal::ChipType;
use common::ports::PortKey;
use common::ports::SPEED_100G;
use common::ports::SPEED_10G;
use common::ports::SPEED_1G;
use common::ports::SPEED_20G;
use common::ports::SPEED_25G;
use common::ports::SPEED_40G;
use common::ports::SPEED_50G;
use common::CPU_LOGICAL_PORT;
use common::CPU_PORT_ID;

use crate::chassis_config::ChassisConfig;
use crate::chassis_config::Platform;
use crate::chassis_config::SingletonPort;
use crate::chassis_config::TrunkType;
use crate::hw_map::HardwareCapabilityMap;
use crate::hw_map::HardwarePort;
use crate::hw_map::PortType;
use crate::hw_map::TargetMap;
use crate::types::ChassisError;
use crate::types::ChassisResult;

/// The number of logical ports in the X pipeline of a TridentPlus.
const TRIDENT_PLUS_X_PIPELINE_PORTS: i32 = 32;

/// Channels of a flex group that are brought up at the chip's base speed.
const FLEX_CHANNELS: [i32; 4] = [1, 2, 3, 4];

/// The result of a successful build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topology {
    /// The capability map the target was selected from, with the slot filled
    /// in if the map asked for that.
    pub base: HardwareCapabilityMap,
    pub target: TargetMap,
    pub node_to_unit: BTreeMap<u64, i32>,
}

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(ChassisError::InvalidParam(format!($($arg)+)));
        }
    };
}

/// The most data ports, GE and management ports excluded, a chip can carry.
pub fn max_ports_per_chip(chip_type: ChipType) -> usize {
    match chip_type {
        ChipType::TridentPlus => 64,
        ChipType::Trident2 => 104,
        ChipType::Tomahawk => 128,
    }
}

/// The speed each channel of a flex group is first brought up at.
pub fn flex_base_speed(chip_type: ChipType) -> u64 {
    match chip_type {
        ChipType::Tomahawk => SPEED_25G,
        ChipType::TridentPlus | ChipType::Trident2 => SPEED_10G,
    }
}

/// The channels a port group may populate when running at `speed_bps`.
pub fn allowed_channels(speed_bps: u64) -> Option<&'static [i32]> {
    match speed_bps {
        SPEED_1G | SPEED_40G | SPEED_100G => Some(&[0]),
        SPEED_20G | SPEED_50G => Some(&[1, 2]),
        SPEED_10G | SPEED_25G => Some(&[1, 2, 3, 4]),
        _ => None,
    }
}

fn supported_chip_type(platform: Platform) -> ChassisResult<ChipType> {
    match platform {
        Platform::GenericTridentPlus => Ok(ChipType::TridentPlus),
        Platform::GenericTrident2 => Ok(ChipType::Trident2),
        Platform::GenericTomahawk => Ok(ChipType::Tomahawk),
        Platform::Unknown => Err(ChassisError::Internal(format!(
            "unsupported platform: {platform}"
        ))),
    }
}

/// Does this capability-map port realize the singleton port?
pub fn port_matches(sp: &SingletonPort, hp: &HardwarePort) -> bool {
    hp.is_data_port()
        && sp.slot == hp.slot
        && sp.port == hp.port
        && sp.channel == hp.channel
        && sp.speed_bps == hp.speed_bps
}

// With auto_add_slot set, every chip and port in the map lives in the one
// slot used by the config.
fn populate_slot(
    config: &ChassisConfig,
    base: &mut HardwareCapabilityMap,
) -> ChassisResult<()> {
    let slots: BTreeSet<i32> = config
        .nodes
        .iter()
        .map(|n| n.slot)
        .chain(config.singleton_ports.iter().map(|p| p.slot))
        .collect();
    ensure!(
        slots.len() == 1,
        "auto_add_slot requires exactly one slot in the config, found {:?}",
        slots
    );
    let slot = *slots.iter().next().unwrap_or(&0);
    for chip in base.chips.iter_mut() {
        chip.slot = slot;
    }
    for port in base.ports.iter_mut() {
        port.slot = slot;
    }
    Ok(())
}

/// Build the target map for `config` out of the capability map `base`.
pub fn build(
    config: &ChassisConfig,
    base: &HardwareCapabilityMap,
) -> ChassisResult<Topology> {
    let mut base = base.clone();
    if base.auto_add_slot {
        populate_slot(config, &mut base)?;
    }

    let chip_type = supported_chip_type(config.chassis.platform)?;

    let mut target = TargetMap {
        id: base.id.clone(),
        auto_add_logical_ports: base.auto_add_logical_ports,
        auto_add_slot: base.auto_add_slot,
        ..Default::default()
    };

    // Nodes: positive slot and id, no duplicate ids.  The unit is filled in
    // as ports are resolved.
    let mut node_to_unit: BTreeMap<u64, Option<i32>> = BTreeMap::new();
    for node in &config.nodes {
        ensure!(node.slot > 0, "no positive slot for node {}", node.id);
        ensure!(node.id > 0, "no positive id for node in slot {}", node.slot);
        ensure!(
            node_to_unit.insert(node.id, None).is_none(),
            "node id {} is used by more than one node",
            node.id
        );
    }

    // Singleton ports.  Non-flex ports are added to the target as they are
    // found.  Flex ports only record their group here, and the group's
    // channels are added below.
    let mut node_to_port_ids: BTreeMap<u64, BTreeSet<u32>> = BTreeMap::new();
    let mut port_keys = BTreeSet::new();
    let mut flex_groups = BTreeSet::new();
    let mut non_flex_groups = BTreeSet::new();
    let mut group_channels: BTreeMap<PortKey, BTreeSet<i32>> = BTreeMap::new();
    let mut group_speeds: BTreeMap<PortKey, BTreeSet<u64>> = BTreeMap::new();
    let mut group_internal: BTreeMap<PortKey, BTreeSet<bool>> =
        BTreeMap::new();
    for sp in &config.singleton_ports {
        ensure!(sp.id > 0, "no positive id in singleton port {sp}");
        ensure!(
            sp.id != CPU_PORT_ID,
            "singleton port {sp} has the reserved CPU port id"
        );
        ensure!(sp.slot > 0, "no valid slot in singleton port {sp}");
        ensure!(sp.port > 0, "no valid port in singleton port {sp}");
        ensure!(sp.speed_bps > 0, "no valid speed in singleton port {sp}");
        ensure!(
            port_keys.insert(sp.key()),
            "the (slot, port, channel) of singleton port {sp} is used by \
            another singleton port"
        );
        ensure!(sp.node > 0, "no valid node id in singleton port {sp}");
        let unit = node_to_unit.get_mut(&sp.node).ok_or_else(|| {
            ChassisError::InvalidParam(format!(
                "node id {} of singleton port {sp} is not a configured node",
                sp.node
            ))
        })?;
        ensure!(
            node_to_port_ids.entry(sp.node).or_default().insert(sp.id),
            "singleton port {sp} reuses a port id on node {}",
            sp.node
        );

        let group = sp.group_key();
        let hp = base
            .ports
            .iter()
            .find(|hp| port_matches(sp, hp))
            .ok_or_else(|| {
                ChassisError::InvalidParam(format!(
                    "no hardware port matches singleton port {sp}"
                ))
            })?;
        if hp.flex_port {
            ensure!(
                !non_flex_groups.contains(&group),
                "port group {group} mixes flex and non-flex ports"
            );
            flex_groups.insert(group);
        } else {
            ensure!(
                !flex_groups.contains(&group),
                "port group {group} mixes flex and non-flex ports"
            );
            non_flex_groups.insert(group);
            target.ports.push(hp.clone());
        }
        match *unit {
            None => *unit = Some(hp.unit),
            Some(u) => ensure!(
                u == hp.unit,
                "singleton port {sp} is on unit {} but node {} is already \
                on unit {u}",
                hp.unit,
                sp.node
            ),
        }
        group_internal.entry(group).or_default().insert(hp.internal);
        group_channels.entry(group).or_default().insert(sp.channel);
        group_speeds.entry(group).or_default().insert(sp.speed_bps);
    }

    let mut resolved = BTreeMap::new();
    for (node_id, unit) in node_to_unit {
        let unit = unit.ok_or_else(|| {
            ChassisError::InvalidParam(format!(
                "no port found for node {node_id}"
            ))
        })?;
        resolved.insert(node_id, unit);
    }
    let node_to_unit = resolved;

    // Trunk ports.
    let mut node_to_trunk_ids: BTreeMap<u64, BTreeSet<u32>> = BTreeMap::new();
    for tp in &config.trunk_ports {
        ensure!(tp.id > 0, "no positive id in trunk port {tp}");
        ensure!(
            tp.trunk_type != TrunkType::Unknown,
            "no type in trunk port {tp}"
        );
        ensure!(
            tp.id != CPU_PORT_ID,
            "trunk port {tp} has the reserved CPU port id"
        );
        ensure!(tp.node > 0, "no valid node id in trunk port {tp}");
        ensure!(
            node_to_unit.contains_key(&tp.node),
            "node id {} of trunk port {tp} is not a configured node",
            tp.node
        );
        ensure!(
            node_to_trunk_ids.entry(tp.node).or_default().insert(tp.id),
            "trunk port {tp} reuses a trunk id on node {}",
            tp.node
        );
        let port_ids = node_to_port_ids.entry(tp.node).or_default();
        ensure!(
            !port_ids.contains(&tp.id),
            "trunk port {tp} uses the id of a singleton port on node {}",
            tp.node
        );
        for member in &tp.members {
            ensure!(
                port_ids.contains(member),
                "unknown member singleton port {member} for trunk port {tp}"
            );
        }
    }

    // Chips hosting the configured nodes.
    let units: BTreeSet<i32> = node_to_unit.values().copied().collect();
    for unit in &units {
        let chip = base.chip(*unit).ok_or_else(|| {
            ChassisError::InvalidParam(format!(
                "no chip for unit {unit} in the capability map"
            ))
        })?;
        ensure!(
            chip.chip_type == chip_type,
            "chip type {} is not supported on platform {}",
            chip.chip_type,
            config.chassis.platform
        );
        target.chips.push(chip.clone());
    }

    for (group, internal) in &group_internal {
        ensure!(
            internal.len() == 1,
            "port group {group} has both internal and external ports"
        );
    }

    for (group, speeds) in &group_speeds {
        ensure!(
            speeds.len() == 1,
            "port group {group} has {} different speeds",
            speeds.len()
        );
        let speed = *speeds.iter().next().unwrap_or(&0);
        let allowed = allowed_channels(speed).ok_or_else(|| {
            ChassisError::InvalidParam(format!(
                "unsupported speed {speed} for port group {group}"
            ))
        })?;
        if let Some(channels) = group_channels.get(group) {
            ensure!(
                channels.iter().all(|c| allowed.contains(c)),
                "port group {group} has invalid channels {channels:?} for \
                speed {speed}"
            );
        }
    }

    // Flex groups come up with every channel at the chip's base speed.
    for group in &flex_groups {
        let units: BTreeSet<i32> = base
            .ports
            .iter()
            .filter(|hp| hp.group_key() == *group)
            .map(|hp| hp.unit)
            .collect();
        ensure!(
            units.len() == 1,
            "ports of flex group {group} are spread across units {units:?}"
        );
        let unit = *units.iter().next().unwrap_or(&0);
        let group_chip = base.chip(unit).map(|c| c.chip_type).ok_or_else(|| {
            ChassisError::Internal(format!("no chip for unit {unit}"))
        })?;
        let speed_bps = flex_base_speed(group_chip);
        for channel in FLEX_CHANNELS {
            let hp = base
                .ports
                .iter()
                .find(|hp| {
                    hp.is_data_port()
                        && hp.slot == group.slot
                        && hp.port == group.port
                        && hp.channel == channel
                        && hp.speed_bps == speed_bps
                })
                .ok_or_else(|| {
                    ChassisError::InvalidParam(format!(
                        "no hardware port for channel {channel} of flex \
                        group {group} at {speed_bps} bps"
                    ))
                })?;
            target.ports.push(hp.clone());
        }
    }

    // Data ports per unit, used both for the per-chip ceiling and for
    // assigning logical ports.
    let mut unit_to_keys: BTreeMap<i32, BTreeSet<PortKey>> = BTreeMap::new();
    for hp in &target.ports {
        if hp.port_type != PortType::Ge && hp.port_type != PortType::Mgmt {
            unit_to_keys.entry(hp.unit).or_default().insert(hp.key());
        }
    }
    for chip in &target.chips {
        let count = unit_to_keys.get(&chip.unit).map_or(0, |k| k.len());
        let max = max_ports_per_chip(chip.chip_type);
        ensure!(
            count <= max,
            "a {} chip supports at most {max} ports, but unit {} has {count}",
            chip.chip_type,
            chip.unit
        );
    }

    if target.auto_add_logical_ports {
        let probe = target.clone();
        for hp in target.ports.iter_mut() {
            if probe.is_ge_on_trident_plus(hp) {
                continue;
            }
            let idx = unit_to_keys
                .get(&hp.unit)
                .and_then(|keys| keys.iter().position(|k| *k == hp.key()))
                .ok_or_else(|| {
                    ChassisError::Internal(format!(
                        "{} is not a data port on unit {}",
                        hp.key(),
                        hp.unit
                    ))
                })?;
            hp.logical_port = idx as i32 + 1;
        }
    }

    // GE ports on a TridentPlus take the largest logical port in the X
    // pipeline that no other port is using.
    for i in 0..target.ports.len() {
        if !target.is_ge_on_trident_plus(&target.ports[i]) {
            continue;
        }
        let unit = target.ports[i].unit;
        let used: BTreeSet<i32> = target
            .ports
            .iter()
            .filter(|p| p.port_type != PortType::Ge && p.unit == unit)
            .map(|p| p.logical_port)
            .collect();
        let free = (1..=TRIDENT_PLUS_X_PIPELINE_PORTS)
            .rev()
            .find(|lp| !used.contains(lp))
            .ok_or_else(|| {
                ChassisError::InvalidParam(format!(
                    "no free logical port on unit {unit} for GE port {}",
                    target.ports[i]
                ))
            })?;
        target.ports[i].logical_port = free;
    }

    // No two ports on a unit may share a physical, diag or logical port, and
    // the CPU logical port is never handed out.
    let mut phys: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    let mut diag: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    let mut logical: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    for chip in &target.chips {
        logical.entry(chip.unit).or_default().insert(CPU_LOGICAL_PORT);
    }
    for hp in &target.ports {
        ensure!(
            phys.entry(hp.unit).or_default().insert(hp.physical_port),
            "duplicate physical port {} on unit {}",
            hp.physical_port,
            hp.unit
        );
        ensure!(
            diag.entry(hp.unit).or_default().insert(hp.diag_port),
            "duplicate diag port {} on unit {}",
            hp.diag_port,
            hp.unit
        );
        ensure!(
            logical.entry(hp.unit).or_default().insert(hp.logical_port),
            "duplicate logical port for {hp}"
        );
    }

    Ok(Topology {
        base,
        target,
        node_to_unit,
    })
}

/// Find the hardware port backing a configured singleton port.  The entry
/// comes from the capability map at the configured speed, with the logical
/// port taken from the applied target map when software assigns it.
pub fn resolve_singleton(
    base: &HardwareCapabilityMap,
    applied: &TargetMap,
    sp: &SingletonPort,
) -> ChassisResult<HardwarePort> {
    let mut hp = base
        .ports
        .iter()
        .find(|hp| port_matches(sp, hp))
        .cloned()
        .ok_or_else(|| {
            ChassisError::Internal(format!(
                "no hardware port for singleton port {sp}"
            ))
        })?;
    if applied.auto_add_logical_ports || applied.is_ge_on_trident_plus(&hp) {
        let q = applied
            .ports
            .iter()
            .find(|q| {
                q.unit == hp.unit
                    && q.physical_port == hp.physical_port
                    && q.diag_port == hp.diag_port
            })
            .ok_or_else(|| {
                ChassisError::Internal(format!(
                    "no applied port matches the unit, physical and diag \
                    ports of {hp}"
                ))
            })?;
        hp.logical_port = q.logical_port;
    }
    Ok(hp)
}
