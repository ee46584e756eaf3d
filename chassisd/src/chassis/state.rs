// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The cross-reference tables owned by the chassis manager.
//!
//! Hardware port records live in exactly one owning map, keyed by the
//! (slot, port, channel) of the singleton port they back.  Every other table
//! refers to a port by key, never by holding a copy of its record.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use slog::debug;
use slog::Logger;

use aal::HardwareDriver;
use aal::LinkEvent;
use aal::PortOptions;
use aal::TransceiverEvent;
use aal::WriterId;
use common::channel::EventChannel;
use common::ports::AdminState;
use common::ports::HealthState;
use common::ports::HwState;
use common::ports::LoopbackState;
use common::ports::PortKey;
use common::ports::PortState;
use common::ports::SdkPort;
use common::ports::SdkTrunk;
use common::ports::TrunkState;

use crate::chassis_config::ChassisConfig;
use crate::hw_map::Chip;
use crate::hw_map::HardwareCapabilityMap;
use crate::hw_map::HardwarePort;
use crate::hw_map::TargetMap;
use crate::topology;
use crate::types::ChassisError;
use crate::types::ChassisResult;
use crate::types::ErrorList;

/// An event writer handed to the driver, along with the channel it feeds.
pub(crate) struct EventWriter<T> {
    pub id: WriterId,
    pub channel: EventChannel<T>,
}

type PerNode<K, V> = BTreeMap<u64, BTreeMap<K, V>>;

#[derive(Default)]
pub(crate) struct ChassisState {
    /// Set by the first successful push.
    pub initialized: bool,
    /// Set once by shutdown.  Nothing is mutated after this.
    pub shutdown: bool,

    pub base_map: Option<HardwareCapabilityMap>,
    pub applied_map: Option<TargetMap>,

    pub unit_to_chip: BTreeMap<i32, Chip>,
    pub port_key_to_hw_port: BTreeMap<PortKey, HardwarePort>,
    pub flex_groups: BTreeMap<PortKey, Vec<PortKey>>,
    pub non_flex_groups: BTreeMap<PortKey, Vec<PortKey>>,
    pub xcvr_state: BTreeMap<PortKey, HwState>,

    pub node_to_unit: BTreeMap<u64, i32>,
    pub unit_to_node: BTreeMap<i32, u64>,
    pub node_to_port_ids: BTreeMap<u64, BTreeSet<u32>>,
    pub node_to_trunk_ids: BTreeMap<u64, BTreeSet<u32>>,
    pub port_to_key: PerNode<u32, PortKey>,
    pub port_to_sdk_port: PerNode<u32, SdkPort>,
    pub sdk_port_to_port: PerNode<SdkPort, u32>,
    pub trunk_to_sdk_trunk: PerNode<u32, SdkTrunk>,
    pub sdk_trunk_to_trunk: PerNode<SdkTrunk, u32>,
    pub trunk_state: PerNode<u32, TrunkState>,
    pub trunk_members: PerNode<u32, BTreeSet<u32>>,
    pub parent_trunk: PerNode<u32, u32>,

    pub port_state: PerNode<u32, PortState>,
    pub admin_state: PerNode<u32, AdminState>,
    pub health_state: PerNode<u32, HealthState>,
    pub loopback_state: PerNode<u32, LoopbackState>,

    pub link_writer: Option<EventWriter<LinkEvent>>,
    pub xcvr_writer: Option<EventWriter<TransceiverEvent>>,
}

fn lookup<'a, K: Ord, V>(
    map: &'a PerNode<K, V>,
    node_id: u64,
    key: &K,
) -> Option<&'a V> {
    map.get(&node_id).and_then(|m| m.get(key))
}

impl ChassisState {
    /// Record the maps selected by a cold push and the starting state of
    /// every transceiver group.  Internal groups have no transceiver to
    /// report presence, so they start out present.
    pub fn install_maps(
        &mut self,
        base: HardwareCapabilityMap,
        target: TargetMap,
    ) {
        self.xcvr_state = target
            .ports
            .iter()
            .map(|hp| {
                let state = if hp.internal {
                    HwState::Present
                } else {
                    HwState::Unknown
                };
                (hp.group_key(), state)
            })
            .collect();
        self.base_map = Some(base);
        self.applied_map = Some(target);
    }

    /// Drop every table, leaving the flags and event writers alone.
    pub fn clear_tables(&mut self) {
        let initialized = self.initialized;
        let shutdown = self.shutdown;
        let link_writer = self.link_writer.take();
        let xcvr_writer = self.xcvr_writer.take();
        *self = ChassisState {
            initialized,
            shutdown,
            link_writer,
            xcvr_writer,
            ..Default::default()
        };
    }

    pub fn port_key(&self, node_id: u64, port_id: u32) -> Option<PortKey> {
        lookup(&self.port_to_key, node_id, &port_id).copied()
    }

    pub fn sdk_port(&self, node_id: u64, port_id: u32) -> Option<SdkPort> {
        lookup(&self.port_to_sdk_port, node_id, &port_id).copied()
    }

    pub fn hw_port(&self, key: &PortKey) -> Option<&HardwarePort> {
        self.port_key_to_hw_port.get(key)
    }

    /// The hardware ports making up a port group, flex or not.
    pub fn group_ports(&self, group: &PortKey) -> Option<Vec<&HardwarePort>> {
        self.flex_groups
            .get(group)
            .or_else(|| self.non_flex_groups.get(group))
            .map(|keys| keys.iter().filter_map(|k| self.hw_port(k)).collect())
    }

    pub fn is_internal_group(&self, group: &PortKey) -> bool {
        self.group_ports(group)
            .map(|ports| ports.iter().any(|p| p.internal))
            .unwrap_or(false)
    }

    /// Rebuild the tables from `config`.  Operational and health state
    /// survive for ports that are still configured.  Admin and loopback
    /// state are taken from the config where it gives one, and the port is
    /// programmed whenever that changes its state.  Driver failures are
    /// collected and returned once the tables are complete.
    pub fn sync(
        &mut self,
        config: &ChassisConfig,
        driver: &dyn HardwareDriver,
        log: &Logger,
    ) -> ChassisResult<()> {
        let (base, applied) = match (&self.base_map, &self.applied_map) {
            (Some(b), Some(a)) => (b, a),
            _ => {
                return Err(ChassisError::Internal(
                    "sync called before the hardware maps were installed"
                        .to_string(),
                ))
            }
        };

        let unit_to_chip: BTreeMap<i32, Chip> =
            applied.chips.iter().map(|c| (c.unit, c.clone())).collect();

        let mut port_key_to_hw_port = BTreeMap::new();
        let mut flex_groups: BTreeMap<PortKey, Vec<PortKey>> = BTreeMap::new();
        let mut non_flex_groups: BTreeMap<PortKey, Vec<PortKey>> =
            BTreeMap::new();
        let mut node_to_unit = BTreeMap::new();
        let mut unit_to_node = BTreeMap::new();
        let mut node_to_port_ids: BTreeMap<u64, BTreeSet<u32>> =
            BTreeMap::new();
        let mut node_to_trunk_ids: BTreeMap<u64, BTreeSet<u32>> =
            BTreeMap::new();
        let mut port_to_key: PerNode<u32, PortKey> = BTreeMap::new();
        let mut port_to_sdk_port: PerNode<u32, SdkPort> = BTreeMap::new();
        let mut sdk_port_to_port: PerNode<SdkPort, u32> = BTreeMap::new();
        let mut trunk_to_sdk_trunk: PerNode<u32, SdkTrunk> = BTreeMap::new();
        let mut sdk_trunk_to_trunk: PerNode<SdkTrunk, u32> = BTreeMap::new();
        let mut trunk_state: PerNode<u32, TrunkState> = BTreeMap::new();
        let mut trunk_members: PerNode<u32, BTreeSet<u32>> = BTreeMap::new();
        let mut parent_trunk: PerNode<u32, u32> = BTreeMap::new();
        let mut port_state: PerNode<u32, PortState> = BTreeMap::new();
        let mut admin_state: PerNode<u32, AdminState> = BTreeMap::new();
        let mut health_state: PerNode<u32, HealthState> = BTreeMap::new();
        let mut loopback_state: PerNode<u32, LoopbackState> = BTreeMap::new();

        for node in &config.nodes {
            node_to_port_ids.insert(node.id, BTreeSet::new());
            node_to_trunk_ids.insert(node.id, BTreeSet::new());
            port_to_key.insert(node.id, BTreeMap::new());
            port_to_sdk_port.insert(node.id, BTreeMap::new());
            sdk_port_to_port.insert(node.id, BTreeMap::new());
            trunk_to_sdk_trunk.insert(node.id, BTreeMap::new());
            sdk_trunk_to_trunk.insert(node.id, BTreeMap::new());
            trunk_state.insert(node.id, BTreeMap::new());
            trunk_members.insert(node.id, BTreeMap::new());
            parent_trunk.insert(node.id, BTreeMap::new());
            port_state.insert(node.id, BTreeMap::new());
            admin_state.insert(node.id, BTreeMap::new());
            health_state.insert(node.id, BTreeMap::new());
            loopback_state.insert(node.id, BTreeMap::new());
        }

        let mut errors = ErrorList::new();
        for sp in &config.singleton_ports {
            let hp = topology::resolve_singleton(base, applied, sp)?;
            let key = sp.key();
            let group = sp.group_key();
            if port_key_to_hw_port.contains_key(&key) {
                return Err(ChassisError::Internal(format!(
                    "singleton port {sp} is already known, was the config \
                    verified?"
                )));
            }
            if !self.xcvr_state.contains_key(&group) {
                return Err(ChassisError::Internal(format!(
                    "the config contains an unknown port group {group}"
                )));
            }

            let (node_id, port_id) = (sp.node, sp.id);
            let sdk_port = hp.sdk_port();
            node_to_unit.insert(node_id, hp.unit);
            unit_to_node.insert(hp.unit, node_id);
            node_to_port_ids.entry(node_id).or_default().insert(port_id);
            port_to_key.entry(node_id).or_default().insert(port_id, key);
            port_to_sdk_port
                .entry(node_id)
                .or_default()
                .insert(port_id, sdk_port);
            sdk_port_to_port
                .entry(node_id)
                .or_default()
                .insert(sdk_port, port_id);
            if hp.flex_port {
                flex_groups.entry(group).or_default().push(key);
            } else {
                non_flex_groups.entry(group).or_default().push(key);
            }
            port_key_to_hw_port.insert(key, hp);

            let old_oper = lookup(&self.port_state, node_id, &port_id);
            port_state
                .entry(node_id)
                .or_default()
                .insert(port_id, old_oper.copied().unwrap_or_default());
            let old_health = lookup(&self.health_state, node_id, &port_id);
            health_state
                .entry(node_id)
                .or_default()
                .insert(port_id, old_health.copied().unwrap_or_default());

            let old_admin = lookup(&self.admin_state, node_id, &port_id);
            let admin = match (sp.admin_state, old_admin) {
                (AdminState::Unknown, Some(old)) => *old,
                (new, old) => {
                    if new != AdminState::Unknown && Some(&new) != old {
                        debug!(log, "setting admin state";
                            "node_id" => node_id, "port_id" => port_id,
                            "state" => %new);
                        let opts =
                            PortOptions::enable(new == AdminState::Enabled);
                        errors.check(
                            driver
                                .set_port_options(
                                    sdk_port.unit,
                                    sdk_port.logical_port,
                                    &opts,
                                )
                                .map_err(ChassisError::from),
                        );
                    }
                    new
                }
            };
            admin_state.entry(node_id).or_default().insert(port_id, admin);

            let old_loopback = lookup(&self.loopback_state, node_id, &port_id);
            let loopback = match (sp.loopback_state, old_loopback) {
                (LoopbackState::Unknown, Some(old)) => *old,
                (new, old) => {
                    if new != LoopbackState::Unknown && Some(&new) != old {
                        debug!(log, "setting loopback state";
                            "node_id" => node_id, "port_id" => port_id,
                            "state" => %new);
                        let opts = PortOptions {
                            loopback_mode: Some(new),
                            ..Default::default()
                        };
                        errors.check(
                            driver
                                .set_port_options(
                                    sdk_port.unit,
                                    sdk_port.logical_port,
                                    &opts,
                                )
                                .map_err(ChassisError::from),
                        );
                    }
                    new
                }
            };
            loopback_state
                .entry(node_id)
                .or_default()
                .insert(port_id, loopback);
        }

        // Trunks are not created in hardware yet, so each one gets a
        // placeholder SDK trunk on its node's unit.
        for tp in &config.trunk_ports {
            let unit = node_to_unit.get(&tp.node).copied().ok_or_else(|| {
                ChassisError::Internal(format!(
                    "no unit for node {} of trunk port {tp}",
                    tp.node
                ))
            })?;
            let sdk_trunk = SdkTrunk::new(unit, SdkTrunk::UNASSIGNED);
            node_to_trunk_ids.entry(tp.node).or_default().insert(tp.id);
            trunk_to_sdk_trunk
                .entry(tp.node)
                .or_default()
                .insert(tp.id, sdk_trunk);
            sdk_trunk_to_trunk
                .entry(tp.node)
                .or_default()
                .insert(sdk_trunk, tp.id);
            trunk_state
                .entry(tp.node)
                .or_default()
                .insert(tp.id, TrunkState::Unknown);
            let members: BTreeSet<u32> = tp.members.iter().copied().collect();
            for m in &members {
                parent_trunk.entry(tp.node).or_default().insert(*m, tp.id);
            }
            trunk_members
                .entry(tp.node)
                .or_default()
                .insert(tp.id, members);
        }

        self.unit_to_chip = unit_to_chip;
        self.port_key_to_hw_port = port_key_to_hw_port;
        self.flex_groups = flex_groups;
        self.non_flex_groups = non_flex_groups;
        self.node_to_unit = node_to_unit;
        self.unit_to_node = unit_to_node;
        self.node_to_port_ids = node_to_port_ids;
        self.node_to_trunk_ids = node_to_trunk_ids;
        self.port_to_key = port_to_key;
        self.port_to_sdk_port = port_to_sdk_port;
        self.sdk_port_to_port = sdk_port_to_port;
        self.trunk_to_sdk_trunk = trunk_to_sdk_trunk;
        self.sdk_trunk_to_trunk = sdk_trunk_to_trunk;
        self.trunk_state = trunk_state;
        self.trunk_members = trunk_members;
        self.parent_trunk = parent_trunk;
        self.port_state = port_state;
        self.admin_state = admin_state;
        self.health_state = health_state;
        self.loopback_state = loopback_state;

        errors.into_result()
    }

    /// Check the relationships that must hold between the tables.
    pub fn check_invariants(&self) -> ChassisResult<()> {
        for (node_id, ports) in &self.port_state {
            for port_id in ports.keys() {
                let present = lookup(&self.admin_state, *node_id, port_id)
                    .is_some()
                    && lookup(&self.health_state, *node_id, port_id).is_some()
                    && lookup(&self.loopback_state, *node_id, port_id)
                        .is_some()
                    && self.sdk_port(*node_id, *port_id).is_some()
                    && self
                        .port_key(*node_id, *port_id)
                        .and_then(|k| self.hw_port(&k))
                        .is_some();
                if !present {
                    return Err(ChassisError::Internal(format!(
                        "port {port_id} on node {node_id} is missing from \
                        one or more port tables"
                    )));
                }
            }
        }

        if self.node_to_unit.len() != self.unit_to_node.len()
            || self
                .node_to_unit
                .iter()
                .any(|(n, u)| self.unit_to_node.get(u) != Some(n))
        {
            return Err(ChassisError::Internal(
                "node to unit and unit to node maps disagree".to_string(),
            ));
        }

        for group in self.flex_groups.keys() {
            if self.non_flex_groups.contains_key(group) {
                return Err(ChassisError::Internal(format!(
                    "port group {group} is both flex and non-flex"
                )));
            }
        }
        for key in self.port_key_to_hw_port.keys() {
            let group = key.to_group();
            if !self.flex_groups.contains_key(&group)
                && !self.non_flex_groups.contains_key(&group)
            {
                return Err(ChassisError::Internal(format!(
                    "port {key} is not in any port group"
                )));
            }
        }

        Ok(())
    }
}
