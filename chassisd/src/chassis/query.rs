// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Point queries and per-port updates.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use slog::debug;
use slog::error;
use slog::info;

use aal::PortCounters;
use aal::PortOptions;
use common::ports::AdminState;
use common::ports::HealthState;
use common::ports::LoopbackState;
use common::ports::PortKey;
use common::ports::PortState;
use common::ports::SdkPort;
use common::ports::SdkTrunk;
use common::ports::TrunkState;

use super::state::ChassisState;
use super::ChassisManager;
use crate::hw_map::Chip;
use crate::hw_map::HardwarePort;
use crate::notify::ChassisEvent;
use crate::types::ChassisError;
use crate::types::ChassisResult;

fn not_initialized() -> ChassisError {
    ChassisError::NotInitialized("the chassis has not been configured".into())
}

impl ChassisState {
    fn initialized(&self) -> ChassisResult<&Self> {
        if self.initialized {
            Ok(self)
        } else {
            Err(not_initialized())
        }
    }

    fn node_table<'a, K, V>(
        table: &'a BTreeMap<u64, BTreeMap<K, V>>,
        node_id: u64,
    ) -> ChassisResult<&'a BTreeMap<K, V>> {
        table.get(&node_id).ok_or_else(|| {
            ChassisError::NotFound(format!("unknown node {node_id}"))
        })
    }

    fn port_entry<'a, V>(
        table: &'a BTreeMap<u64, BTreeMap<u32, V>>,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<&'a V> {
        Self::node_table(table, node_id)?.get(&port_id).ok_or_else(|| {
            ChassisError::NotFound(format!(
                "unknown port {port_id} on node {node_id}"
            ))
        })
    }

    fn trunk_entry<'a, V>(
        table: &'a BTreeMap<u64, BTreeMap<u32, V>>,
        node_id: u64,
        trunk_id: u32,
    ) -> ChassisResult<&'a V> {
        Self::node_table(table, node_id)?.get(&trunk_id).ok_or_else(|| {
            ChassisError::NotFound(format!(
                "unknown trunk {trunk_id} on node {node_id}"
            ))
        })
    }
}

impl ChassisManager {
    pub fn get_chip(&self, unit: i32) -> ChassisResult<Chip> {
        let state = self.state.read();
        state.initialized()?.unit_to_chip.get(&unit).cloned().ok_or_else(
            || ChassisError::NotFound(format!("unknown unit {unit}")),
        )
    }

    /// Look up the hardware port backing the singleton port at `key`.
    pub fn get_hardware_port_by_key(
        &self,
        key: &PortKey,
    ) -> ChassisResult<HardwarePort> {
        let state = self.state.read();
        state.initialized()?.hw_port(key).cloned().ok_or_else(|| {
            ChassisError::NotFound(format!("no singleton port at {key}"))
        })
    }

    pub fn get_hardware_port(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<HardwarePort> {
        let state = self.state.read();
        let state = state.initialized()?;
        let key =
            ChassisState::port_entry(&state.port_to_key, node_id, port_id)?;
        state.hw_port(key).cloned().ok_or_else(|| {
            ChassisError::Internal(format!(
                "port {port_id} on node {node_id} has no hardware port"
            ))
        })
    }

    pub fn get_node_id_to_unit_map(&self) -> ChassisResult<BTreeMap<u64, i32>> {
        let state = self.state.read();
        Ok(state.initialized()?.node_to_unit.clone())
    }

    pub fn get_unit_from_node_id(&self, node_id: u64) -> ChassisResult<i32> {
        let state = self.state.read();
        state
            .initialized()?
            .node_to_unit
            .get(&node_id)
            .copied()
            .ok_or_else(|| {
                ChassisError::NotFound(format!("unknown node {node_id}"))
            })
    }

    pub fn get_port_id_to_sdk_port_map(
        &self,
        node_id: u64,
    ) -> ChassisResult<BTreeMap<u32, SdkPort>> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::node_table(&state.port_to_sdk_port, node_id).cloned()
    }

    pub fn get_trunk_id_to_sdk_trunk_map(
        &self,
        node_id: u64,
    ) -> ChassisResult<BTreeMap<u32, SdkTrunk>> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::node_table(&state.trunk_to_sdk_trunk, node_id).cloned()
    }

    pub fn get_port_state(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<PortState> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::port_entry(&state.port_state, node_id, port_id).copied()
    }

    pub fn get_port_state_by_sdk_port(
        &self,
        sdk_port: SdkPort,
    ) -> ChassisResult<PortState> {
        let state = self.state.read();
        let state = state.initialized()?;
        let node_id =
            state.unit_to_node.get(&sdk_port.unit).copied().ok_or_else(
                || ChassisError::NotFound(format!("unknown unit {}", sdk_port.unit)),
            )?;
        let port_id = ChassisState::node_table(&state.sdk_port_to_port, node_id)?
            .get(&sdk_port)
            .copied()
            .ok_or_else(|| {
                ChassisError::NotFound(format!("unknown sdk port {sdk_port}"))
            })?;
        ChassisState::port_entry(&state.port_state, node_id, port_id).copied()
    }

    pub fn get_trunk_state(
        &self,
        node_id: u64,
        trunk_id: u32,
    ) -> ChassisResult<TrunkState> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::trunk_entry(&state.trunk_state, node_id, trunk_id)
            .copied()
    }

    pub fn get_trunk_members(
        &self,
        node_id: u64,
        trunk_id: u32,
    ) -> ChassisResult<BTreeSet<u32>> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::trunk_entry(&state.trunk_members, node_id, trunk_id)
            .cloned()
    }

    /// The trunk a port is a member of.  A port in no trunk is reported as
    /// `NotFound`, which callers probing membership should expect.
    pub fn get_parent_trunk_id(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<u32> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::node_table(&state.parent_trunk, node_id)?
            .get(&port_id)
            .copied()
            .ok_or_else(|| {
                ChassisError::NotFound(format!(
                    "port {port_id} on node {node_id} is not in a trunk"
                ))
            })
    }

    pub fn get_port_admin_state(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<AdminState> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::port_entry(&state.admin_state, node_id, port_id).copied()
    }

    pub fn get_port_health_state(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<HealthState> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::port_entry(&state.health_state, node_id, port_id)
            .copied()
    }

    pub fn get_port_loopback_state(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<LoopbackState> {
        let state = self.state.read();
        let state = state.initialized()?;
        ChassisState::port_entry(&state.loopback_state, node_id, port_id)
            .copied()
    }

    pub fn get_port_counters(
        &self,
        node_id: u64,
        port_id: u32,
    ) -> ChassisResult<PortCounters> {
        let sdk_port = {
            let state = self.state.read();
            let state = state.initialized()?;
            *ChassisState::port_entry(&state.port_to_sdk_port, node_id, port_id)?
        };
        self.driver
            .get_port_counters(sdk_port.unit, sdk_port.logical_port)
            .map_err(ChassisError::from)
    }

    /// Enable or disable a port.  The hardware is programmed first, and the
    /// cached state only changes if that succeeds.
    pub fn set_port_admin_state(
        &self,
        node_id: u64,
        port_id: u32,
        admin: AdminState,
    ) -> ChassisResult<()> {
        let mut state = self.state.write();
        state.initialized()?;
        let sdk_port =
            *ChassisState::port_entry(&state.port_to_sdk_port, node_id, port_id)?;

        let options = PortOptions::enable(admin == AdminState::Enabled);
        if let Err(e) = self.driver.set_port_options(
            sdk_port.unit,
            sdk_port.logical_port,
            &options,
        ) {
            error!(self.log, "failed to set admin state";
                "node_id" => node_id, "port_id" => port_id,
                "state" => %admin, "error" => %e);
            return Err(e.into());
        }

        state
            .admin_state
            .entry(node_id)
            .or_default()
            .insert(port_id, admin);
        info!(self.log, "admin state changed";
            "node_id" => node_id, "port_id" => port_id, "state" => %admin);
        self.publish(ChassisEvent::PortAdminStateChanged {
            node_id,
            port_id,
            state: admin,
        });
        Ok(())
    }

    pub fn set_port_health_state(
        &self,
        node_id: u64,
        port_id: u32,
        health: HealthState,
    ) -> ChassisResult<()> {
        let mut state = self.state.write();
        state.initialized()?;
        ChassisState::port_entry(&state.health_state, node_id, port_id)?;
        state
            .health_state
            .entry(node_id)
            .or_default()
            .insert(port_id, health);
        debug!(self.log, "health state changed";
            "node_id" => node_id, "port_id" => port_id, "state" => %health);
        Ok(())
    }

    /// Put a port into or out of loopback.  As with the admin state, the
    /// cache follows the hardware.  `Unknown` leaves the port alone.
    pub fn set_port_loopback_state(
        &self,
        node_id: u64,
        port_id: u32,
        loopback: LoopbackState,
    ) -> ChassisResult<()> {
        if loopback == LoopbackState::Unknown {
            return Ok(());
        }
        let mut state = self.state.write();
        state.initialized()?;
        let sdk_port =
            *ChassisState::port_entry(&state.port_to_sdk_port, node_id, port_id)?;

        let options = PortOptions {
            loopback_mode: Some(loopback),
            ..Default::default()
        };
        if let Err(e) = self.driver.set_port_options(
            sdk_port.unit,
            sdk_port.logical_port,
            &options,
        ) {
            error!(self.log, "failed to set loopback state";
                "node_id" => node_id, "port_id" => port_id,
                "state" => %loopback, "error" => %e);
            return Err(e.into());
        }

        state
            .loopback_state
            .entry(node_id)
            .or_default()
            .insert(port_id, loopback);
        info!(self.log, "loopback state changed";
            "node_id" => node_id, "port_id" => port_id, "state" => %loopback);
        self.publish(ChassisEvent::PortLoopbackStateChanged {
            node_id,
            port_id,
            state: loopback,
        });
        Ok(())
    }

    pub fn set_trunk_member_block_state(
        &self,
        node_id: u64,
        trunk_id: u32,
        port_id: u32,
        blocked: bool,
    ) -> ChassisResult<()> {
        Err(ChassisError::Unimplemented(format!(
            "blocking member {port_id} of trunk {trunk_id} on node \
            {node_id} (blocked: {blocked})"
        )))
    }
}
