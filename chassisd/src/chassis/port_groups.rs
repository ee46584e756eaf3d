// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Programming of port groups: flex speed changes, and enabling or disabling
//! a group as its transceiver comes and goes.

use std::collections::BTreeSet;

use slog::debug;
use slog::info;
use slog::Logger;

use aal::HardwareDriver;
use aal::PortOptions;
use common::ports::HwState;
use common::ports::PortKey;

use super::state::ChassisState;
use crate::types::ChassisError;
use crate::types::ChassisResult;
use crate::types::ErrorList;

fn single<T: Copy + std::fmt::Debug>(
    set: &BTreeSet<T>,
    what: &str,
    group: &PortKey,
) -> ChassisResult<T> {
    let mut iter = set.iter();
    match (iter.next(), iter.next()) {
        (Some(v), None) => Ok(*v),
        _ => Err(ChassisError::InvalidParam(format!(
            "expected one {what} for flex group {group}, found {set:?}"
        ))),
    }
}

impl ChassisState {
    /// Bring every port group in line with the config.  Flex groups get
    /// their speed reprogrammed if needed, then each group that isn't
    /// already ready is enabled or disabled according to whether its
    /// transceiver is present.  Every group is attempted even if an
    /// earlier one fails.
    pub fn configure_port_groups(
        &mut self,
        driver: &dyn HardwareDriver,
        log: &Logger,
    ) -> ChassisResult<()> {
        let mut errors = ErrorList::new();

        let flex: Vec<PortKey> = self.flex_groups.keys().copied().collect();
        for group in flex {
            let Some(changed) = errors.check(
                self.set_speed_for_flex_group(&group, driver, log),
            ) else {
                continue;
            };
            // The group was disabled to change its speed, so it needs to go
            // through the enable pass below.
            if changed {
                if let Some(state) = self.xcvr_state.get_mut(&group) {
                    if *state == HwState::Ready {
                        *state = HwState::Present;
                    }
                }
            }
        }

        let groups: Vec<(PortKey, HwState)> = self
            .xcvr_state
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        for (group, state) in groups {
            if state == HwState::Ready {
                continue;
            }
            let present = state == HwState::Present;
            let options = PortOptions {
                enabled: Some(present),
                blocked: Some(!present),
                ..Default::default()
            };
            if errors
                .check(self.set_port_options_for_group(
                    &group, &options, driver, log,
                ))
                .is_some()
                && present
            {
                self.xcvr_state.insert(group, HwState::Ready);
            }
        }

        errors.into_result()
    }

    /// Reprogram a flex group for the speed of its configured ports.
    /// Returns true if the hardware was changed, false if it was already
    /// running at that speed.
    pub fn set_speed_for_flex_group(
        &self,
        group: &PortKey,
        driver: &dyn HardwareDriver,
        log: &Logger,
    ) -> ChassisResult<bool> {
        let applied = self.applied_map.as_ref().ok_or_else(|| {
            ChassisError::Internal("no target map has been applied".into())
        })?;

        // The ports the group was brought up with, one per channel at the
        // chip's base speed.
        let mut units = BTreeSet::new();
        let mut min_speed_ports = BTreeSet::new();
        for hp in applied
            .ports
            .iter()
            .filter(|hp| hp.slot == group.slot && hp.port == group.port)
        {
            if !hp.flex_port {
                return Err(ChassisError::InvalidParam(format!(
                    "{hp} is in flex group {group} but is not a flex port"
                )));
            }
            units.insert(hp.unit);
            min_speed_ports.insert(hp.logical_port);
        }

        // The ports the config asks for.
        let keys = self.flex_groups.get(group).ok_or_else(|| {
            ChassisError::InvalidParam(format!("{group} is not a flex group"))
        })?;
        let mut config_ports = BTreeSet::new();
        let mut lanes = BTreeSet::new();
        let mut speeds = BTreeSet::new();
        for key in keys {
            let hp = self.hw_port(key).ok_or_else(|| {
                ChassisError::Internal(format!("no hardware port for {key}"))
            })?;
            units.insert(hp.unit);
            config_ports.insert(hp.logical_port);
            lanes.insert(hp.num_serdes_lanes);
            speeds.insert(hp.speed_bps);
        }

        let unit = single(&units, "unit", group)?;
        let num_serdes_lanes = single(&lanes, "lane count", group)?;
        let speed_bps = single(&speeds, "speed", group)?;
        let control = min_speed_ports.first().copied().ok_or_else(|| {
            ChassisError::InvalidParam(format!(
                "flex group {group} has no ports in the target map"
            ))
        })?;
        if config_ports.first() != Some(&control) {
            return Err(ChassisError::InvalidParam(format!(
                "the first configured port of flex group {group} is not its \
                control port {control}"
            )));
        }

        let current = driver.get_port_options(unit, control)?;
        if current.speed_bps == Some(speed_bps) {
            debug!(log, "flex group already at speed";
                "group" => %group, "speed_bps" => speed_bps);
            return Ok(false);
        }

        let disable = PortOptions {
            enabled: Some(false),
            blocked: Some(true),
            ..Default::default()
        };
        for lp in &min_speed_ports {
            driver.set_port_options(unit, *lp, &disable)?;
        }
        let lanes = PortOptions {
            num_serdes_lanes: Some(num_serdes_lanes),
            ..Default::default()
        };
        driver.set_port_options(unit, control, &lanes)?;
        let speed = PortOptions {
            speed_bps: Some(speed_bps),
            ..Default::default()
        };
        for lp in &config_ports {
            driver.set_port_options(unit, *lp, &speed)?;
        }

        info!(log, "reprogrammed flex group";
            "group" => %group,
            "asic_unit" => unit,
            "speed_bps" => speed_bps,
            "num_serdes_lanes" => num_serdes_lanes);
        Ok(true)
    }

    /// Apply `options` to every port of a group.  SerDes lanes are
    /// configured first when the group is being enabled.
    pub fn set_port_options_for_group(
        &self,
        group: &PortKey,
        options: &PortOptions,
        driver: &dyn HardwareDriver,
        log: &Logger,
    ) -> ChassisResult<()> {
        let ports = self.group_ports(group).ok_or_else(|| {
            ChassisError::Internal(format!("Unknown port group {group}"))
        })?;

        if options.enabled == Some(true) {
            for hp in &ports {
                driver.configure_serdes(
                    hp.unit,
                    hp.logical_port,
                    &hp.serdes_params(),
                )?;
            }
        }
        for hp in &ports {
            driver.set_port_options(hp.unit, hp.logical_port, options)?;
        }
        debug!(log, "set options for port group";
            "group" => %group, "options" => %options);
        Ok(())
    }
}
