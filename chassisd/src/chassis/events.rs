// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Handling of link and transceiver events coming up from the driver.

use slog::debug;
use slog::error;
use slog::info;
use slog::warn;
use slog::Logger;

use aal::HardwareDriver;
use aal::LinkEvent;
use aal::PortOptions;
use aal::TransceiverEvent;
use common::ports::HwState;
use common::ports::PortKey;
use common::ports::SdkPort;

use super::state::ChassisState;
use super::ChassisManager;
use crate::notify::ChassisEvent;

impl ChassisState {
    /// Record a link state change.  Returns the notification to publish, or
    /// None if the event doesn't map to a configured port.
    pub fn link_event(
        &mut self,
        event: &LinkEvent,
        log: &Logger,
    ) -> Option<ChassisEvent> {
        let Some(node_id) = self.unit_to_node.get(&event.unit).copied() else {
            error!(log, "link event for unknown unit";
                "asic_unit" => event.unit);
            return None;
        };
        let Some(ports) = self.sdk_port_to_port.get(&node_id) else {
            error!(log, "no port map for node"; "node_id" => node_id);
            return None;
        };
        let sdk_port = SdkPort::new(event.unit, event.logical_port);
        let Some(port_id) = ports.get(&sdk_port).copied() else {
            // Flex ports have channels that are brought up but never
            // configured.
            warn!(log, "link event on a non-configured channel of a flex port";
                "sdk_port" => %sdk_port);
            return None;
        };

        self.port_state
            .entry(node_id)
            .or_default()
            .insert(port_id, event.state);
        info!(log, "link state changed";
            "node_id" => node_id,
            "port_id" => port_id,
            "sdk_port" => %sdk_port,
            "state" => %event.state);
        Some(ChassisEvent::PortOperStateChanged {
            node_id,
            port_id,
            state: event.state,
        })
    }

    /// Walk a port group's transceiver state machine forward for a
    /// presence change, and program the group to match.
    pub fn transceiver_event(
        &mut self,
        event: &TransceiverEvent,
        driver: &dyn HardwareDriver,
        log: &Logger,
    ) {
        let group = PortKey::group(event.slot, event.port);
        let Some(old) = self.xcvr_state.get(&group).copied() else {
            error!(log, "transceiver event for unknown port group";
                "group" => %group);
            return;
        };
        let new = event.state;
        if new != HwState::Present && new != HwState::NotPresent {
            error!(log, "invalid transceiver state";
                "group" => %group, "state" => %new);
            return;
        }

        match (old, new) {
            (HwState::Ready, HwState::Present) => {
                // Internal groups have nothing plugged in to report
                // presence, so a repeat here is harmless.
                if self.is_internal_group(&group) {
                    debug!(log, "ignoring present event for ready group";
                        "group" => %group);
                } else {
                    error!(log, "present event for a group that is already ready";
                        "group" => %group);
                }
                return;
            }
            (HwState::Unknown, HwState::NotPresent) => {
                error!(log, "transceiver removed from a group never seen";
                    "group" => %group);
            }
            _ => {}
        }
        self.xcvr_state.insert(group, new);

        let mut options = PortOptions::enable(new == HwState::Present);
        if old == HwState::Unknown {
            options.blocked = Some(false);
        }
        if let Err(e) =
            self.set_port_options_for_group(&group, &options, driver, log)
        {
            error!(log, "failed to program port group";
                "group" => %group, "options" => %options, "error" => %e);
            return;
        }
        if new == HwState::Present {
            self.xcvr_state.insert(group, HwState::Ready);
            info!(log, "port group is ready"; "group" => %group);
        }
    }
}

impl ChassisManager {
    pub(crate) fn handle_link_event(&self, event: LinkEvent) {
        let mut state = self.state.write();
        if state.shutdown {
            return;
        }
        // Published under the chassis lock so that notifications come out
        // in the order the state changed.
        if let Some(n) = state.link_event(&event, &self.log) {
            self.publish(n);
        }
    }

    pub(crate) fn handle_transceiver_event(&self, event: TransceiverEvent) {
        let mut state = self.state.write();
        if state.shutdown {
            return;
        }
        state.transceiver_event(&event, self.driver.as_ref(), &self.log);
    }
}
