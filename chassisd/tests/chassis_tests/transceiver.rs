// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use asic::chaos::DriverCall;
use common::ports::{HwState, PortState};

use super::harness::*;

fn serdes_configured(tc: &TestChassis, logical_port: i32) -> bool {
    tc.driver.calls().contains(&DriverCall::ConfigureSerdes {
        unit: 0,
        logical_port,
    })
}

#[test]
fn test_insert_enables_group() {
    let tc = init_pushed(&single_port_config());
    tc.driver.clear_calls();
    assert_eq!(tc.driver.inject_transceiver_event(1, 1, HwState::Present), 1);

    wait_until("port enabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(true)
    });
    let port = tc.driver.port(0, 1).unwrap();
    assert_eq!(port.options.blocked, Some(false));
    assert_eq!(port.serdes.map(|s| s.num_serdes_lanes), Some(4));
    assert!(serdes_configured(&tc, 1));
}

#[test]
fn test_remove_disables_group() {
    let tc = init_pushed(&single_port_config());
    tc.driver.inject_transceiver_event(1, 1, HwState::Present);
    wait_until("port enabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(true)
    });

    tc.driver.clear_calls();
    tc.driver.inject_transceiver_event(1, 1, HwState::NotPresent);
    wait_until("port disabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(false)
    });
    // Disabling doesn't touch the SerDes.
    assert!(!serdes_configured(&tc, 1));
}

#[test]
fn test_repeated_present_ignored() {
    let tc = init_pushed(&single_port_config());
    tc.driver.inject_transceiver_event(1, 1, HwState::Present);
    wait_until("port enabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(true)
    });

    tc.driver.clear_calls();
    tc.driver.inject_transceiver_event(1, 1, HwState::Present);
    // Use a link event as a marker that the reader has caught up.
    tc.driver.inject_link_event(0, 1, PortState::Up);
    wait_until("link up", || {
        tc.manager.get_port_state(1, 10).unwrap() == PortState::Up
    });
    assert!(tc.driver.calls().is_empty());
}

#[test]
fn test_unexpected_states_ignored() {
    let tc = init_pushed(&single_port_config());
    tc.driver.clear_calls();
    tc.driver.inject_transceiver_event(1, 1, HwState::Failed);
    tc.driver.inject_transceiver_event(1, 9, HwState::Present);

    // Events on the two channels are handled independently, so wait for a
    // transceiver event that does have an effect.
    tc.driver.inject_transceiver_event(1, 1, HwState::Present);
    wait_until("port enabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(true)
    });
    let programmed: Vec<i32> = tc
        .driver
        .calls()
        .iter()
        .filter_map(|c| match c {
            DriverCall::SetPortOptions { logical_port, .. } => {
                Some(*logical_port)
            }
            _ => None,
        })
        .collect();
    assert_eq!(programmed, vec![1]);
}

#[test]
fn test_repush_keeps_ready_groups() {
    let tc = init_pushed(&single_port_config());
    tc.driver.inject_transceiver_event(1, 1, HwState::Present);
    wait_until("port enabled", || {
        tc.driver.port(0, 1).unwrap().options.enabled == Some(true)
    });

    tc.driver.clear_calls();
    tc.manager.push_chassis_config(&single_port_config()).unwrap();
    assert!(tc.driver.calls().is_empty());
    assert_eq!(tc.driver.port(0, 1).unwrap().options.enabled, Some(true));
}
