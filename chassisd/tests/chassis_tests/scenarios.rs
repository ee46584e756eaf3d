// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::{BTreeMap, BTreeSet};

use asic::chaos::{AsicConfig, DriverCall};
use chassisd::chassis_config::{Node, TrunkPort, TrunkType};
use chassisd::notify::ChassisEvent;
use chassisd::types::ErrorKind;
use common::ports::{
    AdminState, HealthState, LoopbackState, PortKey, PortState, SdkPort,
    SdkTrunk, TrunkState,
};
use pretty_assertions::assert_eq;

use super::harness::*;

#[test]
fn test_single_port_bring_up() {
    let tc = init_pushed(&single_port_config());
    let m = &tc.manager;

    assert_eq!(m.get_unit_from_node_id(1).unwrap(), 0);
    assert_eq!(m.get_port_state(1, 10).unwrap(), PortState::Unknown);
    assert_eq!(
        m.get_node_id_to_unit_map().unwrap(),
        BTreeMap::from([(1, 0)])
    );
    assert_eq!(
        m.get_port_id_to_sdk_port_map(1).unwrap(),
        BTreeMap::from([(10, SdkPort::new(0, 1))])
    );
    assert_eq!(m.get_chip(0).unwrap().unit, 0);
    let hp = m.get_hardware_port(1, 10).unwrap();
    assert_eq!(hp.logical_port, 1);
    assert_eq!(
        m.get_hardware_port_by_key(&PortKey::new(1, 1, 0)).unwrap(),
        hp
    );
    m.check_invariants().unwrap();

    // Only the unit hosting a node is brought up.
    assert_eq!(tc.driver.units(), vec![0]);
    assert_eq!(tc.driver.scanning_units(), vec![0]);
    assert_eq!(tc.driver.link_writer_count(), 1);
    assert_eq!(tc.driver.transceiver_writer_count(), 1);
    let calls = tc.driver.calls();
    assert_eq!(calls[0], DriverCall::InitUnit { unit: 0 });
    assert_eq!(
        calls[1],
        DriverCall::InitPort {
            unit: 0,
            logical_port: 1
        }
    );

    // The transceiver hasn't been seen, so the port is held down.
    let port = tc.driver.port(0, 1).unwrap();
    assert_eq!(port.options.enabled, Some(false));
    assert_eq!(port.options.blocked, Some(true));
}

#[test]
fn test_link_event_notifies() {
    let tc = init_pushed(&single_port_config());
    assert_eq!(tc.driver.inject_link_event(0, 1, PortState::Up), 1);

    wait_until("link up", || {
        tc.manager.get_port_state(1, 10).unwrap() == PortState::Up
    });
    wait_until("notification", || !tc.sink.events().is_empty());
    assert_eq!(
        tc.sink.events(),
        vec![ChassisEvent::PortOperStateChanged {
            node_id: 1,
            port_id: 10,
            state: PortState::Up,
        }]
    );
    assert_eq!(
        tc.manager
            .get_port_state_by_sdk_port(SdkPort::new(0, 1))
            .unwrap(),
        PortState::Up
    );
}

#[test]
fn test_unmapped_link_events_dropped() {
    let tc = init_pushed(&full_config());
    // An unconfigured 25G channel of the flex cage, then an unknown unit.
    tc.driver.inject_link_event(0, 10, PortState::Up);
    tc.driver.inject_link_event(7, 1, PortState::Up);
    tc.driver.inject_link_event(0, 5, PortState::Down);

    wait_until("link down on port 11", || {
        tc.manager.get_port_state(1, 11).unwrap() == PortState::Down
    });
    assert_eq!(tc.sink.events().len(), 1);
    assert_eq!(tc.manager.get_port_state(1, 10).unwrap(), PortState::Unknown);
}

#[test]
fn test_trunk_id_collides_with_port() {
    let tc = init_harness(&AsicConfig::default());
    let mut config = single_port_config();
    config.trunk_ports.push(TrunkPort {
        id: 10,
        node: 1,
        trunk_type: TrunkType::Static,
        members: vec![],
    });

    let err = tc.manager.verify_chassis_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
    let err = tc.manager.get_unit_from_node_id(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert!(tc.driver.calls().is_empty());

    let err = tc.manager.push_chassis_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);
    assert!(tc.driver.calls().is_empty());
}

#[test]
fn test_double_shutdown() {
    let tc = init_pushed(&full_config());
    tc.manager.shutdown().unwrap();
    tc.driver.clear_calls();
    tc.manager.shutdown().unwrap();
    assert!(tc.driver.calls().is_empty());

    assert_eq!(tc.driver.link_writer_count(), 0);
    assert_eq!(tc.driver.transceiver_writer_count(), 0);
    assert!(tc.driver.units().is_empty());
    let err = tc.manager.get_port_state(1, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);

    let err = tc.manager.push_chassis_config(&full_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn test_shutdown_before_push() {
    let tc = init_harness(&AsicConfig::default());
    tc.manager.shutdown().unwrap();
    assert_eq!(tc.driver.calls(), vec![DriverCall::ShutdownAllUnits]);
}

#[test]
fn test_no_events_after_shutdown() {
    let tc = init_pushed(&single_port_config());
    tc.manager.shutdown().unwrap();
    // The writers are gone, so nothing is delivered.
    assert_eq!(tc.driver.inject_link_event(0, 1, PortState::Up), 0);
    assert!(tc.sink.events().is_empty());
}

#[test]
fn test_queries_before_push() {
    let tc = init_harness(&AsicConfig::default());
    let m = &tc.manager;
    let kinds = [
        m.get_node_id_to_unit_map().unwrap_err().kind(),
        m.get_chip(0).unwrap_err().kind(),
        m.get_port_state(1, 10).unwrap_err().kind(),
        m.get_trunk_members(1, 100).unwrap_err().kind(),
        m.get_parent_trunk_id(1, 10).unwrap_err().kind(),
        m.get_port_admin_state(1, 10).unwrap_err().kind(),
        m.set_port_admin_state(1, 10, AdminState::Enabled)
            .unwrap_err()
            .kind(),
    ];
    assert!(kinds.iter().all(|k| *k == ErrorKind::NotInitialized));

    // Checking a config doesn't need an initialized chassis.
    m.verify_chassis_config(&full_config()).unwrap();
}

#[test]
fn test_unknown_keys() {
    let tc = init_pushed(&full_config());
    let m = &tc.manager;
    let kinds = [
        m.get_unit_from_node_id(2).unwrap_err().kind(),
        m.get_chip(1).unwrap_err().kind(),
        m.get_port_state(1, 99).unwrap_err().kind(),
        m.get_port_state(2, 10).unwrap_err().kind(),
        m.get_trunk_state(1, 99).unwrap_err().kind(),
        m.get_parent_trunk_id(1, 12).unwrap_err().kind(),
        m.get_port_state_by_sdk_port(SdkPort::new(0, 10))
            .unwrap_err()
            .kind(),
        m.get_hardware_port_by_key(&PortKey::new(1, 4, 1))
            .unwrap_err()
            .kind(),
    ];
    assert!(kinds.iter().all(|k| *k == ErrorKind::NotFound), "{kinds:?}");
}

#[test]
fn test_trunk_tables() {
    let tc = init_pushed(&full_config());
    let m = &tc.manager;
    assert_eq!(
        m.get_trunk_members(1, 100).unwrap(),
        BTreeSet::from([10, 11])
    );
    assert_eq!(m.get_parent_trunk_id(1, 11).unwrap(), 100);
    assert_eq!(m.get_trunk_state(1, 100).unwrap(), TrunkState::Unknown);
    assert_eq!(
        m.get_trunk_id_to_sdk_trunk_map(1).unwrap(),
        BTreeMap::from([(100, SdkTrunk::new(0, SdkTrunk::UNASSIGNED))])
    );
    let err = m.set_trunk_member_block_state(1, 100, 10, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unimplemented);
}

#[test]
fn test_repush_is_idempotent() {
    let tc = init_pushed(&full_config());
    tc.driver.inject_link_event(0, 1, PortState::Up);
    wait_until("link up", || {
        tc.manager.get_port_state(1, 10).unwrap() == PortState::Up
    });

    tc.manager.set_port_health_state(1, 11, HealthState::Good).unwrap();
    let before = snapshot(&tc.manager, 1);

    tc.driver.clear_calls();
    tc.manager.push_chassis_config(&full_config()).unwrap();
    tc.manager.check_invariants().unwrap();

    // Nothing new to program, and every table is as it was.
    assert!(tc.driver.calls().iter().all(|c| !matches!(
        c,
        DriverCall::InitUnit { .. } | DriverCall::InitPort { .. }
    )));
    assert_eq!(snapshot(&tc.manager, 1), before);
    assert_eq!(tc.manager.get_port_state(1, 10).unwrap(), PortState::Up);
}

#[test]
fn test_repush_changes_admin_state() {
    let tc = init_pushed(&full_config());
    let mut config = full_config();
    config.singleton_ports[1].admin_state = AdminState::Enabled;
    config.singleton_ports[1].loopback_state = LoopbackState::Mac;

    tc.driver.clear_calls();
    tc.manager.push_chassis_config(&config).unwrap();
    assert_eq!(
        tc.manager.get_port_admin_state(1, 11).unwrap(),
        AdminState::Enabled
    );
    assert_eq!(
        tc.manager.get_port_loopback_state(1, 11).unwrap(),
        LoopbackState::Mac
    );
    let port = tc.driver.port(0, 5).unwrap();
    assert_eq!(port.options.loopback_mode, Some(LoopbackState::Mac));
    assert!(tc.driver.calls().contains(&DriverCall::SetPortOptions {
        unit: 0,
        logical_port: 5,
        options: aal::PortOptions::enable(true),
    }));
}

#[test]
fn test_reboot_required() {
    let tc = init_pushed(&full_config());
    tc.driver.inject_link_event(0, 5, PortState::Down);
    wait_until("link down", || {
        tc.manager.get_port_state(1, 11).unwrap() == PortState::Down
    });
    let before = snapshot(&tc.manager, 1);

    // Cage 3 is on another unit, and a node can't span units.
    let mut moved = full_config();
    moved.singleton_ports[1].port = 3;
    moved.trunk_ports.clear();
    let err = tc.manager.verify_chassis_config(&moved).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam, "{err}");

    // Dropping a cage changes the target map.
    let mut fewer = full_config();
    fewer.singleton_ports.retain(|p| p.id != 11);
    fewer.trunk_ports.clear();
    let err = tc.manager.verify_chassis_config(&fewer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RebootRequired);
    let err = tc.manager.push_chassis_config(&fewer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RebootRequired);

    // Nothing changed.
    assert_eq!(snapshot(&tc.manager, 1), before);
    assert_eq!(tc.manager.get_parent_trunk_id(1, 11).unwrap(), 100);
    tc.manager.check_invariants().unwrap();

    // A flex speed change keeps the target map, so it needs no reboot.
    tc.manager.verify_chassis_config(&split_flex_config()).unwrap();
}

#[test]
fn test_reboot_required_for_new_node() {
    let tc = init_pushed(&single_port_config());
    let mut config = single_port_config();
    config.nodes.push(Node {
        id: 2,
        slot: 1,
        name: String::new(),
    });
    let mut p = singleton(20, 3, 0);
    p.node = 2;
    config.singleton_ports.push(p);

    let err = tc.manager.push_chassis_config(&config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RebootRequired);
    let err = tc.manager.get_unit_from_node_id(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_set_port_state() {
    let tc = init_pushed(&full_config());
    let m = &tc.manager;

    m.set_port_admin_state(1, 10, AdminState::Enabled).unwrap();
    assert_eq!(m.get_port_admin_state(1, 10).unwrap(), AdminState::Enabled);
    assert_eq!(tc.driver.port(0, 1).unwrap().options.enabled, Some(true));

    m.set_port_loopback_state(1, 10, LoopbackState::Phy).unwrap();
    assert_eq!(
        tc.driver.port(0, 1).unwrap().options.loopback_mode,
        Some(LoopbackState::Phy)
    );

    // Unknown leaves everything alone.
    tc.driver.clear_calls();
    m.set_port_loopback_state(1, 10, LoopbackState::Unknown).unwrap();
    assert!(tc.driver.calls().is_empty());
    assert_eq!(
        m.get_port_loopback_state(1, 10).unwrap(),
        LoopbackState::Phy
    );

    m.set_port_health_state(1, 10, HealthState::Bad).unwrap();
    assert_eq!(m.get_port_health_state(1, 10).unwrap(), HealthState::Bad);
    assert!(tc.driver.calls().is_empty());

    assert_eq!(
        tc.sink.events(),
        vec![
            ChassisEvent::PortAdminStateChanged {
                node_id: 1,
                port_id: 10,
                state: AdminState::Enabled,
            },
            ChassisEvent::PortLoopbackStateChanged {
                node_id: 1,
                port_id: 10,
                state: LoopbackState::Phy,
            },
        ]
    );
}

#[test]
fn test_closed_sink_dropped() {
    let tc = init_pushed(&single_port_config());
    tc.sink.close();
    tc.manager
        .set_port_admin_state(1, 10, AdminState::Enabled)
        .unwrap();

    // A new sink picks up where the old one left off.
    let sink = std::sync::Arc::new(RecordingSink::default());
    tc.manager.register_event_notify_writer(sink.clone()).unwrap();
    tc.manager
        .set_port_admin_state(1, 10, AdminState::Disabled)
        .unwrap();
    assert_eq!(sink.events().len(), 1);

    tc.manager.unregister_event_notify_writer().unwrap();
    tc.manager
        .set_port_admin_state(1, 10, AdminState::Enabled)
        .unwrap();
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn test_port_counters() {
    let tc = init_pushed(&single_port_config());
    let counters = aal::PortCounters {
        in_octets: 1500,
        out_octets: 64,
        ..Default::default()
    };
    tc.driver.set_counters(0, 1, counters).unwrap();
    assert_eq!(tc.manager.get_port_counters(1, 10).unwrap(), counters);
}
