// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use asic::chaos::{AsicConfig, Handle};
use chassisd::chassis_config::{
    Chassis, ChassisConfig, Node, Platform, SingletonPort, TrunkPort,
    TrunkType,
};
use chassisd::hw_map::{CapabilityMapFile, HardwareCapabilityMap};
use chassisd::notify::{ChassisEvent, NotificationSink};
use chassisd::ChassisManager;
use common::ports::{
    AdminState, HealthState, LoopbackState, PortState, SdkPort, SdkTrunk,
    SPEED_100G, SPEED_25G,
};
use slog::Drain;

// How often, and for how long, to poll for the event readers to catch up.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);
const RETRY_MAX: Duration = Duration::from_secs(5);

// Two Tomahawk units.  Unit 0 has 100G cages at ports 1 and 2, and a flex
// cage at port 4 that runs either one 100G or four 25G channels.  Unit 1 has
// a single 100G cage at port 3.
const CAPABILITY_MAP: &str = r#"
    [[map]]
    id = "test"

    [[map.chips]]
    unit = 0
    chip_type = "tomahawk"
    slot = 1
    module = 0

    [[map.chips]]
    unit = 1
    chip_type = "tomahawk"
    slot = 1
    module = 1
    pci_slot = 1

    [[map.ports]]
    unit = 0
    slot = 1
    port = 1
    speed_bps = 100_000_000_000
    port_type = "ce"
    physical_port = 4
    diag_port = 4
    logical_port = 1
    serdes_core = 1
    num_serdes_lanes = 4

    [[map.ports]]
    unit = 0
    slot = 1
    port = 2
    speed_bps = 100_000_000_000
    port_type = "ce"
    physical_port = 8
    diag_port = 8
    logical_port = 5
    serdes_core = 2
    num_serdes_lanes = 4

    [[map.ports]]
    unit = 1
    slot = 1
    port = 3
    speed_bps = 100_000_000_000
    port_type = "ce"
    physical_port = 12
    diag_port = 12
    logical_port = 1
    module = 1
    serdes_core = 3
    num_serdes_lanes = 4

    [[map.ports]]
    unit = 0
    slot = 1
    port = 4
    channel = 0
    speed_bps = 100_000_000_000
    port_type = "ce"
    physical_port = 16
    diag_port = 16
    logical_port = 9
    serdes_core = 4
    num_serdes_lanes = 4
    flex_port = true

    [[map.ports]]
    unit = 0
    slot = 1
    port = 4
    channel = 1
    speed_bps = 25_000_000_000
    port_type = "xe"
    physical_port = 16
    diag_port = 16
    logical_port = 9
    serdes_core = 4
    serdes_lane = 0
    num_serdes_lanes = 1
    flex_port = true

    [[map.ports]]
    unit = 0
    slot = 1
    port = 4
    channel = 2
    speed_bps = 25_000_000_000
    port_type = "xe"
    physical_port = 17
    diag_port = 17
    logical_port = 10
    serdes_core = 4
    serdes_lane = 1
    num_serdes_lanes = 1
    flex_port = true

    [[map.ports]]
    unit = 0
    slot = 1
    port = 4
    channel = 3
    speed_bps = 25_000_000_000
    port_type = "xe"
    physical_port = 18
    diag_port = 18
    logical_port = 11
    serdes_core = 4
    serdes_lane = 2
    num_serdes_lanes = 1
    flex_port = true

    [[map.ports]]
    unit = 0
    slot = 1
    port = 4
    channel = 4
    speed_bps = 25_000_000_000
    port_type = "xe"
    physical_port = 19
    diag_port = 19
    logical_port = 12
    serdes_core = 4
    serdes_lane = 3
    num_serdes_lanes = 1
    flex_port = true
"#;

pub fn test_log() -> slog::Logger {
    let dec = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(dec).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

pub fn capability_map() -> HardwareCapabilityMap {
    CapabilityMapFile::from_toml(CAPABILITY_MAP)
        .unwrap()
        .select("test")
        .unwrap()
}

pub fn singleton(id: u32, port: i32, channel: i32) -> SingletonPort {
    SingletonPort {
        id,
        node: 1,
        slot: 1,
        port,
        channel,
        speed_bps: if channel == 0 { SPEED_100G } else { SPEED_25G },
        admin_state: Default::default(),
        loopback_state: Default::default(),
        autoneg: false,
        mac_address: None,
    }
}

/// Node 1 with a single 100G port, id 10, on cage 1 of unit 0.
pub fn single_port_config() -> ChassisConfig {
    ChassisConfig {
        chassis: Chassis {
            platform: Platform::GenericTomahawk,
            name: "test".to_string(),
        },
        nodes: vec![Node {
            id: 1,
            slot: 1,
            name: String::new(),
        }],
        singleton_ports: vec![singleton(10, 1, 0)],
        trunk_ports: vec![],
    }
}

/// Ports 10 and 11 on cages 1 and 2, bundled into trunk 100, and port 12 on
/// the flex cage at 100G.
pub fn full_config() -> ChassisConfig {
    let mut config = single_port_config();
    config.singleton_ports.push(singleton(11, 2, 0));
    config.singleton_ports.push(singleton(12, 4, 0));
    config.trunk_ports.push(TrunkPort {
        id: 100,
        node: 1,
        trunk_type: TrunkType::Lacp,
        members: vec![10, 11],
    });
    config
}

/// Like `full_config`, but with the flex cage split into four 25G ports,
/// ids 12 through 15.
pub fn split_flex_config() -> ChassisConfig {
    let mut config = full_config();
    config.singleton_ports.retain(|p| p.id != 12);
    for c in 1..=4 {
        config.singleton_ports.push(singleton(11 + c as u32, 4, c));
    }
    config
}

/// A sink that keeps every event it's handed.  Once closed it refuses all
/// further writes.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChassisEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ChassisEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl NotificationSink for RecordingSink {
    fn write(&self, event: ChassisEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.events.lock().unwrap().push(event);
        true
    }
}

pub struct TestChassis {
    pub driver: Arc<Handle>,
    pub manager: Arc<ChassisManager>,
    pub sink: Arc<RecordingSink>,
}

pub fn init_harness(chaos: &AsicConfig) -> TestChassis {
    let log = test_log();
    let driver = Arc::new(Handle::new(&log, chaos));
    let manager = ChassisManager::new(&log, driver.clone(), capability_map());
    let sink = Arc::new(RecordingSink::default());
    manager.register_event_notify_writer(sink.clone()).unwrap();
    TestChassis {
        driver,
        manager,
        sink,
    }
}

/// Set up a manager and push `config` to it.
pub fn init_pushed(config: &ChassisConfig) -> TestChassis {
    let tc = init_harness(&AsicConfig::default());
    tc.manager.push_chassis_config(config).unwrap();
    tc
}

/// Poll until `check` passes, panicking if it never does.
pub fn wait_until<F: FnMut() -> bool>(what: &str, mut check: F) {
    let start = Instant::now();
    while !check() {
        if start.elapsed() > RETRY_MAX {
            panic!("timed out waiting for {what}");
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}

/// Everything the manager reports about one node, gathered through its
/// public getters.
#[derive(Debug, PartialEq)]
pub struct NodeSnapshot {
    pub node_to_unit: BTreeMap<u64, i32>,
    pub sdk_ports: BTreeMap<u32, SdkPort>,
    pub sdk_trunks: BTreeMap<u32, SdkTrunk>,
    pub port_states:
        BTreeMap<u32, (PortState, AdminState, HealthState, LoopbackState)>,
    pub trunk_members: BTreeMap<u32, BTreeSet<u32>>,
    pub parent_trunks: BTreeMap<u32, u32>,
}

pub fn snapshot(manager: &ChassisManager, node_id: u64) -> NodeSnapshot {
    let sdk_ports = manager.get_port_id_to_sdk_port_map(node_id).unwrap();
    let sdk_trunks = manager.get_trunk_id_to_sdk_trunk_map(node_id).unwrap();
    let port_states = sdk_ports
        .keys()
        .map(|id| {
            let states = (
                manager.get_port_state(node_id, *id).unwrap(),
                manager.get_port_admin_state(node_id, *id).unwrap(),
                manager.get_port_health_state(node_id, *id).unwrap(),
                manager.get_port_loopback_state(node_id, *id).unwrap(),
            );
            (*id, states)
        })
        .collect();
    let trunk_members = sdk_trunks
        .keys()
        .map(|id| (*id, manager.get_trunk_members(node_id, *id).unwrap()))
        .collect();
    let parent_trunks = sdk_ports
        .keys()
        .filter_map(|id| {
            manager
                .get_parent_trunk_id(node_id, *id)
                .ok()
                .map(|trunk| (*id, trunk))
        })
        .collect();
    NodeSnapshot {
        node_to_unit: manager.get_node_id_to_unit_map().unwrap(),
        sdk_ports,
        sdk_trunks,
        port_states,
        trunk_members,
        parent_trunks,
    }
}
