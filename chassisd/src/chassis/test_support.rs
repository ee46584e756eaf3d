// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Fixtures shared by the chassis unit tests.

use slog::Drain;

use aal::ChipInit;
use aal::ChipType;
use aal::DriverResult;
use aal::HardwareDriver;
use aal::LinkEvent;
use aal::PortCounters;
use aal::PortOptions;
use aal::SerdesParams;
use aal::TransceiverEvent;
use aal::WriterId;
use common::channel::ChannelWriter;
use common::ports::SPEED_100G;
use common::ports::SPEED_25G;

use crate::chassis_config::Chassis;
use crate::chassis_config::ChassisConfig;
use crate::chassis_config::Node;
use crate::chassis_config::Platform;
use crate::chassis_config::SingletonPort;
use crate::hw_map::Chip;
use crate::hw_map::HardwareCapabilityMap;
use crate::hw_map::HardwarePort;
use crate::hw_map::PortType;

pub fn test_log() -> slog::Logger {
    let dec = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(dec).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

mockall::mock! {
    pub Driver {}
    impl HardwareDriver for Driver {
        fn init_unit(&self, unit: i32, chip: &ChipInit) -> DriverResult<()>;
        fn init_port(&self, unit: i32, logical_port: i32) -> DriverResult<()>;
        fn set_port_options(
            &self,
            unit: i32,
            logical_port: i32,
            options: &PortOptions,
        ) -> DriverResult<()>;
        fn get_port_options(
            &self,
            unit: i32,
            logical_port: i32,
        ) -> DriverResult<PortOptions>;
        fn configure_serdes(
            &self,
            unit: i32,
            logical_port: i32,
            params: &SerdesParams,
        ) -> DriverResult<()>;
        fn get_port_counters(
            &self,
            unit: i32,
            logical_port: i32,
        ) -> DriverResult<PortCounters>;
        fn start_link_scan(&self, unit: i32) -> DriverResult<()>;
        fn register_link_event_writer(
            &self,
            writer: ChannelWriter<LinkEvent>,
            priority: i32,
        ) -> DriverResult<WriterId>;
        fn unregister_link_event_writer(&self, id: WriterId) -> DriverResult<()>;
        fn register_transceiver_event_writer(
            &self,
            writer: ChannelWriter<TransceiverEvent>,
            priority: i32,
        ) -> DriverResult<WriterId>;
        fn unregister_transceiver_event_writer(
            &self,
            id: WriterId,
        ) -> DriverResult<()>;
        fn shutdown_all_units(&self) -> DriverResult<()>;
    }
}

/// A driver that accepts everything and remembers nothing.
pub struct NullDriver;

impl HardwareDriver for NullDriver {
    fn init_unit(&self, _unit: i32, _chip: &ChipInit) -> DriverResult<()> {
        Ok(())
    }
    fn init_port(&self, _unit: i32, _lp: i32) -> DriverResult<()> {
        Ok(())
    }
    fn set_port_options(
        &self,
        _unit: i32,
        _lp: i32,
        _options: &PortOptions,
    ) -> DriverResult<()> {
        Ok(())
    }
    fn get_port_options(
        &self,
        _unit: i32,
        _lp: i32,
    ) -> DriverResult<PortOptions> {
        Ok(PortOptions::default())
    }
    fn configure_serdes(
        &self,
        _unit: i32,
        _lp: i32,
        _params: &SerdesParams,
    ) -> DriverResult<()> {
        Ok(())
    }
    fn get_port_counters(
        &self,
        _unit: i32,
        _lp: i32,
    ) -> DriverResult<PortCounters> {
        Ok(PortCounters::default())
    }
    fn start_link_scan(&self, _unit: i32) -> DriverResult<()> {
        Ok(())
    }
    fn register_link_event_writer(
        &self,
        _writer: ChannelWriter<LinkEvent>,
        _priority: i32,
    ) -> DriverResult<WriterId> {
        Ok(1)
    }
    fn unregister_link_event_writer(&self, _id: WriterId) -> DriverResult<()> {
        Ok(())
    }
    fn register_transceiver_event_writer(
        &self,
        _writer: ChannelWriter<TransceiverEvent>,
        _priority: i32,
    ) -> DriverResult<WriterId> {
        Ok(2)
    }
    fn unregister_transceiver_event_writer(
        &self,
        _id: WriterId,
    ) -> DriverResult<()> {
        Ok(())
    }
    fn shutdown_all_units(&self) -> DriverResult<()> {
        Ok(())
    }
}

fn hw_port(
    unit: i32,
    port: i32,
    channel: i32,
    speed_bps: u64,
    logical_port: i32,
) -> HardwarePort {
    let lane = channel.max(1) - 1;
    HardwarePort {
        unit,
        slot: 1,
        port,
        channel,
        speed_bps,
        port_type: PortType::Ce,
        physical_port: port * 4 + lane,
        diag_port: port * 4 + lane,
        logical_port,
        module: unit,
        serdes_core: port,
        serdes_lane: lane,
        num_serdes_lanes: if channel == 0 { 4 } else { 1 },
        tx_lane_map: 0,
        rx_lane_map: 0,
        tx_polarity_flip: 0,
        rx_polarity_flip: 0,
        flex_port: false,
        internal: false,
    }
}

/// Two Tomahawk units.  Unit 0 has 100G cages at ports 1 and 2, and a flex
/// cage at port 4 that runs either one 100G or four 25G channels.  Unit 1
/// has a single 100G cage at port 3.
pub fn capability_map() -> HardwareCapabilityMap {
    let mut ports = vec![
        hw_port(0, 1, 0, SPEED_100G, 1),
        hw_port(0, 2, 0, SPEED_100G, 5),
        hw_port(1, 3, 0, SPEED_100G, 1),
    ];
    let mut flex = vec![hw_port(0, 4, 0, SPEED_100G, 9)];
    for c in 1..=4 {
        flex.push(hw_port(0, 4, c, SPEED_25G, 8 + c));
    }
    for p in flex.iter_mut() {
        p.flex_port = true;
    }
    ports.extend(flex);

    let chip = |unit| Chip {
        unit,
        chip_type: ChipType::Tomahawk,
        slot: 1,
        module: unit,
        pci_bus: 0,
        pci_slot: unit,
    };
    HardwareCapabilityMap {
        id: "test".into(),
        chips: vec![chip(0), chip(1)],
        ports,
        ..Default::default()
    }
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

/// Node 1 on unit 0, with ports 10 and 11 on cages 1 and 2, and port 12 on
/// the flex cage at 100G.
pub fn config_with_flex_100g() -> ChassisConfig {
    ChassisConfig {
        chassis: Chassis {
            platform: Platform::GenericTomahawk,
            name: String::new(),
        },
        nodes: vec![Node {
            id: 1,
            slot: 1,
            name: String::new(),
        }],
        singleton_ports: vec![
            singleton(10, 1, 0),
            singleton(11, 2, 0),
            singleton(12, 4, 0),
        ],
        trunk_ports: vec![],
    }
}
