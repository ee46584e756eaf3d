// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use parking_lot::Mutex;
use rand::random;
use serde::{Deserialize, Serialize};
use slog::{debug, o, warn, Logger};

use aal::{
    ChipInit, DriverError, DriverResult, HardwareDriver, LinkEvent,
    PortCounters, PortOptions, SerdesParams, TransceiverEvent, WriterId,
};
use common::channel::ChannelWriter;
use common::ports::{HwState, PortState};

/// Chaos that happens according to a probability.
#[derive(Default, Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Chaos {
    /// A probability between 0.0 and 1.0
    pub value: f64,
}

impl Chaos {
    /// Create a new chaos value.
    pub fn new(value: f64) -> Self {
        let mut c = Self::default();
        c.set(value);
        c
    }
    /// Set the chaos value. Panics if value is outside the range [0.0, 1.0].
    pub fn set(&mut self, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            panic!("probability out of range");
        }
        self.value = value;
    }

    /// Get the underlying chaos value.
    pub fn get(&self) -> f64 {
        self.value
    }

    /// Return a chaos error according to the underlying probability value.
    pub fn unfurled(&self, log: &Logger, message: &str) -> DriverResult<()> {
        if self.value > 0.0 && self.value >= random() {
            slog::error!(log, "chaos error: {}", message);
            return Err(DriverError::Synthetic(message.into()));
        }
        Ok(())
    }
}

/// The chaos driver config contains chaos values for each driver operation.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AsicConfig {
    pub init_unit: Chaos,
    pub init_port: Chaos,
    pub set_port_options: Chaos,
    pub get_port_options: Chaos,
    pub configure_serdes: Chaos,
    pub get_port_counters: Chaos,
    pub start_link_scan: Chaos,
    pub register_link_event_writer: Chaos,
    pub unregister_link_event_writer: Chaos,
    pub register_transceiver_event_writer: Chaos,
    pub unregister_transceiver_event_writer: Chaos,
    pub shutdown_all_units: Chaos,
}

impl AsicConfig {
    /// The uniform chaos config applies a uniform underlying probability to each
    /// chaos value.
    pub fn uniform(v: f64) -> Self {
        Self {
            init_unit: Chaos::new(v),
            init_port: Chaos::new(v),
            set_port_options: Chaos::new(v),
            get_port_options: Chaos::new(v),
            configure_serdes: Chaos::new(v),
            get_port_counters: Chaos::new(v),
            start_link_scan: Chaos::new(v),
            register_link_event_writer: Chaos::new(v),
            unregister_link_event_writer: Chaos::new(v),
            register_transceiver_event_writer: Chaos::new(v),
            unregister_transceiver_event_writer: Chaos::new(v),
            shutdown_all_units: Chaos::new(v),
        }
    }

    /// The uniform get chaos config applies a uniform underlying probability to
    /// each driver getter function. Everything else is initialized with a
    /// default Chaos config that fails with probability zero.
    pub fn uniform_get(v: f64) -> Self {
        Self {
            get_port_options: Chaos::new(v),
            get_port_counters: Chaos::new(v),
            ..Default::default()
        }
    }

    /// The uniform set chaos config applies a uniform underlying probability to
    /// each function that programs a port after bring-up.  Getters and the
    /// bring-up path are initialized with a default Chaos config that fails
    /// with probability zero.
    pub fn uniform_set(v: f64) -> Self {
        Self {
            set_port_options: Chaos::new(v),
            configure_serdes: Chaos::new(v),
            ..Default::default()
        }
    }
}

/// A record of a single state-changing call made against the driver, kept so
/// that callers can check what was programmed and in which order.
#[derive(Clone, Debug, PartialEq)]
pub enum DriverCall {
    InitUnit { unit: i32 },
    InitPort { unit: i32, logical_port: i32 },
    SetPortOptions {
        unit: i32,
        logical_port: i32,
        options: PortOptions,
    },
    ConfigureSerdes { unit: i32, logical_port: i32 },
    StartLinkScan { unit: i32 },
    ShutdownAllUnits,
}

/// Chaos ports track the options applied to them and the last SerDes
/// programming they received.
#[derive(Clone, Debug, Default)]
pub struct Port {
    pub options: PortOptions,
    pub serdes: Option<SerdesParams>,
    pub counters: PortCounters,
}

struct Registered<T> {
    id: WriterId,
    priority: i32,
    writer: ChannelWriter<T>,
}

#[derive(Default)]
struct DriverState {
    units: BTreeMap<i32, ChipInit>,
    ports: BTreeMap<(i32, i32), Port>,
    scanning: BTreeSet<i32>,
    link_writers: Vec<Registered<LinkEvent>>,
    xcvr_writers: Vec<Registered<TransceiverEvent>>,
    next_writer_id: WriterId,
    calls: Vec<DriverCall>,
}

impl DriverState {
    fn alloc_writer_id(&mut self) -> WriterId {
        self.next_writer_id += 1;
        self.next_writer_id
    }

    fn port(&self, unit: i32, logical_port: i32) -> DriverResult<&Port> {
        self.ports.get(&(unit, logical_port)).ok_or_else(|| {
            DriverError::Missing(format!(
                "port {logical_port} on unit {unit}"
            ))
        })
    }

    fn port_mut(
        &mut self,
        unit: i32,
        logical_port: i32,
    ) -> DriverResult<&mut Port> {
        self.ports.get_mut(&(unit, logical_port)).ok_or_else(|| {
            DriverError::Missing(format!(
                "port {logical_port} on unit {unit}"
            ))
        })
    }
}

// Insert keeping the list sorted high-priority first.  Writers of equal
// priority are served in registration order.
fn insert_by_priority<T>(list: &mut Vec<Registered<T>>, reg: Registered<T>) {
    let idx = list
        .iter()
        .position(|r| r.priority < reg.priority)
        .unwrap_or(list.len());
    list.insert(idx, reg);
}

fn remove_writer<T>(
    list: &mut Vec<Registered<T>>,
    id: WriterId,
) -> DriverResult<()> {
    match list.iter().position(|r| r.id == id) {
        Some(idx) => {
            list.remove(idx);
            Ok(())
        }
        None => Err(DriverError::InvalidArg(format!(
            "no event writer with id {id}"
        ))),
    }
}

/// A handle for a chaos driver.
pub struct Handle {
    state: Mutex<DriverState>,
    config: Mutex<AsicConfig>,
    log: Logger,
}

impl Handle {
    /// Create a new chaos driver with the provided logger and config.
    pub fn new(log: &Logger, config: &AsicConfig) -> Self {
        Handle {
            state: Mutex::new(DriverState::default()),
            config: Mutex::new(config.clone()),
            log: log.new(o!("unit" => "chaos_driver")),
        }
    }

    /// Replace the chaos settings, e.g. to start failing an operation that
    /// had been succeeding.
    pub fn update_config(&self, config: &AsicConfig) {
        *self.config.lock() = config.clone();
    }

    /// Deliver a link event to every registered link event writer, highest
    /// priority first.  Returns the number of writers that accepted it.
    pub fn inject_link_event(
        &self,
        unit: i32,
        logical_port: i32,
        state: PortState,
    ) -> usize {
        let event = LinkEvent {
            unit,
            logical_port,
            state,
        };
        let st = self.state.lock();
        let mut delivered = 0;
        for r in &st.link_writers {
            if r.writer.send(event) {
                delivered += 1;
            } else {
                warn!(self.log, "dropped link event";
                    "writer" => r.id, "asic_unit" => unit,
                    "logical_port" => logical_port);
            }
        }
        delivered
    }

    /// Deliver a transceiver event to every registered transceiver event
    /// writer, highest priority first.  Returns the number of writers that
    /// accepted it.
    pub fn inject_transceiver_event(
        &self,
        slot: i32,
        port: i32,
        state: HwState,
    ) -> usize {
        let event = TransceiverEvent { slot, port, state };
        let st = self.state.lock();
        let mut delivered = 0;
        for r in &st.xcvr_writers {
            if r.writer.send(event) {
                delivered += 1;
            } else {
                warn!(self.log, "dropped transceiver event";
                    "writer" => r.id, "slot" => slot, "port" => port);
            }
        }
        delivered
    }

    /// The options currently applied to a port, if it has been initialized.
    pub fn port(&self, unit: i32, logical_port: i32) -> Option<Port> {
        self.state.lock().ports.get(&(unit, logical_port)).cloned()
    }

    pub fn units(&self) -> Vec<i32> {
        self.state.lock().units.keys().copied().collect()
    }

    pub fn scanning_units(&self) -> Vec<i32> {
        self.state.lock().scanning.iter().copied().collect()
    }

    pub fn link_writer_count(&self) -> usize {
        self.state.lock().link_writers.len()
    }

    pub fn transceiver_writer_count(&self) -> usize {
        self.state.lock().xcvr_writers.len()
    }

    /// Seed the counters reported for a port.
    pub fn set_counters(
        &self,
        unit: i32,
        logical_port: i32,
        counters: PortCounters,
    ) -> DriverResult<()> {
        self.state.lock().port_mut(unit, logical_port)?.counters = counters;
        Ok(())
    }

    /// Every state-changing call made so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

/// A convenience macro for unfurling chaos. The $name should be a regular
/// `Chaos` member of [`AsicConfig`]. The `handle` is a [`Handle`] object.
macro_rules! unfurl {
    ($handle:ident, $name:ident) => {{
        let chaos = $handle.config.lock().$name;
        chaos.unfurled(&$handle.log, stringify!($name))?
    }};
}

impl HardwareDriver for Handle {
    fn init_unit(&self, unit: i32, chip: &ChipInit) -> DriverResult<()> {
        unfurl!(self, init_unit);
        let mut st = self.state.lock();
        st.units.insert(unit, *chip);
        st.calls.push(DriverCall::InitUnit { unit });
        debug!(self.log, "initialized unit";
            "asic_unit" => unit, "chip_type" => %chip.chip_type);
        Ok(())
    }

    fn init_port(&self, unit: i32, logical_port: i32) -> DriverResult<()> {
        unfurl!(self, init_port);
        let mut st = self.state.lock();
        if !st.units.contains_key(&unit) {
            return Err(DriverError::Uninitialized(format!("unit {unit}")));
        }
        st.ports.entry((unit, logical_port)).or_default();
        st.calls.push(DriverCall::InitPort { unit, logical_port });
        Ok(())
    }

    fn set_port_options(
        &self,
        unit: i32,
        logical_port: i32,
        options: &PortOptions,
    ) -> DriverResult<()> {
        unfurl!(self, set_port_options);
        if options.is_empty() {
            return Err(DriverError::InvalidArg(
                "no port options given".to_string(),
            ));
        }
        let mut st = self.state.lock();
        let applied = &mut st.port_mut(unit, logical_port)?.options;
        if options.enabled.is_some() {
            applied.enabled = options.enabled;
        }
        if options.blocked.is_some() {
            applied.blocked = options.blocked;
        }
        if options.speed_bps.is_some() {
            applied.speed_bps = options.speed_bps;
        }
        if options.num_serdes_lanes.is_some() {
            applied.num_serdes_lanes = options.num_serdes_lanes;
        }
        if options.loopback_mode.is_some() {
            applied.loopback_mode = options.loopback_mode;
        }
        st.calls.push(DriverCall::SetPortOptions {
            unit,
            logical_port,
            options: *options,
        });
        Ok(())
    }

    fn get_port_options(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> DriverResult<PortOptions> {
        unfurl!(self, get_port_options);
        let st = self.state.lock();
        Ok(st.port(unit, logical_port)?.options)
    }

    fn configure_serdes(
        &self,
        unit: i32,
        logical_port: i32,
        params: &SerdesParams,
    ) -> DriverResult<()> {
        unfurl!(self, configure_serdes);
        let mut st = self.state.lock();
        st.port_mut(unit, logical_port)?.serdes = Some(*params);
        st.calls
            .push(DriverCall::ConfigureSerdes { unit, logical_port });
        Ok(())
    }

    fn get_port_counters(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> DriverResult<PortCounters> {
        unfurl!(self, get_port_counters);
        let st = self.state.lock();
        Ok(st.port(unit, logical_port)?.counters)
    }

    fn start_link_scan(&self, unit: i32) -> DriverResult<()> {
        unfurl!(self, start_link_scan);
        let mut st = self.state.lock();
        if !st.units.contains_key(&unit) {
            return Err(DriverError::Uninitialized(format!("unit {unit}")));
        }
        st.scanning.insert(unit);
        st.calls.push(DriverCall::StartLinkScan { unit });
        Ok(())
    }

    fn register_link_event_writer(
        &self,
        writer: ChannelWriter<LinkEvent>,
        priority: i32,
    ) -> DriverResult<WriterId> {
        unfurl!(self, register_link_event_writer);
        let mut st = self.state.lock();
        let id = st.alloc_writer_id();
        insert_by_priority(
            &mut st.link_writers,
            Registered {
                id,
                priority,
                writer,
            },
        );
        Ok(id)
    }

    fn unregister_link_event_writer(&self, id: WriterId) -> DriverResult<()> {
        unfurl!(self, unregister_link_event_writer);
        remove_writer(&mut self.state.lock().link_writers, id)
    }

    fn register_transceiver_event_writer(
        &self,
        writer: ChannelWriter<TransceiverEvent>,
        priority: i32,
    ) -> DriverResult<WriterId> {
        unfurl!(self, register_transceiver_event_writer);
        let mut st = self.state.lock();
        let id = st.alloc_writer_id();
        insert_by_priority(
            &mut st.xcvr_writers,
            Registered {
                id,
                priority,
                writer,
            },
        );
        Ok(id)
    }

    fn unregister_transceiver_event_writer(
        &self,
        id: WriterId,
    ) -> DriverResult<()> {
        unfurl!(self, unregister_transceiver_event_writer);
        remove_writer(&mut self.state.lock().xcvr_writers, id)
    }

    fn shutdown_all_units(&self) -> DriverResult<()> {
        unfurl!(self, shutdown_all_units);
        let mut st = self.state.lock();
        st.units.clear();
        st.ports.clear();
        st.scanning.clear();
        st.calls.push(DriverCall::ShutdownAllUnits);
        Ok(())
    }
}
