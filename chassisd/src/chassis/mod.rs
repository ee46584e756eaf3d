// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The chassis manager: the owner of all chassis-level state.
//!
//! A config push is validated and turned into a target map, which the first
//! push uses to bring up the chips and ports.  Later pushes may only change
//! what can be changed without a restart.  Once the hardware is up, the
//! manager listens for link and transceiver events from the driver, keeps
//! its tables current, and publishes port state changes to a registered
//! [`NotificationSink`].
//!
//! Two locks protect the manager.  The chassis lock guards the tables, and
//! the notify lock guards the sink.  Where both are needed, the chassis lock
//! is taken first.

use std::sync::Arc;
use std::sync::Weak;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use parking_lot::RwLock;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use slog::Logger;

use aal::HardwareDriver;
use aal::EVENT_WRITER_PRIORITY_HIGH;
use common::channel::EventChannel;
use common::MAX_LINK_EVENT_DEPTH;
use common::MAX_XCVR_EVENT_DEPTH;

use crate::chassis_config::ChassisConfig;
use crate::event_reader;
use crate::event_reader::ReaderControl;
use crate::hw_map::HardwareCapabilityMap;
use crate::notify::ChassisEvent;
use crate::notify::NotificationSink;
use crate::topology;
use crate::topology::Topology;
use crate::types::ChassisError;
use crate::types::ChassisResult;
use crate::types::ErrorList;

mod events;
mod port_groups;
mod query;
mod state;

#[cfg(test)]
pub(crate) mod test_support;

use state::ChassisState;
use state::EventWriter;

pub struct ChassisManager {
    log: Logger,
    driver: Arc<dyn HardwareDriver>,
    capability_map: HardwareCapabilityMap,
    state: RwLock<ChassisState>,
    sink: Mutex<Option<Arc<dyn NotificationSink>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    // Handed to the event reader threads, so they don't keep the manager
    // alive on their own.
    me: Weak<ChassisManager>,
}

impl ChassisManager {
    /// Create a manager for the platform described by `capability_map`.
    /// Nothing is done to the hardware until the first config push.
    pub fn new(
        log: &Logger,
        driver: Arc<dyn HardwareDriver>,
        capability_map: HardwareCapabilityMap,
    ) -> Arc<Self> {
        let log = log.new(o!("unit" => "chassis"));
        Arc::new_cyclic(|me| ChassisManager {
            log,
            driver,
            capability_map,
            state: RwLock::new(ChassisState::default()),
            sink: Mutex::new(None),
            readers: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    /// Apply a chassis config.  The first successful push initializes the
    /// chips and ports and starts event handling.  Later pushes update the
    /// tables and port groups, and fail with
    /// [`ChassisError::RebootRequired`] if the config would need a different
    /// set of chips or ports.
    pub fn push_chassis_config(
        &self,
        config: &ChassisConfig,
    ) -> ChassisResult<()> {
        let mut state = self.state.write();
        if state.shutdown {
            return Err(ChassisError::Internal(
                "the chassis manager has been shut down".to_string(),
            ));
        }

        let topo = match topology::build(config, &self.capability_map) {
            Ok(topo) => topo,
            Err(e) => {
                error!(self.log, "invalid chassis config"; "error" => %e);
                return Err(e);
            }
        };

        if !state.initialized {
            if let Err(e) = self.bring_up(&mut state, config, topo) {
                error!(self.log, "chassis bring-up failed"; "error" => %e);
                if let Err(e) = self.unregister_event_writers(&mut state) {
                    warn!(self.log, "failed to unregister event writers";
                        "error" => %e);
                }
                state.clear_tables();
                let readers = std::mem::take(&mut *self.readers.lock());
                drop(state);
                if let Err(e) = self.join_readers(readers) {
                    warn!(self.log, "failed to stop event readers";
                        "error" => %e);
                }
                return Err(e);
            }
            state.initialized = true;
            info!(self.log, "chassis initialized";
                "nodes" => ?state.node_to_unit);
        } else {
            check_reboot_required(&state, &topo)?;
            state.sync(config, self.driver.as_ref(), &self.log)?;
            state.configure_port_groups(self.driver.as_ref(), &self.log)?;
            debug!(self.log, "chassis config applied");
        }

        if let Err(e) = state.check_invariants() {
            error!(self.log, "chassis state is inconsistent"; "error" => %e);
            return Err(e);
        }
        Ok(())
    }

    /// Check whether `config` could be pushed, without changing anything.
    pub fn verify_chassis_config(
        &self,
        config: &ChassisConfig,
    ) -> ChassisResult<()> {
        let state = self.state.read();
        let topo = topology::build(config, &self.capability_map)?;
        if state.initialized {
            check_reboot_required(&state, &topo)?;
        }
        Ok(())
    }

    /// Stop event handling and shut down the hardware.  The manager can't be
    /// used again afterwards.  Calling this more than once is harmless.
    pub fn shutdown(&self) -> ChassisResult<()> {
        let mut errors = ErrorList::new();
        let readers = {
            let mut state = self.state.write();
            if state.shutdown {
                return Ok(());
            }
            state.shutdown = true;
            errors.check(self.unregister_event_writers(&mut state));
            errors.check(
                self.driver.shutdown_all_units().map_err(ChassisError::from),
            );
            state.initialized = false;
            state.clear_tables();
            std::mem::take(&mut *self.readers.lock())
        };

        // The readers take the chassis lock to handle an event, so they can
        // only be waited for once it has been released.
        errors.check(self.join_readers(readers));

        info!(self.log, "chassis shut down");
        errors.into_result()
    }

    /// Install the sink that port state changes are published to, replacing
    /// any earlier one.
    pub fn register_event_notify_writer(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> ChassisResult<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    pub fn unregister_event_notify_writer(&self) -> ChassisResult<()> {
        *self.sink.lock() = None;
        Ok(())
    }

    // Must be called without the chassis lock held, and only after the
    // readers' channels have been closed.
    fn join_readers(&self, readers: Vec<JoinHandle<()>>) -> ChassisResult<()> {
        let mut errors = ErrorList::new();
        for reader in readers {
            if reader.join().is_err() {
                error!(self.log, "event reader thread panicked");
                errors.push(ChassisError::Internal(
                    "event reader thread panicked".to_string(),
                ));
            }
        }
        errors.into_result()
    }

    // A sink that refuses a write is dropped.
    fn publish(&self, event: ChassisEvent) {
        let mut sink = self.sink.lock();
        if let Some(s) = sink.as_ref() {
            if !s.write(event) {
                warn!(self.log, "notification sink closed, dropping it";
                    "event" => ?event);
                *sink = None;
            }
        }
    }

    fn bring_up(
        &self,
        state: &mut ChassisState,
        config: &ChassisConfig,
        topo: Topology,
    ) -> ChassisResult<()> {
        for chip in &topo.target.chips {
            self.driver.init_unit(chip.unit, &chip.init_params())?;
            debug!(self.log, "initialized unit";
                "asic_unit" => chip.unit, "chip_type" => %chip.chip_type);
        }
        for hp in &topo.target.ports {
            self.driver.init_port(hp.unit, hp.logical_port)?;
        }

        state.install_maps(topo.base, topo.target);
        state.sync(config, self.driver.as_ref(), &self.log)?;
        state.configure_port_groups(self.driver.as_ref(), &self.log)?;
        self.register_event_writers(state)
    }

    fn shutting_down(&self) -> impl Fn() -> bool + Send + 'static {
        let me = self.me.clone();
        move || me.upgrade().map_or(true, |m| m.state.read().shutdown)
    }

    // Each event type is registered at most once.  A writer that is already
    // in place is left alone, along with its reader thread.
    fn register_event_writers(
        &self,
        state: &mut ChassisState,
    ) -> ChassisResult<()> {
        if state.link_writer.is_none() {
            let link = EventChannel::new(MAX_LINK_EVENT_DEPTH);
            let id = self.driver.register_link_event_writer(
                link.writer(),
                EVENT_WRITER_PRIORITY_HIGH,
            )?;
            let reader = link.reader();
            state.link_writer = Some(EventWriter { id, channel: link });
            let me = self.me.clone();
            let handle = event_reader::spawn(
                "link_events",
                self.log.new(o!("unit" => "link_event_reader")),
                reader,
                self.shutting_down(),
                move |event| match me.upgrade() {
                    Some(m) => {
                        m.handle_link_event(event);
                        ReaderControl::Continue
                    }
                    None => ReaderControl::Stop,
                },
            )?;
            self.readers.lock().push(handle);
        } else {
            debug!(self.log, "link event writer already registered");
        }

        if state.xcvr_writer.is_none() {
            let xcvr = EventChannel::new(MAX_XCVR_EVENT_DEPTH);
            let id = self.driver.register_transceiver_event_writer(
                xcvr.writer(),
                EVENT_WRITER_PRIORITY_HIGH,
            )?;
            let reader = xcvr.reader();
            state.xcvr_writer = Some(EventWriter { id, channel: xcvr });
            let me = self.me.clone();
            let handle = event_reader::spawn(
                "transceiver_events",
                self.log.new(o!("unit" => "xcvr_event_reader")),
                reader,
                self.shutting_down(),
                move |event| match me.upgrade() {
                    Some(m) => {
                        m.handle_transceiver_event(event);
                        ReaderControl::Continue
                    }
                    None => ReaderControl::Stop,
                },
            )?;
            self.readers.lock().push(handle);
        } else {
            debug!(self.log, "transceiver event writer already registered");
        }

        for unit in state.unit_to_chip.keys() {
            self.driver.start_link_scan(*unit)?;
        }
        Ok(())
    }

    fn unregister_event_writers(
        &self,
        state: &mut ChassisState,
    ) -> ChassisResult<()> {
        let mut errors = ErrorList::new();
        if let Some(w) = state.link_writer.take() {
            errors.check(
                self.driver
                    .unregister_link_event_writer(w.id)
                    .map_err(ChassisError::from),
            );
            if !w.channel.close() {
                errors.push(ChassisError::Internal(
                    "link event channel is already closed".to_string(),
                ));
            }
        }
        if let Some(w) = state.xcvr_writer.take() {
            errors.check(
                self.driver
                    .unregister_transceiver_event_writer(w.id)
                    .map_err(ChassisError::from),
            );
            if !w.channel.close() {
                errors.push(ChassisError::Internal(
                    "transceiver event channel is already closed".to_string(),
                ));
            }
        }
        errors.into_result()
    }

    /// Verify the relationships between the manager's tables.
    pub fn check_invariants(&self) -> ChassisResult<()> {
        self.state.read().check_invariants()
    }
}

// Only a config that maps onto the hardware already brought up can be
// applied without a restart.
fn check_reboot_required(
    state: &ChassisState,
    topo: &Topology,
) -> ChassisResult<()> {
    if state.applied_map.as_ref() != Some(&topo.target) {
        return Err(ChassisError::RebootRequired(
            "the config changes the chips or ports in use".to_string(),
        ));
    }
    if state.node_to_unit != topo.node_to_unit {
        return Err(ChassisError::RebootRequired(
            "the config changes the node to unit mapping".to_string(),
        ));
    }
    Ok(())
}
