// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use common::channel::ChannelWriter;

mod events;
pub use events::*;

mod ports;
pub use ports::*;

/// A specialized Result type for hardware driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Identifies an event writer registered with the driver.
pub type WriterId = u32;

/// Writers registered at this priority are handed events ahead of any
/// lower-priority writer.
pub const EVENT_WRITER_PRIORITY_HIGH: i32 = 100;
pub const EVENT_WRITER_PRIORITY_LOW: i32 = 10;

/// Error type conveying additional information about driver errors
#[derive(Error, Debug)]
pub enum DriverError {
    /// Error reported by the vendor SDK.  This will report both the location
    /// in the driver layer that detected the error, as well as the detailed
    /// error message from the SDK.
    #[error("SDK error at {ctx}: {err}")]
    SdkError { ctx: String, err: String },
    /// An argument passed to the driver is invalid or inappropriate.  This
    /// indicates misbehavior from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// A driver function was called before the unit was initialized.
    /// Indicates misbehavior from the caller.
    #[error("Unit uninitialized: {}", .0)]
    Uninitialized(String),
    /// This operation is unsupported by the chip being driven
    #[error("Operation unsupported by the driver")]
    OperationUnsupported,
    /// The driver layer detected some internal inconsistency
    #[error("Internal error: {}", .0)]
    Internal(String),
    /// An error derived from a purposely triggered synthetic fault for testing
    /// purposes.
    #[error("Synthetic driver error: {}", .0)]
    Synthetic(String),
    /// A general indication that a caller is trying to modify something that
    /// is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
}

/// The switching chip families the driver knows how to bring up.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChipType {
    TridentPlus,
    Trident2,
    Tomahawk,
}

/// Everything the driver needs to locate and attach a unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChipInit {
    pub chip_type: ChipType,
    pub module: i32,
    pub pci_bus: i32,
    pub pci_slot: i32,
}

/// The `HardwareDriver` trait contains all of the operations the chassis
/// manager requires from the vendor SDK.  Implementations are shared between
/// the caller's threads and the event reader threads, and must be safe to use
/// from several threads at once.
pub trait HardwareDriver: Send + Sync {
    /// Find, attach and initialize a single unit.
    fn init_unit(&self, unit: i32, chip: &ChipInit) -> DriverResult<()>;

    /// Initialize a logical port on an already initialized unit.
    fn init_port(&self, unit: i32, logical_port: i32) -> DriverResult<()>;

    /// Apply the options that are set in `options`.  Options left unset are
    /// not touched.
    fn set_port_options(
        &self,
        unit: i32,
        logical_port: i32,
        options: &PortOptions,
    ) -> DriverResult<()>;

    /// Read back the options currently applied to a logical port.
    fn get_port_options(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> DriverResult<PortOptions>;

    /// Program the SerDes lanes backing a logical port.
    fn configure_serdes(
        &self,
        unit: i32,
        logical_port: i32,
        params: &SerdesParams,
    ) -> DriverResult<()>;

    /// Fetch the current counters for a logical port.
    fn get_port_counters(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> DriverResult<PortCounters>;

    /// Begin scanning the unit's ports for link changes.  Changes are
    /// delivered to the registered link event writers.
    fn start_link_scan(&self, unit: i32) -> DriverResult<()>;

    /// Hand the driver a writer on which to publish link events.
    fn register_link_event_writer(
        &self,
        writer: ChannelWriter<LinkEvent>,
        priority: i32,
    ) -> DriverResult<WriterId>;

    fn unregister_link_event_writer(&self, id: WriterId) -> DriverResult<()>;

    /// Hand the driver a writer on which to publish transceiver
    /// insertion/removal events.
    fn register_transceiver_event_writer(
        &self,
        writer: ChannelWriter<TransceiverEvent>,
        priority: i32,
    ) -> DriverResult<WriterId>;

    fn unregister_transceiver_event_writer(
        &self,
        id: WriterId,
    ) -> DriverResult<()>;

    /// Detach and shut down every unit.
    fn shutdown_all_units(&self) -> DriverResult<()>;
}
