// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Chassis and port state management for a switch.

pub mod chassis;
pub mod chassis_config;
pub mod config;
pub mod event_reader;
pub mod hw_map;
pub mod notify;
pub mod topology;
pub mod types;

pub use chassis::ChassisManager;
