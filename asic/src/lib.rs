// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Hardware driver backends.
//!
//! The only backend built here is the chaos driver: an in-memory model of a
//! switching chip that can be told to fail any operation with a configured
//! probability, and that lets its owner inject link and transceiver events as
//! if they came from the hardware.

pub mod chaos;

pub use chaos::Handle;
