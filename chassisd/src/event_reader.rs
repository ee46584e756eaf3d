// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Background threads that pull hardware events off an [`EventChannel`] and
//! hand them to the chassis manager.
//!
//! [`EventChannel`]: common::channel::EventChannel

use std::thread;
use std::thread::JoinHandle;

use slog::debug;
use slog::info;
use slog::Logger;

use common::channel::ChannelError;
use common::channel::ChannelReader;

/// What the reader loop should do after handling an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReaderControl {
    Continue,
    Stop,
}

/// Spawn a thread that feeds every event arriving on `reader` into
/// `handler`.  Before each receive it asks `shutting_down` whether to keep
/// going.  The thread exits when that returns true, when the channel is
/// closed, or when the handler returns [`ReaderControl::Stop`].
pub fn spawn<T, S, H>(
    name: &str,
    log: Logger,
    reader: ChannelReader<T>,
    shutting_down: S,
    mut handler: H,
) -> std::io::Result<JoinHandle<()>>
where
    T: Send + 'static,
    S: Fn() -> bool + Send + 'static,
    H: FnMut(T) -> ReaderControl + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(move || {
        debug!(log, "event reader started");
        loop {
            if shutting_down() {
                break;
            }
            match reader.recv(None) {
                Ok(event) => {
                    if handler(event) == ReaderControl::Stop {
                        break;
                    }
                }
                Err(ChannelError::Cancelled) => break,
                Err(ChannelError::Timeout) => continue,
            }
        }
        info!(log, "event reader exiting");
    })
}
