// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::fs::OpenOptions;
use std::io;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use slog::o;
use slog::Drain;
use slog::Logger;

/// Selects between log output meant for people and log output meant for
/// machines.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Deserialize,
    Serialize,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Human,
    Json,
}

fn async_root<D>(drain: D) -> slog::Fuse<slog_async::Async>
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    slog_async::Async::new(drain).chan_size(0x2000).build().fuse()
}

fn build<W>(name: &'static str, w: W, format: LogFormat) -> Logger
where
    W: io::Write + Send + 'static,
{
    match format {
        LogFormat::Human => {
            let decorator = slog_term::PlainDecorator::new(w);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            Logger::root(async_root(drain), o!("name" => name))
        }
        // Bunyan records carry the name in their header.
        LogFormat::Json => {
            let drain = slog_bunyan::with_name(name, w).build().fuse();
            Logger::root(async_root(drain), o!())
        }
    }
}

/// Build the root logger for a daemon.  Output goes to `log_file` if one is
/// named, and to stdout otherwise.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<Logger> {
    let log = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            build(name, file, log_format)
        }
        None => build(name, io::stdout(), log_format),
    };
    Ok(log)
}
