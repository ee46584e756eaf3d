// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Context;
use signal_hook::consts::SIGHUP;
use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGQUIT;
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;
use slog::error;
use slog::info;
use structopt::StructOpt;

use chassisd::chassis_config::ChassisConfig;
use chassisd::config;
use chassisd::config::Opt;
use chassisd::hw_map;
use chassisd::ChassisManager;

#[derive(Debug, StructOpt)]
#[structopt(name = "chassisd", about = "chassis and port state manager")]
enum Args {
    /// Bring up the chassis and manage it until signalled.
    Run(Opt),
}

fn main() -> anyhow::Result<()> {
    let args = Args::from_args();

    match args {
        Args::Run(opt) => run_chassisd(opt),
    }
}

fn run_chassisd(opt: Opt) -> anyhow::Result<()> {
    let config = config::build_config(&opt)?;

    let log = common::logging::init(
        "chassisd",
        &config.log_file,
        config.log_format,
    )?;
    info!(log, "chassisd config: {config:#?}");

    let map_path = config
        .capability_map
        .as_ref()
        .ok_or_else(|| anyhow!("a capability map is required"))?;
    let capability_map = hw_map::load(map_path, &config.capability_map_id)
        .with_context(|| format!("loading capability map {map_path}"))?;

    let config_path = config
        .chassis_config
        .as_ref()
        .ok_or_else(|| anyhow!("a chassis config is required"))?;
    let chassis_config = ChassisConfig::load(config_path)
        .with_context(|| format!("loading chassis config {config_path}"))?;

    let driver = Arc::new(asic::chaos::Handle::new(&log, &config.asic_config));
    let manager = ChassisManager::new(&log, driver, capability_map);
    manager
        .push_chassis_config(&chassis_config)
        .context("pushing chassis config")?;
    info!(log, "chassis is up";
        "units" => ?manager.get_node_id_to_unit_map()?);

    let mut signals = Signals::new([SIGTERM, SIGQUIT, SIGINT, SIGHUP])
        .context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(log, "received signal"; "sig" => signal);
    }

    info!(log, "shutting down chassis");
    if let Err(e) = manager.shutdown() {
        error!(log, "chassis shutdown failed"; "error" => %e);
        return Err(e.into());
    }
    info!(log, "done");
    Ok(())
}
