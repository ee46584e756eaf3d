// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for `chassisd`.

use structopt::StructOpt;

use asic::chaos::AsicConfig;
use common::logging::LogFormat;

use crate::types::ChassisResult;

#[derive(Debug, Default, StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        about = "log file",
        help = "send log data to this file instead of stdout"
    )]
    pub log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    pub log_format: Option<LogFormat>,

    #[structopt(long, about = "chassis config to push at startup (TOML)")]
    pub chassis_config: Option<String>,

    #[structopt(long, about = "hardware capability map file (TOML)")]
    pub capability_map: Option<String>,

    #[structopt(
        long,
        about = "id of the capability map to use, if the file holds several"
    )]
    pub capability_map_id: Option<String>,

    #[structopt(long, about = "chaos driver config file (TOML)")]
    pub chaos_config: Option<String>,
}

/// The run-time settings of the daemon.
#[derive(Debug)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,

    /// The chassis config pushed at startup.
    pub chassis_config: Option<String>,

    /// Where to find the hardware capability map.
    pub capability_map: Option<String>,

    /// Which capability map in the file to use.  The first one if not set.
    pub capability_map_id: String,

    /// Failure probabilities for the chaos driver.
    pub asic_config: AsicConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            log_format: LogFormat::Json,
            chassis_config: None,
            capability_map: None,
            capability_map_id: String::new(),
            asic_config: AsicConfig::default(),
        }
    }
}

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &Opt, config: &mut Config) -> ChassisResult<()> {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }

    if let Some(path) = &opts.chassis_config {
        config.chassis_config = Some(path.to_string());
    }

    if let Some(path) = &opts.capability_map {
        config.capability_map = Some(path.to_string());
    }

    if let Some(id) = &opts.capability_map_id {
        config.capability_map_id = id.to_string();
    }

    if let Some(path) = &opts.chaos_config {
        let txt = std::fs::read_to_string(path)?;
        config.asic_config = toml::from_str(&txt)?;
    }

    Ok(())
}

/// This builds a Config struct containing the tunable settings used to
/// adjust the daemon's behavior.
pub fn build_config(opts: &Opt) -> ChassisResult<Config> {
    let mut config = Config::default();
    update_from_cli(opts, &mut config)?;
    Ok(config)
}
