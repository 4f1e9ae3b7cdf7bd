// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use serde::Serialize;
use std::path::PathBuf;
use strobe::config::FlashConfig;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Flash configuration file (default: $STROBE_FLASH_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    #[serde(flatten)]
    config: &'a FlashConfig,
    liveness_bound: u32,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    let config = utils::load_config(args.config.as_deref())?;
    let effective = EffectiveConfig {
        config: &config,
        liveness_bound: config.liveness_bound(),
    };

    let value = serde_json::to_value(&effective)
        .map_err(|e| CliError::General(format!("Failed to serialize config: {}", e)))?;

    if json {
        let json = serde_json::to_string_pretty(&value)
            .map_err(|e| CliError::General(format!("Failed to output JSON config: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    println!("=== Flash Configuration ===");
    if let Some(fields) = value.as_object() {
        for (key, value) in fields {
            println!("{:<22} {}", key, value);
        }
    }

    Ok(())
}
