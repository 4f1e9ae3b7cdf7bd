// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use clap::ValueEnum;
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use strobe::config::FlashConfig;
use strobe::flash::FlashRequest;
use strobe::metadata::{AeState, HardwareReport};

/// Flash request accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestArg {
    Off,
    Auto,
    On,
    Torch,
}

impl From<RequestArg> for FlashRequest {
    fn from(arg: RequestArg) -> Self {
        match arg {
            RequestArg::Off => FlashRequest::Off,
            RequestArg::Auto => FlashRequest::Auto,
            RequestArg::On => FlashRequest::On,
            RequestArg::Torch => FlashRequest::Torch,
        }
    }
}

/// AE state reported by frames the script does not cover
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeStateArg {
    Inactive,
    Searching,
    Converged,
    FlashRequired,
}

impl From<AeStateArg> for AeState {
    fn from(arg: AeStateArg) -> Self {
        match arg {
            AeStateArg::Inactive => AeState::Inactive,
            AeStateArg::Searching => AeState::Searching,
            AeStateArg::Converged => AeState::Converged,
            AeStateArg::FlashRequired => AeState::FlashRequired,
        }
    }
}

/// Install signal handler for graceful shutdown on Ctrl+C
///
/// Returns an Arc<AtomicBool> that will be set to true when SIGINT is received.
/// Check this flag once per frame to exit gracefully.
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}

/// Load the flash configuration from `path`, or from `STROBE_FLASH_CONFIG`
/// when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<FlashConfig, CliError> {
    let config = match path {
        Some(path) => FlashConfig::from_file(path)?,
        None => FlashConfig::from_env()?,
    };
    log::debug!("Flash config: {:?}", config);
    Ok(config)
}

/// Parse a hardware script: a JSON array with one report per frame
pub fn parse_script(json: &str) -> Result<Vec<HardwareReport>, CliError> {
    serde_json::from_str(json).map_err(|e| CliError::Config(format!("Invalid script: {}", e)))
}

pub fn load_script(path: &Path) -> Result<Vec<HardwareReport>, CliError> {
    let json = fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("Failed to read script {}: {}", path.display(), e))
    })?;
    let script = parse_script(&json)?;
    log::info!("Loaded {} scripted frames from {}", script.len(), path.display());
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let script = parse_script(
            r#"[
                {},
                {"flash_ready": 1},
                {"ae_state": "flash_required", "firing_stable": 2}
            ]"#,
        )
        .unwrap();

        assert_eq!(script.len(), 3);
        assert_eq!(script[0], HardwareReport::default());
        assert_eq!(script[1].flash_ready, 1);
        assert_eq!(script[2].ae_state, AeState::FlashRequired);
        assert_eq!(script[2].firing_stable, 2);
    }

    #[test]
    fn test_parse_script_invalid() {
        assert!(matches!(parse_script("{}"), Err(CliError::Config(_))));
        assert!(matches!(
            parse_script(r#"[{"ae_state": "dazzled"}]"#),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_load_script_missing_file() {
        let err = load_script(Path::new("/nonexistent/strobe-script.json")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_value_enums() {
        assert_eq!(FlashRequest::from(RequestArg::Auto), FlashRequest::Auto);
        assert_eq!(AeState::from(AeStateArg::FlashRequired), AeState::FlashRequired);
        assert_eq!(
            RequestArg::from_str("torch", true).unwrap(),
            RequestArg::Torch
        );
    }
}
