// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Environment variable naming a JSON file with a [`FlashConfig`]
pub const CONFIG_ENV: &str = "STROBE_FLASH_CONFIG";

/// Timeout budgets and wait limits for the flash sequencer.
///
/// Frame budgets count `after_capture` calls spent in a phase without the
/// hardware reporting readiness. Fields missing from a JSON file keep their
/// default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    /// frames to wait for the flash decision and for main-flash readiness
    pub timeout: u32,
    /// frames to wait for AE to converge under the pre-flash
    pub ae_timeout: u32,
    /// frames to wait for AF to finish under the pre-flash
    pub af_timeout: u32,
    /// frames to wait for the main flash to fire
    pub main_timeout: u32,
    /// frames to settle after the main flash fired
    pub main_wait: u32,
    /// frames between main-flash start and the first flash-lit frame
    pub capture_skip: u32,
    /// AE settle budget granted by a pre-flash start
    pub ae_settle_budget: i32,
    /// firing wait budget granted by a main-flash start
    pub firing_wait_budget: i32,
    pub max_ae_done_wait_ms: u64,
    pub max_pre_done_wait_ms: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            timeout: 5,
            ae_timeout: 10,
            af_timeout: 5,
            main_timeout: 10,
            main_wait: 3,
            capture_skip: 1,
            ae_settle_budget: 25,
            firing_wait_budget: 15,
            max_ae_done_wait_ms: 1000,
            max_pre_done_wait_ms: 3000,
        }
    }
}

impl FlashConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        log::debug!("Loaded flash config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Load the file named by `STROBE_FLASH_CONFIG`, or the defaults when
    /// the variable is not set.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Upper bound on frames for a complete episode in which the hardware
    /// never reports readiness: the sum of the five phase budgets. A waiting
    /// phase always spends at least one frame, even with a zero budget.
    pub fn liveness_bound(&self) -> u32 {
        [
            self.timeout,
            self.ae_timeout,
            self.af_timeout,
            self.main_timeout,
            self.main_wait,
        ]
        .iter()
        .fold(0u32, |bound, budget| bound.saturating_add((*budget).max(1)))
    }

    pub fn max_ae_done_wait(&self) -> Duration {
        Duration::from_millis(self.max_ae_done_wait_ms)
    }

    /// Main-ready wait limit, stretched for low frame rates
    pub fn max_pre_done_wait(&self, fps: u32) -> Duration {
        let scale = if fps > 0 { (30 / fps).max(1) } else { 1 };
        Duration::from_millis(self.max_pre_done_wait_ms.saturating_mul(u64::from(scale)))
    }
}
