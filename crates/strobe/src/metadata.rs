// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Shot metadata attached to every frame travelling through the 3AA stage.
//!
//! `ctl` holds the control directives the HAL requests for a frame and
//! `dm` holds the dynamic metadata the ISP reports back once the frame has
//! been processed. The vendor flash status fields are opaque integer codes
//! defined by the ISP firmware; the constants below name the values the
//! flash sequencer reacts to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `dm.flash.vendor_decision`: the AE algorithm decided a flash is required
pub const DECISION_FLASH_REQUIRED: u32 = 2;

/// `dm.flash.vendor_flash_ready`: AE converged under the pre-flash
pub const FLASH_READY_AE_DONE: u32 = 1;

/// `dm.flash.vendor_flash_ready`: the flash is charged for the main capture
pub const FLASH_READY_MAIN: u32 = 2;

/// `dm.flash.vendor_flash_ready`: the flash has been turned off
pub const FLASH_READY_OFF: u32 = 3;

/// `dm.flash.vendor_flash_off_ready`: the main flash finished firing
pub const FLASH_OFF_READY_MAIN: u32 = 2;

/// `dm.flash.vendor_firing_stable`: this frame was exposed under the main flash
pub const CAPTURE_STATE_FLASH: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeState {
    #[default]
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
    LockedConverged,
    LockedFlashRequired,
}

impl AeState {
    /// Converged states in which AUTO flash is not needed
    pub fn is_converged(self) -> bool {
        matches!(self, AeState::Converged | AeState::LockedConverged)
    }

    /// States in which AUTO flash must fire
    pub fn is_flash_required(self) -> bool {
        matches!(self, AeState::FlashRequired | AeState::LockedFlashRequired)
    }
}

/// Vendor AE flash mode, the directive the ISP firmware acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeFlashMode {
    #[default]
    Off,
    On,
    Start,
    Cancel,
    OnAlways,
    Auto,
    Capture,
}

impl fmt::Display for AeFlashMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AeFlashMode::Off => write!(f, "off"),
            AeFlashMode::On => write!(f, "on"),
            AeFlashMode::Start => write!(f, "start"),
            AeFlashMode::Cancel => write!(f, "cancel"),
            AeFlashMode::OnAlways => write!(f, "on-always"),
            AeFlashMode::Auto => write!(f, "auto"),
            AeFlashMode::Capture => write!(f, "capture"),
        }
    }
}

/// Classic flash mode, left at `None` when the vendor mode drives the flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    #[default]
    Off,
    None,
    Single,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeMode {
    #[default]
    Off,
    On,
    Locked,
    Center,
    Spot,
    Matrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwbMode {
    #[default]
    Off,
    Auto,
    Locked,
    Incandescent,
    Fluorescent,
    Daylight,
    Cloudy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeLock {
    #[default]
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwbLock {
    #[default]
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AaControl {
    pub vendor_aeflash_mode: AeFlashMode,
    pub ae_mode: AeMode,
    pub ae_lock: AeLock,
    pub awb_mode: AwbMode,
    pub awb_lock: AwbLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashControl {
    pub flash_mode: FlashMode,
    pub firing_time: u64,
    pub firing_power: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorControl {
    /// exposure time in nanoseconds, 0 leaves exposure to AE
    pub exposure_time: u64,
}

/// Control directives requested for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotControl {
    pub aa: AaControl,
    pub flash: FlashControl,
    pub sensor: SensorControl,
}

impl ShotControl {
    /// Request a vendor AE flash mode. The classic flash fields are always
    /// cleared, the vendor mode is what drives the flash.
    pub fn set_aeflash(&mut self, mode: AeFlashMode) {
        self.aa.vendor_aeflash_mode = mode;
        self.flash.flash_mode = FlashMode::None;
        self.flash.firing_time = 0;
        self.flash.firing_power = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AaDynamic {
    pub ae_state: AeState,
    pub vendor_aeflash_mode: AeFlashMode,
}

/// Flash status codes reported by the ISP firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashDynamic {
    pub vendor_decision: u32,
    pub vendor_flash_ready: u32,
    pub vendor_flash_off_ready: u32,
    pub vendor_firing_stable: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDynamic {
    pub frame_count: u32,
}

/// Dynamic metadata reported for a processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotDynamic {
    pub aa: AaDynamic,
    pub flash: FlashDynamic,
    pub request: RequestDynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotMetadata {
    pub ctl: ShotControl,
    pub dm: ShotDynamic,
}

/// A frame buffer as seen by the flash sequencer: a buffer index and the
/// shot metadata plane, which may be missing when the plane was not mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    pub index: usize,
    pub shot: Option<ShotMetadata>,
}

impl CaptureBuffer {
    pub fn new(index: usize) -> Self {
        CaptureBuffer {
            index,
            shot: Some(ShotMetadata::default()),
        }
    }

    /// A buffer whose metadata plane is missing
    pub fn without_metadata(index: usize) -> Self {
        CaptureBuffer { index, shot: None }
    }

    pub fn shot(&self) -> Option<&ShotMetadata> {
        self.shot.as_ref()
    }

    pub fn shot_mut(&mut self) -> Option<&mut ShotMetadata> {
        self.shot.as_mut()
    }

    /// Set the request frame count, no-op without metadata
    pub fn set_frame_count(&mut self, frame_count: u32) {
        if let Some(shot) = self.shot.as_mut() {
            shot.dm.request.frame_count = frame_count;
        }
    }

    /// Overwrite the reported dynamic metadata while keeping the frame count
    pub fn report(&mut self, report: &HardwareReport) {
        if let Some(shot) = self.shot.as_mut() {
            shot.dm.aa.ae_state = report.ae_state;
            shot.dm.aa.vendor_aeflash_mode = report.aeflash_mode;
            shot.dm.flash = FlashDynamic {
                vendor_decision: report.decision,
                vendor_flash_ready: report.flash_ready,
                vendor_flash_off_ready: report.flash_off_ready,
                vendor_firing_stable: report.firing_stable,
            };
        }
    }
}

/// The subset of dynamic metadata the flash sequencer consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareReport {
    pub ae_state: AeState,
    pub aeflash_mode: AeFlashMode,
    pub decision: u32,
    pub flash_ready: u32,
    pub flash_off_ready: u32,
    pub firing_stable: u32,
    pub frame_count: u32,
}

impl HardwareReport {
    /// A report in which no flash status code is set
    pub fn not_ready(ae_state: AeState) -> Self {
        HardwareReport {
            ae_state,
            ..Default::default()
        }
    }
}

impl From<&ShotDynamic> for HardwareReport {
    fn from(dm: &ShotDynamic) -> Self {
        HardwareReport {
            ae_state: dm.aa.ae_state,
            aeflash_mode: dm.aa.vendor_aeflash_mode,
            decision: dm.flash.vendor_decision,
            flash_ready: dm.flash.vendor_flash_ready,
            flash_off_ready: dm.flash.vendor_flash_off_ready,
            firing_stable: dm.flash.vendor_firing_stable,
            frame_count: dm.request.frame_count,
        }
    }
}
