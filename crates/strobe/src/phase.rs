// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Flash phase machine.
//!
//! A flash episode walks the phases below in order, skipping PreReady when
//! PRE_START is already pending and PreAf when the AF budget is a single
//! frame:
//!
//! ```text
//! Off -> PreCheck -> PreReady -> PreOn -> PreAeDone -> PreAf -> PreDone
//!     -> MainReady -> MainOn -> MainWait -> MainDone -> Off
//! ```
//!
//! [`Phase::arm`] covers the entry transitions taken while directives are
//! written for a frame, [`Phase::advance`] the transitions taken once the
//! hardware reported results. Every phase that waits on hardware carries its
//! own frame counter and advances when either the hardware reports readiness
//! or the counter reaches its budget.

use crate::config::FlashConfig;
use crate::metadata::{
    HardwareReport, CAPTURE_STATE_FLASH, DECISION_FLASH_REQUIRED, FLASH_OFF_READY_MAIN,
    FLASH_READY_AE_DONE, FLASH_READY_MAIN,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress marker of a flash episode, ordered by phase
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FlashStatus {
    #[default]
    Off,
    PreCheck,
    PreReady,
    PreOn,
    PreAeDone,
    PreAf,
    PreDone,
    MainReady,
    MainOn,
    MainWait,
    MainDone,
}

impl fmt::Display for FlashStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FlashStatus::Off => "OFF",
            FlashStatus::PreCheck => "PRE_CHECK",
            FlashStatus::PreReady => "PRE_READY",
            FlashStatus::PreOn => "PRE_ON",
            FlashStatus::PreAeDone => "PRE_AE_DONE",
            FlashStatus::PreAf => "PRE_AF",
            FlashStatus::PreDone => "PRE_DONE",
            FlashStatus::MainReady => "MAIN_READY",
            FlashStatus::MainOn => "MAIN_ON",
            FlashStatus::MainWait => "MAIN_WAIT",
            FlashStatus::MainDone => "MAIN_DONE",
        };
        f.write_str(name)
    }
}

/// Caller-driven trigger for advancing the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashStep {
    #[default]
    Off,
    PreStart,
    PreDone,
    MainStart,
    MainDone,
    Cancel,
    End,
}

impl fmt::Display for FlashStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FlashStep::Off => "OFF",
            FlashStep::PreStart => "PRE_START",
            FlashStep::PreDone => "PRE_DONE",
            FlashStep::MainStart => "MAIN_START",
            FlashStep::MainDone => "MAIN_DONE",
            FlashStep::Cancel => "CANCEL",
            FlashStep::End => "END",
        };
        f.write_str(name)
    }
}

/// Current phase together with the counter that belongs to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Off,
    PreCheck { timeout: u32 },
    PreReady,
    PreOn { timeout: u32 },
    PreAeDone,
    PreAf { timeout: u32 },
    PreDone { timeout: u32 },
    MainReady,
    MainOn { timeout: u32 },
    MainWait { frames: u32 },
    MainDone,
}

/// Why a phase was left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    /// the hardware reported the phase complete
    Hardware,
    /// the caller issued the step the phase waits for
    Step,
    /// the phase budget ran out
    Timeout,
    /// a fixed-length phase ran its course
    Settled,
}

/// Result of [`Phase::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub phase: Phase,
    pub reason: Option<AdvanceReason>,
}

impl Advance {
    fn stay(phase: Phase) -> Self {
        Advance {
            phase,
            reason: None,
        }
    }

    fn to(phase: Phase, reason: AdvanceReason) -> Self {
        Advance {
            phase,
            reason: Some(reason),
        }
    }
}

/// Count one more non-ready frame, returns the new count and whether the
/// budget is exhausted.
fn tick(count: u32, budget: u32) -> (u32, bool) {
    let count = count.saturating_add(1);
    (count, count >= budget)
}

/// Leave for `next` when `ready`, otherwise tick the counter and leave on
/// timeout or stay with the ticked counter built by `stay`.
fn wait_or_timeout(
    ready: bool,
    count: u32,
    budget: u32,
    next: Phase,
    ready_reason: AdvanceReason,
    stay: impl FnOnce(u32) -> Phase,
) -> Advance {
    if ready {
        return Advance::to(next, ready_reason);
    }

    match tick(count, budget) {
        (_, true) => Advance::to(next, AdvanceReason::Timeout),
        (count, false) => Advance::stay(stay(count)),
    }
}

impl Phase {
    /// Enter a phase with a fresh counter
    pub fn enter(status: FlashStatus) -> Phase {
        match status {
            FlashStatus::Off => Phase::Off,
            FlashStatus::PreCheck => Phase::PreCheck { timeout: 0 },
            FlashStatus::PreReady => Phase::PreReady,
            FlashStatus::PreOn => Phase::PreOn { timeout: 0 },
            FlashStatus::PreAeDone => Phase::PreAeDone,
            FlashStatus::PreAf => Phase::PreAf { timeout: 0 },
            FlashStatus::PreDone => Phase::PreDone { timeout: 0 },
            FlashStatus::MainReady => Phase::MainReady,
            FlashStatus::MainOn => Phase::MainOn { timeout: 0 },
            FlashStatus::MainWait => Phase::MainWait { frames: 0 },
            FlashStatus::MainDone => Phase::MainDone,
        }
    }

    pub fn status(&self) -> FlashStatus {
        match self {
            Phase::Off => FlashStatus::Off,
            Phase::PreCheck { .. } => FlashStatus::PreCheck,
            Phase::PreReady => FlashStatus::PreReady,
            Phase::PreOn { .. } => FlashStatus::PreOn,
            Phase::PreAeDone => FlashStatus::PreAeDone,
            Phase::PreAf { .. } => FlashStatus::PreAf,
            Phase::PreDone { .. } => FlashStatus::PreDone,
            Phase::MainReady => FlashStatus::MainReady,
            Phase::MainOn { .. } => FlashStatus::MainOn,
            Phase::MainWait { .. } => FlashStatus::MainWait,
            Phase::MainDone => FlashStatus::MainDone,
        }
    }

    /// Frames already spent waiting in this phase
    pub fn counter(&self) -> u32 {
        match *self {
            Phase::PreCheck { timeout }
            | Phase::PreOn { timeout }
            | Phase::PreAf { timeout }
            | Phase::PreDone { timeout }
            | Phase::MainOn { timeout } => timeout,
            Phase::MainWait { frames } => frames,
            _ => 0,
        }
    }

    /// Phases during which the main flash may be charged or discharging
    pub fn is_main_flash(&self) -> bool {
        matches!(
            self,
            Phase::MainReady | Phase::MainOn { .. } | Phase::MainWait { .. }
        )
    }

    /// Entry transition taken while the directives for a frame are written.
    /// A pending PRE_START arms the pre-flash on the first frame.
    pub fn arm(self, step: FlashStep) -> Phase {
        match self {
            Phase::Off | Phase::PreCheck { .. } if step == FlashStep::PreStart => {
                Phase::PreOn { timeout: 0 }
            }
            Phase::Off | Phase::PreCheck { .. } => Phase::PreReady,
            Phase::PreReady if step == FlashStep::PreStart => Phase::PreOn { timeout: 0 },
            Phase::MainReady if step == FlashStep::MainStart => Phase::MainOn { timeout: 0 },
            Phase::MainDone => Phase::Off,
            phase => phase,
        }
    }

    /// Transition taken once the hardware reported results for a frame
    pub fn advance(self, report: &HardwareReport, step: FlashStep, config: &FlashConfig) -> Advance {
        match self {
            Phase::PreCheck { timeout } => wait_or_timeout(
                report.decision == DECISION_FLASH_REQUIRED,
                timeout,
                config.timeout,
                Phase::PreReady,
                AdvanceReason::Hardware,
                |timeout| Phase::PreCheck { timeout },
            ),
            Phase::PreOn { timeout } => wait_or_timeout(
                report.flash_ready == FLASH_READY_AE_DONE,
                timeout,
                config.ae_timeout,
                Phase::PreAeDone,
                AdvanceReason::Hardware,
                |timeout| Phase::PreOn { timeout },
            ),
            // the AE lock frame is the first frame of the AF budget
            Phase::PreAeDone => match wait_or_timeout(
                step == FlashStep::PreDone,
                0,
                config.af_timeout,
                Phase::PreDone { timeout: 0 },
                AdvanceReason::Step,
                |timeout| Phase::PreAf { timeout },
            ) {
                Advance {
                    phase,
                    reason: None,
                } => Advance::to(phase, AdvanceReason::Settled),
                advance => advance,
            },
            Phase::PreAf { timeout } => wait_or_timeout(
                step == FlashStep::PreDone,
                timeout,
                config.af_timeout,
                Phase::PreDone { timeout: 0 },
                AdvanceReason::Step,
                |timeout| Phase::PreAf { timeout },
            ),
            Phase::PreDone { timeout } => wait_or_timeout(
                report.flash_ready == FLASH_READY_MAIN,
                timeout,
                config.timeout,
                Phase::MainReady,
                AdvanceReason::Hardware,
                |timeout| Phase::PreDone { timeout },
            ),
            Phase::MainOn { timeout } => wait_or_timeout(
                report.flash_off_ready == FLASH_OFF_READY_MAIN
                    || report.firing_stable == CAPTURE_STATE_FLASH,
                timeout,
                config.main_timeout,
                Phase::MainWait { frames: 0 },
                AdvanceReason::Hardware,
                |timeout| Phase::MainOn { timeout },
            ),
            Phase::MainWait { frames } => match tick(frames, config.main_wait) {
                (_, true) => Advance::to(Phase::MainDone, AdvanceReason::Settled),
                (frames, false) => Advance::stay(Phase::MainWait { frames }),
            },
            phase => Advance::stay(phase),
        }
    }
}
