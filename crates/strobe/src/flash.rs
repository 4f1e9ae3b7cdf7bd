// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Per-frame flash sequencer.
//!
//! The sequencer runs on the capture pipeline thread and is invoked once per
//! frame: [`FlashSequencer::before_capture`] fills the control directives of
//! the frame about to be submitted, [`FlashSequencer::after_capture`] reads
//! the results the ISP reported for it. Steps issued through
//! [`FlashSequencer::set_flash_step`] are the only external triggers; every
//! other transition is derived from the reported metadata or from the phase
//! budgets in [`FlashConfig`].
//!
//! Nothing on the per-frame path fails. A frame without shot metadata is
//! logged and skipped, the next frame retries.

use crate::config::FlashConfig;
use crate::metadata::{
    AeFlashMode, AeLock, AeMode, AeState, AwbLock, AwbMode, CaptureBuffer, HardwareReport,
    ShotControl, CAPTURE_STATE_FLASH, FLASH_READY_OFF,
};
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::phase::{AdvanceReason, FlashStatus, FlashStep};

/// Flash behavior requested by the application or the AE algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashRequest {
    #[default]
    Off,
    Auto,
    On,
    Torch,
}

impl fmt::Display for FlashRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlashRequest::Off => write!(f, "off"),
            FlashRequest::Auto => write!(f, "auto"),
            FlashRequest::On => write!(f, "on"),
            FlashRequest::Torch => write!(f, "torch"),
        }
    }
}

/// User action that started the flash sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashTrigger {
    #[default]
    Off,
    Auto,
    Button,
    LongButton,
    TouchDisplay,
    Manual,
}

/// A phase change observed by [`FlashSequencer::after_capture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: FlashStatus,
    pub to: FlashStatus,
    pub reason: AdvanceReason,
    pub frame_count: u32,
}

#[derive(Debug, Clone)]
pub struct FlashSequencer {
    config: FlashConfig,

    request: FlashRequest,
    step: FlashStep,
    phase: Phase,
    trigger: FlashTrigger,

    /// status seen by the previous before_capture, for change logging
    pre_status: FlashStatus,
    last_transition: Option<Transition>,

    ae_mode: AeMode,
    awb_mode: AwbMode,
    ae_lock: bool,
    awb_lock: bool,
    manual_exposure_time: u64,

    /// AE state the request logic acts on, frozen while capturing
    ae_state: AeState,
    pre_ae_state: AeState,
    /// AE state of the latest reported frame
    cur_ae_state: AeState,
    /// vendor AE flash mode of the latest reported frame
    aeflash_mode: AeFlashMode,

    need_flash: bool,
    need_capture_flash: bool,
    need_flash_off_delay: bool,
    is_pre_flash: bool,
    is_flash_off: bool,
    is_capture: bool,
    is_recording: bool,
    main_flash_firing: bool,
    cancel_pending: bool,
    wait_cancel: bool,

    waiting_count: i32,
    step_frame_count: i32,
    ae_wait_max_count: i32,

    current_isp_input_fcount: u32,
    main_capture_fcount: u32,
    check_main_capture_fcount: bool,
    shot_fcount: u32,
    fps: u32,

    completed_episodes: u64,
}

impl Default for FlashSequencer {
    fn default() -> Self {
        Self::new(FlashConfig::default())
    }
}

impl FlashSequencer {
    pub fn new(config: FlashConfig) -> Self {
        FlashSequencer {
            config,
            request: FlashRequest::Off,
            step: FlashStep::Off,
            phase: Phase::Off,
            trigger: FlashTrigger::Off,
            pre_status: FlashStatus::Off,
            last_transition: None,
            ae_mode: AeMode::Off,
            awb_mode: AwbMode::Off,
            ae_lock: false,
            awb_lock: false,
            manual_exposure_time: 0,
            ae_state: AeState::Inactive,
            pre_ae_state: AeState::Inactive,
            cur_ae_state: AeState::Inactive,
            aeflash_mode: AeFlashMode::Off,
            need_flash: false,
            need_capture_flash: true,
            need_flash_off_delay: false,
            is_pre_flash: false,
            is_flash_off: false,
            is_capture: false,
            is_recording: false,
            main_flash_firing: false,
            cancel_pending: false,
            wait_cancel: false,
            waiting_count: -1,
            step_frame_count: -1,
            ae_wait_max_count: 0,
            current_isp_input_fcount: 0,
            main_capture_fcount: 0,
            check_main_capture_fcount: false,
            shot_fcount: 0,
            fps: 1,
            completed_episodes: 0,
        }
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Write the flash control directives for the frame about to be
    /// submitted. Returns false when the frame was skipped.
    pub fn before_capture(&mut self, buffer: &mut CaptureBuffer) -> bool {
        let index = buffer.index;
        let Some(shot) = buffer.shot.as_mut() else {
            log::error!("Buffer {}: shot metadata is missing, skipping directives", index);
            return false;
        };

        self.current_isp_input_fcount = shot.dm.request.frame_count;

        log::trace!(
            "before fcount {}: req={} status={} step={}",
            self.current_isp_input_fcount,
            self.request,
            self.status(),
            self.step
        );

        if self.pre_status != self.status() {
            log::debug!(
                "req={} status={} step={}",
                self.request,
                self.status(),
                self.step
            );
            self.pre_status = self.status();
        }

        if self.pre_ae_state != self.ae_state {
            log::trace!("aeState={:?}", self.ae_state);
            self.pre_ae_state = self.ae_state;
        }

        if self.step_frame_count >= 0 {
            self.step_frame_count = self.step_frame_count.saturating_add(1);
        }

        let ctl = &mut shot.ctl;

        if self.step == FlashStep::Cancel && self.cancel_pending {
            if !self.is_main_flash_firing() {
                self.need_flash = false;

                ctl.set_aeflash(AeFlashMode::Cancel);
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;

                self.waiting_count = -1;
                self.step_frame_count = -1;
                self.check_main_capture_fcount = false;
                self.cancel_pending = false;
                self.is_capture = false;

                log::debug!("Flash cancelled at fcount {}", self.current_isp_input_fcount);
                return true;
            }

            log::warn!("Main flash is firing, deferring flash cancel");
        }

        match self.request {
            FlashRequest::Off => {
                self.need_flash = false;
                if self.aeflash_mode == AeFlashMode::OnAlways {
                    self.need_flash_off_delay = true;
                }

                ctl.set_aeflash(AeFlashMode::Off);

                self.waiting_count = -1;
                self.step_frame_count = -1;
                self.step = FlashStep::Off;
                self.reset_phase();
                self.check_main_capture_fcount = false;
            }
            FlashRequest::Torch => {
                self.need_flash = true;
                ctl.set_aeflash(AeFlashMode::OnAlways);
                self.waiting_count = -1;
            }
            FlashRequest::On => {
                self.need_flash = true;
                self.run_episode(ctl);
            }
            FlashRequest::Auto => {
                if self.ae_state == AeState::Inactive || self.ae_state.is_converged() {
                    self.need_flash = false;

                    ctl.set_aeflash(AeFlashMode::Off);

                    self.reset_phase();
                    self.step = FlashStep::Off;
                    if self.ae_state.is_converged() {
                        self.is_pre_flash = false;
                    }
                    self.check_main_capture_fcount = false;
                    self.waiting_count = -1;
                } else if self.ae_state.is_flash_required() {
                    self.need_flash = true;
                    self.run_episode(ctl);
                } else {
                    log::trace!("AE state {:?}, holding {}", self.ae_state, self.status());
                }
            }
        }

        true
    }

    /// Directives and entry transitions of an episode, shared by the ON
    /// request and the AUTO request once AE reports that flash is required.
    fn run_episode(&mut self, ctl: &mut ShotControl) {
        // a committed main flash keeps going while a cancel is deferred
        let step = if self.is_main_flash_firing() {
            FlashStep::MainStart
        } else {
            self.step
        };

        match self.phase {
            Phase::Off | Phase::PreCheck { .. } | Phase::PreReady
                if step == FlashStep::PreStart =>
            {
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;
                ctl.set_aeflash(AeFlashMode::Start);
                ctl.aa.ae_lock = AeLock::Off;
                ctl.aa.awb_lock = AwbLock::On;
                self.ae_wait_max_count = self.ae_wait_max_count.saturating_sub(1);
            }
            Phase::Off | Phase::PreCheck { .. } => {
                ctl.set_aeflash(AeFlashMode::Off);
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;
            }
            Phase::PreReady => {
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;
            }
            Phase::PreOn { .. } => {
                ctl.set_aeflash(AeFlashMode::On);
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.ae_lock = AeLock::Off;
                ctl.aa.awb_lock = AwbLock::On;
                self.ae_wait_max_count = self.ae_wait_max_count.saturating_sub(1);
            }
            Phase::PreAeDone | Phase::PreAf { .. } => {
                ctl.set_aeflash(AeFlashMode::On);
                ctl.aa.ae_lock = AeLock::On;
                ctl.aa.awb_lock = AwbLock::On;
                self.ae_wait_max_count = 0;
            }
            Phase::PreDone { .. } => {
                self.apply_locks(ctl);
                ctl.set_aeflash(AeFlashMode::Auto);
                self.waiting_count = -1;
                self.ae_wait_max_count = 0;
            }
            Phase::MainReady => {
                if self.manual_exposure_time != 0 {
                    ctl.sensor.exposure_time = self.manual_exposure_time;
                }
                self.apply_locks(ctl);

                if step == FlashStep::MainStart {
                    log::debug!("Main flash start (fcount {})", self.current_isp_input_fcount);
                    self.main_flash_firing = true;

                    // AE and AWB run unlocked during the capture
                    ctl.aa.ae_mode = self.ae_mode;
                    ctl.aa.awb_mode = self.awb_mode;
                    ctl.set_aeflash(AeFlashMode::Capture);

                    self.count_down_waiting();
                    self.ae_wait_max_count = 0;
                }
            }
            Phase::MainOn { .. } | Phase::MainWait { .. } => {
                log::debug!(
                    "Flash status {} (fcount {})",
                    self.status(),
                    self.current_isp_input_fcount
                );
                ctl.set_aeflash(AeFlashMode::Capture);
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;

                self.count_down_waiting();
                self.ae_wait_max_count = 0;
            }
            Phase::MainDone => {
                ctl.set_aeflash(AeFlashMode::Off);
                ctl.aa.ae_mode = self.ae_mode;
                ctl.aa.awb_mode = self.awb_mode;

                self.waiting_count = -1;
                self.ae_wait_max_count = 0;
            }
        }

        self.phase = self.phase.arm(step);
    }

    fn apply_locks(&self, ctl: &mut ShotControl) {
        let touch = self.trigger == FlashTrigger::TouchDisplay;

        if self.ae_lock && !touch {
            ctl.aa.ae_lock = AeLock::On;
        } else {
            ctl.aa.ae_mode = self.ae_mode;
        }

        if self.awb_lock && !touch {
            ctl.aa.awb_lock = AwbLock::On;
        } else {
            ctl.aa.awb_mode = self.awb_mode;
        }
    }

    fn count_down_waiting(&mut self) {
        self.waiting_count = self.waiting_count.saturating_sub(1).max(-1);
    }

    fn reset_phase(&mut self) {
        self.phase = Phase::Off;
        self.main_flash_firing = false;
    }

    /// Harvest the flash and AE status reported for a processed frame and
    /// advance the phase. Returns false when the frame was skipped.
    pub fn after_capture(&mut self, buffer: &mut CaptureBuffer) -> bool {
        let index = buffer.index;
        let Some(shot) = buffer.shot.as_mut() else {
            log::error!("Buffer {}: shot metadata is missing, skipping status", index);
            return false;
        };

        self.last_transition = None;

        let report = HardwareReport::from(&shot.dm);

        if !self.is_capture {
            self.ae_state = report.ae_state;
        }
        self.cur_ae_state = report.ae_state;

        if matches!(
            report.ae_state,
            AeState::LockedConverged | AeState::LockedFlashRequired
        ) {
            shot.dm.aa.ae_state = AeState::Locked;
        }

        if self.step == FlashStep::Cancel && !self.cancel_pending {
            self.step = FlashStep::Off;
            self.reset_phase();
            return true;
        }

        if self.request == FlashRequest::Off && report.flash_ready == FLASH_READY_OFF {
            log::trace!("Flash reported off (fcount {})", report.frame_count);
            self.is_flash_off = true;
        }

        let from = self.phase;
        let advance = from.advance(&report, self.step, &self.config);
        self.phase = advance.phase;

        if let Some(reason) = advance.reason {
            let to = advance.phase.status();

            if reason == AdvanceReason::Timeout {
                log::warn!(
                    "{} timed out after {} frames (fcount {})",
                    from.status(),
                    from.counter().saturating_add(1),
                    report.frame_count
                );
            } else {
                log::debug!(
                    "{} -> {} ({:?}, fcount {})",
                    from.status(),
                    to,
                    reason,
                    report.frame_count
                );
            }

            if from.status() == FlashStatus::MainOn
                && report.firing_stable == CAPTURE_STATE_FLASH
            {
                self.shot_fcount = report.frame_count;
                log::debug!("Flash lit frame {}", self.shot_fcount);
            }

            if to == FlashStatus::MainDone {
                self.main_flash_firing = false;
                self.waiting_count = -1;
                self.completed_episodes += 1;
                log::info!(
                    "Flash episode {} complete (fcount {})",
                    self.completed_episodes,
                    report.frame_count
                );
            }

            self.last_transition = Some(Transition {
                from: from.status(),
                to,
                reason,
                frame_count: report.frame_count,
            });
        }

        self.aeflash_mode = report.aeflash_mode;

        log::trace!(
            "after fcount {}: aeState={:?} status={} decision={} flashReady={} flashOffReady={} firingStable={}",
            report.frame_count,
            self.ae_state,
            self.status(),
            report.decision,
            report.flash_ready,
            report.flash_off_ready,
            report.firing_stable
        );

        true
    }

    /// Sensor-stage hook: while the main-capture check is enabled, the
    /// waiting count tracks the frames left until the flash-lit frame.
    pub fn after_sensor(&mut self, buffer: &CaptureBuffer) -> bool {
        let Some(shot) = buffer.shot.as_ref() else {
            log::error!("Buffer {}: shot metadata is missing", buffer.index);
            return false;
        };

        if self.check_main_capture_fcount {
            let remaining = self.check_main_capture_fcount(shot.dm.request.frame_count);
            self.waiting_count = i32::try_from(remaining).unwrap_or(i32::MAX);
            log::trace!("waitingCount={}", self.waiting_count);
        }

        true
    }

    /// Set the caller-driven step. Always returns true.
    pub fn set_flash_step(&mut self, step: FlashStep) -> bool {
        self.step = step;

        match step {
            FlashStep::Off => {
                self.waiting_count = -1;
                self.ae_wait_max_count = 0;
                self.check_main_capture_fcount = false;
                self.cancel_pending = false;
                self.reset_phase();
                self.is_pre_flash = false;
                self.is_capture = false;
                self.manual_exposure_time = 0;
            }
            FlashStep::PreStart => {
                self.ae_wait_max_count = self.config.ae_settle_budget;
                self.is_pre_flash = true;
                self.is_flash_off = false;
                self.main_flash_firing = false;
                self.wait_cancel = false;

                let restart = matches!(
                    self.status(),
                    FlashStatus::PreDone | FlashStatus::MainReady
                ) && matches!(
                    self.trigger,
                    FlashTrigger::LongButton | FlashTrigger::TouchDisplay
                );
                if restart {
                    self.phase = Phase::Off;
                }
            }
            FlashStep::PreDone | FlashStep::End => {}
            FlashStep::MainStart => {
                // firing starts once the main flash is charged
                self.main_flash_firing = self.phase.is_main_flash();
                self.set_should_checked_fcount(
                    self.current_isp_input_fcount
                        .wrapping_add(self.config.capture_skip),
                );
                self.waiting_count = self.config.firing_wait_budget;
                self.phase = Phase::enter(self.status());
                self.check_main_capture_fcount = false;
            }
            FlashStep::MainDone => {
                self.waiting_count = -1;
                self.check_main_capture_fcount = false;
                self.is_pre_flash = false;
                self.main_flash_firing = false;
            }
            FlashStep::Cancel => {
                self.cancel_pending = true;
                self.wait_cancel = true;
                self.need_capture_flash = true;
                self.is_pre_flash = false;
            }
        }

        log::debug!("flashStep={}", step);

        self.step_frame_count = if step == FlashStep::Off { -1 } else { 0 };

        true
    }

    /// Change the flash request; a new request restarts from step OFF.
    pub fn set_flash_req(&mut self, request: FlashRequest) -> bool {
        if self.request != request {
            self.request = request;
            self.set_flash_step(FlashStep::Off);
            if !self.is_recording {
                self.need_capture_flash = true;
            }
            log::debug!("flashReq={}", request);
        }

        match request {
            FlashRequest::On => self.need_flash = true,
            FlashRequest::Torch => self.need_capture_flash = false,
            FlashRequest::Off => {
                self.need_capture_flash = false;
                self.is_flash_off = false;
            }
            FlashRequest::Auto => {}
        }

        true
    }

    /// Change the flash request only when the caller overrides flash control
    pub fn set_flash_req_override(&mut self, request: FlashRequest, override_control: bool) -> bool {
        if override_control {
            return self.set_flash_req(request);
        }
        true
    }

    /// Force the phase, with a fresh counter
    pub fn set_flash_status(&mut self, status: FlashStatus) {
        self.phase = Phase::enter(status);
        log::trace!("flashStatus={}", status);
    }

    pub fn set_flash_trigger(&mut self, trigger: FlashTrigger) {
        self.trigger = trigger;
        log::debug!("flashTrigger={:?}", trigger);
    }

    pub fn set_ae_mode(&mut self, mode: AeMode) {
        self.ae_mode = mode;
    }

    pub fn set_awb_mode(&mut self, mode: AwbMode) {
        self.awb_mode = mode;
    }

    pub fn set_ae_lock(&mut self, lock: bool) {
        self.ae_lock = lock;
    }

    pub fn set_awb_lock(&mut self, lock: bool) {
        self.awb_lock = lock;
    }

    /// Exposure time in nanoseconds applied to the main capture, 0 disables
    pub fn set_manual_exposure_time(&mut self, exposure_time: u64) {
        log::debug!("exposureTime={}", exposure_time);
        self.manual_exposure_time = exposure_time;
    }

    /// While capturing, reported AE states no longer reach the request logic
    pub fn set_capture_status(&mut self, is_capture: bool) {
        self.is_capture = is_capture;
    }

    pub fn set_recording_hint(&mut self, recording: bool) {
        self.is_recording = recording;
        self.need_capture_flash = !(recording || self.request == FlashRequest::Torch);
    }

    /// Ignored outside the main-flash phases
    pub fn set_main_flash_firing(&mut self, firing: bool) {
        self.main_flash_firing = firing && self.phase.is_main_flash();
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    pub fn set_need_flash_off_delay(&mut self, delay: bool) {
        self.need_flash_off_delay = delay;
    }

    pub fn set_flash_wait_cancel(&mut self, cancel: bool) {
        self.wait_cancel = cancel;
    }

    pub fn set_check_main_capture_fcount(&mut self, check: bool) {
        self.check_main_capture_fcount = check;
    }

    pub fn set_should_checked_fcount(&mut self, fcount: u32) {
        self.main_capture_fcount = fcount;
        log::trace!("mainCaptureFcount={}", fcount);
    }

    /// Frames left until the flash-lit frame, 0 once it has been reached.
    /// Frame counts wrap, so the distance is taken modulo 2^32.
    pub fn check_main_capture_fcount(&self, fcount: u32) -> u32 {
        let remaining = self.main_capture_fcount.wrapping_sub(fcount);
        if remaining > u32::MAX / 2 {
            0
        } else {
            remaining
        }
    }

    /// AF finished while the pre-flash is on
    pub fn notify_af_result(&mut self) {
        if self.status() == FlashStatus::PreAf {
            self.set_flash_step(FlashStep::PreDone);
            log::debug!("AF done (for flash)");
        }
    }

    /// AE finished while the pre-flash is on
    pub fn notify_ae_result(&mut self) {
        if self.status() == FlashStatus::PreOn {
            self.set_flash_step(FlashStep::PreDone);
            log::debug!("AE done (for flash)");
        }
    }

    /// Promote the latest reported AE state to the request logic
    pub fn update_ae_state(&mut self) {
        self.pre_ae_state = self.ae_state;
        self.ae_state = self.cur_ae_state;

        if self.pre_ae_state != self.ae_state {
            if self.ae_state.is_converged() && self.request != FlashRequest::On {
                self.need_flash = false;
            } else if self.ae_state.is_flash_required() {
                self.need_flash = true;
            }
        }

        log::debug!("aeState={:?}", self.ae_state);
    }

    pub fn reset_shot_fcount(&mut self) {
        self.shot_fcount = 0;
    }

    pub fn status(&self) -> FlashStatus {
        self.phase.status()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn step(&self) -> FlashStep {
        self.step
    }

    pub fn request(&self) -> FlashRequest {
        self.request
    }

    pub fn trigger(&self) -> FlashTrigger {
        self.trigger
    }

    pub fn ae_state(&self) -> AeState {
        self.ae_state
    }

    /// Phase change taken by the latest `after_capture`, if any
    pub fn last_transition(&self) -> Option<Transition> {
        self.last_transition
    }

    pub fn waiting_count(&self) -> i32 {
        self.waiting_count
    }

    pub fn ae_wait_max_count(&self) -> i32 {
        self.ae_wait_max_count
    }

    /// Frames since the current step was set, -1 while the step is OFF
    pub fn step_frame_count(&self) -> i32 {
        self.step_frame_count
    }

    pub fn need_flash(&self) -> bool {
        self.need_flash
    }

    pub fn need_capture_flash(&self) -> bool {
        self.need_flash && self.need_capture_flash
    }

    pub fn need_flash_off_delay(&self) -> bool {
        self.need_flash_off_delay
    }

    pub fn is_pre_flash(&self) -> bool {
        self.is_pre_flash
    }

    pub fn is_flash_off(&self) -> bool {
        self.is_flash_off
    }

    /// True only while the phase is MAIN_READY, MAIN_ON or MAIN_WAIT
    pub fn is_main_flash_firing(&self) -> bool {
        self.main_flash_firing && self.phase.is_main_flash()
    }

    pub fn is_cancel_pending(&self) -> bool {
        self.cancel_pending
    }

    pub fn flash_wait_cancel(&self) -> bool {
        self.wait_cancel
    }

    pub fn shot_fcount(&self) -> u32 {
        self.shot_fcount
    }

    /// Vendor AE flash mode of the latest reported frame
    pub fn reported_aeflash_mode(&self) -> AeFlashMode {
        self.aeflash_mode
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn completed_episodes(&self) -> u64 {
        self.completed_episodes
    }
}
