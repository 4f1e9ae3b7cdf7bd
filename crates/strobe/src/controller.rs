// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Thread-safe access to a [`FlashSequencer`].
//!
//! The capture path blocks while the pipeline thread keeps driving frames:
//! it waits for AE to settle under the pre-flash before triggering AF, and
//! for the main flash to be charged before issuing the capture. Every
//! operation that can move the sequencer notifies the waiters.

use crate::config::FlashConfig;
use crate::flash::{FlashRequest, FlashSequencer, FlashStatus, FlashStep};
use crate::metadata::CaptureBuffer;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct FlashController {
    sequencer: Mutex<FlashSequencer>,
    changed: Condvar,
}

fn ae_pending(flash: &FlashSequencer) -> bool {
    (flash.status() == FlashStatus::PreOn || flash.step() == FlashStep::PreStart)
        && flash.status() != FlashStatus::PreAeDone
        && flash.ae_wait_max_count() > 0
}

fn main_pending(flash: &FlashSequencer) -> bool {
    flash.status() < FlashStatus::MainReady && flash.is_pre_flash()
}

impl FlashController {
    pub fn new(config: FlashConfig) -> Self {
        FlashController {
            sequencer: Mutex::new(FlashSequencer::new(config)),
            changed: Condvar::new(),
        }
    }

    // A panic on another thread leaves the sequencer in a consistent
    // per-frame state, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, FlashSequencer> {
        self.sequencer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the sequencer under the lock and wake all waiters
    pub fn with<R>(&self, f: impl FnOnce(&mut FlashSequencer) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_all();
        result
    }

    pub fn before_capture(&self, buffer: &mut CaptureBuffer) -> bool {
        self.with(|flash| flash.before_capture(buffer))
    }

    pub fn after_capture(&self, buffer: &mut CaptureBuffer) -> bool {
        self.with(|flash| flash.after_capture(buffer))
    }

    pub fn after_sensor(&self, buffer: &CaptureBuffer) -> bool {
        self.with(|flash| flash.after_sensor(buffer))
    }

    pub fn set_flash_step(&self, step: FlashStep) -> bool {
        self.with(|flash| flash.set_flash_step(step))
    }

    pub fn set_flash_req(&self, request: FlashRequest) -> bool {
        self.with(|flash| flash.set_flash_req(request))
    }

    pub fn set_flash_wait_cancel(&self, cancel: bool) {
        self.with(|flash| flash.set_flash_wait_cancel(cancel))
    }

    pub fn status(&self) -> FlashStatus {
        self.lock().status()
    }

    /// Block until AE settled under the pre-flash. Returns false when the
    /// AE settle wait ran out or was cancelled.
    pub fn wait_ae_done(&self) -> bool {
        let guard = self.lock();
        let limit = guard.config().max_ae_done_wait();

        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, limit, |flash| {
                !flash.flash_wait_cancel() && ae_pending(flash)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if guard.flash_wait_cancel() {
            log::debug!("AE done wait cancelled");
            return false;
        }

        if ae_pending(&guard) {
            log::warn!("AE done wait gave up after {:?}", limit);
            return false;
        }

        true
    }

    /// Block until the main flash is ready. On timeout the sequencer is
    /// forced to MAIN_READY and false is returned.
    pub fn wait_main_ready(&self) -> bool {
        let guard = self.lock();
        let limit = guard.config().max_pre_done_wait(guard.fps());
        log::info!("Main ready wait limit {:?} at {} fps", limit, guard.fps());

        let (mut guard, timeout) = self
            .changed
            .wait_timeout_while(guard, limit, |flash| {
                !flash.flash_wait_cancel() && main_pending(flash)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if timeout.timed_out() && main_pending(&guard) {
            log::warn!("Main ready wait gave up after {:?}", limit);
            guard.set_flash_status(FlashStatus::MainReady);
            drop(guard);
            self.changed.notify_all();
            return false;
        }

        true
    }
}
