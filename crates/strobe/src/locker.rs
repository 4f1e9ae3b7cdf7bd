// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Bayer buffer lock ledger.
//!
//! A [`BufferLocker`] belongs to one pipe. It records for each buffer slot
//! whether the driver holds it and which frame it carries, keeps a FIFO of
//! indices ready for the consumer (each slot at most once, so the FIFO never
//! holds more entries than there are slots), and counts the buffers queued
//! to the driver. All three live under one mutex, so the submission and the
//! completion thread always observe them consistently.

use crate::Error;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of bayer buffers per pipe
pub const NUM_BAYER_BUFFERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    #[default]
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BufferSlot {
    pub lock_state: LockState,
    pub frame_count: u32,
}

/// Copy of the ledger taken under the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockerSnapshot {
    pub slots: Vec<BufferSlot>,
    pub manage_q: Vec<usize>,
    pub qnum: i32,
}

impl LockerSnapshot {
    pub fn locked(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock_state == LockState::Locked)
            .count()
    }
}

#[derive(Debug)]
struct Ledger {
    slots: Box<[BufferSlot]>,
    manage_q: VecDeque<usize>,
    qnum: i32,
}

impl Ledger {
    fn slot_mut(&mut self, index: usize) -> Result<&mut BufferSlot, Error> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    fn slot(&self, index: usize) -> Result<&BufferSlot, Error> {
        self.slots.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    fn reset(&mut self) {
        self.slots.fill(BufferSlot::default());
        self.manage_q.clear();
        self.qnum = 0;
    }
}

#[derive(Debug)]
pub struct BufferLocker {
    ledger: Mutex<Ledger>,
}

impl Default for BufferLocker {
    fn default() -> Self {
        Self::new(NUM_BAYER_BUFFERS)
    }
}

impl BufferLocker {
    pub fn new(num_buffers: usize) -> Self {
        log::debug!("Created buffer locker with {} slots", num_buffers);
        BufferLocker {
            ledger: Mutex::new(Ledger {
                slots: vec![BufferSlot::default(); num_buffers].into_boxed_slice(),
                manage_q: VecDeque::with_capacity(num_buffers),
                qnum: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unlock every slot, clear the manage queue and the Q-number
    pub fn init(&self) {
        self.lock().reset();
    }

    /// Same as [`BufferLocker::init`], for pipe teardown
    pub fn deinit(&self) {
        self.lock().reset();
    }

    pub fn set_buffer_lock_by_index(&self, index: usize, lock: bool) -> Result<(), Error> {
        log::debug!("index {} setLock {}", index, lock);
        self.lock().slot_mut(index)?.lock_state = if lock {
            LockState::Locked
        } else {
            LockState::Unlocked
        };
        Ok(())
    }

    /// Lock or unlock the first slot carrying `frame_count`
    pub fn set_buffer_lock_by_fcount(&self, frame_count: u32, lock: bool) -> Result<usize, Error> {
        log::trace!("fcount {} setLock {}", frame_count, lock);
        let mut ledger = self.lock();

        let (index, slot) = ledger
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.frame_count == frame_count)
            .ok_or(Error::FrameCountNotFound(frame_count))?;

        slot.lock_state = if lock {
            LockState::Locked
        } else {
            LockState::Unlocked
        };
        Ok(index)
    }

    pub fn buffer_lock_state(&self, index: usize) -> Result<bool, Error> {
        Ok(self.lock().slot(index)?.lock_state == LockState::Locked)
    }

    pub fn set_buffer_fcount(&self, index: usize, frame_count: u32) -> Result<(), Error> {
        self.lock().slot_mut(index)?.frame_count = frame_count;
        Ok(())
    }

    pub fn buffer_fcount(&self, index: usize) -> Result<u32, Error> {
        Ok(self.lock().slot(index)?.frame_count)
    }

    /// Append `index` to the manage queue. An index already waiting is
    /// rejected.
    pub fn put_buffer_to_manage_q(&self, index: usize) -> Result<(), Error> {
        let mut ledger = self.lock();
        ledger.slot(index)?;
        if ledger.manage_q.contains(&index) {
            log::warn!("index {} is already in the manage queue", index);
            return Err(Error::AlreadyQueued(index));
        }
        ledger.manage_q.push_back(index);
        Ok(())
    }

    /// Pop the oldest index, never blocks
    pub fn get_buffer_to_manage_q(&self) -> Result<usize, Error> {
        self.lock().manage_q.pop_front().ok_or(Error::QueueEmpty)
    }

    pub fn manage_q_len(&self) -> usize {
        self.lock().manage_q.len()
    }

    /// Buffers currently queued to the driver
    pub fn qnum(&self) -> i32 {
        self.lock().qnum
    }

    pub fn inc_qnum(&self) {
        self.lock().qnum += 1;
    }

    pub fn dec_qnum(&self) {
        self.lock().qnum -= 1;
    }

    pub fn snapshot(&self) -> LockerSnapshot {
        let ledger = self.lock();
        LockerSnapshot {
            slots: ledger.slots.to_vec(),
            manage_q: ledger.manage_q.iter().copied().collect(),
            qnum: ledger.qnum,
        }
    }

    /// Dump the slots and the manage queue at debug level
    pub fn log_state(&self) {
        let snapshot = self.snapshot();

        for (index, slot) in snapshot.slots.iter().enumerate() {
            log::debug!(
                "[{}] lockState {:?} fcount {}",
                index,
                slot.lock_state,
                slot.frame_count
            );
        }

        if snapshot.manage_q.is_empty() {
            log::debug!("manage queue: no entry");
        } else {
            log::debug!(
                "manage queue ({}): {:?}",
                snapshot.manage_q.len(),
                snapshot.manage_q
            );
        }
        log::debug!("qnum {}", snapshot.qnum);
    }
}
