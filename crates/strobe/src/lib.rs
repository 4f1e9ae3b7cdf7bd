// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Strobe Library for Rust
//!
//! Flash (strobe) sequencing and capture buffer ownership tracking for
//! camera ISP pipelines.
//!
//! The library is driven once per captured frame by the sensor pipeline.
//! Before a frame is submitted to the ISP, [`flash::FlashSequencer::before_capture`]
//! writes the AE/AWB/flash control directives into the frame's shot
//! metadata. After the hardware reports results, [`flash::FlashSequencer::after_capture`]
//! harvests the reported flash and AE status and advances the pre-flash /
//! main-flash sequence. Every phase that waits on hardware carries its own
//! timeout budget, so a silent or misbehaving flash driver can never stall
//! the sequence.
//!
//! [`locker::BufferLocker`] tracks which bayer buffers are held by the
//! driver and hands completed indices from the completion thread to the
//! consumer through a FIFO.
//!
//! # Quick Start
//!
//! ```
//! use strobe::config::FlashConfig;
//! use strobe::flash::{FlashRequest, FlashSequencer, FlashStatus, FlashStep};
//! use strobe::metadata::CaptureBuffer;
//!
//! let mut flash = FlashSequencer::new(FlashConfig::default());
//! flash.set_flash_req(FlashRequest::On);
//! flash.set_flash_step(FlashStep::PreStart);
//!
//! let mut buffer = CaptureBuffer::new(0);
//! for fcount in 1..=40 {
//!     buffer.set_frame_count(fcount);
//!     flash.before_capture(&mut buffer);
//!     flash.after_capture(&mut buffer);
//!     if flash.status() == FlashStatus::MainReady {
//!         break;
//!     }
//! }
//! assert_eq!(flash.status(), FlashStatus::MainReady);
//! ```
//!
//! # Features
//!
//! - Pre-flash metering, AF assist and main-flash capture sequencing
//! - Hardware-or-timeout phase transitions with configurable budgets
//! - Deferred cancellation while the main flash is discharging
//! - Blocking waits for AE convergence and main-flash readiness
//! - Bayer buffer lock ledger with a hand-off FIFO

use std::{error, fmt, io};

/// Error type for strobe library operations
#[derive(Debug)]
pub enum Error {
    /// Buffer index outside of the locker's slot range
    IndexOutOfRange { index: usize, len: usize },

    /// No buffer slot carries the requested frame count
    FrameCountNotFound(u32),

    /// The manage queue holds no buffer index
    QueueEmpty,

    /// The buffer index is already waiting in the manage queue
    AlreadyQueued(usize),

    /// I/O error while reading configuration or scripts
    Io(io::Error),

    /// JSON parsing error in configuration or scripts
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Buffer index {} out of range (0..{})", index, len)
            }
            Error::FrameCountNotFound(fcount) => {
                write!(f, "No buffer holds frame count {}", fcount)
            }
            Error::QueueEmpty => write!(f, "Manage queue is empty"),
            Error::AlreadyQueued(index) => {
                write!(f, "Buffer index {} is already in the manage queue", index)
            }
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::IndexOutOfRange { .. }
            | Error::FrameCountNotFound(_)
            | Error::QueueEmpty
            | Error::AlreadyQueued(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// The metadata module models the per-frame shot metadata exchanged with the ISP.
pub mod metadata;

/// The config module provides the sequencer timeout budgets and wait limits.
pub mod config;

/// The phase module provides the flash phase machine and its transitions.
pub mod phase;

/// The flash module provides the per-frame flash sequencer.
pub mod flash;

/// The controller module provides thread-safe access and blocking waits.
pub mod controller;

/// The locker module provides bayer buffer lock tracking.
pub mod locker;
