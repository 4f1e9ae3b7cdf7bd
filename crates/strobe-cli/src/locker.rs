// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;
use strobe::locker::{BufferLocker, LockerSnapshot, NUM_BAYER_BUFFERS};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Number of buffer slots
    #[arg(short, long, default_value_t = NUM_BAYER_BUFFERS)]
    buffers: usize,

    /// Number of frames to cycle through the locker
    #[arg(short, long, default_value = "1000")]
    frames: u32,
}

#[derive(Debug, Serialize)]
pub struct LockerReport {
    pub buffers: usize,
    pub frames_submitted: u32,
    pub frames_consumed: u32,
    /// highest Q-number seen by the consumer
    pub max_qnum: i32,
    /// frames consumed out of submission order
    pub out_of_order: u32,
    pub duration_ms: u64,
    pub snapshot: LockerSnapshot,
}

impl LockerReport {
    fn print_text(&self) {
        println!("\n=== Buffer Locker ===");
        println!("Buffers:           {}", self.buffers);
        println!("Frames submitted:  {}", self.frames_submitted);
        println!("Frames consumed:   {}", self.frames_consumed);
        println!("Max Q-number:      {}", self.max_qnum);
        println!("Out of order:      {}", self.out_of_order);
        println!("Duration:          {:.2} s", self.duration_ms as f64 / 1000.0);
        println!("\nFinal state:");
        println!("  Q-number:        {}", self.snapshot.qnum);
        println!("  Locked slots:    {}", self.snapshot.locked());
        println!("  Manage queue:    {:?}", self.snapshot.manage_q);
    }
}

/// Cycle `frames` frames through the locker.
///
/// The submission thread locks a free slot, tags it with the frame count
/// and hands it to the driver. The completion thread plays the driver and
/// returns finished slots through the manage queue. The calling thread
/// consumes them, unlocks by frame count and drops the Q-number.
pub fn run(
    locker: Arc<BufferLocker>,
    frames: u32,
    term: Arc<AtomicBool>,
) -> Result<LockerReport, CliError> {
    let start = Instant::now();
    locker.init();

    let (driver_tx, driver_rx) = mpsc::channel::<usize>();

    let submit = {
        let locker = Arc::clone(&locker);
        let term = Arc::clone(&term);
        thread::spawn(move || -> Result<u32, strobe::Error> {
            let mut fcount = 0;
            let mut next = 0;
            while fcount < frames && !term.load(Ordering::Relaxed) {
                let index = next % locker.len();
                if locker.buffer_lock_state(index)? {
                    thread::yield_now();
                    continue;
                }

                fcount += 1;
                locker.set_buffer_fcount(index, fcount)?;
                locker.set_buffer_lock_by_index(index, true)?;
                locker.inc_qnum();
                if driver_tx.send(index).is_err() {
                    break;
                }
                next += 1;
            }
            log::debug!("Submitted {} frames", fcount);
            Ok(fcount)
        })
    };

    let complete = {
        let locker = Arc::clone(&locker);
        thread::spawn(move || -> Result<(), strobe::Error> {
            for index in driver_rx {
                locker.put_buffer_to_manage_q(index)?;
            }
            Ok(())
        })
    };

    let mut consumed = 0;
    let mut expected = 1;
    let mut max_qnum = 0;
    let mut out_of_order = 0;

    loop {
        max_qnum = max_qnum.max(locker.qnum());

        match locker.get_buffer_to_manage_q() {
            Ok(index) => {
                let fcount = locker.buffer_fcount(index)?;
                if fcount != expected {
                    log::warn!("Consumed frame {} while expecting {}", fcount, expected);
                    out_of_order += 1;
                }
                expected = fcount + 1;

                locker.set_buffer_lock_by_fcount(fcount, false)?;
                locker.dec_qnum();
                consumed += 1;
            }
            Err(strobe::Error::QueueEmpty) => {
                let drained = submit.is_finished()
                    && complete.is_finished()
                    && locker.manage_q_len() == 0;
                if consumed >= frames || drained {
                    break;
                }
                thread::yield_now();
            }
            Err(e) => return Err(e.into()),
        }
    }

    let submitted = submit
        .join()
        .map_err(|_| CliError::General("Submission thread panicked".to_string()))??;
    complete
        .join()
        .map_err(|_| CliError::General("Completion thread panicked".to_string()))??;

    locker.log_state();
    let snapshot = locker.snapshot();
    locker.deinit();

    Ok(LockerReport {
        buffers: snapshot.slots.len(),
        frames_submitted: submitted,
        frames_consumed: consumed,
        max_qnum,
        out_of_order,
        duration_ms: start.elapsed().as_millis() as u64,
        snapshot,
    })
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Locker parameters: {:?}", args);

    if args.buffers == 0 {
        return Err(CliError::InvalidArgs(
            "--buffers must be at least 1".to_string(),
        ));
    }

    let term = utils::install_signal_handler()?;
    let locker = Arc::new(BufferLocker::new(args.buffers));

    log::info!(
        "Cycling {} frames through {} buffers (Ctrl+C to stop)...",
        args.frames,
        args.buffers
    );
    let report = run(locker, args.frames, Arc::clone(&term))?;

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping...");
    }

    if report.frames_consumed != report.frames_submitted || report.snapshot.qnum != 0 {
        return Err(CliError::Locker(format!(
            "{} of {} frames consumed, Q-number {}",
            report.frames_consumed, report.frames_submitted, report.snapshot.qnum
        )));
    }

    if json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::General(format!("Failed to output JSON report: {}", e)))?;
        println!("{}", json);
    } else {
        report.print_text();
    }

    Ok(())
}
