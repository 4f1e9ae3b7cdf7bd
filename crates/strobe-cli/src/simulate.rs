// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use crate::metrics::{EpisodeCollector, EpisodeMetrics};
use crate::utils::{self, AeStateArg, RequestArg};
use clap::Args as ClapArgs;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use strobe::config::FlashConfig;
use strobe::flash::{FlashRequest, FlashSequencer, FlashStatus, FlashStep};
use strobe::locker::NUM_BAYER_BUFFERS;
use strobe::metadata::{AeFlashMode, AeState, CaptureBuffer, HardwareReport};

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Flash request applied for the whole run
    #[arg(short, long, value_enum, default_value = "on")]
    request: RequestArg,

    /// AE state reported by frames the script does not cover
    #[arg(long, value_enum, default_value = "flash-required")]
    ae_state: AeStateArg,

    /// JSON array of per-frame hardware reports
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Number of frames to run (0 = until all episodes ended)
    #[arg(short, long, default_value = "0")]
    frames: u64,

    /// Number of flash episodes to run (0 = as many as --frames allows)
    #[arg(short, long, default_value = "1")]
    episodes: u64,

    /// Cancel each episode this many frames after PRE_START
    #[arg(long)]
    cancel_at: Option<u64>,

    /// Frames the AF scan takes under the pre-flash (default: AF never reports)
    #[arg(long)]
    af_frames: Option<u64>,

    /// Drop the metadata of every Nth frame (0 = never)
    #[arg(long, default_value = "0")]
    skip_every: u64,

    /// Frame rate used for pacing (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    fps: u32,

    /// Flash configuration file (default: $STROBE_FLASH_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every frame
    #[arg(long)]
    trace: bool,
}

/// State of one simulated frame, after its results were harvested
#[derive(Debug, Clone, Serialize)]
pub struct FrameTrace {
    pub frame_count: u32,
    pub step: FlashStep,
    pub status: FlashStatus,
    pub directive: AeFlashMode,
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Running,
    /// the episode reached MAIN_DONE after this many frames
    Completed(u64),
    Cancelled,
}

#[derive(Serialize)]
struct SimulateReport {
    request: FlashRequest,
    #[serde(flatten)]
    metrics: EpisodeMetrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trace: Vec<FrameTrace>,
}

/// Drives a sequencer the way the capture pipeline does: one
/// before/after pair per frame, PRE_START whenever the step is OFF and
/// MAIN_START as soon as MAIN_READY is reported.
pub struct Simulation {
    flash: FlashSequencer,
    buffers: Vec<CaptureBuffer>,
    script: Vec<HardwareReport>,
    idle: HardwareReport,
    cancel_at: Option<u64>,
    af_frames: Option<u64>,
    skip_every: u64,
    collector: EpisodeCollector,

    frame: u64,
    episode_frames: u64,
    af_counter: u64,
    cancel_issued: bool,
    completed: u64,
}

impl Simulation {
    pub fn new(config: FlashConfig, request: FlashRequest, ae_state: AeState) -> Self {
        let mut flash = FlashSequencer::new(config);
        flash.set_flash_req(request);

        Simulation {
            flash,
            buffers: (0..NUM_BAYER_BUFFERS).map(CaptureBuffer::new).collect(),
            script: Vec::new(),
            idle: HardwareReport::not_ready(ae_state),
            cancel_at: None,
            af_frames: None,
            skip_every: 0,
            collector: EpisodeCollector::new(),
            frame: 0,
            episode_frames: 0,
            af_counter: 0,
            cancel_issued: false,
            completed: 0,
        }
    }

    pub fn with_script(mut self, script: Vec<HardwareReport>) -> Self {
        self.script = script;
        self
    }

    pub fn with_cancel_at(mut self, cancel_at: Option<u64>) -> Self {
        self.cancel_at = cancel_at;
        self
    }

    pub fn with_af_frames(mut self, af_frames: Option<u64>) -> Self {
        self.af_frames = af_frames;
        self
    }

    pub fn with_skip_every(mut self, skip_every: u64) -> Self {
        self.skip_every = skip_every;
        self
    }

    pub fn flash_mut(&mut self) -> &mut FlashSequencer {
        &mut self.flash
    }

    /// Frames driven so far, skipped frames included
    pub fn frames(&self) -> u64 {
        self.frame
    }

    fn runs_episodes(&self) -> bool {
        matches!(self.flash.request(), FlashRequest::On | FlashRequest::Auto)
    }

    pub fn run_frame(&mut self) -> (FrameTrace, Outcome) {
        self.frame += 1;
        let fcount = u32::try_from(self.frame).unwrap_or(u32::MAX);
        let report = usize::try_from(self.frame - 1)
            .ok()
            .and_then(|index| self.script.get(index))
            .copied()
            .unwrap_or(self.idle);

        if self.runs_episodes() && self.flash.step() == FlashStep::Off {
            log::debug!("Frame {}: issuing PRE_START", fcount);
            self.flash.set_flash_step(FlashStep::PreStart);
            self.episode_frames = 0;
            self.af_counter = 0;
            self.cancel_issued = false;
        }

        if self.cancel_at == Some(self.episode_frames)
            && !self.cancel_issued
            && self.flash.step() != FlashStep::Off
        {
            log::info!("Frame {}: cancelling flash", fcount);
            self.flash.set_flash_step(FlashStep::Cancel);
            self.cancel_issued = true;
        }
        self.episode_frames += 1;

        let slot = self.frame as usize % self.buffers.len();
        let skipped = self.skip_every > 0 && self.frame % self.skip_every == 0;
        let mut dropped;
        let buffer = if skipped {
            dropped = CaptureBuffer::without_metadata(slot);
            &mut dropped
        } else {
            &mut self.buffers[slot]
        };

        buffer.set_frame_count(fcount);
        let submitted = self.flash.before_capture(buffer);
        let directive = buffer
            .shot()
            .map(|shot| shot.ctl.aa.vendor_aeflash_mode)
            .unwrap_or_default();

        buffer.report(&report);
        self.flash.after_sensor(buffer);
        let harvested = self.flash.after_capture(buffer);

        self.collector.record_frame();
        if !(submitted && harvested) {
            self.collector.record_skipped();
        } else if let Some(transition) = self.flash.last_transition() {
            self.collector.record_transition(&transition);
        }

        let trace = FrameTrace {
            frame_count: fcount,
            step: self.flash.step(),
            status: self.flash.status(),
            directive,
            skipped: !(submitted && harvested),
        };

        (trace, self.drive())
    }

    /// Issue the steps the capture path would issue after a frame
    fn drive(&mut self) -> Outcome {
        if self.flash.completed_episodes() > self.completed {
            self.completed = self.flash.completed_episodes();
            self.collector.record_episode(self.episode_frames);
            self.cancel_issued = false;

            // a deferred cancel flushes on the next frame by itself
            if self.flash.step() != FlashStep::Cancel {
                self.flash.set_flash_step(FlashStep::Off);
            }
            return Outcome::Completed(self.episode_frames);
        }

        if self.cancel_issued && self.flash.step() == FlashStep::Off {
            self.collector.record_cancel();
            self.cancel_issued = false;
            return Outcome::Cancelled;
        }

        if self.flash.status() == FlashStatus::PreAf {
            self.af_counter += 1;
            if self.af_frames.is_some_and(|frames| self.af_counter >= frames) {
                self.flash.notify_af_result();
            }
        }

        if self.flash.status() == FlashStatus::MainReady
            && !matches!(
                self.flash.step(),
                FlashStep::MainStart | FlashStep::Cancel | FlashStep::Off
            )
        {
            log::debug!("Main flash ready, issuing MAIN_START");
            self.flash.set_flash_step(FlashStep::MainStart);
        }

        Outcome::Running
    }

    pub fn finish(mut self) -> EpisodeMetrics {
        self.collector.finalize()
    }
}

fn print_trace(trace: &FrameTrace) {
    println!(
        "{:>6}  {:<10} {:<12} {:<10}{}",
        trace.frame_count,
        trace.step.to_string(),
        trace.status.to_string(),
        trace.directive.to_string(),
        if trace.skipped { " (skipped)" } else { "" }
    );
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Simulate parameters: {:?}", args);

    let request = FlashRequest::from(args.request);
    let runs_episodes = matches!(request, FlashRequest::On | FlashRequest::Auto);

    if args.frames == 0 && (!runs_episodes || args.episodes == 0) {
        return Err(CliError::InvalidArgs(format!(
            "--frames is required for request '{}' and for unlimited episodes",
            request
        )));
    }

    let config = utils::load_config(args.config.as_deref())?;
    let script = match &args.script {
        Some(path) => utils::load_script(path)?,
        None => Vec::new(),
    };

    let bound = u64::from(config.liveness_bound());
    let limit = if args.frames > 0 {
        args.frames
    } else {
        bound.saturating_mul(10).saturating_mul(args.episodes)
    };

    let term = utils::install_signal_handler()?;

    let mut sim = Simulation::new(config, request, args.ae_state.into())
        .with_script(script)
        .with_cancel_at(args.cancel_at)
        .with_af_frames(args.af_frames)
        .with_skip_every(args.skip_every);

    let pacing = if args.fps > 0 {
        sim.flash_mut().set_fps(args.fps);
        Some(Duration::from_secs_f64(1.0 / f64::from(args.fps)))
    } else {
        None
    };

    log::info!(
        "Simulating flash request '{}' ({} frames max, liveness bound {} frames)",
        request,
        limit,
        bound
    );

    let mut traces = Vec::new();
    let mut ended = 0u64;

    while !term.load(Ordering::Relaxed) {
        if runs_episodes && args.episodes > 0 && ended >= args.episodes {
            break;
        }

        if sim.frames() >= limit {
            if args.frames == 0 {
                return Err(CliError::Timeout(format!(
                    "{} of {} episodes ended within {} frames",
                    ended, args.episodes, limit
                )));
            }
            break;
        }

        let (trace, outcome) = sim.run_frame();

        match outcome {
            Outcome::Completed(frames) => {
                ended += 1;
                log::info!("Episode {} reached MAIN_DONE in {} frames", ended, frames);
            }
            Outcome::Cancelled => {
                ended += 1;
                log::info!("Episode {} cancelled", ended);
            }
            Outcome::Running => {}
        }

        if args.trace {
            if json {
                traces.push(trace);
            } else {
                print_trace(&trace);
            }
        }

        if let Some(pacing) = pacing {
            thread::sleep(pacing);
        }
    }

    if term.load(Ordering::Relaxed) {
        log::info!("Received Ctrl+C, stopping...");
    }

    let frames = sim.frames();
    let metrics = sim.finish();
    log::info!("Simulated {} frames, {} episodes ended", frames, ended);

    if json {
        let report = SimulateReport {
            request,
            metrics,
            trace: traces,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::General(format!("Failed to output JSON metrics: {}", e)))?;
        println!("{}", json);
    } else {
        metrics.print_text();
    }

    Ok(())
}
