// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use strobe::flash::{AdvanceReason, Transition};

/// Flash episode metrics collected during a simulation
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeMetrics {
    /// Total number of frames driven through the sequencer
    pub frames_processed: u64,
    /// Frames skipped because their metadata was missing
    pub skipped_frames: u64,
    /// Episodes that reached MAIN_DONE
    pub episodes_completed: u64,
    /// Episodes ended by a cancel before MAIN_DONE
    pub episodes_cancelled: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Minimum frames from PRE_START to MAIN_DONE
    pub episode_frames_min: u64,
    /// Maximum frames from PRE_START to MAIN_DONE
    pub episode_frames_max: u64,
    /// Average frames from PRE_START to MAIN_DONE
    pub episode_frames_avg: u64,
    /// 50th percentile (median) frames per episode
    pub episode_frames_p50: u64,
    /// 95th percentile frames per episode
    pub episode_frames_p95: u64,
    /// Phase budgets that ran out, keyed by the phase left
    pub timeouts: BTreeMap<String, u64>,
}

/// Metrics collector for flash episodes
pub struct EpisodeCollector {
    start_time: Instant,
    episode_frames: Vec<u64>,
    frames: u64,
    skipped: u64,
    cancelled: u64,
    timeouts: BTreeMap<String, u64>,
}

impl EpisodeCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            episode_frames: Vec::new(),
            frames: 0,
            skipped: 0,
            cancelled: 0,
            timeouts: BTreeMap::new(),
        }
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Count the phase change of a frame, timeouts are tallied per phase
    pub fn record_transition(&mut self, transition: &Transition) {
        if transition.reason == AdvanceReason::Timeout {
            *self
                .timeouts
                .entry(transition.from.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Record a completed episode and the frames it took
    pub fn record_episode(&mut self, frames: u64) {
        self.episode_frames.push(frames);
    }

    pub fn record_cancel(&mut self) {
        self.cancelled += 1;
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> EpisodeMetrics {
        let duration_ms = self.start_time.elapsed().as_millis() as u64;

        let (min, max, avg, p50, p95) = if !self.episode_frames.is_empty() {
            self.episode_frames.sort_unstable();

            let min = self.episode_frames[0];
            let max = self.episode_frames[self.episode_frames.len() - 1];
            let sum: u64 = self.episode_frames.iter().sum();
            let avg = sum / self.episode_frames.len() as u64;

            (min, max, avg, self.percentile(50.0), self.percentile(95.0))
        } else {
            (0, 0, 0, 0, 0)
        };

        EpisodeMetrics {
            frames_processed: self.frames,
            skipped_frames: self.skipped,
            episodes_completed: self.episode_frames.len() as u64,
            episodes_cancelled: self.cancelled,
            duration_ms,
            episode_frames_min: min,
            episode_frames_max: max,
            episode_frames_avg: avg,
            episode_frames_p50: p50,
            episode_frames_p95: p95,
            timeouts: self.timeouts.clone(),
        }
    }

    /// Calculate percentile from sorted episode lengths
    /// Assumes self.episode_frames is already sorted
    fn percentile(&self, p: f64) -> u64 {
        if self.episode_frames.is_empty() {
            return 0;
        }

        let len = self.episode_frames.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.episode_frames[idx.min(len - 1)]
    }
}

impl Default for EpisodeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeMetrics {
    /// Print metrics in human-readable format
    pub fn print_text(&self) {
        println!("\n=== Flash Episode Metrics ===");
        println!("Frames processed:  {}", self.frames_processed);
        println!("Skipped frames:    {}", self.skipped_frames);
        println!("Episodes done:     {}", self.episodes_completed);
        println!("Episodes cancelled: {}", self.episodes_cancelled);
        println!("Duration:          {:.2} s", self.duration_ms as f64 / 1000.0);

        if self.episodes_completed > 0 {
            println!("\nFrames per episode:");
            println!("  Min:    {}", self.episode_frames_min);
            println!("  Max:    {}", self.episode_frames_max);
            println!("  Avg:    {}", self.episode_frames_avg);
            println!("  P50:    {}", self.episode_frames_p50);
            println!("  P95:    {}", self.episode_frames_p95);
        }

        if !self.timeouts.is_empty() {
            println!("\nPhase timeouts:");
            for (phase, count) in &self.timeouts {
                println!("  {:<12} {}", phase, count);
            }
        }
    }
}
