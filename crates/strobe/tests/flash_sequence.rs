// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Flash sequencer episode tests
//
// Every test drives the sequencer the way the capture pipeline does: one
// before_capture / after_capture pair per frame, steps issued between
// frames. No hardware is required, hardware reports are synthesized.
//
// RUN:
//   cargo test --test flash_sequence

use rand::{rngs::StdRng, Rng, SeedableRng};
use strobe::config::FlashConfig;
use strobe::flash::{FlashRequest, FlashSequencer, FlashStatus, FlashStep};
use strobe::metadata::{AeFlashMode, CaptureBuffer, FlashMode, HardwareReport};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One pipeline frame, returns the status after the hardware report
fn frame(
    flash: &mut FlashSequencer,
    buffer: &mut CaptureBuffer,
    fcount: u32,
    report: &HardwareReport,
) -> FlashStatus {
    buffer.set_frame_count(fcount);
    buffer.report(report);
    assert!(flash.before_capture(buffer));
    assert!(flash.after_capture(buffer));
    flash.status()
}

fn idle() -> HardwareReport {
    HardwareReport::default()
}

#[test]
fn test_pre_and_main_flash_with_silent_hardware() {
    init_logging();

    let mut flash = FlashSequencer::default();
    let mut buffer = CaptureBuffer::new(0);
    let mut missing = CaptureBuffer::without_metadata(1);
    let mut fcount = 0;

    flash.set_flash_req(FlashRequest::On);
    flash.set_flash_step(FlashStep::PreStart);

    let mut pre_statuses = Vec::new();
    for _ in 0..30 {
        fcount += 1;
        pre_statuses.push(frame(&mut flash, &mut buffer, fcount, &idle()));

        // frames whose metadata plane is missing are skipped
        if fcount % 7 == 0 {
            assert!(!flash.before_capture(&mut missing));
            assert!(!flash.after_capture(&mut missing));
        }
    }
    assert!(pre_statuses.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(flash.status(), FlashStatus::MainReady);

    flash.set_flash_step(FlashStep::MainStart);

    let mut main_statuses = Vec::new();
    for _ in 0..20 {
        fcount += 1;
        let previous = flash.status();
        let status = frame(&mut flash, &mut buffer, fcount, &idle());
        main_statuses.push(status);

        if status == FlashStatus::MainDone {
            let transition = flash.last_transition().unwrap();
            assert_eq!(transition.to, FlashStatus::MainDone);
            assert_eq!(transition.frame_count, fcount);
        }

        // the frame after MAIN_DONE turns the flash off
        if previous == FlashStatus::MainDone {
            let ctl = buffer.shot().unwrap().ctl;
            assert_eq!(ctl.aa.vendor_aeflash_mode, AeFlashMode::Off);
            assert_eq!(ctl.flash.flash_mode, FlashMode::None);
            assert_eq!(status, FlashStatus::Off);
        }

        if fcount % 7 == 0 {
            assert!(!flash.before_capture(&mut missing));
            assert!(!flash.after_capture(&mut missing));
        }
    }

    assert!(main_statuses.contains(&FlashStatus::MainDone));
    let done = main_statuses
        .iter()
        .position(|status| *status == FlashStatus::MainDone)
        .unwrap();
    assert!(main_statuses[..done]
        .iter()
        .all(|status| *status >= FlashStatus::MainOn));
    assert_eq!(flash.completed_episodes(), 1);
    assert!(!flash.is_main_flash_firing());
}

#[test]
fn test_silent_hardware_meets_liveness_bound() {
    init_logging();

    let config = FlashConfig::default();
    let bound = config.timeout
        + config.ae_timeout
        + config.af_timeout
        + config.main_timeout
        + config.main_wait;
    assert_eq!(config.liveness_bound(), bound);
    let mut flash = FlashSequencer::new(config);
    let mut buffer = CaptureBuffer::new(0);

    flash.set_flash_req(FlashRequest::On);
    flash.set_flash_step(FlashStep::PreStart);

    let mut frames = 0;
    while flash.status() != FlashStatus::MainDone {
        frames += 1;
        assert!(frames <= bound, "no MAIN_DONE within {} frames", bound);
        frame(&mut flash, &mut buffer, frames, &idle());
        if flash.status() == FlashStatus::MainReady {
            flash.set_flash_step(FlashStep::MainStart);
        }
    }

    assert_eq!(frames, bound);
}

#[test]
fn test_noisy_hardware_meets_liveness_bound() {
    init_logging();

    for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = FlashConfig {
            timeout: rng.random_range(0..8),
            ae_timeout: rng.random_range(0..12),
            af_timeout: rng.random_range(0..8),
            main_timeout: rng.random_range(0..12),
            main_wait: rng.random_range(0..5),
            ..Default::default()
        };
        let bound = config.liveness_bound();
        let budgets = [
            config.timeout,
            config.ae_timeout,
            config.af_timeout,
            config.main_timeout,
            config.main_wait,
        ];
        if budgets.iter().all(|budget| *budget > 0) {
            assert_eq!(bound, budgets.iter().sum::<u32>());
        }
        let mut flash = FlashSequencer::new(config);
        let mut buffer = CaptureBuffer::new(0);

        flash.set_flash_req(FlashRequest::On);
        flash.set_flash_step(FlashStep::PreStart);

        let mut frames = 0;
        while flash.status() != FlashStatus::MainDone {
            frames += 1;
            assert!(frames <= bound, "seed {}: no MAIN_DONE within {}", seed, bound);

            let report = HardwareReport {
                decision: rng.random_range(0..4),
                flash_ready: rng.random_range(0..4),
                flash_off_ready: rng.random_range(0..4),
                firing_stable: rng.random_range(0..4),
                ..Default::default()
            };
            frame(&mut flash, &mut buffer, frames, &report);

            if flash.status() == FlashStatus::PreAf && rng.random_bool(0.3) {
                flash.notify_af_result();
            }
            if flash.status() == FlashStatus::MainReady {
                flash.set_flash_step(FlashStep::MainStart);
            }
        }
    }
}

#[test]
fn test_request_off_takes_effect_in_same_frame() {
    init_logging();

    for progress in 0..40 {
        let mut flash = FlashSequencer::default();
        let mut buffer = CaptureBuffer::new(0);
        flash.set_flash_req(FlashRequest::On);
        flash.set_flash_step(FlashStep::PreStart);

        for fcount in 1..=progress {
            frame(&mut flash, &mut buffer, fcount, &idle());
            if flash.status() == FlashStatus::MainReady {
                flash.set_flash_step(FlashStep::MainStart);
            }
        }

        flash.set_flash_req(FlashRequest::Off);
        buffer.shot_mut().unwrap().ctl.flash.flash_mode = FlashMode::Torch;
        assert!(flash.before_capture(&mut buffer));

        let ctl = buffer.shot().unwrap().ctl;
        assert_eq!(ctl.flash.flash_mode, FlashMode::None, "progress {}", progress);
        assert_eq!(ctl.aa.vendor_aeflash_mode, AeFlashMode::Off);
        assert_eq!(flash.status(), FlashStatus::Off);
        assert_eq!(flash.step(), FlashStep::Off);
    }
}

#[test]
fn test_step_off_returns_to_idle_from_any_phase() {
    init_logging();

    let mut rng = StdRng::seed_from_u64(7);
    for progress in 0..40 {
        let mut flash = FlashSequencer::default();
        let mut buffer = CaptureBuffer::new(0);
        flash.set_flash_req(FlashRequest::On);
        flash.set_flash_step(FlashStep::PreStart);

        for fcount in 1..=progress {
            frame(&mut flash, &mut buffer, fcount, &idle());
            if flash.status() == FlashStatus::MainReady {
                flash.set_flash_step(FlashStep::MainStart);
            }
            if rng.random_bool(0.1) {
                flash.set_flash_step(FlashStep::Cancel);
            }
        }

        flash.set_flash_step(FlashStep::Off);
        assert_eq!(flash.status(), FlashStatus::Off);
        assert_eq!(flash.step(), FlashStep::Off);
        assert_eq!(flash.waiting_count(), -1);
        assert_eq!(flash.step_frame_count(), -1);
        assert_eq!(flash.ae_wait_max_count(), 0);
        assert!(!flash.is_main_flash_firing());
        assert!(!flash.is_cancel_pending());
    }
}

#[test]
fn test_cancel_waits_for_main_flash_to_finish() {
    init_logging();

    let mut flash = FlashSequencer::default();
    let mut buffer = CaptureBuffer::new(0);
    flash.set_flash_req(FlashRequest::On);
    flash.set_flash_step(FlashStep::PreStart);

    let mut fcount = 0;
    while flash.status() != FlashStatus::MainReady {
        fcount += 1;
        frame(&mut flash, &mut buffer, fcount, &idle());
    }
    flash.set_flash_step(FlashStep::MainStart);
    fcount += 1;
    frame(&mut flash, &mut buffer, fcount, &idle());
    assert!(flash.is_main_flash_firing());

    flash.set_flash_step(FlashStep::Cancel);

    // while firing, every frame keeps the capture running
    let mut firing_frames = 0;
    let mut firing_seen_false = false;
    while !firing_seen_false {
        let firing = flash.is_main_flash_firing();
        fcount += 1;
        let status = frame(&mut flash, &mut buffer, fcount, &idle());

        if firing {
            firing_frames += 1;
            assert_ne!(status, FlashStatus::Off);
            assert_eq!(flash.step(), FlashStep::Cancel);
        } else {
            firing_seen_false = true;
            assert_eq!(status, FlashStatus::Off);
            assert_eq!(flash.step(), FlashStep::Off);
            assert_eq!(
                buffer.shot().unwrap().ctl.aa.vendor_aeflash_mode,
                AeFlashMode::Cancel
            );
        }
    }

    assert!(firing_frames > 0);
    assert_eq!(flash.completed_episodes(), 1);
}

#[test]
fn test_cancel_after_early_main_start_is_not_deferred() {
    init_logging();

    let mut flash = FlashSequencer::default();
    let mut buffer = CaptureBuffer::new(0);
    flash.set_flash_req(FlashRequest::On);
    flash.set_flash_step(FlashStep::PreStart);

    let mut fcount = 0;
    while flash.status() != FlashStatus::PreAf {
        fcount += 1;
        frame(&mut flash, &mut buffer, fcount, &idle());
    }

    flash.set_flash_step(FlashStep::MainStart);
    flash.set_flash_step(FlashStep::Cancel);

    for _ in 0..500 {
        fcount += 1;
        frame(&mut flash, &mut buffer, fcount, &idle());
        if flash.step() == FlashStep::Off {
            break;
        }
    }

    assert_eq!(flash.step(), FlashStep::Off);
    assert_eq!(flash.status(), FlashStatus::Off);
    assert!(!flash.is_main_flash_firing());
    assert!(!flash.is_cancel_pending());
}

#[test]
fn test_firing_only_in_main_flash_phases() {
    init_logging();

    let mut rng = StdRng::seed_from_u64(11);
    let steps = [
        FlashStep::PreStart,
        FlashStep::PreDone,
        FlashStep::MainStart,
        FlashStep::Cancel,
    ];

    for request in [FlashRequest::On, FlashRequest::Torch] {
        let mut flash = FlashSequencer::default();
        let mut buffer = CaptureBuffer::new(0);
        flash.set_flash_req(request);

        for fcount in 1..=1000 {
            if rng.random_bool(0.1) {
                flash.set_flash_step(steps[rng.random_range(0..steps.len())]);
            }
            let status = frame(&mut flash, &mut buffer, fcount, &idle());

            if flash.is_main_flash_firing() {
                assert!(
                    matches!(
                        status,
                        FlashStatus::MainReady | FlashStatus::MainOn | FlashStatus::MainWait
                    ),
                    "{} firing in {}",
                    request,
                    status
                );
            }
        }

        // a cancel always flushes once the main flash is done
        flash.set_flash_step(FlashStep::Cancel);
        let bound = flash.config().liveness_bound() + 2;
        for fcount in 1001..=1000 + bound {
            frame(&mut flash, &mut buffer, fcount, &idle());
            if flash.step() == FlashStep::Off {
                break;
            }
        }
        assert_eq!(flash.step(), FlashStep::Off, "{} cancel never flushed", request);
        assert!(!flash.is_cancel_pending());
    }
}

#[test]
fn test_auto_request_runs_same_sequence_as_on() {
    init_logging();

    let run = |request: FlashRequest| {
        let mut flash = FlashSequencer::default();
        let mut buffer = CaptureBuffer::new(0);
        let report = HardwareReport::not_ready(strobe::metadata::AeState::FlashRequired);
        flash.set_flash_req(request);

        let mut statuses = Vec::new();
        for fcount in 1..=60 {
            // AUTO drops the step while the AE state is still inactive
            if flash.step() == FlashStep::Off {
                flash.set_flash_step(FlashStep::PreStart);
            }
            statuses.push(frame(&mut flash, &mut buffer, fcount, &report));
            if flash.status() == FlashStatus::MainReady {
                flash.set_flash_step(FlashStep::MainStart);
            }
            if flash.completed_episodes() == 1 {
                break;
            }
        }
        statuses
    };

    let on = run(FlashRequest::On);
    let auto = run(FlashRequest::Auto);

    // AUTO needs one extra frame to mirror the AE state before arming
    assert_eq!(auto.len(), on.len() + 1);
    assert_eq!(auto[0], FlashStatus::Off);
    assert_eq!(&auto[1..], &on[..]);
}
