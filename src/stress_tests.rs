/// Stress and property testing for the shot detector.
///
/// Long sessions, corrupted input and adversarial orderings. The property
/// tests feed random operation sequences and check the per-attempt
/// guarantees after every step.

#[cfg(test)]
mod stress_tests {
    use crate::config::DetectorConfig;
    use crate::pipeline::*;
    use crate::types::*;

    // ============================================================================
    // CATEGORY 1: EXTREME DURATION & THROUGHPUT
    // ============================================================================

    /// One hour at 50Hz: a target every 15 s, cycling through all outcomes.
    #[test]
    fn stress_one_hour_round_50hz() {
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(0);

        let mut tally = [0usize; 3];
        let mut record = |events: Vec<TimedEvent>| {
            for e in events {
                match e.event.outcome() {
                    Some(Outcome::HitFirstShot) => tally[0] += 1,
                    Some(Outcome::Miss) => tally[1] += 1,
                    Some(Outcome::HitSecondShot) => tally[2] += 1,
                    None => {}
                }
            }
        };

        let mut t = 0u64;
        while t < 3_600_000 {
            let cycle = t / 15_000;
            let offset = t % 15_000;

            record(pipeline.push_motion(MotionSample::new(t, 9.8)));
            record(pipeline.push_sound(SoundSample::new(t, -40.0)));

            let shoot = offset == 1000 || (offset == 1800 && cycle % 3 != 0);
            if shoot {
                record(pipeline.push_sound(SoundSample::new(t, -4.0)));
                record(pipeline.push_motion(MotionSample::new(t, 13.0)));
            }
            if cycle % 3 == 1 && (offset == 4300 || offset == 4500) {
                record(pipeline.push_motion(MotionSample::new(t, 19.0)));
            }
            t += 20;
        }
        record(pipeline.advance_to(t + 10_000));

        assert_eq!(tally, [80, 80, 80]);
        assert_eq!(pipeline.detector().outcomes_emitted(), 240);
        assert!(pipeline.total_samples() > 360_000);
    }

    /// Ten thousand taps while idle start exactly one session.
    #[test]
    fn stress_tap_storm() {
        let mut pipeline = ShotPipeline::with_defaults();
        let mut starts = 0;
        for i in 0..10_000u64 {
            for e in pipeline.push_motion(MotionSample::new(i * 30, 25.0)) {
                if e.event == DetectorEvent::SessionStarted {
                    starts += 1;
                }
            }
        }
        assert_eq!(starts, 1);
        assert_eq!(pipeline.detector().outstanding_timers(), 0);
    }

    // ============================================================================
    // CATEGORY 2: CORRUPTED INPUT
    // ============================================================================

    /// Non-finite values everywhere; the detector keeps working afterwards.
    #[test]
    fn stress_nan_and_inf_corruption() {
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(0);

        let pathological = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -f32::NAN];
        let mut t = 0;
        for _ in 0..1000 {
            for &value in &pathological {
                assert!(pipeline.push_motion(MotionSample::new(t, value)).is_empty());
                assert!(pipeline.push_sound(SoundSample::new(t, value)).is_empty());
                t += 5;
            }
        }
        assert_eq!(pipeline.detector().samples_discarded(), 8000);

        pipeline.push_sound(SoundSample::new(t, -5.0));
        pipeline.push_motion(MotionSample::new(t + 10, 12.0));
        let events = pipeline.advance_to(t + 10_000);
        assert_eq!(events.last().and_then(|e| e.event.outcome()), Some(Outcome::HitFirstShot));
    }

    /// Extreme but finite magnitudes behave like any other spike.
    #[test]
    fn stress_extreme_magnitudes() {
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(0);
        pipeline.push_sound(SoundSample::new(0, f32::MAX));
        pipeline.push_motion(MotionSample::new(5, f32::MAX));
        pipeline.push_motion(MotionSample::new(600, f32::MIN));
        pipeline.push_motion(MotionSample::new(700, -1.0e30));
        let events = pipeline.advance_to(10_000);
        assert_eq!(events.last().and_then(|e| e.event.outcome()), Some(Outcome::HitFirstShot));
    }

    // ============================================================================
    // CATEGORY 3: TEMPORAL CHAOS
    // ============================================================================

    /// Timestamps jumping backwards never produce out-of-order shots.
    #[test]
    fn stress_nonmonotonic_timestamps() {
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(0);

        let mut last_shot: Option<u64> = None;
        for i in 0..5_000u64 {
            let t = if i % 7 == 0 { i * 50 - (i % 300).min(i * 50) } else { i * 50 };
            pipeline.push_sound(SoundSample::new(t, -5.0));
            for e in pipeline.push_motion(MotionSample::new(t, 12.0)) {
                if let DetectorEvent::ShotAccepted { shot, at_ms } = e.event {
                    if shot == 2 {
                        if let Some(first) = last_shot {
                            assert!(at_ms > first);
                        }
                    }
                    last_shot = Some(at_ms);
                }
            }
            let state = pipeline.detector().state();
            assert!(state.shot_timestamps.windows(2).all(|w| w[0] < w[1]));
            assert!(pipeline.detector().outstanding_timers() <= 1);
        }
    }

    /// Timestamps close to the end of the clock range must not overflow.
    #[test]
    fn stress_clock_near_max() {
        let base = u64::MAX - 20_000;
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(base);
        pipeline.push_sound(SoundSample::new(base + 100, -5.0));
        pipeline.push_motion(MotionSample::new(base + 110, 12.0));
        pipeline.push_sound(SoundSample::new(base + 1000, -5.0));
        pipeline.push_motion(MotionSample::new(base + 1010, 12.0));

        let events = pipeline.advance_to(u64::MAX);
        assert_eq!(
            events.last().and_then(|e| e.event.outcome()),
            Some(Outcome::HitSecondShot)
        );
    }

    /// Constant activate/deactivate churn leaves nothing behind.
    #[test]
    fn stress_activation_churn() {
        let mut pipeline = ShotPipeline::with_defaults();
        let mut t = 0;
        for _ in 0..2_000 {
            pipeline.activate_at(t);
            pipeline.push_sound(SoundSample::new(t + 10, -5.0));
            pipeline.push_motion(MotionSample::new(t + 20, 12.0));
            let events = pipeline.deactivate_at(t + 1000);
            assert!(events.iter().all(|e| !e.event.is_outcome()));
            assert_eq!(pipeline.detector().timers().pending(), 0);
            t += 1_500;
        }
        assert!(pipeline.advance_to(t + 100_000).is_empty());
        assert_eq!(pipeline.detector().outcomes_emitted(), 0);
    }

    /// Reconfiguring in the middle of every attempt.
    #[test]
    fn stress_reconfigure_mid_attempt() {
        let mut pipeline = ShotPipeline::with_defaults();
        pipeline.activate_at(0);
        let mut outcomes = 0;
        let mut t = 0;
        for i in 0..200u64 {
            pipeline.push_sound(SoundSample::new(t, -5.0));
            pipeline.push_motion(MotionSample::new(t + 10, 12.0));
            let config = DetectorConfig {
                first_shot_timeout_ms: 1000 + (i % 5) * 500,
                ..DetectorConfig::default()
            };
            pipeline.configure(config).unwrap();
            outcomes += pipeline
                .advance_to(t + 6_000)
                .iter()
                .filter(|e| e.event.is_outcome())
                .count();
            t += 6_000;
        }
        assert_eq!(outcomes, 200);
    }

    // ============================================================================
    // CATEGORY 4: PROPERTIES
    // ============================================================================

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Motion { dt: u64, magnitude: f32 },
            Sound { dt: u64, level: f32 },
            Advance { dt: u64 },
            Activate,
            Deactivate,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (0u64..400, 0.0f32..25.0)
                    .prop_map(|(dt, magnitude)| Op::Motion { dt, magnitude }),
                3 => (0u64..400, -40.0f32..0.0).prop_map(|(dt, level)| Op::Sound { dt, level }),
                1 => (0u64..8_000).prop_map(|dt| Op::Advance { dt }),
                1 => Just(Op::Activate),
                1 => Just(Op::Deactivate),
            ]
        }

        /// Runs the operations, returning every event tagged with the index
        /// of the operation that produced it.
        fn run(ops: &[Op]) -> Result<Vec<(usize, TimedEvent)>, TestCaseError> {
            let mut pipeline = ShotPipeline::with_defaults();
            let mut t = 0u64;
            let mut out = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                let events = match *op {
                    Op::Motion { dt, magnitude } => {
                        t += dt;
                        pipeline.push_motion(MotionSample::new(t, magnitude))
                    }
                    Op::Sound { dt, level } => {
                        t += dt;
                        pipeline.push_sound(SoundSample::new(t, level))
                    }
                    Op::Advance { dt } => {
                        t += dt;
                        pipeline.advance_to(t)
                    }
                    Op::Activate => pipeline.activate_at(t),
                    Op::Deactivate => pipeline.deactivate_at(t),
                };
                out.extend(events.into_iter().map(|e| (i, e)));

                let detector = pipeline.detector();
                prop_assert!(detector.outstanding_timers() <= 1);
                prop_assert_eq!(detector.timers().pending(), detector.outstanding_timers());
                prop_assert!(detector.state().shot_timestamps.len() <= 2);
            }
            Ok(out)
        }

        proptest! {
            #[test]
            fn prop_one_outcome_per_attempt(ops in prop::collection::vec(op(), 1..300)) {
                let config = DetectorConfig::default();
                let events = run(&ops)?;

                let mut shots: Vec<u64> = Vec::new();
                let mut next = events.iter().peekable();
                for (i, op) in ops.iter().enumerate() {
                    while let Some((_, timed)) = next.next_if(|(idx, _)| *idx == i) {
                        match &timed.event {
                            DetectorEvent::ShotAccepted { shot, at_ms } => {
                                prop_assert_eq!(*shot as usize, shots.len() + 1);
                                if let Some(&last) = shots.last() {
                                    prop_assert!(*at_ms >= last + config.shot_debounce_ms);
                                }
                                shots.push(*at_ms);
                            }
                            DetectorEvent::Outcome(target) => {
                                prop_assert!(!shots.is_empty());
                                prop_assert_eq!(target.first_shot_ms, shots.first().copied());
                                prop_assert_eq!(target.second_shot_ms, shots.get(1).copied());
                                match target.outcome {
                                    Outcome::HitFirstShot => {
                                        prop_assert_eq!(shots.len(), 1);
                                        prop_assert!(timed.at_ms >= shots[0] + config.first_shot_timeout_ms);
                                    }
                                    Outcome::HitSecondShot => {
                                        prop_assert!(timed.at_ms >= shots[1] + config.second_shot_resolution_ms());
                                    }
                                    Outcome::Miss => {
                                        prop_assert!(timed.at_ms >= shots[1] + config.miss_window_delay_ms);
                                        prop_assert_eq!(target.miss_taps, config.miss_tap_count);
                                    }
                                }
                                shots.clear();
                            }
                            DetectorEvent::SessionStarted => prop_assert!(shots.is_empty()),
                            DetectorEvent::MissTap { .. } => prop_assert_eq!(shots.len(), 2),
                            DetectorEvent::SensorUnavailable { .. } => {
                                prop_assert!(false, "no capability errors in this run");
                            }
                        }
                    }
                    if matches!(op, Op::Deactivate) {
                        shots.clear();
                    }
                }
            }

            #[test]
            fn prop_silence_after_deactivate(ops in prop::collection::vec(op(), 1..300)) {
                let events = run(&ops)?;

                // Until the next activation, only a tap gesture may produce events,
                // and it must start with a session start.
                let mut silenced = false;
                let mut next = events.iter().peekable();
                for (i, op) in ops.iter().enumerate() {
                    if matches!(op, Op::Activate) {
                        silenced = false;
                    }
                    while let Some((_, timed)) = next.next_if(|(idx, _)| *idx == i) {
                        if silenced {
                            prop_assert_eq!(&timed.event, &DetectorEvent::SessionStarted);
                            silenced = false;
                        }
                    }
                    if matches!(op, Op::Deactivate) {
                        silenced = true;
                    }
                }
            }

            #[test]
            fn prop_replay_is_deterministic(ops in prop::collection::vec(op(), 1..200)) {
                let first = run(&ops)?;
                let second = run(&ops)?;
                prop_assert_eq!(first, second);
            }
        }
    }
}
