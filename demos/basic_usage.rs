/// Basic usage example: feed motion and sound samples, score a short round
use shot_sensing::pipeline::TimedEvent;
use shot_sensing::{DetectorEvent, MotionSample, Round, ShotPipeline, SoundSample};

fn main() {
    println!("=== Shot Sensing Engine: Basic Example ===\n");

    let mut pipeline = ShotPipeline::with_defaults();
    let mut round = Round::standard("demo");

    // (timestamp, magnitude) motion and (timestamp, level) sound, interleaved
    let session: Vec<(u64, Option<f32>, Option<f32>)> = vec![
        // Triple tap on the stock starts the session
        (0, Some(18.0), None),
        (250, Some(18.0), None),
        (500, Some(18.0), None),
        // Target 1: one shot, broken
        (2000, None, Some(-4.0)),
        (2015, Some(13.5), None),
        // Target 2: two shots, then two taps to flag a miss
        (8000, None, Some(-3.0)),
        (8012, Some(14.0), None),
        (8900, None, Some(-3.5)),
        (8910, Some(13.0), None),
        (11_500, Some(17.0), None),
        (11_800, Some(17.0), None),
        // Target 3: two shots, second one breaks it
        (14_000, None, Some(-4.5)),
        (14_020, Some(12.5), None),
        (14_700, None, Some(-4.0)),
        (14_711, Some(12.0), None),
    ];

    println!("Processing {} samples...\n", session.len());

    for (t, motion, sound) in session {
        if let Some(level) = sound {
            report(pipeline.push_sound(SoundSample::new(t, level)), &mut round);
        }
        if let Some(magnitude) = motion {
            report(pipeline.push_motion(MotionSample::new(t, magnitude)), &mut round);
        }
    }

    // Let the last target resolve
    report(pipeline.advance_to(30_000), &mut round);

    println!("\n=== Summary ===");
    println!("Score: {}/{}", round.score(), round.results().len());
    println!("Targets left: {}", round.remaining());
}

fn report(events: Vec<TimedEvent>, round: &mut Round) {
    for timed in events {
        match &timed.event {
            DetectorEvent::SessionStarted => println!("[{:>6} ms] session started", timed.at_ms),
            DetectorEvent::ShotAccepted { shot, .. } => {
                println!("[{:>6} ms] shot {shot}", timed.at_ms)
            }
            DetectorEvent::MissTap { count, .. } => {
                println!("[{:>6} ms] miss tap {count}", timed.at_ms)
            }
            DetectorEvent::Outcome(target) => {
                println!("[{:>6} ms] outcome: {}", timed.at_ms, target.outcome.as_str());
                if let Err(err) = round.record_detected(target) {
                    println!("           not scored: {err}");
                }
            }
            DetectorEvent::SensorUnavailable { stream } => {
                println!("[{:>6} ms] {} unavailable", timed.at_ms, stream.as_str())
            }
        }
    }
}
