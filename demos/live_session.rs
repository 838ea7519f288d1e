/// Live session example: run the detector on tokio with channel-fed sensors
use std::time::Duration;

use shot_sensing::runtime::{spawn_detector, ChannelSource, OutcomeConsumer};
use shot_sensing::{DetectorConfig, MotionSample, SensorStream, SoundSample, TargetOutcome};

/// Prints every outcome and keeps a running score.
#[derive(Debug, Default)]
struct Scoreboard {
    hits: usize,
    targets: usize,
}

impl OutcomeConsumer for Scoreboard {
    fn on_session_start(&mut self) {
        println!("session started");
    }

    fn on_shot(&mut self, shot: u8, at_ms: u64) {
        println!("shot {shot} at {at_ms} ms");
    }

    fn on_outcome(&mut self, outcome: &TargetOutcome) {
        self.targets += 1;
        if outcome.outcome.is_hit() {
            self.hits += 1;
        }
        println!(
            "target {}: {} ({}/{})",
            self.targets,
            outcome.outcome.as_str(),
            self.hits,
            self.targets
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config = DetectorConfig {
        first_shot_timeout_ms: 1_000,
        ..DetectorConfig::default()
    };
    let (motion_tx, motion) = ChannelSource::channel(SensorStream::Motion, 64);
    let (sound_tx, sound) = ChannelSource::channel(SensorStream::Sound, 64);
    let (handle, task) = spawn_detector(config, motion, sound, Scoreboard::default())?;

    handle.activate()?;

    // Simulated report and recoil.
    sound_tx.send(SoundSample::new(100, -4.0)).await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    motion_tx.send(MotionSample::new(110, 13.0)).await?;

    // Wait for the first-shot timeout to score the target.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    handle.shutdown()?;
    let board = task.await?;
    println!("final score: {}/{}", board.hits, board.targets);
    Ok(())
}
