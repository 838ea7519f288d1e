//! Async detector host.
//!
//! Runs a [`ShotDetector`] on a tokio task. Sensor samples, timer firings
//! and control commands all go through one queue, so the detector only ever
//! sees one input at a time.
//!
//! - Sensor feeds come from [`SampleSource`]s, each forwarded by its own task
//! - Timers are `tokio::time::sleep` tasks that post back into the queue
//! - Events go to an [`OutcomeConsumer`]
//!
//! The task stops on [`DetectorHandle::shutdown`] or once every sender into
//! the queue is gone. Teardown aborts the feed forwarders and every pending
//! timer before the consumer is handed back. Dropping the task without a
//! shutdown, e.g. through `JoinHandle::abort`, releases the feeds as well.
//!
//! A feed whose channel closes is reported as unavailable and is
//! resubscribed after the next successful `configure`.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::error::{ConfigError, RuntimeError, SensorError};
use crate::shot_detection::ShotDetector;
use crate::timers::{FiredTimer, TimerHandle, TimerService, TimerToken};
use crate::types::{DetectorEvent, MotionSample, SensorStream, SoundSample, TargetOutcome};

// ============================================================================
// COMMAND QUEUE
// ============================================================================

#[derive(Debug)]
enum Command {
    Motion(MotionSample),
    Sound(SoundSample),
    TimerFired(FiredTimer),
    Activate,
    Deactivate,
    Configure(DetectorConfig, oneshot::Sender<Result<(), ConfigError>>),
    FeedClosed { stream: SensorStream, generation: u64 },
    Shutdown,
}

// ============================================================================
// TIMERS
// ============================================================================

/// Timer service backed by tokio sleep tasks.
///
/// Holds only a weak sender so pending timers never keep the queue open.
#[derive(Debug)]
pub struct TokioTimers {
    queue: mpsc::WeakUnboundedSender<Command>,
    next_id: u64,
    tasks: HashMap<TimerHandle, AbortHandle>,
}

impl TokioTimers {
    fn new(queue: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            queue,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }
}

impl TimerService for TokioTimers {
    fn schedule(&mut self, delay_ms: u64, token: TimerToken) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        let queue = self.queue.clone();
        let task = tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;
            if let Some(queue) = queue.upgrade() {
                let _ = queue.send(Command::TimerFired(FiredTimer { handle, token }));
            }
        });
        self.tasks.insert(handle, task.abort_handle());
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ============================================================================
// SENSOR SOURCES
// ============================================================================

/// A sensor feed the host can subscribe to.
pub trait SampleSource<S>: Send {
    fn stream(&self) -> SensorStream;

    /// Hands out the sample feed. Fails when the platform refuses access.
    fn subscribe(&mut self) -> Result<mpsc::Receiver<S>, SensorError>;
}

/// A source wrapping an existing channel. Can be subscribed once.
#[derive(Debug)]
pub struct ChannelSource<S> {
    stream: SensorStream,
    rx: Option<mpsc::Receiver<S>>,
}

impl<S> ChannelSource<S> {
    pub fn new(stream: SensorStream, rx: mpsc::Receiver<S>) -> Self {
        Self {
            stream,
            rx: Some(rx),
        }
    }

    /// Creates a bounded channel and the source reading from it.
    pub fn channel(stream: SensorStream, capacity: usize) -> (mpsc::Sender<S>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(stream, rx))
    }
}

impl<S: Send> SampleSource<S> for ChannelSource<S> {
    fn stream(&self) -> SensorStream {
        self.stream
    }

    fn subscribe(&mut self) -> Result<mpsc::Receiver<S>, SensorError> {
        self.rx
            .take()
            .ok_or(SensorError::AlreadySubscribed(self.stream))
    }
}

/// A source that always fails, e.g. a denied microphone.
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    error: SensorError,
}

impl UnavailableSource {
    pub fn new(error: SensorError) -> Self {
        Self { error }
    }
}

impl<S> SampleSource<S> for UnavailableSource {
    fn stream(&self) -> SensorStream {
        self.error.stream()
    }

    fn subscribe(&mut self) -> Result<mpsc::Receiver<S>, SensorError> {
        Err(self.error.clone())
    }
}

// ============================================================================
// CONSUMER
// ============================================================================

/// Receives detector events on the detector task.
///
/// Override the per-kind hooks, or [`on_event`](Self::on_event) to see
/// every event as-is.
pub trait OutcomeConsumer: Send + 'static {
    fn on_session_start(&mut self) {}

    fn on_shot(&mut self, _shot: u8, _at_ms: u64) {}

    fn on_miss_tap(&mut self, _count: u32, _at_ms: u64) {}

    fn on_outcome(&mut self, outcome: &TargetOutcome);

    fn on_sensor_unavailable(&mut self, _stream: SensorStream) {}

    fn on_event(&mut self, event: &DetectorEvent) {
        match event {
            DetectorEvent::SessionStarted => self.on_session_start(),
            DetectorEvent::ShotAccepted { shot, at_ms } => self.on_shot(*shot, *at_ms),
            DetectorEvent::MissTap { count, at_ms } => self.on_miss_tap(*count, *at_ms),
            DetectorEvent::Outcome(outcome) => self.on_outcome(outcome),
            DetectorEvent::SensorUnavailable { stream } => self.on_sensor_unavailable(*stream),
        }
    }
}

/// Forwards every event into a channel.
impl OutcomeConsumer for mpsc::UnboundedSender<DetectorEvent> {
    fn on_outcome(&mut self, outcome: &TargetOutcome) {
        let _ = self.send(DetectorEvent::Outcome(outcome.clone()));
    }

    fn on_event(&mut self, event: &DetectorEvent) {
        let _ = self.send(event.clone());
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Control handle for a spawned detector. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DetectorHandle {
    queue: mpsc::UnboundedSender<Command>,
}

impl DetectorHandle {
    /// Start a session without the tap gesture.
    pub fn activate(&self) -> Result<(), RuntimeError> {
        self.send(Command::Activate)
    }

    /// End the session, discarding any partial attempt.
    pub fn deactivate(&self) -> Result<(), RuntimeError> {
        self.send(Command::Deactivate)
    }

    /// Inject a motion sample directly.
    pub fn push_motion(&self, sample: MotionSample) -> Result<(), RuntimeError> {
        self.send(Command::Motion(sample))
    }

    /// Inject a sound sample directly.
    pub fn push_sound(&self, sample: SoundSample) -> Result<(), RuntimeError> {
        self.send(Command::Sound(sample))
    }

    /// Replace the configuration. Unavailable streams are resubscribed
    /// after a successful change.
    pub async fn configure(&self, config: DetectorConfig) -> Result<(), RuntimeError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Configure(config, reply))?;
        result.await.map_err(|_| RuntimeError::Stopped)??;
        Ok(())
    }

    /// Ask the task to stop. Queued commands ahead of this one still run.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.queue.send(command).map_err(|_| RuntimeError::Stopped)
    }
}

// ============================================================================
// TASK
// ============================================================================

/// Spawn a detector task on the current tokio runtime.
///
/// Returns the control handle and the task, which yields the consumer back
/// once the detector stops.
pub fn spawn_detector<M, S, C>(
    config: DetectorConfig,
    motion: M,
    sound: S,
    consumer: C,
) -> Result<(DetectorHandle, JoinHandle<C>), ConfigError>
where
    M: SampleSource<MotionSample> + 'static,
    S: SampleSource<SoundSample> + 'static,
    C: OutcomeConsumer,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let detector = ShotDetector::new(config, TokioTimers::new(tx.downgrade()))?;

    let task = DetectorTask {
        detector,
        motion,
        sound,
        consumer,
        queue: tx.downgrade(),
        feeds: Feeds::default(),
    };
    let join = tokio::spawn(task.run(rx));
    Ok((DetectorHandle { queue: tx }, join))
}

struct DetectorTask<M, S, C> {
    detector: ShotDetector<TokioTimers>,
    motion: M,
    sound: S,
    consumer: C,
    queue: mpsc::WeakUnboundedSender<Command>,
    feeds: Feeds,
}

#[derive(Debug)]
struct Feed {
    task: JoinHandle<()>,
    generation: u64,
}

/// Forwarder tasks for the two sensor feeds. Aborted on drop.
#[derive(Debug, Default)]
struct Feeds {
    motion: Option<Feed>,
    sound: Option<Feed>,
    generation: u64,
}

impl Feeds {
    fn slot(&mut self, stream: SensorStream) -> &mut Option<Feed> {
        match stream {
            SensorStream::Motion => &mut self.motion,
            SensorStream::Sound => &mut self.sound,
        }
    }

    /// True when the stream has no live forwarder.
    fn is_missing(&self, stream: SensorStream) -> bool {
        let feed = match stream {
            SensorStream::Motion => &self.motion,
            SensorStream::Sound => &self.sound,
        };
        feed.as_ref().map_or(true, |feed| feed.task.is_finished())
    }

    fn install(&mut self, stream: SensorStream, spawn: impl FnOnce(u64) -> JoinHandle<()>) {
        self.generation += 1;
        let generation = self.generation;
        let task = spawn(generation);
        if let Some(old) = self.slot(stream).replace(Feed { task, generation }) {
            old.task.abort();
        }
    }

    /// Clears the slot if it still holds the closed feed. A close reported
    /// by an already replaced feed returns false.
    fn closed(&mut self, stream: SensorStream, generation: u64) -> bool {
        let slot = self.slot(stream);
        if slot.as_ref().is_some_and(|feed| feed.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

impl Drop for Feeds {
    fn drop(&mut self) {
        for feed in [self.motion.take(), self.sound.take()].into_iter().flatten() {
            feed.task.abort();
        }
    }
}

impl<M, S, C> DetectorTask<M, S, C>
where
    M: SampleSource<MotionSample>,
    S: SampleSource<SoundSample>,
    C: OutcomeConsumer,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) -> C {
        info!("detector task started");
        self.subscribe_missing();

        while let Some(command) = rx.recv().await {
            let event = match command {
                Command::Motion(sample) => self.detector.on_motion_sample(sample),
                Command::Sound(sample) => {
                    self.detector.on_sound_sample(sample);
                    None
                }
                Command::TimerFired(fired) => self.detector.on_timer(fired),
                Command::Activate => {
                    self.detector.activate();
                    None
                }
                Command::Deactivate => {
                    self.detector.deactivate();
                    None
                }
                Command::Configure(config, reply) => {
                    let result = self.detector.configure(config);
                    if result.is_ok() {
                        self.subscribe_missing();
                    }
                    let _ = reply.send(result);
                    None
                }
                Command::FeedClosed { stream, generation } => {
                    if self.feeds.closed(stream, generation) {
                        warn!(stream = stream.as_str(), "sensor feed closed");
                        self.detector.sensor_unavailable(stream)
                    } else {
                        None
                    }
                }
                Command::Shutdown => break,
            };
            if let Some(event) = event {
                self.consumer.on_event(&event);
            }
        }

        self.teardown()
    }

    fn subscribe_missing(&mut self) {
        let Some(queue) = self.queue.upgrade() else {
            return;
        };

        if self.feeds.is_missing(SensorStream::Motion) {
            match self.motion.subscribe() {
                Ok(rx) => self.feeds.install(SensorStream::Motion, |generation| {
                    forward(rx, queue.clone(), SensorStream::Motion, generation, Command::Motion)
                }),
                Err(err) => self.report_unavailable(err),
            }
        }
        if self.feeds.is_missing(SensorStream::Sound) {
            match self.sound.subscribe() {
                Ok(rx) => self.feeds.install(SensorStream::Sound, |generation| {
                    forward(rx, queue, SensorStream::Sound, generation, Command::Sound)
                }),
                Err(err) => self.report_unavailable(err),
            }
        }
    }

    fn report_unavailable(&mut self, err: SensorError) {
        warn!(error = %err, "sensor subscription failed");
        if let Some(event) = self.detector.sensor_unavailable(err.stream()) {
            self.consumer.on_event(&event);
        }
    }

    fn teardown(self) -> C {
        let DetectorTask {
            detector,
            consumer,
            feeds,
            ..
        } = self;
        drop(feeds);
        drop(detector);
        debug!("detector task stopped");
        consumer
    }
}

fn forward<S: Send + 'static>(
    mut rx: mpsc::Receiver<S>,
    queue: mpsc::UnboundedSender<Command>,
    stream: SensorStream,
    generation: u64,
    wrap: fn(S) -> Command,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(sample) = rx.recv().await {
            if queue.send(wrap(sample)).is_err() {
                return;
            }
        }
        let _ = queue.send(Command::FeedClosed { stream, generation });
    })
}
