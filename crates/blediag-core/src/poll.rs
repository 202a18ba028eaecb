//! Periodic polling of one characteristic into the session series.
//!
//! The scheduler holds at most one repeating timer. Each tick reads the
//! target and appends a [`Sample`](blediag_types::Sample); when the target is
//! not readable but can notify, the tick sets up a notification
//! subscription that appends samples instead. That subscription belongs to
//! the scheduler and is torn down whenever polling stops or restarts. If the
//! caller already holds a subscription on the same characteristic, the
//! scheduler leaves it alone and the series gets no samples from it.
//!
//! ```ignore
//! let scheduler = PollScheduler::new(session.clone(), target);
//! scheduler.start(Duration::from_secs(2)).await?;
//! // ...
//! scheduler.stop().await;
//! println!("{}", session.series().to_csv().await);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blediag_types::{CharacteristicRef, Format};

use crate::error::{Error, Result};
use crate::session::{ConnectionSession, DEFAULT_SETTLE};

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What to do when a tick fires while the previous one is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickOverlap {
    /// Start the new tick anyway.
    #[default]
    Concurrent,
    /// Skip the tick. Skipped ticks are not counted.
    SkipWhileBusy,
}

/// Options for the poll scheduler.
///
/// ```ignore
/// let options = PollOptions::builder()
///     .interval(Duration::from_secs(2))
///     .format(Format::Uint16Be)
///     .overlap(TickOverlap::SkipWhileBusy)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Time between ticks. Default: 1 second.
    pub interval: Duration,
    /// Decode format for appended samples. Default: `Auto`.
    pub format: Format,
    /// Guard settle delay used by each tick. Default: 500 ms.
    pub settle: Duration,
    pub overlap: TickOverlap,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: MIN_POLL_INTERVAL,
            format: Format::Auto,
            settle: DEFAULT_SETTLE,
            overlap: TickOverlap::default(),
        }
    }
}

impl PollOptions {
    /// Create a new builder for PollOptions.
    pub fn builder() -> PollOptionsBuilder {
        PollOptionsBuilder::default()
    }

    /// Options with a specific interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Reject intervals below [`MIN_POLL_INTERVAL`].
    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_POLL_INTERVAL {
            return Err(Error::invalid_config(format!(
                "poll interval must be at least {} ms, got {} ms",
                MIN_POLL_INTERVAL.as_millis(),
                self.interval.as_millis()
            )));
        }
        Ok(())
    }
}

/// Builder for PollOptions.
#[derive(Debug, Clone, Default)]
pub struct PollOptionsBuilder {
    options: PollOptions,
}

impl PollOptionsBuilder {
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.options.interval = interval;
        self
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.options.format = format;
        self
    }

    /// Set the guard settle delay used by each tick.
    #[must_use]
    pub fn settle(mut self, settle: Duration) -> Self {
        self.options.settle = settle;
        self
    }

    #[must_use]
    pub fn overlap(mut self, overlap: TickOverlap) -> Self {
        self.options.overlap = overlap;
        self
    }

    #[must_use]
    pub fn build(self) -> PollOptions {
        self.options
    }
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub running: bool,
    pub interval: Duration,
    /// Ticks since the last (re)start.
    pub invocation_count: u64,
}

struct RunningPoll {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SchedulerState {
    target: CharacteristicRef,
    options: PollOptions,
    running: Option<RunningPoll>,
}

/// Single-timer poll scheduler bound to one session.
pub struct PollScheduler {
    session: Arc<ConnectionSession>,
    state: Mutex<SchedulerState>,
    invocations: Arc<AtomicU64>,
}

impl PollScheduler {
    /// Create a stopped scheduler with default options.
    pub fn new(session: Arc<ConnectionSession>, target: CharacteristicRef) -> Self {
        Self::with_options(session, target, PollOptions::default())
    }

    /// Create a stopped scheduler.
    pub fn with_options(
        session: Arc<ConnectionSession>,
        target: CharacteristicRef,
        options: PollOptions,
    ) -> Self {
        Self {
            session,
            state: Mutex::new(SchedulerState {
                target,
                options,
                running: None,
            }),
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start polling every `interval`.
    ///
    /// The first tick runs immediately. Does nothing when already running.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when `interval` is below [`MIN_POLL_INTERVAL`].
    pub async fn start(&self, interval: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let options = PollOptions {
            interval,
            ..state.options.clone()
        };
        options.validate()?;

        if state.running.is_some() {
            debug!("Poll already running, ignoring start");
            return Ok(());
        }

        state.options = options;
        self.launch(&mut state);
        Ok(())
    }

    /// Stop polling. Idempotent.
    ///
    /// In-flight reads are not aborted, but their samples are only kept if
    /// they land before the next `clear`. A notification fallback set up by
    /// the ticks is torn down.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        Self::halt(&mut state);
        self.session.release_series_subscription().await;
    }

    /// Poll a different characteristic, restarting if running.
    pub async fn set_target(&self, target: CharacteristicRef) {
        let mut state = self.state.lock().await;
        state.target = target;
        self.restart(&mut state).await;
    }

    /// Change the interval, restarting if running.
    pub async fn set_interval(&self, interval: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        let options = PollOptions {
            interval,
            ..state.options.clone()
        };
        options.validate()?;
        state.options = options;
        self.restart(&mut state).await;
        Ok(())
    }

    /// Change the decode format, restarting if running.
    pub async fn set_format(&self, format: Format) {
        let mut state = self.state.lock().await;
        state.options.format = format;
        self.restart(&mut state).await;
    }

    /// Current state.
    pub async fn state(&self) -> PollState {
        let state = self.state.lock().await;
        PollState {
            running: state
                .running
                .as_ref()
                .is_some_and(|running| !running.handle.is_finished()),
            interval: state.options.interval,
            invocation_count: self.invocations.load(Ordering::SeqCst),
        }
    }

    /// The characteristic being polled.
    pub async fn target(&self) -> CharacteristicRef {
        self.state.lock().await.target
    }

    /// Cancels the timer. Returns whether one was running.
    fn halt(state: &mut SchedulerState) -> bool {
        match state.running.take() {
            Some(running) => {
                running.cancel.cancel();
                info!("Polling of {} stopped", state.target);
                true
            }
            None => false,
        }
    }

    /// Stop-then-start, when running.
    async fn restart(&self, state: &mut SchedulerState) {
        if Self::halt(state) {
            self.session.release_series_subscription().await;
            self.launch(state);
        }
    }

    fn launch(&self, state: &mut SchedulerState) {
        self.invocations.store(0, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        let session = Arc::clone(&self.session);
        let invocations = Arc::clone(&self.invocations);
        let target = state.target;
        let options = state.options.clone();
        let busy = Arc::new(AtomicBool::new(false));

        info!(
            "Polling {} every {} ms",
            target,
            options.interval.as_millis()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Poll timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if options.overlap == TickOverlap::SkipWhileBusy
                            && busy.swap(true, Ordering::SeqCst)
                        {
                            debug!("Previous tick still running, skipping");
                            continue;
                        }
                        let count = invocations.fetch_add(1, Ordering::SeqCst) + 1;

                        let session = Arc::clone(&session);
                        let busy = Arc::clone(&busy);
                        let token = task_token.clone();
                        let format = options.format;
                        let settle = options.settle;
                        tokio::spawn(async move {
                            let tick = run_tick(&session, &target, format, settle, &token);
                            if let Err(e) = tick.await {
                                warn!("Poll tick {} on {} failed: {}", count, target, e);
                            }
                            busy.store(false, Ordering::SeqCst);
                        });
                    }
                }
            }
        });

        state.running = Some(RunningPoll { cancel, handle });
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().running.take() {
            running.cancel.cancel();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let session = Arc::clone(&self.session);
                runtime.spawn(async move { session.release_series_subscription().await });
            }
        }
    }
}

/// One poll tick: guard, resolve, then read or fall back to notifications.
async fn run_tick(
    session: &ConnectionSession,
    target: &CharacteristicRef,
    format: Format,
    settle: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let series = session.series();
    let generation = series.generation().await;

    session.ensure(settle).await?;
    let characteristic = session.resolve_characteristic(target).await?;

    if characteristic.capabilities.read {
        let bytes = session.transport.read(&characteristic).await?;
        let sample = session.make_sample(bytes, format, target);
        series.push_if_generation(generation, sample).await;
        Ok(())
    } else if characteristic.capabilities.can_push() {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if session.subscribe_into_series(target, format).await? {
            // The poll may have stopped while this tick was subscribing.
            if cancel.is_cancelled() {
                session.release_series_subscription().await;
            } else {
                info!("{} is not readable, collecting notifications instead", target);
            }
        }
        Ok(())
    } else {
        Err(Error::unsupported("poll", target.characteristic))
    }
}
