//! Global pointer observation.
//!
//! A [`PointerSource`] produces raw positions from whatever the platform
//! offers (a low-level hook or a polling loop). [`PointerMonitor`] installs
//! one, coalesces bursts down to a bounded rate, stamps each sample with the
//! "inside controlled window" flag and hands it to a single subscriber.

mod hook;
mod mock;
mod poll;

pub use hook::HookSource;
pub use mock::{MockPointerHandle, MockPointerSource};
pub use poll::{CursorPositionProvider, PollingSource, SystemCursor};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::ControllerError;
use crate::geometry::Rect;
use crate::worker::{stop_requested, Worker};

/// Upper bound on how long the coalescing loop waits before re-checking stop.
const IDLE_WAIT: Duration = Duration::from_millis(20);

/// Position as reported by a source, before coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPointer {
    pub x: i32,
    pub y: i32,
    pub at: Instant,
    pub pressed: bool,
}

impl RawPointer {
    pub fn moved(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            at: Instant::now(),
            pressed: false,
        }
    }

    pub fn pressed(x: i32, y: i32) -> Self {
        Self {
            pressed: true,
            ..Self::moved(x, y)
        }
    }
}

/// Sample delivered to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSample {
    pub x: i32,
    pub y: i32,
    pub at: Instant,
    pub inside_window: bool,
    pub pressed: bool,
}

impl PointerSample {
    pub fn at_point(x: i32, y: i32, inside_window: bool) -> Self {
        Self {
            x,
            y,
            at: Instant::now(),
            inside_window,
            pressed: false,
        }
    }
}

/// Platform strategy producing raw pointer positions.
pub trait PointerSource: Send {
    fn name(&self) -> &'static str;
    fn install(&mut self, sender: Sender<RawPointer>) -> anyhow::Result<()>;
    /// Must not return `Ok` while the source can still send. Gives up with
    /// an error once `budget` has passed.
    fn uninstall(&mut self, budget: Duration) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
}

/// The single subscriber of a monitor.
pub trait SampleSink: Send + Sync {
    /// Returns `false` once the subscriber is gone.
    fn deliver(&self, sample: PointerSample) -> bool;
}

impl SampleSink for Sender<PointerSample> {
    fn deliver(&self, sample: PointerSample) -> bool {
        self.send(sample).is_ok()
    }
}

/// Window rectangle shared between the executor (writer) and the monitor.
#[derive(Debug, Clone, Default)]
pub struct SharedBounds {
    rect: Arc<RwLock<Option<Rect>>>,
}

impl SharedBounds {
    pub fn set(&self, rect: Rect) {
        match self.rect.write() {
            Ok(mut guard) => *guard = Some(rect),
            Err(err) => tracing::error!(?err, "failed to update window bounds"),
        }
    }

    pub fn get(&self) -> Option<Rect> {
        self.rect.read().ok().and_then(|r| *r)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.get().map_or(false, |r| r.contains(x, y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Hook,
    Polling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub prefer_hook: bool,
    /// Minimum spacing between delivered samples.
    pub min_interval: Duration,
    pub stop_budget: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            prefer_hook: true,
            min_interval: Duration::from_millis(16),
            stop_budget: Duration::from_millis(500),
        }
    }
}

struct Running {
    strategy: Strategy,
    worker: Worker,
    delivering: Arc<AtomicBool>,
}

pub struct PointerMonitor {
    config: MonitorConfig,
    hook: Box<dyn PointerSource>,
    poller: Box<dyn PointerSource>,
    bounds: SharedBounds,
    running: Option<Running>,
}

impl PointerMonitor {
    pub fn new(
        config: MonitorConfig,
        hook: Box<dyn PointerSource>,
        poller: Box<dyn PointerSource>,
        bounds: SharedBounds,
    ) -> Self {
        Self {
            config,
            hook,
            poller,
            bounds,
            running: None,
        }
    }

    /// Monitor backed by the platform hook with cursor polling as fallback.
    pub fn system(config: MonitorConfig, poll_interval: Duration, bounds: SharedBounds) -> Self {
        Self::new(
            config,
            Box::new(HookSource::default()),
            Box::new(PollingSource::new(Arc::new(SystemCursor), poll_interval)),
            bounds,
        )
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.running.as_ref().map(|r| r.strategy)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start delivering samples to `sink`. Idempotent while running.
    pub fn start(&mut self, sink: Arc<dyn SampleSink>) -> Result<Strategy, ControllerError> {
        if let Some(running) = &self.running {
            return Ok(running.strategy);
        }

        let (raw_tx, raw_rx) = mpsc::channel();
        let strategy = self.install_source(raw_tx)?;

        let delivering = Arc::new(AtomicBool::new(true));
        let gate = Arc::clone(&delivering);
        let bounds = self.bounds.clone();
        let min_interval = self.config.min_interval;
        let worker = Worker::spawn("edge-dock-pointer", move |stop_rx| {
            coalesce_loop(raw_rx, stop_rx, sink, bounds, min_interval, gate)
        });
        match worker {
            Ok(worker) => {
                tracing::info!(?strategy, "pointer monitor started");
                self.running = Some(Running {
                    strategy,
                    worker,
                    delivering,
                });
                Ok(strategy)
            }
            Err(err) => {
                let budget = self.config.stop_budget;
                let _ = self.source_mut(strategy).uninstall(budget);
                Err(ControllerError::PointerSourceUnavailable {
                    reason: format!("failed to spawn pointer thread: {err}"),
                })
            }
        }
    }

    /// Stop and block until no further sample can be delivered.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        self.stop_within(self.config.stop_budget)
    }

    /// [`stop`](Self::stop) with the source and the delivery thread sharing
    /// one `budget`.
    pub fn stop_within(&mut self, budget: Duration) -> Result<(), ControllerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.delivering.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + budget;

        let mut stalled = Vec::new();
        if let Err(err) = self.source_mut(running.strategy).uninstall(budget) {
            tracing::error!(%err, "failed to uninstall pointer source");
            stalled.push("pointer source");
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if let Err(name) = running.worker.stop(left) {
            stalled.push(name);
        }
        tracing::info!(strategy = ?running.strategy, "pointer monitor stopped");

        if stalled.is_empty() {
            Ok(())
        } else {
            Err(ControllerError::ShutdownTimeout { budget, stalled })
        }
    }

    fn install_source(&mut self, raw_tx: Sender<RawPointer>) -> Result<Strategy, ControllerError> {
        if self.config.prefer_hook {
            match self.hook.install(raw_tx.clone()) {
                Ok(()) => return Ok(Strategy::Hook),
                Err(err) => tracing::warn!(
                    source = self.hook.name(),
                    error = %err,
                    "pointer hook unavailable; degraded to polling"
                ),
            }
        }
        match self.poller.install(raw_tx) {
            Ok(()) => Ok(Strategy::Polling),
            Err(err) => Err(ControllerError::PointerSourceUnavailable {
                reason: err.to_string(),
            }),
        }
    }

    fn source_mut(&mut self, strategy: Strategy) -> &mut Box<dyn PointerSource> {
        match strategy {
            Strategy::Hook => &mut self.hook,
            Strategy::Polling => &mut self.poller,
        }
    }
}

impl Drop for PointerMonitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(%err, "pointer monitor drop");
        }
    }
}

fn merge(pending: Option<RawPointer>, next: RawPointer) -> RawPointer {
    match pending {
        Some(prev) => RawPointer {
            pressed: prev.pressed || next.pressed,
            ..next
        },
        None => next,
    }
}

fn coalesce_loop(
    raw_rx: Receiver<RawPointer>,
    stop_rx: Receiver<()>,
    sink: Arc<dyn SampleSink>,
    bounds: SharedBounds,
    min_interval: Duration,
    delivering: Arc<AtomicBool>,
) {
    let mut pending: Option<RawPointer> = None;
    let mut last_forward: Option<Instant> = None;
    let mut last_sent: Option<(i32, i32, bool)> = None;

    loop {
        if stop_requested(&stop_rx) {
            break;
        }

        let wait = match (pending, last_forward) {
            (Some(_), Some(at)) => min_interval.saturating_sub(at.elapsed()).min(IDLE_WAIT),
            _ => IDLE_WAIT,
        };
        match raw_rx.recv_timeout(wait) {
            Ok(raw) => {
                pending = Some(merge(pending, raw));
                while let Ok(raw) = raw_rx.try_recv() {
                    pending = Some(merge(pending, raw));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if pending.is_none() {
                    break;
                }
            }
        }

        let Some(raw) = pending else {
            continue;
        };
        let due = last_forward.map_or(true, |at| at.elapsed() >= min_interval);
        if !due {
            continue;
        }
        pending = None;

        let inside_window = bounds.contains(raw.x, raw.y);
        let key = (raw.x, raw.y, inside_window);
        if !raw.pressed && last_sent == Some(key) {
            continue;
        }
        if !delivering.load(Ordering::SeqCst) {
            break;
        }
        let sample = PointerSample {
            x: raw.x,
            y: raw.y,
            at: raw.at,
            inside_window,
            pressed: raw.pressed,
        };
        if !sink.deliver(sample) {
            tracing::debug!("pointer subscriber gone");
            break;
        }
        last_sent = Some(key);
        last_forward = Some(Instant::now());
    }
}
