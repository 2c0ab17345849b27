//! Owns the controller's threads and their ordered teardown.
//!
//! [`Controller::start`] spawns one event-loop thread that owns the
//! [`VisibilityMachine`]. Pointer samples, explicit requests and timer
//! deadlines are all consumed there. [`Controller::stop`] tears everything
//! down in a fixed order and returns only once no background callback can
//! run again.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::displays::{DisplayProvider, SystemDisplays};
use crate::error::{ControllerError, ShutdownReport, TransitionError};
use crate::executor::{TransitionExecutor, TransitionRequest, TransitionSink};
use crate::geometry::{Rect, ScreenMetrics};
use crate::machine::{MachineConfig, Mode, StateListener, VisibilityMachine, VisibilityState};
use crate::pointer::{
    PointerMonitor, PointerSample, PointerSource, SampleSink, SharedBounds, Strategy,
};
use crate::settings::WindowSettings;
use crate::surface::WindowSurface;
use crate::timer::{Clock, SystemClock};
use crate::worker::{stop_requested, Worker};

const IDLE_WAIT: Duration = Duration::from_millis(50);
const FALLBACK_SCREEN: (i32, i32) = (1920, 1080);

enum Command {
    Pointer(PointerSample),
    Pin(Sender<()>),
    Unpin(Sender<()>),
    Reveal,
    Hide,
    Toggle,
    AlwaysVisible,
    Metrics(ScreenMetrics),
    Config(MachineConfig),
    PinnedMoved(i32, i32),
    CancelTimers(Sender<usize>),
    Freeze(Sender<FreezeOutcome>),
}

struct FreezeOutcome {
    timers_cancelled: usize,
    sink: Result<(), &'static str>,
}

/// Forwards monitor samples into the event loop.
struct LoopSink {
    tx: Sender<Command>,
}

impl SampleSink for LoopSink {
    fn deliver(&self, sample: PointerSample) -> bool {
        self.tx.send(Command::Pointer(sample)).is_ok()
    }
}

/// Keeps the monitor's view of the window in step with a custom sink.
struct BoundsSink {
    inner: Box<dyn TransitionSink>,
    bounds: SharedBounds,
}

impl TransitionSink for BoundsSink {
    fn submit(&mut self, request: TransitionRequest) -> Result<(), TransitionError> {
        self.inner.submit(request)?;
        self.bounds.set(request.rect);
        Ok(())
    }

    fn close(&mut self) -> Result<(), &'static str> {
        self.inner.close()
    }
}

/// State mirrored out of the event loop for lock-free queries.
#[derive(Default)]
struct Published {
    state: AtomicU8,
    always_visible: AtomicBool,
    pin_deferred: AtomicBool,
    geometry_fallbacks: AtomicUsize,
}

impl Published {
    fn publish(&self, machine: &VisibilityMachine) {
        self.state.store(machine.state().as_u8(), Ordering::SeqCst);
        self.always_visible
            .store(machine.mode() == Mode::AlwaysVisible, Ordering::SeqCst);
        self.pin_deferred
            .store(machine.is_pin_deferred(), Ordering::SeqCst);
        self.geometry_fallbacks
            .store(machine.geometry_fallbacks(), Ordering::SeqCst);
    }
}

enum SinkSpec {
    Surface(Box<dyn WindowSurface>),
    Custom(Box<dyn TransitionSink>),
}

struct Parts {
    sink: SinkSpec,
    hook: Option<Box<dyn PointerSource>>,
    poller: Option<Box<dyn PointerSource>>,
    displays: Arc<dyn DisplayProvider>,
    clock: Arc<dyn Clock>,
    listener: Option<Box<dyn StateListener>>,
}

struct Running {
    tx: Sender<Command>,
    worker: Worker,
    monitor: PointerMonitor,
}

pub struct ControllerBuilder {
    settings: WindowSettings,
    sink: Option<SinkSpec>,
    hook: Option<Box<dyn PointerSource>>,
    poller: Option<Box<dyn PointerSource>>,
    displays: Option<Arc<dyn DisplayProvider>>,
    clock: Option<Arc<dyn Clock>>,
    listener: Option<Box<dyn StateListener>>,
}

impl ControllerBuilder {
    /// Window the executor drives.
    pub fn surface(mut self, surface: impl WindowSurface + 'static) -> Self {
        self.sink = Some(SinkSpec::Surface(Box::new(surface)));
        self
    }

    /// Replace the animation executor entirely.
    pub fn sink(mut self, sink: impl TransitionSink + 'static) -> Self {
        self.sink = Some(SinkSpec::Custom(Box::new(sink)));
        self
    }

    pub fn pointer_sources(
        mut self,
        hook: impl PointerSource + 'static,
        poller: impl PointerSource + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self.poller = Some(Box::new(poller));
        self
    }

    pub fn displays(mut self, displays: Arc<dyn DisplayProvider>) -> Self {
        self.displays = Some(displays);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn listener(mut self, listener: impl StateListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn build(self) -> Controller {
        let settings = self.settings.sanitized();
        let displays = self
            .displays
            .unwrap_or_else(|| Arc::new(SystemDisplays::new(FALLBACK_SCREEN)));
        let sink = self
            .sink
            .unwrap_or_else(|| SinkSpec::Custom(Box::new(NullSink)));
        Controller {
            settings,
            bounds: SharedBounds::default(),
            published: Arc::new(Published::default()),
            pin_on_start: false,
            strategy: None,
            parts: Some(Parts {
                sink,
                hook: self.hook,
                poller: self.poller,
                displays,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                listener: self.listener,
            }),
            running: None,
            stopped: false,
        }
    }
}

/// Sink used when the host supplies no window.
struct NullSink;

impl TransitionSink for NullSink {
    fn submit(&mut self, _request: TransitionRequest) -> Result<(), TransitionError> {
        Ok(())
    }
}

/// Explicitly owned edge-dock controller for one window.
pub struct Controller {
    settings: WindowSettings,
    bounds: SharedBounds,
    published: Arc<Published>,
    pin_on_start: bool,
    strategy: Option<Strategy>,
    parts: Option<Parts>,
    running: Option<Running>,
    stopped: bool,
}

impl Controller {
    pub fn builder(settings: WindowSettings) -> ControllerBuilder {
        ControllerBuilder {
            settings,
            sink: None,
            hook: None,
            poller: None,
            displays: None,
            clock: None,
            listener: None,
        }
    }

    /// Wire the pointer monitor into the state machine. Idempotent.
    ///
    /// A disabled feature or an unavailable pointer source is not an error:
    /// the controller degrades to always-visible mode.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.running.is_some() {
            return Ok(());
        }
        if self.stopped {
            tracing::warn!("start ignored; controller already shut down");
            return Ok(());
        }
        let Some(parts) = self.parts.take() else {
            return Err(ControllerError::NotRunning);
        };

        let Parts {
            sink,
            hook,
            poller,
            displays,
            clock,
            listener,
        } = parts;

        let settings = &self.settings;
        let sink: Box<dyn TransitionSink> = match sink {
            SinkSpec::Surface(surface) => {
                let executor = TransitionExecutor::spawn(
                    surface,
                    Arc::clone(&displays),
                    self.bounds.clone(),
                    settings.executor_config(),
                )
                .map_err(|source| ControllerError::Spawn {
                    name: "edge-dock-animate",
                    source,
                })?;
                Box::new(executor)
            }
            SinkSpec::Custom(inner) => Box::new(BoundsSink {
                inner,
                bounds: self.bounds.clone(),
            }),
        };

        let metrics = initial_metrics(displays.as_ref(), settings.edge_trigger_width);
        let mut machine = VisibilityMachine::new(
            settings.machine_config(),
            metrics,
            sink,
            displays,
            Arc::clone(&clock),
        );
        if let Some(listener) = listener {
            machine.set_listener(listener);
        }
        machine.start();
        if settings.start_pinned {
            machine.reveal();
        }
        if settings.start_pinned || self.pin_on_start {
            machine.pin();
        }
        self.published.publish(&machine);

        let (tx, rx) = mpsc::channel();
        let published = Arc::clone(&self.published);
        let worker = Worker::spawn("edge-dock-events", move |stop_rx| {
            event_loop(machine, rx, stop_rx, clock, published)
        })
        .map_err(|source| ControllerError::Spawn {
            name: "edge-dock-events",
            source,
        })?;

        let mut monitor = match (hook, poller) {
            (Some(hook), Some(poller)) => PointerMonitor::new(
                settings.monitor_config(),
                hook,
                poller,
                self.bounds.clone(),
            ),
            _ => PointerMonitor::system(
                settings.monitor_config(),
                settings.poll_interval(),
                self.bounds.clone(),
            ),
        };

        let always_visible = if !settings.enabled {
            tracing::info!("edge hiding disabled; window stays visible");
            true
        } else {
            let sink = Arc::new(LoopSink { tx: tx.clone() });
            match monitor.start(sink) {
                Ok(strategy) => {
                    self.strategy = Some(strategy);
                    false
                }
                Err(err) => {
                    tracing::warn!(%err, "degraded to always-visible mode");
                    true
                }
            }
        };

        self.running = Some(Running {
            tx,
            worker,
            monitor,
        });
        if always_visible {
            self.send(Command::AlwaysVisible);
        }
        tracing::info!(strategy = ?self.strategy, "edge dock controller started");
        Ok(())
    }

    /// Tear down in order: cancel timers, stop the pointer monitor, freeze the
    /// state machine, then release the window executor.
    ///
    /// Safe to call repeatedly; only the first call does any work.
    pub fn stop(&mut self) -> Result<ShutdownReport, ControllerError> {
        let budget = self.settings.shutdown_budget();
        let Some(running) = self.running.take() else {
            self.stopped = true;
            self.parts = None;
            return Ok(ShutdownReport::default());
        };
        self.stopped = true;

        let Running {
            tx,
            worker,
            mut monitor,
        } = running;
        let started = Instant::now();
        let deadline = started + budget;
        let mut report = ShutdownReport::default();

        match request(&tx, Command::CancelTimers, remaining(deadline)) {
            Some(count) => report.timers_cancelled = count,
            None => report.stalled.push("timer service"),
        }

        match monitor.stop_within(remaining(deadline)) {
            Ok(()) => {}
            Err(ControllerError::ShutdownTimeout { stalled, .. }) => report.stalled.extend(stalled),
            Err(err) => {
                tracing::error!(%err, "pointer monitor stop failed");
                report.stalled.push("pointer monitor");
            }
        }

        match request(&tx, Command::Freeze, remaining(deadline)) {
            Some(outcome) => {
                report.timers_cancelled += outcome.timers_cancelled;
                if let Err(name) = outcome.sink {
                    report.stalled.push(name);
                }
            }
            None => report.stalled.push("state machine"),
        }
        drop(tx);

        if let Err(name) = worker.stop(remaining(deadline)) {
            report.stalled.push(name);
        }
        report.geometry_fallbacks = self.published.geometry_fallbacks.load(Ordering::SeqCst);
        report.elapsed = started.elapsed();

        if report.is_clean() {
            tracing::info!(
                timers_cancelled = report.timers_cancelled,
                elapsed = ?report.elapsed,
                "edge dock controller stopped"
            );
        } else {
            tracing::error!(stalled = ?report.stalled, ?budget, "edge dock shutdown incomplete");
        }
        report.into_result(budget)
    }

    /// Host entry point; must be called before the window is torn down.
    pub fn request_shutdown(&mut self) -> Result<ShutdownReport, ControllerError> {
        self.stop()
    }

    /// Hold the window visible and suspend auto-hide. Deferred while the
    /// window is hidden or peeking.
    pub fn pin(&mut self) {
        match &self.running {
            Some(running) => {
                if request(&running.tx, Command::Pin, self.settings.shutdown_budget()).is_none() {
                    tracing::warn!("pin request not acknowledged");
                }
            }
            None if !self.stopped => self.pin_on_start = true,
            None => {}
        }
    }

    pub fn unpin(&mut self) {
        match &self.running {
            Some(running) => {
                if request(&running.tx, Command::Unpin, self.settings.shutdown_budget()).is_none() {
                    tracing::warn!("unpin request not acknowledged");
                }
            }
            None => self.pin_on_start = false,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.state() == VisibilityState::Pinned
    }

    /// A pin request is waiting for the window to become visible.
    pub fn is_pin_pending(&self) -> bool {
        match &self.running {
            Some(_) => self.published.pin_deferred.load(Ordering::SeqCst),
            None => self.pin_on_start && !self.stopped,
        }
    }

    pub fn state(&self) -> VisibilityState {
        VisibilityState::from_u8(self.published.state.load(Ordering::SeqCst))
    }

    pub fn mode(&self) -> Mode {
        if self.published.always_visible.load(Ordering::SeqCst) {
            Mode::AlwaysVisible
        } else {
            Mode::AutoHide
        }
    }

    pub fn geometry_fallbacks(&self) -> usize {
        self.published.geometry_fallbacks.load(Ordering::SeqCst)
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// Rectangle most recently requested for the window.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds.get()
    }

    pub fn reveal(&self) {
        self.send(Command::Reveal);
    }

    pub fn hide(&self) {
        self.send(Command::Hide);
    }

    pub fn toggle(&self) {
        self.send(Command::Toggle);
    }

    /// Record where the user dragged the pinned window.
    pub fn set_pinned_position(&mut self, x: i32, y: i32) {
        self.settings.pinned_position = Some((x, y));
        self.send(Command::PinnedMoved(x, y));
    }

    /// New display snapshot, for resolution or monitor changes.
    pub fn set_metrics(&self, metrics: ScreenMetrics) {
        self.send(Command::Metrics(metrics));
    }

    /// Apply new settings to a running controller. Timing and geometry take
    /// effect on the next transition; pointer source and animation settings
    /// apply on the next start.
    pub fn update_settings(&mut self, settings: WindowSettings) {
        let settings = settings.sanitized();
        let was_enabled = self.settings.enabled;
        self.send(Command::Config(settings.machine_config()));
        if was_enabled && !settings.enabled {
            self.send(Command::AlwaysVisible);
        }
        self.settings = settings;
    }

    fn send(&self, command: Command) {
        if let Some(running) = &self.running {
            if running.tx.send(command).is_err() {
                tracing::warn!("event loop gone; request dropped");
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.running.is_some() {
            tracing::warn!("controller dropped without request_shutdown");
            if let Err(err) = self.stop() {
                tracing::error!(%err, "controller drop");
            }
        }
    }
}

fn initial_metrics(displays: &dyn DisplayProvider, edge_band: i32) -> ScreenMetrics {
    let rect = match displays.primary() {
        Some(display) => display.rect,
        None => {
            tracing::warn!("no display reported; assuming {FALLBACK_SCREEN:?}");
            Rect::new(0, 0, FALLBACK_SCREEN.0, FALLBACK_SCREEN.1)
        }
    };
    ScreenMetrics::new(rect, edge_band)
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Send a command carrying an ack channel and wait for the reply.
fn request<T>(
    tx: &Sender<Command>,
    make: impl FnOnce(Sender<T>) -> Command,
    budget: Duration,
) -> Option<T> {
    let (ack_tx, ack_rx) = mpsc::channel();
    tx.send(make(ack_tx)).ok()?;
    ack_rx.recv_timeout(budget).ok()
}

enum Flow {
    Continue,
    Exit,
}

fn handle(machine: &mut VisibilityMachine, command: Command, published: &Published) -> Flow {
    match command {
        Command::Pointer(sample) => machine.on_pointer(sample),
        Command::Pin(ack) => {
            machine.pin();
            published.publish(machine);
            let _ = ack.send(());
        }
        Command::Unpin(ack) => {
            machine.unpin();
            published.publish(machine);
            let _ = ack.send(());
        }
        Command::Reveal => machine.reveal(),
        Command::Hide => machine.hide(),
        Command::Toggle => machine.toggle(),
        Command::AlwaysVisible => machine.enter_always_visible(),
        Command::Metrics(metrics) => machine.set_metrics(metrics),
        Command::Config(config) => machine.set_config(config),
        Command::PinnedMoved(x, y) => machine.set_pinned_position(x, y),
        Command::CancelTimers(ack) => {
            let count = machine.cancel_all_timers();
            let _ = ack.send(count);
        }
        Command::Freeze(ack) => {
            let outcome = freeze(machine);
            published.publish(machine);
            let _ = ack.send(outcome);
            return Flow::Exit;
        }
    }
    Flow::Continue
}

fn freeze(machine: &mut VisibilityMachine) -> FreezeOutcome {
    let timers_cancelled = machine.freeze();
    let sink = machine.close_sink();
    tracing::debug!(state = ?machine.state(), timers_cancelled, "state machine frozen");
    FreezeOutcome {
        timers_cancelled,
        sink,
    }
}

fn event_loop(
    mut machine: VisibilityMachine,
    rx: Receiver<Command>,
    stop_rx: Receiver<()>,
    clock: Arc<dyn Clock>,
    published: Arc<Published>,
) {
    loop {
        if stop_requested(&stop_rx) {
            let _ = freeze(&mut machine);
            break;
        }
        let wait = machine.next_deadline().map_or(IDLE_WAIT, |deadline| {
            deadline.saturating_duration_since(clock.now()).min(IDLE_WAIT)
        });

        match rx.recv_timeout(wait) {
            Ok(command) => {
                if let Flow::Exit = handle(&mut machine, command, &published) {
                    break;
                }
                let mut exit = false;
                while let Ok(command) = rx.try_recv() {
                    if let Flow::Exit = handle(&mut machine, command, &published) {
                        exit = true;
                        break;
                    }
                }
                if exit {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                let _ = freeze(&mut machine);
                break;
            }
        }

        machine.fire_due_timers();
        published.publish(&machine);
    }
    published.publish(&machine);
}
