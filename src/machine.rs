//! Edge-hide / peek / pin state machine.
//!
//! The machine is owned by exactly one thread. Pointer samples, timer
//! callbacks and pin requests all arrive through `&mut self`, so the state and
//! the two named timers need no locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::displays::DisplayProvider;
use crate::error::{ControllerError, TransitionError};
use crate::executor::{TransitionRequest, TransitionSink};
use crate::geometry::{self, GeometryPrefs, ScreenMetrics};
use crate::pointer::PointerSample;
use crate::timer::{Clock, TimerService, TimerTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityState {
    Hidden,
    Peek,
    Visible,
    Pinned,
}

impl VisibilityState {
    /// Edges of the transition table. Everything else is illegal.
    pub fn can_transition_to(self, to: VisibilityState) -> bool {
        use VisibilityState::*;
        matches!(
            (self, to),
            (Hidden, Peek)
                | (Peek, Visible)
                | (Peek, Hidden)
                | (Visible, Pinned)
                | (Visible, Hidden)
                | (Pinned, Visible)
        )
    }

    pub fn as_u8(self) -> u8 {
        match self {
            VisibilityState::Hidden => 0,
            VisibilityState::Peek => 1,
            VisibilityState::Visible => 2,
            VisibilityState::Pinned => 3,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => VisibilityState::Peek,
            2 => VisibilityState::Visible,
            3 => VisibilityState::Pinned,
            _ => VisibilityState::Hidden,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pointer-driven edge hiding.
    AutoHide,
    /// Degraded or disabled: the window stays visible and never auto-hides.
    AlwaysVisible,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    pub hide_delay: Duration,
    pub edge_recheck: Duration,
    pub edge_band: i32,
    pub prefs: GeometryPrefs,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            hide_delay: Duration::from_millis(2000),
            edge_recheck: Duration::from_millis(250),
            edge_band: 5,
            prefs: GeometryPrefs::default(),
        }
    }
}

/// Observer of committed transitions, invoked on the machine's thread.
pub trait StateListener: Send {
    fn on_transition(&mut self, from: VisibilityState, to: VisibilityState);
}

impl<F> StateListener for F
where
    F: FnMut(VisibilityState, VisibilityState) + Send,
{
    fn on_transition(&mut self, from: VisibilityState, to: VisibilityState) {
        self(from, to)
    }
}

type TimerCallback = fn(&mut VisibilityMachine);

pub struct VisibilityMachine {
    state: VisibilityState,
    mode: Mode,
    frozen: bool,
    pin_deferred: bool,
    geometry_fallbacks: usize,
    last_fault: Option<ControllerError>,
    config: MachineConfig,
    metrics: ScreenMetrics,
    last_sample: Option<PointerSample>,
    timers: TimerService<TimerCallback>,
    sink: Box<dyn TransitionSink>,
    displays: Arc<dyn DisplayProvider>,
    listener: Option<Box<dyn StateListener>>,
}

impl VisibilityMachine {
    pub fn new(
        config: MachineConfig,
        metrics: ScreenMetrics,
        sink: Box<dyn TransitionSink>,
        displays: Arc<dyn DisplayProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = ScreenMetrics {
            edge_band: config.edge_band.max(1),
            ..metrics
        };
        Self {
            state: VisibilityState::Hidden,
            mode: Mode::AutoHide,
            frozen: false,
            pin_deferred: false,
            geometry_fallbacks: 0,
            last_fault: None,
            config,
            metrics,
            last_sample: None,
            timers: TimerService::new(clock),
            sink,
            displays,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn StateListener>) {
        self.listener = Some(listener);
    }

    /// Place the window at its initial Hidden geometry.
    pub fn start(&mut self) {
        if self.frozen {
            return;
        }
        self.submit(VisibilityState::Hidden, Some(false));
    }

    pub fn state(&self) -> VisibilityState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_pinned(&self) -> bool {
        self.state == VisibilityState::Pinned
    }

    pub fn is_pin_deferred(&self) -> bool {
        self.pin_deferred
    }

    /// Times a requested geometry fit no display and the window was parked
    /// hidden on the primary display instead.
    pub fn geometry_fallbacks(&self) -> usize {
        self.geometry_fallbacks
    }

    pub fn last_fault(&self) -> Option<&ControllerError> {
        self.last_fault.as_ref()
    }

    pub fn hide_pending(&self) -> bool {
        self.timers.is_pending(TimerTag::HideAfterIdle)
    }

    pub fn recheck_pending(&self) -> bool {
        self.timers.is_pending(TimerTag::EdgeRecheck)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if self.frozen {
            None
        } else {
            self.timers.next_deadline()
        }
    }

    pub fn metrics(&self) -> ScreenMetrics {
        self.metrics
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn on_pointer(&mut self, sample: PointerSample) {
        if self.frozen {
            return;
        }
        self.last_sample = Some(sample);
        if self.mode == Mode::AlwaysVisible {
            return;
        }

        let in_band = self.in_edge_band(&sample);

        match self.state {
            VisibilityState::Hidden => {
                if in_band && self.transition(VisibilityState::Peek) {
                    self.schedule_recheck();
                }
            }
            VisibilityState::Peek => {
                if sample.inside_window && (!in_band || sample.pressed) {
                    self.timers.cancel_tag(TimerTag::EdgeRecheck);
                    self.transition(VisibilityState::Visible);
                } else if !in_band && !sample.inside_window {
                    self.timers.cancel_tag(TimerTag::EdgeRecheck);
                    self.transition(VisibilityState::Hidden);
                }
            }
            VisibilityState::Visible => {
                // Re-entry cancels the hide; motion outside keeps the first
                // leave's deadline.
                if sample.inside_window {
                    if self.timers.cancel_tag(TimerTag::HideAfterIdle) {
                        tracing::debug!("pointer re-entered window; hide cancelled");
                    }
                } else if !self.hide_pending() {
                    self.timers.schedule(
                        TimerTag::HideAfterIdle,
                        self.config.hide_delay,
                        Self::on_hide_timeout,
                    );
                }
            }
            VisibilityState::Pinned => {}
        }
    }

    /// Run every timer callback whose deadline has passed.
    pub fn fire_due_timers(&mut self) -> usize {
        if self.frozen {
            return 0;
        }
        let due = self.timers.take_due();
        let count = due.len();
        for (handle, callback) in due {
            if self.frozen {
                break;
            }
            tracing::trace!(tag = ?handle.tag(), "timer fired");
            callback(self);
        }
        count
    }

    /// Pin requests while Hidden or Peek are honoured once Visible is reached.
    pub fn pin(&mut self) {
        if self.frozen {
            return;
        }
        match self.state {
            VisibilityState::Pinned => {}
            VisibilityState::Visible => {
                self.transition(VisibilityState::Pinned);
            }
            VisibilityState::Hidden | VisibilityState::Peek => {
                if !self.pin_deferred {
                    tracing::debug!(state = ?self.state, "pin deferred until visible");
                }
                self.pin_deferred = true;
            }
        }
    }

    pub fn unpin(&mut self) {
        if self.frozen {
            return;
        }
        self.pin_deferred = false;
        if self.state == VisibilityState::Pinned {
            self.transition(VisibilityState::Visible);
        }
    }

    /// Explicit reveal, walking Hidden -> Peek -> Visible.
    pub fn reveal(&mut self) {
        if self.frozen {
            return;
        }
        self.timers.cancel_tag(TimerTag::HideAfterIdle);
        if self.state == VisibilityState::Hidden && !self.transition(VisibilityState::Peek) {
            return;
        }
        if self.state == VisibilityState::Peek {
            self.timers.cancel_tag(TimerTag::EdgeRecheck);
            self.transition(VisibilityState::Visible);
        }
    }

    /// Explicit hide. Ignored while pinned or when auto-hide is unavailable.
    pub fn hide(&mut self) {
        if self.frozen || self.mode == Mode::AlwaysVisible {
            return;
        }
        match self.state {
            VisibilityState::Peek | VisibilityState::Visible => {
                self.cancel_auto_hide_timers();
                self.transition(VisibilityState::Hidden);
            }
            VisibilityState::Pinned => tracing::debug!("hide ignored while pinned"),
            VisibilityState::Hidden => {}
        }
    }

    pub fn toggle(&mut self) {
        match self.state {
            VisibilityState::Hidden | VisibilityState::Peek => self.reveal(),
            VisibilityState::Visible => self.hide(),
            VisibilityState::Pinned => tracing::debug!("toggle ignored while pinned"),
        }
    }

    /// Record a user drag of the pinned window and re-apply Pinned geometry.
    pub fn set_pinned_position(&mut self, x: i32, y: i32) {
        if self.frozen {
            return;
        }
        self.config.prefs.pinned_position = Some((x, y));
        if self.state == VisibilityState::Pinned {
            self.submit(VisibilityState::Pinned, Some(false));
        }
    }

    /// Replace the display snapshot. In-flight timers are kept; geometry is
    /// recomputed on the next transition.
    pub fn set_metrics(&mut self, metrics: ScreenMetrics) {
        if self.frozen {
            return;
        }
        self.metrics = ScreenMetrics {
            edge_band: self.config.edge_band.max(1),
            ..metrics
        };
    }

    pub fn set_config(&mut self, config: MachineConfig) {
        if self.frozen {
            return;
        }
        self.metrics.edge_band = config.edge_band.max(1);
        self.config = config;
    }

    /// Stop auto-hiding and bring the window to Visible for good.
    pub fn enter_always_visible(&mut self) {
        if self.frozen || self.mode == Mode::AlwaysVisible {
            return;
        }
        self.mode = Mode::AlwaysVisible;
        self.cancel_auto_hide_timers();
        self.reveal();
    }

    pub fn cancel_all_timers(&mut self) -> usize {
        self.timers.cancel_all()
    }

    /// Freeze the machine: no further transitions, timers or executor calls.
    pub fn freeze(&mut self) -> usize {
        self.frozen = true;
        self.timers.shutdown()
    }

    /// Close the transition sink. Only meaningful once frozen.
    pub fn close_sink(&mut self) -> Result<(), &'static str> {
        self.sink.close()
    }

    fn on_hide_timeout(&mut self) {
        let outside = self.last_sample.map_or(true, |s| !s.inside_window);
        if self.state == VisibilityState::Visible && self.mode == Mode::AutoHide && outside {
            tracing::debug!(delay = ?self.config.hide_delay, "idle outside window; hiding");
            self.transition(VisibilityState::Hidden);
        }
    }

    fn on_edge_recheck(&mut self) {
        if self.state != VisibilityState::Peek || self.mode != Mode::AutoHide {
            return;
        }
        let still_near = self
            .last_sample
            .map_or(false, |s| s.inside_window || self.in_edge_band(&s));
        if still_near {
            self.schedule_recheck();
        } else {
            tracing::debug!("pointer left edge band; peek withdrawn");
            self.transition(VisibilityState::Hidden);
        }
    }

    fn schedule_recheck(&mut self) {
        self.timers.schedule(
            TimerTag::EdgeRecheck,
            self.config.edge_recheck,
            Self::on_edge_recheck,
        );
    }

    fn cancel_auto_hide_timers(&mut self) {
        self.timers.cancel_tag(TimerTag::HideAfterIdle);
        self.timers.cancel_tag(TimerTag::EdgeRecheck);
    }

    fn in_edge_band(&self, sample: &PointerSample) -> bool {
        self.metrics
            .in_edge_band(self.config.prefs.dock_edge, sample.x, sample.y)
    }

    fn transition(&mut self, to: VisibilityState) -> bool {
        let from = self.state;
        if from == to {
            return false;
        }
        if !from.can_transition_to(to) {
            tracing::error!(?from, ?to, "illegal visibility transition rejected");
            return false;
        }
        if !self.submit(to, None) {
            return false;
        }
        self.commit(to);

        if to == VisibilityState::Pinned {
            self.cancel_auto_hide_timers();
        }
        if to == VisibilityState::Visible && self.pin_deferred {
            self.pin_deferred = false;
            tracing::debug!("honouring deferred pin");
            self.transition(VisibilityState::Pinned);
        }
        true
    }

    fn commit(&mut self, to: VisibilityState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(?from, ?to, "visibility updated");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_transition(from, to);
        }
    }

    /// Request the geometry of `state`. On an inapplicable rectangle fall back
    /// to Hidden on the primary display and report `false`.
    fn submit(&mut self, state: VisibilityState, animate: Option<bool>) -> bool {
        let mut placement = geometry::resolve(state, &self.metrics, &self.config.prefs);
        if let Some(animate) = animate {
            placement.animate = animate;
        }
        match self.sink.submit(TransitionRequest::new(state, placement)) {
            Ok(()) => true,
            Err(TransitionError::Inapplicable(rect)) => {
                let fault = ControllerError::from(TransitionError::Inapplicable(rect));
                tracing::warn!(%fault, ?state, "falling back to hidden on primary display");
                self.geometry_fallbacks += 1;
                self.last_fault = Some(fault);
                self.recover_hidden_on_primary();
                false
            }
            Err(err) => {
                tracing::warn!(%err, ?state, "transition request not applied");
                false
            }
        }
    }

    fn recover_hidden_on_primary(&mut self) {
        self.cancel_auto_hide_timers();
        self.pin_deferred = false;
        let Some(primary) = self.displays.primary() else {
            tracing::error!("no display connected; window left in place");
            self.step_down_to_hidden();
            return;
        };
        self.metrics = ScreenMetrics::new(primary.rect, self.config.edge_band);
        // Pinned has no edge to Hidden; leave through Visible on the primary display.
        if self.state == VisibilityState::Pinned {
            self.place_directly(VisibilityState::Visible);
            self.commit(VisibilityState::Visible);
        }
        self.place_directly(VisibilityState::Hidden);
        self.commit(VisibilityState::Hidden);
    }

    fn place_directly(&mut self, state: VisibilityState) {
        let mut placement = geometry::resolve(state, &self.metrics, &self.config.prefs);
        placement.animate = false;
        if let Err(err) = self.sink.submit(TransitionRequest::new(state, placement)) {
            tracing::error!(%err, ?state, "fallback placement on primary display failed");
        }
    }

    fn step_down_to_hidden(&mut self) {
        if self.state == VisibilityState::Pinned {
            self.commit(VisibilityState::Visible);
        }
        self.commit(VisibilityState::Hidden);
    }
}
