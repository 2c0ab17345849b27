//! Applies transition requests to the real window.
//!
//! Requests are validated synchronously and then handed to an animation
//! thread that owns the [`WindowSurface`]. A newer request always supersedes
//! an in-flight animation; nothing queues behind it.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::displays::DisplayProvider;
use crate::error::TransitionError;
use crate::geometry::{Placement, Rect, ZOrder};
use crate::machine::VisibilityState;
use crate::pointer::SharedBounds;
use crate::surface::WindowSurface;
use crate::worker::{stop_requested, Worker};

pub const MAX_ANIMATION: Duration = Duration::from_millis(1000);
const IDLE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRequest {
    pub state: VisibilityState,
    pub rect: Rect,
    pub opacity: f32,
    pub z_order: ZOrder,
    pub animate: bool,
}

impl TransitionRequest {
    pub fn new(state: VisibilityState, placement: Placement) -> Self {
        Self {
            state,
            rect: placement.rect,
            opacity: placement.opacity,
            z_order: placement.z_order,
            animate: placement.animate,
        }
    }
}

/// Consumer of transition requests produced by the state machine.
pub trait TransitionSink: Send {
    fn submit(&mut self, request: TransitionRequest) -> Result<(), TransitionError>;

    /// Release background resources. Returns the name of anything that did
    /// not stop in time.
    fn close(&mut self) -> Result<(), &'static str> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    EaseInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub duration: Duration,
    pub frame: Duration,
    pub easing: Easing,
    pub stop_budget: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(150),
            frame: Duration::from_millis(16),
            easing: Easing::EaseInOut,
            stop_budget: Duration::from_millis(500),
        }
    }
}

pub struct TransitionExecutor {
    tx: Option<Sender<TransitionRequest>>,
    worker: Option<Worker>,
    displays: Arc<dyn DisplayProvider>,
    bounds: SharedBounds,
    stop_budget: Duration,
}

impl TransitionExecutor {
    pub fn spawn(
        surface: Box<dyn WindowSurface>,
        displays: Arc<dyn DisplayProvider>,
        bounds: SharedBounds,
        config: ExecutorConfig,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let stop_budget = config.stop_budget;
        let worker = Worker::spawn("edge-dock-animate", move |stop_rx| {
            animation_loop(surface, rx, stop_rx, config)
        })?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            displays,
            bounds,
            stop_budget,
        })
    }

    pub fn bounds(&self) -> SharedBounds {
        self.bounds.clone()
    }

    /// Abandon any animation and join the animation thread.
    pub fn stop(&mut self) -> Result<(), &'static str> {
        self.tx = None;
        match self.worker.take() {
            Some(worker) => worker.stop(self.stop_budget),
            None => Ok(()),
        }
    }
}

impl TransitionSink for TransitionExecutor {
    fn submit(&mut self, request: TransitionRequest) -> Result<(), TransitionError> {
        let Some(tx) = &self.tx else {
            return Err(TransitionError::Stopped);
        };
        if !self.displays.is_applicable(request.rect) {
            return Err(TransitionError::Inapplicable(request.rect));
        }
        self.bounds.set(request.rect);
        tx.send(request).map_err(|_| TransitionError::Stopped)
    }

    fn close(&mut self) -> Result<(), &'static str> {
        self.stop()
    }
}

impl Drop for TransitionExecutor {
    fn drop(&mut self) {
        if let Err(name) = self.stop() {
            tracing::error!(worker = name, "transition executor drop");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    rect: Rect,
    opacity: f32,
}

struct Animation {
    from: Frame,
    to: Frame,
    started: Instant,
}

fn apply(surface: &mut dyn WindowSurface, frame: Frame) {
    if let Err(err) = surface.set_rect(frame.rect) {
        tracing::warn!(%err, rect = ?frame.rect, "failed to move window");
    }
    if let Err(err) = surface.set_opacity(frame.opacity) {
        tracing::warn!(%err, opacity = frame.opacity, "failed to set window opacity");
    }
}

fn animation_loop(
    mut surface: Box<dyn WindowSurface>,
    rx: Receiver<TransitionRequest>,
    stop_rx: Receiver<()>,
    config: ExecutorConfig,
) {
    let duration = config.duration.min(MAX_ANIMATION);
    let mut current: Option<Frame> = None;
    let mut animation: Option<Animation> = None;

    loop {
        if stop_requested(&stop_rx) {
            break;
        }
        let wait = if animation.is_some() {
            config.frame
        } else {
            IDLE_WAIT
        };

        match rx.recv_timeout(wait) {
            Ok(mut request) => {
                // Last request wins.
                while let Ok(newer) = rx.try_recv() {
                    request = newer;
                }
                if animation.take().is_some() {
                    tracing::trace!(state = ?request.state, "animation superseded");
                }
                if let Err(err) = surface.set_z_order(request.z_order) {
                    tracing::warn!(%err, z_order = ?request.z_order, "failed to restack window");
                }
                let target = Frame {
                    rect: request.rect,
                    opacity: request.opacity,
                };
                match current {
                    Some(from) if request.animate && !duration.is_zero() => {
                        animation = Some(Animation {
                            from,
                            to: target,
                            started: Instant::now(),
                        });
                    }
                    _ => {
                        apply(surface.as_mut(), target);
                        current = Some(target);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(anim) = &animation {
            let progress = anim.started.elapsed().as_secs_f32() / duration.as_secs_f32();
            let frame = if progress >= 1.0 {
                anim.to
            } else {
                let t = config.easing.apply(progress);
                Frame {
                    rect: Rect::lerp(anim.from.rect, anim.to.rect, t),
                    opacity: anim.from.opacity + (anim.to.opacity - anim.from.opacity) * t,
                }
            };
            apply(surface.as_mut(), frame);
            current = Some(frame);
            if progress >= 1.0 {
                animation = None;
            }
        }
    }
}

/// Sink that records requests, optionally validating them against displays.
#[derive(Clone, Default)]
pub struct RecordingSink {
    requests: Arc<Mutex<Vec<TransitionRequest>>>,
    displays: Option<Arc<dyn DisplayProvider>>,
}

impl RecordingSink {
    pub fn validating(displays: Arc<dyn DisplayProvider>) -> Self {
        Self {
            requests: Arc::default(),
            displays: Some(displays),
        }
    }

    pub fn requests(&self) -> Vec<TransitionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn states(&self) -> Vec<VisibilityState> {
        self.requests().into_iter().map(|r| r.state).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransitionSink for RecordingSink {
    fn submit(&mut self, request: TransitionRequest) -> Result<(), TransitionError> {
        if let Some(displays) = &self.displays {
            if !displays.is_applicable(request.rect) {
                return Err(TransitionError::Inapplicable(request.rect));
            }
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        Ok(())
    }
}
