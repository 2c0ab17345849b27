//! Error taxonomy for the visibility controller.
//!
//! Platform seams (hook install, cursor queries, window calls) speak
//! `anyhow::Result`; the controller surfaces the typed errors below to the
//! host application.

use std::time::Duration;

use crate::geometry::Rect;

/// Errors surfaced to the hosting application.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Neither the low-level hook nor the polling fallback could be started.
    #[error("pointer source unavailable: {reason}")]
    PointerSourceUnavailable { reason: String },

    /// A requested rectangle could not be applied to any connected display.
    #[error("geometry unresolvable: {rect:?}")]
    GeometryUnresolvable { rect: Rect },

    /// One or more shutdown steps did not finish inside the budget.
    #[error("shutdown did not complete within {:?}: {}", .budget, .stalled.join(", "))]
    ShutdownTimeout {
        budget: Duration,
        stalled: Vec<&'static str>,
    },

    /// The controller event loop is not running.
    #[error("controller is not running")]
    NotRunning,

    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Synchronous rejection reported by the transition executor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("target rectangle {0:?} does not intersect any connected display")]
    Inapplicable(Rect),

    #[error("transition executor has been stopped")]
    Stopped,
}

impl From<TransitionError> for ControllerError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Inapplicable(rect) => ControllerError::GeometryUnresolvable { rect },
            TransitionError::Stopped => ControllerError::NotRunning,
        }
    }
}

/// Outcome of each shutdown step, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    pub timers_cancelled: usize,
    /// Geometry fallbacks taken while the controller ran.
    pub geometry_fallbacks: usize,
    pub stalled: Vec<&'static str>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.stalled.is_empty()
    }

    pub fn into_result(self, budget: Duration) -> Result<ShutdownReport, ControllerError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(ControllerError::ShutdownTimeout {
                budget,
                stalled: self.stalled,
            })
        }
    }
}
