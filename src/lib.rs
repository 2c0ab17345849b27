pub mod displays;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod lifecycle;
pub mod logging;
pub mod machine;
pub mod pointer;
pub mod settings;
pub mod surface;
pub mod timer;
pub mod worker;

pub use error::{ControllerError, ShutdownReport, TransitionError};
pub use lifecycle::{Controller, ControllerBuilder};
pub use machine::{Mode, VisibilityState};
pub use settings::WindowSettings;
