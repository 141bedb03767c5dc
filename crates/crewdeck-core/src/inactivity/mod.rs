//! Inactivity detection.
//!
//! `InactivityMonitor` arms a warning timer and a logout timer and re-arms
//! both whenever the `ActivitySource` reports user interaction. Time and
//! input are injected through `Scheduler` and `ActivitySource` so the monitor
//! runs the same against the Tokio clock, a paused test clock, or any UI
//! event loop.

pub mod activity;
pub mod monitor;
pub mod scheduler;

pub use activity::{ActivityCallback, ActivityHub, ActivityKind, ActivitySource, Subscription};
pub use monitor::{
    InactivityConfig, InactivityMonitor, MonitorCallback, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_WARNING_LEAD,
};
pub use scheduler::{Scheduler, TimerHandle, TimerTask, TokioScheduler};
