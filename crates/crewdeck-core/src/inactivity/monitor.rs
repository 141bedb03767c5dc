use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::Instant;
use tracing::{debug, info};

use super::activity::{ActivityKind, ActivitySource, Subscription};
use super::scheduler::{Scheduler, TimerHandle};

/// Idle time before automatic logout (15 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// How long before logout the warning fires (1 minute).
pub const DEFAULT_WARNING_LEAD: Duration = Duration::from_secs(60);

pub type MonitorCallback = Arc<dyn Fn() + Send + Sync>;

/// Idle window and warning offset for the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityConfig {
    pub idle_timeout: Duration,
    /// Zero disables the warning.
    pub warning_lead: Duration,
}

impl InactivityConfig {
    pub fn new(idle_timeout: Duration, warning_lead: Duration) -> Result<Self> {
        if idle_timeout.is_zero() {
            bail!("Idle timeout must be greater than zero");
        }
        if warning_lead >= idle_timeout {
            bail!(
                "Warning lead ({:?}) must be shorter than the idle timeout ({:?})",
                warning_lead,
                idle_timeout
            );
        }
        Ok(Self {
            idle_timeout,
            warning_lead,
        })
    }

    /// Delay from the last activity until the warning fires.
    pub fn warning_after(&self) -> Duration {
        self.idle_timeout - self.warning_lead
    }
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            warning_lead: DEFAULT_WARNING_LEAD,
        }
    }
}

#[derive(Default)]
struct MonitorState {
    running: bool,
    /// Bumped on every re-arm and stop; timers carry the value they were armed under.
    generation: u64,
    warning_timer: Option<TimerHandle>,
    logout_timer: Option<TimerHandle>,
    deadline: Option<Instant>,
    subscription: Option<Subscription>,
}

impl MonitorState {
    /// Disarm everything, handing back what must be dropped outside the lock.
    fn disarm(&mut self) -> (Option<TimerHandle>, Option<TimerHandle>, Option<Subscription>) {
        self.running = false;
        self.generation += 1;
        self.deadline = None;
        (
            self.warning_timer.take(),
            self.logout_timer.take(),
            self.subscription.take(),
        )
    }
}

struct Shared {
    config: InactivityConfig,
    scheduler: Arc<dyn Scheduler>,
    activity: Arc<dyn ActivitySource>,
    on_warning: MonitorCallback,
    on_timeout: MonitorCallback,
    state: Mutex<MonitorState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace both timers with a fresh pair measured from now.
    fn arm(self: &Arc<Self>, state: &mut MonitorState) {
        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(self);

        state.warning_timer = if self.config.warning_lead.is_zero() {
            None
        } else {
            let weak = Weak::clone(&weak);
            Some(self.scheduler.after(
                self.config.warning_after(),
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire_warning(generation);
                    }
                }),
            ))
        };

        state.logout_timer = Some(self.scheduler.after(
            self.config.idle_timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.fire_timeout(generation);
                }
            }),
        ));

        state.deadline = Some(self.scheduler.now() + self.config.idle_timeout);
    }

    fn notify_activity(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.running {
            self.arm(&mut state);
        }
    }

    fn fire_warning(&self, generation: u64) {
        {
            let mut state = self.lock();
            if !state.running || state.generation != generation {
                return;
            }
            state.warning_timer = None;
        }
        debug!("Inactivity warning fired");
        (self.on_warning)();
    }

    fn fire_timeout(&self, generation: u64) {
        let released = {
            let mut state = self.lock();
            if !state.running || state.generation != generation {
                return;
            }
            state.disarm()
        };
        drop(released);
        info!("Inactivity timeout reached");
        (self.on_timeout)();
    }
}

/// Fires a warning and then a timeout after a period without user activity.
///
/// The monitor does nothing until `start()`; each activity signal re-arms both
/// timers from the current instant.
pub struct InactivityMonitor {
    shared: Arc<Shared>,
}

impl InactivityMonitor {
    pub fn new(
        config: InactivityConfig,
        scheduler: Arc<dyn Scheduler>,
        activity: Arc<dyn ActivitySource>,
        on_warning: MonitorCallback,
        on_timeout: MonitorCallback,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                scheduler,
                activity,
                on_warning,
                on_timeout,
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }

    pub fn config(&self) -> InactivityConfig {
        self.shared.config
    }

    /// Subscribe to activity and arm both timers. Restarts the window if already running.
    pub fn start(&self) {
        let mut state = self.shared.lock();
        if !state.running {
            let weak = Arc::downgrade(&self.shared);
            state.subscription = Some(self.shared.activity.on_activity(
                &ActivityKind::TRACKED,
                Arc::new(move |_kind: ActivityKind| {
                    if let Some(shared) = weak.upgrade() {
                        shared.notify_activity();
                    }
                }),
            ));
            state.running = true;
            debug!(idle_timeout = ?self.shared.config.idle_timeout, "Inactivity monitor started");
        }
        self.shared.arm(&mut state);
    }

    /// Push the deadline out to a full window from now. Ignored while stopped.
    pub fn notify_activity(&self) {
        self.shared.notify_activity();
    }

    /// Cancel both timers and detach from the activity source.
    pub fn stop(&self) {
        let released = {
            let mut state = self.shared.lock();
            if !state.running {
                return;
            }
            state.disarm()
        };
        drop(released);
        debug!("Inactivity monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// When the logout timer will fire, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.lock().deadline
    }
}
