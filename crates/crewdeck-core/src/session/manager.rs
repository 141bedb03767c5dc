//! Session lifecycle orchestration.
//!
//! `SessionManager` owns the auth state and is the only writer of the
//! `SessionStore`. Every state-resetting operation (a new login attempt or a
//! logout) starts a new epoch; asynchronous results issued under an older
//! epoch are dropped so a late response cannot bring back a cleared session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{AuthClient, AuthError};
use crate::inactivity::{ActivitySource, InactivityConfig, InactivityMonitor, Scheduler};
use crate::models::{Session, User};
use crate::store::SessionStore;

use super::state::{AuthSnapshot, AuthState, LogoutReason, SessionEvent};

/// Buffer size for the session event channel.
const EVENT_CHANNEL_SIZE: usize = 32;

struct SessionState {
    status: AuthState,
    session: Option<Session>,
    user: Option<User>,
    roles_loaded: bool,
    epoch: u64,
    /// Cancelled when the epoch ends, aborting client calls issued under it.
    cancel: CancellationToken,
}

impl SessionState {
    /// Open a new epoch, cancelling whatever was in flight under the old one.
    fn begin_epoch(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
        (self.epoch, self.cancel.clone())
    }

    /// State implied by the data held, ignoring any operation in flight.
    fn settled_status(&self) -> AuthState {
        match (&self.session, &self.user) {
            (Some(_), Some(_)) if self.roles_loaded => AuthState::Ready,
            (Some(_), Some(_)) => AuthState::RolesPending,
            _ => AuthState::Unauthenticated,
        }
    }

    /// True while the session a call was issued for is still the one held.
    fn is_current(&self, epoch: u64, access_token: &str) -> bool {
        self.epoch == epoch
            && self.status.is_authenticated()
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.access_token == access_token)
    }

    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot::new(self.status, self.user.clone(), self.roles_loaded)
    }
}

struct Inner {
    client: Arc<dyn AuthClient>,
    store: Arc<dyn SessionStore>,
    monitor: InactivityMonitor,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<AuthSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    /// Held for the duration of a refresh; stores the last outcome.
    refresh_gate: tokio::sync::Mutex<bool>,
    refreshes_completed: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Move to `next`, starting or stopping the inactivity monitor on the way
    /// into or out of `Ready`.
    fn transition(&self, state: &mut SessionState, next: AuthState) {
        let previous = state.status;
        state.status = next;

        if next == AuthState::Ready && previous != AuthState::Ready {
            self.monitor.start();
        } else if next != AuthState::Ready {
            self.monitor.stop();
        }

        self.publish(state);
        if previous != next {
            debug!(from = ?previous, to = ?next, epoch = state.epoch, "Session state changed");
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    fn sign_out(&self, reason: LogoutReason) {
        let mut state = self.lock();
        self.sign_out_locked(&mut state, reason);
    }

    fn sign_out_locked(&self, state: &mut SessionState, reason: LogoutReason) {
        let had_session = state.session.is_some() || state.status != AuthState::Unauthenticated;
        state.begin_epoch();

        if state.status != AuthState::Unauthenticated {
            self.transition(state, AuthState::Expired);
        }
        self.monitor.stop();

        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear stored session");
        }
        state.session = None;
        state.user = None;
        state.roles_loaded = false;
        self.transition(state, AuthState::Unauthenticated);

        if had_session {
            info!(%reason, "Session closed");
            self.emit(SessionEvent::SignedOut(reason));
        }
    }

    fn inactivity_warning(&self) {
        let remaining = self.monitor.config().warning_lead;
        info!(?remaining, "Session about to expire from inactivity");
        self.emit(SessionEvent::InactivityWarning { remaining });
    }
}

/// Run a client call, giving up early if its epoch is cancelled.
async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = call => result,
    }
}

/// Handle to the session service. Clone is cheap; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Build the service and reconcile any session left by a previous run.
    ///
    /// A stored token is verified with the backend; if it is accepted the
    /// session resumes and roles are loaded, otherwise storage is cleared.
    pub async fn start(
        config: InactivityConfig,
        client: Arc<dyn AuthClient>,
        store: Arc<dyn SessionStore>,
        scheduler: Arc<dyn Scheduler>,
        activity: Arc<dyn ActivitySource>,
    ) -> Self {
        let manager = Self::new(config, client, store, scheduler, activity);
        manager.reconcile().await;
        manager
    }

    fn new(
        config: InactivityConfig,
        client: Arc<dyn AuthClient>,
        store: Arc<dyn SessionStore>,
        scheduler: Arc<dyn Scheduler>,
        activity: Arc<dyn ActivitySource>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let on_warning = {
                let weak = Weak::clone(weak);
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.inactivity_warning();
                    }
                })
            };
            let on_timeout = {
                let weak = Weak::clone(weak);
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.sign_out(LogoutReason::InactivityTimeout);
                    }
                })
            };

            let (snapshots, _) = watch::channel(AuthSnapshot::unauthenticated());
            let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

            Inner {
                client,
                store,
                monitor: InactivityMonitor::new(
                    config,
                    scheduler,
                    activity,
                    on_warning,
                    on_timeout,
                ),
                state: Mutex::new(SessionState {
                    status: AuthState::Unauthenticated,
                    session: None,
                    user: None,
                    roles_loaded: false,
                    epoch: 0,
                    cancel: CancellationToken::new(),
                }),
                snapshots,
                events,
                refresh_gate: tokio::sync::Mutex::new(false),
                refreshes_completed: AtomicU64::new(0),
            }
        });

        Self { inner }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    async fn reconcile(&self) {
        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, clearing it");
                if let Err(e) = self.inner.store.clear() {
                    error!(error = %e, "Failed to clear stored session");
                }
                None
            }
        };

        let Some((session, _)) = stored else {
            debug!("No stored session");
            return;
        };

        let (epoch, cancel) = {
            let mut state = self.inner.lock();
            let ticket = state.begin_epoch();
            self.inner.transition(&mut state, AuthState::Authenticating);
            ticket
        };

        let verified = guarded(&cancel, self.inner.client.verify(&session.access_token)).await;

        {
            let mut state = self.inner.lock();
            if state.epoch != epoch {
                debug!("Discarding stale verification result");
                return;
            }
            match verified {
                Ok(user) => {
                    if let Err(e) = self.inner.store.save(&session, &user) {
                        error!(error = %e, "Failed to persist verified session");
                        self.inner
                            .sign_out_locked(&mut state, LogoutReason::StorageUnavailable);
                        return;
                    }
                    info!(user_id = %user.id, "Stored session verified");
                    state.session = Some(session);
                    state.user = Some(user);
                    state.roles_loaded = false;
                    self.inner.transition(&mut state, AuthState::RolesPending);
                }
                Err(e) => {
                    info!(error = %e, "Stored session rejected");
                    self.inner.sign_out_locked(&mut state, LogoutReason::TokenRejected);
                    return;
                }
            }
        }

        self.fetch_user_roles().await;
    }

    // =========================================================================
    // Public session API
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// Returns `Ok(true)` once roles are loaded and the session is ready,
    /// `Ok(false)` when the tokens were accepted but roles could not be fetched
    /// yet. On error the previous state, including any previous session, is
    /// left as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let (epoch, cancel) = {
            let mut state = self.inner.lock();
            let ticket = state.begin_epoch();
            self.inner.transition(&mut state, AuthState::Authenticating);
            ticket
        };
        debug!(epoch, "Login started");

        let result = guarded(&cancel, self.inner.client.login(email, password)).await;

        {
            let mut state = self.inner.lock();
            if state.epoch != epoch {
                debug!(epoch, "Discarding stale login result");
                return Err(AuthError::Cancelled);
            }

            match result {
                Ok((session, user)) => {
                    if let Err(e) = self.inner.store.save(&session, &user) {
                        error!(error = %e, "Failed to persist session after login");
                        let previous = state.settled_status();
                        self.inner.transition(&mut state, previous);
                        return Err(AuthError::Storage(e.to_string()));
                    }
                    info!(user_id = %user.id, "Login successful");
                    state.session = Some(session);
                    state.user = Some(user);
                    state.roles_loaded = false;
                    self.inner.transition(&mut state, AuthState::RolesPending);
                }
                Err(e) => {
                    warn!(error = %e, "Login failed");
                    let previous = state.settled_status();
                    self.inner.transition(&mut state, previous);
                    return Err(e);
                }
            }
        }

        Ok(self.fetch_user_roles().await)
    }

    /// Load the current user's roles and merge them into the session.
    ///
    /// A transient failure leaves the session as it was so roles can be
    /// retried later. A rejected access token closes the session.
    pub async fn fetch_user_roles(&self) -> bool {
        let (epoch, cancel, access_token) = {
            let state = self.inner.lock();
            match &state.session {
                Some(session) if state.status.is_authenticated() => {
                    (state.epoch, state.cancel.clone(), session.access_token.clone())
                }
                _ => {
                    debug!(state = ?state.status, "No settled session to load roles for");
                    return false;
                }
            }
        };

        let result = guarded(&cancel, self.inner.client.fetch_roles(&access_token)).await;

        let mut state = self.inner.lock();
        if !state.is_current(epoch, &access_token) {
            debug!("Discarding stale roles result");
            return false;
        }

        let roles = match result {
            Ok(roles) => roles,
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "Roles request rejected the access token");
                self.inner.sign_out_locked(&mut state, LogoutReason::TokenRejected);
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load user roles");
                self.inner.emit(SessionEvent::RolesUnavailable(e));
                return false;
            }
        };

        let (Some(session), Some(user)) = (state.session.clone(), state.user.clone()) else {
            return false;
        };
        let user = User { roles, ..user };

        if let Err(e) = self.inner.store.save(&session, &user) {
            error!(error = %e, "Failed to persist user roles");
            return false;
        }

        info!(roles = %user.roles, "User roles loaded");
        state.user = Some(user);
        state.roles_loaded = true;
        self.inner.transition(&mut state, AuthState::Ready);
        true
    }

    /// Sign out. Safe to call in any state, any number of times.
    pub fn logout(&self) {
        self.inner.sign_out(LogoutReason::UserRequested);
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Any failure, including having no refresh token, signs the user out.
    /// Concurrent callers share a single in-flight refresh.
    pub async fn refresh_token(&self) -> bool {
        let observed = self.inner.refreshes_completed.load(Ordering::SeqCst);
        let mut last_outcome = self.inner.refresh_gate.lock().await;

        if self.inner.refreshes_completed.load(Ordering::SeqCst) != observed {
            debug!("Reusing result of concurrent refresh");
            return *last_outcome;
        }

        let outcome = self.refresh_once().await;
        *last_outcome = outcome;
        self.inner.refreshes_completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn refresh_once(&self) -> bool {
        let (epoch, cancel) = {
            let state = self.inner.lock();
            if state.status == AuthState::Authenticating {
                debug!("Sign-in in progress, not refreshing");
                return false;
            }
            (state.epoch, state.cancel.clone())
        };

        let (stored_session, stored_user) = match self.inner.store.load() {
            Ok(Some(pair)) if !pair.0.refresh_token.is_empty() => pair,
            Ok(_) => {
                warn!("No refresh token available");
                self.inner.sign_out(LogoutReason::RefreshFailed);
                return false;
            }
            Err(e) => {
                error!(error = %e, "Failed to read stored session for refresh");
                self.inner.sign_out(LogoutReason::RefreshFailed);
                return false;
            }
        };

        let result = guarded(
            &cancel,
            self.inner.client.refresh(&stored_session.refresh_token),
        )
        .await;

        let mut state = self.inner.lock();
        if state.epoch != epoch || state.status == AuthState::Authenticating {
            debug!("Discarding stale refresh result");
            return false;
        }

        match result {
            Ok(session) => {
                let user = state.user.clone().unwrap_or(stored_user);
                if let Err(e) = self.inner.store.save(&session, &user) {
                    error!(error = %e, "Failed to persist refreshed session");
                    self.inner
                        .sign_out_locked(&mut state, LogoutReason::StorageUnavailable);
                    return false;
                }
                debug!("Access token refreshed");
                state.session = Some(session);
                state.user = Some(user);
                self.inner.publish(&state);
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                let reason = if e.is_unauthorized() {
                    LogoutReason::TokenRejected
                } else {
                    LogoutReason::RefreshFailed
                };
                self.inner.sign_out_locked(&mut state, reason);
                false
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().status
    }

    pub fn user(&self) -> Option<User> {
        self.inner.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn is_roles_loaded(&self) -> bool {
        self.inner.lock().roles_loaded
    }

    /// Role check for consumers; false until roles are loaded.
    pub fn has_role(&self, role: &str) -> bool {
        self.snapshot().has_role(role)
    }

    pub fn access_token(&self) -> Option<String> {
        let state = self.inner.lock();
        state.session.as_ref().map(|s| s.access_token.clone())
    }

    /// Access token for an API call, refreshed first if it is about to expire.
    pub async fn valid_access_token(&self) -> Option<String> {
        let needs_refresh = {
            let state = self.inner.lock();
            state.session.as_ref()?.needs_refresh()
        };

        if needs_refresh && !self.refresh_token().await {
            return None;
        }
        self.access_token()
    }

    /// Watch the session snapshot; the receiver always holds the latest value.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_monitoring_activity(&self) -> bool {
        self.inner.monitor.is_running()
    }

    /// When the session will be closed for inactivity, if the monitor is armed.
    pub fn inactivity_deadline(&self) -> Option<Instant> {
        self.inner.monitor.deadline()
    }
}
