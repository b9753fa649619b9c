//! Refresh coordination state machine
//!
//! Guarantees at most one refresh call per failure episode no matter how
//! many requests hit a 401 at once. The first caller flips `Idle →
//! Refreshing` and spawns the refresh; everyone arriving while `Refreshing`
//! joins the FIFO wait queue. The spawned task owns the episode, so a caller
//! that gives up (dropped future) never strands the others.
//!
//! Transitions:
//! - Idle → Refreshing (401, refresh token present, access token not already replaced)
//! - Refreshing → Idle on success: update credentials, drain queue, resume waiters with the token
//! - Refreshing → Idle on failure: drain queue, run logout hook, resume waiters with the error
//! - Idle (no refresh token) → logout hook, caller rejected, state untouched
//!
//! The state lock is a std `Mutex` that is never held across an `.await`,
//! so check-and-set and enqueue are atomic with respect to the scheduler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::{CredentialSource, SessionHook, TokenBundle, refresh_access_token};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::error::{Error, Result};
use crate::metrics;

/// Default budget for the refresh call itself.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on callers parked behind one refresh.
pub const DEFAULT_MAX_WAITERS: usize = 256;

/// Bounds applied to every refresh episode.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Expiry counts as refresh failure (session ends).
    pub timeout: Duration,
    /// Includes the caller that triggered the episode.
    pub max_waiters: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REFRESH_TIMEOUT,
            max_waiters: DEFAULT_MAX_WAITERS,
        }
    }
}

/// What every waiter of one episode observes.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    Failed(String),
}

/// A caller parked on an in-flight refresh.
struct Waiter {
    seq: u64,
    tx: oneshot::Sender<RefreshOutcome>,
}

enum RefreshState {
    Idle,
    Refreshing {
        episode: u64,
        waiters: VecDeque<Waiter>,
    },
}

/// Decision taken under the state lock.
enum Admission {
    /// Wait for the episode outcome.
    Join(oneshot::Receiver<RefreshOutcome>),
    /// Credentials already moved past the token the request used.
    Reuse(String),
    /// Nothing to refresh with.
    NoRefreshToken,
}

/// Handle to the single refresh coordinator. Cheap to clone.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<RefreshState>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    hook: Arc<dyn SessionHook>,
    settings: RefreshSettings,
    logging_out: AtomicBool,
    /// Bumped whenever the session ends. An episode started under an older
    /// value must not write tokens back.
    session: AtomicU64,
    episodes: AtomicU64,
    next_seq: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        hook: Arc<dyn SessionHook>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                transport,
                credentials,
                hook,
                settings,
                logging_out: AtomicBool::new(false),
                session: AtomicU64::new(0),
                episodes: AtomicU64::new(0),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain an access token to replay a request that got a 401.
    ///
    /// `sent_with` is the access token the failed request carried. If the
    /// credential source already holds a different one, it is returned
    /// without starting a new episode. That token is not checked: if it has
    /// expired too, the replay fails with `RetryExhausted` and no refresh is
    /// attempted for this request.
    pub async fn acquire_token(&self, sent_with: Option<&str>) -> Result<String> {
        match self.admit(sent_with)? {
            Admission::Reuse(token) => {
                debug!("access token already replaced, reusing it");
                Ok(token)
            }
            Admission::NoRefreshToken => {
                warn!("access token rejected and no refresh token stored");
                self.inner.end_session("refresh_token_missing").await;
                Err(Error::RefreshTokenMissing)
            }
            Admission::Join(rx) => match rx.await {
                Ok(RefreshOutcome::Refreshed(token)) => Ok(token),
                Ok(RefreshOutcome::Failed(msg)) => Err(Error::RefreshFailed(msg)),
                Err(_) => Err(Error::RefreshFailed(
                    "refresh task ended without an outcome".into(),
                )),
            },
        }
    }

    /// Whether a refresh episode is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of callers parked on the current episode (0 when idle).
    pub fn waiting(&self) -> usize {
        match &*self.inner.lock_state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters, .. } => waiters.len(),
        }
    }

    /// Number of refresh episodes started so far.
    pub fn episodes(&self) -> u64 {
        self.inner.episodes.load(Ordering::Relaxed)
    }

    /// Run the logout hook for an explicit user logout. A refresh still in
    /// flight is discarded and its waiters are rejected.
    pub async fn logout(&self) {
        self.inner.end_session("user_logout").await;
    }

    /// Check-and-set under one lock acquisition, no suspension point.
    fn admit(&self, sent_with: Option<&str>) -> Result<Admission> {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        let seq = inner.next_seq.fetch_add(1, Ordering::Relaxed);

        match &mut *state {
            RefreshState::Refreshing { episode, waiters } => {
                if waiters.len() >= inner.settings.max_waiters {
                    warn!(
                        episode = *episode,
                        max_waiters = inner.settings.max_waiters,
                        "refresh wait queue full, rejecting caller"
                    );
                    return Err(Error::WaitQueueFull(inner.settings.max_waiters));
                }
                let (tx, rx) = oneshot::channel();
                waiters.push_back(Waiter { seq, tx });
                debug!(episode = *episode, seq, queued = waiters.len(), "joined in-flight refresh");
                Ok(Admission::Join(rx))
            }
            RefreshState::Idle => {
                let tokens = inner.credentials.tokens();
                if let Some(current) = tokens.access {
                    if Some(current.as_str()) != sent_with {
                        return Ok(Admission::Reuse(current));
                    }
                }
                let Some(refresh) = tokens.refresh else {
                    return Ok(Admission::NoRefreshToken);
                };

                let session = inner.session.load(Ordering::Acquire);
                let episode = inner.episodes.fetch_add(1, Ordering::Relaxed) + 1;
                let (tx, rx) = oneshot::channel();
                *state = RefreshState::Refreshing {
                    episode,
                    waiters: VecDeque::from([Waiter { seq, tx }]),
                };
                drop(state);

                info!(episode, "access token rejected, starting refresh");
                tokio::spawn(self.inner.clone().run_episode(episode, session, refresh));
                Ok(Admission::Join(rx))
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove every waiter and return to Idle in one step.
    fn take_waiters(&self) -> VecDeque<Waiter> {
        match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Idle => VecDeque::new(),
            RefreshState::Refreshing { waiters, .. } => waiters,
        }
    }

    fn session_ended(&self, session: u64) -> bool {
        self.session.load(Ordering::Acquire) != session
    }

    /// Reject the waiters of an episode whose session was ended meanwhile.
    fn abandon(&self, episode: u64) {
        let waiters = self.take_waiters();
        metrics::record_refresh("abandoned");
        info!(episode, waiters = waiters.len(), "session ended during refresh, discarding token");
        resume_all(
            episode,
            waiters,
            RefreshOutcome::Failed("session ended during refresh".into()),
        );
    }

    async fn run_episode(self: Arc<Self>, episode: u64, session: u64, refresh: String) {
        let result = match tokio::time::timeout(
            self.settings.timeout,
            refresh_access_token(self.transport.as_ref(), &refresh),
        )
        .await
        {
            Ok(Ok(refreshed)) => Ok(refreshed),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "refresh timed out after {}s",
                self.settings.timeout.as_secs_f64()
            )),
        };

        match result {
            Ok(refreshed) => {
                if self.session_ended(session) {
                    self.abandon(episode);
                    return;
                }
                let access = refreshed.access;
                let update = TokenBundle {
                    access: Some(access.clone()),
                    refresh: refreshed.refresh,
                };
                if let Err(e) = self.credentials.update_tokens(update).await {
                    warn!(episode, error = %e, "failed to persist refreshed token");
                }
                if self.session_ended(session) {
                    // Logout landed while the update was being written
                    if let Err(e) = self.credentials.clear().await {
                        warn!(episode, error = %e, "failed to clear tokens after logout");
                    }
                    self.abandon(episode);
                    return;
                }

                let waiters = self.take_waiters();
                metrics::record_refresh("success");
                info!(episode, waiters = waiters.len(), "token refresh succeeded");
                resume_all(episode, waiters, RefreshOutcome::Refreshed(access));
            }
            Err(_) if self.session_ended(session) => self.abandon(episode),
            Err(msg) => {
                let waiters = self.take_waiters();
                metrics::record_refresh("failure");
                warn!(episode, waiters = waiters.len(), error = %msg, "token refresh failed");
                self.end_session("refresh_failed").await;
                resume_all(episode, waiters, RefreshOutcome::Failed(msg));
            }
        }
    }

    /// End the session and run the logout hook unless it is already running.
    async fn end_session(&self, reason: &'static str) {
        self.session.fetch_add(1, Ordering::AcqRel);
        if self
            .logging_out
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(reason, "logout hook already running, skipping");
            return;
        }
        info!(reason, "ending session, invoking logout hook");
        metrics::record_logout(reason);
        self.hook.on_logout().await;
        self.logging_out.store(false, Ordering::Release);
    }
}

/// Resume waiters in the order they joined. Abandoned receivers are skipped.
fn resume_all(episode: u64, waiters: VecDeque<Waiter>, outcome: RefreshOutcome) {
    for waiter in waiters {
        if waiter.tx.send(outcome.clone()).is_err() {
            debug!(episode, seq = waiter.seq, "waiter abandoned before refresh completed");
        }
    }
}
