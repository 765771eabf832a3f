use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::listeners::{Listeners, Subscription};
use crate::slot::PendingSlot;

/// How long the system must stay continuously busy before it is considered
/// to be waking up.
pub const WAKE_THRESHOLD: Duration = Duration::from_millis(2000);

/// Shared request-activity state.
///
/// Cloning is cheap and every clone observes the same counters, timer and
/// listeners. Independent instances never affect each other.
#[derive(Clone)]
pub struct RequestActivity(Arc<Inner>);

pub(crate) struct Inner {
    threshold: Duration,
    state: Mutex<State>,
    /// Mirrors of `state`, readable from listeners without taking the lock.
    in_flight: AtomicUsize,
    waking: AtomicBool,
    watch_tx: watch::Sender<bool>,
    listeners: Arc<Listeners>,
}

#[derive(Debug, Default)]
struct State {
    pending: usize,
    /// Armed for the current busy window until it fires or the window closes.
    wake_timer: Option<CancellationToken>,
}

impl RequestActivity {
    /// Create a tracker using [`WAKE_THRESHOLD`].
    pub fn new() -> Self {
        Self::with_threshold(WAKE_THRESHOLD)
    }

    /// Create a tracker with a custom wake threshold.
    pub fn with_threshold(threshold: Duration) -> Self {
        let (watch_tx, _) = watch::channel(false);
        Self(Arc::new(Inner {
            threshold,
            state: Mutex::new(State::default()),
            in_flight: AtomicUsize::new(0),
            waking: AtomicBool::new(false),
            watch_tx,
            listeners: Arc::new(Listeners::default()),
        }))
    }

    pub fn threshold(&self) -> Duration {
        self.0.threshold
    }

    /// Run `operation` as a pending request.
    ///
    /// The output, including any error, is returned untouched. The pending
    /// slot is released on every exit path, including the returned future
    /// being dropped before completion.
    pub async fn track<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        let _slot = self.pending_slot();
        operation.await
    }

    /// Like [`track`](Self::track), but builds the operation only after the
    /// pending slot has been taken.
    pub async fn track_fn<F, Fut>(&self, operation: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _slot = self.pending_slot();
        operation().await
    }

    /// Take a pending slot by hand, for work that does not fit in a single
    /// future. The request settles when the slot is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn pending_slot(&self) -> PendingSlot {
        PendingSlot::acquire(&self.0)
    }

    /// Whether the system currently appears to be waking up.
    pub fn is_waking(&self) -> bool {
        self.0.waking.load(Ordering::Acquire)
    }

    /// Number of requests currently in flight.
    pub fn pending(&self) -> usize {
        self.0.in_flight.load(Ordering::Acquire)
    }

    /// Register `listener` for wake transitions.
    ///
    /// The current value is not replayed; read [`is_waking`](Self::is_waking)
    /// if it is needed right away. Listeners run while the tracker holds its
    /// state lock, so they must return quickly and must not panic. They may
    /// read the tracker and (un)subscribe, but must not call
    /// [`track`](Self::track), [`track_fn`](Self::track_fn) or
    /// [`pending_slot`](Self::pending_slot), nor drop a [`PendingSlot`]:
    /// those take the same lock and would deadlock.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.0.listeners.insert(Arc::new(listener));
        Subscription::new(id, Arc::clone(&self.0.listeners))
    }

    /// Receiver that sees the same transitions as listeners.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.0.watch_tx.subscribe()
    }
}

impl Default for RequestActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl Inner {
    pub(crate) fn begin(self: &Arc<Self>) {
        let mut state = self.lock_state();
        state.pending += 1;
        self.in_flight.store(state.pending, Ordering::Release);
        if state.pending == 1 {
            debug_assert!(state.wake_timer.is_none());
            state.wake_timer = Some(self.arm_wake_timer());
        }
    }

    pub(crate) fn end(&self) {
        let mut state = self.lock_state();
        state.pending = state.pending.saturating_sub(1);
        self.in_flight.store(state.pending, Ordering::Release);
        if state.pending > 0 {
            return;
        }

        if let Some(timer) = state.wake_timer.take() {
            timer.cancel();
            debug!("busy window closed before the wake threshold");
        }

        if self.waking.load(Ordering::Acquire) {
            info!("all requests settled, server is awake");
            self.publish(false);
        }
    }

    fn arm_wake_timer(self: &Arc<Self>) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let inner = Arc::downgrade(self);
        let threshold = self.threshold;
        // Counted from the 0 -> 1 transition, not from the task's first poll.
        let deadline = Instant::now() + threshold;

        debug!(?threshold, "busy window opened, wake timer armed");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.wake(&cancelled);
                    }
                }
            }
        });

        token
    }

    fn wake(&self, timer: &CancellationToken) {
        let mut state = self.lock_state();
        // A cancel issued before we got the lock always wins.
        if timer.is_cancelled() {
            return;
        }
        state.wake_timer = None;
        debug_assert!(state.pending > 0);

        info!(
            pending = state.pending,
            "requests outstanding past the wake threshold, server is waking up"
        );
        self.publish(true);
    }

    /// Callers hold the state lock, which keeps transitions totally ordered.
    fn publish(&self, waking: bool) {
        self.waking.store(waking, Ordering::Release);
        self.watch_tx.send_replace(waking);
        self.listeners.notify(waking);
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RequestActivity")
            .field("threshold", &self.threshold)
            .field("pending", &state.pending)
            .field("waking", &self.waking.load(Ordering::Acquire))
            .field("wake_timer_armed", &state.wake_timer.is_some())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn timer_armed(activity: &RequestActivity) -> bool {
        activity.0.lock_state().wake_timer.is_some()
    }

    #[tokio::test(start_paused = true)]
    async fn timer_armed_only_for_first_pending_request() {
        let activity = RequestActivity::new();
        assert!(!timer_armed(&activity));

        let a = activity.pending_slot();
        assert!(timer_armed(&activity));
        let first = activity.0.lock_state().wake_timer.clone().unwrap();

        let b = activity.pending_slot();
        assert_eq!(activity.pending(), 2);
        let second = activity.0.lock_state().wake_timer.clone().unwrap();
        assert!(!first.is_cancelled());
        assert!(!second.is_cancelled());

        drop(a);
        assert!(timer_armed(&activity));
        drop(b);
        assert!(!timer_armed(&activity));
        assert!(first.is_cancelled());
        assert_eq!(activity.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_disarmed_after_firing() {
        let activity = RequestActivity::new();
        let slot = activity.pending_slot();

        tokio::time::sleep(WAKE_THRESHOLD + ms(1)).await;
        assert!(activity.is_waking());
        assert!(!timer_armed(&activity));

        drop(slot);
        assert!(!activity.is_waking());
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_timer_never_publishes() {
        let activity = RequestActivity::new();
        let slot = activity.pending_slot();
        let timer = activity.0.lock_state().wake_timer.clone().unwrap();
        drop(slot);

        // Firing path run by hand after the cancel.
        activity.0.wake(&timer);
        assert!(!activity.is_waking());
    }

    #[tokio::test(start_paused = true)]
    async fn track_is_transparent_to_results() {
        let activity = RequestActivity::new();

        let ok: Result<u32, &str> = activity.track(async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, &str> = activity.track_fn(|| async { Err("nope") }).await;
        assert_eq!(err, Err("nope"));

        assert_eq!(activity.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_threshold_is_respected() {
        let activity = RequestActivity::with_threshold(ms(50));
        assert_eq!(activity.threshold(), ms(50));
        let _slot = activity.pending_slot();

        tokio::time::sleep(ms(49)).await;
        assert!(!activity.is_waking());
        tokio::time::sleep(ms(2)).await;
        assert!(activity.is_waking());
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_state_and_instances_do_not() {
        let activity = RequestActivity::new();
        let clone = activity.clone();
        let other = RequestActivity::new();

        let _slot = clone.pending_slot();
        assert_eq!(activity.pending(), 1);
        assert_eq!(other.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debug_output_reports_state() {
        let activity = RequestActivity::new();
        let _slot = activity.pending_slot();
        let rendered = format!("{activity:?}");
        assert!(rendered.contains("pending: 1"));
        assert!(rendered.contains("wake_timer_armed: true"));
    }
}
