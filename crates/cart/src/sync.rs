//! Live cart subscription.
//!
//! A [`Reconciler`] task owns the store subscription for one user. It
//! reconciles every snapshot and publishes the result as a [`CartState`]
//! through a `watch` channel, so slow consumers only ever see the latest
//! state. Lost or refused subscriptions are retried with exponential backoff;
//! the last reconciled cart stays visible while the store is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use rand::Rng;
use shopez_core::UserId;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::BackoffConfig;
use crate::reconcile::{Cart, reconcile};
use crate::repository::CartRepository;
use crate::store::record::MalformedEntry;
use crate::store::{CartStore, StoreError};

/// Health of the subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Subscribing; no snapshot on the current channel yet.
    Connecting,
    /// Receiving snapshots.
    Live,
    /// The channel failed; a new attempt is scheduled.
    Unavailable {
        /// Consecutive failed attempts.
        attempt: u32,
        /// Delay before the next attempt.
        retry_in: Duration,
    },
}

/// What a subscriber sees of the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartState {
    /// Last reconciled cart. `None` until the first snapshot arrives.
    pub cart: Option<Cart>,
    /// Subscription health.
    pub connection: ConnectionStatus,
    /// Number of snapshots reconciled so far.
    pub revision: u64,
    /// Entries dropped from the last snapshot.
    pub diagnostics: Vec<MalformedEntry>,
}

impl CartState {
    /// Whether no snapshot has been reconciled yet.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.cart.is_none()
    }

    /// Whether the store is currently unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self.connection, ConnectionStatus::Unavailable { .. })
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self {
            cart: None,
            connection: ConnectionStatus::Connecting,
            revision: 0,
            diagnostics: Vec::new(),
        }
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure and return how long to wait before retrying.
    ///
    /// The delay is drawn from the upper half of the current window, so it
    /// never drops below half the nominal value nor exceeds `max`.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal();
        self.attempt = self.attempt.saturating_add(1);

        let half = nominal / 2;
        let spread = u64::try_from((nominal - half).as_millis()).unwrap_or(u64::MAX);
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        (half + Duration::from_millis(jitter)).min(self.config.max)
    }

    /// Forget previous failures.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    fn nominal(&self) -> Duration {
        let factor = self
            .config
            .multiplier
            .max(1)
            .checked_pow(self.attempt)
            .unwrap_or(u32::MAX);
        self.config
            .initial
            .checked_mul(factor)
            .unwrap_or(self.config.max)
            .min(self.config.max)
    }
}

/// Spawns subscription tasks.
pub struct Reconciler;

impl Reconciler {
    /// Start reconciling `user`'s cart.
    ///
    /// The returned handle owns the task: cancelling or dropping it stops
    /// delivery and releases the store subscription.
    #[must_use]
    pub fn spawn<S: CartStore>(
        repo: CartRepository<S>,
        user: UserId,
        backoff: BackoffConfig,
    ) -> CartSubscription {
        let (tx, rx) = watch::channel(CartState::default());
        let restart = Arc::new(Notify::new());

        let span = info_span!("cart_subscription", user = %user);
        let task = tokio::spawn(
            run(repo, user, Backoff::new(backoff), tx, Arc::clone(&restart)).instrument(span),
        );

        CartSubscription {
            state: rx,
            restart,
            task: Some(task),
        }
    }
}

enum ChannelEnd {
    Lost(StoreError),
    Ended,
    Restart,
    Closed,
}

async fn run<S: CartStore>(
    repo: CartRepository<S>,
    user: UserId,
    mut backoff: Backoff,
    tx: watch::Sender<CartState>,
    restart: Arc<Notify>,
) {
    loop {
        tx.send_if_modified(|state| {
            let changed = state.connection != ConnectionStatus::Connecting
                && !state.is_unavailable();
            if changed {
                state.connection = ConnectionStatus::Connecting;
            }
            changed
        });

        let end = match repo.subscribe(&user).await {
            Ok(mut snapshots) => {
                debug!("subscribed");
                loop {
                    tokio::select! {
                        next = snapshots.next() => match next {
                            Some(Ok(snapshot)) => {
                                backoff.reset();
                                let result = reconcile(&snapshot);
                                tx.send_modify(|state| {
                                    state.cart = Some(result.cart);
                                    state.connection = ConnectionStatus::Live;
                                    state.revision += 1;
                                    state.diagnostics = result.malformed;
                                });
                            }
                            Some(Err(e)) => break ChannelEnd::Lost(e),
                            None => break ChannelEnd::Ended,
                        },
                        () = restart.notified() => break ChannelEnd::Restart,
                        () = tx.closed() => break ChannelEnd::Closed,
                    }
                }
            }
            Err(e) => ChannelEnd::Lost(e),
        };

        match end {
            ChannelEnd::Closed => {
                debug!("no subscribers left");
                return;
            }
            ChannelEnd::Restart => {
                info!("resubscribing on request");
                backoff.reset();
                continue;
            }
            ChannelEnd::Lost(e) => warn!(error = %e, "cart subscription lost"),
            ChannelEnd::Ended => warn!("cart subscription ended"),
        }

        let retry_in = backoff.next_delay();
        let attempt = backoff.attempt();
        tx.send_modify(|state| {
            state.connection = ConnectionStatus::Unavailable { attempt, retry_in };
        });
        debug!(attempt, retry_in_ms = retry_in.as_millis(), "scheduling resubscribe");

        tokio::select! {
            () = tokio::time::sleep(retry_in) => {}
            () = restart.notified() => backoff.reset(),
            () = tx.closed() => return,
        }
    }
}

/// Handle to a running cart subscription.
pub struct CartSubscription {
    state: watch::Receiver<CartState>,
    restart: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl CartSubscription {
    /// Latest published state.
    #[must_use]
    pub fn current(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Another receiver of state updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.clone()
    }

    /// Current state followed by every later state a consumer keeps up with.
    ///
    /// Ends when the subscription is cancelled.
    pub fn updates(&self) -> impl Stream<Item = CartState> + Send + 'static {
        let mut rx = self.state.clone();
        stream! {
            let first = rx.borrow_and_update().clone();
            yield first;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                yield next;
            }
        }
    }

    /// Wait until `predicate` holds for the published state.
    ///
    /// Returns `None` if the subscription ends first.
    pub async fn wait_for(&self, predicate: impl FnMut(&CartState) -> bool) -> Option<CartState> {
        let mut rx = self.state.clone();
        rx.wait_for(predicate).await.ok().map(|state| state.clone())
    }

    /// Drop the current channel and subscribe again immediately.
    pub fn resubscribe(&self) {
        self.restart.notify_one();
    }

    /// Stop delivery and release the store subscription.
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await
                && e.is_panic()
            {
                warn!(error = %e, "cart subscription task panicked");
            }
        }
    }
}

impl Drop for CartSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
