//! Delivery of completed relays.
//!
//! When a relay reaches its objective the coordinator hands a [`Delivery`]
//! to a [`DeliveryDispatcher`]. Dispatchers call a [`DeliverySink`] with a
//! bounded retry policy and log and drop the message once attempts run out.
//! Nothing is queued durably.
//!
//! - [`InlineDispatcher`] retries on the calling thread. Deterministic;
//!   meant for tests and offline runs.
//! - [`TokioDispatcher`] spawns one task per delivery so a slow sink never
//!   holds up the tick that produced it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::DeliveryError;
use crate::relay::Delivery;

/// Receiver of completed relays.
///
/// Implementations must either persist the message or return an error.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// Bounded fixed-delay retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Result of a delivery after retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32, error: DeliveryError },
}

/// Shared delivered/dropped counters.
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryCounters {
    fn record(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered { .. } => self.delivered.fetch_add(1, Ordering::Relaxed),
            DeliveryOutcome::Dropped { .. } => self.dropped.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Number of messages the sink accepted.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of messages dropped after exhausting retries.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Hands deliveries to a sink without blocking the relay pass.
pub trait DeliveryDispatcher: Send + Sync {
    fn dispatch(&self, delivery: Delivery);

    /// Delivered/dropped counters for this dispatcher.
    fn counters(&self) -> &DeliveryCounters;

    /// Returns true if `dispatch` runs the sink (and its retry sleeps) on the
    /// calling thread.
    fn blocks_caller(&self) -> bool {
        false
    }
}

/// Classifies the result of one attempt. `None` means try again.
fn settle(
    delivery: &Delivery,
    attempt: u32,
    policy: RetryPolicy,
    result: Result<(), DeliveryError>,
) -> Option<DeliveryOutcome> {
    match result {
        Ok(()) => {
            tracing::info!(
                sender = %delivery.sender,
                receiver = %delivery.receiver,
                attempt,
                "message delivered"
            );
            Some(DeliveryOutcome::Delivered { attempts: attempt })
        }
        Err(error @ DeliveryError::Rejected(_)) => {
            tracing::warn!(%error, sender = %delivery.sender, "delivery rejected, dropping message");
            Some(DeliveryOutcome::Dropped {
                attempts: attempt,
                error,
            })
        }
        Err(error) if attempt >= policy.attempts => {
            tracing::warn!(
                %error,
                sender = %delivery.sender,
                receiver = %delivery.receiver,
                attempts = attempt,
                "delivery failed after retries, dropping message"
            );
            Some(DeliveryOutcome::Dropped {
                attempts: attempt,
                error,
            })
        }
        Err(error) => {
            tracing::warn!(%error, attempt, "delivery attempt failed, retrying");
            None
        }
    }
}

/// Delivers on the current thread, sleeping between attempts.
pub fn deliver_with_retry(
    sink: &dyn DeliverySink,
    delivery: &Delivery,
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let mut attempt = 1;
    loop {
        if let Some(outcome) = settle(delivery, attempt, policy, sink.deliver(delivery)) {
            return outcome;
        }
        std::thread::sleep(policy.delay);
        attempt += 1;
    }
}

/// Delivers from an async task. The sink call runs on the blocking pool.
pub async fn deliver_with_retry_async(
    sink: Arc<dyn DeliverySink>,
    delivery: Delivery,
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let mut attempt = 1;
    loop {
        let call_sink = Arc::clone(&sink);
        let call_delivery = delivery.clone();
        let result = tokio::task::spawn_blocking(move || call_sink.deliver(&call_delivery))
            .await
            .unwrap_or_else(|e| Err(DeliveryError::Unavailable(format!("sink task failed: {e}"))));

        if let Some(outcome) = settle(&delivery, attempt, policy, result) {
            return outcome;
        }
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}

/// Synchronous dispatcher for tests and offline runs.
///
/// `dispatch` calls the sink and sleeps between retries on the calling
/// thread. Inside [`RelayEngine::step`](crate::RelayEngine::step) that means
/// while the engine lock is held, and under
/// [`RelayEngine::run`](crate::RelayEngine::run) it also stalls the runtime
/// worker. Use [`TokioDispatcher`] with `run`.
pub struct InlineDispatcher {
    sink: Arc<dyn DeliverySink>,
    policy: RetryPolicy,
    counters: DeliveryCounters,
}

impl InlineDispatcher {
    pub fn new(sink: Arc<dyn DeliverySink>, policy: RetryPolicy) -> Self {
        Self {
            sink,
            policy,
            counters: DeliveryCounters::default(),
        }
    }
}

impl DeliveryDispatcher for InlineDispatcher {
    fn dispatch(&self, delivery: Delivery) {
        let outcome = deliver_with_retry(self.sink.as_ref(), &delivery, self.policy);
        self.counters.record(&outcome);
    }

    fn counters(&self) -> &DeliveryCounters {
        &self.counters
    }

    fn blocks_caller(&self) -> bool {
        true
    }
}

/// Dispatcher that spawns one tokio task per delivery.
pub struct TokioDispatcher {
    handle: Handle,
    sink: Arc<dyn DeliverySink>,
    policy: RetryPolicy,
    counters: Arc<DeliveryCounters>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioDispatcher {
    /// Creates a dispatcher that spawns onto `handle`.
    pub fn new(handle: Handle, sink: Arc<dyn DeliverySink>, policy: RetryPolicy) -> Self {
        Self {
            handle,
            sink,
            policy,
            counters: Arc::new(DeliveryCounters::default()),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Creates a dispatcher on the runtime of the calling task.
    ///
    /// Panics outside a tokio runtime, like [`Handle::current`].
    pub fn current(sink: Arc<dyn DeliverySink>, policy: RetryPolicy) -> Self {
        Self::new(Handle::current(), sink, policy)
    }

    /// Waits for every delivery dispatched so far to finish.
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.in_flight.lock());
        for task in pending {
            if let Err(e) = task.await {
                tracing::error!("delivery task panicked: {e}");
            }
        }
    }

    /// Number of delivery tasks not yet awaited by [`flush`](Self::flush).
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.in_flight.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }
}

impl DeliveryDispatcher for TokioDispatcher {
    fn dispatch(&self, delivery: Delivery) {
        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);
        let policy = self.policy;

        let task = self.handle.spawn(async move {
            let outcome = deliver_with_retry_async(sink, delivery, policy).await;
            counters.record(&outcome);
        });
        let mut tasks = self.in_flight.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn counters(&self) -> &DeliveryCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Fails with `Unavailable` for the first `failures` calls.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        accepted: Mutex<Vec<Delivery>>,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                accepted: Mutex::new(Vec::new()),
            }
        }
    }

    impl DeliverySink for FlakySink {
        fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(DeliveryError::Unavailable("down".into()));
            }
            self.accepted.lock().push(delivery.clone());
            Ok(())
        }
    }

    struct RejectingSink;

    impl DeliverySink for RejectingSink {
        fn deliver(&self, _delivery: &Delivery) -> Result<(), DeliveryError> {
            Err(DeliveryError::Rejected("bad payload".into()))
        }
    }

    fn delivery() -> Delivery {
        Delivery {
            sender: "a".into(),
            receiver: "c".into(),
            payload: "hi".into(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_retry_then_success() {
        let sink = FlakySink::new(2);
        let outcome = deliver_with_retry(&sink, &delivery(), fast());
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(sink.accepted.lock().len(), 1);
    }

    #[test]
    fn test_retry_exhausted() {
        let sink = FlakySink::new(10);
        let outcome = deliver_with_retry(&sink, &delivery(), fast());
        assert!(matches!(outcome, DeliveryOutcome::Dropped { attempts: 3, .. }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rejection_not_retried() {
        let outcome = deliver_with_retry(&RejectingSink, &delivery(), fast());
        assert!(matches!(outcome, DeliveryOutcome::Dropped { attempts: 1, .. }));
    }

    #[test]
    fn test_policy_minimum_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
        assert_eq!(RetryPolicy::default().attempts, 3);
    }

    #[test]
    fn test_inline_dispatcher_counts() {
        let sink: Arc<dyn DeliverySink> = Arc::new(FlakySink::new(0));
        let dispatcher = InlineDispatcher::new(sink, fast());
        dispatcher.dispatch(delivery());
        assert_eq!(dispatcher.counters().delivered(), 1);
        assert_eq!(dispatcher.counters().dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_dispatcher_retries_in_background() {
        let flaky = Arc::new(FlakySink::new(1));
        let dispatcher = TokioDispatcher::current(flaky.clone(), fast());

        dispatcher.dispatch(delivery());
        dispatcher.dispatch(delivery());
        dispatcher.flush().await;

        assert_eq!(dispatcher.counters().delivered(), 2);
        assert_eq!(flaky.accepted.lock().len(), 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_tokio_dispatcher_drops_after_retries() {
        let dispatcher = TokioDispatcher::current(Arc::new(FlakySink::new(99)), fast());
        dispatcher.dispatch(delivery());
        dispatcher.flush().await;

        assert_eq!(dispatcher.counters().delivered(), 0);
        assert_eq!(dispatcher.counters().dropped(), 1);
    }
}
