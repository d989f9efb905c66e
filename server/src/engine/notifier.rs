use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

/// A published snapshot together with the version it was published under.
#[derive(Debug)]
pub struct Published<T> {
    pub version: u64,
    pub snapshot: Arc<T>,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            snapshot: self.snapshot.clone(),
        }
    }
}

/// Result of [`ChangeNotifier::await_change`].
#[derive(Debug)]
pub enum WaitOutcome<T> {
    /// The version moved away from the one the caller knew.
    Changed(Published<T>),
    /// The deadline passed first. Carries the (unchanged) current state.
    TimedOut(Published<T>),
}

impl<T> WaitOutcome<T> {
    pub fn published(&self) -> &Published<T> {
        match self {
            WaitOutcome::Changed(p) | WaitOutcome::TimedOut(p) => p,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, WaitOutcome::Changed(_))
    }
}

/// Latest snapshot plus a version that advances on every publish.
///
/// Waiters subscribe to a watch channel, so one publish wakes all of them and
/// a waiter that gives up just drops its receiver. The channel has its own
/// lock, independent of whatever produced the snapshot.
pub struct ChangeNotifier<T> {
    tx: watch::Sender<Published<T>>,
}

impl<T: Send + Sync + 'static> ChangeNotifier<T> {
    /// Versions start at the current time in microseconds so that a client
    /// holding a version from a previous process never matches a new one.
    pub fn new(initial: T) -> Self {
        let start = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        Self::with_version(initial, start)
    }

    pub fn with_version(initial: T, version: u64) -> Self {
        let (tx, _rx) = watch::channel(Published {
            version,
            snapshot: Arc::new(initial),
        });
        Self { tx }
    }

    /// Replace the snapshot and wake every waiter. Returns the new version.
    pub fn publish(&self, snapshot: T) -> u64 {
        self.publish_with(|| snapshot)
    }

    /// Like [`publish`](Self::publish), but `render` runs while the channel
    /// is locked, so concurrent publishers are serialized together with
    /// their snapshots and the newest version always carries the newest
    /// state. `render` must not call back into this notifier.
    pub fn publish_with(&self, render: impl FnOnce() -> T) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|current| {
            current.version = current.version.wrapping_add(1);
            current.snapshot = Arc::new(render());
            version = current.version;
        });
        version
    }

    pub fn current(&self) -> Published<T> {
        self.tx.borrow().clone()
    }

    /// Block until the version differs from `known` or `deadline` passes.
    ///
    /// Dropping the returned future releases the waiter without affecting
    /// anyone else.
    pub async fn await_change(&self, known: u64, deadline: Instant) -> WaitOutcome<T> {
        let mut rx = self.tx.subscribe();
        let changed = tokio::time::timeout_at(deadline, async {
            // Err is unreachable while `self` owns the sender.
            rx.wait_for(|p| p.version != known)
                .await
                .map(|published| (*published).clone())
                .ok()
        })
        .await;

        match changed {
            Ok(Some(published)) => WaitOutcome::Changed(published),
            Ok(None) | Err(_) => WaitOutcome::TimedOut(self.current()),
        }
    }

    /// Number of callers currently blocked in `await_change`.
    pub fn waiting(&self) -> usize {
        self.tx.receiver_count()
    }
}
