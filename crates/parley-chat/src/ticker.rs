//! Rotating status text shown while a send is in flight.
//!
//! Purely cosmetic: the ticker never touches conversation state. Each run is
//! bound to a child cancellation token so that leaving `Sending` or
//! deactivating the widget stops it. The most recently started run owns the
//! status line; an older run can neither overwrite nor clear it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Publishes the current status line on a watch channel.
pub struct StatusTicker {
    messages: Arc<[String]>,
    period: Duration,
    tx: watch::Sender<Option<String>>,
    /// Id of the run that owns the status line; 0 when none.
    owner: Arc<AtomicU64>,
    next_run: AtomicU64,
}

/// A running ticker. Stops on `stop()` or drop.
pub struct TickerRun {
    id: u64,
    token: CancellationToken,
    tx: watch::Sender<Option<String>>,
    owner: Arc<AtomicU64>,
}

impl StatusTicker {
    pub fn new(messages: Vec<String>, period: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            messages: messages.into(),
            period: period.max(Duration::from_millis(1)),
            tx,
            owner: Arc::new(AtomicU64::new(0)),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Start rotating. The run also stops when `parent` is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, parent: &CancellationToken) -> TickerRun {
        let token = parent.child_token();
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let run = TickerRun {
            id,
            token: token.clone(),
            tx: self.tx.clone(),
            owner: Arc::clone(&self.owner),
        };
        if self.messages.is_empty() {
            return run;
        }

        let first = self.messages[0].clone();
        self.tx.send_modify(|current| {
            self.owner.store(id, Ordering::SeqCst);
            *current = Some(first);
        });

        let messages = Arc::clone(&self.messages);
        let tx = self.tx.clone();
        let owner = Arc::clone(&self.owner);
        let period = self.period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut index = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        index = (index + 1) % messages.len();
                        publish(&tx, &token, &owner, id, messages[index].clone());
                    }
                }
            }
        });
        run
    }
}

impl TickerRun {
    /// Stop rotating and clear the status line if this run still owns it.
    pub fn stop(&self) {
        self.token.cancel();
        self.tx.send_if_modified(|current| {
            if self
                .owner
                .compare_exchange(self.id, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return false;
            }
            current.take().is_some()
        });
    }
}

impl Drop for TickerRun {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Write a status line unless the run was cancelled or superseded.
///
/// Both checks happen under the channel lock, and `stop()` cancels before
/// clearing, so a stopped run can never overwrite the clear.
fn publish(
    tx: &watch::Sender<Option<String>>,
    token: &CancellationToken,
    owner: &AtomicU64,
    id: u64,
    status: String,
) {
    tx.send_if_modified(|current| {
        if token.is_cancelled() || owner.load(Ordering::SeqCst) != id {
            return false;
        }
        *current = Some(status);
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker() -> StatusTicker {
        StatusTicker::new(
            vec!["one".to_string(), "two".to_string(), "three".to_string()],
            Duration::from_millis(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_is_immediate() {
        let ticker = ticker();
        let parent = CancellationToken::new();
        let _run = ticker.start(&parent);
        assert_eq!(ticker.current().as_deref(), Some("one"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotates_and_wraps() {
        let ticker = ticker();
        let parent = CancellationToken::new();
        let _run = ticker.start(&parent);
        let mut rx = ticker.subscribe();

        let mut seen = Vec::new();
        for _ in 0..3 {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().clone().unwrap());
        }
        assert_eq!(seen, vec!["two", "three", "one"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_status() {
        let ticker = ticker();
        let parent = CancellationToken::new();
        let run = ticker.start(&parent);
        run.stop();
        assert_eq!(ticker.current(), None);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticker.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_run() {
        let ticker = ticker();
        let parent = CancellationToken::new();
        drop(ticker.start(&parent));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticker.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_freezes_rotation() {
        let ticker = ticker();
        let parent = CancellationToken::new();
        let _run = ticker.start(&parent);
        parent.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        // No rotation after cancellation.
        assert_eq!(ticker.current().as_deref(), Some("one"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_run_cannot_clear_newer_status() {
        let ticker = ticker();
        let first = ticker.start(&CancellationToken::new());
        let second = ticker.start(&CancellationToken::new());

        drop(first);
        assert_eq!(ticker.current().as_deref(), Some("one"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ticker.current().as_deref(), Some("two"));

        second.stop();
        assert_eq!(ticker.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_run_stops_publishing() {
        let ticker = ticker();
        let _first = ticker.start(&CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ticker.current().as_deref(), Some("two"));

        let _second = ticker.start(&CancellationToken::new());
        assert_eq!(ticker.current().as_deref(), Some("one"));

        // The older run ticks at 200ms but no longer owns the line.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ticker.current().as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_empty_message_list_is_noop() {
        let ticker = StatusTicker::new(Vec::new(), Duration::from_millis(10));
        let parent = CancellationToken::new();
        let run = ticker.start(&parent);
        assert_eq!(ticker.current(), None);
        run.stop();
    }
}
