//! Polling bridge between the controller and the page-side capture queues.
//!
//! Reads are snapshots: each operation evaluates one script and copies the
//! whole backing array out of the page. Nothing here blocks the page; the
//! observers keep appending while the controller polls.

use crate::browser::PageDriver;
use crate::capture::Queue;
use crate::poll;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Poll cadence for queue reads.
pub const RESPONSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for a search response before falling back to the
/// network log.
pub const SEARCH_RESPONSE_BUDGET: Duration = Duration::from_secs(30);

/// Cloneable handle for reading and clearing the capture queues.
#[derive(Clone)]
pub struct ResponseChannel {
    driver: Arc<dyn PageDriver>,
}

impl ResponseChannel {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self { driver }
    }

    /// Full contents of a queue, oldest first. A missing queue reads as
    /// empty.
    pub async fn snapshot(&self, queue: Queue) -> Result<Vec<Value>> {
        let script = format!("{} || []", queue.js_array());
        let value = self
            .driver
            .eval(&script)
            .await
            .context("queue read failed")?;
        match value {
            Value::Array(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    /// Newest entry, if any.
    pub async fn peek_latest(&self, queue: Queue) -> Result<Option<Value>> {
        Ok(self.snapshot(queue).await?.pop())
    }

    /// Current number of entries. This is the correlation marker source:
    /// take it before firing a call, then only trust entries past it.
    pub async fn queue_len(&self, queue: Queue) -> Result<usize> {
        Ok(self.snapshot(queue).await?.len())
    }

    /// Empty one queue.
    pub async fn clear(&self, queue: Queue) -> Result<()> {
        let script = format!("{} = [];", queue.js_array());
        self.driver
            .eval(&script)
            .await
            .context("queue clear failed")?;
        Ok(())
    }

    /// Empty both queues. Runs between page cycles, never while a wait is
    /// pending.
    pub async fn clear_all(&self) -> Result<()> {
        self.clear(Queue::Search).await?;
        self.clear(Queue::Unlock).await
    }

    /// Poll until the queue is non-empty and yield its newest entry, or
    /// `None` once `budget` elapses. Read errors count as empty polls.
    pub async fn await_response(&self, queue: Queue, budget: Duration) -> Option<Value> {
        poll::poll_until(RESPONSE_POLL_INTERVAL, budget, || async {
            match self.peek_latest(queue).await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!("queue poll failed: {e:#}");
                    None
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NetworkEvent;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fake page holding the two queue arrays and a scripted arrival.
    #[derive(Default)]
    struct QueueFake {
        state: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        search: Vec<Value>,
        unlock: Vec<Value>,
        // (reads remaining, value to append to the search queue)
        pending: Option<(u32, Value)>,
        reads: u32,
    }

    impl QueueFake {
        fn with_search(entries: Vec<Value>) -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().search = entries;
            fake
        }

        fn arriving_after(reads: u32, value: Value) -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().pending = Some((reads, value));
            fake
        }

        fn reads(&self) -> u32 {
            self.state.lock().unwrap().reads
        }
    }

    #[async_trait]
    impl PageDriver for QueueFake {
        async fn open(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn wait_visible(&self, _selector: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        async fn element_attribute(
            &self,
            _selector: &str,
            _name: &str,
        ) -> Result<Option<String>> {
            Ok(None)
        }
        async fn current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn eval(&self, script: &str) -> Result<Value> {
            let mut state = self.state.lock().unwrap();
            if script.contains("= []") {
                if script.contains("search_responses") {
                    state.search.clear();
                }
                if script.contains("unlock_responses") {
                    state.unlock.clear();
                }
                return Ok(json!([]));
            }
            if script.contains("search_responses") {
                state.reads += 1;
                if let Some((remaining, value)) = state.pending.take() {
                    if remaining <= 1 {
                        state.search.push(value);
                    } else {
                        state.pending = Some((remaining - 1, value));
                    }
                }
                return Ok(Value::Array(state.search.clone()));
            }
            if script.contains("unlock_responses") {
                return Ok(Value::Array(state.unlock.clone()));
            }
            Ok(Value::Null)
        }
        async fn enable_network_capture(&self) -> Result<()> {
            Ok(())
        }
        async fn drain_network_events(&self) -> Result<Vec<NetworkEvent>> {
            Ok(Vec::new())
        }
        async fn response_body(&self, _request_id: &str) -> Result<Value> {
            bail!("no bodies here")
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn channel(fake: QueueFake) -> (Arc<QueueFake>, ResponseChannel) {
        let fake = Arc::new(fake);
        let driver: Arc<dyn PageDriver> = fake.clone();
        (fake, ResponseChannel::new(driver))
    }

    #[tokio::test]
    async fn test_snapshot_returns_entries_oldest_first() {
        let (_, channel) = channel(QueueFake::with_search(vec![json!({"n": 1}), json!({"n": 2})]));
        let entries = channel.snapshot(Queue::Search).await.unwrap();
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(channel.queue_len(Queue::Search).await.unwrap(), 2);
        assert_eq!(
            channel.peek_latest(Queue::Search).await.unwrap(),
            Some(json!({"n": 2}))
        );
    }

    #[tokio::test]
    async fn test_clear_then_peek_returns_none() {
        let (_, channel) = channel(QueueFake::with_search(vec![json!({"n": 1})]));
        channel.clear(Queue::Search).await.unwrap();
        assert_eq!(channel.peek_latest(Queue::Search).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_all_empties_both_queues() {
        let fake = QueueFake::with_search(vec![json!(1)]);
        fake.state.lock().unwrap().unlock = vec![json!(2)];
        let (_, channel) = channel(fake);
        channel.clear_all().await.unwrap();
        assert_eq!(channel.queue_len(Queue::Search).await.unwrap(), 0);
        assert_eq!(channel.queue_len(Queue::Unlock).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_response_sees_late_arrival() {
        let (fake, channel) = channel(QueueFake::arriving_after(3, json!({"people": []})));
        let got = channel
            .await_response(Queue::Search, Duration::from_secs(30))
            .await;
        assert_eq!(got, Some(json!({"people": []})));
        assert_eq!(fake.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_response_gives_up_after_budget() {
        let (fake, channel) = channel(QueueFake::default());
        let got = channel
            .await_response(Queue::Search, Duration::from_secs(5))
            .await;
        assert_eq!(got, None);
        assert!(fake.reads() >= 5);
    }
}
