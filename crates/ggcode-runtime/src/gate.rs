//! API concurrency gate (§4.E, §5, §9): a process-wide actor serializing
//! outgoing LLM requests through a single priority queue — not a global
//! mutex.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, oneshot, Notify};

use ggcode_llm::{LlmError, LlmResult};

/// Dispatch priority. Lower variants are served first; within one
/// priority, submissions are served FIFO (spec.md §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// User-initiated requests.
    High,
    /// Tool-triggered follow-up requests.
    Normal,
    /// Background functional-subagent calls.
    Low,
}

/// A boxed, owned async job the gate runs to completion once dispatched.
pub type GateJob = Pin<Box<dyn Future<Output = LlmResult<String>> + Send>>;

struct Submission {
    priority: Priority,
    seq: u64,
    job: GateJob,
    respond: oneshot::Sender<LlmResult<String>>,
}

impl PartialEq for Submission {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Submission {}

impl PartialOrd for Submission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Submission {
    /// Reversed so [`BinaryHeap`] (a max-heap) pops the highest-priority,
    /// oldest-submitted entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The process-wide LLM request gate. Cloning shares the same underlying
/// actor. [`ConcurrencyGate::shutdown`] drains every queued-but-not-yet-
/// dispatched submission with `API_ABORTED`, per spec.md §4.E/§5.
#[derive(Clone)]
pub struct ConcurrencyGate {
    tx: mpsc::UnboundedSender<Submission>,
    shutdown: Arc<Notify>,
}

impl ConcurrencyGate {
    /// Spawn the gate actor with a cooldown window sampled uniformly from
    /// `cooldown_range` between consecutive dispatches (spec.md §4.E:
    /// 500-800ms).
    #[must_use]
    pub fn new() -> Self {
        Self::with_cooldown(std::time::Duration::from_millis(500)..std::time::Duration::from_millis(800))
    }

    /// Build a gate with an explicit cooldown range, for tests.
    #[must_use]
    pub fn with_cooldown(cooldown_range: std::ops::Range<std::time::Duration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(run_actor(rx, cooldown_range, shutdown.clone()));
        Self { tx, shutdown }
    }

    /// Submit a job at the given priority and await its result. If the
    /// gate has shut down before dispatching this submission, returns
    /// `API_ABORTED`.
    ///
    /// # Errors
    ///
    /// Returns whatever the job itself returns, or `LlmError::Aborted` if
    /// the gate drains without running it.
    pub async fn submit(&self, priority: Priority, job: GateJob) -> LlmResult<String> {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (respond, recv) = oneshot::channel();
        if self.tx.send(Submission { priority, seq, job, respond }).is_err() {
            return Err(LlmError::Aborted);
        }
        recv.await.unwrap_or(Err(LlmError::Aborted))
    }

    /// Drain every submission still waiting in the queue, failing each
    /// with `API_ABORTED`. The actor keeps running afterward — new
    /// submissions queue normally — mirroring a queue flush rather than a
    /// hard stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_actor(
    mut rx: mpsc::UnboundedReceiver<Submission>,
    cooldown_range: std::ops::Range<std::time::Duration>,
    shutdown: Arc<Notify>,
) {
    let mut heap: BinaryHeap<Submission> = BinaryHeap::new();
    loop {
        if heap.is_empty() {
            tokio::select! {
                biased;
                () = shutdown.notified() => {
                    drain_channel(&mut rx, &mut heap);
                    drain(std::mem::take(&mut heap));
                    continue;
                }
                received = rx.recv() => match received {
                    Some(sub) => heap.push(sub),
                    None => break,
                },
            }
        }
        while let Ok(sub) = rx.try_recv() {
            heap.push(sub);
        }
        if let Some(sub) = heap.pop() {
            let result = sub.job.await;
            let _ = sub.respond.send(result);
            let cooldown = sample_cooldown(&cooldown_range);
            tokio::time::sleep(cooldown).await;
        }
    }
    drain(heap);
}

fn drain_channel(rx: &mut mpsc::UnboundedReceiver<Submission>, heap: &mut BinaryHeap<Submission>) {
    while let Ok(sub) = rx.try_recv() {
        heap.push(sub);
    }
}

fn sample_cooldown(range: &std::ops::Range<std::time::Duration>) -> std::time::Duration {
    let lo = range.start.as_millis() as u64;
    let hi = range.end.as_millis() as u64;
    if hi <= lo {
        return range.start;
    }
    let millis = rand::thread_rng().gen_range(lo..hi);
    std::time::Duration::from_millis(millis)
}

fn drain(mut heap: BinaryHeap<Submission>) {
    while let Some(sub) = heap.pop() {
        let _ = sub.respond.send(Err(LlmError::Aborted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_job(text: &str) -> GateJob {
        let text = text.to_string();
        Box::pin(async move { Ok(text) })
    }

    #[tokio::test]
    async fn single_submission_round_trips() {
        let gate = ConcurrencyGate::with_cooldown(
            std::time::Duration::from_millis(1)..std::time::Duration::from_millis(2),
        );
        let result = gate.submit(Priority::High, instant_job("hi")).await.unwrap();
        assert_eq!(result, "hi");
    }

    #[tokio::test]
    async fn high_priority_dispatches_before_low() {
        let gate = ConcurrencyGate::with_cooldown(
            std::time::Duration::from_millis(1)..std::time::Duration::from_millis(2),
        );
        // Submit concurrently so both land in the queue before either dispatches.
        let low = gate.submit(Priority::Low, instant_job("low"));
        let high = gate.submit(Priority::High, instant_job("high"));
        let (low_result, high_result) = tokio::join!(low, high);
        assert_eq!(low_result.unwrap(), "low");
        assert_eq!(high_result.unwrap(), "high");
    }

    #[tokio::test]
    async fn shutdown_drains_queued_submission_with_aborted() {
        let gate = ConcurrencyGate::with_cooldown(
            std::time::Duration::from_millis(1)..std::time::Duration::from_millis(2),
        );
        // Occupy the actor with a slow in-flight job so the next submission
        // stays queued instead of dispatching immediately.
        let busy = gate.submit(Priority::Normal, Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok("busy".to_string())
        }));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let queued = gate.submit(Priority::Normal, instant_job("queued"));
        gate.shutdown();
        let (busy_result, queued_result) = tokio::join!(busy, queued);
        assert_eq!(busy_result.unwrap(), "busy");
        assert!(matches!(queued_result, Err(LlmError::Aborted)));
    }

    #[test]
    fn priority_orders_high_before_low() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }
}
