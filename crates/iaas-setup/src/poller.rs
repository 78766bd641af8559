//! State polling
//!
//! `StatePoller` calls a read function until the resource reaches one of the
//! target states. The loop can run inline (`wait_for_state`) or as a spawned
//! task (`wait_for_state_async`) that streams intermediate snapshots and
//! delivers exactly one terminal outcome.

use crate::error::{IaasError, Result};
use crate::state::{Availability, InstanceStatus, Resource, StateSet};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Read function polled by `StatePoller`
pub type PollReadFn<S> = Arc<dyn Fn() -> BoxFuture<'static, Result<S>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Reached,
    Pending,
}

/// Polls a resource until its state satisfies the configured target sets
pub struct StatePoller<S> {
    read: PollReadFn<S>,
    target_availability: StateSet<Availability>,
    pending_availability: StateSet<Availability>,
    target_instance_status: StateSet<InstanceStatus>,
    pending_instance_status: StateSet<InstanceStatus>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl<S> StatePoller<S>
where
    S: Resource + Send + 'static,
{
    pub fn new<F, Fut>(read: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        Self::from_read_fn(Arc::new(move || Box::pin(read()) as BoxFuture<'static, Result<S>>))
    }

    pub fn from_read_fn(read: PollReadFn<S>) -> Self {
        Self {
            read,
            target_availability: StateSet::empty(),
            pending_availability: StateSet::empty(),
            target_instance_status: StateSet::empty(),
            pending_instance_status: StateSet::empty(),
            interval: crate::options::DEFAULT_POLLING_INTERVAL,
            timeout: Some(crate::options::DEFAULT_POLL_TIMEOUT),
        }
    }

    pub fn target_availability(mut self, states: impl IntoIterator<Item = Availability>) -> Self {
        self.target_availability = StateSet::new(states);
        self
    }

    pub fn pending_availability(mut self, states: impl IntoIterator<Item = Availability>) -> Self {
        self.pending_availability = StateSet::new(states);
        self
    }

    pub fn target_instance_status(
        mut self,
        states: impl IntoIterator<Item = InstanceStatus>,
    ) -> Self {
        self.target_instance_status = StateSet::new(states);
        self
    }

    pub fn pending_instance_status(
        mut self,
        states: impl IntoIterator<Item = InstanceStatus>,
    ) -> Self {
        self.pending_instance_status = StateSet::new(states);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Overall limit for the wait; `None` waits until cancelled
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Poll inline until a terminal state, an error, the timeout or cancellation
    pub async fn wait_for_state(&self, cancel: &CancellationToken) -> Result<S> {
        self.run(cancel, None).await
    }

    /// Spawn the polling loop and return a handle observing it
    pub fn wait_for_state_async(self, cancel: CancellationToken) -> PollHandle<S> {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let outcome = self.run(&cancel, Some(&progress_tx)).await;
            // receiver may already be gone; nothing left to report to
            let _ = outcome_tx.send(outcome);
        });

        PollHandle {
            progress: progress_rx,
            outcome: outcome_rx,
            _task: AbortOnDrop(task),
        }
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        progress: Option<&mpsc::UnboundedSender<S>>,
    ) -> Result<S> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IaasError::Cancelled),
                _ = wait_deadline(deadline) => {
                    return Err(IaasError::Timeout(format!(
                        "state was not reached after {} polls",
                        polls
                    )));
                }
                _ = ticker.tick() => {}
            }

            let state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IaasError::Cancelled),
                result = (self.read)() => result?,
            };
            polls += 1;

            tracing::debug!(
                "Poll #{} for resource {}: availability={:?}, instance_status={:?}",
                polls,
                state.id(),
                state.availability(),
                state.instance_status()
            );

            match self.judge(&state)? {
                Verdict::Reached => return Ok(state),
                Verdict::Pending => {
                    if let Some(tx) = progress {
                        // progress is advisory; a dropped receiver is fine
                        let _ = tx.send(state);
                    }
                }
            }
        }
    }

    fn judge(&self, state: &S) -> Result<Verdict> {
        let availability = state
            .availability()
            .filter(|_| !self.target_availability.is_empty());
        let instance_status = state
            .instance_status()
            .filter(|_| !self.target_instance_status.is_empty());

        let unexpected = || IaasError::UnexpectedState {
            availability: state.availability(),
            instance_status: state.instance_status(),
        };

        if availability.is_none() && instance_status.is_none() {
            return Err(unexpected());
        }

        let availability_reached =
            availability.is_none_or(|a| self.target_availability.contains(a));
        let status_reached =
            instance_status.is_none_or(|s| self.target_instance_status.contains(s));
        if availability_reached && status_reached {
            return Ok(Verdict::Reached);
        }

        let availability_waiting = availability.is_none_or(|a| {
            self.target_availability.contains(a) || self.pending_availability.contains(a)
        });
        let status_waiting = instance_status.is_none_or(|s| {
            self.target_instance_status.contains(s) || self.pending_instance_status.contains(s)
        });
        if availability_waiting && status_waiting {
            return Ok(Verdict::Pending);
        }

        Err(unexpected())
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle to a spawned polling loop.
///
/// Progress snapshots arrive zero or more times, followed by exactly one
/// outcome. Dropping the handle stops the loop.
pub struct PollHandle<S> {
    progress: mpsc::UnboundedReceiver<S>,
    outcome: oneshot::Receiver<Result<S>>,
    _task: AbortOnDrop,
}

impl<S> PollHandle<S> {
    /// Next intermediate snapshot; `None` once the loop has finished
    pub async fn next_progress(&mut self) -> Option<S> {
        self.progress.recv().await
    }

    /// Wait for the terminal outcome, discarding progress
    pub async fn wait(self) -> Result<S> {
        let PollHandle { outcome, _task, .. } = self;
        flatten(outcome.await)
    }

    /// Wait for the terminal outcome, handing every intermediate snapshot to `on_progress`
    pub async fn wait_with_progress(self, mut on_progress: impl FnMut(S)) -> Result<S> {
        let PollHandle {
            mut progress,
            mut outcome,
            _task,
        } = self;

        loop {
            tokio::select! {
                biased;
                Some(state) = progress.recv() => on_progress(state),
                result = &mut outcome => {
                    // the loop sends all progress before the outcome
                    while let Ok(state) = progress.try_recv() {
                        on_progress(state);
                    }
                    return flatten(result);
                }
            }
        }
    }
}

fn flatten<S>(result: std::result::Result<Result<S>, oneshot::error::RecvError>) -> Result<S> {
    result.unwrap_or_else(|_| {
        Err(IaasError::ApiError(
            "state poller stopped without a result".to_string(),
        ))
    })
}
