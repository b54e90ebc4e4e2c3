use serde_json::Value;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::JobStatusSource;
use crate::config::{PollInterval, PollerConfig};
use crate::error::JobError;
use crate::notify::{Notification, NotificationKind, Notifier, TracingNotifier};
use crate::{JobId, JobStatus};

const POLLING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl SubscriptionState {
    fn from_u8(v: u8) -> Self {
        match v {
            SUCCEEDED => SubscriptionState::Succeeded,
            FAILED => SubscriptionState::Failed,
            CANCELLED => SubscriptionState::Cancelled,
            _ => SubscriptionState::Polling,
        }
    }
}

struct Shared {
    state: AtomicU8,
    ticks: AtomicU64,
    cancel: CancellationToken,
}

impl Shared {
    /// Moves out of `Polling`. Only the first caller wins: a job is either
    /// finished or cancelled, never both.
    fn leave_polling(&self, to: u8) -> bool {
        self.state
            .compare_exchange(POLLING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Tracks backend jobs until they finish.
///
/// Each `submit` spawns one tokio task that queries the job immediately,
/// then again every interval while it stays pending. Subscriptions share
/// nothing but the status source and the default interval.
pub struct AsyncJobPoller<S> {
    source: Arc<S>,
    default_interval: PollInterval,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for AsyncJobPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            default_interval: self.default_interval,
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: JobStatusSource + 'static> AsyncJobPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            default_interval: PollInterval::default(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn from_config(source: S, config: &PollerConfig) -> Self {
        Self::new(source).with_default_interval(config.default_interval)
    }

    pub fn with_default_interval(mut self, interval: PollInterval) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn default_interval(&self) -> PollInterval {
        self.default_interval
    }

    /// Starts watching `job_id`. Exactly one of `on_success`/`on_error` runs,
    /// once, unless the subscription is cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, G>(
        &self,
        job_id: impl Into<JobId>,
        interval: Option<PollInterval>,
        on_success: F,
        on_error: G,
    ) -> Subscription
    where
        F: FnOnce(Value) + Send + 'static,
        G: FnOnce(JobError) + Send + 'static,
    {
        let job_id = job_id.into();
        let interval = interval.unwrap_or(self.default_interval).as_duration();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(POLLING),
            ticks: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        let task = tokio::spawn({
            let source = self.source.clone();
            let notifier = self.notifier.clone();
            let shared = shared.clone();
            let job_id = job_id.clone();
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => {
                        debug!(%job_id, "subscription cancelled");
                        return;
                    }
                    outcome = poll_until_terminal(source.as_ref(), &job_id, interval, &shared.ticks) => outcome,
                };

                let to = if outcome.is_ok() { SUCCEEDED } else { FAILED };
                if !shared.leave_polling(to) {
                    return;
                }
                announce(notifier.as_ref(), &job_id, &outcome);
                match outcome {
                    Ok(result) => on_success(result),
                    Err(e) => on_error(e),
                }
            }
        });

        Subscription {
            job_id,
            shared,
            task: Some(task),
        }
    }

    /// Same protocol as [`submit`](Self::submit), as a future. Dropping the
    /// future stops polling.
    pub async fn wait(
        &self,
        job_id: impl Into<JobId>,
        interval: Option<PollInterval>,
    ) -> Result<Value, JobError> {
        let job_id = job_id.into();
        let interval = interval.unwrap_or(self.default_interval).as_duration();
        let ticks = AtomicU64::new(0);

        let outcome = poll_until_terminal(self.source.as_ref(), &job_id, interval, &ticks).await;
        announce(self.notifier.as_ref(), &job_id, &outcome);
        outcome
    }
}

async fn poll_until_terminal<S: JobStatusSource + ?Sized>(
    source: &S,
    job_id: &JobId,
    interval: Duration,
    ticks: &AtomicU64,
) -> Result<Value, JobError> {
    loop {
        let tick = ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let job = match source.query(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(%job_id, tick, error = %e, "job status query failed");
                return Err(e.into());
            }
        };

        match job.status {
            JobStatus::Pending => debug!(%job_id, tick, "job pending"),
            JobStatus::Succeeded(result) => {
                info!(%job_id, tick, "job succeeded");
                return Ok(result);
            }
            JobStatus::Failed(failure) => {
                info!(%job_id, tick, error = %failure.text, "job failed");
                return Err(JobError::Backend(failure));
            }
        }

        tokio::time::sleep(interval).await;
    }
}

fn announce(notifier: &dyn Notifier, job_id: &JobId, outcome: &Result<Value, JobError>) {
    let notification = match outcome {
        Ok(_) => Notification::new(
            job_id.clone(),
            NotificationKind::Succeeded,
            format!("job {job_id} completed"),
        ),
        Err(e) => Notification::new(job_id.clone(), NotificationKind::Failed, e.error_text()),
    };
    notifier.notify(notification);
}

/// Handle to one watched job. Dropping it detaches: polling goes on until
/// the job finishes. Use [`cancel`](Self::cancel) or
/// [`cancel_on_drop`](Self::cancel_on_drop) to stop it.
pub struct Subscription {
    job_id: JobId,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Status queries issued so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.state() != SubscriptionState::Polling
    }

    /// Stops polling. Returns `false` if the job had already finished, in
    /// which case its callback has run or is running.
    pub fn cancel(&self) -> bool {
        let won = self.shared.leave_polling(CANCELLED);
        self.shared.cancel.cancel();
        won
    }

    /// Resolves once the polling task has exited.
    pub async fn finished(mut self) {
        self.join().await;
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(job_id = %self.job_id, "job callback panicked");
                }
            }
        }
    }

    pub fn cancel_on_drop(self) -> CancelOnDrop {
        CancelOnDrop { inner: self }
    }
}

/// Cancels its subscription when dropped.
pub struct CancelOnDrop {
    inner: Subscription,
}

impl Deref for CancelOnDrop {
    type Target = Subscription;

    fn deref(&self) -> &Subscription {
        &self.inner
    }
}

impl CancelOnDrop {
    /// Resolves once the polling task has exited. If this future is dropped
    /// first, the subscription is cancelled.
    pub async fn finished(mut self) {
        self.inner.join().await;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}
