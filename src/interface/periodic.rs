//! # Periodic Callbacks
//!
//! A [`PeriodicCallback`] is a tokio task that polls one MSP message at a
//! fixed rate and hands each decoded message to a user callback. Every
//! poll is a full transaction under the MSP lock, so several workers can
//! share one link without their frames interleaving.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{MspError, Result};
use crate::msp::protocol::MspCode;
use crate::msp::transaction::{transact, SharedMsp};
use crate::msp::Message;

/// Largest accepted polling rate
pub const MAX_FREQUENCY_HZ: f32 = 1000.0;

/// User callback receiving each decoded message
pub type Callback<M> = Box<dyn FnMut(&M) + Send>;

#[derive(Debug, Default)]
struct WorkerStats {
    iterations: AtomicU64,
    failures: AtomicU64,
    overruns: AtomicU64,
}

/// Counters of a worker since it was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStatsSnapshot {
    /// Completed polls, successful or not
    pub iterations: u64,
    /// Polls that failed to send, receive or decode
    pub failures: u64,
    /// Polls that took longer than the period
    pub overruns: u64,
}

/// Check a requested polling rate and turn it into a period
///
/// # Errors
///
/// [`MspError::InvalidFrequency`] unless `0 < frequency <= 1000`.
pub fn period_for(frequency: f32) -> Result<Duration> {
    if !frequency.is_finite() || frequency <= 0.0 || frequency > MAX_FREQUENCY_HZ {
        return Err(MspError::InvalidFrequency(frequency));
    }
    Ok(Duration::from_nanos((1e9 / frequency as f64) as u64))
}

/// Worker polling message `M` at a fixed frequency
///
/// The worker runs from construction until [`stop`](Self::stop) or drop.
/// Stopping is cooperative: an iteration in progress completes first, so
/// a transaction is never cut between its request and its response.
/// Dropping a running worker signals the same stop without waiting.
pub struct PeriodicCallback<M: Message + Default + 'static> {
    msp: SharedMsp,
    code: MspCode,
    frequency: f32,
    period: Duration,
    active: Arc<AtomicBool>,
    wake: Arc<Notify>,
    stats: Arc<WorkerStats>,
    task: Option<JoinHandle<(M, Callback<M>)>>,
}

impl<M: Message + Default + 'static> PeriodicCallback<M> {
    /// Start polling `M` at `frequency` Hz
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`MspError::InvalidFrequency`] unless `0 < frequency <= 1000`.
    pub fn new<F>(msp: SharedMsp, frequency: f32, callback: F) -> Result<Self>
    where
        F: FnMut(&M) + Send + 'static,
    {
        let period = period_for(frequency)?;
        let message = M::default();
        let code = message.code();

        let mut worker = Self {
            msp,
            code,
            frequency,
            period,
            active: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            stats: Arc::new(WorkerStats::default()),
            task: None,
        };
        worker.start(message, Box::new(callback));
        Ok(worker)
    }

    pub fn code(&self) -> MspCode {
        self.code
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            iterations: self.stats.iterations.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            overruns: self.stats.overruns.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and wait for its task to finish
    ///
    /// Calling it on a stopped worker does nothing.
    pub async fn stop(&mut self) {
        let _ = self.halt().await;
    }

    /// Replace the callback, restarting the worker
    ///
    /// The last decoded message is kept across the restart.
    pub async fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&M) + Send + 'static,
    {
        let message = match self.halt().await {
            Some((message, _)) => message,
            None => M::default(),
        };
        self.start(message, Box::new(callback));
    }

    fn start(&mut self, message: M, callback: Callback<M>) {
        self.active.store(true, Ordering::Release);
        self.task = Some(tokio::spawn(run(
            self.msp.clone(),
            self.period,
            self.active.clone(),
            self.wake.clone(),
            self.stats.clone(),
            message,
            callback,
        )));
        debug!("Started {} worker at {} Hz", self.code, self.frequency);
    }

    async fn halt(&mut self) -> Option<(M, Callback<M>)> {
        self.active.store(false, Ordering::Release);
        self.wake.notify_one();

        let task = self.task.take()?;
        match task.await {
            Ok(state) => {
                debug!("Stopped {} worker", self.code);
                Some(state)
            }
            Err(e) => {
                warn!("{} worker ended abnormally: {}", self.code, e);
                None
            }
        }
    }
}

impl<M: Message + Default + 'static> Drop for PeriodicCallback<M> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.wake.notify_one();
        // The detached task exits after its current iteration
        self.task.take();
    }
}

impl<M: Message + Default + 'static> std::fmt::Debug for PeriodicCallback<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicCallback")
            .field("code", &self.code)
            .field("frequency", &self.frequency)
            .field("active", &self.is_active())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Type-erased view of a [`PeriodicCallback`]
///
/// Lets the interface keep workers for different messages in one list.
#[async_trait]
pub trait PeriodicWorker: Send + Sync {
    fn code(&self) -> MspCode;
    fn frequency(&self) -> f32;
    fn is_active(&self) -> bool;
    fn stats(&self) -> WorkerStatsSnapshot;
    async fn stop(&mut self);
}

#[async_trait]
impl<M: Message + Default + 'static> PeriodicWorker for PeriodicCallback<M> {
    fn code(&self) -> MspCode {
        self.code
    }

    fn frequency(&self) -> f32 {
        self.frequency
    }

    fn is_active(&self) -> bool {
        PeriodicCallback::is_active(self)
    }

    fn stats(&self) -> WorkerStatsSnapshot {
        PeriodicCallback::stats(self)
    }

    async fn stop(&mut self) {
        PeriodicCallback::stop(self).await
    }
}

async fn run<M: Message>(
    msp: SharedMsp,
    period: Duration,
    active: Arc<AtomicBool>,
    wake: Arc<Notify>,
    stats: Arc<WorkerStats>,
    mut message: M,
    mut callback: Callback<M>,
) -> (M, Callback<M>) {
    let code = message.code();
    let mut payload = Vec::new();

    while active.load(Ordering::Acquire) {
        let started = Instant::now();

        let polled = match transact(&msp, code.as_u16(), &[], &mut payload).await {
            Ok(()) => message.decode(&payload),
            Err(e) => Err(e),
        };
        match polled {
            Ok(()) => callback(&message),
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                error!("Periodic read of {} failed: {}", code, e);
            }
        }
        stats.iterations.fetch_add(1, Ordering::Relaxed);

        let elapsed = started.elapsed();
        if elapsed > period {
            stats.overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "{} worker unable to meet frequency requirements ({:?} > {:?})",
                code, elapsed, period
            );
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(started + period) => {}
            _ = wake.notified() => {}
        }
    }

    (message, callback)
}
