//! Background range sampling.
//!
//! Spawns a thread that owns the `RangeSensor`, pushes the latest reading via
//! a bounded channel, and tracks the last-ok timestamp so the control loop can
//! tell a quiet sensor from a dead one.
//!
//! Each `RangeSampler` spawns exactly one thread, shut down and joined when the
//! sampler is dropped.
use crossbeam_channel as xch;
use rcdrive_traits::RangeSensor;
use rcdrive_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One range reading: `None` means the sensor answered without a target.
pub type RangeReading = Option<u16>;

pub struct RangeSampler {
    rx: xch::Receiver<RangeReading>,
    last_ok: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl RangeSampler {
    pub fn spawn<S: RangeSensor + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut sensor: S,
        hz: u32,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let stale = rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let errors = Arc::new(AtomicU64::new(0));
        let errors_clone = errors.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("range sampler received shutdown signal");
                    break;
                }

                match sensor.read_mm(timeout) {
                    Ok(v) => {
                        // Latest wins: evict an unread older reading instead of
                        // blocking, so shutdown is never stuck behind a full channel.
                        if let Err(xch::TrySendError::Full(v)) = tx.try_send(v) {
                            let _ = stale.try_recv();
                            let _ = tx.try_send(v);
                        }
                        last_ok_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Err(e) => {
                        errors_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(error = %e, "range read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("range sampler thread exiting cleanly");
        });

        Self {
            rx,
            last_ok,
            errors,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Most recent reading since the last call, if any arrived.
    pub fn latest(&self) -> Option<RangeReading> {
        self.rx.try_iter().last()
    }

    /// Milliseconds since the last successful read, relative to `now_ms` on the sampler's epoch.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Same as `stalled_for`, measured with a real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        let now_ms = u64::try_from(ms).unwrap_or(u64::MAX);
        self.stalled_for(now_ms)
    }

    /// Failed reads since spawn.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for RangeSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits at its next shutdown check, at worst after the
        // in-flight read returns (bounded by the sensor timeout).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("range sampler thread joined"),
                Err(e) => tracing::warn!(?e, "range sampler thread panicked during shutdown"),
            }
        }
    }
}
