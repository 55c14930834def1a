//! Thread-safe estimator handle and periodic fuse loop
//!
//! Platform sensor callbacks and the fuse timer may run on different threads.
//! `SharedFusion` serializes them behind one lock so every ingest or fuse call
//! sees and leaves a consistent estimator state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, trace};
use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::fusion::OrientationFusion;
use crate::types::{FusionSettings, FusionState, RenderRotation, SensorEvent};

/// Capacity of the fused-orientation channel
const CHANNEL_CAPACITY: usize = 4;

/// Upper bound on a single sleep, so a stop request is noticed promptly
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// Shortest accepted fuse period; shorter settings are raised to this
pub const MIN_FUSE_PERIOD: Duration = Duration::from_millis(1);

/// Cloneable, lock-protected [`OrientationFusion`]
///
/// Each method holds the lock for the whole operation.
#[derive(Debug, Clone, Default)]
pub struct SharedFusion {
    inner: Arc<Mutex<OrientationFusion>>,
}

impl SharedFusion {
    /// Create a shared estimator with default settings
    pub fn new() -> Self {
        Self::from_fusion(OrientationFusion::new())
    }

    /// Create a shared estimator with specified settings
    pub fn with_settings(settings: FusionSettings) -> Self {
        Self::from_fusion(OrientationFusion::with_settings(settings))
    }

    /// Wrap an existing estimator
    pub fn from_fusion(fusion: OrientationFusion) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fusion)),
        }
    }

    /// See [`OrientationFusion::ingest_accel_mag`]
    pub fn ingest_accel_mag(&self, accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) {
        self.inner.lock().ingest_accel_mag(accelerometer, magnetometer);
    }

    /// See [`OrientationFusion::ingest_gyro`]
    pub fn ingest_gyro(&self, angular_velocity: Vector3<f32>, timestamp_ns: i64) {
        self.inner.lock().ingest_gyro(angular_velocity, timestamp_ns);
    }

    /// See [`OrientationFusion::handle_event`]
    pub fn handle_event(&self, event: SensorEvent) {
        self.inner.lock().handle_event(event);
    }

    /// See [`OrientationFusion::fuse`]
    pub fn fuse(&self) -> RenderRotation {
        self.inner.lock().fuse()
    }

    /// Current lifecycle state
    pub fn state(&self) -> FusionState {
        self.inner.lock().state()
    }

    /// Current settings
    pub fn settings(&self) -> FusionSettings {
        self.inner.lock().settings()
    }

    /// Copy of the estimator at this instant
    pub fn snapshot(&self) -> OrientationFusion {
        self.inner.lock().clone()
    }

    /// Run `f` with exclusive access to the estimator
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut OrientationFusion) -> R) -> R {
        f(&mut *self.inner.lock())
    }
}

/// Background thread calling [`SharedFusion::fuse`] at a fixed rate
///
/// Timing comes from the estimator's [`FusionSettings`]: the first fuse runs
/// after `fuse_start_delay`, then every `fuse_period` (at least
/// [`MIN_FUSE_PERIOD`]). Each result is published on a bounded channel; if the
/// consumer falls behind, new results are dropped instead of blocking the loop.
/// The loop ends on [`stop`](Self::stop) or on drop.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ar_fusion::{FuseLoop, FusionSettings, SharedFusion};
///
/// let shared = SharedFusion::with_settings(FusionSettings {
///     fuse_period: Duration::from_millis(5),
///     fuse_start_delay: Duration::ZERO,
///     ..Default::default()
/// });
///
/// let fuse_loop = FuseLoop::spawn(shared.clone());
/// let rotation = fuse_loop.receiver().recv_timeout(Duration::from_secs(1)).unwrap();
/// println!("{rotation:?}");
/// fuse_loop.stop();
/// ```
#[derive(Debug)]
pub struct FuseLoop {
    shutdown: Arc<AtomicBool>,
    receiver: Receiver<RenderRotation>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl FuseLoop {
    /// Start fusing `shared` on a new thread
    pub fn spawn(shared: SharedFusion) -> Self {
        let mut settings = shared.settings();
        if settings.fuse_period < MIN_FUSE_PERIOD {
            debug!(
                "fuse period {:?} raised to {:?}",
                settings.fuse_period, MIN_FUSE_PERIOD
            );
            settings.fuse_period = MIN_FUSE_PERIOD;
        }
        let period = settings.fuse_period;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);

        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_fuse_loop(shared, settings, sender, &flag));

        Self {
            shutdown,
            receiver,
            period,
            handle: Some(handle),
        }
    }

    /// Channel carrying one [`RenderRotation`] per fuse step
    pub fn receiver(&self) -> &Receiver<RenderRotation> {
        &self.receiver
    }

    /// Interval between two fuse steps
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Request shutdown and wait for the thread to finish
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("fuse loop thread panicked");
            }
        }
    }
}

impl Drop for FuseLoop {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run_fuse_loop(
    shared: SharedFusion,
    settings: FusionSettings,
    sender: Sender<RenderRotation>,
    shutdown: &AtomicBool,
) {
    debug!(
        "fuse loop started: delay {:?}, period {:?}",
        settings.fuse_start_delay, settings.fuse_period
    );

    let mut next = Instant::now() + settings.fuse_start_delay;
    loop {
        // sleep in short slices until the next tick
        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("fuse loop stopped");
                return;
            }
            let now = Instant::now();
            if now >= next {
                break;
            }
            thread::sleep((next - now).min(MAX_SLEEP));
        }

        let rotation = shared.fuse();
        if let Err(TrySendError::Full(_)) = sender.try_send(rotation) {
            trace!("fuse output dropped, consumer lagging");
        }

        // fixed rate: schedule from the previous tick, not from now
        next += settings.fuse_period;
    }
}
