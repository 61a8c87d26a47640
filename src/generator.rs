//! # Measurement Generator
//!
//! Periodically picks one live entity at random and queues a new value for
//! it through the engine's mutation queue. Most values fall inside the valid
//! range; a configurable share lands just outside it.
//!
//! Ticks never mutate the store directly, so validation, logging and view
//! updates apply exactly as for caller-originated updates.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::domain::{EntityId, VALID_MAX_MW, VALID_MIN_MW};
use crate::engine::EngineHandle;
use crate::error::{CoreError, CoreResult};

/// Out-of-range value just below the valid floor
pub const INVALID_LOW_MW: f64 = 0.5;
/// Out-of-range value just above the valid ceiling
pub const INVALID_HIGH_MW: f64 = 5.8;

/// Draws one measurement value.
///
/// With probability `invalid_probability` the value is out of range (low or
/// high with equal odds), otherwise uniform over the valid range.
pub fn draw_value<R: Rng>(rng: &mut R, invalid_probability: f64) -> f64 {
    if rng.gen_bool(invalid_probability.clamp(0.0, 1.0)) {
        if rng.gen_bool(0.5) {
            INVALID_LOW_MW
        } else {
            INVALID_HIGH_MW
        }
    } else {
        rng.gen_range(VALID_MIN_MW..=VALID_MAX_MW)
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Running {
    /// Cancels the tick task and waits for it to exit.
    async fn halt(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "generator task ended abnormally");
        }
    }
}

pub struct MeasurementGenerator {
    engine: EngineHandle,
    invalid_probability: f64,
    period: Mutex<Duration>,
    rng: Arc<Mutex<StdRng>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl MeasurementGenerator {
    pub fn new(engine: EngineHandle, config: &GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            engine,
            invalid_probability: config.invalid_probability,
            period: Mutex::new(Duration::from_millis(config.interval_ms.max(1))),
            rng: Arc::new(Mutex::new(rng)),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        *self.period.lock()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Starts ticking. Calling it while running does nothing.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_none() {
            *running = Some(self.spawn());
        }
    }

    /// Stops ticking. When this returns no further tick will fire; a tick
    /// that already fired has been queued and will still be applied.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            current.halt().await;
            info!("measurement generator stopped");
        }
    }

    pub async fn restart(&self) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            current.halt().await;
        }
        *running = Some(self.spawn());
    }

    /// Changes the tick period. A running generator restarts on the new
    /// schedule.
    pub async fn change_interval(&self, ms: u64) -> CoreResult<()> {
        if ms == 0 {
            return Err(CoreError::invalid("generator interval must be positive"));
        }
        let mut running = self.running.lock().await;
        *self.period.lock() = Duration::from_millis(ms);
        debug!(interval_ms = ms, "generator interval changed");
        if let Some(current) = running.take() {
            current.halt().await;
            *running = Some(self.spawn());
        }
        Ok(())
    }

    /// Spawns the tick task. Callers hold the `running` lock.
    fn spawn(&self) -> Running {
        let period = self.interval();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(tick_loop(
            self.engine.clone(),
            Arc::clone(&self.rng),
            self.invalid_probability,
            period,
            cancel.clone(),
        ));
        info!(interval_ms = period.as_millis() as u64, "measurement generator started");
        Running { cancel, task }
    }
}

async fn tick_loop(
    engine: EngineHandle,
    rng: Arc<Mutex<StdRng>>,
    invalid_probability: f64,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some((id, value)) = pick(&engine, &rng, invalid_probability) else {
                    continue;
                };
                if engine.push_measurement(id, value).await.is_err() {
                    warn!("engine closed, generator loop exiting");
                    break;
                }
            }
        }
    }
}

/// Chooses the entity and value for one tick; `None` when the store is
/// empty.
fn pick(
    engine: &EngineHandle,
    rng: &Mutex<StdRng>,
    invalid_probability: f64,
) -> Option<(EntityId, f64)> {
    let snapshot = engine.snapshot();
    let mut rng = rng.lock();
    let id = snapshot.entities.choose(&mut *rng)?.id();
    Some((id, draw_value(&mut *rng, invalid_probability)))
}
