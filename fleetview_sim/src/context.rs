//! Simulation context implementing FleetViewContext for deterministic runs.

use async_trait::async_trait;
use fleetview_env::FleetViewContext;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Virtual time 0 maps to 2024-01-01 00:00:00 UTC.
const SIM_EPOCH_SECS: u64 = 1_704_067_200;

/// Virtual clock plus a seeded ChaCha8 stream from which every other seed
/// in a run is drawn. Clones share both.
#[derive(Clone)]
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Nanoseconds since simulation start
    virtual_time_ns: Arc<Mutex<u64>>,

    rng: Arc<Mutex<ChaCha8Rng>>,

    epoch: SystemTime,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: UNIX_EPOCH + Duration::from_secs(SIM_EPOCH_SECS),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Moves virtual time forward to `time`. Never goes backwards.
    pub fn set_time(&self, time: Duration) {
        let mut current = self.virtual_time_ns.lock().unwrap();
        *current = (*current).max(time.as_nanos() as u64);
    }

    /// Draws a sub-seed from the master RNG (oracle, broker loss, ...).
    pub fn derive_seed(&self) -> u64 {
        self.rng.lock().unwrap().gen()
    }
}

#[async_trait]
impl FleetViewContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.virtual_time_ns.lock().unwrap())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping is the only way time passes in simulation
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, at_ms = self.now().as_millis() as u64, "sim spawn");
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
