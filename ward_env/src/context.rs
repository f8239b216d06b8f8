//! Core environment context trait for the ward pipeline.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// The central interface for environment interaction.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` (in `ward_sim`) - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every source of non-determinism the scheduler depends on (clock,
/// randomness) is owned by the implementation, so a seeded context
/// reproduces the same cohort and the same vitals stream.
#[async_trait]
pub trait WardContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for message timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task and returns its join handle.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives a random source for one consumer of randomness.
    ///
    /// The implementation combines its global seed with `seed_extension`
    /// so that independent consumers (cohort construction, vitals
    /// generation) draw from independent but reproducible streams.
    fn derive_rng(&self, seed_extension: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
