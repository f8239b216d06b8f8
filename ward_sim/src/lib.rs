//! Ward Simulation Harness
//!
//! Runs the ward pipeline against a seeded, virtual environment so that a
//! run is fully reproducible from one 64-bit seed:
//! - **Time**: a virtual clock that advances only when the loop sleeps
//! - **Randomness**: cohort and vitals streams derived from the master seed
//!
//! # Usage
//!
//! ```ignore
//! use ward_sim::{run_ticks, SimContext, TickExport};
//!
//! let scheduler = Scheduler::bootstrap(SimContext::shared(42), &config, hub, store)?;
//! let (_stop, mut shutdown) = tokio::sync::watch::channel(false);
//! let mut export = TickExport::new(42, config.cohort_size, 3000);
//! run_ticks(&scheduler, &config, 10, &mut export, &mut shutdown).await;
//! ```

mod context;
mod exporter;
mod runner;

pub use context::SimContext;
pub use exporter::{TickExport, TickFrame};
pub use runner::{console_subscriber, run_ticks, tier_counts, RunError};
