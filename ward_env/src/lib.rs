//! Ward Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the ward pipeline run
//! against the real clock and OS entropy in production, or against a
//! virtual clock and a single master seed in simulation.
//!
//! The pipeline only touches the outside world through [`WardContext`]:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! # Example
//!
//! ```ignore
//! use ward_env::{TokioContext, WardContext};
//!
//! async fn tick_loop<Ctx: WardContext>(ctx: &Ctx) {
//!     let mut rng = ctx.derive_rng(0);
//!     loop {
//!         run_tick(&mut rng);
//!         ctx.sleep(Duration::from_secs(3)).await;
//!     }
//! }
//! ```

mod context;
mod tokio_impl;

pub use context::WardContext;
pub use tokio_impl::TokioContext;
