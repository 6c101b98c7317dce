//! # fusion-engine
//!
//! The fusion cycle for one instrument.
//!
//! Each cycle fetches every source of a [`Profile`](fusion_types::Profile),
//! derives the seven analytic modules (M1..M7), scores data integrity and,
//! when the score is below the profile's threshold, retries after a backoff
//! up to a bounded number of times. The accepted (or best) attempt is then
//! persisted as a JSON snapshot plus a block in the rolling log, and the
//! scheduler sleeps until the next cycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fusion_engine::CycleScheduler;
//! use fusion_sources::{Credentials, SourceFetcher};
//! use fusion_types::Profile;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile: Profile = toml::from_str(&std::fs::read_to_string("profiles/btcusd.toml")?)?;
//!     profile.validate()?;
//!
//!     let fetcher = SourceFetcher::new(&profile, &Credentials::from_env())?;
//!     let scheduler = CycleScheduler::builder(Arc::new(profile), Arc::new(fetcher)).build();
//!
//!     // One cycle, retries included
//!     let outcome = scheduler.run_once().await;
//!     println!("integrity {:.2}", outcome.snapshot.integrity_score);
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`ModulePipeline`]: pure M1..M7 derivation
//! - [`IntegrityScorer`]: fraction of key readings present
//! - [`AutorecoveryController`]: publish / retry / exhausted decisions
//! - [`SnapshotWriter`]: snapshot artifact, rolling log, last summary
//! - [`CycleScheduler`]: the control loop, stoppable through [`SchedulerHandle`]

mod dashboard;
mod integrity;
pub mod pipeline;
mod recovery;
mod scheduler;
mod status;
mod writer;

#[cfg(test)]
mod test_support;

pub use dashboard::{dashboard_line, dashboard_lines, render_block};
pub use integrity::{integrity_score, IntegrityScorer};
pub use pipeline::{Alignment, AlignmentStage, ModulePipeline, StaticAlignment};
pub use recovery::{AutorecoveryController, Decision, RetryState};
pub use scheduler::{
    CycleOutcome, CycleScheduler, CycleSchedulerBuilder, Resolution, SchedulerHandle,
};
pub use status::{Phase, SchedulerStatus};
pub use writer::{read_snapshot, Persisted, PersistenceError, SnapshotWriter};
