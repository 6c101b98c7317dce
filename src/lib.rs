//! # fusion-runtime
//!
//! Command-line host for the fusion engine.
//!
//! One process runs one instrument, described by a TOML profile (see the
//! bundled `profiles/`). Every cycle fetches the profile's sources, derives
//! modules M1..M7, scores data integrity, retries low-integrity attempts with
//! a bounded backoff and persists a JSON snapshot plus a rolling text log.
//!
//! ## Usage
//!
//! ```bash
//! # Validate a profile and show its fallback chains
//! fusion-runtime check --profile profiles/btcusd.toml
//!
//! # One cycle, then exit
//! fusion-runtime once --profile profiles/xrp.toml
//!
//! # Run every 4h until Ctrl-C / SIGTERM
//! FRED_API_KEY=... TWELVEDATA_API_KEY=... fusion-runtime run --profile profiles/us10y.toml
//!
//! # Render a persisted snapshot
//! fusion-runtime inspect US10Y/TOTAL_RECALL_RUNTIME_20250101_120000.json
//! ```
//!
//! ## Library
//!
//! ```no_run
//! use std::path::Path;
//!
//! use fusion_runtime::load_profile;
//!
//! let profile = load_profile(Path::new("profiles/sol.toml")).unwrap();
//! assert_eq!(profile.symbol, "SOL");
//! ```

pub mod inspect;
pub mod logging;
pub mod plan;
pub mod profile;

pub use inspect::render_snapshot;
pub use logging::LogFormat;
pub use plan::{Plan, PlannedSource};
pub use profile::{load_profile, ProfileLoader, ENV_PREFIX};
