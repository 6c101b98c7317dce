//! # fusion-types
//!
//! Core types for the fusion runtime. This crate defines the data that flows
//! through one cycle (readings in, module results and a snapshot out) and the
//! instrument profile that drives it.
//!
//! ## Overview
//!
//! - [`Reading`] / [`Readings`]: one fetched (or failed) value per source
//! - [`ModuleResult`]: the named outputs of one derivation step (M1..M7)
//! - [`CycleSnapshot`]: everything one cycle publishes, with its on-disk layout
//! - [`Profile`]: per-instrument sources, coefficients and policies
//! - [`HumanDuration`]: `"10s"` / `"4h"` style durations used in profiles
//!
//! ## Example
//!
//! ```rust
//! use chrono::DateTime;
//! use fusion_types::{CycleSnapshot, ModuleId, ModuleResult, Reading, Readings};
//!
//! let at = DateTime::from_timestamp(1_735_732_800, 0).unwrap();
//! let readings: Readings = [Reading::value("BTC", 97_000.0, at)].into_iter().collect();
//!
//! let m1 = ModuleResult::builder(ModuleId::M1, at)
//!     .maybe_number("BTC", readings.value("BTC"))
//!     .number("macro_tone_score", 0.5)
//!     .build();
//!
//! let snapshot = CycleSnapshot::builder(at).integrity_score(1.0).module(m1).build();
//! assert_eq!(snapshot.len(), 1);
//! ```

mod duration;
mod module;
mod profile;
mod reading;
mod snapshot;

pub use duration::*;
pub use module::*;
pub use profile::*;
pub use reading::*;
pub use snapshot::*;
