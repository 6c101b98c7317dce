//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use fusion_types::{CycleSnapshot, Profile, Reading, Readings};

use crate::pipeline::ModulePipeline;

pub const BTCUSD: &str = include_str!("../../profiles/btcusd.toml");
pub const USDJPY: &str = include_str!("../../profiles/usdjpy.toml");
pub const XRP: &str = include_str!("../../profiles/xrp.toml");

pub fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn profile_from_toml(source: &str) -> Profile {
    let profile: Profile = toml::from_str(source).unwrap();
    profile.validate().unwrap();
    profile
}

pub fn btcusd_profile() -> Profile {
    profile_from_toml(BTCUSD)
}

/// Readings with the given values; `None` becomes a failed reading.
pub fn readings(values: &[(&str, Option<f64>)]) -> Readings {
    values
        .iter()
        .map(|(id, value)| match value {
            Some(v) => Reading::value(*id, *v, at()),
            None => Reading::failed(*id, "unreachable", at()),
        })
        .collect()
}

/// A BTCUSD snapshot at [`at`] with the given integrity score.
pub fn sample_snapshot(integrity: f64) -> CycleSnapshot {
    let pipeline = ModulePipeline::new(Arc::new(btcusd_profile()));
    let r = readings(&[
        ("BTC", Some(97_000.0)),
        ("ETH", Some(3_500.0)),
        ("DXY", None),
        ("VIX", Some(15.0)),
        ("fear_greed", Some(25.0)),
    ]);
    pipeline
        .derive(&r, at())
        .into_iter()
        .fold(
            CycleSnapshot::builder(at()).integrity_score(integrity),
            |b, m| b.module(m),
        )
        .build()
}
