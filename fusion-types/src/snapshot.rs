//! Snapshot - the persisted result of one fusion cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ModuleId, ModuleResult, OutputValue};

/// Timestamp layout used in snapshot artifacts (RFC 3339, microseconds, `Z`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// The outcome of one cycle: module results M1..M7 plus the integrity score
/// of the attempt they were derived from.
///
/// # Example
///
/// ```rust
/// use chrono::DateTime;
/// use fusion_types::{CycleSnapshot, ModuleId, ModuleResult};
///
/// let at = DateTime::from_timestamp(1_735_732_800, 0).unwrap();
/// let snapshot = CycleSnapshot::builder(at)
///     .integrity_score(0.75)
///     .module(ModuleResult::builder(ModuleId::M4, at)
///         .number("alignment_score", 0.34)
///         .text("phase", "transitional")
///         .build())
///     .build();
///
/// let json = serde_json::to_string(&snapshot).unwrap();
/// assert!(json.contains("\"timestamp_utc\":\"2025-01-01T12:00:00.000000Z\""));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireSnapshot", into = "WireSnapshot")]
pub struct CycleSnapshot {
    /// Cycle timestamp; every module result carries the same instant.
    pub timestamp: DateTime<Utc>,

    /// Fraction of key sources present in the published attempt.
    pub integrity_score: f64,

    /// Module results keyed by module id, in execution order.
    pub modules: BTreeMap<ModuleId, ModuleResult>,
}

impl CycleSnapshot {
    /// Create a builder for a snapshot taken at `timestamp`.
    pub fn builder(timestamp: DateTime<Utc>) -> SnapshotBuilder {
        SnapshotBuilder {
            timestamp,
            integrity_score: 1.0,
            modules: BTreeMap::new(),
        }
    }

    /// Get the result of a module.
    pub fn get(&self, module: ModuleId) -> Option<&ModuleResult> {
        self.modules.get(&module)
    }

    /// Look up a single output of a module.
    pub fn output(&self, module: ModuleId, key: &str) -> Option<&OutputValue> {
        self.get(module).and_then(|m| m.get(key))
    }

    /// Iterate over module results in order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleResult> {
        self.modules.values()
    }

    /// Number of modules in the snapshot.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the snapshot is empty (no modules).
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The cycle timestamp as written to the artifact.
    pub fn timestamp_utc(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Builder for constructing `CycleSnapshot` instances.
#[derive(Debug)]
pub struct SnapshotBuilder {
    timestamp: DateTime<Utc>,
    integrity_score: f64,
    modules: BTreeMap<ModuleId, ModuleResult>,
}

impl SnapshotBuilder {
    /// Set the integrity score.
    pub fn integrity_score(mut self, score: f64) -> Self {
        self.integrity_score = score;
        self
    }

    /// Add a module result, replacing any earlier result for the same module.
    pub fn module(mut self, result: ModuleResult) -> Self {
        self.modules.insert(result.module, result);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> CycleSnapshot {
        CycleSnapshot {
            timestamp: self.timestamp,
            integrity_score: self.integrity_score,
            modules: self.modules,
        }
    }
}

/// On-disk layout of a snapshot.
#[derive(Serialize, Deserialize)]
struct WireSnapshot {
    timestamp_utc: String,
    integrity_score: f64,
    modules: BTreeMap<ModuleId, BTreeMap<String, OutputValue>>,
}

impl From<CycleSnapshot> for WireSnapshot {
    fn from(snapshot: CycleSnapshot) -> Self {
        WireSnapshot {
            timestamp_utc: snapshot.timestamp_utc(),
            integrity_score: snapshot.integrity_score,
            modules: snapshot
                .modules
                .into_iter()
                .map(|(id, result)| (id, result.outputs))
                .collect(),
        }
    }
}

impl TryFrom<WireSnapshot> for CycleSnapshot {
    type Error = chrono::ParseError;

    fn try_from(wire: WireSnapshot) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&wire.timestamp_utc)?.with_timezone(&Utc);
        let modules = wire
            .modules
            .into_iter()
            .map(|(module, outputs)| {
                (
                    module,
                    ModuleResult {
                        module,
                        outputs,
                        computed_at: timestamp,
                    },
                )
            })
            .collect();

        Ok(CycleSnapshot {
            timestamp,
            integrity_score: wire.integrity_score,
            modules,
        })
    }
}
