//! Text rendering of a cycle: the block appended to the rolling log.

use std::path::Path;

use fusion_types::{CycleSnapshot, ModuleResult, OutputValue};

const RULE: &str = "============================================================";

/// Display labels for well-known outputs, in display order.
const LABELS: &[(&str, &str)] = &[
    ("macro_tone_score", "Macro"),
    ("behavioral_polarity", "Polarity"),
    ("short_term_bias", "Bias"),
    ("confidence", "Conf"),
    ("alignment_score", "Alignment"),
    ("phase", "Phase"),
    ("risk_chain_score", "Risk"),
    ("directional_bias", "Forecast"),
    ("expected_volatility_pct", "Vol"),
    ("confidence_score", "Conf"),
];

/// One dashboard line, e.g. `[M3] Bias: bullish | Conf: 0.9`.
///
/// Outputs without a label come first as `name: value`, then labelled ones.
pub fn dashboard_line(result: &ModuleResult) -> String {
    let unlabelled = result
        .outputs
        .iter()
        .filter(|(key, _)| !LABELS.iter().any(|(k, _)| k == key))
        .map(|(key, value)| format!("{}: {}", key, value));

    let labelled = LABELS.iter().filter_map(|(key, label)| {
        result.outputs.get(*key).map(|value| match value {
            OutputValue::Number(n) if *key == "expected_volatility_pct" => {
                format!("{}: {}%", label, n)
            }
            _ => format!("{}: {}", label, value),
        })
    });

    let parts: Vec<String> = unlabelled.chain(labelled).collect();
    format!("[{}] {}", result.module, parts.join(" | "))
}

/// Dashboard lines for every module in the snapshot.
pub fn dashboard_lines(snapshot: &CycleSnapshot) -> Vec<String> {
    snapshot.iter().map(dashboard_line).collect()
}

/// A warning as it appears in the log.
pub fn warning_line(message: &str) -> String {
    format!("WARNING: {}", message)
}

/// The full block for one cycle: header, warnings, dashboard and footer.
///
/// Starts with a blank line and ends with a newline so blocks can be appended
/// back to back.
pub fn render_block(
    symbol: &str,
    snapshot: &CycleSnapshot,
    warnings: &[String],
    artifact: Option<&Path>,
) -> String {
    let mut lines = vec![
        String::new(),
        RULE.to_string(),
        format!("{} Fusion Cycle - {}", symbol, snapshot.timestamp_utc()),
        RULE.to_string(),
    ];
    lines.extend(warnings.iter().map(|w| warning_line(w)));
    lines.extend(dashboard_lines(snapshot));
    lines.push(match artifact {
        Some(path) => format!("Data saved: {}", path.display()),
        None => "Data saved: (not written)".to_string(),
    });
    lines.push(format!(
        "Data integrity score: {:.2}",
        snapshot.integrity_score
    ));
    lines.push(String::new());
    lines.join("\n")
}
